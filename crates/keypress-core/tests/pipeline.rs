//! End-to-end pipeline tests: property-based invariants and a real PTY
//! round-trip, exercising chunk-boundary behavior that in-process
//! byte-array tests can't reach on their own.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use keypress_core::drag_heuristic::DRAG_COMPLETION_TIMEOUT;
use keypress_core::event::{KeyEvent, PipelineConfig};
use keypress_core::router::Router;
use proptest::prelude::*;

fn collecting_router(config: PipelineConfig) -> (Router, Rc<RefCell<Vec<KeyEvent>>>) {
    let mut router = Router::new(config);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    router.subscribe(move |e: &KeyEvent| sink.borrow_mut().push(e.clone()));
    (router, events)
}

proptest! {
    /// For any input byte stream with kitty enabled and no `ESC[` prefixes,
    /// the concatenation of emitted `sequence` fields equals the input.
    #[test]
    fn byte_preservation_with_no_escape_bytes(
        bytes in prop::collection::vec(prop_oneof![0x00u8..=0x1au8, 0x1cu8..=0x7fu8], 0..128)
    ) {
        let (mut router, events) = collecting_router(PipelineConfig::kitty());
        router.feed_raw(Instant::now(), &bytes);
        // Force any pending drag-heuristic accumulation to flush so its
        // bytes are accounted for in the reconstruction.
        router.tick(Instant::now() + DRAG_COMPLETION_TIMEOUT + Duration::from_millis(1));

        let reconstructed: Vec<u8> = events.borrow().iter().flat_map(|e| e.sequence.bytes()).collect();
        prop_assert_eq!(reconstructed, bytes);
    }

    /// For any number of well-formed kitty sequences concatenated in one
    /// chunk or spread across chunk boundaries, the emitted event sequence
    /// is identical.
    #[test]
    fn chunking_invariance_for_kitty_sequences(indices in prop::collection::vec(0usize..CATALOG.len(), 1..6)) {
        let concatenated: Vec<u8> = indices.iter().flat_map(|&i| CATALOG[i].0.iter().copied()).collect();

        let (mut whole_router, whole_events) = collecting_router(PipelineConfig::kitty());
        whole_router.feed_raw(Instant::now(), &concatenated);

        let (mut byte_router, byte_events) = collecting_router(PipelineConfig::kitty());
        for &b in &concatenated {
            byte_router.feed_raw(Instant::now(), &[b]);
        }

        let summarize = |events: &Rc<RefCell<Vec<KeyEvent>>>| -> Vec<(String, bool, bool, bool)> {
            events.borrow().iter().map(|e| (e.name.clone(), e.ctrl, e.meta, e.shift)).collect()
        };

        prop_assert_eq!(summarize(&whole_events), summarize(&byte_events));
    }
}

/// Fixed catalog of well-formed Kitty byte sequences used by
/// `chunking_invariance_for_kitty_sequences`.
static CATALOG: &[(&[u8], &str)] = &[
    (b"\x1b[3~", "delete"),
    (b"\x1b[5~", "pageup"),
    (b"\x1b[A", "up"),
    (b"\x1b[1;5C", "right+ctrl"),
    (b"\x1b[57414;5u", "return+ctrl"),
    (b"\x1b[1;2Z", "tab+shift"),
];

#[cfg(unix)]
#[test]
fn pty_roundtrip_reconstructs_sequences_split_across_kernel_reads() {
    use portable_pty::{native_pty_system, CommandBuilder, PtySize};
    use std::io::{Read, Write};

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
        .expect("open pty");

    // `stty raw -echo` disables line discipline and local echo on the slave
    // so `cat` reflects exactly the bytes written to the master, with no
    // terminal-driver transformation in the way.
    let mut cmd = CommandBuilder::new("sh");
    cmd.args(["-c", "stty raw -echo; exec cat"]);
    let mut child = pair
        .slave
        .spawn_command(cmd)
        .expect("spawn shell attached to pty slave");
    drop(pair.slave);

    let mut writer = pair.master.take_writer().expect("pty writer");
    let mut reader = pair.master.try_clone_reader().expect("pty reader");

    let payload = b"\x1b[3~\x1b[5~";
    for chunk in payload.chunks(2) {
        writer.write_all(chunk).expect("write to pty master");
        writer.flush().expect("flush pty master");
    }
    drop(writer);

    let mut collected = Vec::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(5);
    while collected.len() < payload.len() && Instant::now() < deadline {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
        }
    }

    let _ = child.kill();
    let _ = child.wait();

    assert_eq!(collected, payload, "pty did not faithfully echo the written bytes");

    let (mut router, events) = collecting_router(PipelineConfig::kitty());
    // Feed back through the router in arbitrary small chunks, mimicking a
    // real kernel read() splitting the two sequences across calls.
    for chunk in collected.chunks(3) {
        router.feed_raw(Instant::now(), chunk);
    }

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name, "delete");
    assert_eq!(events[1].name, "pageup");
}
