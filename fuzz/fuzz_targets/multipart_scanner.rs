#![no_main]

//! Fuzz target for the streaming multipart scanner.
//!
//! The first byte picks a chunk size; the rest is fed as the body. The
//! scanner must never panic and parts must nest properly.

use libfuzzer_sys::fuzz_target;
use serpent_core::{MultipartScanner, ScanEvent};

const BOUNDARY: &str = "----X";

fuzz_target!(|data: &[u8]| {
    let Some((&first, body)) = data.split_first() else { return };
    let chunk_size = usize::from(first).max(1);

    let mut scanner = MultipartScanner::new(BOUNDARY);
    let mut open_parts = 0usize;

    for chunk in body.chunks(chunk_size) {
        scanner.push(chunk);
        loop {
            match scanner.next_event() {
                Ok(Some(ScanEvent::PartStart(_))) => open_parts += 1,
                Ok(Some(ScanEvent::PartEnd)) => {
                    assert!(open_parts > 0, "part ended without starting");
                    open_parts -= 1;
                },
                Ok(Some(_)) => {},
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }

    let _ = scanner.finish();
});
