//! Shared helpers for segment tests.
//!
//! The shm namespace is machine-global, so every test works under a name
//! derived from the test binary's pid plus a counter, and removes it when
//! the guard drops.

use std::process;
use std::sync::atomic::{AtomicU32, Ordering};

use relseg_shm::{Segment, SegmentName};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A segment name unique to this test run.
pub fn fresh_name(stem: &str) -> SegmentName {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!("/relseg_{stem}_{}_{n}", process::id());
    SegmentName::new(&name).expect("generated name is portable")
}

/// Removes the wrapped name when dropped, crash or not.
pub struct NameGuard(pub SegmentName);

impl NameGuard {
    pub fn name(&self) -> &SegmentName {
        &self.0
    }
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        let _ = Segment::remove(&self.0);
    }
}
