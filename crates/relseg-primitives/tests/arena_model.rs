//! Model-based allocator check: a long pseudo-random stream of alloc and
//! reset operations, each verified against a shadow cursor model. The
//! arena's observable behavior (returned address or null, `used()`) must
//! match the model exactly at every step.

use relseg_primitives::{HeapRegion, LinearArena, segment_tag};

const CAPACITY: usize = 1024 * 1024;
const OPS: usize = 50_000;

struct Model {
    base: usize,
    capacity: usize,
    cursor: usize,
}

impl Model {
    fn alloc(&mut self, size: usize, align: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let align = if align == 0 { 1 } else { align };
        let addr = self.base + self.cursor;
        let aligned = match addr % align {
            0 => addr,
            rem => addr + (align - rem),
        };
        let aligned_off = aligned - self.base;
        if aligned_off > self.capacity || size > self.capacity - aligned_off {
            return None;
        }
        self.cursor = aligned_off + size;
        Some(aligned)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

fn lcg_step(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

#[test]
fn operation_stream_matches_the_shadow_model() {
    segment_tag! {
        struct ModelTag;
    }

    let backing = HeapRegion::new_zeroed(CAPACITY);
    let arena: LinearArena<ModelTag> = LinearArena::new(backing.region());
    let mut model = Model {
        base: arena.base() as usize,
        capacity: arena.capacity(),
        cursor: 0,
    };

    let mut rng = 0xD1B5_4A32_D192_ED03u64;
    let mut resets = 0usize;

    for op in 0..OPS {
        let r = lcg_step(&mut rng);

        if r & 0xFF == 0 {
            // Quiescent by construction: this thread is the only caller.
            unsafe { arena.reset() };
            model.reset();
            resets += 1;
            assert_eq!(arena.used(), 0);
            continue;
        }

        let size = match (r >> 8) & 0x3 {
            0 => 0,
            1 => 1 + ((r >> 16) & 0x7) as usize,
            2 => 1 + ((r >> 16) & 0xFF) as usize,
            _ => 1 + ((r >> 16) & 0xFFF) as usize,
        };
        let align = match (r >> 32) & 0x7 {
            0 => 0,
            1 => 1,
            2 => 8,
            3 => 64,
            4 => 3,
            5 => 24,
            6 => 96,
            _ => 4096,
        };

        let expected = model.alloc(size, align);
        let actual = arena.alloc(size, align);

        match expected {
            None => assert!(actual.is_null(), "op {op}: model rejects, arena accepted"),
            Some(addr) => {
                assert_eq!(actual as usize, addr, "op {op}: address diverged");
            }
        }
        assert_eq!(arena.used(), model.cursor, "op {op}: used() diverged");
    }

    assert!(resets > 0, "stream never exercised reset");
}

#[test]
fn secure_reset_in_the_stream_scrubs_everything_reserved() {
    segment_tag! {
        struct ScrubTag;
    }

    let backing = HeapRegion::new_zeroed(64 * 1024);
    let arena: LinearArena<ScrubTag> = LinearArena::new(backing.region());

    let mut rng = 0x0123_4567_89AB_CDEFu64;
    for _ in 0..200 {
        let r = lcg_step(&mut rng);
        let size = 1 + (r & 0x1FF) as usize;
        let ptr = arena.alloc(size, 1 << ((r >> 16) & 0x5));
        if !ptr.is_null() {
            unsafe { core::ptr::write_bytes(ptr, 0xEE, size) };
        }
    }

    let used = arena.used();
    assert!(used > 0);
    unsafe { arena.secure_reset() };
    assert_eq!(arena.used(), 0);

    let bytes = unsafe { core::slice::from_raw_parts(arena.base(), used) };
    assert!(bytes.iter().all(|&b| b == 0));
}
