//! The physical page allocator: a packed bitmap over the 1 MB frames of
//! external RAM. Bit set means allocated; frames 0 and 1 are pre-reserved
//! for the kernel and are never handed out.
use crate::architecture::exception::Guard;
use crate::cell::Protected;

/// Size of one physical frame / section.
pub const FRAME_SIZE: u32 = 1 << 20;

/// Base address of the external RAM region this allocator covers.
pub const EXT_RAM_BASE: u32 = 0x2000_0000;

/// Number of 1 MB frames in the external RAM region.
pub const NUM_FRAMES: usize = 256;

/// Length, in bytes, of the external RAM region.
pub const EXT_RAM_LEN: u32 = NUM_FRAMES as u32 * FRAME_SIZE;

const WORDS: usize = NUM_FRAMES.div_ceil(u32::BITS as usize);

struct Bitmap {
    words: [u32; WORDS],
}

impl Bitmap {
    const fn new() -> Self {
        let mut words = [0_u32; WORDS];
        // Frames 0 and 1 are pre-reserved for the kernel.
        words[0] = 0b11;
        Self { words }
    }

    fn is_set(&self, frame: usize) -> bool {
        self.words[frame / 32] & (1 << (frame % 32)) != 0
    }

    fn set(&mut self, frame: usize) {
        self.words[frame / 32] |= 1 << (frame % 32);
    }

    fn clear(&mut self, frame: usize) {
        self.words[frame / 32] &= !(1 << (frame % 32));
    }
}

static BITMAP: Protected<Bitmap> = Protected::new(Bitmap::new());

/// Converts a frame index into its physical base address.
pub const fn frame_to_addr(frame: usize) -> u32 {
    EXT_RAM_BASE + frame as u32 * FRAME_SIZE
}

/// Converts a physical address into the frame index containing it, or
/// `None` if it falls outside the region this allocator owns.
pub fn addr_to_frame(addr: u32) -> Option<usize> {
    addr.checked_sub(EXT_RAM_BASE)
        .filter(|offset| *offset < EXT_RAM_LEN)
        .map(|offset| (offset / FRAME_SIZE) as usize)
}

/// First-fit scan over the bitmap for a free frame.
pub fn find_free(guard: &Guard) -> Option<usize> {
    let bitmap = BITMAP.get(guard);
    bitmap
        .words
        .iter()
        .enumerate()
        .find(|(_, word)| **word != u32::MAX)
        .map(|(word_index, word)| word_index * 32 + (!word).trailing_zeros() as usize)
        .filter(|frame| *frame < NUM_FRAMES)
}

/// Whether `frame` is currently marked allocated.
pub fn is_allocated(frame: usize, guard: &Guard) -> bool {
    frame < NUM_FRAMES && BITMAP.get(guard).is_set(frame)
}

/// Marks `frame` allocated.
///
/// # Panics
/// Panics if `frame` is out of range or already allocated; callers are
/// expected to have found it via [`find_free`] or checked [`is_allocated`]
/// first.
pub fn allocate(frame: usize, guard: &Guard) {
    assert!(frame < NUM_FRAMES, "frame {frame} is out of range");
    let bitmap = BITMAP.get_mut(guard);
    assert!(!bitmap.is_set(frame), "frame {frame} is already allocated");
    bitmap.set(frame);
}

/// Clears the bit for `frame`. Refuses to free the pre-reserved frames
/// (0 and 1) or an out-of-range index.
pub fn free(frame: usize, guard: &Guard) {
    if frame <= 1 || frame >= NUM_FRAMES {
        return;
    }
    BITMAP.get_mut(guard).clear(frame);
}

/// Allocates `n` contiguous frames and returns the base physical address, or
/// `0` if not enough frames were free. Unlike the allocator's historical
/// behavior, a partial failure rolls back every frame it had already
/// claimed rather than leaking them (see the "no rollback" design note).
pub fn allocate_contiguous(n: usize, guard: &Guard) -> u32 {
    let mut claimed = [0_usize; NUM_FRAMES];
    let mut count = 0;

    while count < n {
        let Some(frame) = find_free(guard) else {
            break;
        };
        allocate(frame, guard);
        claimed[count] = frame;
        count += 1;
    }

    if count == n {
        frame_to_addr(claimed[0])
    } else {
        for &frame in &claimed[..count] {
            free(frame, guard);
        }
        0
    }
}

/// Frees `n` consecutive frames starting at the frame containing `base`.
/// Aborts (without freeing the remainder) on the first frame that is out of
/// range or reserved.
pub fn free_contiguous(n: usize, base: u32, guard: &Guard) {
    let Some(start) = addr_to_frame(base) else {
        return;
    };
    for frame in start..start + n {
        if frame <= 1 || frame >= NUM_FRAMES {
            return;
        }
        free(frame, guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> Guard {
        Guard::new()
    }

    #[test]
    fn reserved_frames_are_preallocated() {
        let guard = guard();
        assert!(is_allocated(0, &guard));
        assert!(is_allocated(1, &guard));
    }

    #[test]
    fn find_free_skips_reserved_and_allocated() {
        let guard = guard();
        let frame = find_free(&guard).expect("some frame should be free");
        assert!(frame > 1);
        allocate(frame, &guard);
        let next = find_free(&guard).expect("another frame should be free");
        assert_ne!(frame, next);
        free(frame, &guard);
    }

    #[test]
    fn free_refuses_reserved_frames() {
        let guard = guard();
        free(0, &guard);
        free(1, &guard);
        assert!(is_allocated(0, &guard));
        assert!(is_allocated(1, &guard));
    }

    #[test]
    fn allocate_contiguous_rolls_back_on_failure() {
        let guard = guard();
        let huge = allocate_contiguous(NUM_FRAMES + 1, &guard);
        assert_eq!(huge, 0);
        // Nothing beyond the two pre-reserved frames should remain allocated.
        let still_free = find_free(&guard).expect("allocator should have rolled back");
        assert!(still_free > 1);
    }

    #[test]
    fn allocate_then_free_contiguous_round_trips() {
        let guard = guard();
        let base = allocate_contiguous(4, &guard);
        assert_ne!(base, 0);
        free_contiguous(4, base, &guard);
        let frame = addr_to_frame(base).unwrap();
        assert!(!is_allocated(frame, &guard));
    }
}
