//! The per-thread section table: a single-level, 4096-entry MMU table where
//! each entry maps 1 MB of virtual space. Construction, teardown, and
//! individual mappings all live here; the frame bookkeeping itself is
//! [`crate::memory::frame_allocator`]'s job.
use crate::architecture::exception::Guard;
use crate::memory::frame_allocator::{self, FRAME_SIZE};
use bitfield_struct::bitfield;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// Number of entries in a section table; one per 1 MB of the 4 GB address
/// space.
pub const SECTION_ENTRIES: usize = 4096;

/// Size in bytes of one thread's section table (4096 entries × 4 bytes).
pub const TABLE_SIZE: u32 = SECTION_ENTRIES as u32 * 4;

/// Base address of the reserved region holding every thread's section
/// table, id-indexed.
const TABLE_REGION_BASE: u32 = frame_allocator::EXT_RAM_BASE + 0x0100_0000;

/// User-visible permission encoding for a section. Supervisor access is
/// implicitly read/write in every non-empty section; this only controls
/// what user mode may do.
#[derive(FromPrimitive, ToPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Permission {
    /// No user access, produced when neither read nor write was requested.
    None = 0,
    /// No user access, used explicitly for the kernel's own region mapped
    /// into every address space (identity-mapped, supervisor RW).
    KernelOnly = 1,
    /// Supervisor read/write, user read-only (the shared user library).
    UserReadOnly = 2,
    /// Supervisor read/write, user read/write (ordinary user pages).
    UserReadWrite = 3,
}

impl Permission {
    /// Write without read is promoted to read-only; read/write requires
    /// both flags.
    pub fn from_rw(read: bool, write: bool) -> Self {
        if write {
            Self::UserReadWrite
        } else if read {
            Self::UserReadOnly
        } else {
            Self::None
        }
    }
}

/// A single section descriptor. Bits 31:20 hold the physical frame number
/// (matching the alignment of the address it represents); the low bits
/// carry the fixed domain/type pattern, the permission field, and whether
/// the entry is populated at all.
#[bitfield(u32)]
pub struct SectionDescriptor {
    /// Whether this entry is a populated mapping at all.
    pub valid: bool,
    #[bits(2)]
    permission_bits: u8,
    /// Fixed domain (0) and section type-identifier bits; constant for
    /// every mapping this kernel creates.
    #[bits(17)]
    __reserved: u32,
    /// High 12 bits of the mapped physical address (the frame number).
    #[bits(12)]
    pub base_frame: u32,
}

impl SectionDescriptor {
    fn permission(&self) -> Permission {
        Permission::from_u8(self.permission_bits()).unwrap_or(Permission::None)
    }

    fn with_permission(self, permission: Permission) -> Self {
        self.with_permission_bits(permission.to_u8().unwrap_or(0))
    }
}

/// A reference to a thread's section-table base: the physical address the
/// MMU's translation table base register is loaded with.
#[derive(Clone, Copy, PartialEq, Eq, Debug, derive_more::Into, derive_more::From)]
pub struct Ttb(pub u32);

type Table = [SectionDescriptor; SECTION_ENTRIES];

fn table_ptr(ttb: Ttb) -> *mut Table {
    ttb.0 as *mut Table
}

/// Writes the section descriptor at `ttb[page_num]` directly. A no-op for
/// an out-of-range `page_num`.
pub fn map_page(ttb: Ttb, page_num: usize, target_phys: u32, read: bool, write: bool) {
    map_page_with_permission(ttb, page_num, target_phys, Permission::from_rw(read, write));
}

/// As [`map_page`], but takes the permission encoding directly. Used by the
/// thread table to install the fixed [`Permission::KernelOnly`] mappings
/// that a plain read/write pair cannot express.
pub fn map_page_with_permission(ttb: Ttb, page_num: usize, target_phys: u32, permission: Permission) {
    if page_num >= SECTION_ENTRIES {
        return;
    }
    // SAFETY: `ttb` designates a 16 KB table this kernel owns and keeps
    // identity-mapped for its own access
    let table = unsafe { &mut *table_ptr(ttb) };
    table[page_num] = SectionDescriptor::new()
        .with_valid(true)
        .with_base_frame(target_phys >> 20)
        .with_permission(permission);
}

/// Masks both addresses to section boundaries, writes the mapping, and
/// ensures the target frame is marked allocated. Consults the bitmap first
/// so a frame that is already allocated is never double-counted (closing
/// the gap the original design left open).
pub fn map_to(ttb: Ttb, from_phys: u32, to_virt: u32, read: bool, write: bool, guard: &Guard) {
    let phys = from_phys & !(FRAME_SIZE - 1);
    let virt = to_virt & !(FRAME_SIZE - 1);
    map_page(ttb, (virt >> 20) as usize, phys, read, write);
    if let Some(frame) = frame_allocator::addr_to_frame(phys) {
        if !frame_allocator::is_allocated(frame, guard) {
            frame_allocator::allocate(frame, guard);
        }
    }
}

/// Allocates a fresh frame and maps it at `from_virt`, unless that slot is
/// already populated. Returns whether the mapping was created.
pub fn map_any(ttb: Ttb, from_virt: u32, read: bool, write: bool, guard: &Guard) -> bool {
    let page_num = (from_virt >> 20) as usize;
    if page_num >= SECTION_ENTRIES {
        return false;
    }
    // SAFETY: see `map_page`
    let table = unsafe { &*table_ptr(ttb) };
    if table[page_num].valid() {
        return false;
    }
    let Some(frame) = frame_allocator::find_free(guard) else {
        return false;
    };
    frame_allocator::allocate(frame, guard);
    map_page(
        ttb,
        page_num,
        frame_allocator::frame_to_addr(frame),
        read,
        write,
    );
    true
}

/// Zeroes the descriptor at `page_num`. The underlying frame, if any, stays
/// allocated — freeing it is the caller's job via [`cleanup_thread`].
pub fn unmap_page(ttb: Ttb, page_num: usize) {
    if page_num >= SECTION_ENTRIES {
        return;
    }
    // SAFETY: see `map_page`
    let table = unsafe { &mut *table_ptr(ttb) };
    table[page_num] = SectionDescriptor::new();
}

/// Returns the physical address `virt` resolves to, or `0` if the
/// corresponding entry is empty. Low bits of `virt` within the section are
/// preserved.
pub fn resolve(ttb: Ttb, virt: u32) -> u32 {
    let page_num = (virt >> 20) as usize;
    if page_num >= SECTION_ENTRIES {
        return 0;
    }
    // SAFETY: see `map_page`
    let table = unsafe { &*table_ptr(ttb) };
    let entry = table[page_num];
    if entry.valid() {
        (entry.base_frame() << 20) | (virt & (FRAME_SIZE - 1))
    } else {
        0
    }
}

/// Places a new, zeroed section table at the fixed per-id offset in the
/// reserved table region.
pub fn setup_thread(id: u8) -> Ttb {
    let ttb = Ttb(TABLE_REGION_BASE + u32::from(id) * TABLE_SIZE);
    // SAFETY: each id owns a disjoint 16 KB slice of the reserved region
    let table = unsafe { &mut *table_ptr(ttb) };
    *table = [SectionDescriptor::new(); SECTION_ENTRIES];
    ttb
}

/// Frees every RAM frame this table still maps (skipping the pre-reserved
/// frames 0 and 1, which can never appear here legitimately), then frees the
/// frame the table itself lives in.
pub fn cleanup_thread(ttb: Ttb, guard: &Guard) {
    // SAFETY: see `map_page`
    let table = unsafe { &*table_ptr(ttb) };
    for entry in table.iter() {
        if entry.valid() {
            let frame = entry.base_frame() as usize;
            if frame > 1 {
                frame_allocator::free(frame, guard);
            }
        }
    }
    if let Some(frame) = frame_allocator::addr_to_frame(ttb.0) {
        frame_allocator::free(frame, guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> Guard {
        Guard::new()
    }

    #[test]
    fn map_to_then_resolve_round_trips() {
        let guard = guard();
        let ttb = setup_thread(7);
        let phys = frame_allocator::frame_to_addr(
            frame_allocator::find_free(&guard).expect("a free frame should exist"),
        );
        let virt = 0x5000_0000_u32;
        map_to(ttb, phys, virt, true, true, &guard);
        assert_eq!(resolve(ttb, virt), phys);
        assert_eq!(resolve(ttb, virt | 0x123), phys | 0x123);
    }

    #[test]
    fn map_any_then_unmap_leaves_frame_allocated() {
        let guard = guard();
        let ttb = setup_thread(8);
        let virt = 0x6000_0000_u32;
        assert!(map_any(ttb, virt, true, true, &guard));
        let phys = resolve(ttb, virt);
        let frame = frame_allocator::addr_to_frame(phys).unwrap();
        unmap_page(ttb, (virt >> 20) as usize);
        assert_eq!(resolve(ttb, virt), 0);
        assert!(frame_allocator::is_allocated(frame, &guard));
        frame_allocator::free(frame, &guard);
    }

    #[test]
    fn cleanup_thread_never_touches_reserved_frames() {
        let guard = guard();
        let ttb = setup_thread(9);
        assert!(map_any(ttb, 0x7000_0000, true, true, &guard));
        cleanup_thread(ttb, &guard);
        assert!(frame_allocator::is_allocated(0, &guard));
        assert!(frame_allocator::is_allocated(1, &guard));
    }
}
