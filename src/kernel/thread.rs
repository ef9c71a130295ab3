//! The thread table: a fixed-capacity array of TCBs linked into a
//! process-family tree by integer id, rather than by pointer — a slot's id
//! is reclaimed and reused, so every traversal step validates `id != 0`
//! before following it.
use crate::architecture::exception::Guard;
use crate::cell::Protected;
use crate::kernel::blocking;
use crate::memory::address_space::{self, Permission, Ttb};
use crate::memory::frame_allocator::FRAME_SIZE;

/// Number of TCB slots. Slot 0 is reserved for the idle thread.
pub const TABLE_SIZE: usize = 32;

/// The idle thread's fixed id (and, since id == slot + 1, its slot is 0).
pub const IDLE_ID: u8 = 1;

/// Exit code used when the kernel terminates a thread on its behalf (a data
/// abort from user code).
pub const DESTROY_CODE: i32 = -1;

/// Number of saved registers per TCB: r0..r12 (13), sp, lr, pc, spsr (4).
pub const REGISTER_COUNT: usize = 17;

/// Index of the saved stack pointer within `registers`.
pub const SP: usize = 13;
/// Index of the saved program counter within `registers`.
pub const PC: usize = 14;
/// Index of the saved link register within `registers`.
pub const LR: usize = 15;
/// Index of the saved program status register within `registers`.
pub const SPSR: usize = 16;
/// Index of the first syscall argument/result register (r0) within
/// `registers`.
pub const R0: usize = 0;
/// Index of the second syscall argument/result register (r1) within
/// `registers`.
pub const R1: usize = 1;

const fn cpsr_user() -> u32 {
    // User mode, interrupts unmasked.
    0b1_0000
}

/// TCB flag bits.
#[bitfield_struct::bitfield(u8)]
pub struct Flags {
    /// Runs with kernel privilege (unused by anything this crate creates
    /// today, but part of the data model).
    pub privileged: bool,
    /// Runs with user privilege. Every thread `create` produces has this
    /// set.
    pub unprivileged: bool,
    /// Owns a peripheral driver's interrupt line (unused by anything this
    /// crate creates today, but part of the data model).
    pub driver: bool,
    /// A lightweight thread sharing its parent's address space, as opposed
    /// to a process-like thread owning its own section table.
    pub task: bool,
    #[bits(4)]
    __reserved: u8,
}

/// Execution status of a TCB.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// Created but not yet made runnable.
    Inactive,
    /// Runnable, waiting for the scheduler to pick it.
    Ready,
    /// Currently executing.
    Running,
    /// Parked in exactly one wait set.
    Blocked,
    /// Exited; its slot is reclaimed once nothing still needs its id.
    Terminated,
}

/// One thread control block.
#[derive(Clone, Copy)]
pub struct Tcb {
    /// 0 if this slot is free; otherwise `slot + 1`.
    pub id: u8,
    /// 0 if this thread has no parent (or its parent has already reclaimed
    /// the relationship).
    pub parent_id: u8,
    /// 0 if this thread has no children.
    pub first_child_id: u8,
    /// 0 if this thread is the last child of its parent.
    pub next_sibling_id: u8,
    /// Count of TASK children spawned so far, used to place the next one's
    /// stack.
    pub num_task_children: u8,
    /// Saved general-purpose registers, stack pointer, link register,
    /// program counter, and saved program status register.
    pub registers: [u32; REGISTER_COUNT],
    /// The value passed to (or synthesized for) `exit`.
    pub exit_code: i32,
    /// Privilege/role bits.
    pub flags: Flags,
    /// Current scheduling/lifecycle status.
    pub status: Status,
    /// Advisory priority; unused by the round-robin policy.
    pub prio: u8,
    /// This thread's section-table base.
    pub ttb: Ttb,
}

impl Tcb {
    const fn empty() -> Self {
        Self {
            id: 0,
            parent_id: 0,
            first_child_id: 0,
            next_sibling_id: 0,
            num_task_children: 0,
            registers: [0; REGISTER_COUNT],
            exit_code: 0,
            flags: Flags::new(),
            status: Status::Inactive,
            prio: 0,
            ttb: Ttb(0),
        }
    }

    /// Whether this slot currently holds a live thread.
    pub fn is_live(&self) -> bool {
        self.id != 0
    }
}

static TABLE: Protected<[Tcb; TABLE_SIZE]> = Protected::new([Tcb::empty(); TABLE_SIZE]);

fn slot_of(id: u8) -> Option<usize> {
    (id != 0).then(|| usize::from(id) - 1)
}

/// Borrows the whole table immutably.
pub fn table(guard: &Guard) -> &[Tcb; TABLE_SIZE] {
    TABLE.get(guard)
}

/// Borrows one TCB by id.
///
/// # Panics
/// Panics if `id` is 0 or the slot it names is free; callers are expected to
/// only hold ids of live threads.
pub fn get(id: u8, guard: &Guard) -> &Tcb {
    let slot = slot_of(id).expect("id 0 does not name a thread");
    let tcb = &TABLE.get(guard)[slot];
    assert_eq!(tcb.id, id, "id does not match the slot it was derived from");
    tcb
}

/// Borrows one TCB by id, mutably.
///
/// # Panics
/// Same conditions as [`get`].
pub fn get_mut(id: u8, guard: &Guard) -> &mut Tcb {
    let slot = slot_of(id).expect("id 0 does not name a thread");
    let tcb = &mut TABLE.get_mut(guard)[slot];
    assert_eq!(tcb.id, id, "id does not match the slot it was derived from");
    tcb
}

/// Virtual address boundaries used by `create`'s address-space prefill.
mod layout {
    use crate::memory::frame_allocator::FRAME_SIZE;

    /// Number of low sections identity-mapped with no user access
    /// (kernel/exception vectors/MMIO).
    pub const KERNEL_LOW_SECTIONS: u32 = 512;
    /// Section index of the shared, read-only user support library.
    pub const USER_LIBRARY_SECTION: u32 = 512;
    /// Number of high sections identity-mapped with no user access.
    pub const RESERVED_HIGH_SECTIONS: u32 = 256;
    /// Fixed top-of-user-space virtual address; the first task child's
    /// stack lives here, each subsequent one 1 MB lower.
    pub const USER_STACK_TOP: u32 = (4096 - RESERVED_HIGH_SECTIONS - 1) * FRAME_SIZE;
}

fn link_as_last_child(parent_id: u8, child_id: u8, guard: &Guard) {
    if parent_id == 0 {
        return;
    }
    let mut cursor = get(parent_id, guard).first_child_id;
    if cursor == 0 {
        get_mut(parent_id, guard).first_child_id = child_id;
        return;
    }
    loop {
        let next = get(cursor, guard).next_sibling_id;
        if next == 0 {
            get_mut(cursor, guard).next_sibling_id = child_id;
            return;
        }
        cursor = next;
    }
}

/// Creates a new thread. Returns its id, or `None` if the table is full or
/// the request violates the task/process nesting rule (a task may not have
/// task children, and a task must have a parent).
pub fn create(
    entry_text: u32,
    parent_id: u8,
    is_task: bool,
    is_idle: bool,
    guard: &Guard,
) -> Option<u8> {
    if is_task {
        if parent_id == 0 {
            return None;
        }
        if get(parent_id, guard).flags.task() {
            return None;
        }
    }

    let slot = if is_idle {
        0
    } else {
        (1..TABLE_SIZE).find(|&slot| !TABLE.get(guard)[slot].is_live())?
    };

    let id = u8::try_from(slot + 1).ok()?;

    let (sp, ttb) = if is_task {
        let parent = *get(parent_id, guard);
        let sp = layout::USER_STACK_TOP - u32::from(parent.num_task_children) * FRAME_SIZE;
        address_space::map_any(parent.ttb, sp, true, true, guard);
        get_mut(parent_id, guard).num_task_children += 1;
        (sp, parent.ttb)
    } else {
        let ttb = address_space::setup_thread(id);
        for section in 0..layout::KERNEL_LOW_SECTIONS {
            address_space::map_page_with_permission(
                ttb,
                section as usize,
                section * FRAME_SIZE,
                Permission::KernelOnly,
            );
        }
        address_space::map_page(
            ttb,
            layout::USER_LIBRARY_SECTION as usize,
            layout::USER_LIBRARY_SECTION * FRAME_SIZE,
            true,
            false,
        );
        address_space::map_any(ttb, layout::USER_STACK_TOP, true, true, guard);
        for section in (4096 - layout::RESERVED_HIGH_SECTIONS)..4096 {
            address_space::map_page_with_permission(
                ttb,
                section as usize,
                section * FRAME_SIZE,
                Permission::KernelOnly,
            );
        }
        (layout::USER_STACK_TOP, ttb)
    };

    let mut tcb = Tcb::empty();
    tcb.id = id;
    tcb.parent_id = parent_id;
    tcb.registers[PC] = entry_text;
    tcb.registers[SP] = sp;
    tcb.registers[SPSR] = cpsr_user();
    tcb.flags = Flags::new().with_unprivileged(true).with_task(is_task);
    tcb.status = Status::Inactive;
    tcb.ttb = ttb;
    TABLE.get_mut(guard)[slot] = tcb;

    if !is_idle {
        link_as_last_child(parent_id, id, guard);
    }

    Some(id)
}

/// Terminates `id`, recursively terminating every descendant with exit code
/// 0, and reclaiming slots whose parent can no longer observe them.
///
/// Reads `next_sibling_id` before recursing into each child, since the
/// recursive call may reclaim that child's slot (and thus overwrite its
/// `next_sibling_id`) before returning.
pub fn exit(id: u8, code: i32, guard: &Guard) {
    blocking::cancel_sleep(id, guard);

    let mut child = get(id, guard).first_child_id;
    while child != 0 {
        let next_sibling = get(child, guard).next_sibling_id;
        exit(child, 0, guard);
        child = next_sibling;
    }

    let tcb = get_mut(id, guard);
    tcb.status = Status::Terminated;
    tcb.exit_code = code;
    let parent_id = tcb.parent_id;
    let is_task = tcb.flags.task();
    let ttb = tcb.ttb;

    if !is_task {
        address_space::cleanup_thread(ttb, guard);
    }

    if parent_id == 0 || code == 0 {
        get_mut(id, guard).id = 0;
    }
}

/// Marks `id` runnable.
pub fn activate(id: u8, guard: &Guard) {
    get_mut(id, guard).status = Status::Ready;
}

/// Marks `id` not yet runnable.
pub fn deactivate(id: u8, guard: &Guard) {
    get_mut(id, guard).status = Status::Inactive;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> Guard {
        Guard::new()
    }

    #[test]
    fn distinct_live_slots_have_distinct_ids() {
        let guard = guard();
        let a = create(0x1000, 0, false, false, &guard).unwrap();
        let b = create(0x2000, 0, false, false, &guard).unwrap();
        assert_ne!(a, b);
        exit(a, 0, &guard);
        exit(b, 0, &guard);
    }

    #[test]
    fn task_creation_is_rejected_without_a_parent() {
        let guard = guard();
        assert!(create(0x1000, 0, true, false, &guard).is_none());
    }

    #[test]
    fn task_cannot_spawn_a_task() {
        let guard = guard();
        let parent = create(0x1000, 0, false, false, &guard).unwrap();
        let task = create(0x1010, parent, true, false, &guard).unwrap();
        assert!(create(0x1020, task, true, false, &guard).is_none());
        exit(parent, 0, &guard);
    }

    #[test]
    fn task_stacks_step_down_by_one_frame_each() {
        let guard = guard();
        let parent = create(0x1000, 0, false, false, &guard).unwrap();
        let first = create(0x1010, parent, true, false, &guard).unwrap();
        let second = create(0x1020, parent, true, false, &guard).unwrap();
        let third = create(0x1030, parent, true, false, &guard).unwrap();
        assert_eq!(get(first, &guard).registers[SP], layout::USER_STACK_TOP);
        assert_eq!(
            get(second, &guard).registers[SP],
            layout::USER_STACK_TOP - FRAME_SIZE
        );
        assert_eq!(
            get(third, &guard).registers[SP],
            layout::USER_STACK_TOP - 2 * FRAME_SIZE
        );
        exit(parent, 0, &guard);
    }

    #[test]
    fn fork_join_reclaims_every_descendant() {
        let guard = guard();
        let parent = create(0x1000, 0, false, false, &guard).unwrap();
        let child = create(0x1010, parent, false, false, &guard).unwrap();
        let grandchild = create(0x1020, child, false, false, &guard).unwrap();
        exit(parent, 0, &guard);
        assert_eq!(TABLE.get(&guard)[slot_of(child).unwrap()].id, 0);
        assert_eq!(TABLE.get(&guard)[slot_of(grandchild).unwrap()].id, 0);
    }
}
