//! Preemptive round-robin scheduling. A timer tick decrements the running
//! thread's time slice; reaching zero (or the thread giving up the CPU some
//! other way) advances to the next READY slot, wrapping back to the idle
//! thread if nothing else is runnable.
use crate::architecture::exception::Guard;
use crate::architecture::trap_frame::TrapFrame;
use crate::cell::Protected;
use crate::kernel::blocking;
use crate::kernel::context;
use crate::kernel::thread::{self, Status, IDLE_ID, TABLE_SIZE};
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Ticks a thread runs for before being preempted in favor of the next
/// READY thread.
pub const TIME_SLICE: u32 = 10;

struct State {
    current_id: u8,
    ticks_remaining: u32,
}

static STATE: Protected<State> = Protected::new(State {
    current_id: IDLE_ID,
    ticks_remaining: TIME_SLICE,
});

// Unguarded shadow copies for `log!`'s diagnostic prefix, which may fire
// from contexts that have not taken a `Guard` (or are already holding one
// and cannot borrow `STATE` reentrantly).
static CURRENT_ID_RACY: AtomicU8 = AtomicU8::new(IDLE_ID);
static TICK_COUNT_RACY: AtomicU64 = AtomicU64::new(0);

/// Prepares the idle thread as the initially running thread. Must be called
/// once, after `thread::create` has installed the idle thread at
/// [`IDLE_ID`].
pub fn init(guard: &Guard) {
    thread::activate(IDLE_ID, guard);
    thread::get_mut(IDLE_ID, guard).status = Status::Running;
    STATE.get_mut(guard).current_id = IDLE_ID;
    CURRENT_ID_RACY.store(IDLE_ID, Ordering::Relaxed);
}

/// The id of the thread currently executing.
pub fn current_id(guard: &Guard) -> u8 {
    STATE.get(guard).current_id
}

/// A racy, guard-free read of the current thread's slot, for log messages
/// only. May be stale by the time it is printed.
pub fn current_slot_unchecked() -> u8 {
    CURRENT_ID_RACY.load(Ordering::Relaxed).saturating_sub(1)
}

/// A racy, guard-free read of the tick counter, for log messages only.
pub fn tick_count_unchecked() -> u64 {
    TICK_COUNT_RACY.load(Ordering::Relaxed)
}

/// Finds the next non-idle READY slot after `slot`, wrapping around but
/// skipping slot 0 (the idle thread): idle is picked only as the fallback
/// once the whole scan comes up empty, never as a normal rotation member.
fn next_ready_after(slot: usize, guard: &Guard) -> u8 {
    let table = thread::table(guard);
    for offset in 1..=TABLE_SIZE {
        let candidate = (slot + offset) % TABLE_SIZE;
        if candidate == 0 {
            continue;
        }
        if table[candidate].is_live() && table[candidate].status == Status::Ready {
            return table[candidate].id;
        }
    }
    IDLE_ID
}

/// Saves the outgoing thread's context (if it still has one to save) and
/// switches to the next READY thread, without regard for whether its time
/// slice has expired. Used after a thread blocks, exits, or yields.
pub fn reschedule(frame: &mut TrapFrame, guard: &Guard) {
    let outgoing = STATE.get(guard).current_id;
    let outgoing_slot = usize::from(outgoing) - 1;
    if thread::table(guard)[outgoing_slot].is_live() {
        context::save(outgoing, frame, guard);
        let tcb = thread::get_mut(outgoing, guard);
        if tcb.status == Status::Running {
            tcb.status = Status::Ready;
        }
    }

    let next = next_ready_after(outgoing_slot, guard);
    context::restore(next, frame, guard);
    thread::get_mut(next, guard).status = Status::Running;

    let mut state = STATE.get_mut(guard);
    state.current_id = next;
    state.ticks_remaining = TIME_SLICE;
    CURRENT_ID_RACY.store(next, Ordering::Relaxed);
}

/// Called once per timer interrupt. Advances sleeping threads, then either
/// lets the current thread continue or preempts it for the next READY
/// thread once its time slice is exhausted.
pub fn tick(frame: &mut TrapFrame, guard: &Guard) {
    TICK_COUNT_RACY.fetch_add(1, Ordering::Relaxed);
    blocking::tick(guard);

    let expired = {
        let state = STATE.get_mut(guard);
        state.ticks_remaining = state.ticks_remaining.saturating_sub(1);
        state.ticks_remaining == 0
    };
    if expired {
        reschedule(frame, guard);
    }
}
