#![feature(custom_test_frameworks)]
#![no_main]
#![no_std]
#![reexport_test_harness_main = "test_main"]
#![test_runner(sectionkernel::test_runner)]
use sectionkernel::add_test;
use sectionkernel::architecture::exception::Guard;
use sectionkernel::architecture::trap_frame::TrapFrame;
use sectionkernel::kernel::thread::{self, Status, IDLE_ID};
use sectionkernel::kernel::{blocking, scheduler};

#[no_mangle]
fn kernel_main() {
    test_main()
}

/// A thread parked by SLEEP is woken by the tick machinery exactly when its
/// countdown reaches zero, with its result register cleared to 0, and it is
/// the scheduler (not the wait set) that hands the CPU back to it.
add_test!(a_sleeping_thread_is_rescheduled_once_its_countdown_elapses, {
    let guard = Guard::new();
    scheduler::init(&guard);
    thread::deactivate(IDLE_ID, &guard);

    let sleeper = thread::create(0x4000, 0, false, false, &guard).unwrap();
    thread::activate(sleeper, &guard);

    let mut frame = TrapFrame::default();
    scheduler::reschedule(&mut frame, &guard);
    assert_eq!(scheduler::current_id(&guard), sleeper);

    // Simulate the SLEEP syscall parking the current thread, then yield the
    // CPU; with nothing else READY this falls back to idle.
    blocking::block_on_sleep(sleeper, 3, &guard);
    scheduler::reschedule(&mut frame, &guard);
    assert_eq!(scheduler::current_id(&guard), IDLE_ID);
    assert_eq!(thread::get(sleeper, &guard).status, Status::Blocked);

    // Two ticks aren't enough.
    scheduler::tick(&mut frame, &guard);
    scheduler::tick(&mut frame, &guard);
    assert_eq!(thread::get(sleeper, &guard).status, Status::Blocked);
    assert_eq!(scheduler::current_id(&guard), IDLE_ID);

    // The third tick wakes it and reports a zero remaining count; idle's
    // time slice also expires around here, so keep ticking until the
    // scheduler actually lands back on it.
    for _ in 0..scheduler::TIME_SLICE {
        scheduler::tick(&mut frame, &guard);
        if scheduler::current_id(&guard) == sleeper {
            break;
        }
    }
    assert_eq!(scheduler::current_id(&guard), sleeper);
    assert_eq!(
        thread::get(sleeper, &guard).registers[7],
        0,
        "a natural wakeup reports zero ticks remaining in r7"
    );

    thread::exit(sleeper, 0, &guard);
});

/// Exiting a thread that is still parked on a wait set must not leave a
/// dangling wakeup that could later touch a reused slot.
add_test!(exiting_a_blocked_thread_cancels_its_wait, {
    let guard = Guard::new();
    scheduler::init(&guard);
    thread::deactivate(IDLE_ID, &guard);

    let a = thread::create(0x5000, 0, false, false, &guard).unwrap();
    blocking::block_on_sleep(a, 100, &guard);
    thread::exit(a, 0, &guard);

    // a's slot is free again; a freshly created thread reusing it must not
    // be woken by a's stale countdown.
    let b = thread::create(0x5010, 0, false, false, &guard).unwrap();
    assert_eq!(b, a, "the freed slot should be reused immediately");
    for _ in 0..200 {
        scheduler::tick(&mut TrapFrame::default(), &guard);
    }
    assert_eq!(
        thread::get(b, &guard).status,
        Status::Inactive,
        "b was never activated or blocked, and must stay untouched by a's old wait"
    );

    thread::exit(b, 0, &guard);
});
