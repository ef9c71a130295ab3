//! Entry points called by the assembly vector stubs in `exception.s`, one
//! per ARM32 exception mode. These collapse what used to be a nine-handler
//! table per exception level (reset, undefined instruction, SVC, prefetch
//! abort, data abort, IRQ, FIQ) into the seven vectors this target actually
//! has, and hand off to the kernel core through a single `&mut TrapFrame`
//! rather than letting the core dig registers out of assembly directly.
use crate::architecture::exception::Guard;
use crate::architecture::mmu;
use crate::architecture::trap_frame::TrapFrame;
use crate::kernel::{interrupt, scheduler, syscall, thread};
use crate::log;

/// The reset vector. Reaching this handler means the board was reset with
/// the kernel already running — treated as a fatal condition.
#[no_mangle]
extern "C" fn handle_reset() -> ! {
    log!("Reset interrupt taken; halting");
    mmu::shutdown(1);
}

/// An undefined instruction was executed.
#[no_mangle]
extern "C" fn handle_undefined(frame: &mut TrapFrame) {
    log!(
        "Undefined instruction at 0x{:08X}; caller left running",
        frame.return_address
    );
    // Left as a known weakness: the offender is not terminated automatically
    // (see the failure-semantics note on unknown instructions). A future
    // revision may promote this to `kernel::thread::exit`.
}

/// A software interrupt (SVC) instruction was executed: the system-call
/// entry point.
#[no_mangle]
extern "C" fn handle_svc(frame: &mut TrapFrame) {
    syscall::dispatch(frame);
}

/// A prefetch abort: an instruction fetch faulted.
#[no_mangle]
extern "C" fn handle_prefetch_abort(frame: &mut TrapFrame) {
    log!(
        "Prefetch abort at 0x{:08X}, fault address 0x{:08X}",
        frame.return_address,
        mmu::fault_address()
    );
}

/// A data abort: a load or store faulted. Per the failure semantics for
/// user faults, the offending thread is terminated.
#[no_mangle]
extern "C" fn handle_data_abort(frame: &mut TrapFrame) {
    log!(
        "Data abort at 0x{:08X}, fault address 0x{:08X}",
        frame.return_address,
        mmu::fault_address()
    );
    let guard = Guard::new();
    let dying = scheduler::current_id(&guard);
    thread::exit(dying, thread::DESTROY_CODE, &guard);
    scheduler::reschedule(frame, &guard);
}

/// The periodic tick or a peripheral interrupt.
#[no_mangle]
extern "C" fn handle_irq(frame: &mut TrapFrame) {
    interrupt::handle(frame);
}

/// A fast interrupt request. Not used by any peripheral in this system;
/// logged if it ever fires.
#[no_mangle]
extern "C" fn handle_fiq(_frame: &mut TrapFrame) {
    log!("Unexpected FIQ");
}
