//! Boot sequence: brings up architecture and board state, installs the idle
//! thread, starts the scheduler, and hands off to whatever user program this
//! build links in.
use crate::architecture::exception::Guard;
use crate::kernel::{scheduler, syscall, thread};
use crate::memory::frame_allocator;
use crate::{architecture, call_once, log};

extern "Rust" {
    /// Entry point of the user program this build links in: out of scope
    /// for this crate beyond the call site (demo applications are
    /// external). Expected to create and activate its own user threads
    /// through [`crate::kernel::thread`].
    fn kernel_main();
}

/// Brings the system up and never returns: control passes to the scheduler
/// once interrupts are enabled.
#[no_mangle]
pub extern "C" fn init() -> ! {
    call_once!();
    architecture::init();

    let guard = Guard::new();
    let idle = thread::create(idle_entry as u32, 0, false, true, &guard)
        .expect("the idle thread must be the first thing created");
    debug_assert_eq!(idle, thread::IDLE_ID);
    scheduler::init(&guard);

    log!(
        "boot: {} ms/tick, {} frames, {} TCB slots, features = [{}]",
        syscall::MS_PER_TICK,
        frame_allocator::NUM_FRAMES,
        thread::TABLE_SIZE,
        active_features(),
    );
    drop(guard);

    // SAFETY: this is the first and only time interrupts are unmasked; the
    // idle thread above is already installed as the running thread
    unsafe {
        architecture::exception::enable();
    }

    // SAFETY: `kernel_main` is provided by whatever user program this build
    // links against
    unsafe {
        kernel_main();
    }

    idle_loop()
}

fn active_features() -> &'static str {
    if cfg!(feature = "verbose") {
        "verbose"
    } else {
        ""
    }
}

/// The idle thread's body: repeatedly yields so it never consumes a full
/// time slice while anything else is READY.
extern "C" fn idle_entry() -> ! {
    idle_loop()
}

fn idle_loop() -> ! {
    loop {
        // SAFETY: issuing an SVC with the YIELD call number has no
        // preconditions beyond the kernel already being initialized
        unsafe {
            core::arch::asm!("svc #0x20");
        }
    }
}
