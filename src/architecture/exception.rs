use crate::{add_test, kernel::exception::PrivilegeLevel};
use core::arch::asm;

// The exception vector table and entry stubs.
core::arch::global_asm!(include_str!("exception.s"));

/// Processor mode bits in the low 5 bits of CPSR/SPSR.
mod mode {
    pub const USER: u32 = 0b1_0000;
    pub const SVC: u32 = 0b1_0011;
    pub const IRQ: u32 = 0b1_0010;
    pub const UNDEFINED: u32 = 0b1_1011;
    pub const ABORT: u32 = 0b1_0111;
}

/// Reads the current processor mode out of CPSR and maps it to a
/// [`PrivilegeLevel`].
pub fn el() -> PrivilegeLevel {
    match current_cpsr() & 0b1_1111 {
        mode::USER => PrivilegeLevel::User,
        mode::SVC | mode::IRQ | mode::UNDEFINED | mode::ABORT => PrivilegeLevel::Kernel,
        _ => PrivilegeLevel::Unknown,
    }
}

fn current_cpsr() -> u32 {
    let cpsr: u32;
    // SAFETY: reading CPSR into a plain register has no side effects
    unsafe {
        asm!("mrs {0}, cpsr", out(reg) cpsr);
    }
    cpsr
}

fn write_cpsr_control(cpsr: u32) {
    // SAFETY: writing only the control field (mode + I/F/T bits) of CPSR from
    // a privileged mode is the documented way to mask/unmask IRQ and FIQ
    unsafe {
        asm!("msr cpsr_c, {0}", in(reg) cpsr);
    }
}

const IRQ_MASK: u32 = 1 << 7;
const FIQ_MASK: u32 = 1 << 6;
const BOTH_MASKED: u32 = IRQ_MASK | FIQ_MASK;

/// Initializes exception handling. The vector table itself is installed at
/// link time by `exception.s`; there is nothing further to configure.
pub fn init() {}

/// Checks if interrupts (IRQ and FIQ) are fully disabled.
pub fn are_disabled() -> bool {
    current_cpsr() & BOTH_MASKED == BOTH_MASKED
}

/// Turns on interrupts.
/// # Safety
/// Callers must be certain that interrupts are currently disabled, and that
/// no code relying on the single-threaded kernel invariant is left running
/// partway through a mutation of global kernel state.
pub unsafe fn enable() {
    assert!(are_disabled(), "interrupts must be disabled to enable them");
    write_cpsr_control(current_cpsr() & !BOTH_MASKED);
}

/// Disables interrupts.
/// # Safety
/// Interrupts must be re-enabled by the caller before returning to user code.
pub unsafe fn disable() {
    assert!(!are_disabled(), "interrupts must be enabled to disable them");
    write_cpsr_control(current_cpsr() | BOTH_MASKED);
}

/// A `Guard` masks interrupts while alive and restores the prior mask state
/// on drop. The kernel never takes a lock on its global state (the TCB
/// table, the frame bitmap, the wait sets) — it instead requires a `&Guard`
/// to access it, which can only be produced while interrupts are masked.
pub struct Guard {
    /// The interrupt mask bits as they were before this guard was created.
    prior_mask: u32,
}

impl Guard {
    /// Creates a new guard, masking interrupts if they were not already.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let prior_mask = current_cpsr() & BOTH_MASKED;
        if prior_mask != BOTH_MASKED {
            // SAFETY: we just determined interrupts are not fully masked
            unsafe {
                disable();
            }
        }
        Self { prior_mask }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        write_cpsr_control(current_cpsr() & !BOTH_MASKED | self.prior_mask);
    }
}

add_test!(guard_preserves_interrupt_state, {
    assert!(
        !are_disabled(),
        "interrupts should be enabled when a thread runs, by default"
    );
    let guard = Guard::new();
    assert!(are_disabled(), "interrupts should be disabled while a guard is active");
    drop(guard);
    assert!(!are_disabled(), "dropping all guards should re-enable interrupts");

    let guard1 = Guard::new();
    assert!(are_disabled());
    let guard2 = Guard::new();
    assert!(are_disabled());
    drop(guard2);
    assert!(
        are_disabled(),
        "interrupts should remain disabled while a guard is active, even if another guard is dropped"
    );
    drop(guard1);
    assert!(!are_disabled());
});
