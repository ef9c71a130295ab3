//! The periodic tick source. Out of scope for this crate's core beyond the
//! interface it presents: a fixed-period tick that the interrupt entry polls
//! and acknowledges.
use crate::board::Mmio;
use crate::sync::SpinLock;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::ReadWrite,
};

register_bitfields! {
    u32,
    /// Load value for the down-counter; reloaded automatically on underflow.
    LOAD [
        VALUE OFFSET(0) NUMBITS(32)
    ],
    /// Control register: enable the counter and its interrupt.
    CONTROL [
        ENABLE OFFSET(0) NUMBITS(1),
        IRQ_ENABLE OFFSET(1) NUMBITS(1)
    ],
    /// Write-one-to-clear interrupt status; reading it returns whether the
    /// counter underflowed since the last clear.
    CLEAR [
        PENDING OFFSET(0) NUMBITS(1)
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => LOAD: ReadWrite<u32, LOAD::Register>),
        (0x04 => CONTROL: ReadWrite<u32, CONTROL::Register>),
        (0x08 => CLEAR: ReadWrite<u32, CLEAR::Register>),
        (0x0C => @END),
    }
}

type Registers = Mmio<RegisterBlock>;

struct TimerInner {
    registers: Registers,
}

/// The system's periodic tick source, driving the scheduler.
pub struct Timer {
    inner: SpinLock<TimerInner>,
}

impl TimerInner {
    const unsafe fn new(mmio_start_addr: *mut RegisterBlock) -> Self {
        Self {
            // SAFETY: by assumption, the start address is correct
            registers: unsafe { Registers::new(mmio_start_addr) },
        }
    }

    fn init(&mut self, reload: u32) {
        self.registers.LOAD.write(LOAD::VALUE.val(reload));
        self.registers
            .CONTROL
            .write(CONTROL::ENABLE::SET + CONTROL::IRQ_ENABLE::SET);
    }

    fn pending(&mut self) -> bool {
        let fired = self.registers.CLEAR.matches_all(CLEAR::PENDING::SET);
        if fired {
            self.registers.CLEAR.write(CLEAR::PENDING::SET);
        }
        fired
    }
}

/// The interface the core relies on: a tick fires at a fixed period, and
/// `tick_pending` reports (and clears) whether one has fired since it was
/// last read.
pub trait TickSource {
    /// Arms the timer at its configured reload value.
    fn init(&self);
    /// Returns whether a tick has fired since the last call, clearing the
    /// pending flag as a side effect (edge-cleared on read).
    fn tick_pending(&self) -> bool;
}

impl Timer {
    /// # Safety
    /// `start_address` must be the real, sole mapping of the timer's MMIO
    /// window.
    const unsafe fn new(start_address: *mut RegisterBlock) -> Self {
        Self {
            inner: SpinLock::new(
                // SAFETY: forwarded from the caller's safety obligation
                unsafe { TimerInner::new(start_address) },
            ),
        }
    }
}

impl TickSource for Timer {
    fn init(&self) {
        self.inner.lock().init(TICK_RELOAD);
    }

    fn tick_pending(&self) -> bool {
        self.inner.lock().pending()
    }
}

/// Reload value corresponding to the target tick period.
const TICK_RELOAD: u32 = 0x0020_0000;

/// The board's tick source.
// SAFETY: this address is the fixed MMIO location of the timer on the target board.
#[allow(clippy::as_conversions)]
static TIMER: Timer = unsafe { Timer::new(0x4000_0000 as *mut RegisterBlock) };

/// Returns the system-wide tick source.
pub fn tick_source() -> &'static dyn TickSource {
    &TIMER
}
