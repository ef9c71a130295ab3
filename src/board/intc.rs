//! The interrupt controller. Out of scope for the core beyond the
//! acknowledge/enable operations the interrupt entry path calls.
use crate::board::Mmio;
use crate::sync::SpinLock;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::ReadWrite,
};

register_bitfields! {
    u32,
    ENABLE [
        TIMER OFFSET(0) NUMBITS(1),
        SERIAL OFFSET(1) NUMBITS(1)
    ],
    PENDING [
        TIMER OFFSET(0) NUMBITS(1),
        SERIAL OFFSET(1) NUMBITS(1)
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => ENABLE: ReadWrite<u32, ENABLE::Register>),
        (0x04 => PENDING: ReadWrite<u32, PENDING::Register>),
        (0x08 => @END),
    }
}

type Registers = Mmio<RegisterBlock>;

struct ControllerInner {
    registers: Registers,
}

/// The system's interrupt controller.
pub struct Controller {
    inner: SpinLock<ControllerInner>,
}

/// Which peripheral raised the current interrupt, as reported by the
/// controller's pending-source register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The periodic tick source.
    Timer,
    /// The serial debug port.
    Serial,
}

impl ControllerInner {
    const unsafe fn new(mmio_start_addr: *mut RegisterBlock) -> Self {
        Self {
            // SAFETY: by assumption, the start address is correct
            registers: unsafe { Registers::new(mmio_start_addr) },
        }
    }

    fn init(&mut self) {
        self.registers
            .ENABLE
            .write(ENABLE::TIMER::SET + ENABLE::SERIAL::SET);
    }

    fn pending(&self) -> Option<Source> {
        if self.registers.PENDING.matches_all(PENDING::TIMER::SET) {
            Some(Source::Timer)
        } else if self.registers.PENDING.matches_all(PENDING::SERIAL::SET) {
            Some(Source::Serial)
        } else {
            None
        }
    }
}

/// The interface the core relies on to learn which peripheral interrupted.
pub trait InterruptController {
    /// Unmasks the timer and serial interrupt lines.
    fn init(&self);
    /// Returns the highest-priority pending source, if any.
    fn pending(&self) -> Option<Source>;
}

impl Controller {
    /// # Safety
    /// `start_address` must be the real, sole mapping of the controller's
    /// MMIO window.
    const unsafe fn new(start_address: *mut RegisterBlock) -> Self {
        Self {
            inner: SpinLock::new(
                // SAFETY: forwarded from the caller's safety obligation
                unsafe { ControllerInner::new(start_address) },
            ),
        }
    }
}

impl InterruptController for Controller {
    fn init(&self) {
        self.inner.lock().init();
    }

    fn pending(&self) -> Option<Source> {
        self.inner.lock().pending()
    }
}

/// The board's interrupt controller.
// SAFETY: this address is the fixed MMIO location of the controller on the target board.
#[allow(clippy::as_conversions)]
static CONTROLLER: Controller = unsafe { Controller::new(0x4000_2000 as *mut RegisterBlock) };

/// Returns the system-wide interrupt controller.
pub fn interrupt_controller() -> &'static dyn InterruptController {
    &CONTROLLER
}
