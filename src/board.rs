//! Peripheral drivers: the system timer, the interrupt controller, and the
//! serial debug port. These are external collaborators of the kernel core —
//! the core only ever calls the narrow trait surface re-exported here.
mod intc;
mod mmio;
mod serial;
mod timer;

pub use intc::{interrupt_controller, InterruptController, Source};
pub use mmio::Mmio;
pub use serial::{serial, SerialPort};
pub use timer::{tick_source, TickSource};

use crate::call_once;

/// Board-specific bring-up: arms the tick source and unmasks the serial
/// receive interrupt at the controller.
pub fn init() {
    call_once!();
    tick_source().init();
    serial().init();
    interrupt_controller().init();
}
