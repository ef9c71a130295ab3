//! The IRQ entry point: asks the interrupt controller which peripheral
//! fired, then hands off to the tick source's scheduling effect or the
//! serial port's RX/TX servicing.
use crate::architecture::exception::Guard;
use crate::architecture::trap_frame::TrapFrame;
use crate::board::{self, InterruptController, SerialPort, Source, TickSource};
use crate::kernel::{blocking, io, scheduler};

fn service_serial(guard: &Guard) {
    let serial = board::serial();
    if serial.rx_available() {
        if let Some(byte) = serial.read_byte() {
            io::push_input(byte, guard);
            if !io::input_is_empty(guard) {
                blocking::wake_all_input_waiters(guard);
            }
            blocking::wake_one_char_waiter(guard);
        }
    }
    if serial.tx_writable() {
        io::service_output(guard);
    }
}

/// Called by the architecture's IRQ vector for every interrupt taken in IRQ
/// mode.
pub fn handle(frame: &mut TrapFrame) {
    let guard = Guard::new();
    match board::interrupt_controller().pending() {
        Some(Source::Timer) => {
            if board::tick_source().tick_pending() {
                scheduler::tick(frame, &guard);
            }
        }
        Some(Source::Serial) => service_serial(&guard),
        None => {}
    }
}
