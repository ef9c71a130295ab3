//! The serial debug port. Out of scope for this crate's core beyond the four
//! operations it exposes: readiness signals and single-byte transfer. The
//! core owns the RX/TX ring buffers; this driver only shuttles bytes to and
//! from the wire.
use crate::board::Mmio;
use crate::sync::SpinLock;
use core::fmt;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

register_bitfields! {
    u32,
    DR [
        DATA OFFSET(0) NUMBITS(8)
    ],
    /// Flag register: FIFO occupancy.
    FR [
        TXFF OFFSET(5) NUMBITS(1),
        RXFE OFFSET(4) NUMBITS(1)
    ],
    IMSC [
        TXIM OFFSET(5) NUMBITS(1),
        RXIM OFFSET(4) NUMBITS(1)
    ],
    MIS [
        TXMIS OFFSET(5) NUMBITS(1),
        RXMIS OFFSET(4) NUMBITS(1)
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x00 => DR: ReadWrite<u32, DR::Register>),
        (0x04 => _reserved),
        (0x18 => FR: ReadOnly<u32, FR::Register>),
        (0x1C => _reserved2),
        (0x38 => IMSC: ReadWrite<u32, IMSC::Register>),
        (0x3C => _reserved3),
        (0x40 => MIS: ReadOnly<u32, MIS::Register>),
        (0x44 => @END),
    }
}

type Registers = Mmio<RegisterBlock>;

struct SerialInner {
    registers: Registers,
}

/// The system's serial debug port.
pub struct Serial {
    inner: SpinLock<SerialInner>,
}

impl SerialInner {
    const unsafe fn new(mmio_start_addr: *mut RegisterBlock) -> Self {
        Self {
            // SAFETY: by assumption, the start address is correct
            registers: unsafe { Registers::new(mmio_start_addr) },
        }
    }

    fn init(&mut self) {
        self.registers.IMSC.write(IMSC::RXIM::SET);
    }

    fn rx_available(&self) -> bool {
        !self.registers.FR.matches_all(FR::RXFE::SET)
    }

    fn tx_writable(&self) -> bool {
        !self.registers.FR.matches_all(FR::TXFF::SET)
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx_available()
            .then(|| u8::try_from(self.registers.DR.read(DR::DATA)).unwrap_or(0))
    }

    fn write_byte(&mut self, byte: u8) {
        self.registers.DR.write(DR::DATA.val(byte.into()));
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        if enabled {
            self.registers.IMSC.modify(IMSC::TXIM::SET);
        } else {
            self.registers.IMSC.modify(IMSC::TXIM::CLEAR);
        }
    }
}

impl fmt::Write for SerialInner {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            while !self.tx_writable() {
                core::hint::spin_loop();
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// The interface the core relies on to move bytes to and from the wire.
pub trait SerialPort {
    /// Arms the receive-ready interrupt.
    fn init(&self);
    /// Whether a received byte is waiting in the hardware FIFO.
    fn rx_available(&self) -> bool;
    /// Whether the hardware FIFO has room for another transmitted byte.
    fn tx_writable(&self) -> bool;
    /// Reads one byte, if one is available.
    fn read_byte(&self) -> Option<u8>;
    /// Writes one byte. Caller must have checked `tx_writable` first.
    fn write_byte(&self, byte: u8);
    /// Enables or disables the transmit-ready interrupt. The core enables
    /// this when its output ring becomes non-empty and disables it once
    /// drained.
    fn set_tx_interrupt(&self, enabled: bool);
    /// Writes a formatted string, blocking on FIFO backpressure. Used by the
    /// kernel's own `print!`/`log!` macros, not by the STR_WRITE syscall path.
    fn write_fmt(&self, args: fmt::Arguments);
}

impl Serial {
    /// # Safety
    /// `start_address` must be the real, sole mapping of the serial port's
    /// MMIO window.
    const unsafe fn new(start_address: *mut RegisterBlock) -> Self {
        Self {
            inner: SpinLock::new(
                // SAFETY: forwarded from the caller's safety obligation
                unsafe { SerialInner::new(start_address) },
            ),
        }
    }
}

impl SerialPort for Serial {
    fn init(&self) {
        self.inner.lock().init();
    }

    fn rx_available(&self) -> bool {
        self.inner.lock().rx_available()
    }

    fn tx_writable(&self) -> bool {
        self.inner.lock().tx_writable()
    }

    fn read_byte(&self) -> Option<u8> {
        self.inner.lock().read_byte()
    }

    fn write_byte(&self, byte: u8) {
        self.inner.lock().write_byte(byte);
    }

    fn set_tx_interrupt(&self, enabled: bool) {
        self.inner.lock().set_tx_interrupt(enabled);
    }

    fn write_fmt(&self, args: fmt::Arguments) {
        use fmt::Write;
        self.inner
            .lock()
            .write_fmt(args)
            .expect("writing to the serial port should not fail");
    }
}

/// The board's serial debug port.
// SAFETY: this address is the fixed MMIO location of the serial port on the target board.
#[allow(clippy::as_conversions)]
static SERIAL: Serial = unsafe { Serial::new(0x4000_1000 as *mut RegisterBlock) };

/// Returns the system-wide serial connection.
pub fn serial() -> &'static dyn SerialPort {
    &SERIAL
}
