//! The serial RX/TX ring buffers backing the STR_WRITE/STR_READ/STR_READ_FLUSH
//! system calls. The driver only ever sees one byte at a time; these rings
//! are what lets a caller hand over (or ask for) more than that.
use crate::architecture::exception::Guard;
use crate::board::{self, SerialPort};
use crate::cell::Protected;

const CAPACITY: usize = 256;

struct Ring {
    buf: [u8; CAPACITY],
    head: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Self {
            buf: [0; CAPACITY],
            head: 0,
            len: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.len == CAPACITY {
            return false;
        }
        self.buf[(self.head + self.len) % CAPACITY] = byte;
        self.len += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % CAPACITY;
        self.len -= 1;
        Some(byte)
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

static INPUT: Protected<Ring> = Protected::new(Ring::new());
static OUTPUT: Protected<Ring> = Protected::new(Ring::new());

/// Enqueues as many of `bytes` as fit into the output ring and arms the
/// transmit-ready interrupt. Returns the count actually enqueued; never
/// blocks.
pub fn enqueue_output(bytes: &[u8], guard: &Guard) -> usize {
    let ring = OUTPUT.get_mut(guard);
    let mut count = 0;
    for &byte in bytes {
        if !ring.push(byte) {
            break;
        }
        count += 1;
    }
    if count > 0 {
        board::serial().set_tx_interrupt(true);
    }
    count
}

/// Drains up to `buf.len()` bytes from the input ring. Returns the count
/// actually copied.
pub fn drain_input(buf: &mut [u8], guard: &Guard) -> usize {
    let ring = INPUT.get_mut(guard);
    let mut count = 0;
    while count < buf.len() {
        let Some(byte) = ring.pop() else { break };
        buf[count] = byte;
        count += 1;
    }
    count
}

/// Whether the input ring currently has nothing buffered.
pub fn input_is_empty(guard: &Guard) -> bool {
    INPUT.get(guard).is_empty()
}

/// Clears the input ring.
pub fn flush_input(guard: &Guard) {
    INPUT.get_mut(guard).clear();
}

/// Appends one received byte to the input ring. Drops it silently if the
/// ring is full; the caller is expected to be reading faster than a full
/// ring implies is possible for this debug port.
pub fn push_input(byte: u8, guard: &Guard) {
    INPUT.get_mut(guard).push(byte);
}

/// Drains the output ring into the wire while the driver reports room,
/// disarming the transmit-ready interrupt once the ring empties. Called
/// from the serial interrupt path.
pub fn service_output(guard: &Guard) {
    let serial = board::serial();
    loop {
        if !serial.tx_writable() {
            return;
        }
        let Some(byte) = OUTPUT.get_mut(guard).pop() else {
            serial.set_tx_interrupt(false);
            return;
        };
        serial.write_byte(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_write_then_read_drains_in_order() {
        let mut ring = Ring::new();
        for byte in 0..8 {
            assert!(ring.push(byte));
        }
        let mut out = [0_u8; 8];
        let mut count = 0;
        while let Some(byte) = ring.pop() {
            out[count] = byte;
            count += 1;
        }
        assert_eq!(count, 8);
        assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn ring_rejects_pushes_past_capacity() {
        let mut ring = Ring::new();
        for _ in 0..CAPACITY {
            assert!(ring.push(0));
        }
        assert!(!ring.push(0));
    }
}
