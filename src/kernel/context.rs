//! Context switch: copying the live register state between a trap frame and
//! a thread's TCB, and pointing the MMU at the thread being switched to.
//! [`crate::kernel::scheduler`] is the only caller.
use crate::architecture::exception::Guard;
use crate::architecture::mmu;
use crate::architecture::trap_frame::TrapFrame;
use crate::kernel::thread::{self, LR, PC, SP, SPSR};

/// Copies the trap frame's register state into `id`'s TCB.
pub fn save(id: u8, frame: &TrapFrame, guard: &Guard) {
    let tcb = thread::get_mut(id, guard);
    tcb.registers[0..4].copy_from_slice(&frame.r0_r3);
    tcb.registers[4..11].copy_from_slice(&frame.r4_r10);
    tcb.registers[11] = frame.r11;
    tcb.registers[12] = frame.r12;
    tcb.registers[SP] = frame.banked_sp;
    tcb.registers[PC] = frame.return_address;
    tcb.registers[LR] = frame.banked_lr;
    tcb.registers[SPSR] = frame.spsr;
}

/// Copies `id`'s saved registers into the trap frame and switches the MMU
/// over to its address space.
pub fn restore(id: u8, frame: &mut TrapFrame, guard: &Guard) {
    let tcb = thread::get(id, guard);
    frame.r0_r3.copy_from_slice(&tcb.registers[0..4]);
    frame.r4_r10.copy_from_slice(&tcb.registers[4..11]);
    frame.r11 = tcb.registers[11];
    frame.r12 = tcb.registers[12];
    frame.banked_sp = tcb.registers[SP];
    frame.return_address = tcb.registers[PC];
    frame.banked_lr = tcb.registers[LR];
    frame.spsr = tcb.registers[SPSR];

    mmu::set_translation_table_base(tcb.ttb.into());
    mmu::invalidate_tlb();
    mmu::invalidate_caches();
    // SAFETY: the translation table base register now points at `id`'s
    // section table, which `thread::create` fully populated before this
    // thread could ever be scheduled
    unsafe {
        mmu::enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> Guard {
        Guard::new()
    }

    #[test]
    fn save_then_restore_round_trips_general_registers() {
        let guard = guard();
        let id = thread::create(0x8000, 0, false, false, &guard).unwrap();

        let mut frame = TrapFrame::default();
        frame.r0_r3 = [1, 2, 3, 4];
        frame.r4_r10 = [5, 6, 7, 8, 9, 10, 11];
        frame.r11 = 12;
        frame.r12 = 13;
        frame.banked_sp = 0x9000;
        frame.return_address = 0x8004;
        frame.banked_lr = 0x8008;
        frame.spsr = 0x10;
        save(id, &frame, &guard);

        let mut restored = TrapFrame::default();
        restore(id, &mut restored, &guard);
        assert_eq!(restored.r0_r3, frame.r0_r3);
        assert_eq!(restored.r4_r10, frame.r4_r10);
        assert_eq!(restored.r11, frame.r11);
        assert_eq!(restored.r12, frame.r12);
        assert_eq!(restored.banked_sp, frame.banked_sp);
        assert_eq!(restored.return_address, frame.return_address);
        assert_eq!(restored.banked_lr, frame.banked_lr);
        assert_eq!(restored.spsr, frame.spsr);

        thread::exit(id, 0, &guard);
    }
}
