//! The software-interrupt dispatcher: decodes the call number out of the
//! trapping SVC instruction and runs the matching handler. Arguments and
//! results travel in the trap frame's r7..r10 slots.
use crate::architecture::exception::Guard;
use crate::architecture::trap_frame::TrapFrame;
use crate::kernel::thread::{R0, R1};
use crate::kernel::{blocking, io, scheduler, thread};
use crate::log;
use crate::memory::address_space;

const STR_WRITE: u8 = 0x10;
const STR_READ: u8 = 0x11;
const STR_READ_FLUSH: u8 = 0x12;
const GETC: u8 = 0x1A;
const YIELD: u8 = 0x20;
const EXIT: u8 = 0x21;
const CREATE: u8 = 0x22;
const SLEEP: u8 = 0x23;
const MEM_MAP: u8 = 0x30;

/// Milliseconds per timer tick, used to convert SLEEP's millisecond argument
/// into the tick countdown the blocking machinery tracks.
pub const MS_PER_TICK: u32 = 10;

/// Virtual addresses below this are refused by MEM_MAP; everything at or
/// above it is available for on-demand heap growth.
const USER_HEAP_THRESHOLD: u32 = 0x2000_0000;

/// Copies `len` bytes out of the caller's own address space. Sound only
/// while the caller's section table is still the one loaded in the MMU,
/// i.e. before this syscall parks or switches away — which is exactly the
/// window every read-from-user call here runs in. The kernel does not
/// otherwise validate that `buf` names mapped, readable memory.
unsafe fn read_user_bytes(buf: u32, len: usize, out: &mut [u8]) {
    let len = len.min(out.len());
    // SAFETY: forwarded from the caller's obligation described above
    let src = unsafe { core::slice::from_raw_parts(buf as *const u8, len) };
    out[..len].copy_from_slice(src);
}

/// Copies bytes into the caller's own address space, under the same
/// conditions as [`read_user_bytes`].
unsafe fn write_user_bytes(buf: u32, bytes: &[u8]) {
    // SAFETY: forwarded from the caller's obligation described above
    let dst = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, bytes.len()) };
    dst.copy_from_slice(bytes);
}

fn str_write(frame: &mut TrapFrame, guard: &Guard) {
    let buf = frame.svc_arg(0);
    let len = frame.svc_arg(1) as usize;
    let mut chunk = [0_u8; 256];
    // SAFETY: no suspension point has been crossed since entry
    unsafe {
        read_user_bytes(buf, len, &mut chunk);
    }
    let enqueued = io::enqueue_output(&chunk[..len.min(chunk.len())], guard);
    frame.set_svc_result(enqueued as u32);
}

fn str_read(frame: &mut TrapFrame, guard: &Guard) {
    let buf = frame.svc_arg(0);
    let len = frame.svc_arg(1) as usize;
    let mut chunk = [0_u8; 256];
    let read = io::drain_input(&mut chunk[..len.min(chunk.len())], guard);
    if read == 0 && len > 0 {
        let caller = scheduler::current_id(guard);
        blocking::block_on_input(caller, guard);
        frame.restart_svc();
        scheduler::reschedule(frame, guard);
        return;
    }
    // SAFETY: no suspension point has been crossed since entry
    unsafe {
        write_user_bytes(buf, &chunk[..read]);
    }
    frame.set_svc_result(read as u32);
}

fn getc(frame: &mut TrapFrame, guard: &Guard) {
    let mut byte = [0_u8; 1];
    if io::drain_input(&mut byte, guard) == 1 {
        frame.set_svc_result(byte[0].into());
        return;
    }
    let caller = scheduler::current_id(guard);
    blocking::block_on_char(caller, guard);
    frame.restart_svc();
    scheduler::reschedule(frame, guard);
}

fn sleep(frame: &mut TrapFrame, guard: &Guard) {
    let ms = frame.svc_arg(0);
    let ticks = ms.div_ceil(MS_PER_TICK);
    if ticks == 0 {
        frame.set_svc_result(0);
        return;
    }
    let caller = scheduler::current_id(guard);
    blocking::block_on_sleep(caller, ticks, guard);
    scheduler::reschedule(frame, guard);
}

fn create(frame: &mut TrapFrame, guard: &Guard) {
    let entry = frame.svc_arg(0);
    let is_task = frame.svc_arg(1) != 0;
    let arg0 = frame.svc_arg(2);
    let arg1 = frame.svc_arg(3);
    let caller = scheduler::current_id(guard);

    let Some(child) = thread::create(entry, caller, is_task, false, guard) else {
        frame.set_svc_result(0);
        return;
    };
    let child_tcb = thread::get_mut(child, guard);
    child_tcb.registers[R0] = arg0;
    child_tcb.registers[R1] = arg1;
    thread::activate(child, guard);
    frame.set_svc_result(child.into());
}

fn mem_map(frame: &mut TrapFrame, guard: &Guard) {
    let virt = frame.svc_arg(0);
    if virt < USER_HEAP_THRESHOLD {
        frame.set_svc_result(0);
        return;
    }
    let caller = scheduler::current_id(guard);
    let ttb = thread::get(caller, guard).ttb;
    let mapped = address_space::map_any(ttb, virt, true, true, guard);
    frame.set_svc_result(u32::from(mapped));
}

/// Decodes and runs the system call named by `frame`'s trapping instruction.
pub fn dispatch(frame: &mut TrapFrame) {
    let guard = Guard::new();
    match frame.svc_call_number() {
        STR_WRITE => str_write(frame, &guard),
        STR_READ => str_read(frame, &guard),
        STR_READ_FLUSH => io::flush_input(&guard),
        GETC => getc(frame, &guard),
        YIELD => scheduler::reschedule(frame, &guard),
        EXIT => {
            let caller = scheduler::current_id(&guard);
            thread::exit(caller, frame.svc_arg(0) as i32, &guard);
            scheduler::reschedule(frame, &guard);
        }
        CREATE => create(frame, &guard),
        SLEEP => sleep(frame, &guard),
        MEM_MAP => mem_map(frame, &guard),
        other => log!("Unknown system call 0x{:02X}; caller resumed unchanged", other),
    }
}
