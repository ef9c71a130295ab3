//! Architecture-specific (32-bit ARM) glue: the exception vector table, the
//! interrupt-mask `Guard`, the interrupt trap frame, and the opaque
//! processor-control primitives the rest of the kernel treats as external
//! collaborators (mode switching, cache/TLB maintenance, coprocessor access).
pub mod exception;
mod exception_handlers;
pub mod mmu;
pub mod trap_frame;

use crate::{board, call_once};

pub fn init() {
    call_once!();
    exception::init();
    board::init();
}
