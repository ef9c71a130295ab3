#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use crate::{architecture, log};

    log!("PANIC: {}", info);

    architecture::mmu::shutdown(1);
}
