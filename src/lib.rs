#![no_main]
#![no_std]
#![feature(custom_test_frameworks)]
#![feature(format_args_nl)]
#![reexport_test_harness_main = "test_main"]
#![test_runner(test_runner)]

pub mod architecture;
pub mod board;
pub mod cell;
pub mod kernel;
pub mod macros;
pub mod memory;
pub mod sync;

/// The runner for the crate's custom test framework. `#[test]` needs `std`
/// and a process-exit convention this `no_std`/`no_main` target doesn't have,
/// so host-runnable unit tests that don't need a live interrupt source or
/// trap frame use ordinary `#[cfg(test)] mod tests` blocks instead; this
/// runner is for the `tests/` integration binaries that boot under QEMU.
pub fn test_runner(tests: &[&TestCase]) -> ! {
    for (i, test) in tests.iter().enumerate() {
        println!("[{}/{}] {}:", i + 1, tests.len(), test.name);
        (test.test)();
        println!(".... PASSED");
    }

    architecture::mmu::shutdown(0);
}

/// Registers a test to the given name.
#[macro_export]
macro_rules! add_test {
    ($name: ident, $test: block) => {
        #[test_case]
        const $name: $crate::TestCase = $crate::TestCase {
            name: stringify!($name),
            test: || $test,
        };
    };
}

/// A test run under the crate's custom `no_std` test harness.
pub struct TestCase {
    /// Name of the test.
    pub name: &'static str,
    /// Function pointer to the test.
    pub test: fn(),
}

#[cfg(test)]
#[no_mangle]
fn kernel_main() {
    test_main();
}
