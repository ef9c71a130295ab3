/// Represents the privilege level of some execution context.
#[derive(PartialEq, Debug)]
pub enum PrivilegeLevel {
    /// Unprivileged user mode.
    User,
    /// The kernel's own privilege level.
    Kernel,
    /// A privilege level above the kernel's; unused on this target.
    Hypervisor,
    /// A mode this kernel doesn't recognize.
    Unknown,
}
