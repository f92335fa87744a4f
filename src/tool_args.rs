//! Type-safe tool argument contracts.
//!
//! External tools (`btrfs`, `rsync`) are never invoked with ad-hoc string
//! vectors. Each invocation is a struct or enum implementing [`ToolArgs`],
//! so flag spelling lives in exactly one place and is covered by tests.

/// Trait for typed external tool invocations.
///
/// # Contract
///
/// - `program()`: the executable name, resolved through `PATH`.
/// - `to_cli_args()`: arguments exactly as the tool expects them.
pub trait ToolArgs {
    /// Executable name (e.g., `"btrfs"`).
    fn program(&self) -> &'static str;

    /// Convert fields to CLI arguments.
    fn to_cli_args(&self) -> Vec<String>;

    /// One-line rendering for logs.
    fn display_command(&self) -> String {
        let mut parts = vec![self.program().to_string()];
        parts.extend(self.to_cli_args());
        parts.join(" ")
    }
}
