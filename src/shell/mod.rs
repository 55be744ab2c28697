//! Shell-style argument handling.
//!
//! Agent CLIs are configured with human-entered strings (`"--model opus"`,
//! `"C:\Tools\agent.cmd"`). This module turns those into argv vectors,
//! quotes argv back into command strings for `-c` style shell invocations
//! and resolves command names to executables.

mod args;
mod which;

pub use args::{
    parse_command_argv, parse_shell_args, parse_shell_args_for, quote_posix, quote_windows,
    Platform,
};
pub use which::CommandResolver;
