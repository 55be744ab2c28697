//! Parse command implementation

use anyhow::Result;

use ptydeck::shell::{parse_command_argv, parse_shell_args_for, Platform};

/// Tokenize `input` the way provider overrides are tokenized
pub fn parse_command(input: &str, windows: bool, argv0: bool) -> Result<()> {
    let platform = if windows {
        Platform::Windows
    } else {
        Platform::Posix
    };

    let tokens = if argv0 {
        parse_command_argv(input, platform)
    } else {
        parse_shell_args_for(input, platform)
    };

    println!("{}", serde_json::to_string(&tokens)?);
    Ok(())
}
