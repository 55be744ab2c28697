//! Tokenizer for command strings entered in settings.

use once_cell::sync::Lazy;
use regex::Regex;

/// Quoting dialect used when splitting a command string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Backslash escapes the next character outside single quotes.
    Posix,
    /// Backslashes are path separators and only escape `"` inside double quotes.
    Windows,
}

impl Platform {
    /// The dialect of the host the process is running on.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split `input` into arguments using the host platform's rules.
pub fn parse_shell_args(input: &str) -> Vec<String> {
    parse_shell_args_for(input, Platform::current())
}

/// Split `input` into arguments using an explicit quoting dialect.
///
/// Unterminated quotes are tolerated: the partial token is returned and a
/// warning is logged. A trailing lone backslash is kept literally.
pub fn parse_shell_args_for(input: &str, platform: Platform) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match (platform, chars.peek().copied()) {
                    (Platform::Posix, Some(next)) => {
                        chars.next();
                        current.push(next);
                    }
                    (Platform::Windows, Some('"')) => {
                        chars.next();
                        current.push('"');
                    }
                    _ => current.push('\\'),
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                c if c.is_whitespace() => {
                    if in_token {
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '\'' => {
                    quote = Quote::Single;
                    in_token = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_token = true;
                }
                '\\' => {
                    in_token = true;
                    match (platform, chars.peek().copied()) {
                        (Platform::Posix, Some(next)) => {
                            chars.next();
                            current.push(next);
                        }
                        _ => current.push('\\'),
                    }
                }
                _ => {
                    in_token = true;
                    current.push(c);
                }
            },
        }
    }

    if quote != Quote::None {
        tracing::warn!(input, "Unterminated quote in shell arguments; using best-effort split");
    }
    if in_token {
        args.push(current);
    }

    args
}

static DRIVE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]:[\\/]").unwrap());
static UNC_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\\\[^\\/]+[\\/]").unwrap());

fn is_absolute_like(path: &str) -> bool {
    path.starts_with('/') || DRIVE_PATH.is_match(path) || UNC_PATH.is_match(path)
}

/// Split a full command string whose first element is an executable path.
///
/// Drive-letter and UNC paths survive verbatim when they contain no
/// whitespace, a single layer of matching quotes around an absolute path
/// with spaces is removed, and anything else goes through the general
/// parser.
pub fn parse_command_argv(input: &str, platform: Platform) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let has_whitespace = trimmed.chars().any(char::is_whitespace);
    if !has_whitespace && (DRIVE_PATH.is_match(trimmed) || UNC_PATH.is_match(trimmed)) {
        return vec![trimmed.to_string()];
    }

    for q in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(q) && trimmed.ends_with(q) {
            let inner = &trimmed[1..trimmed.len() - 1];
            if !inner.contains(q)
                && inner.chars().any(char::is_whitespace)
                && is_absolute_like(inner)
            {
                return vec![inner.to_string()];
            }
        }
    }

    parse_shell_args_for(trimmed, platform)
}

/// Quote an argument for a POSIX shell command string.
pub fn quote_posix(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Quote an argument for a `cmd.exe` command line.
pub fn quote_windows(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }
}
