//! Client line grammar.
//!
//! Every line an active session sends is either blank, plain chat text, or
//! a command introduced by [`COMMAND_MARKER`]. The first token selects the
//! command; matching is exact and case-insensitive on that token only.
//!
//! | line                        | parsed as                    |
//! |-----------------------------|------------------------------|
//! | `hello there`               | `Input::Chat`                |
//! | `/users`                    | `Command::ListUsers`         |
//! | `/private bob see you soon` | `Command::Private`           |
//! | `/private bob`              | `Command::MissingArguments`  |
//! | `/quit`                     | `Command::Quit`              |
//! | `/help`                     | `Command::Help`              |
//! | `/dance`                    | `Command::Unknown`           |

/// Prefix that turns a line into a command.
pub const COMMAND_MARKER: char = '/';

/// Usage string for the private message command.
pub const PRIVATE_USAGE: &str = "/private <username> <message>";

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Empty or whitespace-only line. Ignored while active.
    Blank,
    /// Plain chat text, broadcast verbatim.
    Chat(String),
    /// A line starting with the command marker.
    Command(Command),
}

/// The closed set of commands understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/users` - list the online identities.
    ListUsers,
    /// `/private <target> <body...>` - directed message.
    Private { target: String, body: String },
    /// `/quit` - leave the chat.
    Quit,
    /// `/help` - show the command summary.
    Help,
    /// A known command given without its required arguments.
    MissingArguments { usage: &'static str },
    /// Anything else starting with the command marker; carries the token.
    Unknown(String),
}

impl Command {
    /// Parses a line that starts with the command marker.
    fn parse(line: &str) -> Self {
        let (token, args) = match line.split_once(char::is_whitespace) {
            Some((token, args)) => (token, args.trim_start()),
            None => (line, ""),
        };

        match token.to_lowercase().as_str() {
            "/users" => Self::ListUsers,
            "/private" => parse_private(args),
            "/quit" => Self::Quit,
            "/help" => Self::Help,
            _ => Self::Unknown(token.to_string()),
        }
    }
}

fn parse_private(args: &str) -> Command {
    let Some((target, body)) = args.split_once(char::is_whitespace) else {
        return Command::MissingArguments {
            usage: PRIVATE_USAGE,
        };
    };

    let body = body.trim_start();
    if target.is_empty() || body.trim().is_empty() {
        return Command::MissingArguments {
            usage: PRIVATE_USAGE,
        };
    }

    Command::Private {
        target: target.to_string(),
        body: body.to_string(),
    }
}

/// Parses one client line (without its line terminator).
pub fn parse_line(line: &str) -> Input {
    if line.trim().is_empty() {
        return Input::Blank;
    }

    if line.starts_with(COMMAND_MARKER) {
        Input::Command(Command::parse(line))
    } else {
        Input::Chat(line.to_string())
    }
}
