//! Line-oriented operator commands.
//!
//! One command per line, whitespace separated, case-sensitive keywords:
//!
//! ```text
//! create-server <name> <min> <max>      createserver <min> <max> <name>
//! create-worker <server>                createprocess <server>
//! abort-server  <server>                abortserver <server>
//! abort-worker  <server>                abortprocess <server>
//! status                                displaystatus
//! help | -help
//! quit | exit
//! ```
//!
//! The right-hand keywords are accepted for compatibility and keep their
//! original argument order. Numbers are parsed as signed integers so that
//! negative bounds reach the supervisor and fail there with `InvalidBounds`.

use thiserror::Error;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a server with worker bounds.
    CreateServer {
        /// Server name.
        name: String,
        /// Minimum workers.
        min: i64,
        /// Maximum workers.
        max: i64,
    },
    /// Add one worker to a server.
    CreateWorker {
        /// Server name.
        server: String,
    },
    /// Tear a server down.
    AbortServer {
        /// Server name.
        server: String,
    },
    /// Remove one worker from a server.
    AbortWorker {
        /// Server name.
        server: String,
    },
    /// Print the status report.
    Status,
    /// Print the command list.
    Help,
    /// Shut down and exit.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown keyword.
    #[error("invalid command {0:?}; type help for a list of commands")]
    UnknownCommand(String),

    /// Too few arguments.
    #[error("usage: {command} {usage}")]
    MissingArgument {
        /// Keyword as typed.
        command: String,
        /// Expected arguments.
        usage: &'static str,
    },

    /// Too many arguments.
    #[error("usage: {command} {usage}")]
    UnexpectedArgument {
        /// Keyword as typed.
        command: String,
        /// Expected arguments.
        usage: &'static str,
    },

    /// A bound is not an integer.
    #[error("{command}: {value:?} is not a number")]
    InvalidNumber {
        /// Keyword as typed.
        command: String,
        /// Offending token.
        value: String,
    },
}

/// Command list printed by `help`.
pub const HELP: &str = "\
Commands list:
  create-server <name> <min> <max>   start a server keeping min..=max workers
  create-worker <server>             add one worker
  abort-server <server>              stop every worker, then the server
  abort-worker <server>              stop the most recently created worker
  status                             show servers and worker counts
  help                               show this list
  quit                               stop every server and exit

Also accepted:
  createserver <min> <max> <name>
  createprocess <server>
  abortserver <server>
  abortprocess <server>
  displaystatus";

const SERVER_USAGE: &str = "<server>";

/// Parses one input line. Blank lines yield `Ok(None)`.
///
/// # Example
/// ```
/// use poolvisor::command::{Command, parse};
///
/// assert_eq!(
///     parse("createserver 1 3 web").unwrap(),
///     Some(Command::CreateServer { name: "web".into(), min: 1, max: 3 })
/// );
/// assert_eq!(parse("   ").unwrap(), None);
/// ```
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let mut tokens = line.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = tokens.collect();

    let command = match keyword {
        "create-server" => {
            let [name, min, max] = exact(keyword, &args, "<name> <min> <max>")?;
            Command::CreateServer {
                name: name.to_string(),
                min: number(keyword, min)?,
                max: number(keyword, max)?,
            }
        }
        "createserver" => {
            let [min, max, name] = exact(keyword, &args, "<min> <max> <name>")?;
            Command::CreateServer {
                name: name.to_string(),
                min: number(keyword, min)?,
                max: number(keyword, max)?,
            }
        }
        "create-worker" | "createprocess" => {
            let [server] = exact(keyword, &args, SERVER_USAGE)?;
            Command::CreateWorker {
                server: server.to_string(),
            }
        }
        "abort-server" | "abortserver" => {
            let [server] = exact(keyword, &args, SERVER_USAGE)?;
            Command::AbortServer {
                server: server.to_string(),
            }
        }
        "abort-worker" | "abortprocess" => {
            let [server] = exact(keyword, &args, SERVER_USAGE)?;
            Command::AbortWorker {
                server: server.to_string(),
            }
        }
        "status" | "displaystatus" => {
            exact::<0>(keyword, &args, "")?;
            Command::Status
        }
        "help" | "-help" | "--help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn exact<'a, const N: usize>(
    command: &str,
    args: &[&'a str],
    usage: &'static str,
) -> Result<[&'a str; N], ParseError> {
    if args.len() > N {
        return Err(ParseError::UnexpectedArgument {
            command: command.to_string(),
            usage,
        });
    }
    <[&'a str; N]>::try_from(args).map_err(|_| ParseError::MissingArgument {
        command: command.to_string(),
        usage,
    })
}

fn number(command: &str, value: &str) -> Result<i64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        command: command.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_server_argument_orders() {
        let expected = Some(Command::CreateServer {
            name: "web".into(),
            min: 1,
            max: 3,
        });
        assert_eq!(parse("create-server web 1 3").unwrap(), expected);
        assert_eq!(parse("createserver 1 3 web\n").unwrap(), expected);
    }

    #[test]
    fn test_negative_bounds_are_parsed() {
        assert_eq!(
            parse("create-server web -1 3").unwrap(),
            Some(Command::CreateServer {
                name: "web".into(),
                min: -1,
                max: 3
            })
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            parse("createprocess web").unwrap(),
            Some(Command::CreateWorker {
                server: "web".into()
            })
        );
        assert_eq!(
            parse("abortprocess web").unwrap(),
            Some(Command::AbortWorker {
                server: "web".into()
            })
        );
        assert_eq!(
            parse("abortserver web").unwrap(),
            Some(Command::AbortServer {
                server: "web".into()
            })
        );
        assert_eq!(parse("displaystatus").unwrap(), Some(Command::Status));
        assert_eq!(parse("-help").unwrap(), Some(Command::Help));
        assert_eq!(parse("quit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            parse("Status"),
            Err(ParseError::UnknownCommand("Status".into()))
        );
    }

    #[test]
    fn test_argument_errors() {
        assert!(matches!(
            parse("create-worker"),
            Err(ParseError::MissingArgument { .. })
        ));
        assert!(matches!(
            parse("abort-server a b"),
            Err(ParseError::UnexpectedArgument { .. })
        ));
        assert!(matches!(
            parse("status now"),
            Err(ParseError::UnexpectedArgument { .. })
        ));
        assert_eq!(
            parse("create-server web one 3"),
            Err(ParseError::InvalidNumber {
                command: "create-server".into(),
                value: "one".into()
            })
        );
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse(" \t ").unwrap(), None);
    }
}
