//! Parsing of the lines typed into the terminal.

use std::fmt::{self, Display};
use std::path::PathBuf;

/// A line typed by the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Lists the threads.
    Threads,
    /// Opens a thread.
    Open(String),
    /// Starts a new thread.
    New,
    /// Leaves the current thread.
    Back,
    /// Deletes a thread, after asking for confirmation.
    Delete(String),
    /// Attaches a file to the next message.
    Attach(PathBuf),
    /// Drops the files attached so far.
    Detach,
    /// Sends the last failed message again.
    Retry,
    /// Prints the commands.
    Help,
    /// Exits.
    Quit,
    /// Sends a message.
    Send(String),
}

/// Usage of every command, one per line.
pub const HELP: &str = "\
/threads         list the threads
/open <id>       open a thread
/new             start a new thread
/back            leave the current thread
/delete <id>     delete a thread
/attach <path>   attach a pdf, ppt or pptx file to the next message
/detach          drop the attached files
/retry           send the last failed message again
/help            show this help
/quit            exit
Anything else is sent as a message.";

/// Error returned by [`parse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParseError {
    /// The command doesn't exist.
    Unknown(String),
    /// The command needs an argument.
    MissingArgument(&'static str),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unknown(name) => {
                write!(f, "unknown command /{name}, try /help")
            }
            ParseError::MissingArgument(name) => {
                write!(f, "/{name} needs an argument")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a line, `None` if there is nothing in it.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(line) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_owned())));
    };

    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };
    let required = |name: &'static str| {
        if arg.is_empty() {
            Err(ParseError::MissingArgument(name))
        } else {
            Ok(arg.to_owned())
        }
    };

    let cmd = match name {
        "threads" | "ls" => Command::Threads,
        "open" => Command::Open(required("open")?),
        "new" => Command::New,
        "back" => Command::Back,
        "delete" | "rm" => Command::Delete(required("delete")?),
        "attach" => Command::Attach(required("attach")?.into()),
        "detach" => Command::Detach,
        "retry" => Command::Retry,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(name.to_owned())),
    };
    Ok(Some(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(parse("  \n"), Ok(None));
        assert_eq!(
            parse("Schedule my classes\n"),
            Ok(Some(Command::Send("Schedule my classes".to_owned())))
        );
        assert_eq!(parse("/threads"), Ok(Some(Command::Threads)));
        assert_eq!(
            parse("/open  thread-1 "),
            Ok(Some(Command::Open("thread-1".to_owned())))
        );
        assert_eq!(
            parse("/attach /tmp/My Syllabus.pdf"),
            Ok(Some(Command::Attach("/tmp/My Syllabus.pdf".into())))
        );
        assert_eq!(parse("/exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("/delete"),
            Err(ParseError::MissingArgument("delete"))
        );
        assert_eq!(
            parse("/frobnicate x"),
            Err(ParseError::Unknown("frobnicate".to_owned()))
        );
        assert_eq!(
            ParseError::MissingArgument("open").to_string(),
            "/open needs an argument"
        );
    }
}
