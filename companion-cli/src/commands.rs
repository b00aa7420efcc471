//! REPL command parsing.
//!
//! Lines starting with `/` are commands; anything else is an utterance for
//! the current domain.

use companion_core::{DomainId, RecordId};
use thiserror::Error;

/// Records shown by `/history` without an argument.
pub const DEFAULT_HISTORY: usize = 10;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send an utterance to the pipeline.
    Say(String),
    /// Switch the current domain.
    Domain(DomainId),
    /// List every domain.
    Domains,
    /// Print the emotion state and tone hint.
    Mood,
    /// Print the last `n` records.
    History(usize),
    /// Delete one record.
    Forget(RecordId),
    /// Print counters and latency.
    Stats,
    /// Print the command list.
    Help,
    /// Leave the REPL.
    Quit,
    /// Blank line.
    Empty,
}

/// Why a line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown `/command`.
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
    /// A required argument is missing.
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    /// An argument did not parse.
    #[error("invalid argument for /{command}: {reason}")]
    InvalidArgument {
        /// Command name.
        command: &'static str,
        /// Parser message.
        reason: String,
    },
}

/// Help text for `/help`.
pub const HELP: &str = "\
/domain <id>       switch domain
/domains           list domains
/mood              show emotion state and tone
/history [n]       show the last n records
/forget <id>       delete a record
/stats             show counters
/quit              exit";

/// Parse one input line.
///
/// # Errors
/// [`CommandError`] for unknown commands or bad arguments.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };

    match name {
        "domain" => {
            let arg = arg.ok_or(CommandError::MissingArgument("domain"))?;
            arg.parse::<DomainId>()
                .map(Command::Domain)
                .map_err(|reason| CommandError::InvalidArgument { command: "domain", reason })
        }
        "domains" => Ok(Command::Domains),
        "mood" => Ok(Command::Mood),
        "history" => match arg {
            None => Ok(Command::History(DEFAULT_HISTORY)),
            Some(n) => n.parse::<usize>().map(Command::History).map_err(|e| {
                CommandError::InvalidArgument { command: "history", reason: e.to_string() }
            }),
        },
        "forget" => {
            let arg = arg.ok_or(CommandError::MissingArgument("forget"))?;
            arg.parse::<RecordId>()
                .map(Command::Forget)
                .map_err(|e| CommandError::InvalidArgument {
                    command: "forget",
                    reason: e.to_string(),
                })
        }
        "stats" => Ok(Command::Stats),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
