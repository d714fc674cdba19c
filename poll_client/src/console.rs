//! Terminal front-end: command parsing and rendering.
//!
//! The binary reads one command per line. Polls and choices are addressed by
//! their 1-based position in the last printed list.
use std::fmt::Write as _;
use std::str::FromStr;

use poll_common::{Poll, PollError};

use crate::session::SessionNotice;
use crate::view::LiveView;

/// Help text printed on start and on `help`.
pub const HELP: &str = "\
Commands:
  list                                   show available polls
  open <n>                               open poll number n and follow its results
  vote <n>                               vote for choice number n of the open poll
  back                                   close the open poll
  create <title> | <question> | <a>, <b>[, ...]
                                         create a poll
  delete <n>                             delete poll number n
  help                                   show this text
  quit                                   exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the help text.
    Help,
    /// Reload and print the poll list.
    List,
    /// Open a poll by list position.
    Open(usize),
    /// Vote for a choice of the open poll by position.
    Vote(usize),
    /// Return to the poll list.
    Back,
    /// Create a poll.
    Create {
        /// Poll title.
        title: String,
        /// Poll question.
        question: String,
        /// Choice texts.
        choices: Vec<String>,
    },
    /// Delete a poll by list position.
    Delete(usize),
    /// Leave the program.
    Quit,
}

impl FromStr for Command {
    type Err = PollError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match word.to_ascii_lowercase().as_str() {
            "help" | "?" => Ok(Command::Help),
            "list" | "ls" => Ok(Command::List),
            "open" => Ok(Command::Open(parse_position(rest)?)),
            "vote" => Ok(Command::Vote(parse_position(rest)?)),
            "back" => Ok(Command::Back),
            "delete" => Ok(Command::Delete(parse_position(rest)?)),
            "quit" | "exit" => Ok(Command::Quit),
            "create" => {
                let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
                let [title, question, choices] = parts.as_slice() else {
                    return Err(PollError::Validation(
                        "usage: create <title> | <question> | <a>, <b>[, ...]".into(),
                    ));
                };
                Ok(Command::Create {
                    title: title.to_string(),
                    question: question.to_string(),
                    choices: choices.split(',').map(|c| c.trim().to_string()).collect(),
                })
            }
            "" => Err(PollError::Validation("empty command".into())),
            other => Err(PollError::Validation(format!(
                "unknown command {:?}; type help",
                other
            ))),
        }
    }
}

fn parse_position(arg: &str) -> Result<usize, PollError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(PollError::Validation(format!(
            "expected a list number, got {:?}",
            arg
        ))),
    }
}

/// Numbered poll list.
pub fn render_polls(polls: &[Poll]) -> String {
    if polls.is_empty() {
        return "No polls yet.".to_string();
    }
    let mut out = String::from("Available polls:");
    for (i, poll) in polls.iter().enumerate() {
        let _ = write!(out, "\n  {}. {} - {}", i + 1, poll.title, poll.question);
    }
    out
}

/// Open poll with its choices and the live tally.
pub fn render_poll(poll: &Poll, view: &LiveView) -> String {
    let mut out = format!("{}\n{}", poll.title, poll.question);
    for (i, choice) in poll.choices.iter().enumerate() {
        let _ = write!(out, "\n  {}. {}", i + 1, choice.text);
    }
    let _ = write!(out, "\nLive results [{}]", view.status);
    if let Some(watchers) = view.watchers {
        let _ = write!(out, " ({} watching)", watchers);
    }
    out.push(':');
    for tally in &view.results {
        let _ = write!(out, "\n  Choice {}: {} votes", tally.text, tally.votes);
    }
    if let Some(at) = view.updated_at {
        let _ = write!(out, "\n  (updated {})", at.format("%H:%M:%S"));
    }
    out
}

/// One-line message for notices the user should see; `None` for the rest.
pub fn render_notice(notice: &SessionNotice) -> Option<String> {
    match notice {
        SessionNotice::CatalogFailed(e) => Some(format!("Could not load polls: {}", e)),
        SessionNotice::OpenFailed(e) => Some(format!("Could not open poll: {}", e)),
        SessionNotice::PollCreated { title } => Some(format!("Poll {:?} created.", title)),
        SessionNotice::CreateFailed(e) => Some(format!("Could not create poll: {}", e)),
        SessionNotice::PollDeleted(id) => Some(format!("Poll {} deleted.", id)),
        SessionNotice::DeleteFailed(e) => Some(format!("Could not delete poll: {}", e)),
        SessionNotice::VoteAccepted { .. } => Some("Vote accepted.".to_string()),
        SessionNotice::VoteFailed(e) => Some(format!("Vote failed: {}", e)),
        SessionNotice::LiveDegraded { reason, .. } => Some(format!(
            "Live results stopped ({}). Reopen the poll to retry.",
            reason
        )),
        SessionNotice::CatalogUpdated { .. }
        | SessionNotice::PollOpened(_)
        | SessionNotice::ResultsReset(_)
        | SessionNotice::ResultsUpdated(_)
        | SessionNotice::WatchersUpdated { .. } => None,
    }
}
