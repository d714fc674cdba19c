//! Poll Client: a terminal front-end for the live polling backend. It lists polls,
//! creates and deletes them, votes, and follows the open poll's results as the
//! backend broadcasts them.
//!
//! Usage example (CLI):
//! ```bash
//! poll_client --base-url http://127.0.0.1:8000
//! ```
//!
//! Type `help` at the prompt for the command list. Set `RUST_LOG=debug` to see
//! subscription traffic.
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use crossbeam_channel::{Receiver, select, unbounded};
use log::{error, info};
use poll_client::console::{self, Command, HELP};
use poll_client::{ClientConfig, PollSession, SessionNotice};
use poll_common::{PollError, Result};
use std::io::{self, BufRead};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

/// How long the main loop waits for input before applying session events.
const TICK_MS: u64 = 50;

fn main() -> Result<(), PollError> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| PollError::Io(io::Error::other(e)))?;
    }

    let config = ClientConfig::new(&args.base_url)?
        .with_read_timeout(Duration::from_millis(args.read_timeout_ms))
        .with_connect_timeout(Duration::from_millis(args.connect_timeout_ms));
    info!("Using backend at {}", args.base_url.trim());

    let mut session = PollSession::connect(&config)?;
    session.refresh_catalog()?;
    println!("{}", HELP);

    let input = spawn_stdin_reader();
    while !shutdown.load(Ordering::Relaxed) {
        select! {
            recv(input) -> line => match line {
                Ok(line) => {
                    if !handle_line(&mut session, &line) {
                        break;
                    }
                }
                Err(_) => break,
            },
            default(Duration::from_millis(TICK_MS)) => {}
        }

        for notice in session.pump()? {
            show_notice(&session, &notice);
        }
    }

    session.select_poll(None)?;
    info!("Client stopped.");
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Read stdin lines on a background thread so the main loop keeps applying
/// session events while the user types.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Reading stdin failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Run one command. Returns `false` when the user asked to quit.
///
/// Failures are printed and the session carries on.
fn handle_line(session: &mut PollSession, line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    let outcome = match command {
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::List => {
            println!("{}", console::render_polls(session.polls()));
            session.refresh_catalog()
        }
        Command::Open(index) => match session.polls().get(index).map(|p| p.id.clone()) {
            Some(poll_id) => session.open_poll(poll_id),
            None => Err(PollError::Validation(format!("no poll number {}", index + 1))),
        },
        Command::Vote(index) => {
            let choice = session
                .selected()
                .map(|poll| poll.choices.get(index).map(|choice| choice.id.clone()));
            match choice {
                None => Err(PollError::NoPollSelected),
                Some(None) => Err(PollError::Validation(format!(
                    "no choice number {}",
                    index + 1
                ))),
                Some(Some(choice_id)) => session.submit_vote(choice_id),
            }
        }
        Command::Back => session.select_poll(None),
        Command::Create {
            title,
            question,
            choices,
        } => session.create_poll(&title, &question, &choices),
        Command::Delete(index) => match session.polls().get(index).map(|p| p.id.clone()) {
            Some(poll_id) => session.delete_poll(poll_id),
            None => Err(PollError::Validation(format!("no poll number {}", index + 1))),
        },
        Command::Quit => return false,
    };

    if let Err(e) = outcome {
        println!("{}", e);
    }
    true
}

fn show_notice(session: &PollSession, notice: &SessionNotice) {
    if let Some(text) = console::render_notice(notice) {
        println!("{}", text);
    }
    match notice {
        SessionNotice::CatalogUpdated { .. } if session.selected().is_none() => {
            println!("{}", console::render_polls(session.polls()));
        }
        SessionNotice::PollOpened(_)
        | SessionNotice::ResultsReset(_)
        | SessionNotice::ResultsUpdated(_)
        | SessionNotice::WatchersUpdated { .. }
        | SessionNotice::LiveDegraded { .. } => {
            if let (Some(poll), Ok(view)) = (session.selected(), session.view()) {
                println!("{}", console::render_poll(poll, &view));
            }
        }
        _ => {}
    }
}
