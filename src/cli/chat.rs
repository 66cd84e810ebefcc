//! Terminal chat runner: one-shot when a message is given on the command
//! line, otherwise a line-per-message loop over stdin.

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::cli::resolve_folder;
use crate::core::chat_stream::{ChatStreamService, StreamEvent};
use crate::core::config::{load_settings, Config};
use crate::core::documents::DocumentStore;
use crate::core::prompt::append_exchange;
use crate::core::relay::Subscription;
use crate::core::turn::{follow_turn, Presentation, TurnView, NO_RESPONSE_TEXT};
use crate::utils::logging::TranscriptLog;

struct ChatSession {
    service: ChatStreamService,
    subscription: Subscription,
    document_context: String,
    history: String,
    html: bool,
    transcript: TranscriptLog,
}

/// Write the part of `text` past `printed` and advance `printed`.
fn write_delta<W: Write>(out: &mut W, text: &str, printed: &mut usize) -> io::Result<()> {
    out.write_all(text[*printed..].as_bytes())?;
    out.flush()?;
    *printed = text.len();
    Ok(())
}

/// Follow `view`'s turn until it finishes or `interrupt` resolves. An
/// interrupt cancels the turn; returns whether that happened.
async fn follow_or_interrupt<I, F>(
    subscription: &mut Subscription,
    view: &mut TurnView,
    cancel: &CancellationToken,
    interrupt: I,
    on_update: F,
) -> bool
where
    I: Future,
    F: FnMut(&TurnView, &StreamEvent),
{
    tokio::select! {
        _ = follow_turn(subscription, view, on_update) => false,
        _ = interrupt => {
            cancel.cancel();
            true
        }
    }
}

impl ChatSession {
    async fn run_turn(&mut self, message: &str) -> Result<Presentation, Box<dyn Error>> {
        let settings = load_settings()?;
        let (turn_id, cancel) = self.service.dispatch_turn(
            &settings,
            message,
            &self.document_context,
            &self.history,
        )?;

        let mut view = TurnView::new();
        view.watch(turn_id);

        let html = self.html;
        let mut printed = 0;
        let mut write_error: Option<io::Error> = None;
        let interrupted = follow_or_interrupt(
            &mut self.subscription,
            &mut view,
            &cancel,
            tokio::signal::ctrl_c(),
            |view, event| {
                if html || write_error.is_some() || !matches!(event, StreamEvent::Token { .. }) {
                    return;
                }
                if let Some(text) = view.accumulated_text() {
                    if let Err(err) = write_delta(&mut io::stdout().lock(), text, &mut printed) {
                        write_error = Some(err);
                    }
                }
            },
        )
        .await;

        if let Some(err) = write_error {
            return Err(err.into());
        }

        let reply = view.accumulated_text().map(str::to_owned);
        let outcome = view.presentation().clone();
        match &outcome {
            Presentation::Complete { markup } => {
                if html {
                    print!("{markup}");
                } else {
                    println!();
                }
            }
            Presentation::Failed { message } => {
                if printed > 0 {
                    println!();
                }
                eprintln!("❌ {message}");
            }
            Presentation::NoResponse => eprintln!("⚠️  {NO_RESPONSE_TEXT}"),
            _ if interrupted => {
                println!();
                eprintln!("⚠️  Reply cancelled");
            }
            _ => {
                println!();
                eprintln!("⚠️  Stream closed before the reply finished");
            }
        }

        if let Err(err) = self.transcript.record_turn(message, reply.as_deref(), &outcome) {
            eprintln!("⚠️  Failed to write transcript: {err}");
        }
        if let (Presentation::Complete { .. }, Some(reply)) = (&outcome, reply.as_deref()) {
            append_exchange(&mut self.history, message, reply);
        }
        Ok(outcome)
    }
}

pub async fn run_chat(
    message: Vec<String>,
    doc: Option<String>,
    html: bool,
    folder: Option<PathBuf>,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let document_context = match doc {
        Some(note) => {
            let mut config = Config::load()?;
            let root = resolve_folder(&mut config, folder)?;
            DocumentStore::new(root).read_document(&note)?
        }
        None => String::new(),
    };

    let service = ChatStreamService::new();
    let subscription = service.subscribe();
    let mut session = ChatSession {
        service,
        subscription,
        document_context,
        history: String::new(),
        html,
        transcript: TranscriptLog::new(log)?,
    };

    let message = message.join(" ");
    if !message.trim().is_empty() {
        let outcome = session.run_turn(&message).await?;
        if matches!(outcome, Presentation::Failed { .. }) {
            std::process::exit(1);
        }
        return Ok(());
    }

    eprintln!("💬 Type a message and press Enter. Ctrl+C cancels a reply, Ctrl+D quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        // Once a turn has listened for Ctrl+C the default handler is gone
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = session.run_turn(&line).await {
            eprintln!("❌ {err}");
        }
    }
    Ok(())
}
