use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

use crate::core::turn::{Presentation, NO_RESPONSE_TEXT};

/// Install the stderr diagnostics subscriber. `RUST_LOG` overrides the
/// default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Append-only transcript of chat turns.
pub struct TranscriptLog {
    file_path: Option<PathBuf>,
}

impl TranscriptLog {
    pub fn new(log_file: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = &log_file {
            Self::test_file_access(path)?;
        }
        Ok(TranscriptLog {
            file_path: log_file,
        })
    }

    pub fn disabled() -> Self {
        TranscriptLog { file_path: None }
    }

    pub fn is_active(&self) -> bool {
        self.file_path.is_some()
    }

    /// Record one finished turn: the user's message followed by the reply,
    /// the failure, or the no-response marker.
    pub fn record_turn(
        &self,
        user_message: &str,
        reply: Option<&str>,
        outcome: &Presentation,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        for line in format!("You: {user_message}").lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;

        let body = match outcome {
            Presentation::Failed { message } => format!("## Error: {message}"),
            Presentation::NoResponse => format!("## {NO_RESPONSE_TEXT}"),
            _ => reply.unwrap_or_default().to_string(),
        };
        for line in body.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;

        writer.flush()?;
        Ok(())
    }

    fn test_file_access(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_reply_failure_and_empty_turns() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("chat.log");
        let log = TranscriptLog::new(Some(path.clone())).expect("log");
        assert!(log.is_active());

        log.record_turn(
            "hi",
            Some("Hello!\nHow can I help?"),
            &Presentation::Complete {
                markup: String::new(),
            },
        )
        .unwrap();
        log.record_turn(
            "again",
            None,
            &Presentation::Failed {
                message: "HTTP 500 Internal Server Error".into(),
            },
        )
        .unwrap();
        log.record_turn("quiet", None, &Presentation::NoResponse)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "You: hi\n\nHello!\nHow can I help?\n\n\
             You: again\n\n## Error: HTTP 500 Internal Server Error\n\n\
             You: quiet\n\n## No response received.\n\n"
        );
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = TranscriptLog::disabled();
        assert!(!log.is_active());
        log.record_turn("hi", Some("there"), &Presentation::NoResponse)
            .unwrap();
    }

    #[test]
    fn unwritable_path_is_rejected_up_front() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("missing-dir").join("chat.log");
        assert!(TranscriptLog::new(Some(path)).is_err());
    }
}
