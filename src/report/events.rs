//! Machine-readable progress and result events
//!
//! Each event is written as one JSON object per line on the reporter's writer
//! (stdout in the binary) and flushed immediately so the parent process sees
//! it without buffering delays.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

/// Progress status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: Status,
    pub progress: u8,
    pub message: String,
}

/// Outcome-specific fields of a result event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Converted {
        output_path: String,
        features_count: usize,
    },
    Failed {
        error: String,
        traceback: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEvent {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResultEvent {
    pub fn converted(output_path: &Path, features_count: usize) -> Self {
        Self {
            success: true,
            outcome: Outcome::Converted {
                output_path: output_path.display().to_string(),
                features_count,
            },
        }
    }

    pub fn failed(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: Outcome::Failed {
                error: error.into(),
                traceback: traceback.into(),
            },
        }
    }
}

/// One line of the event stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Progress(ProgressEvent),
    Result(ResultEvent),
}

/// Writes events as newline-delimited JSON.
///
/// Progress never goes backwards: a percentage lower than the last one
/// reported is raised to it, and the terminal `failed` event repeats the last
/// percentage.
pub struct ProgressReporter<W: Write> {
    out: W,
    last_progress: u8,
}

impl<W: Write> ProgressReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_progress: 0,
        }
    }

    /// Last percentage reported
    pub fn last_progress(&self) -> u8 {
        self.last_progress
    }

    pub fn processing(&mut self, progress: u8, message: impl Into<String>) -> io::Result<()> {
        self.progress(Status::Processing, progress, message.into())
    }

    pub fn completed(&mut self, message: impl Into<String>) -> io::Result<()> {
        self.progress(Status::Completed, 100, message.into())
    }

    pub fn failed(&mut self, message: impl Into<String>) -> io::Result<()> {
        let progress = self.last_progress;
        self.progress(Status::Failed, progress, message.into())
    }

    pub fn result(&mut self, result: ResultEvent) -> io::Result<()> {
        self.emit(&Event::Result(result))
    }

    fn progress(&mut self, status: Status, progress: u8, message: String) -> io::Result<()> {
        let progress = progress.min(100).max(self.last_progress);
        self.last_progress = progress;
        self.emit(&Event::Progress(ProgressEvent {
            status,
            progress,
            message,
        }))
    }

    fn emit(&mut self, event: &Event) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
