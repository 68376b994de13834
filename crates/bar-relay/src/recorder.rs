//! Append-only session recorder.
//!
//! Every accepted event is written as one `{"t": <timestamp>, "d": <event>}`
//! line. The file is opened once in append mode; each record is written with
//! a single `write_all` followed by a flush, so lines never interleave.

use crate::clock::Clock;
use crate::error::{RelayError, RelayResult};
use crate::event::Event;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Where to record: an explicit path, or a timestamped file in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTarget {
    Auto,
    Path(PathBuf),
}

impl RecordTarget {
    /// Concrete file path, expanding `auto` to `session_YYYY-MM-DD_HH-MM-SS.jsonl`.
    pub fn resolve(&self, now: DateTime<Local>) -> PathBuf {
        match self {
            RecordTarget::Auto => PathBuf::from(format!(
                "session_{}.jsonl",
                now.format("%Y-%m-%d_%H-%M-%S")
            )),
            RecordTarget::Path(path) => path.clone(),
        }
    }
}

impl FromStr for RecordTarget {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(if value == "auto" {
            RecordTarget::Auto
        } else {
            RecordTarget::Path(PathBuf::from(value))
        })
    }
}

#[derive(Serialize)]
struct RecordLine<'a> {
    t: DateTime<Utc>,
    d: &'a Event,
}

/// Writes recorded events to a durable sink.
pub struct Recorder {
    sink: Box<dyn Write + Send>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
    written: u64,
}

impl Recorder {
    /// Open (or create) `path` in append mode.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> RelayResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| RelayError::Recording(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            sink: Box::new(file),
            clock,
            path: Some(path.to_path_buf()),
            written: 0,
        })
    }

    /// Record into an arbitrary writer.
    pub fn from_writer(sink: impl Write + Send + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink: Box::new(sink),
            clock,
            path: None,
            written: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append one line for `event`, stamped with the current time.
    pub fn append(&mut self, event: &Event) -> RelayResult<()> {
        let mut line = serde_json::to_vec(&RecordLine {
            t: self.clock.now(),
            d: event,
        })?;
        line.push(b'\n');

        self.sink.write_all(&line)?;
        self.sink.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("path", &self.path)
            .field("written", &self.written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::event::{parse_event, RecordedEvent};
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_record_target_parses_auto() {
        assert_eq!("auto".parse::<RecordTarget>().unwrap(), RecordTarget::Auto);
        assert_eq!(
            "games/today.jsonl".parse::<RecordTarget>().unwrap(),
            RecordTarget::Path(PathBuf::from("games/today.jsonl"))
        );
    }

    #[test]
    fn test_auto_target_uses_session_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            RecordTarget::Auto.resolve(now),
            PathBuf::from("session_2024-03-09_07-05-01.jsonl")
        );
    }

    #[test]
    fn test_open_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        std::fs::write(&path, "{\"t\":\"2024-01-01T00:00:00Z\",\"d\":{}}\n").unwrap();

        let mut recorder = Recorder::open(&path, Arc::new(SystemClock)).unwrap();
        recorder
            .append(&parse_event(r#"{"event":"kill"}"#).unwrap())
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let recorded: RecordedEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(recorded.data["event"], "kill");
        assert_eq!(recorder.written(), 1);
        assert_eq!(recorder.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("session.jsonl");

        let result = Recorder::open(&path, Arc::new(SystemClock));
        assert!(matches!(result, Err(RelayError::Recording(_))));
    }
}
