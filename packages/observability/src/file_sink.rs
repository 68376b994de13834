//! Append-only JSONL log file sink.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// File writer shared by every event the JSON layer emits.
///
/// Each write is flushed immediately so a tailing reader sees whole lines.
#[derive(Clone)]
pub struct AppendLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl AppendLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for AppendLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for AppendLogWriter {
    type Writer = AppendLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_append_writer_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("relay.jsonl");

        let mut writer = AppendLogWriter::new(&path).unwrap();
        writer.write_all(b"first line\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first line\n");
    }

    #[test]
    fn test_append_writer_keeps_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");
        std::fs::write(&path, "earlier\n").unwrap();

        let mut writer = AppendLogWriter::new(&path).unwrap();
        writer.write_all(b"later\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }

    #[test]
    fn test_clones_share_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");

        let writer = AppendLogWriter::new(&path).unwrap();
        writer.make_writer().write_all(b"a\n").unwrap();
        writer.make_writer().write_all(b"b\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
