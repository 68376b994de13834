//! Persisted relay identity.
//!
//! Resolution order: explicit value, then `~/.bar_uuid`, then an interactive
//! prompt whose answer is saved for next time.

use crate::error::{RelayError, RelayResult};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the stored identity in the home directory.
pub const IDENTITY_FILE_NAME: &str = ".bar_uuid";

/// Reads, writes and prompts for the relay identity.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store at `~/.bar_uuid`.
    pub fn new() -> RelayResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| RelayError::Identity("home directory not found".to_string()))?;
        Ok(Self::with_path(home.join(IDENTITY_FILE_NAME)))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored identity, if any non-blank value is on disk.
    pub fn load(&self) -> RelayResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let identity = contents.trim();
                Ok((!identity.is_empty()).then(|| identity.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayError::Identity(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Persist `identity`, readable only by the owner on unix.
    pub fn save(&self, identity: &str) -> RelayResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .map_err(|e| RelayError::Identity(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(identity.as_bytes())?;
        debug!(path = %self.path.display(), "Identity saved");
        Ok(())
    }

    /// Delete the stored identity. Returns whether a file was removed.
    pub fn clear(&self) -> RelayResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Stored identity cleared");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the identity, prompting on `output` and reading `input` as a last resort.
    pub fn resolve<R, W>(&self, explicit: Option<&str>, input: R, output: W) -> RelayResult<String>
    where
        R: BufRead,
        W: Write,
    {
        if let Some(identity) = explicit_identity(explicit) {
            return Ok(identity);
        }

        if let Some(stored) = self.load()? {
            debug!(path = %self.path.display(), "Using stored identity");
            return Ok(stored);
        }

        let answer = prompt(input, output)?;
        self.save(&answer)?;
        Ok(answer)
    }
}

/// Trimmed explicit identity, or `None` when absent or blank.
pub fn explicit_identity(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolve the identity for a relay session.
///
/// An explicit value is returned without opening the store unless `reset`
/// asks for the stored identity to be cleared first.
pub fn resolve_identity<F, R, W>(
    explicit: Option<&str>,
    reset: bool,
    open_store: F,
    input: R,
    output: W,
) -> RelayResult<String>
where
    F: FnOnce() -> RelayResult<IdentityStore>,
    R: BufRead,
    W: Write,
{
    let explicit = match (explicit_identity(explicit), reset) {
        (Some(identity), false) => return Ok(identity),
        (explicit, _) => explicit,
    };

    let store = open_store()?;
    if reset {
        store.clear()?;
    }
    match explicit {
        Some(identity) => Ok(identity),
        None => store.resolve(None, input, output),
    }
}

fn prompt<R: BufRead, W: Write>(mut input: R, mut output: W) -> RelayResult<String> {
    write!(output, "Paste UUID: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let answer = line.trim();
    if answer.is_empty() {
        return Err(RelayError::Identity("no identity entered".to_string()));
    }
    Ok(answer.to_string())
}
