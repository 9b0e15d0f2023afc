//! Live outcome feeds polled by the monitor
//!
//! A feed hands out the outcomes settled since the last poll for one
//! strategy. Push-style callers use `ValidationGate::record_outcome`
//! directly and need no feed.

use crate::core::{LiveOutcome, OutcomeSample};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait OutcomeFeed: Send + Sync {
    /// Outcomes for `strategy` not returned by an earlier poll, oldest first
    fn poll(&self, strategy: &str) -> Result<Vec<OutcomeSample>>;
}

/// In-memory feed for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryFeed {
    pending: Mutex<HashMap<String, Vec<OutcomeSample>>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: LiveOutcome) {
        self.pending
            .lock()
            .entry(outcome.strategy_name)
            .or_default()
            .push(outcome.sample);
    }

    pub fn extend(&self, strategy: &str, samples: impl IntoIterator<Item = OutcomeSample>) {
        self.pending
            .lock()
            .entry(strategy.to_string())
            .or_default()
            .extend(samples);
    }

    pub fn pending(&self, strategy: &str) -> usize {
        self.pending.lock().get(strategy).map_or(0, Vec::len)
    }
}

impl OutcomeFeed for MemoryFeed {
    fn poll(&self, strategy: &str) -> Result<Vec<OutcomeSample>> {
        Ok(self.pending.lock().remove(strategy).unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct Cursor {
    offset: u64,
    pending: HashMap<String, Vec<OutcomeSample>>,
}

/// Tails an append-only JSONL file of [`LiveOutcome`] lines
///
/// ```text
/// {"strategy_name":"sharp_action","outcome":true,"roi":0.91,"timestamp":"2025-03-01T18:00:00Z"}
/// ```
///
/// Only complete lines are consumed; a partially written trailing line is
/// picked up on a later poll. Malformed lines are logged and skipped. A
/// file that shrank is assumed rotated and read from the start.
#[derive(Debug)]
pub struct JsonlOutcomeFeed {
    path: PathBuf,
    cursor: Mutex<Cursor>,
}

impl JsonlOutcomeFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_new_lines(&self, cursor: &mut Cursor) -> Result<()> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open outcome feed {:?}", self.path))
            }
        };

        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat outcome feed {:?}", self.path))?
            .len();
        if len < cursor.offset {
            warn!(
                "Outcome feed {:?} shrank ({} < {}), reading from the start",
                self.path, len, cursor.offset
            );
            cursor.offset = 0;
        }
        if len == cursor.offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(cursor.offset))?;
        let mut buf = Vec::with_capacity((len - cursor.offset) as usize);
        file.read_to_end(&mut buf)
            .with_context(|| format!("Failed to read outcome feed {:?}", self.path))?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete = &buf[..=last_newline];

        let mut parsed = 0usize;
        for (i, line) in complete.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<LiveOutcome>(line) {
                Ok(outcome) => {
                    cursor
                        .pending
                        .entry(outcome.strategy_name)
                        .or_default()
                        .push(outcome.sample);
                    parsed += 1;
                }
                Err(e) => warn!(
                    "Skipping malformed outcome in {:?} (line {} after offset {}): {}",
                    self.path,
                    i + 1,
                    cursor.offset,
                    e
                ),
            }
        }

        cursor.offset += complete.len() as u64;
        debug!("Read {} outcomes from {:?}", parsed, self.path);
        Ok(())
    }
}

impl OutcomeFeed for JsonlOutcomeFeed {
    fn poll(&self, strategy: &str) -> Result<Vec<OutcomeSample>> {
        let mut cursor = self.cursor.lock();
        self.read_new_lines(&mut cursor)?;
        Ok(cursor.pending.remove(strategy).unwrap_or_default())
    }
}
