//! Audit storage backends.
//!
//! Storage is an append sink plus a loader. The [`AuditLog`](crate::AuditLog)
//! owns chain state and only advances an agent's head after
//! [`AuditStorage::append`] returned `Ok`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anchor_core::AgentId;
use dashmap::{DashMap, DashSet};
use tracing::{debug, error, warn};

use crate::event::AuditEvent;
use crate::error::{AuditError, AuditResult};

/// File extension of per-agent audit files.
const JSONL_EXTENSION: &str = "jsonl";

/// Storage backend for audit chains.
///
/// Implementations must be thread-safe. Appends for one agent are never
/// issued concurrently; appends for different agents may be.
pub trait AuditStorage: Send + Sync + std::fmt::Debug {
    /// Persist one event at the end of its agent's chain.
    ///
    /// Either the whole event is persisted or nothing is.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be persisted.
    fn append(&self, event: &AuditEvent) -> AuditResult<()>;

    /// All events of an agent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn load(&self, agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>>;

    /// Agents with at least one stored event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be listed.
    fn agents(&self) -> AuditResult<Vec<AgentId>>;

    /// Flush pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to flush.
    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryAuditStorage {
    chains: DashMap<AgentId, Vec<AuditEvent>>,
}

impl MemoryAuditStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStorage for MemoryAuditStorage {
    fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        self.chains
            .entry(event.agent_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn load(&self, agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>> {
        Ok(self
            .chains
            .get(agent_id)
            .map(|chain| chain.value().clone())
            .unwrap_or_default())
    }

    fn agents(&self) -> AuditResult<Vec<AgentId>> {
        let mut agents: Vec<_> = self.chains.iter().map(|e| e.key().clone()).collect();
        agents.sort();
        Ok(agents)
    }
}

/// Append-only JSONL files, one per agent: `<dir>/<agent_id>.jsonl`.
///
/// Each line is one serialized [`AuditEvent`]. A failed write truncates the
/// file back to its previous length so no partial line survives. If that
/// truncation fails too, the agent's file is marked damaged and refuses
/// further appends.
///
/// A final line that does not parse is a torn write from an earlier process.
/// [`AuditStorage::load`] skips it, and the file is repaired before the next
/// append to it.
#[derive(Debug)]
pub struct FileAuditStorage {
    dir: PathBuf,
    files: DashMap<AgentId, Arc<Mutex<File>>>,
    damaged: DashSet<AgentId>,
}

impl FileAuditStorage {
    /// Open (or create) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> AuditResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened audit directory");
        Ok(Self {
            dir,
            files: DashMap::new(),
            damaged: DashSet::new(),
        })
    }

    /// Directory holding the agent files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an agent's audit file.
    #[must_use]
    pub fn path_for(&self, agent_id: &AgentId) -> PathBuf {
        self.dir
            .join(format!("{}.{JSONL_EXTENSION}", agent_id.as_str()))
    }
}

impl AuditStorage for FileAuditStorage {
    fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        if self.damaged.contains(&event.agent_id) {
            return Err(AuditError::Storage(format!(
                "audit file for agent {} is damaged and needs repair",
                event.agent_id
            )));
        }

        let mut line =
            serde_json::to_vec(event).map_err(|e| AuditError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let handle = Arc::clone(
            &*self
                .files
                .entry(event.agent_id.clone())
                .or_try_insert_with(|| {
                    let path = self.path_for(&event.agent_id);
                    repair_tail(&path)?;
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .map(|file| Arc::new(Mutex::new(file)))
                        .map_err(AuditError::from)
                })?,
        );
        let mut file = handle
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let len_before = file.metadata()?.len();
        let written = file.write_all(&line).and_then(|()| file.sync_data());
        if let Err(e) = written {
            // Drop any partial line; the chain head has not moved.
            if let Err(rollback) = file.set_len(len_before) {
                error!(
                    agent_id = %event.agent_id,
                    error = %rollback,
                    "Failed to roll back partial audit line"
                );
                drop(file);
                self.files.remove(&event.agent_id);
                self.damaged.insert(event.agent_id.clone());
                return Err(AuditError::Storage(format!(
                    "{e}; rolling back the partial line failed: {rollback}"
                )));
            }
            return Err(AuditError::Storage(e.to_string()));
        }
        Ok(())
    }

    fn load(&self, agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>> {
        let path = self.path_for(agent_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&path)?;
        let mut events = Vec::new();
        for line in lines(&bytes) {
            match serde_json::from_slice::<AuditEvent>(line.text) {
                Ok(event) => events.push(event),
                Err(e) if line.last => {
                    warn!(
                        path = %path.display(),
                        line = line.number,
                        error = %e,
                        "Skipping torn final audit line"
                    );
                },
                Err(e) => {
                    return Err(AuditError::Serialization(format!(
                        "{}:{}: {e}",
                        path.display(),
                        line.number
                    )));
                },
            }
        }
        Ok(events)
    }

    fn agents(&self) -> AuditResult<Vec<AgentId>> {
        let mut agents = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JSONL_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| AgentId::new(s).ok())
            {
                agents.push(id);
            }
        }
        agents.sort();
        Ok(agents)
    }

    fn flush(&self) -> AuditResult<()> {
        for entry in &self.files {
            let file = entry
                .value()
                .lock()
                .map_err(|e| AuditError::Storage(e.to_string()))?;
            file.sync_all()?;
        }
        Ok(())
    }
}

/// One non-empty line of a JSONL file.
struct Line<'a> {
    /// 1-based line number.
    number: usize,
    /// Byte offset of the line start.
    start: usize,
    /// Content without surrounding whitespace.
    text: &'a [u8],
    /// Whether only whitespace follows.
    last: bool,
}

fn lines(bytes: &[u8]) -> Vec<Line<'_>> {
    let mut out: Vec<Line<'_>> = Vec::new();
    let mut start = 0usize;
    for (index, raw) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
        let text = raw.trim_ascii();
        if !text.is_empty() {
            out.push(Line {
                number: index.saturating_add(1),
                start,
                text,
                last: false,
            });
        }
        start = start.saturating_add(raw.len());
    }
    if let Some(line) = out.last_mut() {
        line.last = true;
    }
    out
}

/// Drop a torn final line, and terminate a complete final line that lost
/// its newline, so the next append starts on a fresh line.
fn repair_tail(path: &Path) -> AuditResult<()> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let Some(last) = lines(&bytes).pop() else {
        return Ok(());
    };

    if serde_json::from_slice::<AuditEvent>(last.text).is_err() {
        warn!(
            path = %path.display(),
            line = last.number,
            "Truncating torn final audit line"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(u64::try_from(last.start).unwrap_or(u64::MAX))?;
        file.sync_data()?;
    } else if bytes.last() != Some(&b'\n') {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}
