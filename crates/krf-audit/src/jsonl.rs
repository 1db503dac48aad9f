use crate::{AuditEvent, AuditSink};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One line of the JSONL audit log: the event plus its chain position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub event: AuditEvent,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only audit writer. Writes JSON Lines (one event per line).
/// Optional hash chain: each record carries hash_prev + hash_self.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of records appended so far; becomes the next record's `seq`.
    seq: u64,
}

impl AuditWriter {
    /// Creates the audit writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Open an existing log and continue its chain (restores last hash + seq).
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut writer = Self::new(path, hash_chain)?;
        if !writer.path.exists() {
            return Ok(writer);
        }

        let content = fs::read_to_string(&writer.path)
            .with_context(|| format!("read audit log {:?}", writer.path))?;
        let last = content.lines().rev().find(|l| !l.trim().is_empty());
        if let Some(line) = last {
            let rec: ChainedRecord = serde_json::from_str(line.trim())
                .with_context(|| format!("parse last audit record in {:?}", writer.path))?;
            writer.last_hash = rec.hash_self;
            writer.seq = rec.seq + 1;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event.
    pub fn append(&mut self, event: &AuditEvent) -> Result<ChainedRecord> {
        let mut rec = ChainedRecord {
            seq: self.seq,
            event: event.clone(),
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            let self_hash = compute_record_hash(&rec)?;
            rec.hash_self = Some(self_hash);
        }

        let line = canonical_json_line(&rec)?;
        append_line(&self.path, &line)?;

        // Advance chain state only once the line is durable.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = rec.hash_self.clone();
        }

        Ok(rec)
    }
}

/// [`AuditSink`] over an [`AuditWriter`].
pub struct JsonlAuditSink {
    writer: Mutex<AuditWriter>,
}

impl JsonlAuditSink {
    pub fn new(writer: AuditWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Resume (or start) the log at `path`.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Ok(Self::new(AuditWriter::resume(path, hash_chain)?))
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditSink {
    fn sink_name(&self) -> &'static str {
        "jsonl"
    }

    async fn ingest(&self, event: &AuditEvent) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("audit writer lock poisoned"))?;
        writer.append(event)?;
        Ok(())
    }
}

/// Append `line` and its newline in one write.
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    f.write_all(buf.as_bytes())
        .context("write audit line failed")?;
    Ok(())
}

/// Compact JSON with keys in sorted order. `serde_json::Map` is a `BTreeMap`
/// here, so going through `Value` sorts every level.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let value: Value = serde_json::to_value(v).context("serialize audit record failed")?;
    serde_json::to_string(&value).context("json stringify failed")
}

/// SHA-256 over the canonical record with `hash_self` cleared.
pub fn compute_record_hash(rec: &ChainedRecord) -> Result<String> {
    let unsigned = ChainedRecord {
        hash_self: None,
        ..rec.clone()
    };
    let canonical = canonical_json_line(&unsigned)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Verify the hash chain integrity of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL content.
///
/// Checks, per record: `hash_prev` links to the previous `hash_self`, the
/// record carries a `hash_self` that recomputes, and `seq` counts up from 0
/// without gaps. Logs written with `hash_chain = false` never verify.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;

    let records = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    for (idx, raw) in records {
        let line = idx + 1;
        let rec: ChainedRecord = serde_json::from_str(raw.trim())
            .with_context(|| format!("parse audit record at line {line}"))?;

        let broken = |reason: String| -> Result<VerifyResult> {
            Ok(VerifyResult::Broken { line, reason })
        };

        if rec.hash_prev != prev_hash {
            return broken(format!(
                "hash_prev mismatch: expected {:?}, got {:?}",
                prev_hash, rec.hash_prev
            ));
        }

        let Some(claimed) = rec.hash_self.as_deref() else {
            return broken("missing hash_self: record is not hash-chained".to_string());
        };
        let recomputed = compute_record_hash(&rec)?;
        if claimed != recomputed {
            return broken(format!(
                "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
            ));
        }

        if rec.seq != expected_seq {
            return broken(format!("seq gap: expected {expected_seq}, got {}", rec.seq));
        }

        prev_hash = rec.hash_self;
        expected_seq += 1;
    }

    Ok(VerifyResult::Valid {
        lines: expected_seq as usize,
    })
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}
