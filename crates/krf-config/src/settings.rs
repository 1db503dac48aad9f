//! Typed view of the refill job's config.
//!
//! Every pointer read here must also appear in `CONSUMED_POINTERS`.

use anyhow::{anyhow, bail, Result};
use chrono_tz::Tz;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSinkKind {
    Tinybird,
    Jsonl,
    Postgres,
}

impl AuditSinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSinkKind::Tinybird => "tinybird",
            AuditSinkKind::Jsonl => "jsonl",
            AuditSinkKind::Postgres => "postgres",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tinybird" => Ok(AuditSinkKind::Tinybird),
            "jsonl" => Ok(AuditSinkKind::Jsonl),
            "postgres" => Ok(AuditSinkKind::Postgres),
            other => Err(anyhow!(
                "invalid audit.sink '{}'. expected one of: tinybird | jsonl | postgres",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlSettings {
    pub path: String,
    pub hash_chain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinybirdSettings {
    pub base_url: String,
    pub datasource: String,
    /// Name of the env var holding the token (never the token itself).
    pub token_env: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefillSettings {
    /// Zone in which the scheduler's reference timestamp becomes a civil date.
    pub timezone: Tz,
    pub audit_sink: AuditSinkKind,
    pub actor_id: String,
    pub location: String,
    pub jsonl: JsonlSettings,
    pub tinybird: TinybirdSettings,
}

impl RefillSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let tz_name = read_str_at(config, "/refill/timezone").unwrap_or_else(|| "UTC".to_string());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|e| anyhow!("invalid refill.timezone '{}': {}", tz_name, e))?;

        let audit_sink = match read_str_at(config, "/audit/sink") {
            Some(s) => AuditSinkKind::parse(&s)?,
            None => AuditSinkKind::Tinybird,
        };

        let hash_chain = match config.pointer("/audit/jsonl/hash_chain") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(other) => bail!("audit.jsonl.hash_chain must be a bool, got {}", other),
        };

        Ok(Self {
            timezone,
            audit_sink,
            actor_id: read_str_at(config, "/audit/actor_id")
                .unwrap_or_else(|| "trigger".to_string()),
            location: read_str_at(config, "/audit/location")
                .unwrap_or_else(|| "trigger".to_string()),
            jsonl: JsonlSettings {
                path: read_str_at(config, "/audit/jsonl/path")
                    .unwrap_or_else(|| "exports/audit/refill.jsonl".to_string()),
                hash_chain,
            },
            tinybird: TinybirdSettings {
                base_url: read_str_at(config, "/audit/tinybird/base_url")
                    .unwrap_or_else(|| "https://api.tinybird.co".to_string()),
                datasource: read_str_at(config, "/audit/tinybird/datasource")
                    .unwrap_or_else(|| "audit_logs__v2".to_string()),
                token_env: read_str_at(config, "/audit/tinybird/token_env")
                    .unwrap_or_else(|| "TINYBIRD_TOKEN".to_string()),
            },
        })
    }
}

/// Non-empty trimmed string at `pointer`, or `None`.
pub(crate) fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
