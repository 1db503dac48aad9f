//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `audit.tinybird.token_env`).
//! Callers invoke [`resolve_secrets`] once at startup and pass the result into
//! constructors. `Debug` redacts values, and errors name the variable, never
//! its value.

use crate::{AuditSinkKind, RefillSettings};
use anyhow::{bail, Result};

/// All runtime-resolved secrets for one refill run.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Tinybird ingest token. `None` if the named env var was absent or empty.
    pub tinybird_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "tinybird_token",
                &self.tinybird_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve a named environment variable. Unset or blank => `None`.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets required by the configured audit sink.
///
/// | audit.sink | Required                  |
/// |------------|---------------------------|
/// | tinybird   | `audit.tinybird.token_env` |
/// | jsonl      | nothing                   |
/// | postgres   | nothing (`KRF_DATABASE_URL` is read by krf-db) |
pub fn resolve_secrets(settings: &RefillSettings) -> Result<ResolvedSecrets> {
    let token_var = &settings.tinybird.token_env;
    let tinybird_token = resolve_env(token_var);

    if settings.audit_sink == AuditSinkKind::Tinybird && tinybird_token.is_none() {
        bail!(
            "SECRETS_MISSING sink=tinybird: required env var '{}' \
             (Tinybird ingest token) is not set or empty",
            token_var,
        );
    }

    Ok(ResolvedSecrets { tinybird_token })
}
