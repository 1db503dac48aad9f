use crate::{AuditContext, AuditEvent, AuditSink};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TINYBIRD_BASE_URL: &str = "https://api.tinybird.co";
pub const DEFAULT_TINYBIRD_DATASOURCE: &str = "audit_logs__v2";
pub const DEFAULT_TINYBIRD_TIMEOUT: Duration = Duration::from_secs(10);

/// Tinybird events-API ingestion client.
///
/// Token is resolved by the caller (config secrets) and passed in; do not log it.
#[derive(Clone)]
pub struct TinybirdClient {
    token: String,
    http: reqwest::Client,
    base_url: String,
    datasource: String,
}

impl std::fmt::Debug for TinybirdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinybirdClient")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("datasource", &self.datasource)
            .finish()
    }
}

impl TinybirdClient {
    pub fn new(token: String) -> Result<Self> {
        Self::new_with_base_url(
            token,
            DEFAULT_TINYBIRD_BASE_URL.to_string(),
            DEFAULT_TINYBIRD_DATASOURCE.to_string(),
        )
    }

    pub fn new_with_base_url(token: String, base_url: String, datasource: String) -> Result<Self> {
        Self::new_with_timeout(token, base_url, datasource, DEFAULT_TINYBIRD_TIMEOUT)
    }

    /// `timeout` bounds each ingest request end to end.
    pub fn new_with_timeout(
        token: String,
        base_url: String,
        datasource: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("tinybird http client build failed")?;
        Ok(Self {
            token,
            http,
            base_url,
            datasource,
        })
    }

    fn build_events_url(&self) -> String {
        format!("{}/v0/events", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl AuditSink for TinybirdClient {
    fn sink_name(&self) -> &'static str {
        "tinybird"
    }

    async fn ingest(&self, event: &AuditEvent) -> Result<()> {
        let row = TinybirdAuditRow::from_event(event)?;
        let mut body = serde_json::to_string(&row).context("tinybird row serialize failed")?;
        body.push('\n');

        let resp = self
            .http
            .post(self.build_events_url())
            .query(&[("name", self.datasource.as_str())])
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("tinybird request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "tinybird http error status={} body={}",
                status.as_u16(),
                text
            ));
        }

        // Rows that do not fit the datasource schema land in quarantine with a 2xx.
        let text = resp.text().await.context("tinybird response read failed")?;
        if let Ok(ack) = serde_json::from_str::<TinybirdIngestAck>(&text) {
            if ack.quarantined_rows > 0 {
                return Err(anyhow!(
                    "tinybird quarantined {} row(s) for audit_log_id={}",
                    ack.quarantined_rows,
                    event.audit_log_id
                ));
            }
        }

        Ok(())
    }
}

/// Flattened row shape of the audit datasource.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TinybirdAuditRow<'a> {
    workspace_id: &'a str,
    audit_log_id: String,
    event: &'a str,
    /// Epoch milliseconds.
    time: i64,
    actor_type: &'static str,
    actor_id: &'a str,
    actor_name: Option<&'a str>,
    actor_meta: Option<String>,
    description: &'a str,
    /// JSON-encoded array; the datasource stores it as a string column.
    resources: String,
    context: &'a AuditContext,
}

impl<'a> TinybirdAuditRow<'a> {
    fn from_event(ev: &'a AuditEvent) -> Result<Self> {
        Ok(Self {
            workspace_id: &ev.workspace_id,
            audit_log_id: ev.audit_log_id.to_string(),
            event: &ev.event,
            time: ev.time.timestamp_millis(),
            actor_type: ev.actor.kind.as_str(),
            actor_id: &ev.actor.id,
            actor_name: ev.actor.name.as_deref(),
            actor_meta: None,
            description: &ev.description,
            resources: serde_json::to_string(&ev.resources)
                .context("tinybird resources serialize failed")?,
            context: &ev.context,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TinybirdIngestAck {
    #[serde(default)]
    quarantined_rows: u64,
}
