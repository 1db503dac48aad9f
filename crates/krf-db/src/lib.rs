use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use krf_schemas::{DayCondition, Key};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "KRF_DATABASE_URL";

/// Connect to Postgres using KRF_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='keys'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_keys_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_keys_table: bool,
}

const KEY_COLUMNS: &str =
    "id, workspace_id, refill_amount, remaining, refill_day, last_refill_at, deleted_at";

fn key_from_row(row: &PgRow) -> Result<Key> {
    Ok(Key {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        refill_amount: row.try_get("refill_amount")?,
        remaining: row.try_get("remaining")?,
        refill_day: row.try_get("refill_day")?,
        last_refill_at: row.try_get("last_refill_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Keys due for refill under `cond`, ordered by id.
///
/// Predicate: not deleted, refill policy present, `remaining < refill_amount`,
/// and `refill_day` unset or matching `cond`.
pub async fn fetch_due_keys(pool: &PgPool, cond: DayCondition) -> Result<Vec<Key>> {
    let day_clause = match cond {
        DayCondition::Exactly(_) => "refill_day = $1",
        DayCondition::AtLeast(_) => "refill_day >= $1",
    };
    let sql = format!(
        r#"
        select {KEY_COLUMNS}
        from keys
        where deleted_at is null
          and refill_amount is not null
          and remaining < refill_amount
          and (refill_day is null or {day_clause})
        order by id
        "#
    );

    let day = i32::try_from(cond.day()).context("refill day out of range")?;
    let rows = sqlx::query(&sql)
        .bind(day)
        .fetch_all(pool)
        .await
        .with_context(|| format!("fetch_due_keys failed ({cond:?})"))?;

    rows.iter().map(key_from_row).collect()
}

/// Reset one key's remaining quota. Scoped by id; a missing or deleted key is an error.
pub async fn refill_key(
    pool: &PgPool,
    key_id: &str,
    amount: i64,
    refilled_at: DateTime<Utc>,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update keys
        set remaining = $2,
            last_refill_at = $3
        where id = $1
          and deleted_at is null
        "#,
    )
    .bind(key_id)
    .bind(amount)
    .bind(refilled_at)
    .execute(pool)
    .await
    .with_context(|| format!("refill_key update failed key_id={key_id}"))?;

    if res.rows_affected() != 1 {
        return Err(anyhow!(
            "refill_key affected {} rows (key missing or deleted) key_id={}",
            res.rows_affected(),
            key_id
        ));
    }
    Ok(())
}

pub async fn fetch_key(pool: &PgPool, key_id: &str) -> Result<Key> {
    let sql = format!("select {KEY_COLUMNS} from keys where id = $1");
    let row = sqlx::query(&sql)
        .bind(key_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("fetch_key failed key_id={key_id}"))?;
    key_from_row(&row)
}

/// Insert a key row. Key lifecycle belongs to key-management flows; this exists
/// for fixtures and tests.
pub async fn insert_key(pool: &PgPool, key: &Key) -> Result<()> {
    sqlx::query(
        r#"
        insert into keys (
          id, workspace_id, refill_amount, remaining, refill_day, last_refill_at, deleted_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        "#,
    )
    .bind(&key.id)
    .bind(&key.workspace_id)
    .bind(key.refill_amount)
    .bind(key.remaining)
    .bind(key.refill_day)
    .bind(key.last_refill_at)
    .bind(key.deleted_at)
    .execute(pool)
    .await
    .with_context(|| format!("insert_key failed key_id={}", key.id))?;

    Ok(())
}

/// Insert one audit log row (append-only semantics enforced at app layer).
pub async fn insert_audit_log(pool: &PgPool, log: &NewAuditLog) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_logs (
          audit_log_id, workspace_id, event, time_utc, actor_type, actor_id,
          description, resources, context
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(log.audit_log_id)
    .bind(&log.workspace_id)
    .bind(&log.event)
    .bind(log.time_utc)
    .bind(&log.actor_type)
    .bind(&log.actor_id)
    .bind(&log.description)
    .bind(&log.resources)
    .bind(&log.context)
    .execute(pool)
    .await
    .context("insert_audit_log failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub audit_log_id: Uuid,
    pub workspace_id: String,
    pub event: String,
    pub time_utc: DateTime<Utc>,
    pub actor_type: String,
    pub actor_id: String,
    pub description: String,
    pub resources: Value,
    pub context: Value,
}

pub async fn count_audit_logs_for_resource(pool: &PgPool, resource_id: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from audit_logs
        where resources @> jsonb_build_array(jsonb_build_object('id', $1::text))
        "#,
    )
    .bind(resource_id)
    .fetch_one(pool)
    .await
    .context("count_audit_logs_for_resource failed")?;

    Ok(n)
}
