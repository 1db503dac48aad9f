use chrono::Utc;
use krf_schemas::{DayCondition, Key};
use uuid::Uuid;

fn key(ws: &str, suffix: &str, refill_amount: Option<i64>, remaining: i64, refill_day: Option<i32>) -> Key {
    Key {
        id: format!("{ws}_{suffix}"),
        workspace_id: ws.to_string(),
        refill_amount,
        remaining,
        refill_day,
        last_refill_at: None,
        deleted_at: None,
    }
}

/// The SQL due-key query must apply the same predicate as `Key::is_refill_candidate`
/// plus the day condition.
///
/// DB-backed test, skipped if KRF_DATABASE_URL is not set.
#[tokio::test]
async fn due_keys_query_matches_predicate() -> anyhow::Result<()> {
    let url = match std::env::var(krf_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KRF_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    krf_db::migrate(&pool).await?;

    let ws = format!("ws_{}", Uuid::new_v4().as_simple());
    let mut deleted = key(&ws, "deleted", Some(100), 5, None);
    deleted.deleted_at = Some(Utc::now());

    let fixtures = vec![
        key(&ws, "daily", Some(100), 5, None),
        key(&ws, "day15", Some(100), 50, Some(15)),
        key(&ws, "day16", Some(100), 50, Some(16)),
        key(&ws, "day31", Some(100), 5, Some(31)),
        key(&ws, "full", Some(100), 100, None),
        key(&ws, "nopolicy", None, 0, None),
        deleted,
    ];
    for k in &fixtures {
        krf_db::insert_key(&pool, k).await?;
    }

    let ids_for = |keys: Vec<Key>| -> Vec<String> {
        keys.into_iter()
            .filter(|k| k.workspace_id == ws)
            .map(|k| k.id)
            .collect()
    };

    let normal = ids_for(krf_db::fetch_due_keys(&pool, DayCondition::Exactly(15)).await?);
    assert_eq!(normal, vec![format!("{ws}_daily"), format!("{ws}_day15")]);

    let end_of_month = ids_for(krf_db::fetch_due_keys(&pool, DayCondition::AtLeast(29)).await?);
    assert_eq!(end_of_month, vec![format!("{ws}_daily"), format!("{ws}_day31")]);

    Ok(())
}
