use chrono::Utc;
use serde_json::json;
use warren_data::{AuthLimiterStore, CappedStore, Collections, DataError, StreamBounds};
use warren_test_support::postgres::start_postgres;

async fn prepare(uri: &str) -> anyhow::Result<(sqlx::PgPool, Collections)> {
    let names = Collections::new(None);
    let pool = warren_data::connect(uri).await?;
    warren_data::ensure_schema(&pool, &names).await?;
    Ok((pool, names))
}

#[tokio::test]
async fn capped_stream_evicts_oldest_past_count_bound() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping capped_stream_evicts_oldest_past_count_bound: {err}");
            return Ok(());
        }
    };
    let (pool, names) = prepare(postgres.connection_string()).await?;
    let capped = CappedStore::new(pool, names);

    capped
        .recreate(
            "logs",
            StreamBounds {
                max_bytes: 1_048_576,
                max_count: 3,
            },
        )
        .await?;

    let mut ids = Vec::new();
    for n in 0..5 {
        let id = capped
            .append("logs", Utc::now(), &json!({"message": format!("entry {n}")}))
            .await?;
        ids.push(id);
    }

    assert_eq!(capped.len("logs").await?, 3);
    let rows = capped.rows("logs", true, None).await?;
    let kept: Vec<i64> = rows.iter().map(|row| row.id).collect();
    assert_eq!(kept, ids[2..].to_vec(), "oldest two entries evicted");
    Ok(())
}

#[tokio::test]
async fn capped_stream_byte_bound_never_evicts_newest_row() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping capped_stream_byte_bound_never_evicts_newest_row: {err}");
            return Ok(());
        }
    };
    let (pool, names) = prepare(postgres.connection_string()).await?;
    let capped = CappedStore::new(pool, names);

    capped
        .recreate(
            "logs",
            StreamBounds {
                max_bytes: 300,
                max_count: 100,
            },
        )
        .await?;

    // A single payload larger than the whole byte bound survives.
    let big = json!({"message": "x".repeat(400)});
    let first = capped.append("logs", Utc::now(), &big).await?;
    assert_eq!(capped.len("logs").await?, 1);

    // The next oversized append replaces it.
    let second = capped.append("logs", Utc::now(), &big).await?;
    let rows = capped.rows("logs", true, None).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, second);
    assert!(second > first);
    Ok(())
}

#[tokio::test]
async fn capped_stream_reads_honor_order_and_limit() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping capped_stream_reads_honor_order_and_limit: {err}");
            return Ok(());
        }
    };
    let (pool, names) = prepare(postgres.connection_string()).await?;
    let capped = CappedStore::new(pool, names);

    // Identical timestamps force the insertion id to break the tie.
    let stamp = Utc::now();
    for n in 0..4 {
        capped
            .append("events", stamp, &json!({"seq": n}))
            .await?;
    }

    let natural = capped.rows("events", true, None).await?;
    assert!(natural.windows(2).all(|pair| pair[0].id < pair[1].id));

    let newest = capped.rows("events", false, Some(2)).await?;
    assert_eq!(newest.len(), 2);
    assert!(newest[0].id > newest[1].id);
    assert_eq!(newest[0].id, natural.last().map_or(0, |row| row.id));

    let after = capped.rows_after("events", natural[1].id).await?;
    assert_eq!(after.len(), 2);
    assert!(after[0].id > natural[1].id);
    Ok(())
}

#[tokio::test]
async fn appending_to_unregistered_stream_is_rejected() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping appending_to_unregistered_stream_is_rejected: {err}");
            return Ok(());
        }
    };
    let (pool, names) = prepare(postgres.connection_string()).await?;
    let capped = CappedStore::new(pool, names);

    let err = capped
        .append("nonexistent", Utc::now(), &json!({}))
        .await
        .expect_err("unregistered stream must be rejected");
    assert!(matches!(err, DataError::UnknownStream { stream } if stream == "nonexistent"));
    Ok(())
}

#[tokio::test]
async fn auth_limiter_counts_and_clears() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping auth_limiter_counts_and_clears: {err}");
            return Ok(());
        }
    };
    let (pool, names) = prepare(postgres.connection_string()).await?;
    let limiter = AuthLimiterStore::new(pool, names);

    assert_eq!(limiter.record_attempt("user-a").await?, 1);
    assert_eq!(limiter.record_attempt("user-a").await?, 2);
    assert_eq!(limiter.record_attempt("user-b").await?, 1);
    assert_eq!(limiter.count().await?, 2);

    let removed = limiter.clear_all().await?;
    assert_eq!(removed, 2);
    assert_eq!(limiter.count().await?, 0);

    // Clearing an already-empty store is a no-op.
    assert_eq!(limiter.clear_all().await?, 0);
    Ok(())
}
