use tokio::time::{Duration, timeout};
use warren_data::{CappedStore, Collections};
use warren_logs::{LOG_ENTRIES_STREAM, LOGS_STREAM, LogLevel, LogStore, LogView};
use warren_test_support::postgres::start_postgres;

async fn prepare(uri: &str) -> anyhow::Result<(LogStore, LogView)> {
    let names = Collections::new(None);
    let pool = warren_data::connect(uri).await?;
    warren_data::ensure_schema(&pool, &names).await?;
    let capped = CappedStore::new(pool, names);
    Ok((LogStore::new(capped.clone()), LogView::new(capped, uri)))
}

#[tokio::test]
async fn default_view_is_the_exact_reverse_of_natural_order() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping default_view_is_the_exact_reverse_of_natural_order: {err}");
            return Ok(());
        }
    };
    let (store, view) = prepare(postgres.connection_string()).await?;

    store.append(LogLevel::Info, "first").await?;
    store.append(LogLevel::Warn, "second").await?;
    store.append(LogLevel::Error, "third").await?;

    let natural = view.get_log_lines(true, None, false).await?;
    assert_eq!(natural.len(), 3);
    assert!(natural[0].ends_with("[INFO] first"));
    assert!(natural[1].ends_with("[WARN] second"));
    assert!(natural[2].ends_with("[ERROR] third"));

    let newest_first = view.get_log_lines(false, None, false).await?;
    let mut reversed = natural.clone();
    reversed.reverse();
    assert_eq!(newest_first, reversed);

    // A limit keeps the newest entries.
    let limited = view.get_log_lines(false, Some(2), false).await?;
    assert_eq!(limited.len(), 2);
    assert!(limited[0].ends_with("[ERROR] third"));
    assert!(limited[1].ends_with("[WARN] second"));

    // A natural-order limit keeps the oldest instead.
    let natural_limited = view.get_log_lines(true, Some(2), false).await?;
    assert!(natural_limited[0].ends_with("[INFO] first"));
    assert!(natural_limited[1].ends_with("[WARN] second"));
    Ok(())
}

#[tokio::test]
async fn archive_writes_plain_lines_to_a_directory() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping archive_writes_plain_lines_to_a_directory: {err}");
            return Ok(());
        }
    };
    let (store, view) = prepare(postgres.connection_string()).await?;
    store.append(LogLevel::Info, "archived line").await?;

    let dir = tempfile::tempdir()?;
    let path = view.archive_log(dir.path(), false, None).await?;
    assert_eq!(path, dir.path().join("warren.log"));

    let body = std::fs::read_to_string(&path)?;
    assert!(body.contains("[INFO] archived line"));
    assert!(!body.contains('\x1b'), "archives must not contain color codes");

    // An explicit file destination is used as-is.
    let file = dir.path().join("dump.txt");
    let path = view.archive_log(&file, false, None).await?;
    assert_eq!(path, file);
    Ok(())
}

#[tokio::test]
async fn tail_yields_only_entries_appended_after_start() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping tail_yields_only_entries_appended_after_start: {err}");
            return Ok(());
        }
    };
    let (store, view) = prepare(postgres.connection_string()).await?;

    store.append(LogLevel::Info, "before tail").await?;
    let mut tail = view.tail_log_lines().await?;

    store.append(LogLevel::Info, "after tail 1").await?;
    store.append(LogLevel::Info, "after tail 2").await?;

    let first = timeout(Duration::from_secs(10), tail.next())
        .await
        .expect("tail should yield")?;
    assert_eq!(first.message, "after tail 1", "history is not replayed");
    let second = timeout(Duration::from_secs(10), tail.next())
        .await
        .expect("tail should yield")?;
    assert_eq!(second.message, "after tail 2");
    Ok(())
}

#[tokio::test]
async fn recreating_streams_discards_entries_and_resizes_bounds() -> anyhow::Result<()> {
    let postgres = match start_postgres() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("skipping recreating_streams_discards_entries_and_resizes_bounds: {err}");
            return Ok(());
        }
    };
    let (store, _view) = prepare(postgres.connection_string()).await?;

    store.append(LogLevel::Info, "doomed").await?;
    store.append_entry(LogLevel::Info, "also doomed").await?;
    store.recreate_streams(10, 20).await?;

    let capped = store.capped();
    assert_eq!(capped.len(LOGS_STREAM).await?, 0);
    assert_eq!(capped.len(LOG_ENTRIES_STREAM).await?, 0);

    let bounds = capped.bounds(LOGS_STREAM).await?;
    assert_eq!(bounds.max_count, 10);
    assert_eq!(bounds.max_bytes, 10 * warren_data::LOG_BYTES_PER_ENTRY);
    let entry_bounds = capped.bounds(LOG_ENTRIES_STREAM).await?;
    assert_eq!(entry_bounds.max_count, 20);
    assert_eq!(
        entry_bounds.max_bytes,
        20 * warren_data::LOG_ENTRY_BYTES_PER_ENTRY
    );

    // The recreated stream accepts appends immediately.
    store.append(LogLevel::Info, "fresh start").await?;
    assert_eq!(capped.len(LOGS_STREAM).await?, 1);
    Ok(())
}
