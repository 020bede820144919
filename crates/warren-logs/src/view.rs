//! Reading, tailing, and archiving the operator log stream.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::postgres::PgListener;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, warn};
use warren_data::CappedStore;

use crate::entry::LogEntry;
use crate::error::{LogError, LogResult};
use crate::store::LOGS_STREAM;

/// File name used when an archive destination is a directory.
const ARCHIVE_FILE_NAME: &str = "warren.log";

/// Poll interval while tailing without (or alongside) a LISTEN connection.
const TAIL_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Base delay after a transient tail failure; doubles per consecutive failure.
const TAIL_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Consecutive failures after which the tail gives up.
const TAIL_MAX_FAILURES: u32 = 5;

/// Read-side view over the operator log stream.
#[derive(Debug, Clone)]
pub struct LogView {
    capped: CappedStore,
    database_uri: String,
}

impl LogView {
    /// Wrap a capped store; the URI is kept for dedicated LISTEN connections.
    #[must_use]
    pub fn new(capped: CappedStore, database_uri: impl Into<String>) -> Self {
        Self {
            capped,
            database_uri: database_uri.into(),
        }
    }

    /// Render stored log lines.
    ///
    /// `natural` reads in raw insertion order from the start of the stream;
    /// the default order is the exact reverse, newest first, so `limit`
    /// keeps the most recent records. Callers wanting a terminal-style
    /// oldest-to-newest listing reverse the returned batch themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_log_lines(
        &self,
        natural: bool,
        limit: Option<i64>,
        formatted: bool,
    ) -> LogResult<Vec<String>> {
        let rows = self
            .capped
            .rows(LOGS_STREAM, natural, limit)
            .await
            .map_err(LogError::storage("logs.view"))?;
        Ok(rows
            .iter()
            .map(|row| LogEntry::from_row(row).format_line(formatted))
            .collect())
    }

    /// Follow the log stream from its current end.
    ///
    /// Only records appended after this call are yielded; history is never
    /// replayed. Tailing listens for append notifications and additionally
    /// polls at a fixed interval, so a missed notification delays a record
    /// rather than losing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the current stream position cannot be read.
    pub async fn tail_log_lines(&self) -> LogResult<LogTail> {
        let cursor = self
            .capped
            .latest_id(LOGS_STREAM)
            .await
            .map_err(LogError::storage("logs.tail.cursor"))?;

        let channel = self.capped.names().stream_channel(LOGS_STREAM);
        let listener = match Self::open_listener(&self.database_uri, &channel).await {
            Ok(listener) => Some(listener),
            Err(error) => {
                warn!(%error, "log tail falling back to polling only");
                None
            }
        };

        Ok(LogTail {
            capped: self.capped.clone(),
            pending: VecDeque::new(),
            cursor,
            listener,
            failures: 0,
        })
    }

    async fn open_listener(uri: &str, channel: &str) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect(uri).await?;
        listener.listen(channel).await?;
        Ok(listener)
    }

    /// Write stored log lines to a file and return its path.
    ///
    /// A directory destination gets a `warren.log` inside it. Lines are
    /// written in the order the view returns them, without color codes
    /// regardless of terminal settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or the file write fails.
    pub async fn archive_log(
        &self,
        destination: &Path,
        natural: bool,
        limit: Option<i64>,
    ) -> LogResult<PathBuf> {
        let lines = self.get_log_lines(natural, limit, false).await?;
        let path = match fs::metadata(destination).await {
            Ok(meta) if meta.is_dir() => destination.join(ARCHIVE_FILE_NAME),
            _ => destination.to_path_buf(),
        };
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(&path, body)
            .await
            .map_err(LogError::io("logs.archive"))?;
        debug!(path = %path.display(), "log archive written");
        Ok(path)
    }
}

/// Live follow over the operator log stream.
///
/// Dropping the tail releases its LISTEN connection.
pub struct LogTail {
    capped: CappedStore,
    pending: VecDeque<LogEntry>,
    cursor: i64,
    listener: Option<PgListener>,
    failures: u32,
}

impl LogTail {
    /// Wait for and return the next appended record.
    ///
    /// Transient storage failures are retried with exponential backoff; the
    /// tail ends with an error only after repeated consecutive failures.
    ///
    /// # Errors
    ///
    /// Returns an error once the failure budget is exhausted.
    pub async fn next(&mut self) -> LogResult<LogEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(entry);
            }
            match self.capped.rows_after(LOGS_STREAM, self.cursor).await {
                Ok(rows) if !rows.is_empty() => {
                    self.failures = 0;
                    // rows_after returns ascending ids, so the cursor only
                    // ever moves forward and no record is yielded twice.
                    if let Some(last) = rows.last() {
                        self.cursor = last.id;
                    }
                    self.pending
                        .extend(rows.iter().map(LogEntry::from_row));
                }
                Ok(_) => {
                    self.failures = 0;
                    self.wait_for_activity().await;
                }
                Err(source) => {
                    self.failures += 1;
                    if self.failures >= TAIL_MAX_FAILURES {
                        return Err(LogError::storage("logs.tail.next")(source));
                    }
                    let backoff = TAIL_BACKOFF_BASE * 2_u32.saturating_pow(self.failures - 1);
                    warn!(failures = self.failures, "log tail retrying after error");
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Block until an append notification arrives or the poll interval
    /// elapses, whichever comes first.
    async fn wait_for_activity(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            tokio::select! {
                received = listener.recv() => {
                    if let Err(error) = received {
                        warn!(%error, "log tail listener lost, polling only");
                        self.listener = None;
                    }
                }
                () = sleep(TAIL_POLL_INTERVAL) => {}
            }
        } else {
            sleep(TAIL_POLL_INTERVAL).await;
        }
    }
}
