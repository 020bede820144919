//! Cluster-wide best-effort publish/subscribe over LISTEN/NOTIFY.
//!
//! Delivery is at-most-once per subscriber per publish: there is no
//! persistent queue, no redelivery, and no acknowledgment. A node that is
//! offline at publish time misses the notification and observes stale state
//! until its next independent reload trigger. Do not upgrade this contract
//! to guaranteed delivery; cluster behavior under partition depends on it.

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::debug;
use warren_data::Collections;

use crate::error::{EventError, EventResult};

/// Channel carrying host-config invalidation notices.
pub const HOSTS_CHANNEL: &str = "hosts";
/// Payload published when host-scoped configuration changes.
pub const HOSTS_UPDATED: &str = "updated";

/// Best-effort broadcast messenger shared by all cluster nodes.
#[derive(Debug, Clone)]
pub struct Messenger {
    pool: PgPool,
    names: Collections,
    database_uri: String,
}

impl Messenger {
    /// Wrap a pool; the URI is kept for dedicated LISTEN connections.
    #[must_use]
    pub fn new(pool: PgPool, names: Collections, database_uri: impl Into<String>) -> Self {
        Self {
            pool,
            names,
            database_uri: database_uri.into(),
        }
    }

    /// Broadcast `message` on `channel` to every currently subscribed node.
    ///
    /// Never blocks on subscriber delivery; the publisher learns nothing
    /// about how many peers received the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the NOTIFY statement fails.
    pub async fn publish(&self, channel: &str, message: &str) -> EventResult<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(self.names.message_channel(channel))
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(EventError::database("messenger.publish"))?;
        debug!(channel, message, "messenger broadcast");
        Ok(())
    }

    /// Subscribe to a channel on a dedicated LISTEN connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the LISTEN connection cannot be established.
    pub async fn subscribe(&self, channel: &str) -> EventResult<MessageStream> {
        let mut listener = PgListener::connect(&self.database_uri)
            .await
            .map_err(EventError::database("messenger.subscribe.connect"))?;
        listener
            .listen(&self.names.message_channel(channel))
            .await
            .map_err(EventError::database("messenger.subscribe.listen"))?;
        Ok(MessageStream { listener })
    }
}

/// Stream of messages received on one subscribed channel.
///
/// Dropping the stream releases the LISTEN connection.
pub struct MessageStream {
    listener: PgListener,
}

impl MessageStream {
    /// Receive the next broadcast payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the LISTEN connection fails; callers decide
    /// whether to resubscribe.
    pub async fn next(&mut self) -> EventResult<String> {
        let notification = self
            .listener
            .recv()
            .await
            .map_err(EventError::database("messenger.stream.recv"))?;
        Ok(notification.payload().to_string())
    }
}
