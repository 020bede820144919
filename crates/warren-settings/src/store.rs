//! The shared configuration store and its cluster invalidation hooks.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, info};
use warren_data::{CappedStore, Collections};
use warren_events::{Event, EventKind, EventStore, Messenger, HOSTS_CHANNEL, HOSTS_UPDATED};

use crate::bootstrap::Bootstrap;
use crate::error::{SettingsError, SettingsResult};
use crate::group::ConfigGroup;
use crate::schema::GroupName;

/// Handle to the cluster-shared configuration.
///
/// One document row per database-backed group, cached in memory per node.
/// Writes are staged locally and applied atomically on commit; peers learn of
/// host-scoped changes through the messenger and drop their cached copy.
///
/// Cloning is cheap; clones share the cache and the connection pool.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: PgPool,
    names: Collections,
    events: EventStore,
    messenger: Messenger,
    host_id: String,
    bootstrap: Arc<Mutex<Bootstrap>>,
    groups: Arc<Mutex<HashMap<GroupName, ConfigGroup>>>,
}

impl SettingsStore {
    /// Connect to the database named by the bootstrap file and prepare the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema preparation fails.
    pub async fn connect(bootstrap: Bootstrap) -> SettingsResult<Self> {
        let database_uri = bootstrap.database_uri()?;
        let prefix = bootstrap.collection_prefix()?;
        let host_id = bootstrap.host_id()?;

        let names = Collections::new(prefix.as_deref());
        let pool = warren_data::connect(&database_uri)
            .await
            .map_err(SettingsError::data("settings.connect"))?;
        warren_data::ensure_schema(&pool, &names)
            .await
            .map_err(SettingsError::data("settings.schema"))?;

        let capped = CappedStore::new(pool.clone(), names.clone());
        let events = EventStore::new(capped);
        let messenger = Messenger::new(pool.clone(), names.clone(), database_uri);

        info!(host_id, "settings store connected");
        Ok(Self {
            pool,
            names,
            events,
            messenger,
            host_id,
            bootstrap: Arc::new(Mutex::new(bootstrap)),
            groups: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The shared connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Collection names in effect for this store.
    #[must_use]
    pub const fn collections(&self) -> &Collections {
        &self.names
    }

    /// The audit event store.
    #[must_use]
    pub const fn events(&self) -> &EventStore {
        &self.events
    }

    /// The cluster messenger.
    #[must_use]
    pub const fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// This node's identifier.
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Document row name for a database-backed group.
    ///
    /// Host configuration is per node, so its row is keyed by host id.
    fn doc_name(&self, group: GroupName) -> String {
        match group {
            GroupName::Host => format!("host:{}", self.host_id),
            other => other.as_str().to_string(),
        }
    }

    async fn load_group(&self, group: GroupName) -> SettingsResult<ConfigGroup> {
        let query = format!(
            "SELECT doc FROM {} WHERE name = $1",
            self.names.settings()
        );
        let row: Option<(Value,)> = sqlx::query_as(&query)
            .bind(self.doc_name(group))
            .fetch_optional(&self.pool)
            .await
            .map_err(SettingsError::database("settings.load"))?;

        let mut loaded = ConfigGroup::new(group);
        if let Some((Value::Object(doc),)) = row {
            loaded.load(doc);
        }
        debug!(group = %group, "loaded configuration group");
        Ok(loaded)
    }

    /// Run `apply` against the cached group, loading it first when absent.
    async fn with_group<T>(
        &self,
        group: GroupName,
        apply: impl FnOnce(&mut ConfigGroup) -> SettingsResult<T>,
    ) -> SettingsResult<T> {
        if group == GroupName::Conf {
            let mut bootstrap = self.bootstrap.lock().await;
            return apply(bootstrap.group_mut());
        }
        let mut groups = self.groups.lock().await;
        if !groups.contains_key(&group) {
            let loaded = self.load_group(group).await?;
            groups.insert(group, loaded);
        }
        let cached = groups
            .get_mut(&group)
            .ok_or_else(|| SettingsError::not_found(group.as_str(), None))?;
        apply(cached)
    }

    /// Effective value of one field.
    ///
    /// # Errors
    ///
    /// Returns an error if the group or field is unknown or the load fails.
    pub async fn get(&self, group: GroupName, field: &str) -> SettingsResult<Value> {
        self.with_group(group, |cached| cached.get(field).cloned())
            .await
    }

    /// Every field of a group with its effective value, in stable order.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is unknown or the load fails.
    pub async fn get_group(
        &self,
        group: GroupName,
    ) -> SettingsResult<Vec<(String, Value)>> {
        self.with_group(group, |cached| {
            cached
                .fields()
                .into_iter()
                .map(|field| Ok((field.to_string(), cached.get(field)?.clone())))
                .collect()
        })
        .await
    }

    /// Stage a value for one field.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown fields or a type conflict.
    pub async fn set(
        &self,
        group: GroupName,
        field: &str,
        value: Value,
    ) -> SettingsResult<()> {
        self.with_group(group, |cached| cached.set(field, value))
            .await
    }

    /// Stage removal of one field's override.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown fields.
    pub async fn unset(&self, group: GroupName, field: &str) -> SettingsResult<()> {
        self.with_group(group, |cached| cached.unset(field)).await
    }

    /// Apply a group's staged changes atomically.
    ///
    /// The document row absorbs the staged writes and removals in one
    /// statement, so concurrent committers interleave at field granularity
    /// without ever observing a torn document. Host commits additionally
    /// record an audit event and broadcast an invalidation to peers; other
    /// database groups record an audit event only.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence or propagation fails.
    pub async fn commit(&self, group: GroupName) -> SettingsResult<()> {
        if group == GroupName::Conf {
            let mut bootstrap = self.bootstrap.lock().await;
            return bootstrap.commit().await;
        }

        // The cache lock is held across the write so two local commits of the
        // same group cannot interleave their pending sets.
        let mut groups = self.groups.lock().await;
        if !groups.contains_key(&group) {
            let loaded = self.load_group(group).await?;
            groups.insert(group, loaded);
        }
        let cached = groups
            .get_mut(&group)
            .ok_or_else(|| SettingsError::not_found(group.as_str(), None))?;
        if !cached.is_dirty() {
            return Ok(());
        }
        let (dirty, cleared) = cached.pending();

        let query = format!(
            "INSERT INTO {settings} (name, doc, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (name) DO UPDATE
             SET doc = (({settings}.doc || $2) - $3::text[]),
                 updated_at = now()",
            settings = self.names.settings()
        );
        sqlx::query(&query)
            .bind(self.doc_name(group))
            .bind(Value::Object(dirty.into_iter().collect()))
            .bind(&cleared)
            .execute(&self.pool)
            .await
            .map_err(SettingsError::database("settings.commit"))?;
        cached.mark_clean();
        drop(groups);

        match group {
            GroupName::Host => {
                let event = Event::new(EventKind::HostsUpdated).with_resource(&self.host_id);
                self.events
                    .publish(&event)
                    .await
                    .map_err(SettingsError::propagation("settings.commit.event"))?;
                self.messenger
                    .publish(HOSTS_CHANNEL, HOSTS_UPDATED)
                    .await
                    .map_err(SettingsError::propagation("settings.commit.notify"))?;
            }
            _ => {
                let event = Event::new(EventKind::SettingsChanged)
                    .with_resource(group.as_str());
                self.events
                    .publish(&event)
                    .await
                    .map_err(SettingsError::propagation("settings.commit.event"))?;
            }
        }
        info!(group = %group, "configuration committed");
        Ok(())
    }

    /// Drop a group's cached document so the next read reloads it.
    ///
    /// The whole group is dropped rather than patched: invalidation messages
    /// carry no field detail, and a full reload is cheap at this size.
    pub async fn invalidate(&self, group: GroupName) {
        if group == GroupName::Conf {
            return;
        }
        let mut groups = self.groups.lock().await;
        if groups.remove(&group).is_some() {
            debug!(group = %group, "invalidated cached group");
        }
    }

    /// Subscribe to host-config invalidations from peer nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the LISTEN subscription fails.
    pub async fn watch_invalidations(&self) -> SettingsResult<InvalidationWatcher> {
        let stream = self
            .messenger
            .subscribe(HOSTS_CHANNEL)
            .await
            .map_err(SettingsError::propagation("settings.watch"))?;
        Ok(InvalidationWatcher {
            store: self.clone(),
            stream,
        })
    }
}

/// Applies peer invalidation notices to the local cache as they arrive.
pub struct InvalidationWatcher {
    store: SettingsStore,
    stream: warren_events::MessageStream,
}

impl InvalidationWatcher {
    /// Wait for the next invalidation, drop the cached host group, and
    /// return the raw message payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying subscription fails.
    pub async fn next(&mut self) -> SettingsResult<String> {
        let payload = self
            .stream
            .next()
            .await
            .map_err(SettingsError::propagation("settings.watch.next"))?;
        self.store.invalidate(GroupName::Host).await;
        Ok(payload)
    }
}
