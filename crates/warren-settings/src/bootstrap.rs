//! File-backed bootstrap configuration.
//!
//! The `conf` group holds the database URI, so it has to be readable before
//! any database connection exists. It lives in a JSON file on each node and
//! never propagates through the cluster.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::error::{SettingsError, SettingsResult};
use crate::group::ConfigGroup;
use crate::schema::GroupName;

/// The node-local `conf` group bound to its backing file.
#[derive(Debug)]
pub struct Bootstrap {
    path: PathBuf,
    group: ConfigGroup,
}

impl Bootstrap {
    /// Load the bootstrap file, creating it when absent.
    ///
    /// A missing file yields pure defaults. A null `host_id` is replaced with
    /// a freshly generated identifier and persisted immediately, so the node
    /// keeps the same identity across restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if persisting a generated `host_id` fails.
    pub async fn load(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let mut group = ConfigGroup::new(GroupName::Conf);

        match fs::read(&path).await {
            Ok(bytes) => {
                // Deserializing straight into a map rejects non-object
                // documents with the same error as malformed JSON.
                let doc: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)
                    .map_err(|source| SettingsError::BootstrapParse {
                        path: path.clone(),
                        source,
                    })?;
                group.load(doc);
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "bootstrap file absent, using defaults");
            }
            Err(source) => return Err(SettingsError::io("bootstrap.read")(source)),
        }

        let mut bootstrap = Self { path, group };
        if bootstrap.group.get("host_id")?.is_null() {
            let host_id = Uuid::new_v4().simple().to_string();
            info!(host_id, "generated host identifier");
            bootstrap.group.set("host_id", Value::String(host_id))?;
            bootstrap.commit().await?;
        }
        Ok(bootstrap)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory group, for reads and staged changes.
    #[must_use]
    pub const fn group(&self) -> &ConfigGroup {
        &self.group
    }

    /// Mutable access for staging changes before [`Self::commit`].
    pub const fn group_mut(&mut self) -> &mut ConfigGroup {
        &mut self.group
    }

    /// Persist the group to its file and fold staged changes in.
    ///
    /// Only values differing from the defaults are written. The document is
    /// written to a sibling temp file and renamed over the target, so a crash
    /// mid-write leaves either the old file or the new one, never a torn mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or rename fails.
    pub async fn commit(&mut self) -> SettingsResult<()> {
        self.group.mark_clean();
        let doc = Value::Object(self.group.overrides());
        let mut body = serde_json::to_vec_pretty(&doc).map_err(|source| {
            SettingsError::BootstrapParse {
                path: self.path.clone(),
                source,
            }
        })?;
        body.push(b'\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(SettingsError::io("bootstrap.mkdir"))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &body)
            .await
            .map_err(SettingsError::io("bootstrap.write"))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(SettingsError::io("bootstrap.rename"))?;
        Ok(())
    }

    /// Connection URI for the shared cluster database.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing from the schema.
    pub fn database_uri(&self) -> SettingsResult<String> {
        Ok(self
            .group
            .get("database_uri")?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Optional table-name prefix for multi-tenant databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing from the schema.
    pub fn collection_prefix(&self) -> SettingsResult<Option<String>> {
        Ok(self
            .group
            .get("collection_prefix")?
            .as_str()
            .map(str::to_string))
    }

    /// This node's stable identifier, generated on first load.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing from the schema.
    pub fn host_id(&self) -> SettingsResult<String> {
        Ok(self
            .group
            .get("host_id")?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Optional destination for the node's log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing from the schema.
    pub fn log_path(&self) -> SettingsResult<Option<PathBuf>> {
        Ok(self.group.get("log_path")?.as_str().map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn absent_file_yields_defaults_and_generated_host_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warren.json");
        let bootstrap = Bootstrap::load(&path).await.unwrap();
        assert_eq!(
            bootstrap.database_uri().unwrap(),
            "postgres://localhost/warren"
        );
        let host_id = bootstrap.host_id().unwrap();
        assert_eq!(host_id.len(), 32);
        // The generated identity was persisted.
        assert!(path.exists());
        let reloaded = Bootstrap::load(&path).await.unwrap();
        assert_eq!(reloaded.host_id().unwrap(), host_id);
    }

    #[tokio::test]
    async fn commit_persists_only_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warren.json");
        let mut bootstrap = Bootstrap::load(&path).await.unwrap();
        bootstrap
            .group_mut()
            .set("database_uri", json!("postgres://db0/warren"))
            .unwrap();
        bootstrap.commit().await.unwrap();

        let raw: Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let doc = raw.as_object().unwrap();
        assert_eq!(doc.get("database_uri"), Some(&json!("postgres://db0/warren")));
        assert!(doc.contains_key("host_id"));
        // Defaults are not written out.
        assert!(!doc.contains_key("collection_prefix"));
        assert!(!doc.contains_key("log_path"));
    }

    #[tokio::test]
    async fn malformed_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warren.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = Bootstrap::load(&path).await.unwrap_err();
        assert!(matches!(err, SettingsError::BootstrapParse { .. }));
    }

    #[tokio::test]
    async fn non_object_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warren.json");
        std::fs::write(&path, b"[1,2,3]").unwrap();
        let err = Bootstrap::load(&path).await.unwrap_err();
        assert!(matches!(err, SettingsError::BootstrapParse { .. }));
    }
}
