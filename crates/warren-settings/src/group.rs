//! One in-memory configuration group with change tracking.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use crate::error::{SettingsError, SettingsResult};
use crate::schema::{defaults, GroupName};
use crate::value::{kind_of, kinds_conflict, ValueKind};

/// In-memory view of a group: stored overrides layered over field defaults,
/// plus the uncommitted dirty set.
#[derive(Debug, Clone)]
pub struct ConfigGroup {
    name: GroupName,
    defaults: BTreeMap<&'static str, Value>,
    values: BTreeMap<String, Value>,
    dirty: BTreeMap<String, Value>,
    cleared: BTreeSet<String>,
}

impl ConfigGroup {
    /// Build an empty group holding only its defaults.
    #[must_use]
    pub fn new(name: GroupName) -> Self {
        Self {
            name,
            defaults: defaults(name).into_iter().collect(),
            values: BTreeMap::new(),
            dirty: BTreeMap::new(),
            cleared: BTreeSet::new(),
        }
    }

    /// Replace the stored overrides with a freshly loaded document.
    ///
    /// Keys not present in the schema are ignored with a warning; a newer
    /// node version may have written fields this build does not know.
    /// Discards any uncommitted changes.
    pub fn load(&mut self, doc: serde_json::Map<String, Value>) {
        self.values.clear();
        self.dirty.clear();
        self.cleared.clear();
        for (field, value) in doc {
            if self.defaults.contains_key(field.as_str()) {
                self.values.insert(field, value);
            } else {
                warn!(group = %self.name, field, "ignoring unknown stored field");
            }
        }
    }

    /// Group this view belongs to.
    #[must_use]
    pub const fn name(&self) -> GroupName {
        self.name
    }

    /// Effective value of a field: pending change, then stored override,
    /// then default.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] for fields outside the schema.
    pub fn get(&self, field: &str) -> SettingsResult<&Value> {
        if self.cleared.contains(field) {
            return self
                .defaults
                .get(field)
                .ok_or_else(|| SettingsError::not_found(self.name.as_str(), Some(field)));
        }
        self.dirty
            .get(field)
            .or_else(|| self.values.get(field))
            .or_else(|| self.defaults.get(field))
            .ok_or_else(|| SettingsError::not_found(self.name.as_str(), Some(field)))
    }

    /// The type a field is currently committed to, if any.
    ///
    /// A cleared field reverts to its default's kind, matching what a
    /// committed unset followed by a reload would report.
    fn established_kind(&self, field: &str) -> Option<ValueKind> {
        if self.cleared.contains(field) {
            return self.defaults.get(field).map(kind_of);
        }
        let current = self
            .dirty
            .get(field)
            .or_else(|| self.values.get(field))
            .or_else(|| self.defaults.get(field))?;
        Some(kind_of(current))
    }

    /// Stage a new value for a field.
    ///
    /// The value's type must match the field's established type; a null
    /// established type (optional field never set) accepts any type.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] for unknown fields and
    /// [`SettingsError::TypeMismatch`] on a type conflict.
    pub fn set(&mut self, field: &str, value: Value) -> SettingsResult<()> {
        let Some(established) = self.established_kind(field) else {
            return Err(SettingsError::not_found(self.name.as_str(), Some(field)));
        };
        let incoming = kind_of(&value);
        if kinds_conflict(established, incoming) {
            return Err(SettingsError::TypeMismatch {
                group: self.name.as_str().to_string(),
                field: field.to_string(),
                expected: established,
                provided: incoming,
            });
        }
        self.cleared.remove(field);
        self.dirty.insert(field.to_string(), value);
        Ok(())
    }

    /// Stage removal of a field's override, restoring its default.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] for unknown fields.
    pub fn unset(&mut self, field: &str) -> SettingsResult<()> {
        if !self.defaults.contains_key(field) {
            return Err(SettingsError::not_found(self.name.as_str(), Some(field)));
        }
        self.dirty.remove(field);
        self.cleared.insert(field.to_string());
        Ok(())
    }

    /// Field names in the schema, in stable order.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.defaults.keys().copied().collect()
    }

    /// Whether uncommitted changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.cleared.is_empty()
    }

    /// The staged changes: values to write and fields to clear.
    #[must_use]
    pub fn pending(&self) -> (BTreeMap<String, Value>, Vec<String>) {
        (
            self.dirty.clone(),
            self.cleared.iter().cloned().collect(),
        )
    }

    /// Fold the staged changes into the stored view after a successful
    /// commit.
    pub fn mark_clean(&mut self) {
        for field in std::mem::take(&mut self.cleared) {
            self.values.remove(&field);
        }
        for (field, value) in std::mem::take(&mut self.dirty) {
            self.values.insert(field, value);
        }
    }

    /// Values that differ from the defaults, committed view only.
    ///
    /// Used by the file-backed group to persist a minimal document.
    #[must_use]
    pub fn overrides(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .filter(|(field, value)| self.defaults.get(field.as_str()) != Some(value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_show_through_until_set() {
        let group = ConfigGroup::new(GroupName::App);
        assert_eq!(group.get("server_name").unwrap(), &json!("warren"));
        assert_eq!(group.get("log_limit").unwrap(), &json!(1_000));
    }

    #[test]
    fn set_stages_and_get_reflects_it() {
        let mut group = ConfigGroup::new(GroupName::App);
        group.set("server_name", json!("edge-1")).unwrap();
        assert_eq!(group.get("server_name").unwrap(), &json!("edge-1"));
        assert!(group.is_dirty());
    }

    #[test]
    fn set_rejects_type_conflicts() {
        let mut group = ConfigGroup::new(GroupName::App);
        let err = group.set("log_limit", json!("lots")).unwrap_err();
        assert!(matches!(err, SettingsError::TypeMismatch { .. }));
    }

    #[test]
    fn null_default_accepts_any_type_once() {
        let mut group = ConfigGroup::new(GroupName::User);
        group.set("device_key_override", json!(1_234)).unwrap();
        let err = group
            .set("device_key_override", json!("later"))
            .unwrap_err();
        assert!(matches!(err, SettingsError::TypeMismatch { .. }));
    }

    #[test]
    fn unset_releases_an_established_kind() {
        let mut group = ConfigGroup::new(GroupName::User);
        group.load(
            json!({"device_key_override": 1_234})
                .as_object()
                .cloned()
                .unwrap(),
        );
        group.unset("device_key_override").unwrap();
        // Back at the null default, any kind is accepted again.
        group.set("device_key_override", json!("key-text")).unwrap();
        assert_eq!(
            group.get("device_key_override").unwrap(),
            &json!("key-text")
        );
    }

    #[test]
    fn unset_keeps_a_non_null_default_kind() {
        let mut group = ConfigGroup::new(GroupName::App);
        group.set("server_name", json!("edge-1")).unwrap();
        group.unset("server_name").unwrap();
        let err = group.set("server_name", json!(7)).unwrap_err();
        assert!(matches!(err, SettingsError::TypeMismatch { .. }));
    }

    #[test]
    fn setting_null_clears_toward_default() {
        let mut group = ConfigGroup::new(GroupName::User);
        group.set("device_key_override", json!(1_234)).unwrap();
        group.set("device_key_override", Value::Null).unwrap();
        assert_eq!(group.get("device_key_override").unwrap(), &Value::Null);
    }

    #[test]
    fn unset_restores_default_immediately() {
        let mut group = ConfigGroup::new(GroupName::App);
        group.load(
            json!({"server_name": "edge-1"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(group.get("server_name").unwrap(), &json!("edge-1"));
        group.unset("server_name").unwrap();
        assert_eq!(group.get("server_name").unwrap(), &json!("warren"));
        assert!(group.is_dirty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut group = ConfigGroup::new(GroupName::App);
        assert!(group.get("no_such").is_err());
        assert!(group.set("no_such", json!(1)).is_err());
        assert!(group.unset("no_such").is_err());
    }

    #[test]
    fn load_ignores_unknown_stored_fields() {
        let mut group = ConfigGroup::new(GroupName::App);
        group.load(
            json!({"server_name": "edge-1", "from_the_future": 9})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(group.get("server_name").unwrap(), &json!("edge-1"));
        assert!(group.get("from_the_future").is_err());
    }

    #[test]
    fn mark_clean_folds_pending_into_stored() {
        let mut group = ConfigGroup::new(GroupName::App);
        group.set("server_name", json!("edge-1")).unwrap();
        group.unset("session_timeout").unwrap();
        let (dirty, cleared) = group.pending();
        assert_eq!(dirty.len(), 1);
        assert_eq!(cleared, vec!["session_timeout".to_string()]);
        group.mark_clean();
        assert!(!group.is_dirty());
        assert_eq!(group.get("server_name").unwrap(), &json!("edge-1"));
    }

    #[test]
    fn overrides_skip_values_equal_to_defaults() {
        let mut group = ConfigGroup::new(GroupName::Conf);
        group.load(
            json!({"database_uri": "postgres://localhost/warren", "host_id": "abc"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let overrides = group.overrides();
        assert!(!overrides.contains_key("database_uri"));
        assert_eq!(overrides.get("host_id"), Some(&json!("abc")));
    }
}
