//! Configuration schema: the fixed set of groups and their field defaults.

use serde_json::{json, Value};

use crate::error::{SettingsError, SettingsResult};

/// Hours a device registration key override stays active once set.
pub const DEVICE_KEY_OVERRIDE_TTL_HOURS: i64 = 8;

/// The fixed configuration groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupName {
    /// Cluster-wide application settings.
    App,
    /// User and device policy.
    User,
    /// Per-host addressing, keyed under the local host identifier.
    Host,
    /// Node-local bootstrap settings stored in a file, not the database.
    Conf,
}

impl GroupName {
    /// Every group, in display order.
    pub const ALL: [Self; 4] = [Self::App, Self::User, Self::Host, Self::Conf];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::User => "user",
            Self::Host => "host",
            Self::Conf => "conf",
        }
    }

    /// Resolve a group from its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NotFound`] for unknown names.
    pub fn parse(raw: &str) -> SettingsResult<Self> {
        match raw {
            "app" => Ok(Self::App),
            "user" => Ok(Self::User),
            "host" => Ok(Self::Host),
            "conf" => Ok(Self::Conf),
            other => Err(SettingsError::not_found(other, None)),
        }
    }

    /// Whether this group's document lives in the shared database.
    ///
    /// `conf` is file-backed: it holds the database URI itself and so must be
    /// readable before any connection exists.
    #[must_use]
    pub const fn is_database_backed(self) -> bool {
        !matches!(self, Self::Conf)
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Field defaults for a group. The default also fixes each field's type,
/// except null defaults which leave the type open until first set.
#[must_use]
pub fn defaults(group: GroupName) -> Vec<(&'static str, Value)> {
    match group {
        GroupName::App => vec![
            ("log_limit", json!(warren_data::DEFAULT_LOG_LIMIT)),
            ("log_entry_limit", json!(warren_data::DEFAULT_LOG_ENTRY_LIMIT)),
            ("server_name", json!("warren")),
            ("session_timeout", json!(86_400)),
        ],
        GroupName::User => vec![
            ("device_key_override", Value::Null),
            ("device_limit", json!(6)),
            ("pin_required", json!(false)),
        ],
        GroupName::Host => vec![
            ("public_address", Value::Null),
            ("sync_address", Value::Null),
            ("routed_subnets", json!([])),
        ],
        GroupName::Conf => vec![
            ("database_uri", json!("postgres://localhost/warren")),
            ("collection_prefix", Value::Null),
            ("host_id", Value::Null),
            ("log_path", Value::Null),
        ],
    }
}

/// Split a dotted address into its group and field components.
///
/// An address is exactly `group.field` with both parts non-empty; anything
/// else (missing dot, empty part, extra dots) is rejected before lookup.
///
/// # Errors
///
/// Returns [`SettingsError::InvalidAddress`] on malformed input.
pub fn parse_address(address: &str) -> SettingsResult<(&str, &str)> {
    let mut parts = address.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(group), Some(field), None) if !group.is_empty() && !field.is_empty() => {
            Ok((group, field))
        }
        _ => Err(SettingsError::InvalidAddress {
            address: address.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_names_round_trip() {
        for group in GroupName::ALL {
            assert_eq!(GroupName::parse(group.as_str()).unwrap(), group);
        }
        assert!(GroupName::parse("nope").is_err());
    }

    #[test]
    fn conf_is_file_backed() {
        assert!(!GroupName::Conf.is_database_backed());
        assert!(GroupName::App.is_database_backed());
        assert!(GroupName::Host.is_database_backed());
    }

    #[test]
    fn addresses_need_exactly_two_parts() {
        assert_eq!(parse_address("app.log_limit").unwrap(), ("app", "log_limit"));
        assert!(parse_address("app").is_err());
        assert!(parse_address("app.").is_err());
        assert!(parse_address(".log_limit").is_err());
        assert!(parse_address("app.log.limit").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn every_group_has_defaults() {
        for group in GroupName::ALL {
            assert!(!defaults(group).is_empty());
        }
    }
}
