use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Group assigned to entries that carry no explicit group label.
pub const UNGROUPED: &str = "ungrouped";

/// Sentinel environment name tagging static bookmark entries.
pub const BOOKMARK_ENVIRONMENT: &str = "bookmark";

// ── Upstream shapes ──────────────────────────────────────────────

/// A deployment context reported by the container API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_ip: String,
}

/// One running workload unit as reported by the container API.
/// Only `state`, `ports`, `networks` and `labels` drive derivation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<PortBinding>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub networks: HashMap<String, NetworkAttachment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

impl RawRecord {
    /// Label value, ignoring blank values.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    #[serde(default, alias = "IP", deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, alias = "PrivatePort")]
    pub private_port: Option<u16>,
    #[serde(default, alias = "PublicPort")]
    pub public_port: Option<u16>,
    /// `tcp` / `udp`. Docker reports this as `Type`.
    #[serde(default, alias = "type", alias = "Type")]
    pub protocol: Option<String>,
}

impl PortBinding {
    /// A missing protocol is treated as TCP.
    pub fn is_tcp(&self) -> bool {
        self.protocol
            .as_deref()
            .is_none_or(|p| p.eq_ignore_ascii_case("tcp"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachment {
    #[serde(default, alias = "IPAddress", deserialize_with = "null_as_default")]
    pub ip_address: String,
}

/// Reverse-proxy manager host, used only for the
/// `forwardHost:forwardPort -> public domain` reverse lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyHost {
    #[serde(default, deserialize_with = "loose_bool")]
    pub enabled: bool,
    #[serde(default, alias = "domainNames", deserialize_with = "null_as_default")]
    pub domain_names: Vec<String>,
    #[serde(default, alias = "forwardHost", deserialize_with = "null_as_default")]
    pub forward_host: String,
    #[serde(default, alias = "forwardPort", deserialize_with = "null_as_default")]
    pub forward_port: u16,
    #[serde(default, alias = "sslForced", deserialize_with = "loose_bool")]
    pub ssl_forced: bool,
    /// Number, string (`"new"`) or null depending on the manager version.
    #[serde(default, alias = "certificateId")]
    pub certificate_id: Value,
}

impl ProxyHost {
    /// `https` when SSL is forced or any certificate is attached.
    pub fn uses_tls(&self) -> bool {
        self.ssl_forced || has_certificate(&self.certificate_id)
    }

    pub fn scheme(&self) -> &'static str {
        if self.uses_tls() { "https" } else { "http" }
    }
}

fn has_certificate(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "0"
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ── Derived shapes ───────────────────────────────────────────────

/// Value copy of the environment an entry came from. Stays valid after
/// the source environment is replaced by a later refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRef {
    pub id: String,
    pub name: String,
    pub public_ip: String,
}

impl EnvironmentRef {
    /// Sentinel reference for static bookmarks.
    pub fn bookmark() -> Self {
        Self {
            id: BOOKMARK_ENVIRONMENT.to_string(),
            name: BOOKMARK_ENVIRONMENT.to_string(),
            public_ip: String::new(),
        }
    }

    pub fn is_bookmark(&self) -> bool {
        self.name == BOOKMARK_ENVIRONMENT
    }
}

impl From<&Environment> for EnvironmentRef {
    fn from(env: &Environment) -> Self {
        Self {
            id: env.id.clone(),
            name: env.name.clone(),
            public_ip: env.public_ip.clone(),
        }
    }
}

/// Display-ready entry, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEntry {
    pub id: String,
    pub display_name: String,
    pub group: String,
    pub environment_ref: EnvironmentRef,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub icon_url: String,
    #[serde(default)]
    pub image: String,
}

/// Published view of all entries and environments from one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub environments: Vec<Environment>,
    pub entries: Vec<DisplayEntry>,
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a successful cycle.
    pub fn fresh(
        environments: Vec<Environment>,
        entries: Vec<DisplayEntry>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            environments,
            entries,
            last_update_time: Some(at),
            last_error: None,
        }
    }

    /// Previous data carried over with the failure recorded.
    pub fn failed(previous: &Snapshot, error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            environments: previous.environments.clone(),
            entries: previous.entries.clone(),
            last_update_time: Some(at),
            last_error: Some(error.into()),
        }
    }
}

/// Entries sharing one group name, as rendered on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryGroup {
    pub name: String,
    pub entries: Vec<DisplayEntry>,
}

/// Counts and last refresh state for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub environments: usize,
    pub entries: usize,
    pub bookmarks: usize,
    pub groups: usize,
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub refreshing: bool,
    /// Completed refresh cycles since startup.
    pub cycles: u64,
}

// ── Serde helpers ────────────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Accepts `true`/`false`, `0`/`1`, `"true"`/`"1"` and null.
fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    })
}
