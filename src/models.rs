//! Data structures for server records and API request bodies.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Partial update applied to a [`ServerRecord`] by shallow merge.
pub type ServerPatch = Map<String, Value>;

/// One managed backend instance, as returned by `/api/servers`.
///
/// Only `id` and `enabled` are interpreted. Everything else the backend sends
/// (name, description, status, player counts) rides along in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServerRecord {
    pub fn new(id: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            enabled,
            fields: Map::new(),
        }
    }

    /// Builder-style helper for attaching a field. `id` and `enabled` go
    /// through [`ServerRecord::merge`] so they never land in `fields`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut patch = ServerPatch::new();
        patch.insert(key.into(), value.into());
        self.merge(&patch);
        self
    }

    /// Display name, if the backend sent one.
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(|n| n.as_str())
    }

    /// Shallow merge: patch keys overwrite, unlisted keys are kept.
    /// `id` is never rewritten; `enabled` only accepts a JSON boolean.
    pub fn merge(&mut self, patch: &ServerPatch) {
        for (key, value) in patch {
            match key.as_str() {
                "id" => {
                    if value.as_str() != Some(self.id.as_str()) {
                        tracing::debug!(server = %self.id, "ignoring id in server patch");
                    }
                }
                "enabled" => match value.as_bool() {
                    Some(enabled) => self.enabled = enabled,
                    None => {
                        tracing::warn!(server = %self.id, value = %value, "ignoring non-boolean enabled in server patch");
                    }
                },
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Body of `GET /api/servers`. The backend sends `"servers": null` when
/// nothing is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub servers: Vec<ServerRecord>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /api/servers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCreateRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Body of `PUT /api/servers/{id}`. Unset fields are left alone by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

impl ServerUpdateRequest {
    /// The registry-side patch matching this update, so the local copy can be
    /// merged without refetching.
    pub fn to_patch(&self) -> ServerPatch {
        let mut patch = ServerPatch::new();
        if let Some(ref name) = self.name {
            patch.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(ref description) = self.description {
            patch.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(enabled) = self.enabled {
            patch.insert("enabled".to_string(), Value::Bool(enabled));
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.enabled.is_none() && self.config.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub seconds: u32,
    pub message: String,
}

/// Whitelist entry; any one of the identifiers is enough for the backend to match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steam_id: String,
    #[serde(default)]
    pub player_uid: String,
}

/// A saved RCON command template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RconCommand {
    pub command: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub remark: String,
}

/// Runs a saved RCON command by uuid, with `content` filling its placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconSendRequest {
    pub uuid: String,
    #[serde(default)]
    pub content: String,
}

/// Query for player listings. Unset values are left out of the query string.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<bool>,
}

/// Query for backup listings; bounds are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

/// Where a data sync pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Rest,
    Sav,
}

impl SyncSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Rest => "rest",
            SyncSource::Sav => "sav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_keeps_unknown_fields() {
        let raw = json!({"id": "s1", "enabled": true, "name": "Main", "online_count": 3});
        let record: ServerRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.id, "s1");
        assert!(record.enabled);
        assert_eq!(record.name(), Some("Main"));
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn missing_enabled_defaults_to_false() {
        let record: ServerRecord = serde_json::from_value(json!({"id": "s1"})).unwrap();
        assert!(!record.enabled);
    }

    #[test]
    fn merge_overwrites_listed_and_keeps_the_rest() {
        let mut record = ServerRecord::new("s1", true)
            .with_field("name", "Old")
            .with_field("description", "kept");
        let patch = json!({"name": "New", "enabled": false, "max_players": 32});
        record.merge(patch.as_object().unwrap());

        assert_eq!(record.name(), Some("New"));
        assert!(!record.enabled);
        assert_eq!(record.fields["description"], "kept");
        assert_eq!(record.fields["max_players"], 32);
    }

    #[test]
    fn merge_ignores_id_and_non_boolean_enabled() {
        let mut record = ServerRecord::new("s1", true);
        let patch = json!({"id": "other", "enabled": "no"});
        record.merge(patch.as_object().unwrap());

        assert_eq!(record.id, "s1");
        assert!(record.enabled);
        assert!(record.fields.is_empty());
    }

    #[test]
    fn with_field_routes_identity_keys() {
        let record = ServerRecord::new("a", true)
            .with_field("id", "b")
            .with_field("enabled", false)
            .with_field("name", "A");
        assert_eq!(record.id, "a");
        assert!(!record.enabled);
        assert_eq!(record.fields.len(), 1);

        let text = serde_json::to_string(&record).unwrap();
        let back: ServerRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn server_list_decodes_backend_bodies() {
        let list: ServerList = serde_json::from_str(r#"{"servers":null}"#).unwrap();
        assert!(list.servers.is_empty());
        let list: ServerList = serde_json::from_str(r#"{"servers":[]}"#).unwrap();
        assert!(list.servers.is_empty());
        let list: ServerList = serde_json::from_str("{}").unwrap();
        assert!(list.servers.is_empty());
    }

    #[test]
    fn server_list_keeps_status_fields() {
        let entry = json!({
            "id": "main",
            "name": "Main",
            "description": "PvE",
            "enabled": true,
            "status": "online",
            "online_count": 4,
            "max_players": 32
        });
        let list: ServerList = serde_json::from_value(json!({"servers": [entry.clone(), {"id": "alt", "enabled": false}]})).unwrap();

        assert_eq!(list.servers.len(), 2);
        let main = &list.servers[0];
        assert_eq!(main.id, "main");
        assert!(main.enabled);
        assert_eq!(main.name(), Some("Main"));
        assert_eq!(main.fields["status"], "online");
        assert_eq!(main.fields["online_count"], 4);
        assert_eq!(serde_json::to_value(main).unwrap(), entry);
        assert!(!list.servers[1].enabled);
    }

    #[test]
    fn update_request_patch_skips_config() {
        let update = ServerUpdateRequest {
            name: Some("Renamed".to_string()),
            enabled: Some(true),
            config: Some(Map::new()),
            ..Default::default()
        };
        let patch = update.to_patch();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch["name"], "Renamed");
        assert_eq!(patch["enabled"], true);
    }

    #[test]
    fn empty_queries_serialize_to_nothing() {
        let body = serde_json::to_value(PlayerListQuery::default()).unwrap();
        assert_eq!(body, json!({}));
        let body = serde_json::to_value(BackupListQuery { start_time: Some(5), end_time: None }).unwrap();
        assert_eq!(body, json!({"startTime": 5}));
    }
}
