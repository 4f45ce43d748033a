// ── Wire models for the Zaptec cloud API ──
//
// The vendor serializes everything in PascalCase. Each model declares
// the fields a response MUST carry -- deserialization doubles as shape
// validation -- and flattens the rest into `extra` so vendor additions
// pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paged list envelope (`{ "Data": [...], "Pages": N }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pages: i64,
}

/// An installation as reported by `installation` and `installation/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Installation {
    pub id: String,
    pub active: bool,
    pub authentication_type: i64,
    pub current_user_roles: i64,
    pub installation_type: i64,
    pub network_type: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_current: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A charger as reported by `chargers` and `chargers/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Charger {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub device_type: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The circuit/charger hierarchy of an installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Hierarchy {
    pub id: String,
    pub name: String,
    pub network_type: i64,
    pub circuits: Vec<Circuit>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A circuit inside an installation hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Circuit {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_current: Option<f64>,
    pub chargers: Vec<Charger>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One observation from `chargers/{id}/state`.
///
/// Most entries carry `ValueAsString`; the synthetic Pulse entry
/// (`StateId` -1) carries neither, and a few use `Value` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateEntry {
    pub state_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_as_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl StateEntry {
    /// The observation payload, preferring `Value` over `ValueAsString`.
    pub fn payload(&self) -> Option<Value> {
        self.value
            .clone()
            .or_else(|| self.value_as_string.clone().map(Value::String))
    }
}

/// Per-charger firmware status from `chargerFirmware/installation/{id}`.
///
/// The version fields are absent for chargers that are registered on the
/// platform but not yet initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChargerFirmware {
    pub charger_id: String,
    pub device_type: i64,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_up_to_date: Option<bool>,
}

/// OAuth token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// OAuth token endpoint error body (HTTP 400).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Turn a wire model back into the flat attribute object it was parsed
/// from. Serialization round-trips the flattened `extra` map, so the
/// caller sees every field the vendor sent.
pub fn to_attribute_object<T: Serialize>(model: &T) -> serde_json::Map<String, Value> {
    match serde_json::to_value(model) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
