// ── Constants catalog ──
//
// The vendor encodes everything numerically: observations, settings,
// commands, operation modes, device types. The numeric codes are NOT
// stable API -- they are published by the `constants` endpoint so
// clients can stay current. This module is the only place that touches
// the raw numbers; everything downstream works with semantic names.
//
// The catalog is built once per (re)build from the fetched document and
// swapped atomically, so pollers never observe a half-updated table.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::modes::{ChargerCommand, OperationMode};

/// Observation codes excluded from the attribute map. These carry
/// factory-calibration blobs far too large for host state.
pub const EXCLUDED_OBSERVATIONS: [i64; 3] = [
    854, // PilotTestResults
    900, // ProductionTestResults
    980, // MIDCalibration
];

/// Valid keys for charger settings (`chargers/{id}/update`).
pub const UPDATE_PARAMS: [&str; 6] = [
    "maxChargeCurrent",
    "maxChargePhases",
    "minChargeCurrent",
    "offlineChargeCurrent",
    "offlineChargePhase",
    "meterValueInterval",
];

/// Charger model names by device-serial prefix.
/// From the vendor's device-type identification docs.
const CHARGER_MODELS: [(&str, &str); 12] = [
    ("ZCS", "Zaptec Pro"),
    ("ZPR", "Zaptec Pro"),
    ("ZCH", "Zaptec Pro"),
    ("ZPG", "Zaptec Pro"),
    ("ZAP", "Zaptec Go"),
    ("ZGB", "Zaptec Go"),
    ("ZAG", "Zaptec Go"),
    ("GPN", "Zaptec Go2"),
    ("GPG", "Zaptec Go2"),
    ("APH", "Zaptec Sense"),
    ("APG", "Zaptec Sense"),
    ("APM", "Zaptec Sense"),
];

/// Which code table to resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCategory {
    Observation,
    Setting,
    Command,
    OperationMode,
    DeviceType,
}

impl CodeCategory {
    fn label(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Setting => "setting",
            Self::Command => "command",
            Self::OperationMode => "operation mode",
            Self::DeviceType => "device type",
        }
    }
}

/// Bidirectional lookup between vendor codes and semantic names.
pub struct ConstantsCatalog {
    observation_names: HashMap<i64, String>,
    observation_codes: HashMap<String, i64>,
    setting_names: HashMap<i64, String>,
    setting_codes: HashMap<String, i64>,
    command_names: HashMap<i64, String>,
    command_codes: HashMap<String, i64>,
    operation_modes: HashMap<i64, String>,
    device_types: HashMap<i64, String>,
    authentication_types: HashMap<i64, String>,
    installation_types: HashMap<i64, String>,
    network_types: HashMap<i64, String>,
    user_roles: HashMap<String, i64>,
    /// Codes already reported as unknown, to log each only once.
    warned: Mutex<HashSet<(&'static str, i64)>>,
}

impl ConstantsCatalog {
    /// Empty catalog, used before the first `constants` fetch. Every
    /// lookup falls through to pass-through behavior.
    pub fn empty() -> Self {
        Self::from_document(&Value::Null, None)
    }

    /// Build the catalog from a fetched constants document.
    ///
    /// When `device_types` is given, the per-device-type `Schema`
    /// sub-tables for the discovered types are merged over the global
    /// tables -- newer chargers publish extra observation and command
    /// ids there.
    pub fn from_document(doc: &Value, device_types: Option<&HashSet<i64>>) -> Self {
        let observations = collect_codes(doc, "Observations", "ObservationIds", device_types);
        let settings = collect_codes(doc, "Settings", "SettingIds", device_types);
        let mut commands = collect_codes(doc, "Commands", "CommandIds", device_types);

        // Reverse lookup keeps the vendor spelling; the forward table
        // additionally accepts snake_case command names.
        let command_names = invert(&commands);
        let snake: Vec<(String, i64)> = commands
            .iter()
            .map(|(name, code)| (to_snake_case(name), *code))
            .collect();
        commands.extend(snake);

        Self {
            observation_names: invert(&observations),
            observation_codes: observations,
            setting_names: invert(&settings),
            setting_codes: settings,
            command_names,
            command_codes: commands,
            operation_modes: name_table(doc, "ChargerOperationModes"),
            device_types: name_table(doc, "DeviceTypes"),
            authentication_types: name_table(doc, "InstallationAuthenticationType"),
            installation_types: installation_type_table(doc),
            network_types: name_table(doc, "NetworkTypes"),
            user_roles: code_table(doc, "UserRoles"),
            warned: Mutex::new(HashSet::new()),
        }
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// Resolve a numeric code to its semantic name.
    pub fn resolve(&self, category: CodeCategory, code: i64) -> Result<&str, CoreError> {
        let table = match category {
            CodeCategory::Observation => &self.observation_names,
            CodeCategory::Setting => &self.setting_names,
            CodeCategory::Command => &self.command_names,
            CodeCategory::OperationMode => &self.operation_modes,
            CodeCategory::DeviceType => &self.device_types,
        };
        table
            .get(&code)
            .map(String::as_str)
            .ok_or(CoreError::UnknownCode {
                category: category.label(),
                code,
            })
    }

    /// Attribute key for an observation code: the snake_case semantic
    /// name, or a synthesized `state_id_{code}` key for codes the
    /// catalog has never heard of. Unknown codes are logged once and
    /// passed through -- vendor additions must not break the pipeline.
    pub fn observation_key(&self, code: i64) -> String {
        match self.observation_names.get(&code) {
            Some(name) => to_snake_case(name),
            None => {
                self.warn_once(CodeCategory::Observation.label(), code);
                format!("state_id_{code}")
            }
        }
    }

    /// Numeric code for an observation name (exact vendor spelling).
    pub fn observation_code(&self, name: &str) -> Option<i64> {
        self.observation_codes.get(name).copied()
    }

    /// Numeric code for a setting name.
    pub fn setting_code(&self, name: &str) -> Option<i64> {
        self.setting_codes.get(name).copied()
    }

    /// Numeric code for a command. Accepts the vendor PascalCase name
    /// or its snake_case form.
    pub fn command_code(&self, command: ChargerCommand) -> Option<i64> {
        self.command_codes.get(command.vendor_name()).copied()
    }

    /// Charger model name for a device-serial prefix (first three
    /// characters of the `DeviceId`).
    pub fn charger_model(serial_prefix: &str) -> Option<&'static str> {
        let prefix = serial_prefix.to_ascii_uppercase();
        CHARGER_MODELS
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(_, model)| *model)
    }

    // ── Attribute typing ─────────────────────────────────────────────

    /// Apply the semantic conversion for a known attribute key.
    ///
    /// Numeric enum codes become names, float-valued observations become
    /// numbers, the vendor's string booleans become booleans. Values
    /// that fail to convert are kept raw (and logged) rather than
    /// dropped.
    pub fn convert_attribute(&self, key: &str, value: Value) -> Value {
        let converted = match key {
            "charger_operation_mode" | "operating_mode" => self
                .enum_name(&self.operation_modes, &value)
                .map(Value::String),
            "device_type" => self.enum_name(&self.device_types, &value).map(Value::String),
            "authentication_type" => self
                .enum_name(&self.authentication_types, &value)
                .map(Value::String),
            "installation_type" => self
                .enum_name(&self.installation_types, &value)
                .map(Value::String),
            "network_type" => self
                .enum_name(&self.network_types, &value)
                .map(Value::String),
            "current_user_roles" => as_i64(&value).map(|bits| {
                Value::String(self.role_names(bits))
            }),

            "charge_current_installation_max_limit"
            | "charge_current_set"
            | "charger_max_current"
            | "charger_min_current"
            | "circuit_max_current"
            | "current_phase1"
            | "current_phase2"
            | "current_phase3"
            | "humidity"
            | "temperature_internal5"
            | "total_charge_power"
            | "total_charge_power_session"
            | "voltage_phase1"
            | "voltage_phase2"
            | "voltage_phase3" => as_f64(&value)
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),

            "active"
            | "authentication_required"
            | "final_stop_active"
            | "is_authorization_required"
            | "is_online"
            | "permanent_cable_lock" => as_bool(&value).map(Value::Bool),

            _ => return value,
        };

        match converted {
            Some(v) => v,
            None => {
                debug!(key, ?value, "attribute conversion failed, keeping raw value");
                value
            }
        }
    }

    /// Parse the effective operation mode out of an attribute value
    /// (already converted to a name, or still a raw code).
    pub fn operation_mode(&self, value: &Value) -> OperationMode {
        match value {
            Value::String(name) => {
                // Either a resolved name or a stringly-typed code.
                let direct = OperationMode::from_name(name);
                if direct != OperationMode::Unknown {
                    return direct;
                }
                name.parse::<i64>()
                    .ok()
                    .and_then(|code| self.operation_modes.get(&code))
                    .map(|n| OperationMode::from_name(n))
                    .unwrap_or_default()
            }
            v => as_i64(v)
                .and_then(|code| self.operation_modes.get(&code))
                .map(|n| OperationMode::from_name(n))
                .unwrap_or_default(),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn enum_name(&self, table: &HashMap<i64, String>, value: &Value) -> Option<String> {
        as_i64(value).and_then(|code| table.get(&code).cloned())
    }

    /// Names for a user-role bitmask, comma separated.
    fn role_names(&self, bits: i64) -> String {
        if bits == 0 {
            return "None".into();
        }
        let mut names: Vec<&str> = self
            .user_roles
            .iter()
            .filter(|(_, v)| **v != 0 && (**v & bits) == **v)
            .map(|(k, _)| k.as_str())
            .collect();
        names.sort_unstable();
        names.join(", ")
    }

    fn warn_once(&self, category: &'static str, code: i64) {
        let mut warned = self.warned.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if warned.insert((category, code)) {
            warn!(category, code, "unknown vendor code, passing through");
        }
    }
}

// ── Document parsing ────────────────────────────────────────────────

/// Collect a `name -> code` table: the global top-level table, plus the
/// per-device-type `Schema` sub-tables for the discovered types.
fn collect_codes(
    doc: &Value,
    top_key: &str,
    schema_key: &str,
    device_types: Option<&HashSet<i64>>,
) -> HashMap<String, i64> {
    let mut out = HashMap::new();
    if let Some(table) = doc.get(top_key).and_then(Value::as_object) {
        for (name, code) in table {
            if let Some(code) = code.as_i64() {
                out.insert(name.clone(), code);
            }
        }
    }

    if let Some(wanted) = device_types {
        if let Some(schemas) = doc.get("Schema").and_then(Value::as_object) {
            for schema in schemas.values() {
                let matches = schema
                    .get("DeviceType")
                    .and_then(Value::as_i64)
                    .is_some_and(|dt| wanted.contains(&dt));
                if !matches {
                    continue;
                }
                if let Some(table) = schema.get(schema_key).and_then(Value::as_object) {
                    for (name, code) in table {
                        if let Some(code) = code.as_i64() {
                            out.insert(name.clone(), code);
                        }
                    }
                }
            }
        }
    }
    out
}

fn invert(table: &HashMap<String, i64>) -> HashMap<i64, String> {
    table.iter().map(|(k, v)| (*v, k.clone())).collect()
}

/// A `code -> name` table from a `{name: code}` document entry.
fn name_table(doc: &Value, key: &str) -> HashMap<i64, String> {
    invert(&code_table(doc, key))
}

fn code_table(doc: &Value, key: &str) -> HashMap<String, i64> {
    doc.get(key)
        .and_then(Value::as_object)
        .map(|table| {
            table
                .iter()
                .filter_map(|(name, code)| code.as_i64().map(|c| (name.clone(), c)))
                .collect()
        })
        .unwrap_or_default()
}

/// `InstallationTypes` nests `{name: {Id, Name, ...}}` instead of a
/// flat code map.
fn installation_type_table(doc: &Value) -> HashMap<i64, String> {
    doc.get("InstallationTypes")
        .and_then(Value::as_object)
        .map(|table| {
            table
                .values()
                .filter_map(|entry| {
                    let id = entry.get("Id").and_then(Value::as_i64)?;
                    let name = entry.get("Name").and_then(Value::as_str)?;
                    Some((id, name.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}

// ── Value coercion ──────────────────────────────────────────────────

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Some(true),
            "false" | "0" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Convert `TurnOnThisButton` to `turn_on_this_button`.
pub fn to_snake_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 4);
    let chars: Vec<char> = word.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() {
                out.push('_');
            } else if prev.is_ascii_uppercase() && next_lower {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
