// Typed endpoint surface over `ApiClient`.
//
// Paths mirror the vendor's REST layout. Everything returns parsed wire
// models from `models.rs`; shape mismatches surface as
// `ApiError::Validation` from the client's parse step.

use serde_json::Value;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{Charger, ChargerFirmware, Hierarchy, Installation, Paged, StateEntry};

impl ApiClient {
    /// Fetch the versioned constants catalog (`/api/constants`): command,
    /// setting, observation, and operation-mode code tables.
    pub async fn constants(&self) -> Result<Value, ApiError> {
        self.get_json("constants").await
    }

    // ── Installations ────────────────────────────────────────────────

    /// List installations visible to the account.
    pub async fn installations(&self) -> Result<Paged<Installation>, ApiError> {
        self.get_json("installation").await
    }

    /// Fetch full info for one installation.
    pub async fn installation(&self, id: &str) -> Result<Installation, ApiError> {
        self.get_json(&format!("installation/{id}")).await
    }

    /// Fetch the circuit/charger hierarchy of an installation.
    pub async fn installation_hierarchy(&self, id: &str) -> Result<Hierarchy, ApiError> {
        self.get_json(&format!("installation/{id}/hierarchy")).await
    }

    /// Update installation-wide settings (current limits, phase switch
    /// current). The payload is validated by the caller against the
    /// vendor's accepted argument set.
    pub async fn update_installation(&self, id: &str, body: &Value) -> Result<(), ApiError> {
        self.post_unit(&format!("installation/{id}/update"), Some(body))
            .await
    }

    /// Per-charger firmware status for an installation.
    pub async fn installation_firmware(
        &self,
        id: &str,
    ) -> Result<Vec<ChargerFirmware>, ApiError> {
        self.get_json(&format!("chargerFirmware/installation/{id}"))
            .await
    }

    // ── Chargers ─────────────────────────────────────────────────────

    /// List all chargers visible to the account, installations aside.
    pub async fn chargers(&self) -> Result<Paged<Charger>, ApiError> {
        self.get_json("chargers").await
    }

    /// Fetch full info for one charger.
    pub async fn charger(&self, id: &str) -> Result<Charger, ApiError> {
        self.get_json(&format!("chargers/{id}")).await
    }

    /// Fetch the observation list for one charger.
    pub async fn charger_state(&self, id: &str) -> Result<Vec<StateEntry>, ApiError> {
        self.get_json(&format!("chargers/{id}/state")).await
    }

    /// Send a numeric command to a charger.
    pub async fn send_command(&self, id: &str, code: i64) -> Result<(), ApiError> {
        self.post_unit(&format!("chargers/{id}/SendCommand/{code}"), None)
            .await
    }

    /// Update charger settings (`chargers/{id}/update`). Keys are
    /// whitelisted by the caller against the constants catalog.
    pub async fn update_charger(&self, id: &str, settings: &Value) -> Result<(), ApiError> {
        self.post_unit(&format!("chargers/{id}/update"), Some(settings))
            .await
    }

    /// Authorize the connected vehicle to charge.
    // NOTE: Undocumented API call.
    pub async fn authorize_charge(&self, id: &str) -> Result<(), ApiError> {
        self.post_unit(&format!("chargers/{id}/authorizecharge"), None)
            .await
    }

    /// Push device-local settings (cable lock, HMI brightness).
    // NOTE: Undocumented API call.
    pub async fn update_local_settings(&self, id: &str, body: &Value) -> Result<(), ApiError> {
        self.post_unit(&format!("chargers/{id}/localSettings"), Some(body))
            .await
    }
}
