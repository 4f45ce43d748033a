// ── Charger operation modes and the command gate ──
//
// The vendor's charger state machine is server-driven: modes change
// through polling, never locally. What IS local is the legality check:
// pause/resume are only accepted in specific modes (vendor docs for
// commands 506/507), and resuming a finished session is a two-step
// sequence when native authentication is enabled. The transition table
// lives here so both steps are visible and testable in isolation.

use strum::{Display, EnumString};

/// The vendor's charger operation mode.
///
/// Parsed from the `Connected_*` strings the constants catalog resolves
/// observation 710 into. Unrecognized inputs map to `Unknown` rather
/// than failing the poll pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString)]
pub enum OperationMode {
    #[default]
    Unknown,
    Disconnected,
    #[strum(serialize = "Connected_Requesting")]
    ConnectedRequesting,
    #[strum(serialize = "Connected_Charging")]
    ConnectedCharging,
    #[strum(serialize = "Connected_Finished")]
    ConnectedFinished,
}

impl OperationMode {
    /// Parse a vendor mode name, mapping anything unknown to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// `true` while a session is actively drawing power. Drives the
    /// accelerated polling cadence.
    pub fn is_charging(self) -> bool {
        self == Self::ConnectedCharging
    }
}

/// Commands the integration can send to a charger.
///
/// All but [`AuthorizeCharge`](Self::AuthorizeCharge) resolve to a
/// numeric code through the constants catalog; authorize uses its own
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ChargerCommand {
    RestartCharger,
    UpgradeFirmware,
    StopChargingFinal,
    ResumeCharging,
    DeauthorizeAndStop,
    AuthorizeCharge,
}

impl ChargerCommand {
    /// The vendor's PascalCase command name, as listed in the catalog.
    pub fn vendor_name(self) -> &'static str {
        match self {
            Self::RestartCharger => "RestartCharger",
            Self::UpgradeFirmware => "UpgradeFirmware",
            Self::StopChargingFinal => "StopChargingFinal",
            Self::ResumeCharging => "ResumeCharging",
            Self::DeauthorizeAndStop => "DeauthorizeAndStop",
            Self::AuthorizeCharge => "AuthorizeCharge",
        }
    }
}

/// Outcome of the local command gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDecision {
    /// Whether the command may be sent at all. When false, the caller
    /// gets a rejection without any network round trip.
    pub allowed: bool,
    /// Why a command was denied.
    pub reason: Option<&'static str>,
    /// Mode to apply optimistically (pending, unconfirmed) once the
    /// command is accepted by the cloud.
    pub optimistic_mode: Option<OperationMode>,
    /// Command that must follow for the transition to complete.
    pub followup: Option<ChargerCommand>,
}

impl CommandDecision {
    const ALLOW: Self = Self {
        allowed: true,
        reason: None,
        optimistic_mode: None,
        followup: None,
    };

    const fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            optimistic_mode: None,
            followup: None,
        }
    }
}

/// The (mode, command) transition table.
///
/// `requires_authorization` reflects the charger's native-authentication
/// setting: resuming a finished session then needs an explicit
/// authorize step after the charger re-enters `Connected_Requesting` --
/// the sequence is two commands, not one.
pub fn decide(
    mode: OperationMode,
    command: ChargerCommand,
    requires_authorization: bool,
) -> CommandDecision {
    match (mode, command) {
        (
            OperationMode::ConnectedFinished | OperationMode::Disconnected,
            ChargerCommand::StopChargingFinal,
        ) => CommandDecision::deny(
            "pause/stop charging is not allowed if charging is already paused or disconnected",
        ),

        (OperationMode::ConnectedFinished, ChargerCommand::ResumeCharging) => CommandDecision {
            allowed: true,
            reason: None,
            optimistic_mode: Some(OperationMode::ConnectedRequesting),
            followup: requires_authorization.then_some(ChargerCommand::AuthorizeCharge),
        },
        (_, ChargerCommand::ResumeCharging) => {
            CommandDecision::deny("resume charging is not allowed if charger is not paused")
        }

        _ => CommandDecision::ALLOW,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_vendor_names() {
        assert_eq!(
            OperationMode::from_name("Connected_Charging"),
            OperationMode::ConnectedCharging
        );
        assert_eq!(
            OperationMode::from_name("Disconnected"),
            OperationMode::Disconnected
        );
        assert_eq!(OperationMode::from_name("SomethingNew"), OperationMode::Unknown);
    }

    #[test]
    fn mode_round_trips_through_display() {
        assert_eq!(
            OperationMode::ConnectedFinished.to_string(),
            "Connected_Finished"
        );
    }

    #[test]
    fn stop_denied_when_paused_or_disconnected() {
        for mode in [OperationMode::ConnectedFinished, OperationMode::Disconnected] {
            let d = decide(mode, ChargerCommand::StopChargingFinal, false);
            assert!(!d.allowed, "stop must be denied in {mode}");
            assert!(d.reason.is_some());
        }
    }

    #[test]
    fn stop_allowed_while_charging_or_requesting() {
        for mode in [
            OperationMode::ConnectedCharging,
            OperationMode::ConnectedRequesting,
            OperationMode::Unknown,
        ] {
            assert!(decide(mode, ChargerCommand::StopChargingFinal, false).allowed);
        }
    }

    #[test]
    fn resume_only_allowed_when_finished() {
        let d = decide(
            OperationMode::ConnectedFinished,
            ChargerCommand::ResumeCharging,
            false,
        );
        assert!(d.allowed);
        assert_eq!(d.optimistic_mode, Some(OperationMode::ConnectedRequesting));
        assert_eq!(d.followup, None);

        for mode in [
            OperationMode::Disconnected,
            OperationMode::ConnectedCharging,
            OperationMode::ConnectedRequesting,
            OperationMode::Unknown,
        ] {
            assert!(!decide(mode, ChargerCommand::ResumeCharging, false).allowed);
        }
    }

    #[test]
    fn resume_with_native_auth_requires_authorize_followup() {
        let d = decide(
            OperationMode::ConnectedFinished,
            ChargerCommand::ResumeCharging,
            true,
        );
        assert!(d.allowed);
        assert_eq!(d.followup, Some(ChargerCommand::AuthorizeCharge));
        assert_eq!(d.optimistic_mode, Some(OperationMode::ConnectedRequesting));
    }

    #[test]
    fn unconditional_commands_pass_in_any_mode() {
        for mode in [
            OperationMode::Unknown,
            OperationMode::Disconnected,
            OperationMode::ConnectedRequesting,
            OperationMode::ConnectedCharging,
            OperationMode::ConnectedFinished,
        ] {
            for cmd in [
                ChargerCommand::RestartCharger,
                ChargerCommand::UpgradeFirmware,
                ChargerCommand::DeauthorizeAndStop,
                ChargerCommand::AuthorizeCharge,
            ] {
                assert!(decide(mode, cmd, true).allowed, "{cmd} denied in {mode}");
            }
        }
    }

    #[test]
    fn command_parses_snake_case() {
        assert_eq!(
            "resume_charging".parse::<ChargerCommand>().ok(),
            Some(ChargerCommand::ResumeCharging)
        );
        assert_eq!(
            ChargerCommand::DeauthorizeAndStop.to_string(),
            "deauthorize_and_stop"
        );
    }
}
