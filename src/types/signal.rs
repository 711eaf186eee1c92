//! Signal state types: SignalState, PhaseMessageType, ApproachKind

use serde::{Deserialize, Serialize};

// ============================================================================
// Per-approach signal state
// ============================================================================

/// State of one approach's signal head within a phase vector.
///
/// Serialized with the same tokens used on the worker command channel and in
/// the junction config (`RED_PHASE`, `GREEN_PHASE`, ...). `YELLOW_PHASE` only
/// ever appears in derived transition phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SignalState {
    #[serde(rename = "RED_PHASE")]
    Red,
    #[serde(rename = "GREEN_PHASE")]
    Green,
    #[serde(rename = "YELLOW_PHASE")]
    Yellow,
    #[serde(rename = "RED_PED")]
    RedPed,
    #[serde(rename = "GREEN_PED")]
    GreenPed,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl SignalState {
    /// Wire/config token for this state.
    pub fn token(&self) -> &'static str {
        match self {
            SignalState::Red => "RED_PHASE",
            SignalState::Green => "GREEN_PHASE",
            SignalState::Yellow => "YELLOW_PHASE",
            SignalState::RedPed => "RED_PED",
            SignalState::GreenPed => "GREEN_PED",
            SignalState::Unknown => "UNKNOWN",
        }
    }

    /// Parse a config token. Unrecognised text maps to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "RED_PHASE" => SignalState::Red,
            "GREEN_PHASE" => SignalState::Green,
            "YELLOW_PHASE" => SignalState::Yellow,
            "RED_PED" => SignalState::RedPed,
            "GREEN_PED" => SignalState::GreenPed,
            _ => SignalState::Unknown,
        }
    }

    /// The approach kind this state can be asserted on, if any.
    pub fn approach_kind(&self) -> Option<ApproachKind> {
        match self {
            SignalState::Red | SignalState::Green | SignalState::Yellow => {
                Some(ApproachKind::Vehicle)
            }
            SignalState::RedPed | SignalState::GreenPed => Some(ApproachKind::Pedestrian),
            SignalState::Unknown => None,
        }
    }

    /// Command a worker receives while this state is asserted.
    ///
    /// Yellow has no worker-side meaning and is never broadcast.
    pub fn command(&self) -> Option<PhaseMessageType> {
        match self {
            SignalState::Red => Some(PhaseMessageType::RedPhase),
            SignalState::Green => Some(PhaseMessageType::GreenPhase),
            SignalState::RedPed => Some(PhaseMessageType::RedPed),
            SignalState::GreenPed => Some(PhaseMessageType::GreenPed),
            SignalState::Yellow | SignalState::Unknown => None,
        }
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

// ============================================================================
// Worker command tokens
// ============================================================================

/// Parsed content of a worker command channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseMessageType {
    RedPhase,
    GreenPhase,
    RedPed,
    GreenPed,
    Unknown,
}

impl PhaseMessageType {
    /// Parse a command payload. Any text other than the four literal tokens
    /// is `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text {
            "RED_PHASE" => PhaseMessageType::RedPhase,
            "GREEN_PHASE" => PhaseMessageType::GreenPhase,
            "RED_PED" => PhaseMessageType::RedPed,
            "GREEN_PED" => PhaseMessageType::GreenPed,
            _ => PhaseMessageType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseMessageType::RedPhase => "RED_PHASE",
            PhaseMessageType::GreenPhase => "GREEN_PHASE",
            PhaseMessageType::RedPed => "RED_PED",
            PhaseMessageType::GreenPed => "GREEN_PED",
            PhaseMessageType::Unknown => "UNKNOWN",
        }
    }

    /// Whether a worker answers this command with a report.
    ///
    /// Red-class commands close an active period and report its metric.
    /// Pedestrian green answers with a zero placeholder. Vehicle green is silent.
    pub fn expects_report(&self) -> bool {
        matches!(
            self,
            PhaseMessageType::RedPhase | PhaseMessageType::RedPed | PhaseMessageType::GreenPed
        )
    }
}

impl std::fmt::Display for PhaseMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Approach kind
// ============================================================================

/// What a monitoring unit watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApproachKind {
    Vehicle,
    Pedestrian,
}

impl std::fmt::Display for ApproachKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApproachKind::Vehicle => write!(f, "vehicle"),
            ApproachKind::Pedestrian => write!(f, "pedestrian"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tokens_parse_exactly() {
        assert_eq!(PhaseMessageType::parse("RED_PHASE"), PhaseMessageType::RedPhase);
        assert_eq!(PhaseMessageType::parse("GREEN_PED"), PhaseMessageType::GreenPed);
        assert_eq!(PhaseMessageType::parse("red_phase"), PhaseMessageType::Unknown);
        assert_eq!(PhaseMessageType::parse("YELLOW_PHASE"), PhaseMessageType::Unknown);
        assert_eq!(PhaseMessageType::parse(""), PhaseMessageType::Unknown);
    }

    #[test]
    fn yellow_is_never_broadcast() {
        assert_eq!(SignalState::Yellow.command(), None);
        assert_eq!(SignalState::Green.command(), Some(PhaseMessageType::GreenPhase));
    }

    #[test]
    fn state_tokens_deserialize_from_config() {
        let states: Vec<SignalState> =
            serde_json::from_str(r#"["GREEN_PHASE","RED_PED","UNKNOWN"]"#).unwrap();
        assert_eq!(
            states,
            vec![SignalState::Green, SignalState::RedPed, SignalState::Unknown]
        );
    }

    #[test]
    fn only_vehicle_green_is_silent() {
        assert!(!PhaseMessageType::GreenPhase.expects_report());
        assert!(PhaseMessageType::RedPhase.expects_report());
        assert!(PhaseMessageType::RedPed.expects_report());
        assert!(PhaseMessageType::GreenPed.expects_report());
    }
}
