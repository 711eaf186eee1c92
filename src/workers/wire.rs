//! Text payloads exchanged between the orchestrator and approach workers
//!
//! Commands are the literal state tokens (`RED_PHASE`, `GREEN_PHASE`,
//! `RED_PED`, `GREEN_PED`). Reports are decimals with two fraction digits.

use crate::types::PhaseMessageType;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty report")]
    Empty,

    #[error("report {0:?} is not a number")]
    NotANumber(String),

    #[error("report {0:?} is not finite")]
    NonFinite(String),
}

pub fn encode_command(command: PhaseMessageType) -> String {
    command.as_str().to_string()
}

pub fn decode_command(payload: &str) -> PhaseMessageType {
    PhaseMessageType::parse(payload)
}

/// Render a metric for the report channel, e.g. `37.42`.
pub fn encode_report(value: f32) -> String {
    format!("{:.2}", value)
}

pub fn decode_report(payload: &str) -> Result<f32, WireError> {
    let text = payload.trim_end_matches('\0').trim();
    if text.is_empty() {
        return Err(WireError::Empty);
    }
    let value: f32 = text
        .parse()
        .map_err(|_| WireError::NotANumber(text.to_string()))?;
    if !value.is_finite() {
        return Err(WireError::NonFinite(text.to_string()));
    }
    Ok(value)
}
