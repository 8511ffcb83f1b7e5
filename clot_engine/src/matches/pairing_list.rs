//! Storage encoding for round pairings.
//!
//! Rounds persist their bracket as `"first.second;first.second"` with `0`
//! standing for an empty slot. Nothing outside the repository layer should
//! see this format.

use thiserror::Error;

use super::models::BracketSlot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingListError {
    #[error("Malformed pairing '{0}': expected 'first.second'")]
    Malformed(String),

    #[error("Invalid team id '{0}'")]
    InvalidId(String),
}

/// Encode slots for storage.
pub fn encode(slots: &[BracketSlot]) -> String {
    slots
        .iter()
        .map(|slot| {
            format!(
                "{}.{}",
                slot.first.unwrap_or(0),
                slot.second.unwrap_or(0)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Decode stored slots. Empty segments are ignored.
pub fn decode(raw: &str) -> Result<Vec<BracketSlot>, PairingListError> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (first, second) = segment
                .split_once('.')
                .ok_or_else(|| PairingListError::Malformed(segment.to_string()))?;
            Ok(BracketSlot::new(parse_id(first)?, parse_id(second)?))
        })
        .collect()
}

fn parse_id(raw: &str) -> Result<Option<i64>, PairingListError> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| PairingListError::InvalidId(raw.to_string()))?;
    if id < 0 {
        return Err(PairingListError::InvalidId(raw.to_string()));
    }
    Ok((id != 0).then_some(id))
}
