//! Externally proposed note placements (e.g. from a generative assistant).
//!
//! A proposal batch is a JSON array of `{track, angle, colorIndex}`. The
//! batch is validated and placed as a whole: any bad entry rejects all of
//! it and the board is left exactly as it was.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ProposalError;
use crate::model::{NoteBoard, PALETTE, TrackLayout};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedNote {
    pub track: usize,
    pub angle: f64,
    pub color_index: usize,
}

/// Parse a batch without checking it against any layout.
pub fn parse_proposals(json: &str) -> Result<Vec<ProposedNote>, ProposalError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let entries = value.as_array().ok_or(ProposalError::NotAnArray)?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            ProposedNote::deserialize(entry).map_err(|e| ProposalError::InvalidEntry {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Check every entry of a parsed batch against `layout`.
pub fn validate_proposals(proposals: &[ProposedNote], layout: &TrackLayout) -> Result<(), ProposalError> {
    for (index, p) in proposals.iter().enumerate() {
        let reason = if p.track >= layout.len() {
            format!("track {} does not exist", p.track)
        } else if !p.angle.is_finite() {
            "angle is not a finite number".to_string()
        } else if p.color_index >= PALETTE.len() {
            format!("color index {} is out of range", p.color_index)
        } else {
            continue;
        };
        return Err(ProposalError::InvalidEntry { index, reason });
    }
    Ok(())
}

/// Parse, validate and place a batch. Returns how many notes were added.
pub fn merge_proposals(board: &mut NoteBoard, json: &str) -> Result<usize, ProposalError> {
    let result = parse_proposals(json).and_then(|proposals| {
        validate_proposals(&proposals, board.layout())?;
        let mut candidate = board.clone();
        for (index, p) in proposals.iter().enumerate() {
            candidate
                .place(p.track, p.angle, p.color_index)
                .map_err(|e| ProposalError::InvalidEntry {
                    index,
                    reason: e.to_string(),
                })?;
        }
        Ok((candidate, proposals.len()))
    });

    match result {
        Ok((candidate, added)) => {
            *board = candidate;
            info!(added, "proposed notes merged");
            Ok(added)
        }
        Err(e) => {
            warn!(error = %e, "proposal batch rejected");
            Err(e)
        }
    }
}
