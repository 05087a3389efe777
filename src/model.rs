//! Disc data model: notes, tracks, and the color palette.
//!
//! Angles are degrees on the disc, measured from 0 in the direction of
//! rotation. A note occupies the half-open arc `[angle, angle + durationAngle)`
//! which may wrap through 0°.

use serde::{Deserialize, Serialize};

use crate::error::PlacementError;

pub const FULL_TURN: f64 = 360.0;
/// Tolerance for comparing angles that went through float arithmetic.
pub const ANGLE_EPSILON: f64 = 1e-6;

// ── Palette ─────────────────────────────────────────────────

/// A selectable note color and the pitch it plays on the outermost track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteColor {
    pub key: &'static str,
    pub label: &'static str,
    /// Pitch name at track 0.
    pub pitch: &'static str,
    pub frequency: f64,
}

/// C-major scale from C4 to C5.
pub const PALETTE: [PaletteColor; 8] = [
    PaletteColor { key: "red", label: "Red", pitch: "C4", frequency: 261.63 },
    PaletteColor { key: "orange", label: "Orange", pitch: "D4", frequency: 293.66 },
    PaletteColor { key: "yellow", label: "Yellow", pitch: "E4", frequency: 329.63 },
    PaletteColor { key: "green", label: "Green", pitch: "F4", frequency: 349.23 },
    PaletteColor { key: "teal", label: "Teal", pitch: "G4", frequency: 392.00 },
    PaletteColor { key: "blue", label: "Blue", pitch: "A4", frequency: 440.00 },
    PaletteColor { key: "purple", label: "Purple", pitch: "B4", frequency: 493.88 },
    PaletteColor { key: "pink", label: "Pink", pitch: "C5", frequency: 523.25 },
];

pub fn palette_color(index: usize) -> Option<&'static PaletteColor> {
    PALETTE.get(index)
}

pub fn palette_by_key(key: &str) -> Option<&'static PaletteColor> {
    PALETTE.iter().find(|c| c.key == key)
}

// ── Angles ──────────────────────────────────────────────────

/// Wrap any finite angle into [0, 360).
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(FULL_TURN);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if a >= FULL_TURN { 0.0 } else { a }
}

/// Whether `angle` lies in the arc `[start, start + length)`.
pub fn arc_contains(start: f64, length: f64, angle: f64) -> bool {
    normalize_angle(angle - start) < length
}

/// Whether two arcs share any angle.
pub fn arcs_overlap(a: f64, a_len: f64, b: f64, b_len: f64) -> bool {
    normalize_angle(b - a) < a_len - ANGLE_EPSILON || normalize_angle(a - b) < b_len - ANGLE_EPSILON
}

// ── Notes & tracks ──────────────────────────────────────────

/// A note placed on the disc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    /// 0 is the outermost track.
    pub track: usize,
    /// Start of the note, degrees in [0, 360).
    pub angle: f64,
    /// Angular length in degrees.
    pub duration_angle: f64,
    pub color_key: String,
    #[serde(default)]
    pub display_name: String,
}

/// One concentric lane of the disc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Quantization step in degrees.
    pub grid: f64,
    /// Octave shift applied to palette pitches on this track.
    pub octave: i32,
    pub enabled: bool,
}

/// The tracks of the disc, outermost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLayout {
    pub tracks: Vec<Track>,
}

impl Default for TrackLayout {
    fn default() -> Self {
        let grids = [10.0, 15.0, 22.5, 30.0];
        let octaves = [0, 1, -1, -2];
        TrackLayout {
            tracks: grids
                .into_iter()
                .zip(octaves)
                .map(|(grid, octave)| Track { grid, octave, enabled: true })
                .collect(),
        }
    }
}

impl TrackLayout {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Result<&Track, PlacementError> {
        self.tracks
            .get(index)
            .ok_or(PlacementError::TrackOutOfRange { track: index })
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.tracks.get(index).is_some_and(|t| t.enabled)
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), PlacementError> {
        let track = self
            .tracks
            .get_mut(index)
            .ok_or(PlacementError::TrackOutOfRange { track: index })?;
        track.enabled = enabled;
        Ok(())
    }

    /// Snap `angle` to the nearest grid line of `track`, in [0, 360).
    pub fn snap(&self, index: usize, angle: f64) -> Result<f64, PlacementError> {
        if !angle.is_finite() {
            return Err(PlacementError::InvalidAngle { angle });
        }
        let grid = self.track(index)?.grid;
        let snapped = (normalize_angle(angle) / grid).round() * grid;
        Ok(normalize_angle(snapped))
    }

    pub fn frequency_of(&self, note: &Note) -> Option<f64> {
        let color = palette_by_key(&note.color_key)?;
        let track = self.tracks.get(note.track)?;
        Some(color.frequency * 2f64.powi(track.octave))
    }

    /// Point notes last at most one grid unit and fire once when crossed;
    /// longer notes sustain while the playhead is inside them.
    pub fn is_point(&self, note: &Note) -> bool {
        match self.tracks.get(note.track) {
            Some(track) => note.duration_angle <= track.grid + ANGLE_EPSILON,
            None => true,
        }
    }
}

/// The notes on the disc, with the invariants of placement enforced:
/// every note sits on its track's grid and no two notes on a track overlap.
#[derive(Debug, Clone, Default)]
pub struct NoteBoard {
    layout: TrackLayout,
    notes: Vec<Note>,
    next_id: u64,
}

impl NoteBoard {
    pub fn new(layout: TrackLayout) -> Self {
        NoteBoard {
            layout,
            notes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    pub fn set_track_enabled(&mut self, track: usize, enabled: bool) -> Result<(), PlacementError> {
        self.layout.set_enabled(track, enabled)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn notes_on_track(&self, track: usize) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |n| n.track == track)
    }

    /// Place a point note (one grid unit long) at the grid line nearest `angle`.
    pub fn place(&mut self, track: usize, angle: f64, color_index: usize) -> Result<&Note, PlacementError> {
        let grid = self.layout.track(track)?.grid;
        self.place_sustained(track, angle, grid, color_index)
    }

    /// Place a note spanning `duration` degrees, rounded to whole grid units.
    pub fn place_sustained(
        &mut self,
        track: usize,
        angle: f64,
        duration: f64,
        color_index: usize,
    ) -> Result<&Note, PlacementError> {
        let grid = self.layout.track(track)?.grid;
        let angle = self.layout.snap(track, angle)?;
        if !duration.is_finite() {
            return Err(PlacementError::InvalidAngle { angle: duration });
        }
        let color = palette_color(color_index).ok_or(PlacementError::UnknownColor { index: color_index })?;
        let units = (duration / grid).round().max(1.0);
        let duration_angle = (units * grid).min(FULL_TURN);

        let id = self.fresh_id();
        self.insert(Note {
            id,
            track,
            angle,
            duration_angle,
            color_key: color.key.to_string(),
            display_name: color.label.to_string(),
        })
    }

    /// Add a fully specified note, checking track, grid and overlap.
    pub fn insert(&mut self, note: Note) -> Result<&Note, PlacementError> {
        let snapped = self.layout.snap(note.track, note.angle)?;
        if (snapped - note.angle).abs() > ANGLE_EPSILON {
            return Err(PlacementError::InvalidAngle { angle: note.angle });
        }
        if !(note.duration_angle > 0.0 && note.duration_angle <= FULL_TURN) {
            return Err(PlacementError::InvalidAngle { angle: note.duration_angle });
        }
        if palette_by_key(&note.color_key).is_none() {
            return Err(PlacementError::UnknownColorKey { key: note.color_key });
        }
        if let Some(existing) = self.overlapping(note.track, note.angle, note.duration_angle) {
            return Err(PlacementError::Overlap {
                track: note.track,
                angle: note.angle,
                existing: existing.id.clone(),
            });
        }
        self.notes.push(note);
        Ok(&self.notes[self.notes.len() - 1])
    }

    /// Replace every note at once; on error the board is left unchanged.
    pub fn replace_all(&mut self, notes: Vec<Note>) -> Result<(), PlacementError> {
        let mut next = NoteBoard::new(self.layout.clone());
        next.next_id = self.next_id;
        for note in notes {
            next.insert(note)?;
        }
        *self = next;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Note> {
        let index = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(index))
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    /// Pitch of `note`: its palette frequency shifted by its track's octave.
    pub fn frequency_of(&self, note: &Note) -> Option<f64> {
        self.layout.frequency_of(note)
    }

    fn overlapping(&self, track: usize, angle: f64, duration: f64) -> Option<&Note> {
        self.notes_on_track(track)
            .find(|n| arcs_overlap(n.angle, n.duration_angle, angle, duration))
    }

    fn fresh_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("note-{}", self.next_id);
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_snaps_to_track_grid() {
        let mut board = NoteBoard::default();
        for track in 0..4 {
            let grid = board.layout().tracks[track].grid;
            for raw in [3.0, 47.9, 181.2, 359.0] {
                board.clear();
                let note = board.place(track, raw, 0).unwrap();
                assert_eq!(note.angle % grid, 0.0, "track {track} angle {}", note.angle);
                assert!(note.angle < FULL_TURN);
            }
        }
    }

    #[test]
    fn overlapping_placement_is_rejected() {
        let mut board = NoteBoard::default();
        board.place_sustained(0, 40.0, 30.0, 1).unwrap();
        let err = board.place(0, 60.0, 2).unwrap_err();
        assert!(matches!(err, PlacementError::Overlap { track: 0, .. }));
        // adjacent is fine, as is the same angle on another track
        board.place(0, 70.0, 2).unwrap();
        board.place(1, 45.0, 2).unwrap();
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn overlap_detection_wraps_through_zero() {
        let mut board = NoteBoard::default();
        board.place_sustained(0, 350.0, 30.0, 0).unwrap();
        assert!(board.place(0, 10.0, 0).is_err());
        assert!(board.place(0, 20.0, 0).is_ok());
        assert!(arcs_overlap(350.0, 30.0, 0.0, 10.0));
        assert!(!arcs_overlap(350.0, 10.0, 0.0, 10.0));
    }

    #[test]
    fn sustained_duration_is_whole_grid_units() {
        let mut board = NoteBoard::default();
        let note = board.place_sustained(2, 40.0, 60.0, 3).unwrap().clone();
        assert_eq!(note.angle, 45.0);
        assert_eq!(note.duration_angle, 67.5);
        assert!(!board.layout().is_point(&note));

        let point = board.place(3, 300.0, 3).unwrap().clone();
        assert!(board.layout().is_point(&point));
    }

    #[test]
    fn frequency_follows_track_octave() {
        let mut board = NoteBoard::default();
        let outer = board.place(0, 0.0, 0).unwrap().clone();
        let inner = board.place(1, 0.0, 0).unwrap().clone();
        let lowest = board.place(3, 0.0, 5).unwrap().clone();
        assert_eq!(board.frequency_of(&outer), Some(261.63));
        assert_eq!(board.frequency_of(&inner), Some(523.26));
        assert_eq!(board.frequency_of(&lowest), Some(110.0));
    }

    #[test]
    fn invalid_placements() {
        let mut board = NoteBoard::default();
        assert_eq!(
            board.place(4, 0.0, 0).unwrap_err(),
            PlacementError::TrackOutOfRange { track: 4 }
        );
        assert_eq!(board.place(0, 0.0, 8).unwrap_err(), PlacementError::UnknownColor { index: 8 });
        assert!(matches!(
            board.place(0, f64::NAN, 0).unwrap_err(),
            PlacementError::InvalidAngle { .. }
        ));
        assert!(board.is_empty());
    }

    #[test]
    fn remove_and_clear() {
        let mut board = NoteBoard::default();
        let id = board.place(0, 90.0, 0).unwrap().id.clone();
        board.place(0, 180.0, 0).unwrap();
        assert_eq!(board.remove(&id).map(|n| n.angle), Some(90.0));
        assert!(board.remove(&id).is_none());
        // the freed slot can be reused
        board.place(0, 90.0, 0).unwrap();
        board.clear();
        assert!(board.is_empty());
    }

    #[test]
    fn replace_all_is_atomic() {
        let mut board = NoteBoard::default();
        board.place(0, 0.0, 0).unwrap();
        let note = |id: &str, angle: f64| Note {
            id: id.to_string(),
            track: 0,
            angle,
            duration_angle: 10.0,
            color_key: "red".to_string(),
            display_name: String::new(),
        };
        let clash = vec![note("a", 30.0), note("b", 30.0)];
        assert!(board.replace_all(clash).is_err());
        assert_eq!(board.len(), 1);

        board.replace_all(vec![note("a", 30.0), note("b", 40.0)]).unwrap();
        assert_eq!(board.len(), 2);
        assert!(board.get("a").is_some());
    }

    #[test]
    fn note_json_uses_camel_case() {
        let mut board = NoteBoard::default();
        let note = board.place(0, 30.0, 4).unwrap();
        let json = serde_json::to_string(note).unwrap();
        assert!(json.contains("\"durationAngle\":10.0"));
        assert!(json.contains("\"colorKey\":\"teal\""));
        assert!(json.contains("\"displayName\""));
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, note);
    }
}
