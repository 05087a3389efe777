//! Rotation and playhead scheduling.
//!
//! The disc turns under a fixed playhead. Each animation frame the rotation
//! advances and every note is checked against the playhead:
//!
//! - point notes fire once when the playhead crosses their start angle, that
//!   is when it lies in `(prev, new]` measured in the direction of rotation;
//! - sustained notes sound while the playhead is inside `[start, end)`. This
//!   is checked every frame against what is actually sounding, so a
//!   sequencer resumed partway into a note catches up within one frame.
//!
//! The geometry is pure (`advance_rotation`, `notes_crossing_or_active`);
//! `Scheduler` adds the stateful parts (debounce, the set of sounding
//! notes, the mute latch) and forwards decisions to a `VoiceSink`.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::config::EngineSettings;
use crate::model::{FULL_TURN, Note, TrackLayout, arc_contains, normalize_angle};

/// Receiver of the scheduler's sound decisions. Implemented by the audio
/// engine; tests use a recording double.
pub trait VoiceSink {
    fn trigger_one_shot(&mut self, frequency: f64);
    fn start_sustained(&mut self, frequency: f64, voice_id: &str);
    fn stop_sustained(&mut self, voice_id: &str);
}

/// A note chosen to sound this frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTrigger {
    pub note_id: String,
    pub frequency: f64,
}

/// What one frame decided. Also handed to the UI for highlighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDecisions {
    pub to_trigger: Vec<NoteTrigger>,
    pub to_start: Vec<NoteTrigger>,
    pub to_stop: Vec<String>,
}

impl FrameDecisions {
    pub fn is_empty(&self) -> bool {
        self.to_trigger.is_empty() && self.to_start.is_empty() && self.to_stop.is_empty()
    }
}

/// Degrees turned in `delta_seconds` at one revolution per `period` seconds.
/// Not wrapped: a long frame can cover several revolutions. Non-positive
/// periods and negative or non-finite deltas give 0.
pub fn rotation_travel(delta_seconds: f64, period: f64) -> f64 {
    if !(period > 0.0) || !(delta_seconds > 0.0) || !delta_seconds.is_finite() {
        return 0.0;
    }
    FULL_TURN / period * delta_seconds
}

/// Rotation after `delta_seconds` at one revolution per `period` seconds.
pub fn advance_rotation(prev: f64, delta_seconds: f64, period: f64) -> f64 {
    normalize_angle(prev + rotation_travel(delta_seconds, period))
}

/// Whether the playhead crossed the start of `note` while the disc turned
/// `travel` degrees from `prev_rotation`.
pub fn is_crossed(note: &Note, prev_rotation: f64, travel: f64, playhead: f64) -> bool {
    if !(travel > 0.0) {
        return false;
    }
    if travel >= FULL_TURN {
        return true;
    }
    // the rotation at which the note's start sits under the playhead
    let hit = normalize_angle(playhead - note.angle);
    let distance = normalize_angle(hit - prev_rotation);
    distance > 0.0 && distance <= travel
}

/// Whether the playhead is inside the span of `note` at `rotation`.
pub fn is_active(note: &Note, rotation: f64, playhead: f64) -> bool {
    arc_contains(normalize_angle(note.angle + rotation), note.duration_angle, playhead)
}

/// Decide which notes fire, start and stop for one frame in which the disc
/// turned `travel` degrees from `prev_rotation`.
///
/// `sounding` holds the ids of sustained notes currently voiced; notes on
/// disabled tracks are never fired or started and are stopped if sounding.
pub fn notes_crossing_or_active(
    notes: &[Note],
    layout: &TrackLayout,
    prev_rotation: f64,
    travel: f64,
    playhead: f64,
    sounding: &BTreeSet<String>,
) -> FrameDecisions {
    let new_rotation = normalize_angle(prev_rotation + travel.max(0.0));
    let mut decisions = FrameDecisions::default();
    let mut still_active = BTreeSet::new();

    for note in notes {
        if !layout.is_enabled(note.track) {
            continue;
        }
        let Some(frequency) = layout.frequency_of(note) else {
            continue;
        };
        if layout.is_point(note) {
            if is_crossed(note, prev_rotation, travel, playhead) {
                decisions.to_trigger.push(NoteTrigger {
                    note_id: note.id.clone(),
                    frequency,
                });
            }
        } else if is_active(note, new_rotation, playhead) {
            still_active.insert(note.id.as_str());
            if !sounding.contains(&note.id) {
                decisions.to_start.push(NoteTrigger {
                    note_id: note.id.clone(),
                    frequency,
                });
            }
        }
    }

    decisions.to_stop = sounding
        .iter()
        .filter(|id| !still_active.contains(id.as_str()))
        .cloned()
        .collect();
    decisions
}

/// Stateful per-frame driver of the geometry above.
#[derive(Debug, Clone)]
pub struct Scheduler {
    playhead: f64,
    debounce: f64,
    sounding: BTreeSet<String>,
    /// Wall-clock time of each point note's last trigger.
    last_trigger: HashMap<String, f64>,
    /// Sustained notes silenced by a track mute while inside their span.
    /// They stay silent until the playhead leaves the span.
    suppressed: BTreeSet<String>,
}

impl Scheduler {
    pub fn new(playhead: f64, debounce: f64) -> Self {
        Scheduler {
            playhead: normalize_angle(playhead),
            debounce: debounce.max(0.0),
            sounding: BTreeSet::new(),
            last_trigger: HashMap::new(),
            suppressed: BTreeSet::new(),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.playhead_angle, settings.debounce_seconds)
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn is_sounding(&self, note_id: &str) -> bool {
        self.sounding.contains(note_id)
    }

    pub fn sounding(&self) -> impl Iterator<Item = &str> {
        self.sounding.iter().map(String::as_str)
    }

    /// Evaluate one frame in which the disc turned `travel` degrees from
    /// `prev_rotation`, and send the resulting calls to `sink`.
    /// `now` is wall-clock seconds, used only for debouncing.
    pub fn tick<S: VoiceSink + ?Sized>(
        &mut self,
        notes: &[Note],
        layout: &TrackLayout,
        prev_rotation: f64,
        travel: f64,
        now: f64,
        sink: &mut S,
    ) -> FrameDecisions {
        let mut decisions =
            notes_crossing_or_active(notes, layout, prev_rotation, travel, self.playhead, &self.sounding);

        let new_rotation = normalize_angle(prev_rotation + travel.max(0.0));
        self.update_mute_latch(notes, layout, new_rotation);
        decisions.to_start.retain(|t| !self.suppressed.contains(&t.note_id));

        let debounce = self.debounce;
        let last_trigger = &mut self.last_trigger;
        decisions.to_trigger.retain(|t| {
            let ready = last_trigger.get(&t.note_id).is_none_or(|&last| now - last >= debounce);
            if ready {
                last_trigger.insert(t.note_id.clone(), now);
            }
            ready
        });
        if self.last_trigger.len() > notes.len() {
            self.last_trigger.retain(|id, _| notes.iter().any(|n| &n.id == id));
        }

        for id in &decisions.to_stop {
            sink.stop_sustained(id);
            self.sounding.remove(id);
        }
        for start in &decisions.to_start {
            sink.start_sustained(start.frequency, &start.note_id);
            self.sounding.insert(start.note_id.clone());
        }
        for trigger in &decisions.to_trigger {
            sink.trigger_one_shot(trigger.frequency);
        }
        decisions
    }

    fn update_mute_latch(&mut self, notes: &[Note], layout: &TrackLayout, rotation: f64) {
        let playhead = self.playhead;
        for note in notes {
            let held_under_playhead = !layout.is_point(note) && is_active(note, rotation, playhead);
            if !held_under_playhead {
                self.suppressed.remove(&note.id);
            } else if !layout.is_enabled(note.track) {
                self.suppressed.insert(note.id.clone());
            }
        }
        self.suppressed.retain(|id| notes.iter().any(|n| &n.id == id));
    }

    /// Stop every sustained voice at once (playback paused). Nothing is
    /// latched: resuming restarts whatever the playhead is inside.
    pub fn pause<S: VoiceSink + ?Sized>(&mut self, sink: &mut S) -> Vec<String> {
        let stopped: Vec<String> = std::mem::take(&mut self.sounding).into_iter().collect();
        for id in &stopped {
            sink.stop_sustained(id);
        }
        stopped
    }
}
