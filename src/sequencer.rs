//! Sequencer — the per-frame driver tying the note board, the scheduler
//! and the audio engine together.
//!
//! The host calls `frame` from its animation callback with the frame delta
//! and a wall-clock timestamp, and pulls audio through `render`. Everything
//! else mirrors the controls of the UI: notes, track toggles, play/pause,
//! effects, preview and capture.

use tracing::{debug, warn};

use crate::config::{EffectsConfig, EngineSettings};
use crate::dsp::engine::AudioEngine;
use crate::dsp::recorder::Clip;
use crate::error::{EngineError, PlacementError, ProposalError};
use crate::model::{Note, NoteBoard, normalize_angle};
use crate::proposal;
use crate::scheduler::{FrameDecisions, Scheduler, VoiceSink, rotation_travel};

/// Lazily created audio engine.
///
/// The engine is built on first access. If that fails the failure is
/// reported once and the session stays silent from then on.
#[derive(Debug)]
pub struct AudioSession {
    settings: EngineSettings,
    engine: Option<AudioEngine>,
    unsupported: bool,
}

impl AudioSession {
    pub fn new(settings: EngineSettings) -> Self {
        AudioSession {
            settings,
            engine: None,
            unsupported: false,
        }
    }

    /// The engine, built on demand. Only the first failing access returns
    /// the error; later ones yield `Ok(None)`.
    pub fn engine_mut(&mut self) -> Result<Option<&mut AudioEngine>, EngineError> {
        if self.unsupported {
            return Ok(None);
        }
        if self.engine.is_none() {
            match AudioEngine::new(self.settings.clone()) {
                Ok(engine) => self.engine = Some(engine),
                Err(e) => {
                    warn!(error = %e, "audio unavailable, sound disabled");
                    self.unsupported = true;
                    return Err(e);
                }
            }
        }
        Ok(self.engine.as_mut())
    }

    /// Like `engine_mut`, for callers that degrade silently.
    pub fn available(&mut self) -> Option<&mut AudioEngine> {
        self.engine_mut().ok().flatten()
    }

    pub fn engine(&self) -> Option<&AudioEngine> {
        self.engine.as_ref()
    }

    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }
}

/// Sink used when there is no engine. Scheduling still runs so the UI
/// highlighting keeps working.
struct Silent;

impl VoiceSink for Silent {
    fn trigger_one_shot(&mut self, _frequency: f64) {}
    fn start_sustained(&mut self, _frequency: f64, _voice_id: &str) {}
    fn stop_sustained(&mut self, _voice_id: &str) {}
}

#[derive(Debug)]
pub struct Sequencer {
    board: NoteBoard,
    scheduler: Scheduler,
    session: AudioSession,
    rotation: f64,
    rotation_period: f64,
    playing: bool,
    /// Wall-clock time of the last frame.
    last_now: f64,
}

impl Sequencer {
    pub fn new(settings: EngineSettings) -> Self {
        Sequencer {
            board: NoteBoard::default(),
            scheduler: Scheduler::from_settings(&settings),
            rotation: 0.0,
            rotation_period: settings.rotation_period,
            playing: false,
            last_now: 0.0,
            session: AudioSession::new(settings),
        }
    }

    // ── Session ─────────────────────────────────────────────

    /// Resume audio. Must be called from a user gesture before anything
    /// is heard. Calling it while audio already runs changes nothing.
    pub fn resume_session(&mut self) -> Result<(), EngineError> {
        let Some(engine) = self.session.engine_mut()? else {
            return Ok(());
        };
        if engine.is_running() {
            return Ok(());
        }
        engine.resume_session()?;
        // anything "sounding" before now was dropped by the engine
        self.scheduler.pause(engine);
        self.settle();
        Ok(())
    }

    pub fn suspend_session(&mut self) {
        if let Some(engine) = self.session.available() {
            engine.suspend_session();
        }
    }

    pub fn engine(&self) -> Option<&AudioEngine> {
        self.session.engine()
    }

    pub fn session(&self) -> &AudioSession {
        &self.session
    }

    // ── Transport ───────────────────────────────────────────

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f64) {
        if rotation.is_finite() {
            self.rotation = normalize_angle(rotation);
            self.settle();
        }
    }

    pub fn rotation_period(&self) -> f64 {
        self.rotation_period
    }

    /// Seconds per revolution; non-positive values are ignored.
    pub fn set_rotation_period(&mut self, seconds: f64) {
        if seconds > 0.0 && seconds.is_finite() {
            self.rotation_period = seconds;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Start or pause. Pausing silences every held note at once.
    pub fn set_playing(&mut self, playing: bool) {
        if self.playing == playing {
            return;
        }
        self.playing = playing;
        if playing {
            debug!(rotation = self.rotation, "playback started");
            self.settle();
        } else {
            let stopped = match self.session.available() {
                Some(engine) => {
                    let stopped = self.scheduler.pause(engine);
                    // also catches held voices the scheduler never started
                    engine.stop_all_sustained();
                    stopped
                }
                None => self.scheduler.pause(&mut Silent),
            };
            debug!(stopped = stopped.len(), rotation = self.rotation, "playback paused");
        }
    }

    /// Advance the disc by one animation frame and voice whatever the
    /// playhead reached. Nothing happens while paused.
    pub fn frame(&mut self, delta_seconds: f64, now: f64) -> FrameDecisions {
        self.last_now = now;
        if !self.playing {
            return FrameDecisions::default();
        }
        let prev = self.rotation;
        let travel = rotation_travel(delta_seconds, self.rotation_period);
        self.rotation = normalize_angle(prev + travel);
        self.tick(prev, travel, now)
    }

    fn tick(&mut self, prev: f64, travel: f64, now: f64) -> FrameDecisions {
        let notes = self.board.notes();
        let layout = self.board.layout();
        match self.session.available() {
            Some(engine) => self.scheduler.tick(notes, layout, prev, travel, now, engine),
            None => self.scheduler.tick(notes, layout, prev, travel, now, &mut Silent),
        }
    }

    /// Re-evaluate held notes without moving the disc, so edits take
    /// effect before the next frame.
    fn settle(&mut self) {
        if self.playing {
            let (rotation, now) = (self.rotation, self.last_now);
            self.tick(rotation, 0.0, now);
        }
    }

    // ── Notes ───────────────────────────────────────────────

    pub fn board(&self) -> &NoteBoard {
        &self.board
    }

    /// Replace the whole note list. Invalid lists leave the board unchanged.
    pub fn set_notes(&mut self, notes: Vec<Note>) -> Result<(), PlacementError> {
        self.board.replace_all(notes)?;
        self.settle();
        Ok(())
    }

    pub fn place_note(&mut self, track: usize, angle: f64, color_index: usize) -> Result<Note, PlacementError> {
        let note = self.board.place(track, angle, color_index)?.clone();
        self.settle();
        Ok(note)
    }

    pub fn place_sustained(
        &mut self,
        track: usize,
        angle: f64,
        duration: f64,
        color_index: usize,
    ) -> Result<Note, PlacementError> {
        let note = self.board.place_sustained(track, angle, duration, color_index)?.clone();
        self.settle();
        Ok(note)
    }

    pub fn remove_note(&mut self, id: &str) -> Option<Note> {
        let removed = self.board.remove(id);
        self.settle();
        removed
    }

    pub fn clear_notes(&mut self) {
        self.board.clear();
        self.settle();
    }

    /// Mute or unmute a track. Muting stops its held notes immediately.
    pub fn set_track_enabled(&mut self, track: usize, enabled: bool) -> Result<(), PlacementError> {
        self.board.set_track_enabled(track, enabled)?;
        self.settle();
        Ok(())
    }

    /// Merge an externally proposed batch; all or nothing.
    pub fn merge_proposals(&mut self, json: &str) -> Result<usize, ProposalError> {
        let added = proposal::merge_proposals(&mut self.board, json)?;
        self.settle();
        Ok(added)
    }

    // ── Sound ───────────────────────────────────────────────

    pub fn apply_effects(&mut self, config: &EffectsConfig) {
        if let Some(engine) = self.session.available() {
            engine.apply_effects(config);
        }
    }

    pub fn trigger_preview(&mut self, frequency: f64) {
        if let Some(engine) = self.session.available() {
            engine.preview_note(frequency);
        }
    }

    /// Interleaved stereo output; silence without an engine.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        match self.session.available() {
            Some(engine) => engine.render_frames(frames),
            None => vec![0.0; frames * 2],
        }
    }

    pub fn start_capture(&mut self) -> bool {
        self.session.available().is_some_and(AudioEngine::start_capture)
    }

    pub fn stop_capture(&mut self) -> Result<Clip, EngineError> {
        match self.session.available() {
            Some(engine) => engine.stop_capture(),
            None => Ok(Clip::empty()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.session.engine().is_some_and(AudioEngine::is_capturing)
    }
}
