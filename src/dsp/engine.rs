//! Audio engine — one explicit object per audio session.
//!
//! Owns the sample clock, the signal graph, the voices, the master bus and
//! the recording tap. The host resumes the session (after a user gesture),
//! then pulls interleaved stereo f32 frames from `render` on its audio
//! callback. Sound-producing calls that arrive while the session is not
//! running are dropped, never queued.

use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use crate::config::{EffectsConfig, EngineSettings};
use crate::error::EngineError;
use crate::scheduler::VoiceSink;

use super::graph::SignalGraph;
use super::mixer::MasterBus;
use super::recorder::{Clip, Recorder};
use super::updater::{self, Ramp};
use super::voice::VoiceManager;

/// Lifecycle of the underlying audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not (or no longer) producing audio.
    Suspended,
    Running,
    /// Torn down; cannot be resumed.
    Closed,
}

#[derive(Debug)]
pub struct AudioEngine {
    settings: EngineSettings,
    state: SessionState,
    /// Frames rendered since the session was created.
    frames: u64,
    graph: Option<SignalGraph>,
    effects: EffectsConfig,
    voices: VoiceManager,
    master: MasterBus,
    recorder: Recorder,
}

impl AudioEngine {
    /// Create a suspended engine. Fails when no usable stream format exists.
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let sr = settings.sample_rate;
        if !sr.is_finite() || !(8000.0..=384_000.0).contains(&sr) {
            return Err(EngineError::UnsupportedPlatform {
                reason: format!("sample rate {sr} Hz is not supported"),
            });
        }
        Ok(AudioEngine {
            voices: VoiceManager::new(sr, settings.max_one_shots),
            master: MasterBus::new(settings.master_gain),
            recorder: Recorder::new(),
            state: SessionState::Suspended,
            frames: 0,
            graph: None,
            effects: EffectsConfig::default(),
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> f64 {
        self.settings.sample_rate
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Audio clock: seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.settings.sample_rate
    }

    /// Start (or restart) audio production. Builds the graph on first use.
    pub fn resume_session(&mut self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Closed => Err(EngineError::Closed),
            SessionState::Running => Ok(()),
            SessionState::Suspended => {
                self.ensure_graph();
                self.state = SessionState::Running;
                info!(time = self.current_time(), "audio session running");
                Ok(())
            }
        }
    }

    pub fn suspend_session(&mut self) {
        if self.state == SessionState::Running {
            self.state = SessionState::Suspended;
            info!(time = self.current_time(), "audio session suspended");
        }
    }

    /// Tear the session down. Any capture in progress is discarded.
    pub fn close_session(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.voices.silence();
        self.graph = None;
        self.recorder = Recorder::new();
        self.state = SessionState::Closed;
        info!("audio session closed");
    }

    /// Build the signal graph unless it already exists.
    pub fn ensure_graph(&mut self) -> &mut SignalGraph {
        let ramp = self.ramp();
        let sample_rate = self.settings.sample_rate;
        let effects = &self.effects;
        self.graph.get_or_insert_with(|| {
            debug!(sample_rate, "building signal graph");
            let mut graph = SignalGraph::build(sample_rate);
            updater::apply_effects(&mut graph, effects, ramp);
            graph
        })
    }

    pub fn graph(&self) -> Option<&SignalGraph> {
        self.graph.as_ref()
    }

    fn ramp(&self) -> Ramp {
        Ramp::new(self.current_time(), self.settings.ramp_seconds)
    }

    /// Glide the graph to a new effects snapshot.
    pub fn apply_effects(&mut self, config: &EffectsConfig) {
        if self.state == SessionState::Closed {
            debug!("effects ignored, session closed");
            return;
        }
        self.effects = config.clone();
        let ramp = self.ramp();
        let graph = self.ensure_graph();
        updater::apply_effects(graph, config, ramp);
    }

    pub fn effects(&self) -> &EffectsConfig {
        &self.effects
    }

    /// Settled targets of every graph parameter; empty before the graph exists.
    pub fn parameter_state(&self) -> BTreeMap<String, f64> {
        self.graph.as_ref().map(SignalGraph::parameter_state).unwrap_or_default()
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    fn accepts_sound(&self, what: &str) -> bool {
        if !self.is_running() {
            trace!(state = ?self.state, what, "session not running, dropped");
            return false;
        }
        true
    }

    /// Audition a note; replaces any preview still sounding.
    pub fn preview_note(&mut self, frequency: f64) {
        if self.accepts_sound("preview") {
            let now = self.current_time();
            self.voices.preview_note(frequency, now);
        }
    }

    /// Fade out every held voice.
    pub fn stop_all_sustained(&mut self) {
        let now = self.current_time();
        self.voices.stop_all_sustained(now);
    }

    /// Fill `out` with interleaved stereo frames. A session that is not
    /// running renders silence and its clock stands still.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.state != SessionState::Running {
            out.fill(0.0);
            return;
        }
        let Some(graph) = self.graph.as_mut() else {
            out.fill(0.0);
            return;
        };
        let sample_rate = self.settings.sample_rate;
        for frame in out.chunks_exact_mut(2) {
            let time = self.frames as f64 / sample_rate;
            let dry = self.voices.next_sample(time) as f32;
            let (l, r) = graph.process(time, dry, dry);
            let (l, r) = self.master.process(l, r);
            self.recorder.push(l, r);
            frame[0] = l;
            frame[1] = r;
            self.frames += 1;
        }
    }

    /// Render `frames` stereo frames into a new buffer.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.render(&mut out);
        out
    }

    /// Begin capturing the master output. No-op unless the session runs.
    pub fn start_capture(&mut self) -> bool {
        if !self.is_running() {
            debug!("capture requested while session not running");
            return false;
        }
        self.recorder.start();
        true
    }

    /// Finish the capture. Resolves to an empty clip when none was active.
    pub fn stop_capture(&mut self) -> Result<Clip, EngineError> {
        self.recorder.stop(self.settings.sample_rate as u32)
    }

    pub fn is_capturing(&self) -> bool {
        self.recorder.is_capturing()
    }
}

impl VoiceSink for AudioEngine {
    fn trigger_one_shot(&mut self, frequency: f64) {
        if self.accepts_sound("one-shot") {
            let now = self.current_time();
            self.voices.trigger_one_shot(frequency, now);
        }
    }

    fn start_sustained(&mut self, frequency: f64, voice_id: &str) {
        if self.accepts_sound("sustain") {
            let now = self.current_time();
            self.voices.start_sustained(frequency, voice_id, now);
        }
    }

    fn stop_sustained(&mut self, voice_id: &str) {
        let now = self.current_time();
        self.voices.stop_sustained(voice_id, now);
    }
}
