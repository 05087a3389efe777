//! Voice manager — synthesizes and tears down note instances.
//!
//! Three kinds of voice exist: self-terminating plucked one-shots, sustained
//! tones held under a note id until stopped, and a single audition preview.
//! All envelopes are `Param` timelines scheduled against the audio clock at
//! the moment the voice is created, so the caller never has to come back to
//! finish a note. Every voice is summed into the graph input by the engine.

use std::collections::HashMap;

use super::filter::{BiquadFilter, FilterType};
use super::oscillator::{Lfo, Oscillator, Waveform};
use super::param::{EXP_FLOOR, Param};

const PLUCK_PEAK: f64 = 0.35;
const PLUCK_ATTACK: f64 = 0.005;
const PLUCK_DECAY: f64 = 1.2;
/// Sources stop this long after note start, past the end of the decay.
const PLUCK_STOP: f64 = 1.3;
const BURST_LEVEL: f64 = 0.15;
const BURST_DECAY: f64 = 0.04;

pub const SUSTAIN_LEVEL: f64 = 0.2;
pub const SUSTAIN_FADE_IN: f64 = 0.02;
pub const SUSTAIN_FADE_OUT: f64 = 0.05;
/// Gentle pitch wobble on held notes, in cents.
const SUSTAIN_VIBRATO_RATE: f64 = 5.0;
const SUSTAIN_VIBRATO_CENTS: f64 = 4.0;

const PREVIEW_PEAK: f64 = 0.25;
const PREVIEW_ATTACK: f64 = 0.01;
const PREVIEW_DECAY: f64 = 0.6;
const PREVIEW_STOP: f64 = 0.65;
const PREVIEW_FADE_OUT: f64 = 0.03;

/// Fade applied to a one-shot stolen to make room for a new one.
const STEAL_FADE: f64 = 0.005;

#[derive(Debug, Clone)]
struct Partial {
    osc: Oscillator,
    level: f64,
}

/// Short high-passed noise transient layered on top of a pluck.
#[derive(Debug, Clone)]
struct NoiseBurst {
    source: Oscillator,
    filter: BiquadFilter,
    gain: Param,
}

/// One sounding note.
#[derive(Debug, Clone)]
pub struct Voice {
    partials: Vec<Partial>,
    burst: Option<NoiseBurst>,
    vibrato: Option<Lfo>,
    /// Output gain envelope.
    pub gain: Param,
    /// Audio time at which all sources stop.
    stop_at: Option<f64>,
}

impl Voice {
    fn with_partials(sample_rate: f64, partials: &[(Waveform, f64, f64)]) -> Self {
        Voice {
            partials: partials
                .iter()
                .map(|&(waveform, frequency, level)| Partial {
                    osc: Oscillator::with_frequency(waveform, frequency, sample_rate),
                    level,
                })
                .collect(),
            burst: None,
            vibrato: None,
            gain: Param::new(0.0),
            stop_at: None,
        }
    }

    /// Plucked tone: fundamental, two overtones and a noise click, with a
    /// 5 ms attack and an exponential decay.
    pub fn pluck(sample_rate: f64, frequency: f64, now: f64) -> Self {
        let mut voice = Self::with_partials(
            sample_rate,
            &[
                (Waveform::Triangle, frequency, 0.6),
                (Waveform::Sine, frequency * 2.0, 0.25),
                (Waveform::Sine, frequency * 3.0, 0.12),
            ],
        );
        voice.gain.set_value_at_time(EXP_FLOOR, now);
        voice.gain.linear_ramp_to_value_at_time(PLUCK_PEAK, now + PLUCK_ATTACK);
        voice.gain.exponential_ramp_to_value_at_time(EXP_FLOOR, now + PLUCK_DECAY);
        voice.stop_at = Some(now + PLUCK_STOP);

        let mut burst_gain = Param::new(0.0);
        burst_gain.set_value_at_time(BURST_LEVEL, now);
        burst_gain.exponential_ramp_to_value_at_time(EXP_FLOOR, now + BURST_DECAY);
        voice.burst = Some(NoiseBurst {
            source: Oscillator::new(Waveform::Noise, sample_rate),
            filter: BiquadFilter::with_params(FilterType::Highpass, sample_rate, 2000.0, 0.707),
            gain: burst_gain,
        });
        voice
    }

    /// Held tone fading in from silence. Runs until `release`.
    pub fn held(sample_rate: f64, frequency: f64, now: f64) -> Self {
        let mut voice = Self::with_partials(
            sample_rate,
            &[(Waveform::Triangle, frequency, 0.8), (Waveform::Sine, frequency * 2.0, 0.2)],
        );
        voice.gain.set_value_at_time(0.0, now);
        voice.gain.linear_ramp_to_value_at_time(SUSTAIN_LEVEL, now + SUSTAIN_FADE_IN);
        voice.vibrato = Some(Lfo::new(sample_rate, SUSTAIN_VIBRATO_RATE, SUSTAIN_VIBRATO_CENTS));
        voice
    }

    /// Short sine audition tone.
    pub fn preview(sample_rate: f64, frequency: f64, now: f64) -> Self {
        let mut voice = Self::with_partials(
            sample_rate,
            &[(Waveform::Sine, frequency, 0.8), (Waveform::Sine, frequency * 2.0, 0.2)],
        );
        voice.gain.set_value_at_time(0.0, now);
        voice.gain.linear_ramp_to_value_at_time(PREVIEW_PEAK, now + PREVIEW_ATTACK);
        voice.gain.exponential_ramp_to_value_at_time(EXP_FLOOR, now + PREVIEW_DECAY);
        voice.stop_at = Some(now + PREVIEW_STOP);
        voice
    }

    /// Fade out from the gain the voice has at `now` and stop at the end.
    pub fn release(&mut self, now: f64, fade: f64) {
        self.gain.cancel_and_hold_at_time(now);
        self.gain.linear_ramp_to_value_at_time(0.0, now + fade);
        let end = now + fade;
        self.stop_at = Some(self.stop_at.map_or(end, |t| t.min(end)));
    }

    pub fn is_finished(&self, time: f64) -> bool {
        self.stop_at.is_some_and(|t| time >= t)
    }

    pub fn next_sample(&mut self, time: f64) -> f64 {
        if self.is_finished(time) {
            return 0.0;
        }
        let gain = self.gain.advance(time);
        let detune = self.vibrato.as_mut().map_or(0.0, |lfo| lfo.next(time));

        let mut sum = 0.0;
        for partial in &mut self.partials {
            partial.osc.detune = detune;
            sum += partial.osc.next_sample() * partial.level;
        }
        let mut out = sum * gain;
        if let Some(burst) = &mut self.burst {
            let level = burst.gain.advance(time);
            out += burst.filter.process(burst.source.next_sample()) * level;
        }
        out
    }
}

/// Owns every live voice and mixes them to a mono signal.
#[derive(Debug)]
pub struct VoiceManager {
    sample_rate: f64,
    max_one_shots: usize,
    one_shots: Vec<Voice>,
    sustained: HashMap<String, Voice>,
    /// Stopped sustained voices and replaced previews still fading out.
    releasing: Vec<Voice>,
    preview: Option<Voice>,
}

impl VoiceManager {
    pub fn new(sample_rate: f64, max_one_shots: usize) -> Self {
        VoiceManager {
            sample_rate,
            max_one_shots: max_one_shots.max(1),
            one_shots: Vec::new(),
            sustained: HashMap::new(),
            releasing: Vec::new(),
            preview: None,
        }
    }

    /// Fire a self-terminating plucked note. Beyond the one-shot limit the
    /// oldest pluck is faded out quickly to make room.
    pub fn trigger_one_shot(&mut self, frequency: f64, now: f64) {
        if self.one_shots.len() >= self.max_one_shots {
            let mut oldest = self.one_shots.remove(0);
            oldest.release(now, STEAL_FADE);
            self.releasing.push(oldest);
        }
        self.one_shots.push(Voice::pluck(self.sample_rate, frequency, now));
    }

    /// Start a held voice under `voice_id`. Returns false (and does nothing)
    /// if that id is already sounding.
    pub fn start_sustained(&mut self, frequency: f64, voice_id: &str, now: f64) -> bool {
        if self.sustained.contains_key(voice_id) {
            return false;
        }
        self.sustained
            .insert(voice_id.to_string(), Voice::held(self.sample_rate, frequency, now));
        true
    }

    /// Fade out and unregister the held voice for `voice_id`. The id is free
    /// again immediately. Returns false if nothing was held under it.
    pub fn stop_sustained(&mut self, voice_id: &str, now: f64) -> bool {
        match self.sustained.remove(voice_id) {
            Some(mut voice) => {
                voice.release(now, SUSTAIN_FADE_OUT);
                self.releasing.push(voice);
                true
            }
            None => false,
        }
    }

    /// Stop every held voice.
    pub fn stop_all_sustained(&mut self, now: f64) {
        for (_, mut voice) in self.sustained.drain() {
            voice.release(now, SUSTAIN_FADE_OUT);
            self.releasing.push(voice);
        }
    }

    /// Play an audition tone, fading out any preview still sounding.
    pub fn preview_note(&mut self, frequency: f64, now: f64) {
        if let Some(mut previous) = self.preview.take() {
            if !previous.is_finished(now) {
                previous.release(now, PREVIEW_FADE_OUT);
                self.releasing.push(previous);
            }
        }
        self.preview = Some(Voice::preview(self.sample_rate, frequency, now));
    }

    pub fn is_sustaining(&self, voice_id: &str) -> bool {
        self.sustained.contains_key(voice_id)
    }

    pub fn sustained(&self, voice_id: &str) -> Option<&Voice> {
        self.sustained.get(voice_id)
    }

    pub fn sustained_count(&self) -> usize {
        self.sustained.len()
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Every voice that still produces sound, including fading ones.
    pub fn active_count(&self) -> usize {
        self.one_shots.len() + self.sustained.len() + self.releasing.len() + usize::from(self.preview.is_some())
    }

    /// Drop everything immediately. Used when the session closes.
    pub fn silence(&mut self) {
        self.one_shots.clear();
        self.sustained.clear();
        self.releasing.clear();
        self.preview = None;
    }

    /// Mix all voices for the sample at `time` and retire finished ones.
    pub fn next_sample(&mut self, time: f64) -> f64 {
        let mut sum = 0.0;
        for voice in self
            .one_shots
            .iter_mut()
            .chain(self.sustained.values_mut())
            .chain(self.releasing.iter_mut())
            .chain(self.preview.iter_mut())
        {
            sum += voice.next_sample(time);
        }

        self.one_shots.retain(|v| !v.is_finished(time));
        self.releasing.retain(|v| !v.is_finished(time));
        if self.preview.as_ref().is_some_and(|v| v.is_finished(time)) {
            self.preview = None;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 8000.0;

    fn run(manager: &mut VoiceManager, from: f64, to: f64) -> Vec<f64> {
        let start = (from * SR).round() as usize;
        let end = (to * SR).round() as usize;
        (start..end).map(|i| manager.next_sample(i as f64 / SR)).collect()
    }

    #[test]
    fn pluck_sounds_then_disposes_itself() {
        let mut manager = VoiceManager::new(SR, 8);
        manager.trigger_one_shot(440.0, 0.0);
        let out = run(&mut manager, 0.0, 0.2);
        assert!(out.iter().any(|s| s.abs() > 0.05));
        assert_eq!(manager.active_count(), 1);

        run(&mut manager, 0.2, 1.35);
        assert_eq!(manager.active_count(), 0);
        assert!(run(&mut manager, 1.35, 1.4).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn pluck_envelope_is_attack_then_exponential_decay() {
        let mut voice = Voice::pluck(SR, 440.0, 1.0);
        assert!((voice.gain.advance(1.0) - EXP_FLOOR).abs() < 1e-12);
        assert!((voice.gain.advance(1.005) - PLUCK_PEAK).abs() < 1e-9);
        let early = voice.gain.advance(1.1);
        let late = voice.gain.advance(1.6);
        assert!(late < early && late > 0.0);
        // created at t = 1.0, so the voice ends PLUCK_STOP later
        assert!(!voice.is_finished(1.0 + PLUCK_STOP - 0.01));
        assert!(voice.is_finished(1.0 + PLUCK_STOP));
    }

    #[test]
    fn duplicate_start_is_ignored() {
        let mut manager = VoiceManager::new(SR, 8);
        assert!(manager.start_sustained(220.0, "n1", 0.0));
        assert!(!manager.start_sustained(330.0, "n1", 0.0));
        assert_eq!(manager.sustained_count(), 1);
    }

    #[test]
    fn stopping_unknown_voice_is_noop() {
        let mut manager = VoiceManager::new(SR, 8);
        assert!(!manager.stop_sustained("missing", 0.0));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn stop_fades_from_live_gain() {
        let mut manager = VoiceManager::new(SR, 8);
        manager.start_sustained(220.0, "n1", 0.0);
        // halfway through the fade-in
        run(&mut manager, 0.0, 0.01);
        let live = manager.sustained("n1").map(|v| v.gain.current()).unwrap_or_default();
        assert!(live > 0.05 && live < SUSTAIN_LEVEL);

        assert!(manager.stop_sustained("n1", 0.01));
        assert!(!manager.is_sustaining("n1"));
        assert_eq!(manager.active_count(), 1);

        let out = run(&mut manager, 0.01, 0.2);
        // never louder than the gain held at the stop point
        assert!(out.iter().all(|s| s.abs() <= 0.5 * SUSTAIN_LEVEL + 1e-6));
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn restart_after_stop_begins_from_silence() {
        let mut manager = VoiceManager::new(SR, 8);
        manager.start_sustained(220.0, "n1", 0.0);
        run(&mut manager, 0.0, 0.1);
        manager.stop_sustained("n1", 0.1);
        assert!(manager.start_sustained(220.0, "n1", 0.1));

        let fresh = manager.sustained("n1").map(|v| v.gain.peek(0.1));
        assert_eq!(fresh, Some(0.0));
    }

    #[test]
    fn stop_all_releases_every_held_voice() {
        let mut manager = VoiceManager::new(SR, 8);
        manager.start_sustained(220.0, "a", 0.0);
        manager.start_sustained(330.0, "b", 0.0);
        manager.stop_all_sustained(0.05);
        assert_eq!(manager.sustained_count(), 0);
        run(&mut manager, 0.0, 0.2);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn only_one_preview_at_a_time() {
        let mut manager = VoiceManager::new(SR, 8);
        manager.preview_note(261.63, 0.0);
        run(&mut manager, 0.0, 0.1);
        manager.preview_note(329.63, 0.1);
        assert!(manager.has_preview());
        // the old preview is fading, not cut
        assert_eq!(manager.active_count(), 2);
        run(&mut manager, 0.1, 0.2);
        assert_eq!(manager.active_count(), 1);
        run(&mut manager, 0.2, 0.8);
        assert!(!manager.has_preview());
    }

    #[test]
    fn one_shot_limit_steals_oldest() {
        let mut manager = VoiceManager::new(SR, 2);
        manager.trigger_one_shot(220.0, 0.0);
        manager.trigger_one_shot(330.0, 0.0);
        manager.trigger_one_shot(440.0, 0.0);
        assert_eq!(manager.active_count(), 3);
        run(&mut manager, 0.0, 0.05);
        assert_eq!(manager.active_count(), 2);
    }
}
