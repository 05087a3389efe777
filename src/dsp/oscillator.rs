//! Tone oscillators, a white-noise source, and the free-running LFO used by
//! the modulation units.

use std::f64::consts::TAU;

use super::param::Param;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Triangle,
    /// Uniform white noise in [-1, 1); frequency is ignored.
    Noise,
}

/// A phase-accumulating oscillator. `detune` is in cents.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub detune: f64,
    phase: f64,
    sample_rate: f64,
    rng: fastrand::Rng,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_frequency(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        let mut osc = Self::new(waveform, sample_rate);
        osc.frequency = frequency;
        osc
    }

    fn phase_inc(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0) / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (TAU * self.phase).sin(),
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            Waveform::Noise => self.rng.f64() * 2.0 - 1.0,
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

}

/// A sine LFO whose rate and depth are automatable.
///
/// Started when the graph is built and never stopped; the owning unit scales
/// `next` into its modulation target (delay time, filter frequency, gain).
#[derive(Debug, Clone)]
pub struct Lfo {
    pub rate: Param,
    pub depth: Param,
    phase: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f64, rate: f64, depth: f64) -> Self {
        Lfo {
            rate: Param::with_range(rate, 0.0, 40.0),
            depth: Param::new(depth),
            phase: 0.0,
            sample_rate,
        }
    }

    /// Advance one sample at audio time `time`; returns `sin * depth`.
    pub fn next(&mut self, time: f64) -> f64 {
        self.next_stereo(time, 0.0).0
    }

    /// Advance one sample and return the scaled sine at the current phase and
    /// at `phase + offset` (a second tap for the right channel).
    pub fn next_stereo(&mut self, time: f64, offset: f64) -> (f64, f64) {
        let rate = self.rate.advance(time);
        let depth = self.depth.advance(time);
        let left = (TAU * self.phase).sin() * depth;
        let right = (TAU * (self.phase + offset)).sin() * depth;
        self.phase = (self.phase + rate / self.sample_rate).fract();
        (left, right)
    }

    /// Current phase in [0, 1).
    pub fn phase(&self) -> f64 {
        self.phase
    }
}
