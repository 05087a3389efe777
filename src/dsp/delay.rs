//! Delay lines and the feedback echo unit.

use super::graph::EffectUnit;
use super::param::Param;

/// Longest echo the delay unit can produce, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 2.0;

/// A mono circular buffer read at fractional positions.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// A line able to delay by up to `max_samples` samples.
    pub fn new(max_samples: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; max_samples.max(2) + 2],
            write_pos: 0,
        }
    }

    pub fn with_seconds(sample_rate: f64, seconds: f64) -> Self {
        Self::new((sample_rate * seconds).ceil() as usize)
    }

    /// Longest usable delay in samples.
    pub fn capacity(&self) -> f64 {
        (self.buffer.len() - 2) as f64
    }

    /// Read `delay` samples behind the next write position, interpolating
    /// linearly between neighbours. `delay` is clamped to `[1, capacity]`.
    #[inline]
    pub fn read(&self, delay: f64) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, self.capacity());
        let whole = delay as usize;
        let frac = (delay - whole as f64) as f32;

        let i0 = (self.write_pos + len - whole) % len;
        let i1 = (i0 + len - 1) % len;
        let s0 = self.buffer[i0];
        let s1 = self.buffer[i1];
        s0 + frac * (s1 - s0)
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Stereo feedback echo. Time and feedback are automatable so configuration
/// changes glide instead of stepping.
#[derive(Debug, Clone)]
pub struct Delay {
    line_l: DelayLine,
    line_r: DelayLine,
    sample_rate: f64,

    /// Delay time in seconds.
    pub time: Param,
    /// Feedback amount (0.0 = single echo, clamped below 1.0).
    pub feedback: Param,
}

impl Delay {
    pub fn new(sample_rate: f64) -> Self {
        Delay {
            line_l: DelayLine::with_seconds(sample_rate, MAX_DELAY_SECONDS),
            line_r: DelayLine::with_seconds(sample_rate, MAX_DELAY_SECONDS),
            sample_rate,
            time: Param::with_range(0.3, 0.001, MAX_DELAY_SECONDS),
            feedback: Param::with_range(0.35, 0.0, 0.95),
        }
    }
}

impl EffectUnit for Delay {
    #[inline]
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let delay = self.time.advance(time) * self.sample_rate;
        let feedback = self.feedback.advance(time) as f32;

        let delayed_l = self.line_l.read(delay);
        let delayed_r = self.line_r.read(delay);
        self.line_l.write(left + delayed_l * feedback);
        self.line_r.write(right + delayed_r * feedback);

        (delayed_l, delayed_r)
    }

    fn clear(&mut self) {
        self.line_l.clear();
        self.line_r.clear();
    }
}
