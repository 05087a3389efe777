//! Automation timeline for a single control parameter.
//!
//! Mirrors the WebAudio `AudioParam` event model: values are declared ahead of
//! time as (target, time) pairs and evaluated against the audio sample clock.
//! Every gain, rate and depth in the signal graph and in the voices is a
//! `Param`, so envelopes and configuration ramps share one implementation.

/// Exponential ramps cannot reach or cross zero; targets are floored here.
pub const EXP_FLOOR: f64 = 1e-4;

/// A scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    /// Jump to `value` at `time` and hold.
    Set { time: f64, value: f64 },
    /// Linear ramp from the previous event to `value`, arriving at `time`.
    Linear { time: f64, value: f64 },
    /// Exponential ramp from the previous event to `value`, arriving at `time`.
    Exponential { time: f64, value: f64 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::Set { time, .. }
            | Automation::Linear { time, .. }
            | Automation::Exponential { time, .. } => time,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            Automation::Set { value, .. }
            | Automation::Linear { value, .. }
            | Automation::Exponential { value, .. } => value,
        }
    }
}

/// An automatable control value.
#[derive(Debug, Clone)]
pub struct Param {
    /// Start point of the segment currently being evaluated.
    anchor_time: f64,
    anchor_value: f64,
    /// Pending events, ordered by time.
    events: Vec<Automation>,
    /// Most recently computed value.
    value: f64,
    min: f64,
    max: f64,
}

impl Param {
    pub fn new(value: f64) -> Self {
        Param {
            anchor_time: 0.0,
            anchor_value: value,
            events: Vec::new(),
            value,
            min: f64::MIN,
            max: f64::MAX,
        }
    }

    /// Create a parameter whose output is clamped to `[min, max]`.
    pub fn with_range(value: f64, min: f64, max: f64) -> Self {
        let mut p = Self::new(value.clamp(min, max));
        p.min = min;
        p.max = max;
        p
    }

    /// The value computed at the last `advance` (the "live" value).
    pub fn current(&self) -> f64 {
        self.value
    }

    /// The value the timeline settles on once every pending event has run.
    pub fn target(&self) -> f64 {
        self.events
            .last()
            .map(|e| e.value())
            .unwrap_or(self.anchor_value)
            .clamp(self.min, self.max)
    }

    /// Number of events still waiting to be reached.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Automation::Set { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Automation::Linear { time, value });
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        let value = if value.abs() < EXP_FLOOR {
            EXP_FLOOR.copysign(if value == 0.0 { 1.0 } else { value })
        } else {
            value
        };
        self.insert(Automation::Exponential { time, value });
    }

    /// Drop every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Drop events at or after `time` and pin the value the timeline had at
    /// `time`, so a following ramp starts exactly where the old curve was.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.peek(time);
        self.cancel_scheduled_values(time);
        self.insert(Automation::Linear { time, value: held });
    }

    /// Cancel pending automation at `now` and ramp linearly to `value` over
    /// `duration` seconds, starting from wherever the parameter currently is.
    ///
    /// `now` must not precede the last `advance`. Everything before `now` is
    /// folded into the anchor, so the timeline holds a single event after
    /// this call no matter how often it is repeated.
    pub fn ramp_to(&mut self, value: f64, now: f64, duration: f64) {
        let held = self.peek(now);
        self.events.clear();
        self.anchor_time = now;
        self.anchor_value = held;
        self.linear_ramp_to_value_at_time(value, now + duration.max(0.0));
    }

    /// Evaluate the timeline at `time` and consume the events it has passed.
    /// `time` must be non-decreasing between calls.
    pub fn advance(&mut self, time: f64) -> f64 {
        while let Some(first) = self.events.first().copied() {
            if first.time() > time {
                break;
            }
            self.anchor_time = first.time();
            self.anchor_value = first.value();
            self.events.remove(0);
        }
        self.value = self.evaluate(time);
        self.value
    }

    /// Evaluate the timeline at `time` without consuming events.
    pub fn peek(&self, time: f64) -> f64 {
        let mut anchor = (self.anchor_time, self.anchor_value);
        for event in &self.events {
            if event.time() > time {
                return self.segment(anchor, *event, time);
            }
            anchor = (event.time(), event.value());
        }
        anchor.1.clamp(self.min, self.max)
    }

    fn evaluate(&self, time: f64) -> f64 {
        match self.events.first() {
            Some(next) => self.segment((self.anchor_time, self.anchor_value), *next, time),
            None => self.anchor_value.clamp(self.min, self.max),
        }
    }

    fn segment(&self, (t0, v0): (f64, f64), next: Automation, time: f64) -> f64 {
        let raw = match next {
            Automation::Set { .. } => v0,
            Automation::Linear { time: t1, value: v1 } => {
                if t1 <= t0 {
                    v1
                } else {
                    let t = ((time - t0) / (t1 - t0)).clamp(0.0, 1.0);
                    v0 + (v1 - v0) * t
                }
            }
            Automation::Exponential { time: t1, value: v1 } => {
                // Sign change or zero start: hold, as WebAudio does.
                if t1 <= t0 || v0 == 0.0 || v0.signum() != v1.signum() {
                    v0
                } else {
                    let t = ((time - t0) / (t1 - t0)).clamp(0.0, 1.0);
                    v0 * (v1 / v0).powf(t)
                }
            }
        };
        raw.clamp(self.min, self.max)
    }

    fn insert(&mut self, event: Automation) {
        let idx = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(idx, event);
    }
}

impl Default for Param {
    fn default() -> Self {
        Param::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_initial_value() {
        let mut p = Param::new(0.5);
        assert_eq!(p.advance(0.0), 0.5);
        assert_eq!(p.advance(10.0), 0.5);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        assert!((p.advance(1.0) - 0.0).abs() < 1e-9);
        assert!((p.advance(1.5) - 0.5).abs() < 1e-9);
        assert!((p.advance(2.0) - 1.0).abs() < 1e-9);
        assert!((p.advance(3.0) - 1.0).abs() < 1e-9);
        assert_eq!(p.pending_events(), 0);
    }

    #[test]
    fn exponential_ramp_decays_without_reaching_zero() {
        let mut p = Param::new(1.0);
        p.set_value_at_time(1.0, 0.0);
        p.exponential_ramp_to_value_at_time(0.0, 1.0);
        let mid = p.advance(0.5);
        assert!((mid - EXP_FLOOR.sqrt()).abs() < 1e-6, "got {mid}");
        let end = p.advance(1.0);
        assert!(end > 0.0 && (end - EXP_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn cancel_and_hold_starts_from_live_value() {
        let mut p = Param::new(0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        let live = p.advance(0.4);
        p.ramp_to(0.0, 0.4, 0.1);
        // No jump at the cancel point.
        assert!((p.advance(0.4) - live).abs() < 1e-9);
        assert!((p.advance(0.45) - live / 2.0).abs() < 1e-9);
        assert!(p.advance(0.5).abs() < 1e-9);
    }

    #[test]
    fn repeated_ramps_do_not_accumulate_events() {
        let mut p = Param::new(0.0);
        for i in 0..100 {
            p.ramp_to(i as f64 / 100.0, 0.0, 0.08);
        }
        assert!(p.pending_events() <= 2, "got {}", p.pending_events());
        assert!((p.target() - 0.99).abs() < 1e-9);
    }

    #[test]
    fn range_clamps_output() {
        let mut p = Param::with_range(0.5, 0.0, 1.0);
        p.set_value_at_time(4.0, 0.0);
        assert_eq!(p.advance(0.0), 1.0);
    }
}
