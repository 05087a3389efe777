//! Master bus — master gain and soft clipping between the signal graph and
//! the device output / recording tap.

/// Final gain stage applied to every rendered frame.
#[derive(Debug, Clone)]
pub struct MasterBus {
    pub master_gain: f64,
}

impl MasterBus {
    pub fn new(master_gain: f64) -> Self {
        MasterBus { master_gain }
    }

    /// Apply master gain and soft clipping to one stereo frame.
    #[inline]
    pub fn process(&self, left: f32, right: f32) -> (f32, f32) {
        (
            soft_clip(left as f64 * self.master_gain) as f32,
            soft_clip(right as f64 * self.master_gain) as f32,
        )
    }
}

impl Default for MasterBus {
    fn default() -> Self {
        MasterBus::new(0.8)
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_stays_silent() {
        let bus = MasterBus::default();
        assert_eq!(bus.process(0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn applies_gain_before_clipping() {
        let bus = MasterBus::new(1.0);
        let (l, r) = bus.process(0.8, -0.5);
        assert!((l as f64 - soft_clip(0.8)).abs() < 1e-6);
        assert!((r as f64 - soft_clip(-0.5)).abs() < 1e-6);
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let bus = MasterBus::new(1.0);
        let (l, _) = bus.process(100.0, 0.0);
        assert!(l.abs() <= 1.0, "Soft clip should keep output <= 1.0, got {l}");
    }
}
