//! Zoom factor for page rendering

/// Zoom applied to every render (1.0 = 100%)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    factor: f32,
}

impl Default for Zoom {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl Zoom {
    /// Additive change per zoom step
    pub const STEP: f32 = 0.1;
    /// Minimum allowed zoom factor
    pub const MIN_SCALE: f32 = 0.2;
    /// Maximum allowed zoom factor
    pub const MAX_SCALE: f32 = 5.0;

    #[must_use]
    pub fn new(factor: f32) -> Self {
        Self {
            factor: Self::clamp_factor(factor),
        }
    }

    #[must_use]
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Set the factor, returning whether it changed
    pub fn set(&mut self, factor: f32) -> bool {
        let clamped = Self::clamp_factor(factor);
        if (self.factor - clamped).abs() > f32::EPSILON {
            self.factor = clamped;
            true
        } else {
            false
        }
    }

    pub fn step_in(&mut self) -> bool {
        self.set(self.factor + Self::STEP)
    }

    pub fn step_out(&mut self) -> bool {
        self.set(self.factor - Self::STEP)
    }

    pub fn reset(&mut self) -> bool {
        self.set(1.0)
    }

    /// Clamp into range and round to two decimals so repeated steps do not
    /// drift. Non-finite input becomes 1.0.
    #[must_use]
    pub fn clamp_factor(factor: f32) -> f32 {
        if !factor.is_finite() {
            return 1.0;
        }
        let rounded = (factor * 100.0).round() / 100.0;
        rounded.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_additive_and_exact() {
        let mut zoom = Zoom::default();
        for _ in 0..5 {
            zoom.step_in();
        }
        assert_eq!(zoom.factor(), 1.5);

        for _ in 0..3 {
            zoom.step_out();
        }
        assert_eq!(zoom.factor(), 1.2);
    }

    #[test]
    fn zoom_out_stops_at_minimum() {
        let mut zoom = Zoom::new(0.3);
        assert!(zoom.step_out());
        assert_eq!(zoom.factor(), Zoom::MIN_SCALE);
        assert!(!zoom.step_out());
        assert_eq!(zoom.factor(), Zoom::MIN_SCALE);
    }

    #[test]
    fn clamps_out_of_range_values() {
        assert_eq!(Zoom::clamp_factor(100.0), Zoom::MAX_SCALE);
        assert_eq!(Zoom::clamp_factor(-1.0), Zoom::MIN_SCALE);
        assert_eq!(Zoom::clamp_factor(f32::NAN), 1.0);
    }

    #[test]
    fn reset_reports_change() {
        let mut zoom = Zoom::new(2.0);
        assert!(zoom.reset());
        assert!(!zoom.reset());
        assert_eq!(zoom.factor(), 1.0);
    }
}
