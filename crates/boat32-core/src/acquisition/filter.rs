/// Exponential moving average `filtered = (raw + filtered * N) / (N + 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverage {
    weight: f32,
    value: f32,
}

impl MovingAverage {
    pub const fn new(weight: u16) -> Self {
        Self {
            weight: weight as f32,
            value: 0.0,
        }
    }

    /// Start from `value` instead of zero.
    pub const fn with_initial(weight: u16, value: f32) -> Self {
        Self {
            weight: weight as f32,
            value,
        }
    }

    pub fn update(&mut self, raw: f32) -> f32 {
        self.value = (raw + self.value * self.weight) / (self.weight + 1.0);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_from_any_start() {
        for start in [-500.0, 0.0, 12.6, 1.0e4] {
            let mut filter = MovingAverage::with_initial(4, start);
            for _ in 0..200 {
                filter.update(12.6);
            }
            assert!(
                (filter.value() - 12.6).abs() < 1e-3,
                "start {start} ended at {}",
                filter.value()
            );
        }
    }

    #[test]
    fn test_single_step_weighting() {
        let mut filter = MovingAverage::new(4);
        assert_eq!(filter.update(10.0), 2.0);
        assert_eq!(filter.update(10.0), 3.6);
    }
}
