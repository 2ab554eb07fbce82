/// Source of pointer motion, e.g. an optical sensor driver.
pub trait MotionSensor {
    /// Motion since the previous read.
    fn read_delta(&mut self) -> (i32, i32);
}

/// For halves without a pointing device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensor;

impl MotionSensor for NoSensor {
    fn read_delta(&mut self) -> (i32, i32) {
        (0, 0)
    }
}

/// Sums motion between sends and hands it out in i8-sized steps.
///
/// Whatever does not fit into one step stays in the accumulator for the
/// next call to [`MotionAccumulator::take`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionAccumulator {
    dx: i32,
    dy: i32,
}

impl MotionAccumulator {
    pub fn add(&mut self, dx: i32, dy: i32) {
        self.dx = self.dx.saturating_add(dx);
        self.dy = self.dy.saturating_add(dy);
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    pub fn take(&mut self) -> Option<(i8, i8)> {
        if self.is_zero() {
            return None;
        }
        let dx = clamp_i8(self.dx);
        let dy = clamp_i8(self.dy);
        self.dx -= i32::from(dx);
        self.dy -= i32::from(dy);
        Some((dx, dy))
    }
}

fn clamp_i8(v: i32) -> i8 {
    v.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_carries_overflow() {
        let mut acc = MotionAccumulator::default();
        acc.add(100, -3);
        acc.add(100, -200);
        assert_eq!(acc.take(), Some((127, -128)));
        assert_eq!(acc.take(), Some((73, -75)));
        assert_eq!(acc.take(), None);
    }

    #[test]
    fn test_zero_motion_sends_nothing() {
        let mut acc = MotionAccumulator::default();
        acc.add(5, 0);
        acc.add(-5, 0);
        assert!(acc.is_zero());
        assert_eq!(acc.take(), None);
    }
}
