//! 指数平滑 + 单步钳位
//!
//! `smoothed = current * α + target * (1 - α)`，α 偏向旧值；
//! 随后把 |smoothed - current| 钳位到单步上限。
//! 某通道的第一个样本直接作为当前值，不做平滑（冷启动直通）。

use std::collections::BTreeMap;

/// 每通道位置平滑器
#[derive(Debug, Clone)]
pub struct PositionSmoother {
    smoothing_factor: f64,
    max_step: i32,
    current: BTreeMap<u8, i32>,
}

impl PositionSmoother {
    pub fn new(smoothing_factor: f64, max_step: i32) -> Self {
        Self {
            smoothing_factor: smoothing_factor.clamp(0.0, 1.0),
            max_step: max_step.max(1),
            current: BTreeMap::new(),
        }
    }

    /// 平滑一个通道的目标位置，返回实际应下发的位置
    pub fn smooth(&mut self, channel: u8, target: i32) -> i32 {
        let Some(&current) = self.current.get(&channel) else {
            // 冷启动：当前值初始化为目标值
            self.current.insert(channel, target);
            return target;
        };

        let blended = current as f64 * self.smoothing_factor
            + target as f64 * (1.0 - self.smoothing_factor);
        let mut smoothed = blended as i32;

        let change = smoothed - current;
        if change.abs() > self.max_step {
            let direction = if change > 0 { 1 } else { -1 };
            smoothed = current + direction * self.max_step;
        }

        self.current.insert(channel, smoothed);
        smoothed
    }

    /// 当前保持的位置（尚无样本的通道返回 None）
    pub fn current(&self, channel: u8) -> Option<i32> {
        self.current.get(&channel).copied()
    }

    /// 丢弃全部历史（重新冷启动）
    pub fn reset(&mut self) {
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut smoother = PositionSmoother::new(0.8, 200);
        assert_eq!(smoother.smooth(1, 2048), 2048);
        assert_eq!(smoother.current(1), Some(2048));
    }

    #[test]
    fn test_smoothing_favors_current() {
        let mut smoother = PositionSmoother::new(0.8, 10_000);
        smoother.smooth(1, 2000);
        // 2000*0.8 + 2048*0.2 = 2009.6 → 2009
        assert_eq!(smoother.smooth(1, 2048), 2009);
    }

    #[test]
    fn test_step_clamp_limits_change() {
        let mut smoother = PositionSmoother::new(0.0, 200); // α=0：直接追目标
        smoother.smooth(1, 0);
        // 目标 4000，但单步最多 +200
        assert_eq!(smoother.smooth(1, 4000), 200);
        assert_eq!(smoother.smooth(1, 4000), 400);
    }

    #[test]
    fn test_step_clamp_negative_direction() {
        let mut smoother = PositionSmoother::new(0.0, 200);
        smoother.smooth(1, 4000);
        assert_eq!(smoother.smooth(1, 0), 3800);
    }

    #[test]
    fn test_monotone_convergence() {
        let mut smoother = PositionSmoother::new(0.8, 200);
        smoother.smooth(1, 2000);

        let target = 2048;
        let mut previous = 2000;
        for _ in 0..100 {
            let output = smoother.smooth(1, target);
            // 单调逼近，且每步不超过 max_step
            assert!(output >= previous, "output {output} regressed from {previous}");
            assert!((output - previous).abs() <= 200);
            previous = output;
        }
        // 整数截断会在 0.2*(target-current) < 1 处停住，即 4 tic 以内
        assert!((target - previous).abs() <= 4, "settled at {previous}");
    }

    #[test]
    fn test_channels_independent() {
        let mut smoother = PositionSmoother::new(0.8, 200);
        smoother.smooth(1, 1000);
        smoother.smooth(2, 3000);
        assert_eq!(smoother.current(1), Some(1000));
        assert_eq!(smoother.current(2), Some(3000));
    }

    #[test]
    fn test_reset_restores_cold_start() {
        let mut smoother = PositionSmoother::new(0.8, 200);
        smoother.smooth(1, 1000);
        smoother.reset();
        assert_eq!(smoother.smooth(1, 3000), 3000);
    }
}
