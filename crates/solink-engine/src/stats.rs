//! 状态快照与速率统计
//!
//! 控制环在每拍末尾把快照写进 ArcSwap，≈2 Hz 的显示线程只读
//! 快照，绝不触碰硬件。

use solink_transport::monitor::NetworkStats;
use solink_transport::slot::LinkStats;
use std::collections::VecDeque;
use std::time::Instant;

/// 速率窗口容量
const MAX_INTERVAL_SAMPLES: usize = 100;

/// 控制环状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Disconnecting,
    Stopped,
}

/// 实际更新速率统计（滚动间隔窗口）
#[derive(Debug, Clone, Default)]
pub struct RateTracker {
    last_tick: Option<Instant>,
    intervals: VecDeque<f64>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次事件
    pub fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            if self.intervals.len() >= MAX_INTERVAL_SAMPLES {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.duration_since(last).as_secs_f64());
        }
        self.last_tick = Some(now);
    }

    /// 实际速率（Hz），无样本时为 0
    pub fn rate_hz(&self) -> f64 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let avg: f64 = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        if avg > 0.0 { 1.0 / avg } else { 0.0 }
    }
}

/// 从动臂健康表条目（主动侧展示用）
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerHealth {
    pub follower_id: String,
    /// 最后一次状态消息的时刻（unix 秒）
    pub last_seen: f64,
    pub motors_active: u32,
}

/// 主动侧状态快照
#[derive(Debug, Clone, Default)]
pub struct LeaderStatus {
    pub state: LoopState,
    pub mapping: Vec<(String, String)>,
    pub network: NetworkStats,
    pub publish_hz: f64,
    pub followers: Vec<FollowerHealth>,
}

/// 从动侧状态快照
#[derive(Debug, Clone, Default)]
pub struct FollowerStatus {
    pub state: LoopState,
    pub link: LinkStats,
    pub update_hz: f64,
    pub stale_drops: u64,
    pub applied_frames: u64,
    /// 最近一帧的传输时延（毫秒）
    pub last_latency_ms: f64,
    pub gripper_clogged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rate_tracker_empty_is_zero() {
        let tracker = RateTracker::new();
        assert_eq!(tracker.rate_hz(), 0.0);
    }

    #[test]
    fn test_rate_tracker_measures_interval() {
        let mut tracker = RateTracker::new();
        for _ in 0..5 {
            tracker.tick();
            std::thread::sleep(Duration::from_millis(10));
        }
        let hz = tracker.rate_hz();
        // 10ms 间隔 ≈ 100Hz，放宽到调度抖动
        assert!(hz > 30.0 && hz < 150.0, "rate = {hz}");
    }

    #[test]
    fn test_rate_tracker_window_bounded() {
        let mut tracker = RateTracker::new();
        for _ in 0..300 {
            tracker.tick();
        }
        assert!(tracker.intervals.len() <= MAX_INTERVAL_SAMPLES);
    }

    #[test]
    fn test_loop_state_default_idle() {
        assert_eq!(LoopState::default(), LoopState::Idle);
    }
}
