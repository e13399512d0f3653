//! 网络监控
//!
//! 发送侧统计：发送/确认计数、滚动延迟窗口、丢包率。
//! 只要求每第 N 帧被确认，以约束回执流量。

use crate::time::now_unix;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tracing::debug;

/// 延迟样本窗口容量
const MAX_LATENCY_SAMPLES: usize = 100;

/// 默认每 5 帧确认一帧
pub const DEFAULT_ACK_EVERY: u64 = 5;

/// 派生统计（不存储，按需计算）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkStats {
    pub sent: u64,
    pub acked: u64,
    /// 平均延迟（毫秒），无样本时为 0
    pub avg_latency_ms: f64,
    /// 窗口内最大延迟（毫秒），无样本时为 0
    pub max_latency_ms: f64,
    /// 丢包率 [0, 1]，尚无期望回执时为 0
    pub packet_loss: f64,
}

/// 发送侧网络监控
pub struct NetworkMonitor {
    ack_every: u64,
    sent: u64,
    acked: u64,
    /// 序列号 → 发送时刻（回执到达后删除）
    pending: HashMap<u64, Instant>,
    /// 延迟滚动窗口（毫秒）
    latencies: VecDeque<f64>,
}

impl NetworkMonitor {
    pub fn new(ack_every: u64) -> Self {
        Self {
            ack_every: ack_every.max(1),
            sent: 0,
            acked: 0,
            pending: HashMap::new(),
            latencies: VecDeque::with_capacity(MAX_LATENCY_SAMPLES),
        }
    }

    /// 本端（从动侧）是否应当回执该序列号
    pub fn should_ack(&self, sequence: u64) -> bool {
        sequence % self.ack_every == 0
    }

    /// 记录一次发送
    pub fn record_sent(&mut self, sequence: u64) {
        self.sent += 1;
        self.pending.insert(sequence, Instant::now());
    }

    /// 记录一次确认，返回该帧延迟（毫秒）
    ///
    /// 延迟 = now − 帧发出时刻。未知序列号（重复回执、重启残留）
    /// 返回 `None` 且不计数。
    pub fn record_acked(&mut self, sequence: u64, origin_timestamp: f64) -> Option<f64> {
        let sent_at = self.pending.remove(&sequence)?;
        // 墙钟差值与对端时钟有关；origin_timestamp 为 0 时退回单调时钟
        let latency_ms = if origin_timestamp > 0.0 {
            (now_unix() - origin_timestamp) * 1000.0
        } else {
            sent_at.elapsed().as_secs_f64() * 1000.0
        };
        let latency_ms = latency_ms.max(0.0);

        if self.latencies.len() >= MAX_LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
        self.acked += 1;
        debug!("ack for seq {sequence}: {latency_ms:.1}ms");
        Some(latency_ms)
    }

    /// 当前统计快照
    ///
    /// 所有除零情形（尚未发送、尚无样本）都报 0，绝不 NaN。
    pub fn stats(&self) -> NetworkStats {
        let (avg, max) = if self.latencies.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = self.latencies.iter().sum();
            let max = self.latencies.iter().cloned().fold(0.0, f64::max);
            (sum / self.latencies.len() as f64, max)
        };

        let expected_acks = self.sent / self.ack_every;
        let packet_loss = if expected_acks == 0 {
            0.0
        } else {
            (1.0 - self.acked as f64 / expected_acks as f64).clamp(0.0, 1.0)
        };

        NetworkStats {
            sent: self.sent,
            acked: self.acked,
            avg_latency_ms: avg,
            max_latency_ms: max,
            packet_loss,
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_EVERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_traffic_reports_zeroes() {
        let monitor = NetworkMonitor::default();
        let stats = monitor.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.packet_loss, 0.0);
        assert!(!stats.packet_loss.is_nan());
    }

    #[test]
    fn test_packet_loss_math() {
        // sent=50, acked=9, 每 5 帧一确认 ⇒ expected=10, loss=0.1
        let mut monitor = NetworkMonitor::new(5);
        for seq in 1..=50 {
            monitor.record_sent(seq);
        }
        for seq in (5..=45).step_by(5) {
            monitor.record_acked(seq, 0.0);
        }
        let stats = monitor.stats();
        assert_eq!(stats.sent, 50);
        assert_eq!(stats.acked, 9);
        assert!((stats.packet_loss - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_ack_latency_from_origin_timestamp() {
        let mut monitor = NetworkMonitor::new(1);
        monitor.record_sent(1);
        // 帧发出于 50ms 前
        let latency = monitor
            .record_acked(1, crate::time::now_unix() - 0.05)
            .unwrap();
        assert!(latency > 40.0 && latency < 200.0, "latency = {latency}");
    }

    #[test]
    fn test_unknown_sequence_ignored() {
        let mut monitor = NetworkMonitor::new(1);
        monitor.record_sent(1);
        assert!(monitor.record_acked(99, 0.0).is_none());
        assert_eq!(monitor.stats().acked, 0);
    }

    #[test]
    fn test_duplicate_ack_counted_once() {
        let mut monitor = NetworkMonitor::new(1);
        monitor.record_sent(1);
        assert!(monitor.record_acked(1, 0.0).is_some());
        assert!(monitor.record_acked(1, 0.0).is_none());
        assert_eq!(monitor.stats().acked, 1);
    }

    #[test]
    fn test_latency_window_bounded() {
        let mut monitor = NetworkMonitor::new(1);
        for seq in 0..300u64 {
            monitor.record_sent(seq);
            monitor.record_acked(seq, 0.0);
        }
        assert!(monitor.latencies.len() <= MAX_LATENCY_SAMPLES);
    }

    #[test]
    fn test_should_ack_every_nth() {
        let monitor = NetworkMonitor::new(5);
        assert!(monitor.should_ack(5));
        assert!(monitor.should_ack(10));
        assert!(!monitor.should_ack(7));
    }

    #[test]
    fn test_loss_never_negative() {
        // 回执多于期望（例如对端按更密的节奏回执）时钳位到 0
        let mut monitor = NetworkMonitor::new(5);
        for seq in 1..=10 {
            monitor.record_sent(seq);
            monitor.record_acked(seq, 0.0);
        }
        assert_eq!(monitor.stats().packet_loss, 0.0);
    }
}
