//! 最新帧槽位
//!
//! 单写单读：RX 线程写，控制环读。ArcSwap 保证读侧永远不会
//! 观察到半写状态，也没有锁竞争。容量恒为 1，覆盖即丢弃旧帧。

use crate::time::now_unix_ms;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 接收侧统计快照
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkStats {
    /// 收到的遥测帧总数
    pub received: u64,
    /// 间隙推断的丢帧数
    pub dropped: u64,
    /// 最后一帧到达时刻（unix 毫秒，0 = 从未收到）
    pub last_receive_unix_ms: u64,
}

impl LinkStats {
    /// 距最后一帧的秒数；从未收到返回 `None`
    pub fn age_s(&self, now_ms: u64) -> Option<f64> {
        if self.last_receive_unix_ms == 0 {
            None
        } else {
            Some(now_ms.saturating_sub(self.last_receive_unix_ms) as f64 / 1000.0)
        }
    }
}

/// 容量 1 的遥测帧覆盖槽
pub struct LatestSlot {
    inner: ArcSwapOption<solink_protocol::wire::TelemetryFrame>,
    received: AtomicU64,
    dropped: AtomicU64,
    last_sequence: AtomicU64,
    last_receive_unix_ms: AtomicU64,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self {
            inner: ArcSwapOption::const_empty(),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            last_receive_unix_ms: AtomicU64::new(0),
        }
    }

    /// 写入新帧（RX 线程专用）
    ///
    /// 间隙只在覆盖了一个未被消费的帧时才计为丢弃——
    /// 正常覆盖是本设计的预期行为，不是丢包。
    pub fn publish(&self, frame: solink_protocol::wire::TelemetryFrame) {
        let sequence = frame.sequence;
        let previous = self.inner.swap(Some(Arc::new(frame)));

        let last = self.last_sequence.swap(sequence, Ordering::Relaxed);
        if last > 0 && sequence > last + 1 && previous.is_some() {
            self.dropped.fetch_add(sequence - last - 1, Ordering::Relaxed);
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_receive_unix_ms.store(now_unix_ms(), Ordering::Relaxed);
    }

    /// 取走最新帧并清空槽位（控制环专用）
    pub fn take(&self) -> Option<solink_protocol::wire::TelemetryFrame> {
        self.inner.swap(None).map(|arc| (*arc).clone())
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_receive_unix_ms: self.last_receive_unix_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatestSlot {
    fn default() -> Self {
        Self::new()
    }
}
