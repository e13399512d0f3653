//! 主动侧控制环
//!
//! `Idle → Connecting → Streaming → Disconnecting → Stopped`
//!
//! Streaming 态下以固定周期读取所有主动臂位置，按映射表换键后
//! 构造遥测帧发出（非阻塞），同时消化回执事件更新网络统计。
//! Connecting 失败即关闭：任何设备连接错误都在进入 Streaming 前
//! 中止启动。

use crate::EngineError;
use crate::context::RuntimeContext;
use crate::mapping::MappingTable;
use crate::stats::{FollowerHealth, LeaderStatus, LoopState, RateTracker};
use arc_swap::ArcSwap;
use solink_bus::ActuatorBus;
use solink_protocol::wire::{
    ChannelPositions, DisconnectNotice, PositionPayload, TelemetryFrame, WireMessage,
};
use solink_transport::monitor::NetworkMonitor;
use solink_transport::time::now_unix;
use solink_transport::{Transport, TransportEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// 状态快照的最小刷新间隔
const SNAPSHOT_PERIOD: std::time::Duration = std::time::Duration::from_millis(100);

pub struct LeaderLoop<B: ActuatorBus, T: Transport> {
    buses: Vec<B>,
    transport: T,
    mapping: MappingTable,
    monitor: NetworkMonitor,
    ctx: RuntimeContext,
    sequence: u64,
    state: LoopState,
    publish_rate: RateTracker,
    followers: BTreeMap<String, FollowerHealth>,
    status: Arc<ArcSwap<LeaderStatus>>,
    switch_requested: Arc<AtomicBool>,
    last_snapshot: Option<Instant>,
}

impl<B: ActuatorBus, T: Transport> LeaderLoop<B, T> {
    pub fn new(buses: Vec<B>, transport: T, mapping: MappingTable, ctx: RuntimeContext) -> Self {
        let monitor = NetworkMonitor::new(ctx.teleop.ack_every);
        Self {
            buses,
            transport,
            mapping,
            monitor,
            ctx,
            sequence: 0,
            state: LoopState::Idle,
            publish_rate: RateTracker::new(),
            followers: BTreeMap::new(),
            status: Arc::new(ArcSwap::from_pointee(LeaderStatus::default())),
            switch_requested: Arc::new(AtomicBool::new(false)),
            last_snapshot: None,
        }
    }

    /// 显示线程读取的状态快照句柄
    pub fn status_handle(&self) -> Arc<ArcSwap<LeaderStatus>> {
        self.status.clone()
    }

    /// 运行时映射切换请求句柄（置 true 即在下一拍切换）
    pub fn switch_handle(&self) -> Arc<AtomicBool> {
        self.switch_requested.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn buses(&self) -> &[B] {
        &self.buses
    }

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    /// 运行到停机令牌触发为止
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.buses.is_empty() {
            return Err(EngineError::Config("no leader buses".to_string()));
        }

        self.state = LoopState::Connecting;
        for bus in &mut self.buses {
            if let Err(e) = bus.connect() {
                // 失败即关闭：不带着半截设备进入流式状态
                self.transport.close();
                self.state = LoopState::Stopped;
                return Err(e.into());
            }
        }

        self.state = LoopState::Streaming;
        info!(
            "Leader streaming: {} arms at {:.0} Hz",
            self.buses.len(),
            self.ctx.teleop.target_hz
        );

        let period = self.ctx.teleop.period();
        while !self.ctx.shutdown.is_requested() {
            let loop_start = Instant::now();

            if self.switch_requested.swap(false, Ordering::AcqRel) {
                self.mapping.switch();
            }

            self.publish_positions();
            self.drain_events();
            self.publish_snapshot();

            // 保持节拍：睡掉周期剩余部分
            let elapsed = loop_start.elapsed();
            if elapsed < period {
                spin_sleep::sleep(period - elapsed);
            }
        }

        self.shutdown();
        Ok(())
    }

    /// 读所有主动臂 → 换键 → 发帧
    fn publish_positions(&mut self) {
        let mut payload: BTreeMap<String, ChannelPositions> = BTreeMap::new();
        for bus in &mut self.buses {
            let positions = bus.read_positions();
            if positions.is_empty() {
                continue;
            }
            match self.mapping.resolve(bus.actuator_id()) {
                Some(follower_id) => {
                    let channels = positions
                        .iter()
                        .map(|(ch, tic)| (ch.to_string(), *tic))
                        .collect();
                    payload.insert(follower_id.to_string(), channels);
                }
                None => {
                    warn!("No mapping found for {}", bus.actuator_id());
                }
            }
        }

        if payload.is_empty() {
            return;
        }

        self.sequence += 1;
        let frame = TelemetryFrame::new(
            self.sequence,
            now_unix(),
            PositionPayload::PerFollower(payload),
        );
        match self.transport.send(&WireMessage::Telemetry(frame)) {
            Ok(()) => {
                self.monitor.record_sent(self.sequence);
                self.publish_rate.tick();
            }
            Err(e) => {
                warn!("Failed to publish telemetry frame {}: {}", self.sequence, e);
            }
        }
    }

    /// 消化带外事件（回执 / 从动状态）
    fn drain_events(&mut self) {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Ack(ack) => {
                    if let Some(latency) = self.monitor.record_acked(ack.sequence, ack.timestamp) {
                        if latency > self.ctx.teleop.latency_warning_ms {
                            warn!("High latency: {:.1}ms (seq {})", latency, ack.sequence);
                        }
                    }
                }
                TransportEvent::Status(status) => {
                    self.followers.insert(
                        status.sender_id.clone(),
                        FollowerHealth {
                            follower_id: status.sender_id,
                            last_seen: status.timestamp,
                            motors_active: status.motors_active,
                        },
                    );
                }
                TransportEvent::Disconnect(notice) => {
                    info!("Peer disconnected: {}", notice.sender_id);
                }
            }
        }
    }

    fn publish_snapshot(&mut self) {
        let due = self
            .last_snapshot
            .is_none_or(|t| t.elapsed() >= SNAPSHOT_PERIOD);
        if !due {
            return;
        }
        self.last_snapshot = Some(Instant::now());

        let stats = self.monitor.stats();
        if stats.packet_loss > self.ctx.teleop.packet_loss_warning && stats.sent > 0 {
            debug!("Packet loss {:.1}% above threshold", stats.packet_loss * 100.0);
        }

        self.status.store(Arc::new(LeaderStatus {
            state: self.state,
            mapping: self
                .mapping
                .iter()
                .map(|(l, f)| (l.to_string(), f.to_string()))
                .collect(),
            network: stats,
            publish_hz: self.publish_rate.rate_hz(),
            followers: self.followers.values().cloned().collect(),
        }));
    }

    /// 停机序列：退出通告 → 关传输 → 断开设备
    ///
    /// 任何一步失败都只告警，绝不阻止进程退出。
    fn shutdown(&mut self) {
        self.state = LoopState::Disconnecting;
        info!("Leader disconnecting...");

        let notice = WireMessage::Disconnect(DisconnectNotice {
            timestamp: now_unix(),
            sender_id: self.ctx.teleop.sender_id.clone(),
        });
        if let Err(e) = self.transport.send(&notice) {
            debug!("Disconnect notice not delivered: {}", e);
        }

        self.transport.close();
        for bus in &mut self.buses {
            if let Err(e) = bus.disconnect() {
                warn!("Failed to disconnect {}: {}", bus.actuator_id(), e);
            }
        }

        self.state = LoopState::Stopped;
        self.last_snapshot = None;
        self.publish_snapshot();
        info!("Leader shutdown complete");
    }
}
