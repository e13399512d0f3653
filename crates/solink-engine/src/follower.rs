//! 从动侧控制环
//!
//! 轮询传输层的最新帧 → 新鲜度门 → 按映射路由到设备 → 安全治理
//! → 写硬件。停机序列必须先对每个从动通道关扭矩，再关传输和设备
//! 句柄——跳过这一步会让电机带着任意驱动状态继续通电。

use crate::EngineError;
use crate::calibration::CalibrationRecord;
use crate::context::RuntimeContext;
use crate::governor::SafetyGovernor;
use crate::mapping::MappingTable;
use crate::stats::{FollowerStatus, LoopState, RateTracker};
use arc_swap::ArcSwap;
use solink_bus::{ActuatorBus, Positions};
use solink_protocol::codec::PositionCodec;
use solink_protocol::wire::{
    AckFrame, ChannelPositions, PositionPayload, StatusFrame, TelemetryFrame, WireMessage,
};
use solink_transport::time::{age_ms, now_unix};
use solink_transport::{Transport, TransportEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 空轮询间隔（避免空转烧 CPU）
const POLL_SLEEP: Duration = Duration::from_millis(1);

/// 状态快照的最小刷新间隔
const SNAPSHOT_PERIOD: Duration = Duration::from_millis(100);

pub struct FollowerLoop<B: ActuatorBus, T: Transport> {
    buses: Vec<B>,
    /// 与 buses 同序的治理器
    governors: Vec<SafetyGovernor>,
    transport: T,
    mapping: MappingTable,
    ctx: RuntimeContext,
    state: LoopState,
    update_rate: RateTracker,
    last_latency_ms: f64,
    status: Arc<ArcSwap<FollowerStatus>>,
    last_status_broadcast: Option<Instant>,
    last_snapshot: Option<Instant>,
}

impl<B: ActuatorBus, T: Transport> FollowerLoop<B, T> {
    /// 每台从动设备配一份标定记录（用于夹爪弧度换算）
    pub fn new(
        devices: Vec<(B, CalibrationRecord)>,
        transport: T,
        mapping: MappingTable,
        ctx: RuntimeContext,
    ) -> Self {
        let mut buses = Vec::with_capacity(devices.len());
        let mut governors = Vec::with_capacity(devices.len());
        for (bus, calibration) in devices {
            let codec = PositionCodec::new(bus.resolution());
            governors.push(SafetyGovernor::new(ctx.safety.clone(), codec, calibration));
            buses.push(bus);
        }
        Self {
            buses,
            governors,
            transport,
            mapping,
            ctx,
            state: LoopState::Idle,
            update_rate: RateTracker::new(),
            last_latency_ms: 0.0,
            status: Arc::new(ArcSwap::from_pointee(FollowerStatus::default())),
            last_status_broadcast: None,
            last_snapshot: None,
        }
    }

    pub fn status_handle(&self) -> Arc<ArcSwap<FollowerStatus>> {
        self.status.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn buses(&self) -> &[B] {
        &self.buses
    }

    /// 运行到停机令牌触发为止
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.buses.is_empty() {
            return Err(EngineError::Config("no follower buses".to_string()));
        }

        self.state = LoopState::Connecting;
        for bus in &mut self.buses {
            if let Err(e) = bus.connect() {
                self.transport.close();
                self.state = LoopState::Stopped;
                return Err(e.into());
            }
        }
        for bus in &mut self.buses {
            bus.enable_torque();
        }

        self.state = LoopState::Streaming;
        info!("Follower streaming: {} arms", self.buses.len());

        while !self.ctx.shutdown.is_requested() {
            if let Some(frame) = self.transport.receive_latest() {
                self.apply_frame(&frame);
            }
            self.drain_events();
            self.broadcast_status();
            self.publish_snapshot();
            std::thread::sleep(POLL_SLEEP);
        }

        self.shutdown();
        Ok(())
    }

    /// 新鲜度门 → 回执 → 路由 → 治理 → 写硬件
    fn apply_frame(&mut self, frame: &TelemetryFrame) {
        // 每台设备的治理器独立把关（计数也按设备）
        let mut fresh = false;
        for governor in &mut self.governors {
            fresh = governor.admit(frame.timestamp);
        }
        if !fresh {
            return;
        }

        self.last_latency_ms = age_ms(frame.timestamp);

        // 只按配置的节奏回执，约束回执流量
        if self.ctx.teleop.ack_every > 0 && frame.sequence % self.ctx.teleop.ack_every == 0 {
            let ack = WireMessage::Ack(AckFrame {
                sequence: frame.sequence,
                timestamp: frame.timestamp,
                sender_id: self.ctx.teleop.sender_id.clone(),
            });
            if let Err(e) = self.transport.send(&ack) {
                debug!("Ack for seq {} not delivered: {}", frame.sequence, e);
            }
        }

        let gripper_channel = self.ctx.safety.gripper.channel;
        let mut any_applied = false;
        for (bus, governor) in self.buses.iter_mut().zip(self.governors.iter_mut()) {
            let Some(channels) = route_for(frame, &self.mapping, bus.actuator_id()) else {
                continue;
            };
            let targets = parse_channels(channels);
            if targets.is_empty() {
                continue;
            }

            let dynamics = if targets.contains_key(&gripper_channel) {
                bus.read_dynamics(gripper_channel)
            } else {
                None
            };

            let governed = governor.govern(&targets, dynamics.as_ref());
            bus.write_positions(&governed);
            any_applied = true;
        }

        if any_applied {
            self.update_rate.tick();
        }
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.transport.poll_event() {
            match event {
                TransportEvent::Disconnect(notice) => {
                    info!("Leader disconnected: {}", notice.sender_id);
                }
                // 从动侧不消费回执/状态
                TransportEvent::Ack(_) | TransportEvent::Status(_) => {}
            }
        }
    }

    /// 周期状态广播（≈0.5 Hz，默认 2s 周期）
    fn broadcast_status(&mut self) {
        let period = Duration::from_secs_f64(self.ctx.teleop.status_period_s.max(0.1));
        let due = self.last_status_broadcast.is_none_or(|t| t.elapsed() >= period);
        if !due {
            return;
        }
        self.last_status_broadcast = Some(Instant::now());

        let motors_active = self.buses.iter().map(|b| b.channel_ids().len() as u32).sum();
        let status = WireMessage::Status(StatusFrame {
            timestamp: now_unix(),
            sender_id: self.ctx.teleop.sender_id.clone(),
            motors_active,
            followers_connected: self.buses.len() as u32,
        });
        if let Err(e) = self.transport.send(&status) {
            debug!("Status broadcast not delivered: {}", e);
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

        self.status.store(Arc::new(FollowerStatus {
            state: self.state,
            link: self.transport.link_stats(),
            update_hz: self.update_rate.rate_hz(),
            stale_drops: self.governors.iter().map(|g| g.stale_drops()).sum(),
            applied_frames: self.governors.iter().map(|g| g.applied_frames()).sum(),
            last_latency_ms: self.last_latency_ms,
            gripper_clogged: self.governors.iter().any(|g| g.gripper_clogged()),
        }));
    }

    /// 停机序列：关扭矩 → 关传输 → 断开设备
    ///
    /// 关扭矩必须先行；每一步失败都只告警，绝不阻止退出。
    fn shutdown(&mut self) {
        self.state = LoopState::Disconnecting;
        info!("Follower disconnecting...");

        for bus in &mut self.buses {
            bus.disable_torque();
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
        info!("Follower shutdown complete");
    }
}

/// 帧内通道表路由
///
/// 优先按从动臂 id 取；旧部署的帧可能按主动臂 id 键控，
/// 用映射表翻译一次。
fn route_for<'a>(
    frame: &'a TelemetryFrame,
    mapping: &MappingTable,
    follower_id: &str,
) -> Option<&'a ChannelPositions> {
    if let Some(channels) = frame.positions.for_follower(follower_id) {
        return Some(channels);
    }
    if let PositionPayload::PerFollower(map) = &frame.positions {
        for (leader_id, mapped_follower) in mapping.iter() {
            if mapped_follower == follower_id {
                return map.get(leader_id);
            }
        }
    }
    None
}

/// 字符串通道键 → u8；坏键告警并跳过
fn parse_channels(channels: &ChannelPositions) -> Positions {
    let mut positions = Positions::new();
    for (key, &tic) in channels {
        match key.parse::<u8>() {
            Ok(channel) => {
                positions.insert(channel, tic);
            }
            Err(_) => {
                warn!("Ignoring non-numeric channel id '{}'", key);
            }
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use solink_bus::MockBus;
    use std::collections::BTreeMap;

    fn frame_for(follower_id: &str, pairs: &[(&str, i32)]) -> TelemetryFrame {
        let channels: ChannelPositions =
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let mut map = BTreeMap::new();
        map.insert(follower_id.to_string(), channels);
        TelemetryFrame::new(1, now_unix(), PositionPayload::PerFollower(map))
    }

    #[test]
    fn test_route_by_follower_id() {
        let frame = frame_for("Follower1", &[("1", 100)]);
        let mapping = MappingTable::new();
        assert!(route_for(&frame, &mapping, "Follower1").is_some());
        assert!(route_for(&frame, &mapping, "Follower2").is_none());
    }

    #[test]
    fn test_route_translates_leader_keys() {
        // 旧部署：帧按主动臂 id 键控
        let frame = frame_for("Leader1", &[("1", 100)]);
        let mut mapping = MappingTable::new();
        mapping.assign("Leader1", "Follower1");
        let channels = route_for(&frame, &mapping, "Follower1").unwrap();
        assert_eq!(channels["1"], 100);
    }

    #[test]
    fn test_flat_payload_routes_to_any_follower() {
        let channels: ChannelPositions = [("1".to_string(), 42)].into_iter().collect();
        let frame = TelemetryFrame::new(1, now_unix(), PositionPayload::Flat(channels));
        let mapping = MappingTable::new();
        assert!(route_for(&frame, &mapping, "whatever").is_some());
    }

    #[test]
    fn test_parse_channels_skips_bad_keys() {
        let channels: ChannelPositions = [
            ("1".to_string(), 100),
            ("gripper".to_string(), 200),
            ("7".to_string(), 300),
        ]
        .into_iter()
        .collect();
        let positions = parse_channels(&channels);
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[&1], 100);
        assert_eq!(positions[&7], 300);
    }

    #[test]
    fn test_connect_failure_aborts() {
        let (transport, _peer) = solink_transport::loopback::loopback_pair();
        let mut bus = MockBus::new("Follower1", &[1]);
        bus.fail_connect();
        let calibration = CalibrationRecord::fallback(&[1], 4096);

        let mut follower = FollowerLoop::new(
            vec![(bus, calibration)],
            transport,
            MappingTable::new(),
            RuntimeContext::default(),
        );
        assert!(matches!(follower.run(), Err(EngineError::Bus(_))));
        assert_eq!(follower.state(), LoopState::Stopped);
    }
}
