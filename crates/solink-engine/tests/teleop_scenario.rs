//! 端到端遥操作场景（回环传输，无硬件）
//!
//! 主动环读 Mock 总线 → 回环传输 → 从动环治理后写 Mock 总线，
//! 覆盖：冷启动直通、回执/丢包统计、过期帧拒绝、停机关扭矩。

use solink_bus::MockBus;
use solink_engine::config::{SafetyConfig, TeleopConfig};
use solink_engine::{CalibrationRecord, FollowerLoop, LeaderLoop, MappingTable, RuntimeContext};
use solink_protocol::wire::{ChannelPositions, PositionPayload, TelemetryFrame, WireMessage};
use solink_transport::loopback::loopback_pair;
use solink_transport::time::now_unix;
use solink_transport::Transport;
use std::time::Duration;

const ARM_CHANNELS: [u8; 7] = [1, 2, 3, 4, 5, 6, 7];

fn leader_context() -> RuntimeContext {
    RuntimeContext::new(
        TeleopConfig {
            target_hz: 100.0,
            sender_id: "leader-test".to_string(),
            ..Default::default()
        },
        SafetyConfig::default(),
    )
}

fn follower_context() -> RuntimeContext {
    RuntimeContext::new(
        TeleopConfig {
            sender_id: "follower-test".to_string(),
            status_period_s: 0.1,
            ..Default::default()
        },
        SafetyConfig::default(),
    )
}

#[test]
fn teleop_round_trip_over_loopback() {
    let (leader_transport, follower_transport) = loopback_pair();

    let mut leader_bus = MockBus::new("Leader1", &ARM_CHANNELS);
    for ch in ARM_CHANNELS {
        leader_bus.set_position(ch, 2048);
    }
    let follower_bus = MockBus::new("Follower1", &ARM_CHANNELS);

    let mut mapping = MappingTable::new();
    mapping.assign("Leader1", "Follower1");

    let leader_ctx = leader_context();
    let follower_ctx = follower_context();
    let leader_shutdown = leader_ctx.shutdown.clone();
    let follower_shutdown = follower_ctx.shutdown.clone();

    let mut leader = LeaderLoop::new(
        vec![leader_bus],
        leader_transport,
        mapping.clone(),
        leader_ctx,
    );
    let leader_status = leader.status_handle();

    let calibration = CalibrationRecord::fallback(&ARM_CHANNELS, 4096);
    let mut follower = FollowerLoop::new(
        vec![(follower_bus, calibration)],
        follower_transport,
        mapping,
        follower_ctx,
    );
    let follower_status = follower.status_handle();

    let leader_handle = std::thread::spawn(move || {
        leader.run().unwrap();
        leader
    });
    let follower_handle = std::thread::spawn(move || {
        follower.run().unwrap();
        follower
    });

    std::thread::sleep(Duration::from_millis(500));
    leader_shutdown.request();
    follower_shutdown.request();
    let _leader = leader_handle.join().unwrap();
    let follower = follower_handle.join().unwrap();

    // 从动臂到达主动臂的姿态（恒定目标 + 冷启动直通 ⇒ 全程 2048）
    let bus = &follower.buses()[0];
    assert!(!bus.goal_log().is_empty(), "follower never wrote hardware");
    assert_eq!(bus.last_goal(1), Some(2048));
    assert_eq!(bus.last_goal(7), Some(2048));

    // 停机序列先关扭矩
    assert!(!bus.torque_enabled(1));
    assert!(!bus.torque_enabled(7));

    // 主动侧网络统计：发过帧、收过回执
    let leader_snapshot = leader_status.load();
    assert!(leader_snapshot.network.sent >= 5, "sent = {}", leader_snapshot.network.sent);
    assert!(leader_snapshot.network.acked >= 1, "acked = {}", leader_snapshot.network.acked);
    // 回环无丢包：统计不应虚报
    assert!(leader_snapshot.network.packet_loss < 0.5);

    // 主动侧看到了从动状态广播
    assert!(!leader_snapshot.followers.is_empty());
    assert_eq!(leader_snapshot.followers[0].motors_active, 7);

    // 从动侧：应用过帧、没有过期拒绝
    let follower_snapshot = follower_status.load();
    assert!(follower_snapshot.applied_frames >= 1);
    assert_eq!(follower_snapshot.stale_drops, 0);
    assert!(follower_snapshot.last_latency_ms < 200.0);
}

#[test]
fn stale_frames_never_reach_hardware() {
    let (mut injector, follower_transport) = loopback_pair();

    let follower_bus = MockBus::new("Follower1", &ARM_CHANNELS);
    let calibration = CalibrationRecord::fallback(&ARM_CHANNELS, 4096);

    let ctx = follower_context();
    let shutdown = ctx.shutdown.clone();
    let mut follower = FollowerLoop::new(
        vec![(follower_bus, calibration)],
        follower_transport,
        MappingTable::new(),
        ctx,
    );
    let status = follower.status_handle();

    let handle = std::thread::spawn(move || {
        follower.run().unwrap();
        follower
    });

    // 只注入过期帧（0.3s 前，预算 200ms）
    let mut channels = ChannelPositions::new();
    channels.insert("1".to_string(), 1234);
    for seq in 1..=5u64 {
        let frame = TelemetryFrame::new(seq, now_unix() - 0.3, PositionPayload::Flat(channels.clone()));
        injector.send(&WireMessage::Telemetry(frame)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    std::thread::sleep(Duration::from_millis(100));
    shutdown.request();
    let follower = handle.join().unwrap();

    // 过期帧整帧丢弃：硬件从未被写
    assert!(follower.buses()[0].goal_log().is_empty());
    let snapshot = status.load();
    assert!(snapshot.stale_drops >= 1, "stale_drops = {}", snapshot.stale_drops);
    assert_eq!(snapshot.applied_frames, 0);
}

#[test]
fn fresh_frame_converges_with_step_clamp() {
    let (mut injector, follower_transport) = loopback_pair();

    let follower_bus = MockBus::new("Follower1", &ARM_CHANNELS);
    let calibration = CalibrationRecord::fallback(&ARM_CHANNELS, 4096);

    let ctx = follower_context();
    let shutdown = ctx.shutdown.clone();
    let mut follower = FollowerLoop::new(
        vec![(follower_bus, calibration)],
        follower_transport,
        MappingTable::new(),
        ctx,
    );

    let handle = std::thread::spawn(move || {
        follower.run().unwrap();
        follower
    });

    // 第一帧 2000（冷启动直通），随后恒定 2048
    let send = |injector: &mut solink_transport::LoopbackTransport, seq: u64, tic: i32| {
        let mut channels = ChannelPositions::new();
        channels.insert("1".to_string(), tic);
        injector
            .send(&WireMessage::Telemetry(TelemetryFrame::new(
                seq,
                now_unix(),
                PositionPayload::Flat(channels),
            )))
            .unwrap();
    };

    send(&mut injector, 1, 2000);
    std::thread::sleep(Duration::from_millis(30));
    for seq in 2..=40u64 {
        send(&mut injector, seq, 2048);
        std::thread::sleep(Duration::from_millis(10));
    }

    shutdown.request();
    let follower = handle.join().unwrap();
    let log = follower.buses()[0].goal_log();
    assert!(!log.is_empty());

    // 冷启动：第一次写等于原始目标
    assert_eq!(log[0], (1, 2000));

    // 之后单调逼近 2048，单步不超过钳位
    let mut previous = 2000;
    for &(_, tic) in &log[1..] {
        assert!(tic >= previous, "output regressed: {tic} < {previous}");
        assert!((tic - previous) <= 200, "step clamp violated");
        previous = tic;
    }
    // 整数截断允许在目标下方几个 tic 处收敛
    assert!((2048 - previous) <= 4, "did not converge: {previous}");
}
