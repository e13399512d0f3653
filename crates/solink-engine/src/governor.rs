//! 安全治理
//!
//! 每个收到的帧在触达硬件前依次过三道独立的检查：
//!
//! 1. **新鲜度门**：帧龄超过延迟预算的整帧丢弃（不做部分应用），
//!    只计数，不当错误
//! 2. **指数平滑 + 单步钳位**：逐通道
//! 3. **夹爪堵转/限力**：仅夹爪通道，且仅当总线能提供力矩样本

use crate::calibration::CalibrationRecord;
use crate::config::SafetyConfig;
use crate::gripper::{GripperForceLimiter, GripperState};
use crate::smoother::PositionSmoother;
use solink_bus::{ChannelDynamics, Positions};
use solink_protocol::codec::PositionCodec;
use solink_transport::time::age_ms;
use tracing::debug;

/// 每从动设备一个治理器
pub struct SafetyGovernor {
    config: SafetyConfig,
    codec: PositionCodec,
    calibration: CalibrationRecord,
    smoother: PositionSmoother,
    limiter: GripperForceLimiter,
    last_gripper_command_rad: Option<f64>,
    stale_drops: u64,
    applied_frames: u64,
}

impl SafetyGovernor {
    pub fn new(config: SafetyConfig, codec: PositionCodec, calibration: CalibrationRecord) -> Self {
        let smoother = PositionSmoother::new(config.smoothing_factor, config.max_step_tics);
        let limiter = GripperForceLimiter::new(config.gripper.clone());
        Self {
            config,
            codec,
            calibration,
            smoother,
            limiter,
            last_gripper_command_rad: None,
            stale_drops: 0,
            applied_frames: 0,
        }
    }

    /// 丢弃的过期帧数
    pub fn stale_drops(&self) -> u64 {
        self.stale_drops
    }

    /// 通过治理并应用的帧数
    pub fn applied_frames(&self) -> u64 {
        self.applied_frames
    }

    pub fn gripper_clogged(&self) -> bool {
        self.limiter.is_clogged()
    }

    /// 第一道：新鲜度门
    ///
    /// 返回 `false` 表示整帧丢弃（已计数）。预期事件，只记 debug。
    pub fn admit(&mut self, frame_timestamp: f64) -> bool {
        let latency_ms = age_ms(frame_timestamp);
        if latency_ms > self.config.max_latency_ms {
            self.stale_drops += 1;
            debug!(
                "Rejecting stale frame: age {:.1}ms > budget {:.0}ms",
                latency_ms, self.config.max_latency_ms
            );
            return false;
        }
        true
    }

    /// 第二、三道：平滑 + 钳位，夹爪通道附加限力
    ///
    /// 输入为该设备的目标位置表；返回实际应下发的位置表。
    pub fn govern(
        &mut self,
        targets: &Positions,
        gripper_dynamics: Option<&ChannelDynamics>,
    ) -> Positions {
        let mut governed = Positions::new();
        for (&channel, &target) in targets {
            let mut value = self.smoother.smooth(channel, target);
            if channel == self.config.gripper.channel {
                if let Some(dynamics) = gripper_dynamics {
                    value = self.govern_gripper(value, dynamics);
                }
            }
            governed.insert(channel, self.codec.clamp_goal(value));
        }
        self.applied_frames += 1;
        governed
    }

    /// 夹爪通道：tic 域 → 弧度域过限力器，再回 tic 域
    fn govern_gripper(&mut self, smoothed_target: i32, dynamics: &ChannelDynamics) -> i32 {
        let cal = self.calibration.channel(self.config.gripper.channel);
        let current_rad = self.codec.to_radians(dynamics.position, &cal);
        let target_rad = self.codec.to_radians(smoothed_target, &cal);

        // 开度 0..1（gripper_command 给 -1..1）
        let current_normalized =
            (self.codec.gripper_command(dynamics.position, cal.home_tic) + 1.0) / 2.0;
        let target_normalized =
            (self.codec.gripper_command(smoothed_target, cal.home_tic) + 1.0) / 2.0;

        let state = GripperState {
            current_pos: current_rad,
            // tic/s → rad/s
            current_speed: dynamics.speed * self.codec.scale(),
            current_effort: dynamics.effort,
            current_normalized,
            target_normalized,
            target_pos: target_rad,
            last_command_pos: self.last_gripper_command_rad.unwrap_or(current_rad),
        };

        let command_rad = self.limiter.update(&state);
        self.last_gripper_command_rad = Some(command_rad);
        self.codec.to_raw(command_rad, &cal)
    }
}
