//! 夹爪堵转/限力
//!
//! 夹爪夹住物体后继续用位置控制驱动会把力越顶越大。
//! 这里维护一个最近力矩的滚动窗口：平均力矩超阈值且速度接近零时
//! 判定"堵转"，改为按几何模型换算的目标扭矩折算位置命令，外加
//! 固定摩擦补偿；命令转向张开或力矩回落后退出堵转态。

use crate::config::{GripperConfig, GripperGeometry};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// 堵转态下调整命令的混合系数
const ADJUST_BLEND: f64 = 0.1;

/// 夹爪单拍输入状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperState {
    /// 电机当前读数（弧度）
    pub current_pos: f64,
    /// 当前速度
    pub current_speed: f64,
    /// 当前力矩
    pub current_effort: f64,
    /// 当前开度（0 = 闭合，1 = 张开）
    pub current_normalized: f64,
    /// 目标开度
    pub target_normalized: f64,
    /// 目标位置（弧度）
    pub target_pos: f64,
    /// 上一拍实际下发的位置
    pub last_command_pos: f64,
}

/// 夹爪限力器
pub struct GripperForceLimiter {
    config: GripperConfig,
    is_clogged: bool,
    adjusted_pos: Option<f64>,
    /// (采样时刻, 力矩) 滚动窗口
    window: VecDeque<(Instant, f64)>,
}

impl GripperForceLimiter {
    pub fn new(config: GripperConfig) -> Self {
        Self {
            config,
            is_clogged: false,
            adjusted_pos: None,
            window: VecDeque::new(),
        }
    }

    pub fn is_clogged(&self) -> bool {
        self.is_clogged
    }

    /// 窗口内平均力矩的绝对值
    fn average_effort(&self, now: Instant) -> f64 {
        let horizon = std::time::Duration::from_secs_f64(self.config.effort_window_s);
        let mut sum = 0.0;
        let mut count = 0usize;
        for (ts, effort) in &self.window {
            if now.duration_since(*ts) <= horizon {
                sum += effort;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).abs()
        }
    }

    /// 几何模型：达到 max_force 所需的电机扭矩
    fn force_torque(&self, current_angle: f64) -> f64 {
        match self.config.geometry {
            GripperGeometry::CrankLinkage {
                close_angle,
                open_angle,
                stroke_m,
                reading_offset,
            } => {
                let angle = -current_angle + reading_offset;
                let crank_radius = stroke_m / (2.0 * (close_angle.cos() - open_angle.cos()));
                let grad_position = crank_radius * angle.sin();
                self.config.max_force * grad_position
            }
            GripperGeometry::LinearStroke {
                motor_stroke,
                gripper_stroke_m,
            } => self.config.max_force * gripper_stroke_m / motor_stroke,
        }
    }

    /// 处理一拍：返回实际应下发的位置命令
    pub fn update(&mut self, state: &GripperState) -> f64 {
        let now = Instant::now();
        let horizon = std::time::Duration::from_secs_f64(self.config.effort_window_s);
        while let Some((ts, _)) = self.window.front() {
            if now.duration_since(*ts) > horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }
        self.window.push_back((now, state.current_effort));

        let average_effort = self.average_effort(now);

        if self.is_clogged {
            // 命令转向张开，或力矩回落，退出堵转态
            if state.current_normalized < state.target_normalized
                || average_effort < self.config.unclog_effort_threshold
            {
                self.is_clogged = false;
                debug!("gripper unclogged (avg effort {:.3})", average_effort);
            }
        } else if average_effort > self.config.clog_force_threshold
            && state.current_speed.abs() < self.config.clog_speed_threshold
        {
            self.is_clogged = true;
            debug!(
                "gripper clogged (avg effort {:.3}, speed {:.3})",
                average_effort, state.current_speed
            );
        }

        if self.is_clogged {
            let target_eff =
                self.force_torque(state.current_pos) + self.config.friction_compensation;

            let command_sign = (state.target_pos - state.current_pos).signum();
            let zero_eff_pos =
                state.last_command_pos - command_sign * state.current_effort.abs() / self.config.kp;
            let target_raw = zero_eff_pos + command_sign * target_eff.abs() / self.config.kp;

            let base = self.adjusted_pos.unwrap_or(state.current_pos);
            let adjusted = (1.0 - ADJUST_BLEND) * base + ADJUST_BLEND * target_raw;
            self.adjusted_pos = Some(adjusted);
            adjusted
        } else {
            self.adjusted_pos = Some(state.current_pos);
            state.target_pos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closing_state(effort: f64) -> GripperState {
        GripperState {
            current_pos: 0.5,
            current_speed: 0.05,
            current_effort: effort,
            current_normalized: 0.5,
            target_normalized: 0.3, // 继续闭合
            target_pos: 0.8,
            last_command_pos: 0.78,
        }
    }

    #[test]
    fn test_light_effort_passes_target_through() {
        let mut limiter = GripperForceLimiter::new(GripperConfig::default());
        let state = closing_state(0.1);
        assert_eq!(limiter.update(&state), state.target_pos);
        assert!(!limiter.is_clogged());
    }

    #[test]
    fn test_sustained_effort_at_zero_speed_clogs() {
        let mut limiter = GripperForceLimiter::new(GripperConfig::default());
        let state = closing_state(0.8);
        let mut output = 0.0;
        for _ in 0..5 {
            output = limiter.update(&state);
        }
        assert!(limiter.is_clogged());
        // 堵转后不再透传原始目标
        assert_ne!(output, state.target_pos);
    }

    #[test]
    fn test_high_effort_while_moving_does_not_clog() {
        let mut limiter = GripperForceLimiter::new(GripperConfig::default());
        let mut state = closing_state(0.8);
        state.current_speed = 1.5; // 还在动，不算堵转
        for _ in 0..5 {
            limiter.update(&state);
        }
        assert!(!limiter.is_clogged());
    }

    #[test]
    fn test_opening_command_unclogs() {
        let mut limiter = GripperForceLimiter::new(GripperConfig::default());
        let state = closing_state(0.8);
        for _ in 0..5 {
            limiter.update(&state);
        }
        assert!(limiter.is_clogged());

        let mut opening = state;
        opening.target_normalized = 0.9; // 转向张开
        limiter.update(&opening);
        assert!(!limiter.is_clogged());
    }

    #[test]
    fn test_effort_drop_unclogs() {
        let mut limiter = GripperForceLimiter::new(GripperConfig::default());
        for _ in 0..5 {
            limiter.update(&closing_state(0.8));
        }
        assert!(limiter.is_clogged());

        // 力矩掉到退出阈值以下：窗口均值拉低后解除
        let mut released = false;
        for _ in 0..50 {
            limiter.update(&closing_state(0.0));
            if !limiter.is_clogged() {
                released = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(released);
    }

    #[test]
    fn test_linear_geometry_torque() {
        let config = GripperConfig {
            geometry: GripperGeometry::LinearStroke {
                motor_stroke: 6.57,
                gripper_stroke_m: 0.096,
            },
            ..Default::default()
        };
        let limiter = GripperForceLimiter::new(config);
        // 50 N * 0.096 m / 6.57 rad
        let torque = limiter.force_torque(0.0);
        assert!((torque - 0.7306).abs() < 0.001, "torque = {torque}");
    }

    #[test]
    fn test_crank_geometry_torque_varies_with_angle() {
        let limiter = GripperForceLimiter::new(GripperConfig::default());
        let t1 = limiter.force_torque(-1.0);
        let t2 = limiter.force_torque(-0.2);
        // 曲柄模型的力臂随角度变化
        assert_ne!(t1, t2);
        assert!(t1 > 0.0);
    }
}
