//! 安全与环频配置

use serde::{Deserialize, Serialize};

/// 夹爪力→扭矩几何模型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GripperGeometry {
    /// 零连杆曲柄（YAM 紧凑型夹爪）
    CrankLinkage {
        /// 闭合位曲柄角（弧度）
        close_angle: f64,
        /// 张开位曲柄角（弧度）
        open_angle: f64,
        /// 直线行程（米）
        stroke_m: f64,
        /// 电机读数 → 曲柄角：`angle = -reading + offset`
        reading_offset: f64,
    },
    /// 线性行程（丝杆/齿条式）
    LinearStroke {
        /// 电机行程（弧度）
        motor_stroke: f64,
        /// 夹爪行程（米）
        gripper_stroke_m: f64,
    },
}

impl Default for GripperGeometry {
    fn default() -> Self {
        // YAM 紧凑型参数：闭合 8°，张开 170°，行程 71mm
        GripperGeometry::CrankLinkage {
            close_angle: 8.0_f64.to_radians(),
            open_angle: 170.0_f64.to_radians(),
            stroke_m: 0.071,
            reading_offset: 0.174,
        }
    }
}

/// 夹爪堵转/限力配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GripperConfig {
    /// 保留的夹爪通道 id
    pub channel: u8,

    /// 最大夹持力（牛顿）
    pub max_force: f64,

    /// 进入堵转态的平均力矩阈值
    pub clog_force_threshold: f64,

    /// 进入堵转态的速度上限（低于此速度且力矩超阈值才算堵转）
    pub clog_speed_threshold: f64,

    /// 退出堵转态的力矩下限
    pub unclog_effort_threshold: f64,

    /// 力矩滚动窗口（秒）
    pub effort_window_s: f64,

    /// 摩擦补偿偏置（加在目标扭矩上）
    pub friction_compensation: f64,

    /// 位置环刚度（扭矩 ↔ 位置偏差换算）
    pub kp: f64,

    /// 力→扭矩几何模型
    pub geometry: GripperGeometry,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            channel: 7,
            max_force: 50.0,
            clog_force_threshold: 0.5,
            clog_speed_threshold: 0.2,
            unclog_effort_threshold: 0.2,
            effort_window_s: 0.1,
            friction_compensation: 0.3,
            kp: 20.0,
            geometry: GripperGeometry::default(),
        }
    }
}

/// 安全治理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// 新鲜度预算（毫秒）：超龄帧整帧丢弃
    pub max_latency_ms: f64,

    /// 指数平滑系数（0-1，越大越偏向旧值）
    pub smoothing_factor: f64,

    /// 单步最大位置变化（tic）
    pub max_step_tics: i32,

    /// 夹爪限力配置
    pub gripper: GripperConfig,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 200.0,
            smoothing_factor: 0.8,
            max_step_tics: 200,
            gripper: GripperConfig::default(),
        }
    }
}

/// 控制环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleopConfig {
    /// 目标更新频率（Hz）
    pub target_hz: f64,

    /// 每 N 帧要求一次回执
    pub ack_every: u64,

    /// 延迟告警阈值（毫秒）
    pub latency_warning_ms: f64,

    /// 丢包率告警阈值
    pub packet_loss_warning: f64,

    /// 从动侧状态广播周期（秒）
    pub status_period_s: f64,

    /// 本端标识（进回执/状态消息）
    pub sender_id: String,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            target_hz: 60.0,
            ack_every: 5,
            latency_warning_ms: 100.0,
            packet_loss_warning: 0.05,
            status_period_s: 2.0,
            sender_id: "solink".to_string(),
        }
    }
}

impl TeleopConfig {
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.target_hz.max(1.0))
    }
}
