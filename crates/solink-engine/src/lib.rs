//! # Solink Engine
//!
//! 遥操作同步引擎：把主动臂的动作近实时地搬到从动臂上，
//! 链路可以慢、可以丢、可以断。
//!
//! 引擎的正确性约束：
//! - 绝不把过期或不安全的命令写到硬件
//! - 网络抖动/丢包不积累漂移（只认最新帧）
//! - 两个独立时钟的进程保持松同步
//!
//! ## 模块
//!
//! - `config`: 安全与环频配置
//! - `calibration`: 每设备标定记录的加载/保存
//! - `mapping`: 主动臂 → 从动臂映射表（支持运行时切换）
//! - `smoother`: 指数平滑 + 单步钳位
//! - `gripper`: 夹爪堵转/限力
//! - `governor`: 安全治理（新鲜度门 + 平滑 + 夹爪限力）
//! - `context`: 运行时上下文与协作式停机
//! - `leader` / `follower`: 两侧控制环状态机
//! - `stats`: 状态快照与速率统计

pub mod calibration;
pub mod config;
pub mod context;
pub mod follower;
pub mod governor;
pub mod gripper;
pub mod leader;
pub mod mapping;
pub mod smoother;
pub mod stats;

pub use calibration::{CalibrationRecord, CalibrationStore};
pub use config::{GripperConfig, GripperGeometry, SafetyConfig, TeleopConfig};
pub use context::{RuntimeContext, ShutdownToken};
pub use follower::FollowerLoop;
pub use governor::SafetyGovernor;
pub use gripper::{GripperForceLimiter, GripperState};
pub use leader::LeaderLoop;
pub use mapping::MappingTable;
pub use smoother::PositionSmoother;
pub use stats::{FollowerStatus, LeaderStatus, LoopState, RateTracker};

use solink_bus::BusError;
use solink_transport::TransportError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 总线错误（连接阶段致命，流式阶段按通道降级）
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 配置不自洽（如空设备列表）
    #[error("Invalid configuration: {0}")]
    Config(String),
}
