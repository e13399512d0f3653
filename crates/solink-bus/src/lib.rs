//! # Solink Actuator Bus Layer
//!
//! 执行器总线硬件抽象层，提供统一的舵机总线接口。
//!
//! 控制环是唯一允许触碰总线句柄的线程——底层串口/CAN 句柄
//! 跨线程共享并不安全，所以 trait 方法统一使用 `&mut self`。

use std::collections::BTreeMap;
use thiserror::Error;

pub mod homing;
pub mod role;

#[cfg(feature = "serial")]
pub mod discovery;

#[cfg(feature = "serial")]
pub mod feetech;

#[cfg(feature = "serial")]
pub use feetech::FeetechBus;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockBus;

pub use role::{ActuatorProfile, Role, RolePolicy};

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 端口打开 / 波特率设置失败——启动期致命，由操作员重试
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Device Error: {0}")]
    Device(#[from] BusDeviceError),

    /// 单通道读写失败——记录日志并跳过该通道，绝不中断控制环
    #[error("Channel {channel} communication failure: {message}")]
    Comm { channel: u8, message: String },

    /// 电压寄存器读取失败
    ///
    /// 向上传播到角色识别；调用方不得在出错时猜测角色。
    #[error("Voltage read failed: {0}")]
    VoltageRead(String),

    /// 符号-幅值编码溢出——该次写入致命，绝不静默回绕
    #[error("Encoding error: {0}")]
    Encoding(#[from] solink_protocol::ProtocolError),

    #[error("Read timeout")]
    Timeout,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidResponse,
    ChecksumMismatch,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct BusDeviceError {
    pub kind: BusDeviceErrorKind,
    pub message: String,
}

impl BusDeviceError {
    pub fn new(kind: BusDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            BusDeviceErrorKind::NoDevice
                | BusDeviceErrorKind::AccessDenied
                | BusDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for BusDeviceError {
    fn from(message: String) -> Self {
        Self::new(BusDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for BusDeviceError {
    fn from(message: &str) -> Self {
        Self::new(BusDeviceErrorKind::Unknown, message)
    }
}

/// 通道 id → 原始位置（tic）
pub type Positions = BTreeMap<u8, i32>;

/// 单通道动力学样本（夹爪限力使用）
///
/// 单位为总线原生单位：位置 tic、速度 tic/s、
/// 力矩为堵转扭矩的归一化比例。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelDynamics {
    pub position: i32,
    pub speed: f64,
    pub effort: f64,
}

/// 执行器总线统一抽象
///
/// 变体：Feetech 串口总线（[`FeetechBus`]）、测试用内存总线
/// （[`MockBus`]）。遥操作环逻辑只写一次，针对本 trait。
pub trait ActuatorBus {
    /// 执行器身份（如 "Leader1" / "Follower2"）
    fn actuator_id(&self) -> &str;

    /// 通道 id 列表（1..N，含保留的夹爪通道）
    fn channel_ids(&self) -> &[u8];

    /// 编码器分辨率
    fn resolution(&self) -> u32;

    /// 连接并验证所有通道可达（逐一 ping），失败即关闭
    fn connect(&mut self) -> Result<(), BusError>;

    /// 断开总线（断开前调用方应先关扭矩）
    fn disconnect(&mut self) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;

    /// 读取所有通道当前位置
    ///
    /// 单通道失败只告警并从结果中省略，不中断。
    fn read_positions(&mut self) -> Positions;

    /// 写入目标位置（写前钳位到 `[0, resolution-1]`）
    ///
    /// 单通道失败只告警，不中断。
    fn write_positions(&mut self, positions: &Positions);

    /// 读取供电电压（第一个通道的电压寄存器 / 10）
    fn read_voltage(&mut self) -> Result<f32, BusError>;

    /// 开扭矩 + 锁 EEPROM（Lock=1）
    fn enable_torque(&mut self);

    /// 关扭矩 + 解锁 EEPROM（Lock=0）
    ///
    /// 停机路径调用：失败告警但不阻止退出。
    fn disable_torque(&mut self);

    /// 读单通道动力学样本（位置/速度/力矩）
    ///
    /// 后端不支持时返回 `None`，上层跳过依赖力矩的治理阶段。
    fn read_dynamics(&mut self, _channel: u8) -> Option<ChannelDynamics> {
        None
    }

    /// 单寄存器读写（标定流程使用）
    fn read_u8(&mut self, channel: u8, reg: u8) -> Result<u8, BusError>;
    fn read_u16(&mut self, channel: u8, reg: u8) -> Result<u16, BusError>;
    fn write_u8(&mut self, channel: u8, reg: u8, value: u8) -> Result<(), BusError>;
    fn write_u16(&mut self, channel: u8, reg: u8, value: u16) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_device_error_fatal_classification() {
        let fatal = BusDeviceError::new(BusDeviceErrorKind::NoDevice, "gone");
        assert!(fatal.is_fatal());

        let transient = BusDeviceError::new(BusDeviceErrorKind::ChecksumMismatch, "bad sum");
        assert!(!transient.is_fatal());
    }

    #[test]
    fn test_bus_error_display() {
        let err = BusError::Comm {
            channel: 3,
            message: "no response".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Channel 3"));

        let err = BusError::VoltageRead("timeout".to_string());
        assert!(format!("{}", err).contains("Voltage read failed"));
    }

    #[test]
    fn test_bus_device_error_from_str() {
        let err: BusDeviceError = "boom".into();
        assert_eq!(err.kind, BusDeviceErrorKind::Unknown);
    }
}
