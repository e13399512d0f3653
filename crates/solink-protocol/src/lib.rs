//! # Solink Protocol
//!
//! 遥操作协议定义（无硬件、无网络依赖）
//!
//! ## 模块
//!
//! - `registers`: Feetech 舵机寄存器地址常量
//! - `codec`: 位置编解码（tic ↔ 弧度、符号-幅值编码）
//! - `wire`: 遥测线上消息定义（telemetry / ack / status）
//!
//! ## 约定
//!
//! - 原始位置值（tic）在消息里统一使用 `i32`，写寄存器前钳位到
//!   `[0, resolution-1]`
//! - 线上消息为 JSON，`type` 字段区分消息类型

pub mod codec;
pub mod registers;
pub mod wire;

// 重新导出常用类型
pub use codec::{ChannelCalibration, PositionCodec};
pub use registers::{ServoModel, DEFAULT_BAUD_RATE, HOMING_OFFSET_SIGN_BIT};
pub use wire::{AckFrame, DisconnectNotice, PositionPayload, StatusFrame, TelemetryFrame, WireMessage};

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 符号-幅值编码溢出（幅值超过符号位以下可表示范围）
    ///
    /// 这是单次写入级别的致命错误，绝不允许静默回绕。
    #[error("Sign-magnitude overflow: |{value}| exceeds {max} (sign bit {sign_bit})")]
    EncodingRange { value: i32, max: u16, sign_bit: u32 },

    /// 未知舵机型号
    #[error("Unknown servo model: {0}")]
    UnknownModel(String),
}

#[cfg(test)]
mod tests {
    use super::ProtocolError;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::EncodingRange {
            value: -3000,
            max: 2047,
            sign_bit: 11,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("-3000") && msg.contains("2047"));

        let err = ProtocolError::UnknownModel("sts9999".to_string());
        assert!(format!("{}", err).contains("sts9999"));
    }
}
