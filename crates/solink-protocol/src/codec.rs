//! 位置编解码
//!
//! 两套独立的变换：
//!
//! 1. **标定单位变换**：原始 tic ↔ 弧度，围绕每通道的归零位置（home），
//!    支持按通道反转
//! 2. **符号-幅值寄存器编码**：仅用于 EEPROM 归零偏移寄存器，
//!    幅值溢出必须报错而不是回绕

use crate::ProtocolError;

/// 单通道标定参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCalibration {
    /// 归零位置（tic）
    pub home_tic: i32,
    /// 是否反转（反转时先对偏移取负再缩放）
    pub inverted: bool,
}

impl ChannelCalibration {
    /// 未标定时的默认值：home = resolution/2，不反转
    pub fn fallback(resolution: u32) -> Self {
        Self {
            home_tic: (resolution / 2) as i32,
            inverted: false,
        }
    }
}

/// 夹爪归一化命令的半行程（tic）
///
/// 以标定中心为原点，±1000 tic 映射到 [-1, 1]。
const GRIPPER_HALF_RANGE_TICS: f64 = 1000.0;

/// 位置编解码器（按设备分辨率参数化）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCodec {
    resolution: u32,
}

impl PositionCodec {
    pub fn new(resolution: u32) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// 每 tic 的弧度：2π / (resolution - 1)
    pub fn scale(&self) -> f64 {
        std::f64::consts::TAU / (self.resolution - 1) as f64
    }

    /// tic → 弧度
    ///
    /// `radians = (raw - home) * scale`，反转通道为 `(home - raw) * scale`。
    pub fn to_radians(&self, raw: i32, cal: &ChannelCalibration) -> f64 {
        let offset = if cal.inverted {
            cal.home_tic - raw
        } else {
            raw - cal.home_tic
        };
        offset as f64 * self.scale()
    }

    /// 弧度 → tic（截断取整）
    ///
    /// 与 [`to_radians`](Self::to_radians) 的往返误差 ≤ 1 tic。
    /// 结果钳位到 `[0, resolution-1]`。
    pub fn to_raw(&self, radians: f64, cal: &ChannelCalibration) -> i32 {
        let tics = (radians / self.scale()) as i64;
        let raw = if cal.inverted {
            cal.home_tic as i64 - tics
        } else {
            cal.home_tic as i64 + tics
        };
        raw.clamp(0, (self.resolution - 1) as i64) as i32
    }

    /// 写寄存器前的目标位置钳位
    pub fn clamp_goal(&self, raw: i32) -> i32 {
        raw.clamp(0, (self.resolution - 1) as i32)
    }

    /// 夹爪 tic → 归一化命令 [-1, 1]
    ///
    /// -1 = 全闭，0 = 标定中心，1 = 全开。
    pub fn gripper_command(&self, raw: i32, home_tic: i32) -> f64 {
        let cmd = (raw - home_tic) as f64 / GRIPPER_HALF_RANGE_TICS;
        cmd.clamp(-1.0, 1.0)
    }
}

/// 符号-幅值编码：`(direction_bit << sign_bit) | magnitude`
///
/// `direction_bit = 1` 当且仅当 `value < 0`。
/// 幅值超过 `(1 << sign_bit) - 1` 时返回
/// [`ProtocolError::EncodingRange`]，绝不回绕。
pub fn encode_sign_magnitude(value: i32, sign_bit: u32) -> Result<u16, ProtocolError> {
    let max = (1u32 << sign_bit) - 1;
    let magnitude = value.unsigned_abs();
    if magnitude > max {
        return Err(ProtocolError::EncodingRange {
            value,
            max: max as u16,
            sign_bit,
        });
    }
    let direction = if value < 0 { 1u32 << sign_bit } else { 0 };
    Ok((direction | magnitude) as u16)
}

/// 符号-幅值解码（[`encode_sign_magnitude`] 的精确逆）
pub fn decode_sign_magnitude(encoded: u16, sign_bit: u32) -> i32 {
    let magnitude = (encoded as u32 & ((1 << sign_bit) - 1)) as i32;
    if encoded as u32 & (1 << sign_bit) != 0 {
        -magnitude
    } else {
        magnitude
    }
}
