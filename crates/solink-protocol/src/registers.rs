//! Feetech STS/SCS 系列舵机寄存器地址常量
//!
//! 地址必须与目标舵机家族完全一致（STS3215，SO-101 臂）。
//! 字节序：多字节寄存器为小端。

/// 最小位置限制（2 字节）
pub const REG_MIN_POSITION_LIMIT: u8 = 9;

/// 最大位置限制（2 字节）
pub const REG_MAX_POSITION_LIMIT: u8 = 11;

/// Phase / Setting byte（标定时写 76）
pub const REG_PHASE: u8 = 18;

/// 归零偏移（2 字节，bit 11 为符号位）
pub const REG_HOMING_OFFSET: u8 = 31;

/// 工作模式（0 = 位置模式）
pub const REG_OPERATING_MODE: u8 = 33;

/// 扭矩使能（0 = 关闭，1 = 开启）
pub const REG_TORQUE_ENABLE: u8 = 40;

/// 目标位置（2 字节）
pub const REG_GOAL_POSITION: u8 = 42;

/// EEPROM 锁（0 = 解锁，1 = 锁定）
pub const REG_LOCK: u8 = 55;

/// 当前位置（2 字节）
pub const REG_PRESENT_POSITION: u8 = 56;

/// 当前速度（2 字节，bit 15 为符号位，单位 tic/s）
pub const REG_PRESENT_SPEED: u8 = 58;

/// 当前负载（2 字节，bit 10 为符号位，单位 0.1% 堵转扭矩）
pub const REG_PRESENT_LOAD: u8 = 60;

/// 当前电压（单位 0.1V）
pub const REG_PRESENT_VOLTAGE: u8 = 62;

/// 速度寄存器的符号位位置
pub const PRESENT_SPEED_SIGN_BIT: u32 = 15;

/// 负载寄存器的符号位位置
pub const PRESENT_LOAD_SIGN_BIT: u32 = 10;

/// 归零偏移寄存器的符号位位置
pub const HOMING_OFFSET_SIGN_BIT: u32 = 11;

/// 标定流程中写入 Phase 寄存器的值
pub const PHASE_CALIBRATION_VALUE: u8 = 76;

/// 位置模式
pub const OPERATING_MODE_POSITION: u8 = 0;

/// 默认串口波特率
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// 舵机型号（决定编码器分辨率）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServoModel {
    /// STS3215（SO-101 标配，4096 分辨率）
    #[default]
    Sts3215,
    /// STS3250
    Sts3250,
    /// SCS0009（1024 分辨率）
    Scs0009,
    /// SM8512BL（65536 分辨率）
    Sm8512bl,
}

impl ServoModel {
    /// 编码器分辨率（寄存器值范围为 `[0, resolution-1]`）
    pub fn resolution(&self) -> u32 {
        match self {
            ServoModel::Sts3215 | ServoModel::Sts3250 => 4096,
            ServoModel::Scs0009 => 1024,
            ServoModel::Sm8512bl => 65536,
        }
    }

    /// 从配置字符串解析
    pub fn parse(s: &str) -> Result<Self, crate::ProtocolError> {
        match s {
            "sts3215" => Ok(ServoModel::Sts3215),
            "sts3250" => Ok(ServoModel::Sts3250),
            "scs0009" => Ok(ServoModel::Scs0009),
            "sm8512bl" => Ok(ServoModel::Sm8512bl),
            other => Err(crate::ProtocolError::UnknownModel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_addresses() {
        // 地址表必须与 STS3215 保持一致，这里固化防止手滑
        assert_eq!(REG_TORQUE_ENABLE, 40);
        assert_eq!(REG_GOAL_POSITION, 42);
        assert_eq!(REG_PRESENT_POSITION, 56);
        assert_eq!(REG_PRESENT_VOLTAGE, 62);
        assert_eq!(REG_LOCK, 55);
        assert_eq!(REG_HOMING_OFFSET, 31);
        assert_eq!(REG_PHASE, 18);
        assert_eq!(REG_OPERATING_MODE, 33);
    }

    #[test]
    fn test_servo_model_resolution() {
        assert_eq!(ServoModel::Sts3215.resolution(), 4096);
        assert_eq!(ServoModel::Sts3250.resolution(), 4096);
        assert_eq!(ServoModel::Scs0009.resolution(), 1024);
        assert_eq!(ServoModel::Sm8512bl.resolution(), 65536);
    }

    #[test]
    fn test_servo_model_parse() {
        assert_eq!(ServoModel::parse("sts3215").unwrap(), ServoModel::Sts3215);
        assert!(ServoModel::parse("unknown").is_err());
    }
}
