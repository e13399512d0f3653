//! 中位标定写入流程
//!
//! 把执行器当前姿态设为量程中点：按固定顺序写每个通道的归零偏移。
//! 顺序是安全关键的，必须严格保持：
//!
//! 1. 全通道关扭矩（允许手动摆位，也避免写 EEPROM 时带载）
//! 2. 先把归零偏移清零、限位复位到 `[0, resolution-1]`，**然后**才读
//!    位置——跳过这一步会让新偏移叠加在旧偏移之上
//! 3. 读当前原始位置
//! 4. `offset = raw - resolution/2`
//! 5. 符号-幅值编码写入偏移寄存器
//! 6. 恢复 Phase / Lock / 工作模式
//!
//! EEPROM 写入在部分设备上不回状态包，超时不算失败；
//! 其他错误按通道最多重试 3 次并退避。

use crate::{ActuatorBus, BusError, Positions};
use solink_protocol::codec::encode_sign_magnitude;
use solink_protocol::registers::*;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单寄存器最大写入尝试次数
pub const MAX_EEPROM_RETRIES: u32 = 3;

/// 重试间隔
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// 标定结果
#[derive(Debug, Clone)]
pub struct HomingOutcome {
    /// 标定时读到的原始位置
    pub positions: Positions,
    /// 写入的归零偏移（有符号）
    pub offsets: BTreeMap<u8, i32>,
}

/// EEPROM 写入（带重试，超时视为成功）
fn write_eeprom_u16(
    bus: &mut impl ActuatorBus,
    channel: u8,
    reg: u8,
    value: u16,
) -> Result<(), BusError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match bus.write_u16(channel, reg, value) {
            Ok(()) => return Ok(()),
            // NVM 写不保证回状态包，缺包不是错误，更不允许重试风暴
            Err(BusError::Timeout) => {
                debug!("channel {channel} reg {reg}: no status ack for EEPROM write (accepted)");
                return Ok(());
            }
            Err(e) if attempt < MAX_EEPROM_RETRIES => {
                warn!(
                    "channel {channel} reg {reg}: write failed (attempt {attempt}): {e}, retrying"
                );
                std::thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

fn write_eeprom_u8(
    bus: &mut impl ActuatorBus,
    channel: u8,
    reg: u8,
    value: u8,
) -> Result<(), BusError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match bus.write_u8(channel, reg, value) {
            Ok(()) => return Ok(()),
            Err(BusError::Timeout) => {
                debug!("channel {channel} reg {reg}: no status ack for EEPROM write (accepted)");
                return Ok(());
            }
            Err(e) if attempt < MAX_EEPROM_RETRIES => {
                warn!(
                    "channel {channel} reg {reg}: write failed (attempt {attempt}): {e}, retrying"
                );
                std::thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

/// 把当前姿态设为量程中点
pub fn set_middle_position(bus: &mut impl ActuatorBus) -> Result<HomingOutcome, BusError> {
    let channels = bus.channel_ids().to_vec();
    let resolution = bus.resolution();
    let max_limit = (resolution - 1) as u16;
    let mid = (resolution / 2) as i32;

    info!(
        "Setting middle position for {} channels on {}",
        channels.len(),
        bus.actuator_id()
    );

    // 1. 关扭矩
    bus.disable_torque();

    // 2. 偏移清零 + 限位复位，必须先于读位置
    for &ch in &channels {
        write_eeprom_u16(bus, ch, REG_HOMING_OFFSET, 0)?;
        write_eeprom_u16(bus, ch, REG_MIN_POSITION_LIMIT, 0)?;
        write_eeprom_u16(bus, ch, REG_MAX_POSITION_LIMIT, max_limit)?;
    }

    // 3. 读当前原始位置，任何通道缺失都中止
    let positions = bus.read_positions();
    for &ch in &channels {
        if !positions.contains_key(&ch) {
            return Err(BusError::Comm {
                channel: ch,
                message: "failed to read position during homing".to_string(),
            });
        }
    }

    // 4 + 5. 计算并写入偏移
    let mut offsets = BTreeMap::new();
    for (&ch, &raw) in &positions {
        let offset = raw - mid;
        let encoded = encode_sign_magnitude(offset, HOMING_OFFSET_SIGN_BIT)?;
        write_eeprom_u16(bus, ch, REG_HOMING_OFFSET, encoded)?;
        offsets.insert(ch, offset);
        debug!("channel {ch}: homing offset {offset} (raw {raw})");
    }

    // 6. 恢复 Phase / Lock / 工作模式
    for &ch in &channels {
        write_eeprom_u8(bus, ch, REG_PHASE, PHASE_CALIBRATION_VALUE)?;
        write_eeprom_u8(bus, ch, REG_LOCK, 0)?;
        write_eeprom_u8(bus, ch, REG_OPERATING_MODE, OPERATING_MODE_POSITION)?;
    }

    info!("Middle position set: {:?}", offsets);
    Ok(HomingOutcome { positions, offsets })
}
