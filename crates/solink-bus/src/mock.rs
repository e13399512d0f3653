//! 测试用内存总线
//!
//! 用一张 (通道, 寄存器) → 值 的内存表模拟舵机，无硬件依赖。
//! 供本 crate 和上层 crate 的测试使用（`mock` feature）。

use crate::{ActuatorBus, BusError, ChannelDynamics, Positions};
use solink_protocol::registers::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// 内存寄存器表总线
pub struct MockBus {
    actuator_id: String,
    channels: Vec<u8>,
    resolution: u32,
    connected: bool,
    registers: HashMap<(u8, u8), u16>,
    failing_channels: HashSet<u8>,
    fail_voltage: bool,
    fail_connect: bool,
    /// 按写入顺序记录的目标位置（通道, tic）
    goal_log: Vec<(u8, i32)>,
    dynamics: HashMap<u8, ChannelDynamics>,
}

impl MockBus {
    pub fn new(actuator_id: impl Into<String>, channels: &[u8]) -> Self {
        let channels = channels.to_vec();
        let mut registers = HashMap::new();
        for &ch in &channels {
            // 默认停在中位
            registers.insert((ch, REG_PRESENT_POSITION), 2048);
        }
        Self {
            actuator_id: actuator_id.into(),
            channels,
            resolution: 4096,
            connected: false,
            registers,
            failing_channels: HashSet::new(),
            fail_voltage: false,
            fail_connect: false,
            goal_log: Vec::new(),
            dynamics: HashMap::new(),
        }
    }

    pub fn set_dynamics(&mut self, channel: u8, dynamics: ChannelDynamics) {
        self.dynamics.insert(channel, dynamics);
    }

    pub fn set_position(&mut self, channel: u8, tic: i32) {
        self.registers
            .insert((channel, REG_PRESENT_POSITION), tic.clamp(0, 65535) as u16);
    }

    pub fn set_voltage(&mut self, volts: f32) {
        let raw = (volts * 10.0).round() as u16;
        if let Some(&first) = self.channels.first() {
            self.registers.insert((first, REG_PRESENT_VOLTAGE), raw);
        }
    }

    /// 让某通道的读写开始失败（模拟单通道掉线）
    pub fn fail_channel(&mut self, channel: u8) {
        self.failing_channels.insert(channel);
    }

    pub fn fail_voltage_reads(&mut self) {
        self.fail_voltage = true;
    }

    pub fn fail_connect(&mut self) {
        self.fail_connect = true;
    }

    pub fn register(&self, channel: u8, reg: u8) -> Option<u16> {
        self.registers.get(&(channel, reg)).copied()
    }

    pub fn torque_enabled(&self, channel: u8) -> bool {
        self.register(channel, REG_TORQUE_ENABLE) == Some(1)
    }

    pub fn last_goal(&self, channel: u8) -> Option<i32> {
        self.goal_log
            .iter()
            .rev()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, tic)| *tic)
    }

    pub fn goal_log(&self) -> &[(u8, i32)] {
        &self.goal_log
    }
}

impl ActuatorBus for MockBus {
    fn actuator_id(&self) -> &str {
        &self.actuator_id
    }

    fn channel_ids(&self) -> &[u8] {
        &self.channels
    }

    fn resolution(&self) -> u32 {
        self.resolution
    }

    fn connect(&mut self) -> Result<(), BusError> {
        if self.fail_connect {
            return Err(BusError::Connection(format!(
                "mock connect failure on {}",
                self.actuator_id
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_positions(&mut self) -> Positions {
        let mut positions = BTreeMap::new();
        for &ch in &self.channels.clone() {
            if self.failing_channels.contains(&ch) {
                warn!("{}: failed to read position from channel {}", self.actuator_id, ch);
                continue;
            }
            if let Some(&raw) = self.registers.get(&(ch, REG_PRESENT_POSITION)) {
                positions.insert(ch, raw as i32);
            }
        }
        positions
    }

    fn write_positions(&mut self, positions: &Positions) {
        for (&ch, &tic) in positions {
            if self.failing_channels.contains(&ch) {
                warn!("{}: failed to write position to channel {}", self.actuator_id, ch);
                continue;
            }
            let clamped = tic.clamp(0, (self.resolution - 1) as i32);
            self.registers.insert((ch, REG_GOAL_POSITION), clamped as u16);
            self.goal_log.push((ch, clamped));
        }
    }

    fn read_voltage(&mut self) -> Result<f32, BusError> {
        if self.fail_voltage {
            return Err(BusError::VoltageRead("mock voltage failure".to_string()));
        }
        let first = *self
            .channels
            .first()
            .ok_or_else(|| BusError::VoltageRead("no channels".to_string()))?;
        let raw = self
            .registers
            .get(&(first, REG_PRESENT_VOLTAGE))
            .copied()
            .unwrap_or(0);
        Ok(raw as f32 / 10.0)
    }

    fn enable_torque(&mut self) {
        for &ch in &self.channels.clone() {
            self.registers.insert((ch, REG_TORQUE_ENABLE), 1);
            self.registers.insert((ch, REG_LOCK), 1);
        }
    }

    fn disable_torque(&mut self) {
        for &ch in &self.channels.clone() {
            self.registers.insert((ch, REG_TORQUE_ENABLE), 0);
            self.registers.insert((ch, REG_LOCK), 0);
        }
    }

    fn read_dynamics(&mut self, channel: u8) -> Option<ChannelDynamics> {
        self.dynamics.get(&channel).copied()
    }

    fn read_u8(&mut self, channel: u8, reg: u8) -> Result<u8, BusError> {
        if self.failing_channels.contains(&channel) {
            return Err(BusError::Comm {
                channel,
                message: "mock channel failure".to_string(),
            });
        }
        Ok(self.registers.get(&(channel, reg)).copied().unwrap_or(0) as u8)
    }

    fn read_u16(&mut self, channel: u8, reg: u8) -> Result<u16, BusError> {
        if self.failing_channels.contains(&channel) {
            return Err(BusError::Comm {
                channel,
                message: "mock channel failure".to_string(),
            });
        }
        Ok(self.registers.get(&(channel, reg)).copied().unwrap_or(0))
    }

    fn write_u8(&mut self, channel: u8, reg: u8, value: u8) -> Result<(), BusError> {
        if self.failing_channels.contains(&channel) {
            return Err(BusError::Comm {
                channel,
                message: "mock channel failure".to_string(),
            });
        }
        self.registers.insert((channel, reg), value as u16);
        Ok(())
    }

    fn write_u16(&mut self, channel: u8, reg: u8, value: u16) -> Result<(), BusError> {
        if self.failing_channels.contains(&channel) {
            return Err(BusError::Comm {
                channel,
                message: "mock channel failure".to_string(),
            });
        }
        self.registers.insert((channel, reg), value);
        Ok(())
    }
}
