//! Feetech STS/SCS 串口总线后端
//!
//! SCServo 协议 0 的最小实现：PING / READ / WRITE 指令，
//! 半双工串口，一问一答。
//!
//! 包格式：
//!
//! ```text
//! TX:     0xFF 0xFF <id> <len> <instruction> <params...> <checksum>
//! STATUS: 0xFF 0xFF <id> <len> <error>       <params...> <checksum>
//! ```
//!
//! `len = params + 2`，`checksum = ~(id + len + instr/error + Σparams)`。
//! 多字节寄存器为小端。

use crate::{ActuatorBus, BusDeviceError, BusDeviceErrorKind, BusError, ChannelDynamics, Positions};
use serialport::SerialPort;
use solink_protocol::registers::*;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{info, trace, warn};

const INSTRUCTION_PING: u8 = 0x01;
const INSTRUCTION_READ: u8 = 0x02;
const INSTRUCTION_WRITE: u8 = 0x03;

/// 默认串口读超时
///
/// 设备协议自身的超时上界；控制环内的硬件读写以此为界。
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// 校验和：取和的反码低字节
fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// 构建指令包
fn build_packet(channel: u8, instruction: u8, params: &[u8]) -> Vec<u8> {
    let len = (params.len() + 2) as u8;
    let mut packet = Vec::with_capacity(params.len() + 6);
    packet.extend_from_slice(&[0xFF, 0xFF, channel, len, instruction]);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));
    packet
}

/// 校验状态包体并取出参数
///
/// `body = [error, params..., checksum]`，返回 params。
fn parse_status_body(channel: u8, len: u8, body: &[u8]) -> Result<Vec<u8>, BusError> {
    if body.len() < 2 {
        return Err(BusError::Device(BusDeviceError::new(
            BusDeviceErrorKind::InvalidResponse,
            format!("status body too short: {} bytes", body.len()),
        )));
    }
    let (payload, sum) = body.split_at(body.len() - 1);
    let mut check_input = vec![channel, len];
    check_input.extend_from_slice(payload);
    if checksum(&check_input) != sum[0] {
        return Err(BusError::Device(BusDeviceError::new(
            BusDeviceErrorKind::ChecksumMismatch,
            format!("status checksum mismatch on channel {channel}"),
        )));
    }
    let error = payload[0];
    if error != 0 {
        return Err(BusError::Comm {
            channel,
            message: format!("servo status error 0x{error:02X}"),
        });
    }
    Ok(payload[1..].to_vec())
}

/// Feetech 串口总线
///
/// 连接时逐一 ping 配置的通道，任何一个不可达都立即失败，
/// 绝不带着半截总线进入流式状态。
pub struct FeetechBus {
    actuator_id: String,
    port_name: String,
    baud_rate: u32,
    channels: Vec<u8>,
    model: ServoModel,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl FeetechBus {
    pub fn new(port_name: impl Into<String>, channels: &[u8]) -> Self {
        Self {
            actuator_id: String::new(),
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            channels: channels.to_vec(),
            model: ServoModel::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            port: None,
        }
    }

    /// 设置执行器身份（如 "Leader1"）
    pub fn with_actuator_id(mut self, id: impl Into<String>) -> Self {
        self.actuator_id = id.into();
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_model(mut self, model: ServoModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, BusError> {
        self.port
            .as_mut()
            .ok_or_else(|| BusError::Connection("bus not connected".to_string()))
    }

    /// 一次指令往返
    fn transact(
        &mut self,
        channel: u8,
        instruction: u8,
        params: &[u8],
    ) -> Result<Vec<u8>, BusError> {
        let packet = build_packet(channel, instruction, params);
        let port = self.port_mut()?;

        port.write_all(&packet).map_err(map_io)?;

        // 状态包头：0xFF 0xFF <id> <len>
        let mut header = [0u8; 4];
        port.read_exact(&mut header).map_err(map_io)?;
        if header[0] != 0xFF || header[1] != 0xFF {
            return Err(BusError::Device(BusDeviceError::new(
                BusDeviceErrorKind::InvalidResponse,
                format!("bad status header {:02X} {:02X}", header[0], header[1]),
            )));
        }
        if header[2] != channel {
            return Err(BusError::Device(BusDeviceError::new(
                BusDeviceErrorKind::InvalidResponse,
                format!("status from channel {} while talking to {}", header[2], channel),
            )));
        }

        let len = header[3];
        let mut body = vec![0u8; len as usize];
        port.read_exact(&mut body).map_err(map_io)?;

        parse_status_body(channel, len, &body)
    }

    fn ping(&mut self, channel: u8) -> Result<(), BusError> {
        self.transact(channel, INSTRUCTION_PING, &[])?;
        Ok(())
    }
}

/// 超时与其他 IO 错误分开，控制环靠它区分"正常静默"和设备故障
fn map_io(e: std::io::Error) -> BusError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        BusError::Timeout
    } else {
        BusError::Io(e)
    }
}

impl ActuatorBus for FeetechBus {
    fn actuator_id(&self) -> &str {
        &self.actuator_id
    }

    fn channel_ids(&self) -> &[u8] {
        &self.channels
    }

    fn resolution(&self) -> u32 {
        self.model.resolution()
    }

    fn connect(&mut self) -> Result<(), BusError> {
        let port = serialport::new(self.port_name.clone(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| {
                BusError::Connection(format!("failed to open port '{}': {}", self.port_name, e))
            })?;
        self.port = Some(port);

        // 逐一 ping，任何通道不可达都算连接失败
        for ch in self.channels.clone() {
            self.ping(ch).map_err(|e| {
                self.port = None;
                BusError::Connection(format!("failed to ping channel {ch}: {e}"))
            })?;
        }

        info!("Connected to {} at {}", self.actuator_id, self.port_name);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BusError> {
        self.port = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn read_positions(&mut self) -> Positions {
        let mut positions = BTreeMap::new();
        for ch in self.channels.clone() {
            match self.read_u16(ch, REG_PRESENT_POSITION) {
                Ok(raw) => {
                    positions.insert(ch, raw as i32);
                }
                Err(e) => {
                    warn!(
                        "{}: failed to read position from channel {}: {}",
                        self.actuator_id, ch, e
                    );
                }
            }
        }
        positions
    }

    fn write_positions(&mut self, positions: &Positions) {
        let max = (self.resolution() - 1) as i32;
        for (&ch, &tic) in positions {
            let clamped = tic.clamp(0, max) as u16;
            if let Err(e) = self.write_u16(ch, REG_GOAL_POSITION, clamped) {
                warn!(
                    "{}: failed to write position to channel {}: {}",
                    self.actuator_id, ch, e
                );
            }
        }
    }

    fn read_voltage(&mut self) -> Result<f32, BusError> {
        let first = *self
            .channels
            .first()
            .ok_or_else(|| BusError::VoltageRead("no channels configured".to_string()))?;
        // 寄存器单位是 0.1V
        let raw = self
            .read_u8(first, REG_PRESENT_VOLTAGE)
            .map_err(|e| BusError::VoltageRead(e.to_string()))?;
        Ok(raw as f32 / 10.0)
    }

    fn enable_torque(&mut self) {
        for ch in self.channels.clone() {
            if let Err(e) = self.write_u8(ch, REG_TORQUE_ENABLE, 1) {
                warn!("{}: failed to enable torque on channel {}: {}", self.actuator_id, ch, e);
            }
            if let Err(e) = self.write_u8(ch, REG_LOCK, 1) {
                warn!("{}: failed to set lock on channel {}: {}", self.actuator_id, ch, e);
            }
        }
    }

    fn disable_torque(&mut self) {
        for ch in self.channels.clone() {
            if let Err(e) = self.write_u8(ch, REG_TORQUE_ENABLE, 0) {
                warn!("{}: failed to disable torque on channel {}: {}", self.actuator_id, ch, e);
            }
            if let Err(e) = self.write_u8(ch, REG_LOCK, 0) {
                warn!("{}: failed to clear lock on channel {}: {}", self.actuator_id, ch, e);
            }
        }
        trace!("{}: torque disabled on all channels", self.actuator_id);
    }

    fn read_dynamics(&mut self, channel: u8) -> Option<ChannelDynamics> {
        use solink_protocol::codec::decode_sign_magnitude;

        let position = self.read_u16(channel, REG_PRESENT_POSITION).ok()? as i32;
        let speed_raw = self.read_u16(channel, REG_PRESENT_SPEED).ok()?;
        let load_raw = self.read_u16(channel, REG_PRESENT_LOAD).ok()?;
        Some(ChannelDynamics {
            position,
            speed: decode_sign_magnitude(speed_raw, PRESENT_SPEED_SIGN_BIT) as f64,
            // 负载单位是 0.1% 堵转扭矩
            effort: decode_sign_magnitude(load_raw, PRESENT_LOAD_SIGN_BIT) as f64 / 1000.0,
        })
    }

    fn read_u8(&mut self, channel: u8, reg: u8) -> Result<u8, BusError> {
        let params = self.transact(channel, INSTRUCTION_READ, &[reg, 1])?;
        params.first().copied().ok_or_else(|| {
            BusError::Device(BusDeviceError::new(
                BusDeviceErrorKind::InvalidResponse,
                "empty read response",
            ))
        })
    }

    fn read_u16(&mut self, channel: u8, reg: u8) -> Result<u16, BusError> {
        let params = self.transact(channel, INSTRUCTION_READ, &[reg, 2])?;
        if params.len() < 2 {
            return Err(BusError::Device(BusDeviceError::new(
                BusDeviceErrorKind::InvalidResponse,
                format!("short read response: {} bytes", params.len()),
            )));
        }
        Ok(u16::from_le_bytes([params[0], params[1]]))
    }

    fn write_u8(&mut self, channel: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.transact(channel, INSTRUCTION_WRITE, &[reg, value])?;
        Ok(())
    }

    fn write_u16(&mut self, channel: u8, reg: u8, value: u16) -> Result<(), BusError> {
        let [lo, hi] = value.to_le_bytes();
        self.transact(channel, INSTRUCTION_WRITE, &[reg, lo, hi])?;
        Ok(())
    }
}
