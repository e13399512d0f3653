//! `set-middle` / `calibrate`：两种标定入口
//!
//! - `set-middle`：按安全顺序把当前姿态写为 EEPROM 量程中点
//! - `calibrate`：捕获当前原始姿态保存为标定文件（不动 EEPROM）

use super::{parse_model, parse_motor_ids, parse_policy};
use anyhow::{Context, Result};
use solink_bus::discovery::auto_detect_port;
use solink_bus::homing::set_middle_position;
use solink_bus::role::Role;
use solink_bus::{ActuatorBus, FeetechBus};
use solink_engine::{CalibrationRecord, CalibrationStore};
use solink_transport::time::now_unix;
use tracing::warn;

/// 共享的总线打开逻辑
fn open_bus(
    port: &Option<String>,
    motor_ids: &[u8],
    baudrate: u32,
    model: &str,
) -> Result<FeetechBus> {
    let port = match port {
        Some(port) => port.clone(),
        None => auto_detect_port()?,
    };
    let mut bus = FeetechBus::new(&port, motor_ids)
        .with_baud_rate(baudrate)
        .with_model(parse_model(model)?)
        .with_actuator_id(&port);
    bus.connect()
        .with_context(|| format!("failed to connect to {port}"))?;
    Ok(bus)
}

#[derive(clap::Args, Debug)]
pub struct SetMiddleCommand {
    /// 串口（缺省自动探测唯一端口）
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    #[arg(long, default_value = "sts3215")]
    model: String,
}

impl SetMiddleCommand {
    pub fn execute(self) -> Result<()> {
        let motor_ids = parse_motor_ids(&self.motor_ids)?;
        let mut bus = open_bus(&self.port, &motor_ids, self.baudrate, &self.model)?;

        let outcome = set_middle_position(&mut bus)?;

        println!("\nHoming offsets written:");
        for (channel, offset) in &outcome.offsets {
            println!("  channel {channel}: {offset}");
        }
        println!("\n✓ Middle position set. Current pose is now the center of travel.");

        bus.disconnect().ok();
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct CalibrateCommand {
    /// 串口（缺省自动探测唯一端口）
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    #[arg(long, default_value = "sts3215")]
    model: String,

    /// 电压分类策略（写进记录的 is_leader 字段）
    #[arg(long, default_value = "band")]
    policy: String,

    /// 标定文件输出路径
    #[arg(long, default_value = "solink_calibration.json")]
    output: String,
}

impl CalibrateCommand {
    pub fn execute(self) -> Result<()> {
        let motor_ids = parse_motor_ids(&self.motor_ids)?;
        let policy = parse_policy(&self.policy)?;
        let mut bus = open_bus(&self.port, &motor_ids, self.baudrate, &self.model)?;

        let positions = bus.read_positions();
        for id in &motor_ids {
            if !positions.contains_key(id) {
                anyhow::bail!("failed to read position from channel {id}");
            }
        }

        let voltage = match bus.read_voltage() {
            Ok(v) => v,
            Err(e) => {
                warn!("Voltage read failed during calibration: {e}");
                0.0
            }
        };

        let record = CalibrationRecord {
            timestamp: now_unix(),
            motor_ids: motor_ids.clone(),
            home_positions: positions
                .iter()
                .map(|(ch, tic)| (ch.to_string(), *tic))
                .collect(),
            servo_resolution: bus.resolution(),
            port: bus.port_name().to_string(),
            voltage,
            is_leader: policy.classify(voltage) == Role::Leader,
            invert_motors: Vec::new(),
        };

        let store = CalibrationStore::new(&self.output);
        store.save(&record)?;

        println!("✓ Calibration saved to {}", self.output);
        for (channel, tic) in &positions {
            println!("  channel {channel}: home = {tic}");
        }

        bus.disconnect().ok();
        Ok(())
    }
}
