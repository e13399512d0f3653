//! `identify`：扫描串口、读电压、分类角色

use super::{parse_model, parse_motor_ids, parse_policy};
use anyhow::Result;
use solink_bus::discovery::find_actuator_ports;
use solink_bus::role::identify_role;
use solink_bus::{ActuatorBus, FeetechBus};

#[derive(clap::Args, Debug)]
pub struct IdentifyCommand {
    /// 逗号分隔的电机 id
    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    /// 串口波特率
    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    /// 舵机型号
    #[arg(long, default_value = "sts3215")]
    model: String,

    /// 电压分类策略（band / threshold）
    #[arg(long, default_value = "band")]
    policy: String,

    /// 只检测指定端口（可重复；缺省扫描全部候选端口）
    #[arg(long)]
    port: Vec<String>,
}

impl IdentifyCommand {
    pub fn execute(self) -> Result<()> {
        let motor_ids = parse_motor_ids(&self.motor_ids)?;
        let policy = parse_policy(&self.policy)?;
        let model = parse_model(&self.model)?;

        let ports = if self.port.is_empty() {
            find_actuator_ports()
        } else {
            self.port.clone()
        };

        if ports.is_empty() {
            println!("No candidate ports found.");
            return Ok(());
        }

        println!("{:<28} | {:>8} | {:<10}", "PORT", "VOLTAGE", "ROLE");
        println!("{}", "-".repeat(52));

        for port in ports {
            let mut bus = FeetechBus::new(&port, &motor_ids)
                .with_baud_rate(self.baudrate)
                .with_model(model)
                .with_actuator_id(&port);
            match bus.connect().and_then(|_| identify_role(&mut bus, policy)) {
                Ok((role, voltage)) => {
                    println!("{:<28} | {:>7.1}V | {:<10?}", port, voltage, role);
                }
                Err(e) => {
                    println!("{:<28} | {:>8} | {}", port, "ERROR", e);
                }
            }
            let _ = bus.disconnect();
        }
        Ok(())
    }
}
