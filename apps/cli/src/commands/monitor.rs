//! `monitor`：实时打印位置与电压

use super::{install_ctrlc, parse_model, parse_motor_ids};
use anyhow::{Context, Result};
use solink_bus::discovery::auto_detect_port;
use solink_bus::{ActuatorBus, FeetechBus};
use solink_engine::ShutdownToken;
use std::time::Duration;

#[derive(clap::Args, Debug)]
pub struct MonitorCommand {
    /// 串口（缺省自动探测唯一端口）
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    #[arg(long, default_value = "sts3215")]
    model: String,

    /// 刷新频率（Hz）
    #[arg(long, default_value_t = 2.0)]
    rate: f64,
}

impl MonitorCommand {
    pub fn execute(self) -> Result<()> {
        let motor_ids = parse_motor_ids(&self.motor_ids)?;
        let model = parse_model(&self.model)?;
        let port = match &self.port {
            Some(port) => port.clone(),
            None => auto_detect_port()?,
        };

        let mut bus = FeetechBus::new(&port, &motor_ids)
            .with_baud_rate(self.baudrate)
            .with_model(model)
            .with_actuator_id(&port);
        bus.connect()
            .with_context(|| format!("failed to connect to {port}"))?;

        let token = ShutdownToken::new();
        install_ctrlc(token.clone())?;

        let resolution = bus.resolution();
        let period = Duration::from_secs_f64(1.0 / self.rate.max(0.1));

        while !token.is_requested() {
            let positions = bus.read_positions();
            let voltage = bus.read_voltage().ok();

            // 清屏回到左上角
            print!("\x1B[2J\x1B[H");
            println!("=== {} ===", port);
            match voltage {
                Some(v) => println!("Voltage: {v:.1}V"),
                None => println!("Voltage: ERROR"),
            }
            println!("{:<10} | {:>10} | {:>8}", "CHANNEL", "POSITION", "PERCENT");
            println!("{}", "-".repeat(34));
            for id in &motor_ids {
                match positions.get(id) {
                    Some(&tic) => {
                        let percent = tic as f64 / (resolution - 1) as f64 * 100.0;
                        println!("{id:<10} | {tic:>10} | {percent:>7.1}%");
                    }
                    None => println!("{:<10} | {:>10} | {:>8}", id, "ERROR", "---"),
                }
            }
            println!("\nCtrl+C to stop");
            std::thread::sleep(period);
        }

        bus.disconnect().ok();
        Ok(())
    }
}
