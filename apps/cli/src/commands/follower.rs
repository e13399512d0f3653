//! `follower`：从动侧遥操作环

use super::{detect_ports_by_role, install_ctrlc, parse_model, parse_motor_ids, parse_policy};
use crate::display;
use anyhow::Result;
use solink_bus::FeetechBus;
use solink_bus::role::Role;
use solink_engine::config::{SafetyConfig, TeleopConfig};
use solink_engine::{CalibrationStore, FollowerLoop, MappingTable, RuntimeContext};
use solink_transport::UdpTransport;

#[derive(clap::Args, Debug)]
pub struct FollowerCommand {
    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    #[arg(long, default_value = "sts3215")]
    model: String,

    /// 电压分类策略（band / threshold）
    #[arg(long, default_value = "band")]
    policy: String,

    /// 显式从动臂端口（可重复；缺省按电压扫描）
    #[arg(long)]
    port: Vec<String>,

    /// 从动臂数量（电压扫描时校验）
    #[arg(long, default_value_t = 1)]
    arms: usize,

    /// 本地监听地址
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// 标定文件路径
    #[arg(long, default_value = "solink_calibration.json")]
    calibration_file: String,

    /// 新鲜度预算（毫秒）
    #[arg(long, default_value_t = 200.0)]
    latency_ms: f64,

    /// 指数平滑系数（0-1）
    #[arg(long, default_value_t = 0.8)]
    smoothing: f64,

    /// 单步最大位置变化（tic）
    #[arg(long, default_value_t = 200)]
    max_step: i32,

    /// 本端标识
    #[arg(long, default_value = "follower")]
    id: String,
}

impl FollowerCommand {
    pub fn execute(self) -> Result<()> {
        let motor_ids = parse_motor_ids(&self.motor_ids)?;
        let policy = parse_policy(&self.policy)?;
        let model = parse_model(&self.model)?;

        let ports = if self.port.is_empty() {
            detect_ports_by_role(
                &motor_ids,
                self.baudrate,
                model,
                policy,
                Role::Follower,
                self.arms,
            )?
        } else {
            self.port.clone()
        };

        // 缺失的标定文件降级为默认中位（store 内部告警）
        let store = CalibrationStore::new(&self.calibration_file);
        let calibration = store.load(&motor_ids, model.resolution());

        let mut mapping = MappingTable::new();
        let mut devices = Vec::with_capacity(ports.len());
        for (index, port) in ports.iter().enumerate() {
            let arm_id = format!("Follower{}", index + 1);
            mapping.assign(format!("Leader{}", index + 1), &arm_id);
            devices.push((
                FeetechBus::new(port, &motor_ids)
                    .with_baud_rate(self.baudrate)
                    .with_model(model)
                    .with_actuator_id(arm_id),
                calibration.clone(),
            ));
        }

        let transport = UdpTransport::listen(&self.bind)?;

        let ctx = RuntimeContext::new(
            TeleopConfig {
                sender_id: self.id.clone(),
                ..Default::default()
            },
            SafetyConfig {
                max_latency_ms: self.latency_ms,
                smoothing_factor: self.smoothing,
                max_step_tics: self.max_step,
                ..Default::default()
            },
        );
        install_ctrlc(ctx.shutdown.clone())?;

        let mut teleop = FollowerLoop::new(devices, transport, mapping, ctx.clone());
        display::spawn_follower_display(teleop.status_handle(), ctx.shutdown.clone());

        println!("Listening on {} — Ctrl+C to stop", self.bind);
        teleop.run()?;
        Ok(())
    }
}
