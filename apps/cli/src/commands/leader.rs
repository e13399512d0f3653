//! `leader`：主动侧遥操作环

use super::{detect_ports_by_role, install_ctrlc, parse_model, parse_motor_ids, parse_policy,
            spawn_key_listener};
use crate::display;
use anyhow::Result;
use solink_bus::FeetechBus;
use solink_bus::role::Role;
use solink_engine::config::{SafetyConfig, TeleopConfig};
use solink_engine::{LeaderLoop, MappingTable, RuntimeContext};
use solink_transport::UdpTransport;

#[derive(clap::Args, Debug)]
pub struct LeaderCommand {
    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    motor_ids: String,

    #[arg(long, default_value_t = 1_000_000)]
    baudrate: u32,

    #[arg(long, default_value = "sts3215")]
    model: String,

    /// 目标更新频率（Hz）
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// 电压分类策略（band / threshold）
    #[arg(long, default_value = "band")]
    policy: String,

    /// 显式主动臂端口（可重复；缺省按电压扫描）
    #[arg(long)]
    port: Vec<String>,

    /// 主动臂数量（电压扫描时校验）
    #[arg(long, default_value_t = 1)]
    arms: usize,

    /// 本地绑定地址
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// 从动侧地址
    #[arg(long)]
    peer: String,

    /// 本端标识
    #[arg(long, default_value = "leader")]
    id: String,
}

impl LeaderCommand {
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
                Role::Leader,
                self.arms,
            )?
        } else {
            self.port.clone()
        };

        let mut mapping = MappingTable::new();
        let mut buses = Vec::with_capacity(ports.len());
        for (index, port) in ports.iter().enumerate() {
            let arm_id = format!("Leader{}", index + 1);
            mapping.assign(&arm_id, format!("Follower{}", index + 1));
            buses.push(
                FeetechBus::new(port, &motor_ids)
                    .with_baud_rate(self.baudrate)
                    .with_model(model)
                    .with_actuator_id(arm_id),
            );
        }

        let transport = UdpTransport::connect(&self.bind, self.peer.as_str())?;

        let ctx = RuntimeContext::new(
            TeleopConfig {
                target_hz: self.fps,
                sender_id: self.id.clone(),
                ..Default::default()
            },
            SafetyConfig::default(),
        );
        install_ctrlc(ctx.shutdown.clone())?;

        let mut teleop = LeaderLoop::new(buses, transport, mapping, ctx.clone());
        spawn_key_listener(teleop.switch_handle(), ctx.shutdown.clone());
        display::spawn_leader_display(teleop.status_handle(), ctx.shutdown.clone());

        println!("Type 's' + Enter to switch mapping, Ctrl+C to stop");
        teleop.run()?;
        Ok(())
    }
}
