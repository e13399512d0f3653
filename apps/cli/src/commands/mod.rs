//! 子命令实现与共享工具

mod calibrate;
mod follower;
mod identify;
mod leader;
mod monitor;

pub use calibrate::{CalibrateCommand, SetMiddleCommand};
pub use follower::FollowerCommand;
pub use identify::IdentifyCommand;
pub use leader::LeaderCommand;
pub use monitor::MonitorCommand;

use anyhow::{Context, Result, bail};
use solink_bus::discovery::find_actuator_ports;
use solink_bus::role::{Role, RolePolicy, identify_role};
use solink_bus::{ActuatorBus, FeetechBus};
use solink_engine::ShutdownToken;
use solink_protocol::registers::ServoModel;
use tracing::warn;

/// 解析逗号分隔的电机 id 列表
pub fn parse_motor_ids(spec: &str) -> Result<Vec<u8>> {
    spec.split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .with_context(|| format!("bad motor id '{}'", part.trim()))
        })
        .collect()
}

/// 解析电压分类策略
pub fn parse_policy(spec: &str) -> Result<RolePolicy> {
    RolePolicy::parse(spec)
        .ok_or_else(|| anyhow::anyhow!("unknown policy '{spec}' (expected band or threshold)"))
}

/// 解析舵机型号
pub fn parse_model(spec: &str) -> Result<ServoModel> {
    ServoModel::parse(spec).map_err(Into::into)
}

/// 按电压扫描出指定角色的端口列表
pub fn detect_ports_by_role(
    motor_ids: &[u8],
    baudrate: u32,
    model: ServoModel,
    policy: RolePolicy,
    wanted: Role,
    count: usize,
) -> Result<Vec<String>> {
    let ports = find_actuator_ports();
    let mut matching = Vec::new();

    for port in ports {
        let mut bus = FeetechBus::new(&port, motor_ids)
            .with_baud_rate(baudrate)
            .with_model(model)
            .with_actuator_id(&port);
        match bus.connect().and_then(|_| identify_role(&mut bus, policy)) {
            Ok((role, voltage)) => {
                if role == wanted {
                    println!("✓ {:?} found at {} ({:.1}V)", wanted, port, voltage);
                    matching.push(port);
                }
            }
            Err(e) => {
                warn!("Failed to identify {}: {}", port, e);
            }
        }
        let _ = bus.disconnect();
    }

    if matching.len() != count {
        bail!(
            "expected {} {:?} arm(s), found {} — check power and USB connections",
            count,
            wanted,
            matching.len()
        );
    }
    Ok(matching)
}

/// 注册 Ctrl-C → 停机令牌
pub fn install_ctrlc(token: ShutdownToken) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\n⚠ Shutdown requested, cleaning up...");
        token.request();
    })
    .context("failed to install Ctrl-C handler")
}

/// 后台 stdin 监听：'s' 请求切换映射，'q' 请求停机
pub fn spawn_key_listener(
    switch: std::sync::Arc<std::sync::atomic::AtomicBool>,
    token: ShutdownToken,
) {
    std::thread::Builder::new()
        .name("solink-keys".to_string())
        .spawn(move || {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "s" => switch.store(true, std::sync::atomic::Ordering::Release),
                    "q" | "quit" | "exit" => {
                        token.request();
                        break;
                    }
                    _ => {}
                }
            }
        })
        .ok();
}
