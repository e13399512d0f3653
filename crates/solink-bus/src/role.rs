//! 角色识别
//!
//! 主动臂（leader）用 5V 供电，从动臂（follower）用 12V 供电，
//! 因此可以从电压签名自动分类。角色在一次连接会话内只赋值一次，
//! 绝不在会话中途静默变化——重读电压必须是显式操作。

use crate::{ActuatorBus, BusError};
use tracing::info;

/// 执行器角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Leader,
    Follower,
    /// 电压不在任何已知区间内；该设备被排除在自动映射之外
    #[default]
    Unknown,
}

/// 电压分类策略
///
/// 现场存在两套策略，同一硬件在不同脚本里用法不同，
/// 两套都保留为配置项而不是武断选一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolePolicy {
    /// 区间策略：4.5V ≤ v ≤ 5.5V 为 Leader，11V ≤ v ≤ 13V 为
    /// Follower，其余 Unknown。边界含端点。
    #[default]
    Band,
    /// 阈值策略：v < 9.0V 为 Leader，否则 Follower。
    Threshold,
}

impl RolePolicy {
    /// 从单次电压读数分类
    pub fn classify(&self, voltage: f32) -> Role {
        match self {
            RolePolicy::Band => {
                if (4.5..=5.5).contains(&voltage) {
                    Role::Leader
                } else if (11.0..=13.0).contains(&voltage) {
                    Role::Follower
                } else {
                    Role::Unknown
                }
            }
            RolePolicy::Threshold => {
                if voltage < 9.0 {
                    Role::Leader
                } else {
                    Role::Follower
                }
            }
        }
    }

    /// 从配置字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "band" => Some(RolePolicy::Band),
            "threshold" => Some(RolePolicy::Threshold),
            _ => None,
        }
    }
}

/// 一次连接会话内的执行器档案
///
/// 角色在会话内只赋值一次；重新识别必须显式调用
/// [`identify_role`] 重读电压。
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorProfile {
    pub actuator_id: String,
    /// 通道 id 列表（有序，1..N，含保留的夹爪通道）
    pub channels: Vec<u8>,
    pub role: Role,
    /// 识别时观察到的供电电压
    pub voltage: f32,
}

/// 读取总线电压并分类
///
/// 电压读取失败时向上传播 [`BusError::VoltageRead`]；
/// 调用方必须重试识别或把设备排除出映射，不得猜测角色。
pub fn identify_role(
    bus: &mut impl ActuatorBus,
    policy: RolePolicy,
) -> Result<(Role, f32), BusError> {
    let voltage = bus.read_voltage()?;
    let role = policy.classify(voltage);
    info!(
        "{}: voltage = {:.1}V -> {:?}",
        bus.actuator_id(),
        voltage,
        role
    );
    Ok((role, voltage))
}

/// 识别并固化为档案
pub fn identify_profile(
    bus: &mut impl ActuatorBus,
    policy: RolePolicy,
) -> Result<ActuatorProfile, BusError> {
    let (role, voltage) = identify_role(bus, policy)?;
    Ok(ActuatorProfile {
        actuator_id: bus.actuator_id().to_string(),
        channels: bus.channel_ids().to_vec(),
        role,
        voltage,
    })
}
