//! 遥测线上消息定义
//!
//! 与具体传输通道（UDP / 云 pub-sub）无关的 JSON 消息模式。
//! `type` 字段区分消息类型；电机/通道 id 序列化为字符串。
//!
//! 序列号仅用于本地丢包的间隙统计，不承担协议层的顺序保证——
//! 传输不保证有序、不保证恰好一次。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 每通道原始位置表（通道 id → tic）
pub type ChannelPositions = BTreeMap<String, i32>;

/// 遥测帧的位置载荷
///
/// 两种形态都出现在现场部署里：多臂模式按从动臂 id 分组，
/// 单臂模式直接是通道表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionPayload {
    /// 多臂：从动臂 id → 通道表
    PerFollower(BTreeMap<String, ChannelPositions>),
    /// 单臂：直接通道表
    Flat(ChannelPositions),
}

impl PositionPayload {
    /// 取某从动臂的通道表
    ///
    /// 单臂载荷对任何 id 都返回同一张表。
    pub fn for_follower(&self, follower_id: &str) -> Option<&ChannelPositions> {
        match self {
            PositionPayload::PerFollower(map) => map.get(follower_id),
            PositionPayload::Flat(map) => Some(map),
        }
    }

    /// 载荷中是否没有任何位置
    pub fn is_empty(&self) -> bool {
        match self {
            PositionPayload::PerFollower(map) => {
                map.is_empty() || map.values().all(|m| m.is_empty())
            }
            PositionPayload::Flat(map) => map.is_empty(),
        }
    }
}

/// 遥测帧
///
/// 每个控制周期构造一次、消费一次即丢弃。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// 单调递增序列号（每个发送端独立，从 1 开始）
    pub sequence: u64,
    /// 发出时刻（unix 秒）
    pub timestamp: f64,
    /// 位置载荷
    pub positions: PositionPayload,
    /// 可选的底盘/辅助控制载荷
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_controls: Option<BTreeMap<String, f64>>,
}

impl TelemetryFrame {
    pub fn new(sequence: u64, timestamp: f64, positions: PositionPayload) -> Self {
        Self {
            sequence,
            timestamp,
            positions,
            aux_controls: None,
        }
    }
}

/// 确认消息（带外回执，用于延迟测量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    pub sequence: u64,
    /// 回显被确认帧的发出时刻
    pub timestamp: f64,
    pub sender_id: String,
}

/// 从动侧周期状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub timestamp: f64,
    pub sender_id: String,
    pub motors_active: u32,
    pub followers_connected: u32,
}

/// 主动侧退出通告（尽力而为）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub timestamp: f64,
    pub sender_id: String,
}

/// 线上消息（`type` 字段内部标签）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Telemetry(TelemetryFrame),
    Ack(AckFrame),
    Status(StatusFrame),
    Disconnect(DisconnectNotice),
}
