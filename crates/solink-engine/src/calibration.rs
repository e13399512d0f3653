//! 标定记录的加载与保存
//!
//! 每台设备一份 JSON 记录：各通道的归零位置、分辨率、反转通道集。
//! 记录一经加载不可变。缺失的记录降级为文档化的默认值
//! （home = resolution/2，无反转）并以告警浮出，绝不硬失败。

use serde::{Deserialize, Serialize};
use solink_protocol::codec::ChannelCalibration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 每设备标定记录（磁盘 JSON 模式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// 创建时刻（unix 秒）
    pub timestamp: f64,
    pub motor_ids: Vec<u8>,
    /// 通道 id（字符串键）→ 归零位置
    pub home_positions: BTreeMap<String, i32>,
    pub servo_resolution: u32,
    pub port: String,
    pub voltage: f32,
    pub is_leader: bool,
    /// 反转通道列表（可选，旧文件没有该字段）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invert_motors: Vec<u8>,
}

impl CalibrationRecord {
    /// 无标定文件时的降级默认
    pub fn fallback(motor_ids: &[u8], resolution: u32) -> Self {
        let mid = (resolution / 2) as i32;
        let home_positions = motor_ids
            .iter()
            .map(|id| (id.to_string(), mid))
            .collect();
        Self {
            timestamp: 0.0,
            motor_ids: motor_ids.to_vec(),
            home_positions,
            servo_resolution: resolution,
            port: String::new(),
            voltage: 0.0,
            is_leader: false,
            invert_motors: Vec::new(),
        }
    }

    /// 取单通道标定；缺失条目降级为中位并告警
    pub fn channel(&self, channel: u8) -> ChannelCalibration {
        let home_tic = match self.home_positions.get(&channel.to_string()) {
            Some(&home) => home,
            None => {
                warn!(
                    "Missing calibration for channel {}, using default center",
                    channel
                );
                (self.servo_resolution / 2) as i32
            }
        };
        ChannelCalibration {
            home_tic,
            inverted: self.invert_motors.contains(&channel),
        }
    }
}

/// 标定记录的文件存取
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载记录；文件缺失或损坏都降级为默认并告警
    pub fn load(&self, motor_ids: &[u8], resolution: u32) -> CalibrationRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Calibration file not found at {} ({}); using default centers — consider running calibration",
                    self.path.display(),
                    e
                );
                return CalibrationRecord::fallback(motor_ids, resolution);
            }
        };

        match serde_json::from_str::<CalibrationRecord>(&content) {
            Ok(record) => {
                info!(
                    "Loaded calibration from {} ({} channels)",
                    self.path.display(),
                    record.home_positions.len()
                );
                record
            }
            Err(e) => {
                warn!(
                    "Failed to parse calibration file {}: {}; using default centers",
                    self.path.display(),
                    e
                );
                CalibrationRecord::fallback(motor_ids, resolution)
            }
        }
    }

    /// 保存记录
    pub fn save(&self, record: &CalibrationRecord) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, json)?;
        info!("Calibration saved to {}", self.path.display());
        Ok(())
    }
}
