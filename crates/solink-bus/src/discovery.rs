//! 串口发现
//!
//! 按操作系统命名习惯筛选可能是执行器总线的串口。

use crate::BusError;
use tracing::info;

/// 端口名是否符合本平台的执行器总线命名模式
pub fn is_actuator_port(name: &str) -> bool {
    if cfg!(target_os = "macos") {
        name.contains("usbmodem") || name.contains("usbserial")
    } else if cfg!(target_os = "windows") {
        name.contains("COM")
    } else {
        // Linux 及其他
        name.contains("ttyUSB") || name.contains("ttyACM")
    }
}

/// 列出所有候选执行器端口
pub fn find_actuator_ports() -> Vec<String> {
    let Ok(ports) = serialport::available_ports() else {
        return Vec::new();
    };
    ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| is_actuator_port(name))
        .collect()
}

/// 自动探测唯一的执行器端口
///
/// 零个或多个候选都报错——多设备场景必须显式指定端口。
pub fn auto_detect_port() -> Result<String, BusError> {
    let ports = find_actuator_ports();
    match ports.len() {
        0 => Err(BusError::Connection(
            "no actuator ports detected; ensure the device is connected via USB".to_string(),
        )),
        1 => {
            info!("Auto-detected port: {}", ports[0]);
            Ok(ports.into_iter().next().unwrap())
        }
        _ => Err(BusError::Connection(format!(
            "multiple candidate ports detected: {ports:?}; disconnect all but one or specify the port explicitly"
        ))),
    }
}
