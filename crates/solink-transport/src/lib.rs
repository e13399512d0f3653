//! # Solink Transport Layer
//!
//! 遥测传输抽象：把"最新位置"从主动侧搬到从动侧，并把回执搬回来。
//!
//! 传输不承诺有序、不承诺恰好一次；序列号只用于本地间隙统计。
//! 只有最新鲜的位置对遥操作有意义，所以接收端是容量 1 的覆盖槽，
//! 旧帧被有意丢弃而不是排队。
//!
//! ## 线程模型
//!
//! 每个传输实现内部持有一个专用 RX 线程：它只做两件事——写
//! "最新帧"槽位、投递带外事件（ack/status）。阻塞的网络调用只允许
//! 发生在这个线程里；控制环侧的所有接口都是非阻塞的。

use solink_protocol::wire::{AckFrame, DisconnectNotice, StatusFrame, TelemetryFrame, WireMessage};
use thiserror::Error;

pub mod loopback;
pub mod monitor;
pub mod slot;
pub mod time;
pub mod udp;

pub use loopback::{loopback_pair, LoopbackTransport};
pub use monitor::{NetworkMonitor, NetworkStats};
pub use slot::{LatestSlot, LinkStats};
pub use udp::UdpTransport;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 还不知道对端地址（监听模式下对端首帧到达前无处可发）
    #[error("Peer address unknown")]
    NoPeer,

    #[error("Transport closed")]
    Closed,
}

/// 带外事件（遥测以外的消息经事件队列出队）
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Ack(AckFrame),
    Status(StatusFrame),
    Disconnect(DisconnectNotice),
}

/// 可插拔遥测传输
///
/// 实现可以是点对点 socket（[`UdpTransport`]）、进程内回环
/// （[`LoopbackTransport`]），或云 pub/sub 总线。
pub trait Transport: Send {
    /// 发送一条线上消息
    ///
    /// 发射后不管；除序列化和系统调用外不做任何等待，
    /// 不允许把控制环阻塞超过一个很小的上界。
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError>;

    /// 非阻塞取走最新到达的遥测帧
    ///
    /// 取走即清空。两次轮询之间到达多帧时只保留最后一帧。
    fn receive_latest(&mut self) -> Option<TelemetryFrame>;

    /// 非阻塞取一条带外事件（ack / status / disconnect）
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// 接收侧统计快照
    fn link_stats(&self) -> LinkStats;

    /// 停止 RX 线程并释放通道资源
    ///
    /// 停机路径调用：错误只记录，绝不阻止退出。
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::NoPeer;
        assert_eq!(format!("{}", err), "Peer address unknown");

        let err = TransportError::Closed;
        assert_eq!(format!("{}", err), "Transport closed");
    }
}
