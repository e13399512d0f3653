//! UDP 点对点传输
//!
//! 每条线上消息一个 JSON 报文。UDP 的乱序/重复/丢失语义正好是
//! 本协议的假设前提——新鲜度由接收槽和安全门保障，不在传输层补序。
//!
//! 两种工作模式：
//! - `connect`：显式对端地址（主动侧）
//! - `listen`：从第一个来包学习对端地址（从动侧，回执原路返回）

use crate::slot::{LatestSlot, LinkStats};
use crate::{Transport, TransportError, TransportEvent};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use solink_protocol::wire::{TelemetryFrame, WireMessage};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// RX 线程的读超时（兼做停机标志检查周期）
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// 单报文缓冲上限
const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    slot: Arc<LatestSlot>,
    events_rx: Receiver<TransportEvent>,
    is_running: Arc<AtomicBool>,
    rx_thread: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// 绑定本地地址并指定对端（主动侧）
    pub fn connect(local: &str, peer: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let peer_addr = peer
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::other("peer address resolved to nothing"))?;
        Self::bind(local, Some(peer_addr))
    }

    /// 绑定本地地址，对端从来包学习（从动侧）
    pub fn listen(local: &str) -> Result<Self, TransportError> {
        Self::bind(local, None)
    }

    fn bind(local: &str, peer_addr: Option<SocketAddr>) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)?;
        socket.set_read_timeout(Some(RECEIVE_TIMEOUT))?;

        let peer = Arc::new(Mutex::new(peer_addr));
        let slot = Arc::new(LatestSlot::new());
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let is_running = Arc::new(AtomicBool::new(true));

        let rx_socket = socket.try_clone()?;
        // 只有监听模式才从来包学习对端
        let learn_peer = peer_addr.is_none();
        let rx_thread = std::thread::Builder::new()
            .name("solink-udp-rx".to_string())
            .spawn({
                let slot = slot.clone();
                let peer = peer.clone();
                let is_running = is_running.clone();
                move || rx_loop(rx_socket, slot, events_tx, peer, learn_peer, is_running)
            })?;

        Ok(Self {
            socket,
            peer,
            slot,
            events_rx,
            is_running,
            rx_thread: Some(rx_thread),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

/// RX 线程主循环
///
/// 只写"最新帧"槽位和事件队列，绝不触碰硬件或控制环状态。
fn rx_loop(
    socket: UdpSocket,
    slot: Arc<LatestSlot>,
    events_tx: Sender<TransportEvent>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    learn_peer: bool,
    is_running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        // Acquire: 看到 false 时必须看到停机前的所有清理写入
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // 超时是正常情况，回去检查停机标志
                continue;
            }
            Err(e) => {
                warn!("RX thread: UDP receive error: {}", e);
                continue;
            }
        };

        if learn_peer {
            *peer.lock() = Some(src);
        }

        match serde_json::from_slice::<WireMessage>(&buf[..len]) {
            Ok(WireMessage::Telemetry(frame)) => {
                slot.publish(frame);
            }
            Ok(WireMessage::Ack(ack)) => {
                let _ = events_tx.send(TransportEvent::Ack(ack));
            }
            Ok(WireMessage::Status(status)) => {
                let _ = events_tx.send(TransportEvent::Status(status));
            }
            Ok(WireMessage::Disconnect(notice)) => {
                let _ = events_tx.send(TransportEvent::Disconnect(notice));
            }
            Err(e) => {
                // 未知/畸形报文忽略，不是错误
                debug!("RX thread: ignoring unparseable datagram from {src}: {e}");
            }
        }
    }

    trace!("RX thread: loop exited");
}

impl Transport for UdpTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let peer = self.peer.lock().ok_or(TransportError::NoPeer)?;
        let bytes = serde_json::to_vec(message)?;
        self.socket.send_to(&bytes, peer)?;
        Ok(())
    }

    fn receive_latest(&mut self) -> Option<TelemetryFrame> {
        self.slot.take()
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.try_recv().ok()
    }

    fn link_stats(&self) -> LinkStats {
        self.slot.stats()
    }

    fn close(&mut self) {
        // Release: 停机前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.take() {
            if handle.join().is_err() {
                warn!("UDP RX thread panicked during shutdown");
            }
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solink_protocol::wire::{AckFrame, ChannelPositions, PositionPayload};
    use std::time::Instant;

    fn telemetry(sequence: u64) -> WireMessage {
        let mut channels = ChannelPositions::new();
        channels.insert("1".to_string(), 2048);
        WireMessage::Telemetry(TelemetryFrame::new(
            sequence,
            crate::time::now_unix(),
            PositionPayload::Flat(channels),
        ))
    }

    /// 轮询直到条件成立或超时
    fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if let Some(v) = poll() {
                return Some(v);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_udp_telemetry_round_trip() {
        let mut follower = UdpTransport::listen("127.0.0.1:0").unwrap();
        let follower_addr = follower.local_addr().unwrap();
        let mut leader = UdpTransport::connect("127.0.0.1:0", follower_addr).unwrap();

        leader.send(&telemetry(1)).unwrap();

        let frame = wait_for(|| follower.receive_latest()).expect("frame should arrive");
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn test_udp_ack_returns_to_sender() {
        let mut follower = UdpTransport::listen("127.0.0.1:0").unwrap();
        let follower_addr = follower.local_addr().unwrap();
        let mut leader = UdpTransport::connect("127.0.0.1:0", follower_addr).unwrap();

        // 监听端在收到首帧前不知道对端
        assert!(matches!(
            follower.send(&telemetry(0)),
            Err(TransportError::NoPeer)
        ));

        leader.send(&telemetry(1)).unwrap();
        wait_for(|| follower.receive_latest()).expect("frame should arrive");

        // 学到对端后回执原路返回
        follower
            .send(&WireMessage::Ack(AckFrame {
                sequence: 1,
                timestamp: 12.5,
                sender_id: "follower-test".to_string(),
            }))
            .unwrap();

        let event = wait_for(|| leader.poll_event()).expect("ack should arrive");
        let TransportEvent::Ack(ack) = event else {
            panic!("expected ack event");
        };
        assert_eq!(ack.sequence, 1);
    }

    #[test]
    fn test_udp_latest_wins() {
        let mut follower = UdpTransport::listen("127.0.0.1:0").unwrap();
        let follower_addr = follower.local_addr().unwrap();
        let mut leader = UdpTransport::connect("127.0.0.1:0", follower_addr).unwrap();

        for seq in 1..=5 {
            leader.send(&telemetry(seq)).unwrap();
        }

        // 等全部到达后，只应取到最后一帧
        wait_for(|| (follower.link_stats().received >= 5).then_some(()))
            .expect("all frames should arrive");
        let frame = follower.receive_latest().expect("slot should be full");
        assert_eq!(frame.sequence, 5);
        assert!(follower.receive_latest().is_none());
    }

    #[test]
    fn test_udp_close_joins_rx_thread() {
        let mut transport = UdpTransport::listen("127.0.0.1:0").unwrap();
        transport.close();
        // close 幂等
        transport.close();
    }

    #[test]
    fn test_udp_garbage_datagram_ignored() {
        let mut follower = UdpTransport::listen("127.0.0.1:0").unwrap();
        let follower_addr = follower.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not json at all", follower_addr).unwrap();

        let mut leader = UdpTransport::connect("127.0.0.1:0", follower_addr).unwrap();
        leader.send(&telemetry(7)).unwrap();

        let frame = wait_for(|| follower.receive_latest()).expect("valid frame still arrives");
        assert_eq!(frame.sequence, 7);
    }
}
