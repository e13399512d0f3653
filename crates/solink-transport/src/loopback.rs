//! 进程内回环传输
//!
//! 一对互联端点，语义与真实传输一致（覆盖槽 + 事件队列），
//! 供测试和同机联调使用。

use crate::slot::{LatestSlot, LinkStats};
use crate::{Transport, TransportError, TransportEvent};
use crossbeam_channel::{Receiver, Sender};
use solink_protocol::wire::{TelemetryFrame, WireMessage};
use std::sync::Arc;

pub struct LoopbackTransport {
    // 本端接收
    slot: Arc<LatestSlot>,
    events_rx: Receiver<TransportEvent>,
    // 对端投递
    peer_slot: Arc<LatestSlot>,
    peer_events: Sender<TransportEvent>,
    closed: bool,
}

/// 创建一对互联端点
pub fn loopback_pair() -> (LoopbackTransport, LoopbackTransport) {
    let slot_a = Arc::new(LatestSlot::new());
    let slot_b = Arc::new(LatestSlot::new());
    let (tx_a, rx_a) = crossbeam_channel::unbounded();
    let (tx_b, rx_b) = crossbeam_channel::unbounded();

    let a = LoopbackTransport {
        slot: slot_a.clone(),
        events_rx: rx_a,
        peer_slot: slot_b.clone(),
        peer_events: tx_b,
        closed: false,
    };
    let b = LoopbackTransport {
        slot: slot_b,
        events_rx: rx_b,
        peer_slot: slot_a,
        peer_events: tx_a,
        closed: false,
    };
    (a, b)
}

impl Transport for LoopbackTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match message {
            WireMessage::Telemetry(frame) => {
                self.peer_slot.publish(frame.clone());
                Ok(())
            }
            WireMessage::Ack(ack) => self
                .peer_events
                .send(TransportEvent::Ack(ack.clone()))
                .map_err(|_| TransportError::Closed),
            WireMessage::Status(status) => self
                .peer_events
                .send(TransportEvent::Status(status.clone()))
                .map_err(|_| TransportError::Closed),
            WireMessage::Disconnect(notice) => self
                .peer_events
                .send(TransportEvent::Disconnect(notice.clone()))
                .map_err(|_| TransportError::Closed),
        }
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
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solink_protocol::wire::{AckFrame, ChannelPositions, PositionPayload};

    fn telemetry(sequence: u64) -> WireMessage {
        WireMessage::Telemetry(TelemetryFrame::new(
            sequence,
            0.0,
            PositionPayload::Flat(ChannelPositions::new()),
        ))
    }

    #[test]
    fn test_loopback_telemetry_one_way() {
        let (mut a, mut b) = loopback_pair();
        a.send(&telemetry(1)).unwrap();
        assert_eq!(b.receive_latest().unwrap().sequence, 1);
        assert!(a.receive_latest().is_none());
    }

    #[test]
    fn test_loopback_overwrites() {
        let (mut a, mut b) = loopback_pair();
        a.send(&telemetry(1)).unwrap();
        a.send(&telemetry(2)).unwrap();
        assert_eq!(b.receive_latest().unwrap().sequence, 2);
        assert!(b.receive_latest().is_none());
    }

    #[test]
    fn test_loopback_ack_event() {
        let (mut a, mut b) = loopback_pair();
        b.send(&WireMessage::Ack(AckFrame {
            sequence: 9,
            timestamp: 1.0,
            sender_id: "b".to_string(),
        }))
        .unwrap();
        let TransportEvent::Ack(ack) = a.poll_event().unwrap() else {
            panic!("expected ack");
        };
        assert_eq!(ack.sequence, 9);
    }

    #[test]
    fn test_loopback_closed_rejects_send() {
        let (mut a, _b) = loopback_pair();
        a.close();
        assert!(matches!(a.send(&telemetry(1)), Err(TransportError::Closed)));
    }
}
