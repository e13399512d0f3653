//! 状态显示线程（≈2 Hz）
//!
//! 只读 ArcSwap 快照，绝不触碰硬件。

use arc_swap::ArcSwap;
use solink_engine::stats::{FollowerStatus, LeaderStatus};
use solink_engine::ShutdownToken;
use solink_transport::time::now_unix;
use std::sync::Arc;
use std::time::Duration;

/// 显示周期
const DISPLAY_PERIOD: Duration = Duration::from_millis(500);

/// 超过该秒数的从动状态视为失联
const FOLLOWER_STALE_S: f64 = 5.0;

pub fn spawn_leader_display(status: Arc<ArcSwap<LeaderStatus>>, token: ShutdownToken) {
    std::thread::Builder::new()
        .name("solink-display".to_string())
        .spawn(move || {
            while !token.is_requested() {
                render_leader(&status.load());
                std::thread::sleep(DISPLAY_PERIOD);
            }
        })
        .ok();
}

pub fn spawn_follower_display(status: Arc<ArcSwap<FollowerStatus>>, token: ShutdownToken) {
    std::thread::Builder::new()
        .name("solink-display".to_string())
        .spawn(move || {
            while !token.is_requested() {
                render_follower(&status.load());
                std::thread::sleep(DISPLAY_PERIOD);
            }
        })
        .ok();
}

fn render_leader(status: &LeaderStatus) {
    print!("\x1B[2J\x1B[H");
    println!("=== LEADER TELEOPERATION ===");
    println!("State: {:?}", status.state);
    println!();

    println!("Current Mapping:");
    for (leader, follower) in &status.mapping {
        println!("  {leader} -> {follower}");
    }
    println!();

    println!("Network Statistics:");
    let network = &status.network;
    if network.acked > 0 {
        println!("  Average Latency: {:6.1}ms", network.avg_latency_ms);
        println!("  Max Latency:     {:6.1}ms", network.max_latency_ms);
    } else {
        println!("  Network Latency: no acks received yet");
    }
    println!("  Packet Loss:     {:6.1}%", network.packet_loss * 100.0);
    println!("  Messages Sent:   {:6}", network.sent);
    println!("  Publish Rate:    {:6.1} Hz", status.publish_hz);
    println!();

    println!("Follower Status:");
    let now = now_unix();
    for follower in &status.followers {
        let age = now - follower.last_seen;
        if age < FOLLOWER_STALE_S {
            println!(
                "  {}: connected, {} motors active",
                follower.follower_id, follower.motors_active
            );
        } else {
            println!("  {}: last seen {age:.0}s ago", follower.follower_id);
        }
    }
    println!();
    println!("Type 's' + Enter to switch mapping, Ctrl+C to stop");
}

fn render_follower(status: &FollowerStatus) {
    print!("\x1B[2J\x1B[H");
    println!("=== FOLLOWER TELEOPERATION ===");
    println!("State: {:?}", status.state);
    println!();

    println!("Link Statistics:");
    println!("  Received:        {:6}", status.link.received);
    println!("  Dropped (gaps):  {:6}", status.link.dropped);
    println!("  Stale rejected:  {:6}", status.stale_drops);
    println!("  Applied frames:  {:6}", status.applied_frames);
    println!("  Last Latency:    {:6.1}ms", status.last_latency_ms);
    println!("  Update Rate:     {:6.1} Hz", status.update_hz);
    if status.gripper_clogged {
        println!("  Gripper:         CLOGGED (force limited)");
    }

    match status.link.age_s(solink_transport::time::now_unix_ms()) {
        Some(age) if age < 1.0 => println!("  Status:          connected"),
        Some(age) if age < 5.0 => println!("  Status:          slow (last data {age:.1}s ago)"),
        Some(age) => println!("  Status:          disconnected (last data {age:.1}s ago)"),
        None => println!("  Status:          waiting for data"),
    }
    println!();
    println!("Ctrl+C to stop");
}
