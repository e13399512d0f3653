//! 时间戳工具
//!
//! 线上消息统一使用 unix 秒（f64）。延迟类运算优先使用单调时钟，
//! 只有跨进程比较才使用墙钟。

use std::time::{SystemTime, UNIX_EPOCH};

/// 当前墙钟时间（unix 秒）
pub fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// 当前墙钟时间（unix 毫秒，整数）
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 帧龄（毫秒）：`(now - frame_timestamp) * 1000`
pub fn age_ms(frame_timestamp: f64) -> f64 {
    (now_unix() - frame_timestamp) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_unix_is_recent() {
        // 2020 年以后
        assert!(now_unix() > 1_577_836_800.0);
    }

    #[test]
    fn test_age_ms_of_fresh_timestamp() {
        let age = age_ms(now_unix());
        assert!(age >= 0.0 && age < 100.0);
    }

    #[test]
    fn test_age_ms_of_old_timestamp() {
        let age = age_ms(now_unix() - 0.3);
        assert!(age > 290.0 && age < 400.0);
    }
}
