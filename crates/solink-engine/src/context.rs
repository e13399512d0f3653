//! 运行时上下文与协作式停机
//!
//! 取代模块级全局标志：上下文在启动时构造、显式传递。
//! 取消是协作式的——各环在本轮迭代结束后检查标志，
//! 然后执行自己的停机序列（关扭矩、退订、断开），绝不强杀。

use crate::config::{SafetyConfig, TeleopConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 进程级停机令牌（克隆共享）
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停机（信号处理器/操作员调用）
    pub fn request(&self) {
        // Release: 请求前的写入对看到 true 的环可见
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 运行时上下文
///
/// 启动时构造一次，借给各控制环。
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub shutdown: ShutdownToken,
    pub teleop: TeleopConfig,
    pub safety: SafetyConfig,
}

impl RuntimeContext {
    pub fn new(teleop: TeleopConfig, safety: SafetyConfig) -> Self {
        Self {
            shutdown: ShutdownToken::new(),
            teleop,
            safety,
        }
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(TeleopConfig::default(), SafetyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_token_shared_across_clones() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        assert!(!clone.is_requested());
        token.request();
        assert!(clone.is_requested());
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RuntimeContext::default();
        assert!(!ctx.shutdown.is_requested());
        assert_eq!(ctx.teleop.target_hz, 60.0);
        assert_eq!(ctx.safety.max_latency_ms, 200.0);
    }
}
