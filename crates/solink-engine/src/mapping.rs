//! 主动臂 → 从动臂映射表
//!
//! 纯值类型，不掺任何键盘/IO 逻辑；切换由外部协作者触发。
//! 不变量：映射在当前连接的主动臂集合上是全射的双射——
//! 定义域和值域等长，`switch` 必须保持这一点。

use std::collections::BTreeMap;
use tracing::{info, warn};

/// 映射表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    map: BTreeMap<String, String>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建立一条主动臂 → 从动臂指派
    pub fn assign(&mut self, leader_id: impl Into<String>, follower_id: impl Into<String>) {
        self.map.insert(leader_id.into(), follower_id.into());
    }

    /// 查询某主动臂对应的从动臂
    pub fn resolve(&self, leader_id: &str) -> Option<&str> {
        self.map.get(leader_id).map(String::as_str)
    }

    /// 交换两条指派
    ///
    /// 只对恰好 2×2 的情形有定义；其余规模拒绝（告警 + 不变）。
    /// 对合性质：连续两次 `switch` 恢复原映射。
    pub fn switch(&mut self) -> bool {
        if self.map.len() != 2 {
            warn!(
                "Cannot switch mapping: need exactly 2 assignments, have {}",
                self.map.len()
            );
            return false;
        }
        let leaders: Vec<String> = self.map.keys().cloned().collect();
        let followers: Vec<String> = self.map.values().cloned().collect();
        self.map.insert(leaders[0].clone(), followers[1].clone());
        self.map.insert(leaders[1].clone(), followers[0].clone());
        info!("Mapping switched: {:?}", self.map);
        true
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pairs() -> MappingTable {
        let mut mapping = MappingTable::new();
        mapping.assign("Leader1", "Follower1");
        mapping.assign("Leader2", "Follower2");
        mapping
    }

    #[test]
    fn test_assign_and_resolve() {
        let mapping = two_pairs();
        assert_eq!(mapping.resolve("Leader1"), Some("Follower1"));
        assert_eq!(mapping.resolve("Leader2"), Some("Follower2"));
        assert_eq!(mapping.resolve("Leader3"), None);
    }

    #[test]
    fn test_switch_swaps_assignments() {
        let mut mapping = two_pairs();
        assert!(mapping.switch());
        assert_eq!(mapping.resolve("Leader1"), Some("Follower2"));
        assert_eq!(mapping.resolve("Leader2"), Some("Follower1"));
    }

    #[test]
    fn test_switch_is_involution() {
        let mut mapping = two_pairs();
        let original = mapping.clone();
        mapping.switch();
        mapping.switch();
        assert_eq!(mapping, original);
    }

    #[test]
    fn test_switch_rejected_for_single_pair() {
        let mut mapping = MappingTable::new();
        mapping.assign("Leader1", "Follower1");
        assert!(!mapping.switch());
        assert_eq!(mapping.resolve("Leader1"), Some("Follower1"));
    }

    #[test]
    fn test_switch_rejected_for_empty() {
        let mut mapping = MappingTable::new();
        assert!(!mapping.switch());
    }

    #[test]
    fn test_switch_rejected_for_three_pairs() {
        let mut mapping = two_pairs();
        mapping.assign("Leader3", "Follower3");
        let before = mapping.clone();
        assert!(!mapping.switch());
        assert_eq!(mapping, before);
    }
}
