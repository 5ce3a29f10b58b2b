//! 髒標記追蹤
//!
//! 一次操作中被修改的物料先標記為髒，提交前統一重算彙總。

use std::collections::BTreeSet;

/// 髒標記追蹤器
#[derive(Debug, Default)]
pub struct DirtyTracker {
    dirty_variants: BTreeSet<String>,
}

impl DirtyTracker {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self::default()
    }

    /// 標記物料為髒
    pub fn mark_dirty(&mut self, variant_id: &str) {
        if !self.dirty_variants.contains(variant_id) {
            self.dirty_variants.insert(variant_id.to_string());
        }
    }

    /// 檢查物料是否為髒
    pub fn is_dirty(&self, variant_id: &str) -> bool {
        self.dirty_variants.contains(variant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_dirty() {
        let mut tracker = DirtyTracker::new();
        assert!(!tracker.is_dirty("SKU-A"));

        tracker.mark_dirty("SKU-B");
        tracker.mark_dirty("SKU-A");
        tracker.mark_dirty("SKU-B");

        assert!(tracker.is_dirty("SKU-A"));
        assert!(tracker.is_dirty("SKU-B"));
        assert!(!tracker.is_dirty("SKU-C"));
        assert_eq!(tracker.dirty_variants.len(), 2);
    }
}
