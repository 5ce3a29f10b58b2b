//! 物料彙總快取
//!
//! 彙總是批次狀態的索引：只由彙總重算寫入，每次以整筆取代，不做增量修改。
//! 鎖損毀時與帳冊鎖一致，回報狀態不一致而不沿用可能只寫了一半的資料。

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use valuation_core::{Result, ValuationError, VariantSummary};

/// 物料彙總快取
#[derive(Debug, Default)]
pub struct SummaryCache {
    summaries: RwLock<HashMap<String, VariantSummary>>,
}

impl SummaryCache {
    /// 創建空快取
    pub fn new() -> Self {
        Self::default()
    }

    /// 查詢物料彙總
    pub fn get(&self, variant_id: &str) -> Result<Option<VariantSummary>> {
        Ok(self.read()?.get(variant_id).cloned())
    }

    /// 在同一個寫鎖內取代多筆彙總，讀者不會看到部分更新
    pub fn replace_all(&self, summaries: impl IntoIterator<Item = VariantSummary>) -> Result<()> {
        let mut guard = self.write()?;
        for summary in summaries {
            guard.insert(summary.variant_id.clone(), summary);
        }
        Ok(())
    }

    /// 僅在物料尚未登記時插入
    pub fn insert_if_absent(&self, summary: VariantSummary) -> Result<bool> {
        let mut guard = self.write()?;
        if guard.contains_key(&summary.variant_id) {
            return Ok(false);
        }
        guard.insert(summary.variant_id.clone(), summary);
        Ok(true)
    }

    /// 所有彙總（依物料ID排序）
    pub fn all(&self) -> Result<Vec<VariantSummary>> {
        let mut summaries: Vec<VariantSummary> = self.read()?.values().cloned().collect();
        summaries.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));
        Ok(summaries)
    }

    /// 全部庫存總價值
    pub fn total_value(&self) -> Result<Decimal> {
        self.read()?
            .values()
            .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s.total_value))
            .ok_or_else(|| ValuationError::InvalidCost("庫存總價值溢位".to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, VariantSummary>>> {
        self.summaries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, VariantSummary>>> {
        self.summaries.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> ValuationError {
    ValuationError::inconsistent("彙總快取鎖已損毀")
}
