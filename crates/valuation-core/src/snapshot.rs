//! 帳本快照（序列化 / 還原）

use serde::{Deserialize, Serialize};

use crate::{PurchaseOrderRecord, Result, SaleTransaction, ValuationError, VariantBook};

/// 帳本快照
///
/// 不包含物料彙總：還原時一律由批次重新計算。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// 物料帳冊（依物料ID排序）
    pub books: Vec<VariantBook>,

    /// 採購單登記
    pub orders: Vec<PurchaseOrderRecord>,

    /// 銷貨交易
    pub sales: Vec<SaleTransaction>,

    /// 下一個到貨序號
    pub next_sequence: u64,
}

impl LedgerSnapshot {
    /// 序列化為 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ValuationError::inconsistent(format!("快照序列化失敗: {}", e)))
    }

    /// 由 JSON 還原
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValuationError::inconsistent(format!("快照解析失敗: {}", e)))
    }
}
