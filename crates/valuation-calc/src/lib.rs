//! # Valuation Calculation Engine
//!
//! 批次庫存估值引擎：到岸成本、FIFO 出庫、價值保留減損、銷貨沖銷、彙總重算，
//! 以及把它們包成交易單位的 `InventoryLedger`。

pub mod aggregate;
pub mod audit;
pub mod fifo;
pub mod landed_cost;
pub mod ledger;
pub mod reversal;
pub mod write_down;

// Re-export 主要類型
pub use aggregate::AggregateCalculator;
pub use audit::IntegrityAuditor;
pub use fifo::{Consumption, FifoCalculator};
pub use landed_cost::{LandedCost, LandedCostCalculator, OrderTotals};
pub use ledger::InventoryLedger;
pub use reversal::{Restoration, ReversalCalculator};
pub use write_down::WriteDownCalculator;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuation_core::{Movement, VariantSummary};

/// 消耗結果（`record_consumption` 回傳）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionOutcome {
    /// 銷貨成本（減損時為 None）
    pub cogs: Option<Decimal>,

    /// 本次產生的異動紀錄
    pub movements: Vec<Movement>,

    /// 操作後的物料彙總
    pub summary: VariantSummary,
}

/// 銷貨明細結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineOutcome {
    pub line_id: Uuid,
    pub variant_id: String,
    pub quantity: i64,
    pub cogs: Decimal,
    pub movements: Vec<Movement>,
}

/// 銷貨結果（`record_sale` 回傳）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOutcome {
    /// 發票號碼
    pub invoice_ref: String,

    /// 本次新增的明細
    pub lines: Vec<SaleLineOutcome>,

    /// 操作後涉及物料的彙總
    pub summaries: Vec<VariantSummary>,
}

impl SaleOutcome {
    /// 本次新增明細的銷貨成本合計
    pub fn total_cogs(&self) -> Decimal {
        self.lines.iter().map(|l| l.cogs).sum()
    }
}

/// 沖銷報告（`reverse_transaction` 回傳）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalReport {
    /// 發票號碼
    pub invoice_ref: String,

    /// 回補紀錄
    pub restorations: Vec<Restoration>,

    /// 操作後涉及物料的彙總
    pub summaries: Vec<VariantSummary>,
}

impl ReversalReport {
    /// 回補數量合計
    pub fn restored_quantity(&self) -> i64 {
        self.restorations.iter().map(|r| r.quantity).sum()
    }
}

/// 稽核發現
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub variant_id: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl IntegrityIssue {
    pub fn new(variant_id: String, message: String, severity: IssueSeverity) -> Self {
        Self {
            variant_id,
            message,
            severity,
        }
    }

    pub fn warning(variant_id: String, message: String) -> Self {
        Self::new(variant_id, message, IssueSeverity::Warning)
    }

    pub fn error(variant_id: String, message: String) -> Self {
        Self::new(variant_id, message, IssueSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    Warning,
    Error,
}
