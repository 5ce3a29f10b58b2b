//! # Valuation
//!
//! 批次庫存估值帳本：採購批次到岸成本、FIFO 銷貨成本、價值保留減損與銷貨沖銷。
//!
//! 主要入口為 [`InventoryLedger`]，模型與錯誤型別來自 `valuation-core`。

pub use valuation_cache as cache;
pub use valuation_calc as calc;
pub use valuation_core as model;

pub use valuation_calc::{
    ConsumptionOutcome, InventoryLedger, IntegrityIssue, IssueSeverity, ReversalReport,
    SaleOutcome,
};
pub use valuation_core::{
    AdjustmentReason, Batch, BatchId, ConsumptionRequest, CostRounding, LedgerSnapshot, Movement,
    OrderContext, OrderLine, Result, SaleLineRequest, ValuationConfig, ValuationError,
    VariantSummary,
};
