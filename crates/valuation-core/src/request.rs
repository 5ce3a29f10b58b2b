//! 消耗請求

use serde::{Deserialize, Serialize};

use crate::{AdjustmentReason, Result, ValuationError};

/// 消耗用途
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionPurpose {
    /// 銷貨（計算銷貨成本）
    Sale { invoice_ref: String },
    /// 減損調整（價值重分配）
    Adjustment { reason: AdjustmentReason },
}

/// 消耗請求（不落地，作為 FIFO 引擎的工作單位）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRequest {
    /// 物料ID
    pub variant_id: String,

    /// 數量
    pub quantity: i64,

    /// 用途
    pub purpose: ConsumptionPurpose,
}

impl ConsumptionRequest {
    /// 創建銷貨請求
    pub fn sale(variant_id: String, quantity: i64, invoice_ref: String) -> Self {
        Self {
            variant_id,
            quantity,
            purpose: ConsumptionPurpose::Sale { invoice_ref },
        }
    }

    /// 創建減損請求
    pub fn adjustment(variant_id: String, quantity: i64, reason: AdjustmentReason) -> Self {
        Self {
            variant_id,
            quantity,
            purpose: ConsumptionPurpose::Adjustment { reason },
        }
    }

    /// 檢查數量必須為正
    pub fn validate(&self) -> Result<()> {
        if self.quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(self.quantity));
        }
        Ok(())
    }

    /// 是否為銷貨
    pub fn is_sale(&self) -> bool {
        matches!(self.purpose, ConsumptionPurpose::Sale { .. })
    }
}

/// 多明細銷貨中的單一明細請求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub variant_id: String,
    pub quantity: i64,
}

impl SaleLineRequest {
    pub fn new(variant_id: String, quantity: i64) -> Self {
        Self {
            variant_id,
            quantity,
        }
    }
}
