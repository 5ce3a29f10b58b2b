//! 彙總重算
//!
//! 物料彙總是批次狀態的純函數。每次重算都從批次重建，不讀取舊的快取值，
//! 因此即使減值改寫了歷史單位成本，不變式依然成立。

use rust_decimal::Decimal;
use valuation_core::{Result, ValuationError, VariantBook, VariantSummary};

/// 彙總計算器
pub struct AggregateCalculator;

impl AggregateCalculator {
    /// 由帳冊重算物料彙總
    ///
    /// 任何批次剩餘數量為負或超過原始數量時回傳狀態不一致，不做修正。
    pub fn recompute(book: &VariantBook) -> Result<VariantSummary> {
        let mut total_quantity: i64 = 0;
        let mut total_value = Decimal::ZERO;

        for batch in book.batches() {
            if let Err(err) = batch.check_quantities() {
                tracing::error!("物料 {} 彙總重算失敗: {}", book.variant_id, err);
                return Err(err);
            }
            total_quantity = total_quantity.checked_add(batch.remaining_quantity).ok_or_else(
                || ValuationError::inconsistent(format!("物料 {} 總數量溢位", book.variant_id)),
            )?;
            total_value = total_value
                .checked_add(batch.remaining_value()?)
                .ok_or_else(|| {
                    ValuationError::InvalidCost(format!("物料 {} 總價值溢位", book.variant_id))
                })?;
        }

        let average_cost = if total_quantity == 0 {
            Decimal::ZERO
        } else {
            total_value / Decimal::from(total_quantity)
        };

        Ok(VariantSummary {
            variant_id: book.variant_id.clone(),
            total_quantity,
            average_cost,
            total_value,
            batch_count: book.batches().len(),
        })
    }
}
