//! 銷貨沖銷
//!
//! 找出銷貨明細的異動紀錄，將數量加回「原批次」（不另建批次，成本基礎才能保留），
//! 再刪除異動紀錄。

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuation_core::{BatchId, Result, ValuationError, VariantBook};

/// 回補紀錄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restoration {
    pub batch_id: BatchId,
    pub quantity: i64,
}

/// 沖銷計算器
pub struct ReversalCalculator;

impl ReversalCalculator {
    /// 沖銷單一銷貨明細
    ///
    /// 回傳每個批次的回補數量。明細沒有任何異動、異動不是銷貨出庫、
    /// 或原批次不存在，都屬於狀態不一致。
    pub fn reverse_line(
        book: &mut VariantBook,
        line_id: Uuid,
        expected_quantity: i64,
    ) -> Result<Vec<Restoration>> {
        let movements = book.take_movements(|m| m.belongs_to_line(line_id));

        if movements.is_empty() {
            return Err(ValuationError::inconsistent(format!(
                "物料 {} 找不到銷貨明細 {} 的異動紀錄",
                book.variant_id, line_id
            )));
        }

        let mut restorations = Vec::with_capacity(movements.len());
        let mut restored_total: i64 = 0;

        for movement in movements {
            if movement.quantity >= 0 {
                return Err(ValuationError::inconsistent(format!(
                    "銷貨異動 {} 數量應為負數，實際為 {}",
                    movement.id, movement.quantity
                )));
            }

            let quantity = movement.quantity.checked_neg().ok_or_else(|| {
                ValuationError::inconsistent(format!("銷貨異動 {} 數量溢位", movement.id))
            })?;
            let batch = book.batch_mut(movement.batch_id).ok_or_else(|| {
                ValuationError::inconsistent(format!(
                    "異動 {} 指向不存在的批次 {}",
                    movement.id, movement.batch_id
                ))
            })?;
            batch.restore(quantity)?;

            tracing::debug!(
                "沖銷: 批次 {} 回補 {}，剩餘 {}",
                batch.id,
                quantity,
                batch.remaining_quantity
            );

            restored_total = quantity
                .checked_add(restored_total)
                .ok_or_else(|| {
                    ValuationError::inconsistent(format!("銷貨明細 {} 回補合計溢位", line_id))
                })?;
            restorations.push(Restoration {
                batch_id: movement.batch_id,
                quantity,
            });
        }

        if restored_total != expected_quantity {
            return Err(ValuationError::inconsistent(format!(
                "銷貨明細 {} 數量 {} 與異動合計 {} 不符",
                line_id, expected_quantity, restored_total
            )));
        }

        Ok(restorations)
    }
}
