//! FIFO 出庫計算
//!
//! 依到貨序號由舊到新扣減批次，累計銷貨成本並產生異動紀錄。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use valuation_core::{Movement, MovementKind, Result, ValuationError, VariantBook};

/// 單一批次的扣減計畫
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// 批次在帳冊中的索引
    pub index: usize,
    /// 扣減數量
    pub taken: i64,
}

/// 出庫結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    /// 銷貨成本 = Σ(扣減數量 × 批次單位成本)
    pub cogs: Decimal,
    /// 本次產生的異動紀錄
    pub movements: Vec<Movement>,
}

/// FIFO 計算器
pub struct FifoCalculator;

impl FifoCalculator {
    /// 規劃 FIFO 扣減（不修改帳冊）
    ///
    /// 全有或全無：可用數量不足時直接回傳庫存不足，不產生部分計畫。
    pub fn allocate(book: &VariantBook, quantity: i64) -> Result<Vec<Allocation>> {
        if quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }

        let available = book.available_quantity()?;
        if available < quantity {
            return Err(ValuationError::InsufficientStock {
                variant_id: book.variant_id.clone(),
                requested: quantity,
                available,
            });
        }

        let mut allocations = Vec::new();
        let mut still_needed = quantity;

        for index in book.fifo_indices() {
            if still_needed == 0 {
                break;
            }

            let remaining = book.batches()[index].remaining_quantity;
            if remaining <= 0 {
                continue;
            }

            let taken = still_needed.min(remaining);
            allocations.push(Allocation { index, taken });
            still_needed -= taken;
        }

        if still_needed > 0 {
            // 可用數量檢查已通過，仍有缺口代表批次資料異常
            return Err(ValuationError::inconsistent(format!(
                "物料 {} FIFO 扣減後仍缺 {}",
                book.variant_id, still_needed
            )));
        }

        Ok(allocations)
    }

    /// 執行銷貨出庫
    pub fn consume(book: &mut VariantBook, quantity: i64, kind: MovementKind) -> Result<Consumption> {
        let allocations = Self::allocate(book, quantity)?;

        let mut cogs = Decimal::ZERO;
        let mut movements = Vec::with_capacity(allocations.len());

        for Allocation { index, taken } in allocations {
            let batch = &mut book.batches_mut()[index];
            batch.take(taken)?;
            cogs = batch
                .value_of(taken)?
                .checked_add(cogs)
                .ok_or_else(|| {
                    ValuationError::InvalidCost(format!("物料 {} 銷貨成本溢位", batch.variant_id))
                })?;

            tracing::debug!(
                "FIFO 扣減: 批次 {} (序號 {}) 取 {} @ {}，剩餘 {}",
                batch.id,
                batch.arrival_sequence,
                taken,
                batch.unit_cost,
                batch.remaining_quantity
            );

            movements.push(Movement::outbound(
                batch.id,
                batch.variant_id.clone(),
                taken,
                batch.unit_cost,
                kind.clone(),
            ));
        }

        book.append_movements(movements.iter().cloned());

        Ok(Consumption { cogs, movements })
    }
}
