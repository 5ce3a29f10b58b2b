//! 到岸成本計算
//!
//! 單位成本 = 原幣單價 × 匯率 + 每單位運費 + 每單位付款差額
//!
//! 運費與付款差額一律按「單位」分攤，而非按批次，多品項採購單的捨入誤差才會平均分散。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use valuation_core::{Batch, OrderContext, Result, ValuationConfig, ValuationError};

/// 到岸成本計算結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandedCost {
    /// 到岸單位成本
    pub unit_cost: Decimal,
    /// 每單位運費分攤
    pub freight_per_unit: Decimal,
    /// 每單位付款差額分攤
    pub gap_per_unit: Decimal,
}

/// 採購單彙總（由已登記批次推導）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    /// 總數量 = Σ 原始數量
    pub total_quantity: i64,
    /// 名目總額 = Σ(原幣單價 × 匯率 × 原始數量)
    pub nominal_total: Decimal,
}

impl OrderTotals {
    /// 由採購單的所有批次計算
    pub fn from_batches<'a>(batches: impl IntoIterator<Item = &'a Batch>) -> Result<Self> {
        let mut totals = Self {
            total_quantity: 0,
            nominal_total: Decimal::ZERO,
        };
        for batch in batches {
            totals.total_quantity = totals
                .total_quantity
                .checked_add(batch.original_quantity)
                .ok_or(ValuationError::InvalidQuantity(batch.original_quantity))?;
            totals.nominal_total = batch
                .source_unit_price
                .checked_mul(batch.exchange_rate)
                .and_then(|v| v.checked_mul(Decimal::from(batch.original_quantity)))
                .and_then(|v| totals.nominal_total.checked_add(v))
                .ok_or_else(|| {
                    ValuationError::InvalidCost(format!("批次 {} 名目金額溢位", batch.id))
                })?;
        }
        Ok(totals)
    }
}

/// 到岸成本計算器
pub struct LandedCostCalculator;

impl LandedCostCalculator {
    /// 建立批次時計算到岸成本
    pub fn calculate(
        source_unit_price: Decimal,
        context: &OrderContext,
        config: &ValuationConfig,
    ) -> Result<LandedCost> {
        Self::validate_price(source_unit_price, context.exchange_rate)?;

        let (freight_per_unit, gap_per_unit) = Self::per_unit_shares(
            context.total_quantity,
            context.freight_fee,
            context.payment_gap()?,
            config,
        )?;

        Self::compose(
            source_unit_price,
            context.exchange_rate,
            freight_per_unit,
            gap_per_unit,
            Decimal::ONE,
            config,
        )
    }

    /// 計算每單位運費與付款差額分攤
    pub fn per_unit_shares(
        total_quantity: i64,
        freight_fee: Decimal,
        payment_gap: Decimal,
        config: &ValuationConfig,
    ) -> Result<(Decimal, Decimal)> {
        if total_quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(total_quantity));
        }
        if freight_fee < Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "運費不可為負: {}",
                freight_fee
            )));
        }

        let quantity = Decimal::from(total_quantity);
        let freight_per_unit = config.round_cost(freight_fee / quantity);
        // 付款差額可正可負（多付手續費 / 折讓）
        let gap_per_unit = config.round_cost(payment_gap / quantity);

        Ok((freight_per_unit, gap_per_unit))
    }

    /// 物流結算後重新計算單一批次的成本
    ///
    /// 覆寫批次的單位成本與分攤欄位，已出庫的異動紀錄不受影響。
    /// 減損累計的倍率照樣套用；結果為負（付款差額過大）時拒絕，批次不變。
    pub fn reprice(
        batch: &mut Batch,
        freight_per_unit: Decimal,
        gap_per_unit: Decimal,
        config: &ValuationConfig,
    ) -> Result<LandedCost> {
        let landed = Self::compose(
            batch.source_unit_price,
            batch.exchange_rate,
            freight_per_unit,
            gap_per_unit,
            batch.value_factor,
            config,
        )?;
        if landed.unit_cost < Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "批次 {} 重新計價後單位成本為負: {}",
                batch.id, landed.unit_cost
            )));
        }
        // 剩餘數量不超過原始數量，原始數量的價值可表示即足夠
        if Decimal::from(batch.original_quantity)
            .checked_mul(landed.unit_cost)
            .is_none()
        {
            return Err(ValuationError::InvalidCost(format!(
                "批次 {} 重新計價後價值溢位",
                batch.id
            )));
        }

        tracing::debug!(
            "批次 {} 重新計價: {} → {} (運費 {}, 差額 {})",
            batch.id,
            batch.unit_cost,
            landed.unit_cost,
            freight_per_unit,
            gap_per_unit
        );

        batch.unit_cost = landed.unit_cost;
        batch.freight_per_unit = landed.freight_per_unit;
        batch.gap_per_unit = landed.gap_per_unit;
        Ok(landed)
    }

    /// 驗證單價與匯率
    pub fn validate_price(source_unit_price: Decimal, exchange_rate: Decimal) -> Result<()> {
        if exchange_rate <= Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "匯率必須大於零: {}",
                exchange_rate
            )));
        }
        if source_unit_price < Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "單價不可為負: {}",
                source_unit_price
            )));
        }
        Ok(())
    }

    fn compose(
        source_unit_price: Decimal,
        exchange_rate: Decimal,
        freight_per_unit: Decimal,
        gap_per_unit: Decimal,
        value_factor: Decimal,
        config: &ValuationConfig,
    ) -> Result<LandedCost> {
        let unit_cost = source_unit_price
            .checked_mul(exchange_rate)
            .and_then(|v| v.checked_add(freight_per_unit))
            .and_then(|v| v.checked_add(gap_per_unit))
            .and_then(|v| v.checked_mul(value_factor))
            .ok_or_else(|| {
                ValuationError::InvalidCost(format!(
                    "到岸成本溢位: {} × {}",
                    source_unit_price, exchange_rate
                ))
            })?;

        Ok(LandedCost {
            unit_cost: config.round_cost(unit_cost),
            freight_per_unit,
            gap_per_unit,
        })
    }
}
