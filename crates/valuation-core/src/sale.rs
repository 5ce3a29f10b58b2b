//! 銷貨交易模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 銷貨明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    /// 明細ID
    pub line_id: Uuid,

    /// 物料ID
    pub variant_id: String,

    /// 銷貨數量
    pub quantity: i64,

    /// 銷貨成本
    pub cogs: Decimal,
}

/// 銷貨交易（以發票號碼識別）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTransaction {
    /// 發票號碼
    pub invoice_ref: String,

    /// 明細
    pub lines: Vec<SaleLine>,

    /// 建立時間
    pub recorded_at: DateTime<Utc>,
}

impl SaleTransaction {
    /// 創建新的銷貨交易
    pub fn new(invoice_ref: String) -> Self {
        Self {
            invoice_ref,
            lines: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// 添加明細
    pub fn add_line(&mut self, line: SaleLine) {
        self.lines.push(line);
    }

    /// 交易總銷貨成本
    pub fn total_cogs(&self) -> Decimal {
        self.lines.iter().map(|l| l.cogs).sum()
    }

    /// 涉及的物料（排序、去重）
    pub fn variant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lines.iter().map(|l| l.variant_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sale_transaction_totals() {
        let mut sale = SaleTransaction::new("INV-001".to_string());
        sale.add_line(SaleLine {
            line_id: Uuid::new_v4(),
            variant_id: "SKU-B".to_string(),
            quantity: 2,
            cogs: dec!(24),
        });
        sale.add_line(SaleLine {
            line_id: Uuid::new_v4(),
            variant_id: "SKU-A".to_string(),
            quantity: 7,
            cogs: dec!(74),
        });

        assert_eq!(sale.total_cogs(), dec!(98));
        assert_eq!(sale.variant_ids(), vec!["SKU-A".to_string(), "SKU-B".to_string()]);
    }
}
