//! 簡單庫存估值示例
//!
//! 兩批進貨、一筆跨批次銷貨、一筆瑕疵減損，最後沖銷銷貨。

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use valuation::{
    AdjustmentReason, ConsumptionRequest, InventoryLedger, OrderContext, ValuationConfig,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== 簡單庫存估值示例 ===\n");

    let ledger = InventoryLedger::new(ValuationConfig::new().with_cost_scale(4));
    let context = OrderContext::new("PO-001".to_string(), dec!(1), 10);

    // 兩批進貨：5 @10、5 @12
    ledger.record_purchase_batch("SKU-001", 5, dec!(10), &context)?;
    ledger.record_purchase_batch("SKU-001", 5, dec!(12), &context)?;
    print_summary(&ledger, "進貨後")?;

    // 銷貨 7：5 @10 + 2 @12 = 74
    let sale = ledger.record_consumption(ConsumptionRequest::sale(
        "SKU-001".to_string(),
        7,
        "INV-001".to_string(),
    ))?;
    println!("銷貨成本: {}", sale.cogs.unwrap_or_default());
    for movement in &sale.movements {
        println!(
            "  - 批次 {} 數量 {} @ {}",
            movement.batch_id, movement.quantity, movement.unit_cost
        );
    }
    print_summary(&ledger, "銷貨後")?;

    // 瑕疵減損 1：價值保留在剩餘 2 個單位上
    ledger.record_consumption(ConsumptionRequest::adjustment(
        "SKU-001".to_string(),
        1,
        AdjustmentReason::Defect,
    ))?;
    print_summary(&ledger, "減損後")?;

    // 沖銷銷貨
    let report = ledger.reverse_transaction("INV-001")?;
    println!("沖銷回補數量: {}", report.restored_quantity());
    print_summary(&ledger, "沖銷後")?;

    let issues = ledger.audit()?;
    println!("\n稽核異常: {} 項", issues.len());

    Ok(())
}

fn print_summary(ledger: &InventoryLedger, label: &str) -> anyhow::Result<()> {
    let summary = ledger.summary("SKU-001")?;
    println!(
        "\n[{}] 數量: {}, 平均成本: {}, 總價值: {}",
        label, summary.total_quantity, summary.average_cost, summary.total_value
    );
    for batch in ledger.batches("SKU-001")? {
        println!(
            "  - 批次 #{}: 剩餘 {}/{} @ {}",
            batch.arrival_sequence, batch.remaining_quantity, batch.original_quantity, batch.unit_cost
        );
    }
    Ok(())
}
