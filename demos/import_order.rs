//! 進口採購單示例
//!
//! 外幣採購單入庫時先以預估運費計價，物流結算後以實際運費與實付金額重新計價，
//! 最後輸出 JSON 快照。

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use valuation::{InventoryLedger, OrderContext, OrderLine, SaleLineRequest, ValuationConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== 進口採購單示例 ===\n");

    let ledger = InventoryLedger::new(ValuationConfig::new().with_cost_scale(4));

    // 採購單 PO-2025-01：匯率 4.5，預估運費 40
    let lines = [
        ("FRAME-001", OrderLine::new(10, dec!(20))),
        ("WHEEL-001", OrderLine::new(30, dec!(6))),
    ];
    let order_lines: Vec<OrderLine> = lines.iter().map(|(_, line)| *line).collect();
    let context = OrderContext::from_lines("PO-2025-01".to_string(), dec!(4.5), &order_lines)?
        .with_freight_fee(dec!(40));

    println!("採購單 {} 名目總額: {:?}", context.order_id, context.nominal_total);
    for (sku, line) in &lines {
        ledger.record_purchase_batch(sku, line.quantity, line.source_unit_price, &context)?;
    }
    print_summaries(&ledger, "入庫（預估運費）")?;

    // 結算前先出貨
    let sale = ledger.record_sale(
        "INV-2025-01",
        &[
            SaleLineRequest::new("FRAME-001".to_string(), 2),
            SaleLineRequest::new("WHEEL-001".to_string(), 4),
        ],
    )?;
    println!("\n發票 {} 銷貨成本: {}", sale.invoice_ref, sale.total_cogs());

    // 物流結算：實際運費 100，實付 1,560（含匯差與手續費）
    ledger.finalize_order_logistics("PO-2025-01", dec!(100), dec!(1560))?;
    print_summaries(&ledger, "物流結算後")?;

    let record = ledger.purchase_order("PO-2025-01")?;
    println!(
        "\n採購單已結算: {}，運費 {}，實付 {:?}",
        record.finalized, record.freight_fee, record.paid_total
    );
    println!("庫存總價值: {}", ledger.inventory_value()?);

    let snapshot = ledger.snapshot()?;
    println!("\n快照:\n{}", snapshot.to_json()?);

    Ok(())
}

fn print_summaries(ledger: &InventoryLedger, label: &str) -> anyhow::Result<()> {
    println!("\n[{}]", label);
    for summary in ledger.summaries()? {
        println!(
            "  - {}: 數量 {}, 平均成本 {}, 總價值 {}",
            summary.variant_id, summary.total_quantity, summary.average_cost, summary.total_value
        );
    }
    Ok(())
}
