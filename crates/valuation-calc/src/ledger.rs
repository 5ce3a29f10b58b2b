//! 庫存帳本
//!
//! 把到岸成本、FIFO 出庫、減損、沖銷與彙總重算包成交易單位。
//!
//! 每個物料的帳冊各自一把鎖；操作依 SKU 升冪順序鎖定涉及的帳冊，
//! 在複本上執行計算與彙總重算，全部成功才寫回帳冊、彙總快取與登記簿。
//! 登記簿（銷貨、採購單）的鎖一律在帳冊鎖之後取得；
//! 寫回順序為：驗證登記簿、寫入彙總快取、寫回帳冊、最後更新登記簿，
//! 會失敗的步驟都在任何狀態改變之前。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rust_decimal::Decimal;
use uuid::Uuid;
use valuation_cache::{DirtyTracker, SummaryCache};
use valuation_core::{
    Batch, BatchId, ConsumptionPurpose, ConsumptionRequest, LedgerSnapshot, Movement,
    MovementKind, OrderContext, PurchaseOrderRecord, Result, SaleLine, SaleLineRequest,
    SaleTransaction, ValuationConfig, ValuationError, VariantBook, VariantSummary,
};

use crate::{
    AggregateCalculator, ConsumptionOutcome, FifoCalculator, IntegrityAuditor, IntegrityIssue,
    LandedCostCalculator, OrderTotals, ReversalCalculator, ReversalReport, SaleLineOutcome,
    SaleOutcome, WriteDownCalculator,
};

type BookHandle = Arc<Mutex<VariantBook>>;

/// 庫存估值帳本
pub struct InventoryLedger {
    config: ValuationConfig,
    books: RwLock<HashMap<String, BookHandle>>,
    summaries: SummaryCache,
    orders: Mutex<HashMap<String, PurchaseOrderRecord>>,
    sales: Mutex<HashMap<String, SaleTransaction>>,
    next_sequence: AtomicU64,
}

impl InventoryLedger {
    /// 創建空帳本
    pub fn new(config: ValuationConfig) -> Self {
        Self {
            config,
            books: RwLock::new(HashMap::new()),
            summaries: SummaryCache::new(),
            orders: Mutex::new(HashMap::new()),
            sales: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// 登記物料（已存在時回傳現有彙總）
    pub fn register_variant(&self, variant_id: &str) -> Result<VariantSummary> {
        let (_, created) = self.ensure_book(variant_id)?;
        if created {
            tracing::info!("登記物料 {}", variant_id);
        }
        self.summary(variant_id)
    }

    /// 登記採購批次
    ///
    /// 依採購單資訊計算到岸成本，建立新批次並重算物料彙總。
    /// 物料不存在時自動建立；採購單已結算時拒絕新增。
    pub fn record_purchase_batch(
        &self,
        variant_id: &str,
        quantity: i64,
        source_unit_price: Decimal,
        context: &OrderContext,
    ) -> Result<BatchId> {
        if quantity <= 0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }
        let landed = LandedCostCalculator::calculate(source_unit_price, context, &self.config)?;
        // 序號在鎖定帳冊後才取得
        let mut batch = Batch::new(variant_id.to_string(), quantity, landed.unit_cost, 0)?
            .with_order_id(context.order_id.clone())
            .with_source_price(source_unit_price, context.exchange_rate)
            .with_allocations(landed.freight_per_unit, landed.gap_per_unit);
        let batch_id = batch.id;

        // 先檢查一次，避免為注定失敗的請求建立物料
        if self.order_is_finalized(&context.order_id)? {
            return Err(finalized_conflict(&context.order_id));
        }

        let (handle, _) = self.ensure_book(variant_id)?;
        let handles = [handle];
        let mut guards = lock_books(&handles)?;
        let mut staging = Staging::from_guards(&guards);

        let book = staging.book_mut(variant_id)?;
        book.available_quantity()?
            .checked_add(quantity)
            .ok_or(ValuationError::InvalidQuantity(quantity))?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        batch.arrival_sequence = sequence;
        book.push_batch(batch)?;
        let sealed = staging.seal()?;

        let mut orders = lock_registry(&self.orders, "採購單")?;
        if orders
            .get(&context.order_id)
            .is_some_and(|record| record.finalized)
        {
            return Err(finalized_conflict(&context.order_id));
        }

        sealed.apply(&mut guards, &self.summaries)?;

        let record = orders
            .entry(context.order_id.clone())
            .or_insert_with(|| PurchaseOrderRecord::new(context.order_id.clone()));
        record.add_batch(variant_id.to_string(), batch_id);
        record.freight_fee = context.freight_fee;
        record.paid_total = context.paid_total;

        tracing::info!(
            "採購入庫: 物料 {} 批次 {} (序號 {}) 數量 {} @ {}，採購單 {}",
            variant_id,
            batch_id,
            sequence,
            quantity,
            landed.unit_cost,
            context.order_id
        );

        Ok(batch_id)
    }

    /// 物流結算
    ///
    /// 以最終運費與實付總額重新計算採購單內每個批次的到岸成本，
    /// 並重算所有受影響物料的彙總。可重複結算，以最後一次為準。
    pub fn finalize_order_logistics(
        &self,
        order_id: &str,
        freight_fee: Decimal,
        paid_total: Decimal,
    ) -> Result<Vec<VariantSummary>> {
        if paid_total < Decimal::ZERO {
            return Err(ValuationError::InvalidCost(format!(
                "實付總額不可為負: {}",
                paid_total
            )));
        }

        for attempt in 0..=self.config.max_lock_retries {
            let expected = {
                let orders = lock_registry(&self.orders, "採購單")?;
                orders
                    .get(order_id)
                    .map(|record| record.batches.clone())
                    .ok_or_else(|| ValuationError::not_found(format!("採購單 {}", order_id)))?
            };

            let variant_ids: Vec<String> = expected.iter().map(|(v, _)| v.clone()).collect();
            let handles = self.handles(&variant_ids).map_err(missing_as_inconsistent)?;
            let mut guards = lock_books(&handles)?;
            let mut staging = Staging::from_guards(&guards);

            let order_batches = expected
                .iter()
                .map(|(variant_id, batch_id)| staging.batch(variant_id, *batch_id).cloned())
                .collect::<Result<Vec<Batch>>>()?;
            let totals = OrderTotals::from_batches(&order_batches)?;
            let payment_gap = paid_total.checked_sub(totals.nominal_total).ok_or_else(|| {
                ValuationError::InvalidCost(format!("採購單 {} 付款差額溢位", order_id))
            })?;

            let (freight_per_unit, gap_per_unit) = LandedCostCalculator::per_unit_shares(
                totals.total_quantity,
                freight_fee,
                payment_gap,
                &self.config,
            )?;

            for (variant_id, batch_id) in &expected {
                let batch = staging.batch_mut(variant_id, *batch_id)?;
                LandedCostCalculator::reprice(batch, freight_per_unit, gap_per_unit, &self.config)?;
            }
            let sealed = staging.seal()?;

            let mut orders = lock_registry(&self.orders, "採購單")?;
            let record = orders
                .get_mut(order_id)
                .ok_or_else(|| ValuationError::not_found(format!("採購單 {}", order_id)))?;
            if record.batches != expected {
                tracing::debug!("採購單 {} 批次在鎖定期間變動，重試 ({})", order_id, attempt + 1);
                continue;
            }

            let summaries = sealed.apply(&mut guards, &self.summaries)?;
            record.freight_fee = freight_fee;
            record.paid_total = Some(paid_total);
            record.finalized = true;

            tracing::info!(
                "物流結算: 採購單 {} 共 {} 批次，運費 {} (每單位 {})，付款差額 {} (每單位 {})",
                order_id,
                expected.len(),
                freight_fee,
                freight_per_unit,
                payment_gap,
                gap_per_unit
            );

            return Ok(summaries);
        }

        Err(ValuationError::Conflict(format!(
            "採購單 {} 結算重試 {} 次仍無法取得一致狀態",
            order_id, self.config.max_lock_retries
        )))
    }

    /// 登記消耗：銷貨走 FIFO 出庫，減損走價值保留減損
    pub fn record_consumption(&self, request: ConsumptionRequest) -> Result<ConsumptionOutcome> {
        request.validate()?;
        let ConsumptionRequest {
            variant_id,
            quantity,
            purpose,
        } = request;

        match purpose {
            ConsumptionPurpose::Sale { invoice_ref } => {
                let outcome =
                    self.record_sale(&invoice_ref, &[SaleLineRequest::new(variant_id.clone(), quantity)])?;
                let summary = outcome
                    .summaries
                    .into_iter()
                    .find(|s| s.variant_id == variant_id)
                    .ok_or_else(|| {
                        ValuationError::inconsistent(format!("銷貨後缺少物料 {} 的彙總", variant_id))
                    })?;
                let line = outcome.lines.into_iter().next().ok_or_else(|| {
                    ValuationError::inconsistent(format!("發票 {} 未產生銷貨明細", invoice_ref))
                })?;

                Ok(ConsumptionOutcome {
                    cogs: Some(line.cogs),
                    movements: line.movements,
                    summary,
                })
            }
            ConsumptionPurpose::Adjustment { reason } => {
                let handles = self.handles(std::slice::from_ref(&variant_id))?;
                let mut guards = lock_books(&handles)?;
                let mut staging = Staging::from_guards(&guards);

                let movements = WriteDownCalculator::write_down(
                    staging.book_mut(&variant_id)?,
                    quantity,
                    reason.clone(),
                    &self.config,
                )?;
                let sealed = staging.seal()?;
                let summary = sealed
                    .apply(&mut guards, &self.summaries)?
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| VariantSummary::empty(variant_id.clone()));

                tracing::info!(
                    "減損: 物料 {} 數量 {} ({})，剩餘 {} @ {}",
                    variant_id,
                    quantity,
                    reason,
                    summary.total_quantity,
                    summary.average_cost
                );

                Ok(ConsumptionOutcome {
                    cogs: None,
                    movements,
                    summary,
                })
            }
        }
    }

    /// 登記銷貨（多明細，全有或全無）
    ///
    /// 同一發票號碼重複呼叫時，明細附加到同一筆銷貨交易。
    pub fn record_sale(&self, invoice_ref: &str, lines: &[SaleLineRequest]) -> Result<SaleOutcome> {
        if lines.is_empty() {
            return Err(ValuationError::InvalidQuantity(0));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
            return Err(ValuationError::InvalidQuantity(line.quantity));
        }

        let variant_ids: Vec<String> = lines.iter().map(|l| l.variant_id.clone()).collect();
        let handles = self.handles(&variant_ids)?;
        let mut guards = lock_books(&handles)?;
        let mut staging = Staging::from_guards(&guards);

        let mut outcomes = Vec::with_capacity(lines.len());
        for line in lines {
            let line_id = Uuid::new_v4();
            let consumption = FifoCalculator::consume(
                staging.book_mut(&line.variant_id)?,
                line.quantity,
                MovementKind::Sale {
                    invoice_ref: invoice_ref.to_string(),
                    line_id,
                },
            )?;

            outcomes.push(SaleLineOutcome {
                line_id,
                variant_id: line.variant_id.clone(),
                quantity: line.quantity,
                cogs: consumption.cogs,
                movements: consumption.movements,
            });
        }
        let sealed = staging.seal()?;

        let mut sales = lock_registry(&self.sales, "銷貨")?;
        let summaries = sealed.apply(&mut guards, &self.summaries)?;
        let transaction = sales
            .entry(invoice_ref.to_string())
            .or_insert_with(|| SaleTransaction::new(invoice_ref.to_string()));
        for outcome in &outcomes {
            transaction.add_line(SaleLine {
                line_id: outcome.line_id,
                variant_id: outcome.variant_id.clone(),
                quantity: outcome.quantity,
                cogs: outcome.cogs,
            });
        }

        let outcome = SaleOutcome {
            invoice_ref: invoice_ref.to_string(),
            lines: outcomes,
            summaries,
        };
        tracing::info!(
            "銷貨: 發票 {} 新增 {} 筆明細，銷貨成本 {}",
            invoice_ref,
            outcome.lines.len(),
            outcome.total_cogs()
        );

        Ok(outcome)
    }

    /// 沖銷銷貨交易
    ///
    /// 每筆明細的出庫數量加回原批次，刪除異動紀錄與交易本身。
    pub fn reverse_transaction(&self, invoice_ref: &str) -> Result<ReversalReport> {
        for attempt in 0..=self.config.max_lock_retries {
            let expected = {
                let sales = lock_registry(&self.sales, "銷貨")?;
                sales
                    .get(invoice_ref)
                    .cloned()
                    .ok_or_else(|| ValuationError::not_found(format!("發票 {}", invoice_ref)))?
            };

            let handles = self
                .handles(&expected.variant_ids())
                .map_err(missing_as_inconsistent)?;
            let mut guards = lock_books(&handles)?;
            let mut staging = Staging::from_guards(&guards);

            let mut restorations = Vec::new();
            for line in &expected.lines {
                restorations.extend(ReversalCalculator::reverse_line(
                    staging.book_mut(&line.variant_id)?,
                    line.line_id,
                    line.quantity,
                )?);
            }
            let sealed = staging.seal()?;

            let mut sales = lock_registry(&self.sales, "銷貨")?;
            match sales.get(invoice_ref) {
                None => return Err(ValuationError::not_found(format!("發票 {}", invoice_ref))),
                Some(current) if *current != expected => {
                    tracing::debug!("發票 {} 在鎖定期間變動，重試 ({})", invoice_ref, attempt + 1);
                    continue;
                }
                Some(_) => {}
            }

            let summaries = sealed.apply(&mut guards, &self.summaries)?;
            sales.remove(invoice_ref);
            let report = ReversalReport {
                invoice_ref: invoice_ref.to_string(),
                restorations,
                summaries,
            };

            tracing::info!(
                "沖銷: 發票 {} 共 {} 筆明細，回補 {:?}",
                invoice_ref,
                expected.lines.len(),
                report
                    .restorations
                    .iter()
                    .map(|r| (r.batch_id, r.quantity))
                    .collect::<Vec<_>>()
            );

            return Ok(report);
        }

        Err(ValuationError::Conflict(format!(
            "發票 {} 沖銷重試 {} 次仍無法取得一致狀態",
            invoice_ref, self.config.max_lock_retries
        )))
    }

    /// 物料彙總
    pub fn summary(&self, variant_id: &str) -> Result<VariantSummary> {
        self.summaries
            .get(variant_id)?
            .ok_or_else(|| ValuationError::not_found(format!("物料 {}", variant_id)))
    }

    /// 所有物料彙總（依 SKU 排序）
    pub fn summaries(&self) -> Result<Vec<VariantSummary>> {
        self.summaries.all()
    }

    /// 物料的批次（FIFO 順序）
    pub fn batches(&self, variant_id: &str) -> Result<Vec<Batch>> {
        let handle = self.handle(variant_id)?;
        let book = handle.lock().map_err(|_| poisoned(variant_id))?;
        Ok(book.fifo_batches().into_iter().cloned().collect())
    }

    /// 物料的異動紀錄
    pub fn movements(&self, variant_id: &str) -> Result<Vec<Movement>> {
        let handle = self.handle(variant_id)?;
        let book = handle.lock().map_err(|_| poisoned(variant_id))?;
        Ok(book.movements().to_vec())
    }

    pub fn sale_transaction(&self, invoice_ref: &str) -> Result<SaleTransaction> {
        lock_registry(&self.sales, "銷貨")?
            .get(invoice_ref)
            .cloned()
            .ok_or_else(|| ValuationError::not_found(format!("發票 {}", invoice_ref)))
    }

    pub fn purchase_order(&self, order_id: &str) -> Result<PurchaseOrderRecord> {
        lock_registry(&self.orders, "採購單")?
            .get(order_id)
            .cloned()
            .ok_or_else(|| ValuationError::not_found(format!("採購單 {}", order_id)))
    }

    /// 庫存總價值
    pub fn inventory_value(&self) -> Result<Decimal> {
        self.summaries.total_value()
    }

    /// 完整性稽核
    ///
    /// 快取彙總在鎖定帳冊前讀取，請在沒有寫入進行時呼叫。
    pub fn audit(&self) -> Result<Vec<IntegrityIssue>> {
        let known_sale_lines: HashSet<Uuid> = lock_registry(&self.sales, "銷貨")?
            .values()
            .flat_map(|sale| sale.lines.iter().map(|l| l.line_id))
            .collect();

        let mut entries: Vec<(String, BookHandle)> = self
            .book_map()?
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let books: Vec<(BookHandle, Option<VariantSummary>)> = entries
            .into_iter()
            .map(|(id, handle)| Ok((handle, self.summaries.get(&id)?)))
            .collect::<Result<_>>()?;

        let issues = IntegrityAuditor::audit_books(&books, &known_sale_lines);
        if issues.is_empty() {
            tracing::info!("稽核完成: {} 個物料無異常", books.len());
        } else {
            tracing::warn!("稽核完成: 發現 {} 項異常", issues.len());
        }
        Ok(issues)
    }

    /// 匯出帳本快照
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let ids: Vec<String> = self.book_map()?.keys().cloned().collect();
        let handles = self.handles(&ids)?;
        let guards = lock_books(&handles)?;
        let books: Vec<VariantBook> = guards.iter().map(|g| (**g).clone()).collect();

        let mut orders: Vec<PurchaseOrderRecord> =
            lock_registry(&self.orders, "採購單")?.values().cloned().collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));

        let mut sales: Vec<SaleTransaction> =
            lock_registry(&self.sales, "銷貨")?.values().cloned().collect();
        sales.sort_by(|a, b| a.invoice_ref.cmp(&b.invoice_ref));

        Ok(LedgerSnapshot {
            books,
            orders,
            sales,
            next_sequence: self.next_sequence.load(Ordering::SeqCst),
        })
    }

    /// 由快照還原帳本
    ///
    /// 所有彙總依批次重新計算，不信任快照中的任何衍生資料。
    /// 帳冊結構、採購單與銷貨登記都要與批次及異動紀錄對得上，否則拒絕還原。
    pub fn restore(config: ValuationConfig, snapshot: LedgerSnapshot) -> Result<Self> {
        let LedgerSnapshot {
            books,
            orders,
            sales,
            next_sequence,
        } = snapshot;

        let mut plain_books: HashMap<String, VariantBook> = HashMap::with_capacity(books.len());
        let mut summaries = Vec::with_capacity(books.len());
        let mut seen_batches = HashSet::new();
        let mut max_sequence: u64 = 0;

        for book in books {
            book.check_integrity()?;
            for batch in book.batches() {
                if !seen_batches.insert(batch.id) {
                    return Err(ValuationError::inconsistent(format!(
                        "快照中批次 {} 出現在多個物料",
                        batch.id
                    )));
                }
                max_sequence = max_sequence.max(batch.arrival_sequence);
            }
            summaries.push(AggregateCalculator::recompute(&book)?);

            let variant_id = book.variant_id.clone();
            if plain_books.insert(variant_id.clone(), book).is_some() {
                return Err(ValuationError::inconsistent(format!(
                    "快照中物料 {} 重複",
                    variant_id
                )));
            }
        }

        let mut order_map = HashMap::with_capacity(orders.len());
        for record in orders {
            check_order_record(&record, &plain_books)?;
            let order_id = record.order_id.clone();
            if order_map.insert(order_id.clone(), record).is_some() {
                return Err(ValuationError::inconsistent(format!(
                    "快照中採購單 {} 重複",
                    order_id
                )));
            }
        }

        let mut sale_map = HashMap::with_capacity(sales.len());
        let mut seen_lines = HashSet::new();
        for sale in sales {
            check_sale_transaction(&sale, &plain_books, &mut seen_lines)?;
            let invoice_ref = sale.invoice_ref.clone();
            if sale_map.insert(invoice_ref.clone(), sale).is_some() {
                return Err(ValuationError::inconsistent(format!(
                    "快照中發票 {} 重複",
                    invoice_ref
                )));
            }
        }

        let cache = SummaryCache::new();
        cache.replace_all(summaries)?;

        let book_map: HashMap<String, BookHandle> = plain_books
            .into_iter()
            .map(|(id, book)| (id, Arc::new(Mutex::new(book))))
            .collect();

        tracing::info!(
            "由快照還原帳本: {} 個物料，{} 張採購單，{} 筆銷貨",
            book_map.len(),
            order_map.len(),
            sale_map.len()
        );

        Ok(Self {
            config,
            books: RwLock::new(book_map),
            summaries: cache,
            orders: Mutex::new(order_map),
            sales: Mutex::new(sale_map),
            next_sequence: AtomicU64::new(next_sequence.max(max_sequence.saturating_add(1))),
        })
    }

    fn book_map(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, BookHandle>>> {
        self.books
            .read()
            .map_err(|_| ValuationError::inconsistent("物料索引鎖已損毀"))
    }

    fn handle(&self, variant_id: &str) -> Result<BookHandle> {
        self.book_map()?
            .get(variant_id)
            .cloned()
            .ok_or_else(|| ValuationError::not_found(format!("物料 {}", variant_id)))
    }

    /// 依 SKU 升冪取得帳冊（去重）
    fn handles(&self, variant_ids: &[String]) -> Result<Vec<BookHandle>> {
        let ordered: BTreeSet<&String> = variant_ids.iter().collect();
        let map = self.book_map()?;
        ordered
            .into_iter()
            .map(|id| {
                map.get(id)
                    .cloned()
                    .ok_or_else(|| ValuationError::not_found(format!("物料 {}", id)))
            })
            .collect()
    }

    fn ensure_book(&self, variant_id: &str) -> Result<(BookHandle, bool)> {
        if let Some(handle) = self.book_map()?.get(variant_id) {
            return Ok((Arc::clone(handle), false));
        }

        let mut map = self
            .books
            .write()
            .map_err(|_| ValuationError::inconsistent("物料索引鎖已損毀"))?;
        let mut created = false;
        let handle = map
            .entry(variant_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(VariantBook::new(variant_id.to_string())))
            })
            .clone();
        self.summaries
            .insert_if_absent(VariantSummary::empty(variant_id.to_string()))?;

        Ok((handle, created))
    }

    fn order_is_finalized(&self, order_id: &str) -> Result<bool> {
        Ok(lock_registry(&self.orders, "採購單")?
            .get(order_id)
            .is_some_and(|record| record.finalized))
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new(ValuationConfig::default())
    }
}

/// 帳冊複本：操作在此修改，成功後才寫回
struct Staging {
    books: Vec<VariantBook>,
    dirty: DirtyTracker,
}

/// 已重算彙總、等待寫回的變更
struct Sealed {
    books: Vec<VariantBook>,
    summaries: Vec<VariantSummary>,
}

impl Staging {
    fn from_guards(guards: &[MutexGuard<'_, VariantBook>]) -> Self {
        Self {
            books: guards.iter().map(|guard| (**guard).clone()).collect(),
            dirty: DirtyTracker::new(),
        }
    }

    fn book(&self, variant_id: &str) -> Result<&VariantBook> {
        self.books
            .iter()
            .find(|b| b.variant_id == variant_id)
            .ok_or_else(|| not_locked(variant_id))
    }

    fn book_mut(&mut self, variant_id: &str) -> Result<&mut VariantBook> {
        self.dirty.mark_dirty(variant_id);
        self.books
            .iter_mut()
            .find(|b| b.variant_id == variant_id)
            .ok_or_else(|| not_locked(variant_id))
    }

    fn batch(&self, variant_id: &str, batch_id: BatchId) -> Result<&Batch> {
        self.book(variant_id)?
            .batch(batch_id)
            .ok_or_else(|| missing_batch(variant_id, batch_id))
    }

    fn batch_mut(&mut self, variant_id: &str, batch_id: BatchId) -> Result<&mut Batch> {
        self.book_mut(variant_id)?
            .batch_mut(batch_id)
            .ok_or_else(|| missing_batch(variant_id, batch_id))
    }

    /// 重算有變動物料的彙總
    fn seal(self) -> Result<Sealed> {
        let mut books = Vec::new();
        let mut summaries = Vec::new();

        for book in self.books {
            if self.dirty.is_dirty(&book.variant_id) {
                summaries.push(AggregateCalculator::recompute(&book)?);
                books.push(book);
            }
        }

        Ok(Sealed { books, summaries })
    }
}

impl Sealed {
    /// 先寫彙總快取（可能失敗），成功後才寫回帳冊
    fn apply(
        self,
        guards: &mut [MutexGuard<'_, VariantBook>],
        cache: &SummaryCache,
    ) -> Result<Vec<VariantSummary>> {
        cache.replace_all(self.summaries.iter().cloned())?;
        for book in self.books {
            if let Some(guard) = guards.iter_mut().find(|g| g.variant_id == book.variant_id) {
                **guard = book;
            }
        }
        Ok(self.summaries)
    }
}

fn lock_books(handles: &[BookHandle]) -> Result<Vec<MutexGuard<'_, VariantBook>>> {
    handles
        .iter()
        .map(|handle| match handle.lock() {
            Ok(guard) => Ok(guard),
            Err(err) => Err(poisoned(&err.get_ref().variant_id)),
        })
        .collect()
}

fn lock_registry<'a, T>(registry: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    registry
        .lock()
        .map_err(|_| ValuationError::inconsistent(format!("{}登記簿鎖已損毀", name)))
}

fn poisoned(variant_id: &str) -> ValuationError {
    ValuationError::inconsistent(format!("物料 {} 帳冊鎖已損毀", variant_id))
}

fn not_locked(variant_id: &str) -> ValuationError {
    ValuationError::inconsistent(format!("物料 {} 未在本次操作中鎖定", variant_id))
}

fn missing_batch(variant_id: &str, batch_id: BatchId) -> ValuationError {
    ValuationError::inconsistent(format!("物料 {} 找不到批次 {}", variant_id, batch_id))
}

fn finalized_conflict(order_id: &str) -> ValuationError {
    ValuationError::Conflict(format!("採購單 {} 已結算，不可再新增批次", order_id))
}

/// 採購單的每個批次都要存在且標記為屬於該採購單
fn check_order_record(
    record: &PurchaseOrderRecord,
    books: &HashMap<String, VariantBook>,
) -> Result<()> {
    for (variant_id, batch_id) in &record.batches {
        let batch = books
            .get(variant_id)
            .and_then(|book| book.batch(*batch_id))
            .ok_or_else(|| {
                ValuationError::inconsistent(format!(
                    "採購單 {} 指向不存在的批次 {} (物料 {})",
                    record.order_id, batch_id, variant_id
                ))
            })?;
        if batch.order_id.as_deref() != Some(record.order_id.as_str()) {
            return Err(ValuationError::inconsistent(format!(
                "批次 {} 不屬於採購單 {}",
                batch_id, record.order_id
            )));
        }
    }
    Ok(())
}

/// 銷貨明細必須對應到同一發票的銷貨異動，且異動數量合計等於明細數量
fn check_sale_transaction(
    sale: &SaleTransaction,
    books: &HashMap<String, VariantBook>,
    seen_lines: &mut HashSet<Uuid>,
) -> Result<()> {
    for line in &sale.lines {
        if !seen_lines.insert(line.line_id) {
            return Err(ValuationError::inconsistent(format!(
                "銷貨明細 {} 重複登記",
                line.line_id
            )));
        }
        let book = books.get(&line.variant_id).ok_or_else(|| {
            ValuationError::inconsistent(format!(
                "發票 {} 明細 {} 指向不存在的物料 {}",
                sale.invoice_ref, line.line_id, line.variant_id
            ))
        })?;

        let mut issued: i64 = 0;
        for movement in book.movements().iter().filter(|m| m.belongs_to_line(line.line_id)) {
            let same_invoice = matches!(
                &movement.kind,
                MovementKind::Sale { invoice_ref, .. } if *invoice_ref == sale.invoice_ref
            );
            let quantity = movement.quantity.checked_neg().filter(|q| *q > 0);
            match (same_invoice, quantity) {
                (true, Some(quantity)) => {
                    issued = issued.checked_add(quantity).ok_or_else(|| {
                        ValuationError::inconsistent(format!(
                            "銷貨明細 {} 出庫合計溢位",
                            line.line_id
                        ))
                    })?;
                }
                _ => {
                    return Err(ValuationError::inconsistent(format!(
                        "異動 {} 與發票 {} 明細 {} 不符",
                        movement.id, sale.invoice_ref, line.line_id
                    )));
                }
            }
        }

        if issued != line.quantity {
            return Err(ValuationError::inconsistent(format!(
                "發票 {} 明細 {} 數量 {} 與異動合計 {} 不符",
                sale.invoice_ref, line.line_id, line.quantity, issued
            )));
        }
    }
    Ok(())
}

/// 登記簿引用的物料不存在屬於狀態不一致
fn missing_as_inconsistent(err: ValuationError) -> ValuationError {
    match err {
        ValuationError::NotFound(what) => {
            ValuationError::inconsistent(format!("登記簿引用不存在的{}", what))
        }
        other => other,
    }
}
