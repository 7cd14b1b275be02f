//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::types::*;

/// Full set of writes produced by one posting run
///
/// A commit is applied atomically: either every row lands or none do.
/// Journal lines are appended in the order they appear in `journal.lines`;
/// the reversal-matching engine depends on insertion order being
/// chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct PostingCommit {
    pub document_id: String,
    /// Status the source document ends the run in (always `Posted`)
    pub document_status: DocumentStatus,
    pub posted_at: NaiveDateTime,
    pub journal: Journal,
    pub item_entries: Vec<ItemLedgerEntry>,
    pub cost_entries: Vec<CostLedgerEntry>,
    /// Counterpart order lines with their running totals advanced
    pub counterpart_updates: Vec<CounterpartOrderLine>,
    /// Recomputed status per touched order
    pub order_status_updates: Vec<(String, OrderStatus)>,
    /// Receipts/shipments synthesized for counterpart-less invoice lines
    pub generated_documents: Vec<GeneratedSubDocument>,
}

/// Storage abstraction for the posting engine
///
/// This trait allows the engine to work with any relational backend by
/// implementing these methods. Reads may run concurrently; `commit_run` must
/// be atomic.
///
/// The engine takes no locks of its own. Two concurrent runs touching the
/// same counterpart order line can double-reverse an accrual; callers must
/// serialize posting per document (the Draft to Posted transition is the
/// intended guard).
#[async_trait]
pub trait PostingStorage: Send + Sync {
    /// Get a source document by id
    async fn get_document(&self, document_id: &str) -> PostingResult<Option<SourceDocument>>;

    /// Get all lines of a source document
    async fn get_document_lines(&self, document_id: &str) -> PostingResult<Vec<DocumentLine>>;

    /// Get item master data
    async fn get_item(&self, item_id: &str) -> PostingResult<Option<Item>>;

    /// Get the current unit cost of an item
    async fn get_item_cost(&self, item_id: &str) -> PostingResult<Option<ItemCost>>;

    /// Get G/L account master data
    async fn get_gl_account(&self, account_no: &str) -> PostingResult<Option<GlAccount>>;

    /// Get a vendor/customer by id
    async fn get_trading_partner(&self, partner_id: &str) -> PostingResult<Option<TradingPartner>>;

    /// Get a counterpart order line by id
    async fn get_counterpart_line(
        &self,
        line_id: &str,
    ) -> PostingResult<Option<CounterpartOrderLine>>;

    /// Get an order header by id
    async fn get_order(&self, order_id: &str) -> PostingResult<Option<Order>>;

    /// Get every line of an order, for status rollup
    async fn get_order_lines(&self, order_id: &str) -> PostingResult<Vec<CounterpartOrderLine>>;

    /// Resolve the inventory account mapping for (item posting group, location)
    async fn get_inventory_posting_group(
        &self,
        item_posting_group_id: &str,
        location_id: &str,
    ) -> PostingResult<Option<InventoryPostingGroup>>;

    /// Resolve the purchasing account mapping for (item posting group, vendor type)
    async fn get_purchase_posting_group(
        &self,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<Option<PurchasePostingGroup>>;

    /// Resolve the sales account mapping for (item posting group, customer type)
    async fn get_sales_posting_group(
        &self,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<Option<SalesPostingGroup>>;

    /// All journal lines carrying the given counterpart key, in insertion
    /// order (insertion order is chronological order)
    async fn journal_lines_for(
        &self,
        counterpart: &CounterpartRef,
    ) -> PostingResult<Vec<JournalLine>>;

    /// The open accounting period covering the given date
    async fn open_period(&self, date: NaiveDate) -> PostingResult<Option<AccountingPeriod>>;

    /// Issue the next human-readable document number for a generated
    /// receipt/shipment
    async fn next_document_number(&mut self, kind: DocumentKind) -> PostingResult<String>;

    /// Persist every write of one posting run atomically
    async fn commit_run(&mut self, commit: PostingCommit) -> PostingResult<()>;

    /// Best-effort compensating action: put a document back into its
    /// pre-posting status after a failed run
    async fn reset_document_status(
        &mut self,
        document_id: &str,
        status: DocumentStatus,
    ) -> PostingResult<()>;
}
