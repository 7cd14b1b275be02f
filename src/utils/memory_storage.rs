//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, SourceDocument>,
    document_lines: Vec<DocumentLine>,
    items: HashMap<String, Item>,
    item_costs: HashMap<String, ItemCost>,
    gl_accounts: HashMap<String, GlAccount>,
    partners: HashMap<String, TradingPartner>,
    counterpart_lines: HashMap<String, CounterpartOrderLine>,
    orders: HashMap<String, Order>,
    inventory_groups: HashMap<(String, String), InventoryPostingGroup>,
    purchase_groups: HashMap<(String, String), PurchasePostingGroup>,
    sales_groups: HashMap<(String, String), SalesPostingGroup>,
    periods: Vec<AccountingPeriod>,
    journals: Vec<Journal>,
    item_entries: Vec<ItemLedgerEntry>,
    cost_entries: Vec<CostLedgerEntry>,
    generated_documents: Vec<GeneratedSubDocument>,
    counters: HashMap<DocumentKind, u64>,
}

/// In-memory storage implementation for testing and development
///
/// All tables live behind one lock, so `commit_run` applies its writes
/// atomically with respect to every other call.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, document: SourceDocument) {
        let mut inner = self.inner.write().unwrap();
        inner.documents.insert(document.id.clone(), document);
    }

    pub fn insert_document_line(&self, line: DocumentLine) {
        self.inner.write().unwrap().document_lines.push(line);
    }

    pub fn insert_item(&self, item: Item) {
        let mut inner = self.inner.write().unwrap();
        inner.items.insert(item.id.clone(), item);
    }

    pub fn insert_item_cost(&self, cost: ItemCost) {
        let mut inner = self.inner.write().unwrap();
        inner.item_costs.insert(cost.item_id.clone(), cost);
    }

    pub fn insert_gl_account(&self, account: GlAccount) {
        let mut inner = self.inner.write().unwrap();
        inner
            .gl_accounts
            .insert(account.account_no.clone(), account);
    }

    pub fn insert_partner(&self, partner: TradingPartner) {
        let mut inner = self.inner.write().unwrap();
        inner.partners.insert(partner.id.clone(), partner);
    }

    pub fn insert_counterpart_line(&self, line: CounterpartOrderLine) {
        let mut inner = self.inner.write().unwrap();
        inner.counterpart_lines.insert(line.id.clone(), line);
    }

    pub fn insert_order(&self, order: Order) {
        let mut inner = self.inner.write().unwrap();
        inner.orders.insert(order.id.clone(), order);
    }

    pub fn insert_inventory_group(&self, group: InventoryPostingGroup) {
        let key = (group.item_posting_group_id.clone(), group.location_id.clone());
        self.inner.write().unwrap().inventory_groups.insert(key, group);
    }

    pub fn insert_purchase_group(&self, group: PurchasePostingGroup) {
        let key = (
            group.item_posting_group_id.clone(),
            group.partner_type_id.clone(),
        );
        self.inner.write().unwrap().purchase_groups.insert(key, group);
    }

    pub fn insert_sales_group(&self, group: SalesPostingGroup) {
        let key = (
            group.item_posting_group_id.clone(),
            group.partner_type_id.clone(),
        );
        self.inner.write().unwrap().sales_groups.insert(key, group);
    }

    pub fn insert_period(&self, period: AccountingPeriod) {
        self.inner.write().unwrap().periods.push(period);
    }

    /// Look up a document, for assertions
    pub fn document(&self, document_id: &str) -> Option<SourceDocument> {
        self.inner.read().unwrap().documents.get(document_id).cloned()
    }

    /// Look up a counterpart order line, for assertions
    pub fn counterpart_line(&self, line_id: &str) -> Option<CounterpartOrderLine> {
        self.inner
            .read()
            .unwrap()
            .counterpart_lines
            .get(line_id)
            .cloned()
    }

    /// Look up an order, for assertions
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.inner.read().unwrap().orders.get(order_id).cloned()
    }

    /// All committed journals, in commit order
    pub fn journals(&self) -> Vec<Journal> {
        self.inner.read().unwrap().journals.clone()
    }

    /// All item-ledger rows, in commit order
    pub fn item_entries(&self) -> Vec<ItemLedgerEntry> {
        self.inner.read().unwrap().item_entries.clone()
    }

    /// All cost-ledger rows, in commit order
    pub fn cost_entries(&self) -> Vec<CostLedgerEntry> {
        self.inner.read().unwrap().cost_entries.clone()
    }

    /// All generated receipts/shipments, in commit order
    pub fn generated_documents(&self) -> Vec<GeneratedSubDocument> {
        self.inner.read().unwrap().generated_documents.clone()
    }
}

#[async_trait]
impl PostingStorage for MemoryStorage {
    async fn get_document(&self, document_id: &str) -> PostingResult<Option<SourceDocument>> {
        Ok(self.inner.read().unwrap().documents.get(document_id).cloned())
    }

    async fn get_document_lines(&self, document_id: &str) -> PostingResult<Vec<DocumentLine>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .document_lines
            .iter()
            .filter(|line| line.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn get_item(&self, item_id: &str) -> PostingResult<Option<Item>> {
        Ok(self.inner.read().unwrap().items.get(item_id).cloned())
    }

    async fn get_item_cost(&self, item_id: &str) -> PostingResult<Option<ItemCost>> {
        Ok(self.inner.read().unwrap().item_costs.get(item_id).cloned())
    }

    async fn get_gl_account(&self, account_no: &str) -> PostingResult<Option<GlAccount>> {
        Ok(self.inner.read().unwrap().gl_accounts.get(account_no).cloned())
    }

    async fn get_trading_partner(&self, partner_id: &str) -> PostingResult<Option<TradingPartner>> {
        Ok(self.inner.read().unwrap().partners.get(partner_id).cloned())
    }

    async fn get_counterpart_line(
        &self,
        line_id: &str,
    ) -> PostingResult<Option<CounterpartOrderLine>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .counterpart_lines
            .get(line_id)
            .cloned())
    }

    async fn get_order(&self, order_id: &str) -> PostingResult<Option<Order>> {
        Ok(self.inner.read().unwrap().orders.get(order_id).cloned())
    }

    async fn get_order_lines(&self, order_id: &str) -> PostingResult<Vec<CounterpartOrderLine>> {
        let inner = self.inner.read().unwrap();
        let mut lines: Vec<CounterpartOrderLine> = inner
            .counterpart_lines
            .values()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(lines)
    }

    async fn get_inventory_posting_group(
        &self,
        item_posting_group_id: &str,
        location_id: &str,
    ) -> PostingResult<Option<InventoryPostingGroup>> {
        let key = (item_posting_group_id.to_string(), location_id.to_string());
        Ok(self.inner.read().unwrap().inventory_groups.get(&key).cloned())
    }

    async fn get_purchase_posting_group(
        &self,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<Option<PurchasePostingGroup>> {
        let key = (item_posting_group_id.to_string(), partner_type_id.to_string());
        Ok(self.inner.read().unwrap().purchase_groups.get(&key).cloned())
    }

    async fn get_sales_posting_group(
        &self,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<Option<SalesPostingGroup>> {
        let key = (item_posting_group_id.to_string(), partner_type_id.to_string());
        Ok(self.inner.read().unwrap().sales_groups.get(&key).cloned())
    }

    async fn journal_lines_for(
        &self,
        counterpart: &CounterpartRef,
    ) -> PostingResult<Vec<JournalLine>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .journals
            .iter()
            .flat_map(|journal| journal.lines.iter())
            .filter(|line| line.counterpart.as_ref() == Some(counterpart))
            .cloned()
            .collect())
    }

    async fn open_period(&self, date: NaiveDate) -> PostingResult<Option<AccountingPeriod>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .periods
            .iter()
            .find(|p| p.open && p.starts_on <= date && date <= p.ends_on)
            .cloned())
    }

    async fn next_document_number(&mut self, kind: DocumentKind) -> PostingResult<String> {
        let mut inner = self.inner.write().unwrap();
        let counter = inner.counters.entry(kind).or_insert(0);
        *counter += 1;
        let prefix = match kind {
            DocumentKind::Receipt => "REC",
            DocumentKind::Shipment => "SHP",
            DocumentKind::PurchaseInvoice => "PIN",
            DocumentKind::SalesInvoice => "SIN",
        };
        Ok(format!("{}{:05}", prefix, counter))
    }

    async fn commit_run(&mut self, commit: PostingCommit) -> PostingResult<()> {
        let mut inner = self.inner.write().unwrap();

        let document = inner
            .documents
            .get_mut(&commit.document_id)
            .ok_or_else(|| {
                PostingError::Transaction(format!(
                    "document '{}' vanished before commit",
                    commit.document_id
                ))
            })?;
        document.status = commit.document_status;
        document.posted_at = Some(commit.posted_at);

        inner.journals.push(commit.journal);
        inner.item_entries.extend(commit.item_entries);
        inner.cost_entries.extend(commit.cost_entries);
        for line in commit.counterpart_updates {
            inner.counterpart_lines.insert(line.id.clone(), line);
        }
        for (order_id, status) in commit.order_status_updates {
            if let Some(order) = inner.orders.get_mut(&order_id) {
                order.status = status;
            }
        }
        inner.generated_documents.extend(commit.generated_documents);

        Ok(())
    }

    async fn reset_document_status(
        &mut self,
        document_id: &str,
        status: DocumentStatus,
    ) -> PostingResult<()> {
        let mut inner = self.inner.write().unwrap();
        let document = inner.documents.get_mut(document_id).ok_or_else(|| {
            PostingError::Storage(format!("document '{}' not found", document_id))
        })?;
        document.status = status;
        if status == DocumentStatus::Draft {
            document.posted_at = None;
        }
        Ok(())
    }
}
