//! Core types and data structures for the posting engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kinds of commercial documents the engine reads or generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Goods receipt against a purchase order
    Receipt,
    /// Shipment against a sales order (only ever generated, never posted directly)
    Shipment,
    /// Supplier invoice
    PurchaseInvoice,
    /// Customer invoice
    SalesInvoice,
}

/// Lifecycle status of a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Editable, not yet posted
    Draft,
    /// Posted by a successful run; immutable from here on
    Posted,
}

/// Header of a document the engine posts
///
/// Created by upstream surfaces; the engine only ever flips `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub kind: DocumentKind,
    /// Vendor or customer, depending on direction
    pub partner_id: String,
    /// Default location for lines that do not carry their own
    pub location_id: String,
    /// Precomputed rate from document currency to ledger currency
    pub exchange_rate: BigDecimal,
    /// Document-level shipping charge, in document currency
    pub shipping_cost: BigDecimal,
    pub status: DocumentStatus,
    pub posted_at: Option<NaiveDateTime>,
}

/// Line classification driving the ledger-entry builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    Part,
    Service,
    Consumable,
    Material,
    Tool,
    Fixture,
    FixedAsset,
    Comment,
    GlAccount,
}

impl LineType {
    /// Whether this line type moves inventory value
    pub fn affects_inventory(&self) -> bool {
        matches!(
            self,
            LineType::Part
                | LineType::Service
                | LineType::Consumable
                | LineType::Material
                | LineType::Tool
                | LineType::Fixture
        )
    }

    /// Canonical tag used at the storage boundary
    pub fn as_str(&self) -> &'static str {
        match self {
            LineType::Part => "Part",
            LineType::Service => "Service",
            LineType::Consumable => "Consumable",
            LineType::Material => "Material",
            LineType::Tool => "Tool",
            LineType::Fixture => "Fixture",
            LineType::FixedAsset => "Fixed Asset",
            LineType::Comment => "Comment",
            LineType::GlAccount => "G/L Account",
        }
    }
}

impl FromStr for LineType {
    type Err = PostingError;

    /// Parse a storage-side tag; any unknown tag is a domain error, never a
    /// silent default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Part" => Ok(LineType::Part),
            "Service" => Ok(LineType::Service),
            "Consumable" => Ok(LineType::Consumable),
            "Material" => Ok(LineType::Material),
            "Tool" => Ok(LineType::Tool),
            "Fixture" => Ok(LineType::Fixture),
            "Fixed Asset" => Ok(LineType::FixedAsset),
            "Comment" => Ok(LineType::Comment),
            "G/L Account" => Ok(LineType::GlAccount),
            other => Err(PostingError::UnsupportedLineType(other.to_string())),
        }
    }
}

/// A single line of a source document
///
/// Immutable once its document is posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: String,
    pub document_id: String,
    pub line_type: LineType,
    /// Item reference for inventory-affecting lines
    pub item_id: Option<String>,
    /// Target account for G/L Account lines
    pub gl_account_no: Option<String>,
    /// Quantity in purchase/sales units
    pub quantity: BigDecimal,
    /// Price per purchase/sales unit, in document currency
    pub unit_price: BigDecimal,
    /// Line-level shipping charge, in document currency
    pub line_shipping: BigDecimal,
    /// Line-level tax or other add-on, in document currency
    pub line_surcharge: BigDecimal,
    /// Purchase/sales unit to inventory unit factor
    pub conversion_factor: BigDecimal,
    /// Order line this line fulfils, when part of a two-step flow
    pub counterpart_line_id: Option<String>,
    /// Work sent to a subcontractor; posts against WIP instead of inventory
    pub outside_processing: bool,
    /// Overrides the document location when set
    pub location_id: Option<String>,
    /// Serial numbers for serial-tracked items; one per inventory unit
    pub serial_numbers: Vec<String>,
}

impl DocumentLine {
    /// Line quantity expressed in inventory units
    pub fn quantity_in_inventory_units(&self) -> BigDecimal {
        &self.quantity * &self.conversion_factor
    }

    /// Location this line moves stock at
    pub fn location_or<'a>(&'a self, document_location: &'a str) -> &'a str {
        self.location_id.as_deref().unwrap_or(document_location)
    }
}

/// Which side of a two-step flow recorded a journal-line group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterpartKind {
    Receipt,
    Invoice,
    Shipment,
}

impl CounterpartKind {
    fn as_str(&self) -> &'static str {
        match self {
            CounterpartKind::Receipt => "receipt",
            CounterpartKind::Invoice => "invoice",
            CounterpartKind::Shipment => "shipment",
        }
    }
}

/// Typed correlation key tying journal lines to a counterpart order line
///
/// Stored as `{kind}:{counterpart_id}`; the string form exists only at the
/// storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterpartRef {
    pub kind: CounterpartKind,
    pub counterpart_id: String,
}

impl CounterpartRef {
    pub fn new(kind: CounterpartKind, counterpart_id: impl Into<String>) -> Self {
        Self {
            kind,
            counterpart_id: counterpart_id.into(),
        }
    }

    /// Encode for storage
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.counterpart_id)
    }

    /// Decode from storage
    pub fn parse(key: &str) -> PostingResult<Self> {
        let (kind, id) = key.split_once(':').ok_or_else(|| {
            PostingError::Validation(format!("Malformed counterpart key '{}'", key))
        })?;
        let kind = match kind {
            "receipt" => CounterpartKind::Receipt,
            "invoice" => CounterpartKind::Invoice,
            "shipment" => CounterpartKind::Shipment,
            other => {
                return Err(PostingError::Validation(format!(
                    "Unknown counterpart kind '{}'",
                    other
                )))
            }
        };
        Ok(Self::new(kind, id))
    }
}

/// Direction of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Purchase,
    Sales,
}

/// Rolled-up fulfilment status of an order
///
/// `ToFulfill` reads "to receive" on the purchase side and "to ship" on the
/// sales side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Completed,
    ToFulfill,
    ToInvoice,
    ToFulfillAndInvoice,
}

/// Parent order of counterpart lines; only its status is ever rewritten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
}

/// Purchase-order or sales-order line used as the reversal correlation point
///
/// `quantity_fulfilled` is quantity received (purchase) or sent (sales).
/// Running totals grow additively with every posting run that touches the
/// line; they are never decremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartOrderLine {
    pub id: String,
    pub order_id: String,
    pub line_type: LineType,
    pub quantity_ordered: BigDecimal,
    pub quantity_fulfilled: BigDecimal,
    pub quantity_invoiced: BigDecimal,
    pub fulfilled_complete: bool,
    pub invoiced_complete: bool,
}

/// Vendor or customer master data, including its posting profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPartner {
    pub id: String,
    /// Classification used to key purchasing/sales posting groups
    pub partner_type_id: String,
    /// Payables (vendor) or receivables (customer) control account
    pub settlement_account: String,
    /// Account taking a line's allocated shipping on direct G/L postings
    pub overhead_applied_account: String,
}

/// Whether an item carries inventory value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemTrackingKind {
    /// Stocked; movements hit the inventory account and the item ledger
    Inventory,
    /// Expensed on receipt; posts to the overhead account family
    NonInventory,
}

/// Granularity of physical tracking for an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialTracking {
    /// No unit-level tracking
    None,
    /// One ledger row carrying the full movement quantity
    Batch,
    /// One ledger row per unit, each with its serial number
    Serial,
}

/// Item master data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub posting_group_id: String,
    pub tracking: ItemTrackingKind,
    pub serial_tracking: SerialTracking,
}

/// Current per-unit cost of an item, used to value outbound movements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCost {
    pub item_id: String,
    /// Cost per inventory unit, in ledger currency
    pub unit_cost: BigDecimal,
}

/// G/L account master data, needed only for direct G/L Account lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlAccount {
    pub account_no: String,
    pub name: String,
    /// Lines may post straight to this account only when set
    pub direct_posting: bool,
}

/// Inventory-side account mapping, keyed by (item posting group, location)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPostingGroup {
    pub item_posting_group_id: String,
    pub location_id: String,
    pub inventory_account: String,
    /// Interim account holding value between receipt and invoice
    pub inventory_interim_account: String,
    /// Work-in-progress account for outside-processing lines
    pub wip_account: String,
    /// Account family for non-inventory items
    pub overhead_account: String,
}

/// Purchasing-side account mapping, keyed by (item posting group, vendor type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasePostingGroup {
    pub item_posting_group_id: String,
    pub partner_type_id: String,
    pub purchase_account: String,
    pub direct_cost_applied_account: String,
    /// Received-not-invoiced / invoiced-not-received accrual account
    pub accrued_receipts_account: String,
}

/// Sales-side account mapping, keyed by (item posting group, customer type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesPostingGroup {
    pub item_posting_group_id: String,
    pub partner_type_id: String,
    pub sales_account: String,
    pub cogs_account: String,
    /// Shipped-not-invoiced accrual account
    pub accrued_shipments_account: String,
}

/// An open accounting period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub id: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub open: bool,
}

/// An immutable, append-only debit/credit entry
///
/// Amounts are signed in ledger convention: debits positive, credits
/// negative. Reconciliation never updates a line; it inserts new lines of
/// opposite sign. `group_ref` is shared by the paired debit+credit rows of
/// one economic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub journal_id: Uuid,
    pub account_no: String,
    pub amount: BigDecimal,
    pub quantity: BigDecimal,
    /// Reversal lookup key; only accrual pairs and their reversals carry one
    pub counterpart: Option<CounterpartRef>,
    /// Provisional posting expected to be reversed by the opposite procedure
    pub accrual: bool,
    pub group_ref: Uuid,
}

impl JournalLine {
    /// Create a debit line (positive amount)
    pub fn debit(
        journal_id: Uuid,
        group_ref: Uuid,
        account_no: impl Into<String>,
        amount: BigDecimal,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            journal_id,
            account_no: account_no.into(),
            amount,
            quantity,
            counterpart: None,
            accrual: false,
            group_ref,
        }
    }

    /// Create a credit line (negative amount)
    pub fn credit(
        journal_id: Uuid,
        group_ref: Uuid,
        account_no: impl Into<String>,
        amount: BigDecimal,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            journal_id,
            account_no: account_no.into(),
            amount: -amount,
            quantity,
            counterpart: None,
            accrual: false,
            group_ref,
        }
    }

    /// Tag the line with a reversal lookup key
    pub fn with_counterpart(mut self, counterpart: CounterpartRef) -> Self {
        self.counterpart = Some(counterpart);
        self
    }

    /// Mark the line as a provisional accrual
    pub fn as_accrual(mut self) -> Self {
        self.accrual = true;
        self
    }
}

/// One journal per posting run, owning its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: Uuid,
    pub document_id: String,
    pub period_id: String,
    pub posted_at: NaiveDateTime,
    pub lines: Vec<JournalLine>,
}

impl Journal {
    /// Create an empty journal for one posting run
    pub fn new(document_id: String, period_id: String, posted_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            period_id,
            posted_at,
            lines: Vec::new(),
        }
    }

    /// Append a line, preserving insertion order
    pub fn add_line(&mut self, line: JournalLine) {
        self.lines.push(line);
    }

    /// Net signed amount across all lines
    pub fn net_amount(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.amount).sum()
    }

    /// Check the balance invariant (debits equal credits)
    pub fn is_balanced(&self) -> bool {
        self.net_amount() == BigDecimal::from(0)
    }

    /// Validate the journal before persistence
    pub fn validate(&self) -> PostingResult<()> {
        if !self.is_balanced() {
            return Err(PostingError::UnbalancedJournal {
                journal_id: self.id,
                net: self.net_amount(),
            });
        }
        Ok(())
    }
}

/// Direction of an inventory movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemLedgerEntryType {
    PositiveAdjustment,
    NegativeAdjustment,
}

/// Append-only inventory-quantity history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLedgerEntry {
    pub id: Uuid,
    pub item_id: String,
    pub entry_type: ItemLedgerEntryType,
    pub quantity: BigDecimal,
    pub location_id: String,
    /// Set for serial-tracked items; such rows always carry quantity one
    pub serial_no: Option<String>,
    pub document_id: String,
    pub posted_at: NaiveDateTime,
}

/// Append-only cost history row paired with an item-ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLedgerEntry {
    pub id: Uuid,
    pub item_ledger_entry_id: Uuid,
    pub item_id: String,
    pub amount: BigDecimal,
    pub posted_at: NaiveDateTime,
}

/// Receipt or shipment synthesized by invoice posting when an invoice line
/// has no counterpart order line (the invoice is simultaneously the physical
/// event), one per distinct location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSubDocument {
    pub id: Uuid,
    /// Human-readable number issued by the sequence generator
    pub number: String,
    pub kind: DocumentKind,
    pub location_id: String,
    pub source_document_id: String,
    pub lines: Vec<GeneratedSubDocumentLine>,
}

/// Line of a generated receipt/shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSubDocumentLine {
    pub id: Uuid,
    pub source_line_id: String,
    pub item_id: String,
    pub quantity: BigDecimal,
}

/// Payload of a posting call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRequest {
    pub document_id: String,
    pub user_id: String,
    pub company_id: String,
}

/// Result of a committed posting run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingSummary {
    pub journal_id: Uuid,
    pub document_id: String,
    /// Numbers of receipts/shipments generated by this run
    pub generated_document_numbers: Vec<String>,
    /// Orders whose status was recomputed
    pub orders_updated: Vec<String>,
}

/// Errors that can occur in the posting engine
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Required fetch failed: {0}")]
    Fetch(String),
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("Document '{id}' cannot be posted from status {status:?}")]
    NotPostable { id: String, status: DocumentStatus },
    #[error("No posting group configured for {0}")]
    MissingPostingGroup(String),
    #[error("No open accounting period covers {0}")]
    NoOpenPeriod(NaiveDate),
    #[error("Account '{0}' does not allow direct posting")]
    DirectPostingNotAllowed(String),
    #[error("Unsupported line type: {0}")]
    UnsupportedLineType(String),
    #[error("Fixed-asset lines are not yet supported")]
    FixedAssetNotSupported,
    #[error("Cannot reverse non-accrual journal lines for {0}")]
    ReverseNonAccrual(String),
    #[error("Journal {journal_id} is not balanced: net amount {net}")]
    UnbalancedJournal { journal_id: Uuid, net: BigDecimal },
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Result type for posting operations
pub type PostingResult<T> = Result<T, PostingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_type_round_trips_through_storage_tags() {
        for lt in [
            LineType::Part,
            LineType::Service,
            LineType::Consumable,
            LineType::Material,
            LineType::Tool,
            LineType::Fixture,
            LineType::FixedAsset,
            LineType::Comment,
            LineType::GlAccount,
        ] {
            assert_eq!(lt.as_str().parse::<LineType>().unwrap(), lt);
        }
    }

    #[test]
    fn unknown_line_type_is_a_domain_error() {
        let err = "Unknown".parse::<LineType>().unwrap_err();
        assert!(matches!(err, PostingError::UnsupportedLineType(ref t) if t == "Unknown"));
    }

    #[test]
    fn counterpart_ref_round_trips_through_storage_key() {
        let r = CounterpartRef::new(CounterpartKind::Receipt, "po-line-7");
        assert_eq!(r.storage_key(), "receipt:po-line-7");
        assert_eq!(CounterpartRef::parse(&r.storage_key()).unwrap(), r);
    }

    #[test]
    fn malformed_counterpart_key_is_rejected() {
        assert!(CounterpartRef::parse("no-separator").is_err());
        assert!(CounterpartRef::parse("warehouse:123").is_err());
    }

    #[test]
    fn journal_balance_detects_net_drift() {
        let mut journal = Journal::new(
            "doc1".to_string(),
            "2024-01".to_string(),
            chrono::Utc::now().naive_utc(),
        );
        let group = Uuid::new_v4();
        journal.add_line(JournalLine::debit(
            journal.id,
            group,
            "1300",
            BigDecimal::from(50),
            BigDecimal::from(10),
        ));
        assert!(!journal.is_balanced());
        journal.add_line(JournalLine::credit(
            journal.id,
            group,
            "2050",
            BigDecimal::from(50),
            BigDecimal::from(10),
        ));
        assert!(journal.is_balanced());
        journal.validate().unwrap();
    }

    #[test]
    fn credit_lines_carry_negative_amounts() {
        let line = JournalLine::credit(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "2050",
            BigDecimal::from(25),
            BigDecimal::from(5),
        );
        assert_eq!(line.amount, BigDecimal::from(-25));
    }
}
