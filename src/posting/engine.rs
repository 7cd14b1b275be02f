//! Posting procedures: one generic skeleton behind three document-type
//! entry points
//!
//! Each run is a single invocation: validate the request, fetch the source
//! document and master data, build every ledger row in memory, then persist
//! the lot through one atomic commit. On any error the source document's
//! status is forced back to its pre-posting state (best effort) and the
//! original error is surfaced. The engine takes no locks; callers must not
//! run two postings against the same counterpart order line concurrently.

use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

use crate::posting::allocation::{allocate_document_costs, LineAllocation};
use crate::posting::builder::{self, GlPostingSide, PostingGroupCache};
use crate::posting::reversal::{group_journal_lines, plan_reversal};
use crate::posting::status::{rollup_order_status, LineCompleteness};
use crate::traits::{PostingCommit, PostingStorage};
use crate::types::*;
use crate::utils::validation;

/// Which of the three posting procedures is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostingSide {
    Receipt,
    PurchaseInvoice,
    SalesInvoice,
}

impl PostingSide {
    fn document_kind(self) -> DocumentKind {
        match self {
            PostingSide::Receipt => DocumentKind::Receipt,
            PostingSide::PurchaseInvoice => DocumentKind::PurchaseInvoice,
            PostingSide::SalesInvoice => DocumentKind::SalesInvoice,
        }
    }

    /// Kind this side tags its own accruals with
    fn own_kind(self) -> CounterpartKind {
        match self {
            PostingSide::Receipt => CounterpartKind::Receipt,
            PostingSide::PurchaseInvoice | PostingSide::SalesInvoice => CounterpartKind::Invoice,
        }
    }

    /// Kind of the opposite step, whose accruals this side reverses
    fn other_kind(self) -> CounterpartKind {
        match self {
            PostingSide::Receipt => CounterpartKind::Invoice,
            PostingSide::PurchaseInvoice => CounterpartKind::Receipt,
            PostingSide::SalesInvoice => CounterpartKind::Shipment,
        }
    }

    /// Sub-document kind generated for counterpart-less invoice lines
    fn generated_kind(self) -> Option<DocumentKind> {
        match self {
            PostingSide::Receipt => None,
            PostingSide::PurchaseInvoice => Some(DocumentKind::Receipt),
            PostingSide::SalesInvoice => Some(DocumentKind::Shipment),
        }
    }
}

/// Main posting engine over a storage backend
pub struct PostingEngine<S: PostingStorage> {
    storage: S,
}

impl<S: PostingStorage> PostingEngine<S> {
    /// Create an engine over the given storage backend
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Borrow the underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Post a goods receipt against a purchase order, creating inventory and
    /// reversing any prior invoice-side accrual
    pub async fn post_receipt(&mut self, request: PostingRequest) -> PostingResult<PostingSummary> {
        self.post(PostingSide::Receipt, request).await
    }

    /// Post a supplier invoice, creating payables and reversing any prior
    /// receipt-side accrual
    pub async fn post_purchase_invoice(
        &mut self,
        request: PostingRequest,
    ) -> PostingResult<PostingSummary> {
        self.post(PostingSide::PurchaseInvoice, request).await
    }

    /// Post a customer invoice, creating receivables and reversing any prior
    /// shipment-side accrual
    pub async fn post_sales_invoice(
        &mut self,
        request: PostingRequest,
    ) -> PostingResult<PostingSummary> {
        self.post(PostingSide::SalesInvoice, request).await
    }

    async fn post(
        &mut self,
        side: PostingSide,
        request: PostingRequest,
    ) -> PostingResult<PostingSummary> {
        validation::validate_posting_request(&request)?;

        let document = self
            .storage
            .get_document(&request.document_id)
            .await?
            .ok_or_else(|| PostingError::DocumentNotFound(request.document_id.clone()))?;
        if document.kind != side.document_kind() {
            return Err(PostingError::Validation(format!(
                "Document '{}' is a {:?}, expected {:?}",
                document.id,
                document.kind,
                side.document_kind()
            )));
        }
        if document.status != DocumentStatus::Draft {
            return Err(PostingError::NotPostable {
                id: document.id.clone(),
                status: document.status,
            });
        }

        let prior_status = document.status;
        match self.post_inner(side, &document).await {
            Ok(summary) => {
                tracing::debug!(
                    document_id = %summary.document_id,
                    journal_id = %summary.journal_id,
                    "posting run committed"
                );
                Ok(summary)
            }
            Err(error) => {
                // Compensating action only; the commit itself is atomic.
                if let Err(revert_error) = self
                    .storage
                    .reset_document_status(&document.id, prior_status)
                    .await
                {
                    tracing::warn!(
                        document_id = %document.id,
                        %revert_error,
                        "status revert after failed posting run also failed"
                    );
                }
                Err(error)
            }
        }
    }

    async fn post_inner(
        &mut self,
        side: PostingSide,
        document: &SourceDocument,
    ) -> PostingResult<PostingSummary> {
        let lines = self.storage.get_document_lines(&document.id).await?;
        if lines.is_empty() {
            return Err(PostingError::Fetch(format!(
                "document '{}' has no lines",
                document.id
            )));
        }
        validation::validate_document_lines(&lines)?;

        let partner = self
            .storage
            .get_trading_partner(&document.partner_id)
            .await?
            .ok_or_else(|| {
                PostingError::Fetch(format!(
                    "trading partner '{}' for document '{}'",
                    document.partner_id, document.id
                ))
            })?;

        let posted_at = Utc::now().naive_utc();
        let today = posted_at.date();
        let period = self
            .storage
            .open_period(today)
            .await?
            .ok_or(PostingError::NoOpenPeriod(today))?;

        let allocations =
            allocate_document_costs(&lines, &document.shipping_cost, &document.exchange_rate);

        let mut journal = Journal::new(document.id.clone(), period.id.clone(), posted_at);
        let mut cache = PostingGroupCache::new();
        let mut item_entries: Vec<ItemLedgerEntry> = Vec::new();
        let mut cost_entries: Vec<CostLedgerEntry> = Vec::new();
        let mut counterpart_updates: HashMap<String, CounterpartOrderLine> = HashMap::new();
        let mut pending_sub_lines: BTreeMap<String, Vec<GeneratedSubDocumentLine>> =
            BTreeMap::new();

        for (line, alloc) in lines.iter().zip(&allocations) {
            match line.line_type {
                LineType::Comment => continue,
                LineType::FixedAsset => return Err(PostingError::FixedAssetNotSupported),
                LineType::GlAccount => {
                    self.post_gl_line(side, &partner, line, alloc, &mut journal)
                        .await?
                }
                lt if lt.affects_inventory() => {
                    self.post_inventory_line(
                        side,
                        document,
                        &partner,
                        line,
                        alloc,
                        posted_at,
                        &mut cache,
                        &mut journal,
                        &mut item_entries,
                        &mut cost_entries,
                        &mut counterpart_updates,
                        &mut pending_sub_lines,
                    )
                    .await?
                }
                other => {
                    return Err(PostingError::UnsupportedLineType(other.as_str().to_string()))
                }
            }
        }

        // Synthesize the receipt/shipment for invoice lines that had no
        // counterpart order line, one document per location.
        let mut generated_documents = Vec::new();
        let mut generated_numbers = Vec::new();
        if let Some(kind) = side.generated_kind() {
            for (location_id, sub_lines) in pending_sub_lines {
                let number = self.storage.next_document_number(kind).await?;
                generated_numbers.push(number.clone());
                generated_documents.push(GeneratedSubDocument {
                    id: Uuid::new_v4(),
                    number,
                    kind,
                    location_id,
                    source_document_id: document.id.clone(),
                    lines: sub_lines,
                });
            }
        }

        // Reclassify every order touched through a counterpart line, from
        // the full set of its lines.
        let order_ids: BTreeSet<String> = counterpart_updates
            .values()
            .map(|c| c.order_id.clone())
            .collect();
        let mut order_status_updates = Vec::new();
        for order_id in &order_ids {
            self.storage
                .get_order(order_id)
                .await?
                .ok_or_else(|| PostingError::Fetch(format!("order '{}'", order_id)))?;
            let order_lines = self.storage.get_order_lines(order_id).await?;
            let completeness: Vec<LineCompleteness> = order_lines
                .iter()
                .map(|order_line| {
                    let effective = counterpart_updates.get(&order_line.id).unwrap_or(order_line);
                    LineCompleteness {
                        line_type: effective.line_type,
                        fulfilled_complete: effective.fulfilled_complete,
                        invoiced_complete: effective.invoiced_complete,
                    }
                })
                .collect();
            order_status_updates.push((order_id.clone(), rollup_order_status(&completeness)));
        }

        journal.validate()?;

        let summary = PostingSummary {
            journal_id: journal.id,
            document_id: document.id.clone(),
            generated_document_numbers: generated_numbers,
            orders_updated: order_ids.into_iter().collect(),
        };
        let commit = PostingCommit {
            document_id: document.id.clone(),
            document_status: DocumentStatus::Posted,
            posted_at,
            journal,
            item_entries,
            cost_entries,
            counterpart_updates: counterpart_updates.into_values().collect(),
            order_status_updates,
            generated_documents,
        };
        self.storage.commit_run(commit).await?;

        Ok(summary)
    }

    /// Direct G/L posting: validated target, overhead-applied leg for the
    /// line's shipping share, settlement leg on the partner. No
    /// quantity-matching logic.
    async fn post_gl_line(
        &self,
        side: PostingSide,
        partner: &TradingPartner,
        line: &DocumentLine,
        alloc: &LineAllocation,
        journal: &mut Journal,
    ) -> PostingResult<()> {
        if side == PostingSide::Receipt {
            return Err(PostingError::Validation(format!(
                "Line '{}': G/L Account lines cannot be posted from a receipt",
                line.id
            )));
        }
        let account_no = line.gl_account_no.as_deref().ok_or_else(|| {
            PostingError::Validation(format!("Line '{}' has no G/L account", line.id))
        })?;
        let account = self
            .storage
            .get_gl_account(account_no)
            .await?
            .ok_or_else(|| {
                PostingError::Fetch(format!(
                    "G/L account '{}' for line '{}'",
                    account_no, line.id
                ))
            })?;
        if !account.direct_posting {
            return Err(PostingError::DirectPostingNotAllowed(account_no.to_string()));
        }

        let gl_side = if side == PostingSide::PurchaseInvoice {
            GlPostingSide::Payables
        } else {
            GlPostingSide::Receivables
        };
        builder::gl_account_legs(
            journal,
            gl_side,
            account_no,
            &partner.overhead_applied_account,
            &partner.settlement_account,
            alloc.line_cost.clone(),
            alloc.weighted_shipping.clone(),
            line.quantity.clone(),
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn post_inventory_line(
        &mut self,
        side: PostingSide,
        document: &SourceDocument,
        partner: &TradingPartner,
        line: &DocumentLine,
        alloc: &LineAllocation,
        posted_at: chrono::NaiveDateTime,
        cache: &mut PostingGroupCache,
        journal: &mut Journal,
        item_entries: &mut Vec<ItemLedgerEntry>,
        cost_entries: &mut Vec<CostLedgerEntry>,
        counterpart_updates: &mut HashMap<String, CounterpartOrderLine>,
        pending_sub_lines: &mut BTreeMap<String, Vec<GeneratedSubDocumentLine>>,
    ) -> PostingResult<()> {
        let zero = BigDecimal::from(0);

        let item_id = line
            .item_id
            .as_deref()
            .ok_or_else(|| PostingError::Validation(format!("Line '{}' has no item", line.id)))?;
        let item = self.storage.get_item(item_id).await?.ok_or_else(|| {
            PostingError::Fetch(format!("item '{}' for line '{}'", item_id, line.id))
        })?;

        let quantity = line.quantity_in_inventory_units();
        let total_cost = alloc.total_cost();
        if quantity == zero && total_cost == zero {
            return Ok(());
        }
        let unit_cost = alloc.unit_cost.clone();
        let location = line.location_or(&document.location_id).to_string();

        let inventory_group = cache
            .inventory(&self.storage, &item.posting_group_id, &location)
            .await?;
        let accrued_account = match side {
            PostingSide::Receipt | PostingSide::PurchaseInvoice => {
                cache
                    .purchase(&self.storage, &item.posting_group_id, &partner.partner_type_id)
                    .await?
                    .accrued_receipts_account
            }
            PostingSide::SalesInvoice => {
                cache
                    .sales(&self.storage, &item.posting_group_id, &partner.partner_type_id)
                    .await?
                    .accrued_shipments_account
            }
        };

        // Outbound movements are valued at the item's current cost, not at
        // the selling price on the line.
        let outbound_unit_cost = if side == PostingSide::SalesInvoice
            && item.tracking == ItemTrackingKind::Inventory
        {
            let cost = self.storage.get_item_cost(&item.id).await?.ok_or_else(|| {
                PostingError::Fetch(format!("item cost for '{}' on line '{}'", item.id, line.id))
            })?;
            Some(cost.unit_cost)
        } else {
            None
        };

        if let Some(cp_id) = line.counterpart_line_id.as_deref() {
            // Totals must reflect earlier lines of this run touching the
            // same counterpart.
            let counterpart = match counterpart_updates.get(cp_id) {
                Some(updated) => updated.clone(),
                None => self
                    .storage
                    .get_counterpart_line(cp_id)
                    .await?
                    .ok_or_else(|| {
                        PostingError::Fetch(format!(
                            "counterpart order line '{}' for line '{}'",
                            cp_id, line.id
                        ))
                    })?,
            };
            let (this_side_quantity, other_side_quantity) = if side == PostingSide::Receipt {
                (
                    counterpart.quantity_fulfilled.clone(),
                    counterpart.quantity_invoiced.clone(),
                )
            } else {
                (
                    counterpart.quantity_invoiced.clone(),
                    counterpart.quantity_fulfilled.clone(),
                )
            };

            let history_key = CounterpartRef::new(side.other_kind(), cp_id);
            let history = self.storage.journal_lines_for(&history_key).await?;
            let groups = group_journal_lines(&history);
            let plan = plan_reversal(
                &quantity,
                &this_side_quantity,
                &other_side_quantity,
                &groups,
                cp_id,
            )?;

            // Everything this run writes for the counterpart carries this
            // side's own key; the opposite procedure's watermark accounts
            // for reversal pairs alongside consumed accruals.
            let own_key = CounterpartRef::new(side.own_kind(), cp_id);
            for entry in &plan.entries {
                builder::reversal_pair(journal, entry, own_key.clone());
            }
            if plan.residual_quantity > zero {
                let residual_amount = &plan.residual_quantity * &unit_cost;
                builder::accrual_pair(
                    journal,
                    &inventory_group.inventory_interim_account,
                    &accrued_account,
                    residual_amount,
                    plan.residual_quantity.clone(),
                    Some(own_key),
                );
            }

            let mut updated = counterpart;
            if side == PostingSide::Receipt {
                updated.quantity_fulfilled = &updated.quantity_fulfilled + &quantity;
                updated.fulfilled_complete = updated.quantity_fulfilled >= updated.quantity_ordered;
            } else {
                updated.quantity_invoiced = &updated.quantity_invoiced + &quantity;
                updated.invoiced_complete = updated.quantity_invoiced >= updated.quantity_ordered;
            }
            counterpart_updates.insert(cp_id.to_string(), updated);
        } else if side == PostingSide::Receipt {
            // Standalone receipt line: accrue without a reversal key.
            if quantity > zero {
                builder::accrual_pair(
                    journal,
                    &inventory_group.inventory_interim_account,
                    &accrued_account,
                    total_cost.clone(),
                    quantity.clone(),
                    None,
                );
            }
        } else if quantity > zero {
            // The invoice is simultaneously the physical event: queue a
            // generated receipt/shipment line for this location.
            pending_sub_lines
                .entry(location.clone())
                .or_default()
                .push(GeneratedSubDocumentLine {
                    id: Uuid::new_v4(),
                    source_line_id: line.id.clone(),
                    item_id: item.id.clone(),
                    quantity: quantity.clone(),
                });
        }

        // Physical movement rows: every receipt line, and invoice lines that
        // double as the receipt/shipment event.
        let movement = match side {
            PostingSide::Receipt => Some((ItemLedgerEntryType::PositiveAdjustment, &unit_cost)),
            PostingSide::PurchaseInvoice if line.counterpart_line_id.is_none() => {
                Some((ItemLedgerEntryType::PositiveAdjustment, &unit_cost))
            }
            PostingSide::SalesInvoice if line.counterpart_line_id.is_none() => outbound_unit_cost
                .as_ref()
                .map(|cost| (ItemLedgerEntryType::NegativeAdjustment, cost)),
            _ => None,
        };
        if let Some((entry_type, movement_unit_cost)) = movement {
            let (new_items, new_costs) = builder::item_movement_entries(
                &item,
                entry_type,
                &quantity,
                movement_unit_cost,
                &location,
                &document.id,
                &line.serial_numbers,
                posted_at,
            )?;
            item_entries.extend(new_items);
            cost_entries.extend(new_costs);
        }

        // Final value postings; receipts carry only the accrual until the
        // invoice arrives.
        match side {
            PostingSide::Receipt => {}
            PostingSide::PurchaseInvoice => {
                let group = cache
                    .purchase(&self.storage, &item.posting_group_id, &partner.partner_type_id)
                    .await?;
                let value_account =
                    builder::inventory_value_account(&inventory_group, &item, line.outside_processing);
                builder::final_pair(
                    journal,
                    &value_account,
                    &group.direct_cost_applied_account,
                    total_cost.clone(),
                    quantity.clone(),
                );
                builder::final_pair(
                    journal,
                    &group.purchase_account,
                    &partner.settlement_account,
                    total_cost,
                    quantity,
                );
            }
            PostingSide::SalesInvoice => {
                let group = cache
                    .sales(&self.storage, &item.posting_group_id, &partner.partner_type_id)
                    .await?;
                builder::final_pair(
                    journal,
                    &partner.settlement_account,
                    &group.sales_account,
                    total_cost,
                    quantity.clone(),
                );
                if let Some(cost) = &outbound_unit_cost {
                    let cost_amount = cost * &quantity;
                    if cost_amount != zero {
                        let value_account = builder::inventory_value_account(
                            &inventory_group,
                            &item,
                            line.outside_processing,
                        );
                        builder::final_pair(
                            journal,
                            &group.cogs_account,
                            &value_account,
                            cost_amount,
                            quantity,
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
