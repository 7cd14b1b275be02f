//! Ledger-entry construction helpers and per-run posting-group resolution

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use uuid::Uuid;

use crate::posting::reversal::ReversalEntry;
use crate::traits::PostingStorage;
use crate::types::*;

/// Memoized posting-group lookups, scoped to the lifetime of one posting run
///
/// No cross-run state: the engine builds a fresh cache per invocation.
#[derive(Debug, Default)]
pub struct PostingGroupCache {
    inventory: HashMap<(String, String), InventoryPostingGroup>,
    purchase: HashMap<(String, String), PurchasePostingGroup>,
    sales: HashMap<(String, String), SalesPostingGroup>,
}

impl PostingGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the inventory account mapping, fetching at most once per key
    pub async fn inventory<S: PostingStorage>(
        &mut self,
        storage: &S,
        item_posting_group_id: &str,
        location_id: &str,
    ) -> PostingResult<InventoryPostingGroup> {
        let key = (item_posting_group_id.to_string(), location_id.to_string());
        if let Some(group) = self.inventory.get(&key) {
            return Ok(group.clone());
        }
        let group = storage
            .get_inventory_posting_group(item_posting_group_id, location_id)
            .await?
            .ok_or_else(|| {
                PostingError::MissingPostingGroup(format!(
                    "inventory group '{}' at location '{}'",
                    item_posting_group_id, location_id
                ))
            })?;
        self.inventory.insert(key, group.clone());
        Ok(group)
    }

    /// Resolve the purchasing account mapping, fetching at most once per key
    pub async fn purchase<S: PostingStorage>(
        &mut self,
        storage: &S,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<PurchasePostingGroup> {
        let key = (
            item_posting_group_id.to_string(),
            partner_type_id.to_string(),
        );
        if let Some(group) = self.purchase.get(&key) {
            return Ok(group.clone());
        }
        let group = storage
            .get_purchase_posting_group(item_posting_group_id, partner_type_id)
            .await?
            .ok_or_else(|| {
                PostingError::MissingPostingGroup(format!(
                    "purchase group '{}' for partner type '{}'",
                    item_posting_group_id, partner_type_id
                ))
            })?;
        self.purchase.insert(key, group.clone());
        Ok(group)
    }

    /// Resolve the sales account mapping, fetching at most once per key
    pub async fn sales<S: PostingStorage>(
        &mut self,
        storage: &S,
        item_posting_group_id: &str,
        partner_type_id: &str,
    ) -> PostingResult<SalesPostingGroup> {
        let key = (
            item_posting_group_id.to_string(),
            partner_type_id.to_string(),
        );
        if let Some(group) = self.sales.get(&key) {
            return Ok(group.clone());
        }
        let group = storage
            .get_sales_posting_group(item_posting_group_id, partner_type_id)
            .await?
            .ok_or_else(|| {
                PostingError::MissingPostingGroup(format!(
                    "sales group '{}' for partner type '{}'",
                    item_posting_group_id, partner_type_id
                ))
            })?;
        self.sales.insert(key, group.clone());
        Ok(group)
    }
}

/// Account that carries a line's inventory value
///
/// Outside-processing lines post against work in progress; non-inventory
/// items post against the overhead family instead of inventory.
pub fn inventory_value_account(
    group: &InventoryPostingGroup,
    item: &Item,
    outside_processing: bool,
) -> String {
    if outside_processing {
        group.wip_account.clone()
    } else {
        match item.tracking {
            ItemTrackingKind::Inventory => group.inventory_account.clone(),
            ItemTrackingKind::NonInventory => group.overhead_account.clone(),
        }
    }
}

/// Emit a provisional accrual pair: debit the inventory interim account,
/// credit the accrued receipts/shipments account
///
/// Lines without a counterpart order line accrue with no reversal key;
/// nothing will ever match them.
pub fn accrual_pair(
    journal: &mut Journal,
    interim_account: &str,
    accrued_account: &str,
    amount: BigDecimal,
    quantity: BigDecimal,
    counterpart: Option<CounterpartRef>,
) {
    let group_ref = Uuid::new_v4();
    let mut debit = JournalLine::debit(
        journal.id,
        group_ref,
        interim_account,
        amount.clone(),
        quantity.clone(),
    )
    .as_accrual();
    let mut credit =
        JournalLine::credit(journal.id, group_ref, accrued_account, amount, quantity).as_accrual();
    if let Some(counterpart) = counterpart {
        debit = debit.with_counterpart(counterpart.clone());
        credit = credit.with_counterpart(counterpart);
    }
    journal.add_line(debit);
    journal.add_line(credit);
}

/// Emit the offsetting pair for one matched history group.
///
/// The pair is tagged with the posting side's own key: later runs of the
/// opposite procedure skip it via their watermark, which counts every
/// matched unit exactly once.
pub fn reversal_pair(journal: &mut Journal, entry: &ReversalEntry, counterpart: CounterpartRef) {
    let group_ref = Uuid::new_v4();
    journal.add_line(
        JournalLine::debit(
            journal.id,
            group_ref,
            entry.debit_account.clone(),
            entry.amount.clone(),
            entry.quantity.clone(),
        )
        .with_counterpart(counterpart.clone()),
    );
    journal.add_line(
        JournalLine::credit(
            journal.id,
            group_ref,
            entry.credit_account.clone(),
            entry.amount.clone(),
            entry.quantity.clone(),
        )
        .with_counterpart(counterpart),
    );
}

/// Emit a final (non-accrual) debit/credit pair with no reversal key
pub fn final_pair(
    journal: &mut Journal,
    debit_account: &str,
    credit_account: &str,
    amount: BigDecimal,
    quantity: BigDecimal,
) {
    let group_ref = Uuid::new_v4();
    journal.add_line(JournalLine::debit(
        journal.id,
        group_ref,
        debit_account,
        amount.clone(),
        quantity.clone(),
    ));
    journal.add_line(JournalLine::credit(
        journal.id,
        group_ref,
        credit_account,
        amount,
        quantity,
    ));
}

/// Which settlement side a direct G/L posting faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlPostingSide {
    /// Supplier invoice: debit the target, credit payables
    Payables,
    /// Customer invoice: credit the target, debit receivables
    Receivables,
}

/// Emit the three-leg posting for a G/L Account line: target account (net),
/// overhead-applied account (the line's weighted shipping), and the
/// partner's settlement account (gross)
pub fn gl_account_legs(
    journal: &mut Journal,
    side: GlPostingSide,
    target_account: &str,
    overhead_applied_account: &str,
    settlement_account: &str,
    net_amount: BigDecimal,
    overhead_amount: BigDecimal,
    quantity: BigDecimal,
) {
    let group_ref = Uuid::new_v4();
    let gross = &net_amount + &overhead_amount;
    match side {
        GlPostingSide::Payables => {
            journal.add_line(JournalLine::debit(
                journal.id,
                group_ref,
                target_account,
                net_amount,
                quantity.clone(),
            ));
            journal.add_line(JournalLine::debit(
                journal.id,
                group_ref,
                overhead_applied_account,
                overhead_amount,
                quantity.clone(),
            ));
            journal.add_line(JournalLine::credit(
                journal.id,
                group_ref,
                settlement_account,
                gross,
                quantity,
            ));
        }
        GlPostingSide::Receivables => {
            journal.add_line(JournalLine::debit(
                journal.id,
                group_ref,
                settlement_account,
                gross,
                quantity.clone(),
            ));
            journal.add_line(JournalLine::credit(
                journal.id,
                group_ref,
                target_account,
                net_amount,
                quantity.clone(),
            ));
            journal.add_line(JournalLine::credit(
                journal.id,
                group_ref,
                overhead_applied_account,
                overhead_amount,
                quantity,
            ));
        }
    }
}

/// Build the item-ledger and cost-ledger rows for one physical movement.
///
/// Non-inventory items produce no rows. Serial-tracked items produce one row
/// per unit, each carrying a serial number from the line; the serial count
/// must match the movement quantity exactly. Batch and untracked items
/// produce a single row carrying the full quantity.
pub fn item_movement_entries(
    item: &Item,
    entry_type: ItemLedgerEntryType,
    quantity: &BigDecimal,
    unit_cost: &BigDecimal,
    location_id: &str,
    document_id: &str,
    serial_numbers: &[String],
    posted_at: NaiveDateTime,
) -> PostingResult<(Vec<ItemLedgerEntry>, Vec<CostLedgerEntry>)> {
    if item.tracking == ItemTrackingKind::NonInventory || *quantity == BigDecimal::from(0) {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut item_entries = Vec::new();
    let mut cost_entries = Vec::new();

    match item.serial_tracking {
        SerialTracking::Serial => {
            let units = quantity.to_u64().filter(|n| {
                // Serialized movements must be whole units.
                BigDecimal::from(*n) == *quantity
            });
            let units = units.ok_or_else(|| {
                PostingError::Validation(format!(
                    "Serial-tracked item '{}' requires a whole-number quantity, got {}",
                    item.id, quantity
                ))
            })?;
            if serial_numbers.len() as u64 != units {
                return Err(PostingError::Validation(format!(
                    "Serial-tracked item '{}' needs {} serial numbers, got {}",
                    item.id,
                    units,
                    serial_numbers.len()
                )));
            }
            for serial_no in serial_numbers {
                let entry = ItemLedgerEntry {
                    id: Uuid::new_v4(),
                    item_id: item.id.clone(),
                    entry_type,
                    quantity: BigDecimal::from(1),
                    location_id: location_id.to_string(),
                    serial_no: Some(serial_no.clone()),
                    document_id: document_id.to_string(),
                    posted_at,
                };
                cost_entries.push(CostLedgerEntry {
                    id: Uuid::new_v4(),
                    item_ledger_entry_id: entry.id,
                    item_id: item.id.clone(),
                    amount: unit_cost.clone(),
                    posted_at,
                });
                item_entries.push(entry);
            }
        }
        SerialTracking::Batch | SerialTracking::None => {
            let entry = ItemLedgerEntry {
                id: Uuid::new_v4(),
                item_id: item.id.clone(),
                entry_type,
                quantity: quantity.clone(),
                location_id: location_id.to_string(),
                serial_no: None,
                document_id: document_id.to_string(),
                posted_at,
            };
            cost_entries.push(CostLedgerEntry {
                id: Uuid::new_v4(),
                item_ledger_entry_id: entry.id,
                item_id: item.id.clone(),
                amount: unit_cost * quantity,
                posted_at,
            });
            item_entries.push(entry);
        }
    }

    Ok((item_entries, cost_entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(tracking: ItemTrackingKind, serial: SerialTracking) -> Item {
        Item {
            id: "item1".to_string(),
            posting_group_id: "FINISHED".to_string(),
            tracking,
            serial_tracking: serial,
        }
    }

    fn inventory_group() -> InventoryPostingGroup {
        InventoryPostingGroup {
            item_posting_group_id: "FINISHED".to_string(),
            location_id: "MAIN".to_string(),
            inventory_account: "1300".to_string(),
            inventory_interim_account: "1310".to_string(),
            wip_account: "1350".to_string(),
            overhead_account: "5490".to_string(),
        }
    }

    #[test]
    fn value_account_follows_tracking_and_processing() {
        let group = inventory_group();
        let stocked = item(ItemTrackingKind::Inventory, SerialTracking::None);
        let expensed = item(ItemTrackingKind::NonInventory, SerialTracking::None);

        assert_eq!(inventory_value_account(&group, &stocked, false), "1300");
        assert_eq!(inventory_value_account(&group, &expensed, false), "5490");
        assert_eq!(inventory_value_account(&group, &stocked, true), "1350");
    }

    #[test]
    fn serialized_movement_emits_one_row_per_unit() {
        let tracked = item(ItemTrackingKind::Inventory, SerialTracking::Serial);
        let serials = vec!["SN1".to_string(), "SN2".to_string(), "SN3".to_string()];
        let (items, costs) = item_movement_entries(
            &tracked,
            ItemLedgerEntryType::PositiveAdjustment,
            &BigDecimal::from(3),
            &BigDecimal::from(5),
            "MAIN",
            "doc1",
            &serials,
            Utc::now().naive_utc(),
        )
        .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(costs.len(), 3);
        for (row, serial) in items.iter().zip(&serials) {
            assert_eq!(row.quantity, BigDecimal::from(1));
            assert_eq!(row.serial_no.as_ref().unwrap(), serial);
        }
        let total: BigDecimal = costs.iter().map(|c| &c.amount).sum();
        assert_eq!(total, BigDecimal::from(15));
    }

    #[test]
    fn serial_count_mismatch_is_rejected() {
        let tracked = item(ItemTrackingKind::Inventory, SerialTracking::Serial);
        let err = item_movement_entries(
            &tracked,
            ItemLedgerEntryType::PositiveAdjustment,
            &BigDecimal::from(3),
            &BigDecimal::from(5),
            "MAIN",
            "doc1",
            &["SN1".to_string()],
            Utc::now().naive_utc(),
        )
        .unwrap_err();
        assert!(matches!(err, PostingError::Validation(_)));
    }

    #[test]
    fn batch_movement_emits_a_single_full_quantity_row() {
        let tracked = item(ItemTrackingKind::Inventory, SerialTracking::Batch);
        let (items, costs) = item_movement_entries(
            &tracked,
            ItemLedgerEntryType::NegativeAdjustment,
            &BigDecimal::from(7),
            &BigDecimal::from(2),
            "MAIN",
            "doc1",
            &[],
            Utc::now().naive_utc(),
        )
        .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, BigDecimal::from(7));
        assert_eq!(items[0].serial_no, None);
        assert_eq!(costs[0].amount, BigDecimal::from(14));
    }

    #[test]
    fn non_inventory_items_move_nothing() {
        let expensed = item(ItemTrackingKind::NonInventory, SerialTracking::None);
        let (items, costs) = item_movement_entries(
            &expensed,
            ItemLedgerEntryType::PositiveAdjustment,
            &BigDecimal::from(5),
            &BigDecimal::from(3),
            "MAIN",
            "doc1",
            &[],
            Utc::now().naive_utc(),
        )
        .unwrap();
        assert!(items.is_empty());
        assert!(costs.is_empty());
    }

    #[test]
    fn gl_legs_balance_on_both_sides() {
        let mut journal = Journal::new(
            "doc1".to_string(),
            "2024-01".to_string(),
            Utc::now().naive_utc(),
        );
        gl_account_legs(
            &mut journal,
            GlPostingSide::Payables,
            "6100",
            "5420",
            "2100",
            BigDecimal::from(80),
            BigDecimal::from(20),
            BigDecimal::from(1),
        );
        gl_account_legs(
            &mut journal,
            GlPostingSide::Receivables,
            "4000",
            "5420",
            "1200",
            BigDecimal::from(60),
            BigDecimal::from(15),
            BigDecimal::from(1),
        );
        assert_eq!(journal.lines.len(), 6);
        assert!(journal.is_balanced());
    }
}
