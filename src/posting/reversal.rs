//! Reversal / accrual matching engine
//!
//! When a document line is tied to a counterpart order line, this module
//! decides how much of the opposite step's provisional (accrual) postings can
//! be reversed now, and how much of the current quantity still needs a fresh
//! accrual. Receipt and invoice events for one order line may arrive in
//! either order and in several partial quantities; matching consumes the
//! journal-line history strictly in insertion (chronological) order.

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::types::{JournalLine, PostingError, PostingResult};

/// One economic event in a counterpart's journal-line history: consecutive
/// lines sharing a journal id and accrual flag, normally a debit/credit pair
#[derive(Debug, Clone, PartialEq)]
pub struct JournalLineGroup {
    pub journal_id: Uuid,
    pub accrual: bool,
    /// Quantity of the event, taken from the debit leg
    pub quantity: BigDecimal,
    /// Amount of the event, taken from the debit leg (positive)
    pub amount: BigDecimal,
    pub debit_account: String,
    pub credit_account: String,
}

/// Group a counterpart's ordered journal-line history into economic events
pub fn group_journal_lines(lines: &[JournalLine]) -> Vec<JournalLineGroup> {
    let zero = BigDecimal::from(0);
    let mut groups: Vec<JournalLineGroup> = Vec::new();
    let mut current: Option<JournalLineGroup> = None;
    // Debit leg of the pair still awaiting its credit leg.
    let mut open_pair: Option<Uuid> = None;

    for line in lines {
        let continues = matches!(
            &current,
            Some(g) if g.journal_id == line.journal_id && g.accrual == line.accrual
        );
        if !continues {
            groups.extend(current.take());
            open_pair = None;
            current = Some(JournalLineGroup {
                journal_id: line.journal_id,
                accrual: line.accrual,
                quantity: zero.clone(),
                amount: zero.clone(),
                debit_account: String::new(),
                credit_account: String::new(),
            });
        }
        if let Some(group) = current.as_mut() {
            // Legs classify by sign. A zero-amount leg opens its pair as
            // the debit and closes it as the credit: free-of-charge lines
            // post pairs with real quantities but a zero amount.
            let is_debit = if line.amount > zero {
                true
            } else if line.amount < zero {
                false
            } else {
                open_pair != Some(line.group_ref)
            };
            if is_debit {
                // A group may hold several pairs from one run; quantities
                // sum, one debit leg each.
                group.quantity += &line.quantity;
                group.amount += &line.amount;
                group.debit_account = line.account_no.clone();
                open_pair = Some(line.group_ref);
            } else {
                group.credit_account = line.account_no.clone();
                if open_pair == Some(line.group_ref) {
                    open_pair = None;
                }
            }
        }
    }
    groups.extend(current);

    groups
}

/// A single reversal to emit against one journal-line group: the opposite
/// sign of the original event, on the same two accounts
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalEntry {
    pub quantity: BigDecimal,
    /// Positive amount; the emitted pair debits `debit_account` and credits
    /// `credit_account`
    pub amount: BigDecimal,
    /// The original group's credit account
    pub debit_account: String,
    /// The original group's debit account
    pub credit_account: String,
}

/// Outcome of matching one document line against its counterpart history
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalPlan {
    /// Overlap between the two sides that this run may reverse
    pub quantity_to_reverse: BigDecimal,
    /// Quantity actually matched against history groups
    pub quantity_reversed: BigDecimal,
    pub entries: Vec<ReversalEntry>,
    /// Current quantity left over; to be posted as a new accrual
    pub residual_quantity: BigDecimal,
}

/// Match a line's current quantity against the counterpart's accrual history.
///
/// `this_side_quantity` and `other_side_quantity` are the counterpart order
/// line's running totals *before* this run's update. Groups are consumed
/// FIFO; the portion of the history already consumed by prior runs is skipped
/// via the `quantity_already_reversed` watermark. Attempting to draw from a
/// group that is not an accrual is a fatal error, never a silent skip.
pub fn plan_reversal(
    current_quantity: &BigDecimal,
    this_side_quantity: &BigDecimal,
    other_side_quantity: &BigDecimal,
    groups: &[JournalLineGroup],
    counterpart_id: &str,
) -> PostingResult<ReversalPlan> {
    let zero = BigDecimal::from(0);

    let overlap = (other_side_quantity - this_side_quantity).abs();
    let quantity_to_reverse = clamp_non_negative(min(current_quantity.clone(), overlap));

    // Portion of the history consumed by prior runs. If the other side still
    // leads, everything this side ever recorded has been matched already;
    // otherwise the other side's total is the matched portion.
    let quantity_already_reversed = if other_side_quantity > this_side_quantity {
        this_side_quantity.clone()
    } else {
        other_side_quantity.clone()
    };

    let mut quantity_counted = zero.clone();
    let mut quantity_reversed = zero.clone();
    let mut entries = Vec::new();

    for group in groups {
        let watermark_skip = min(
            clamp_non_negative(&quantity_already_reversed - &quantity_counted),
            group.quantity.clone(),
        );
        let supply = &group.quantity - &watermark_skip;
        let demand = &quantity_to_reverse - &quantity_reversed;
        let quantity_for_entry = clamp_non_negative(min(supply, demand));

        if quantity_for_entry > zero {
            if !group.accrual {
                return Err(PostingError::ReverseNonAccrual(counterpart_id.to_string()));
            }
            let unit_cost = if group.quantity == zero {
                zero.clone()
            } else {
                &group.amount / &group.quantity
            };
            entries.push(ReversalEntry {
                amount: &quantity_for_entry * &unit_cost,
                quantity: quantity_for_entry.clone(),
                debit_account: group.credit_account.clone(),
                credit_account: group.debit_account.clone(),
            });
        }

        quantity_counted += &group.quantity;
        quantity_reversed += quantity_for_entry;
    }

    // Residual follows what was actually matched: when the history cannot
    // supply the planned overlap (the lead changed sides, or prior runs
    // consumed it), the unmatched portion is accrued fresh.
    let residual_quantity = clamp_non_negative(current_quantity - &quantity_reversed);

    Ok(ReversalPlan {
        quantity_to_reverse,
        quantity_reversed,
        entries,
        residual_quantity,
    })
}

fn min(a: BigDecimal, b: BigDecimal) -> BigDecimal {
    if a <= b {
        a
    } else {
        b
    }
}

fn clamp_non_negative(value: BigDecimal) -> BigDecimal {
    if value < BigDecimal::from(0) {
        BigDecimal::from(0)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CounterpartKind, CounterpartRef};

    fn accrual_group(journal_id: Uuid, quantity: i64, amount: i64) -> Vec<JournalLine> {
        let group_ref = Uuid::new_v4();
        let counterpart = CounterpartRef::new(CounterpartKind::Receipt, "po-line-1");
        vec![
            JournalLine::debit(
                journal_id,
                group_ref,
                "1310",
                BigDecimal::from(amount),
                BigDecimal::from(quantity),
            )
            .with_counterpart(counterpart.clone())
            .as_accrual(),
            JournalLine::credit(
                journal_id,
                group_ref,
                "2210",
                BigDecimal::from(amount),
                BigDecimal::from(quantity),
            )
            .with_counterpart(counterpart)
            .as_accrual(),
        ]
    }

    #[test]
    fn grouping_splits_on_journal_and_accrual_flag() {
        let j1 = Uuid::new_v4();
        let j2 = Uuid::new_v4();
        let mut history = accrual_group(j1, 10, 50);
        history.extend(accrual_group(j2, 4, 20));

        let groups = group_journal_lines(&history);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].quantity, BigDecimal::from(10));
        assert_eq!(groups[0].amount, BigDecimal::from(50));
        assert_eq!(groups[0].debit_account, "1310");
        assert_eq!(groups[0].credit_account, "2210");
        assert_eq!(groups[1].quantity, BigDecimal::from(4));
    }

    #[test]
    fn zero_amount_pair_groups_as_a_single_event() {
        // A free-of-charge line accrues real quantity at amount zero; both
        // legs are zero, so the sign alone cannot tell them apart.
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 0));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].quantity, BigDecimal::from(10));
        assert_eq!(groups[0].amount, BigDecimal::from(0));
        assert_eq!(groups[0].debit_account, "1310");
        assert_eq!(groups[0].credit_account, "2210");
    }

    #[test]
    fn free_of_charge_group_does_not_absorb_the_costed_one() {
        // 10 received free, then 10 at unit cost 5; invoicing all 20 must
        // consume both groups rather than letting an inflated free group
        // satisfy the whole demand.
        let mut history = accrual_group(Uuid::new_v4(), 10, 0);
        history.extend(accrual_group(Uuid::new_v4(), 10, 50));
        let groups = group_journal_lines(&history);

        let plan = plan_reversal(
            &BigDecimal::from(20),
            &BigDecimal::from(0),
            &BigDecimal::from(20),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.quantity_reversed, BigDecimal::from(20));
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].quantity, BigDecimal::from(10));
        assert_eq!(plan.entries[0].amount, BigDecimal::from(0));
        assert_eq!(plan.entries[1].quantity, BigDecimal::from(10));
        assert_eq!(plan.entries[1].amount, BigDecimal::from(50));
        assert_eq!(plan.residual_quantity, BigDecimal::from(0));
    }

    #[test]
    fn full_match_reverses_entire_accrual() {
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 50));
        let plan = plan_reversal(
            &BigDecimal::from(10),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.quantity_to_reverse, BigDecimal::from(10));
        assert_eq!(plan.quantity_reversed, BigDecimal::from(10));
        assert_eq!(plan.residual_quantity, BigDecimal::from(0));
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].amount, BigDecimal::from(50));
        assert_eq!(plan.entries[0].debit_account, "2210");
        assert_eq!(plan.entries[0].credit_account, "1310");
    }

    #[test]
    fn partial_match_consumes_part_of_one_group() {
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 50));
        let plan = plan_reversal(
            &BigDecimal::from(6),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.quantity_reversed, BigDecimal::from(6));
        assert_eq!(plan.entries[0].amount, BigDecimal::from(30));
        assert_eq!(plan.residual_quantity, BigDecimal::from(0));
    }

    #[test]
    fn watermark_skips_quantity_reversed_by_prior_runs() {
        // 10 received, 6 already invoiced in an earlier run; invoicing the
        // remaining 4 must draw only the unconsumed tail of the group.
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 50));
        let plan = plan_reversal(
            &BigDecimal::from(4),
            &BigDecimal::from(6),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.quantity_to_reverse, BigDecimal::from(4));
        assert_eq!(plan.quantity_reversed, BigDecimal::from(4));
        assert_eq!(plan.entries[0].amount, BigDecimal::from(20));
    }

    #[test]
    fn matching_consumes_groups_fifo_across_partial_receipts() {
        // Two receipts at different unit costs (5 then 7); an invoice for 8
        // takes all 6 of the first group and 2 of the second, in order.
        let mut history = accrual_group(Uuid::new_v4(), 6, 30);
        history.extend(accrual_group(Uuid::new_v4(), 4, 28));
        let groups = group_journal_lines(&history);

        let plan = plan_reversal(
            &BigDecimal::from(8),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].quantity, BigDecimal::from(6));
        assert_eq!(plan.entries[0].amount, BigDecimal::from(30));
        assert_eq!(plan.entries[1].quantity, BigDecimal::from(2));
        assert_eq!(plan.entries[1].amount, BigDecimal::from(14));
    }

    #[test]
    fn never_reverses_more_than_any_group_holds() {
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 50));
        // Current quantity far exceeds what the other side ever recorded.
        let plan = plan_reversal(
            &BigDecimal::from(25),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert_eq!(plan.quantity_to_reverse, BigDecimal::from(10));
        assert_eq!(plan.quantity_reversed, BigDecimal::from(10));
        assert_eq!(plan.residual_quantity, BigDecimal::from(15));
        let total: BigDecimal = plan.entries.iter().map(|e| &e.quantity).sum();
        assert!(total <= plan.quantity_to_reverse);
    }

    #[test]
    fn reversing_a_final_group_is_fatal() {
        let journal_id = Uuid::new_v4();
        let group_ref = Uuid::new_v4();
        let history = vec![
            JournalLine::debit(
                journal_id,
                group_ref,
                "1300",
                BigDecimal::from(50),
                BigDecimal::from(10),
            ),
            JournalLine::credit(
                journal_id,
                group_ref,
                "5610",
                BigDecimal::from(50),
                BigDecimal::from(10),
            ),
        ];
        let groups = group_journal_lines(&history);

        let err = plan_reversal(
            &BigDecimal::from(10),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap_err();
        assert!(matches!(err, PostingError::ReverseNonAccrual(ref id) if id == "po-line-1"));
    }

    #[test]
    fn zero_current_quantity_plans_nothing() {
        let groups = group_journal_lines(&accrual_group(Uuid::new_v4(), 10, 50));
        let plan = plan_reversal(
            &BigDecimal::from(0),
            &BigDecimal::from(0),
            &BigDecimal::from(10),
            &groups,
            "po-line-1",
        )
        .unwrap();

        assert!(plan.entries.is_empty());
        assert_eq!(plan.quantity_to_reverse, BigDecimal::from(0));
        assert_eq!(plan.residual_quantity, BigDecimal::from(0));
    }

    #[test]
    fn leading_side_accrues_when_history_is_spent() {
        // This side already leads (6 recorded against the other side's 0);
        // with nothing reversible the whole current quantity is residual.
        let plan = plan_reversal(
            &BigDecimal::from(4),
            &BigDecimal::from(6),
            &BigDecimal::from(0),
            &[],
            "po-line-1",
        )
        .unwrap();

        assert!(plan.entries.is_empty());
        assert_eq!(plan.quantity_reversed, BigDecimal::from(0));
        assert_eq!(plan.residual_quantity, BigDecimal::from(4));
    }

    #[test]
    fn empty_history_accrues_the_full_quantity() {
        let plan = plan_reversal(
            &BigDecimal::from(10),
            &BigDecimal::from(0),
            &BigDecimal::from(0),
            &[],
            "po-line-1",
        )
        .unwrap();

        assert!(plan.entries.is_empty());
        assert_eq!(plan.quantity_to_reverse, BigDecimal::from(0));
        assert_eq!(plan.residual_quantity, BigDecimal::from(10));
    }
}
