//! Order status rollup
//!
//! Status is recomputed from scratch from the order's line completeness
//! flags on every run. There is no incremental state to drift: the lines are
//! the source of truth.

use crate::types::{LineType, OrderStatus};

/// Completeness flags of one order line, the only inputs to the rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCompleteness {
    pub line_type: LineType,
    pub fulfilled_complete: bool,
    pub invoiced_complete: bool,
}

/// Classify an order from its line completeness flags.
///
/// Comment lines never hold an order open. The result is deterministic and
/// independent of line order. An order with no countable lines is complete.
pub fn rollup_order_status(lines: &[LineCompleteness]) -> OrderStatus {
    let countable = lines.iter().filter(|l| l.line_type != LineType::Comment);

    let mut all_fulfilled = true;
    let mut all_invoiced = true;
    for line in countable {
        all_fulfilled &= line.fulfilled_complete;
        all_invoiced &= line.invoiced_complete;
    }

    match (all_fulfilled, all_invoiced) {
        (true, true) => OrderStatus::Completed,
        (false, true) => OrderStatus::ToFulfill,
        (true, false) => OrderStatus::ToInvoice,
        (false, false) => OrderStatus::ToFulfillAndInvoice,
    }
}
