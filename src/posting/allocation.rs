//! Per-line cost allocation with proportional document shipping

use bigdecimal::BigDecimal;

use crate::types::DocumentLine;

/// Cost figures computed for one document line, in ledger currency
#[derive(Debug, Clone, PartialEq)]
pub struct LineAllocation {
    pub line_id: String,
    /// quantity * unit price + line shipping + line surcharge
    pub line_cost: BigDecimal,
    /// This line's proportional share of the document shipping charge
    pub weighted_shipping: BigDecimal,
    /// Cost per inventory unit, shipping share included
    pub unit_cost: BigDecimal,
}

impl LineAllocation {
    /// Line cost plus its shipping share
    pub fn total_cost(&self) -> BigDecimal {
        &self.line_cost + &self.weighted_shipping
    }
}

/// Allocate document-level shipping across lines by relative line cost and
/// derive each line's inventory-unit cost.
///
/// All document-currency amounts are converted with `exchange_rate` first.
/// Returns one allocation per input line, in input order, though no line's
/// result depends on the order. A zero lines total or a zero line quantity
/// yields a zero share rather than a division error.
pub fn allocate_document_costs(
    lines: &[DocumentLine],
    document_shipping: &BigDecimal,
    exchange_rate: &BigDecimal,
) -> Vec<LineAllocation> {
    let zero = BigDecimal::from(0);
    let shipping_total = document_shipping * exchange_rate;

    let line_costs: Vec<BigDecimal> = lines
        .iter()
        .map(|line| {
            (&line.quantity * &line.unit_price + &line.line_shipping + &line.line_surcharge)
                * exchange_rate
        })
        .collect();
    let total_lines_cost: BigDecimal = line_costs.iter().sum();

    lines
        .iter()
        .zip(line_costs)
        .map(|(line, line_cost)| {
            let weighted_shipping = if total_lines_cost == zero {
                zero.clone()
            } else {
                &shipping_total * &line_cost / &total_lines_cost
            };
            let inventory_quantity = line.quantity_in_inventory_units();
            let unit_cost = if inventory_quantity == zero {
                zero.clone()
            } else {
                (&line_cost + &weighted_shipping) / &inventory_quantity
            };
            LineAllocation {
                line_id: line.id.clone(),
                line_cost,
                weighted_shipping,
                unit_cost,
            }
        })
        .collect()
}
