//! Table formatting for step results and positions.

use alloy_primitives::U256;
use rebase_allocator::{PositionReport, MAX_BPS};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::amount::format_amount;
use crate::scenario::{StepOutcome, World};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Profit")]
    profit: String,
    #[tabled(rename = "Loss")]
    loss: String,
    #[tabled(rename = "Debt Payment")]
    debt_payment: String,
    #[tabled(rename = "Liquidated")]
    liquidated: String,
    #[tabled(rename = "Total Assets")]
    total_assets: String,
}

#[derive(Tabled)]
struct PositionRow {
    #[tabled(rename = "Pool")]
    pool: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Free Liquidity")]
    free_liquidity: String,
    #[tabled(rename = "Redeemable")]
    redeemable: String,
}

pub(crate) fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() > max_len {
        let kept: String = name.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        name.to_string()
    }
}

pub(crate) fn format_bps(bps: u16) -> String {
    format!("{:.2}%", f64::from(bps) * 100.0 / f64::from(MAX_BPS))
}

/// Shows a dash for zero so that the interesting cells stand out
fn format_cell(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        "-".to_string()
    } else {
        format_amount(amount, decimals)
    }
}

pub fn format_steps_table(outcomes: &[StepOutcome], decimals: u8) -> String {
    if outcomes.is_empty() {
        return "No steps executed.".to_string();
    }

    let rows: Vec<StepRow> = outcomes
        .iter()
        .map(|o| StepRow {
            index: o.index,
            step: truncate_name(&o.label, 32),
            profit: format_cell(o.profit, decimals),
            loss: format_cell(o.loss, decimals),
            debt_payment: format_cell(o.debt_payment, decimals),
            liquidated: format_cell(o.liquidated, decimals),
            total_assets: format_amount(o.total_assets, decimals),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));

    table.to_string()
}

pub fn format_positions_table(world: &World, positions: &[PositionReport]) -> String {
    if positions.is_empty() {
        return "No positions.".to_string();
    }

    let rows: Vec<PositionRow> = positions
        .iter()
        .map(|p| PositionRow {
            pool: truncate_name(&world.pool_name(p.pool), 20),
            weight: format_bps(p.weight_bps),
            value: format_amount(p.value, world.decimals),
            free_liquidity: format_amount(p.free_liquidity, world.decimals),
            redeemable: format_amount(p.redeemable, world.decimals),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));

    table.to_string()
}
