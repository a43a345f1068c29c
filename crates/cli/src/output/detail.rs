//! Allocator summary and the JSON report.

use anyhow::Result;
use colored::Colorize;
use rebase_allocator::Vault;
use serde::Serialize;

use crate::amount::format_amount;
use crate::output::format_positions_table;
use crate::scenario::{StepOutcome, World};

#[derive(Debug, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub action: String,
    pub profit: String,
    pub loss: String,
    pub debt_payment: String,
    pub liquidated: String,
    pub total_assets: String,
}

#[derive(Debug, Serialize)]
pub struct PositionRecord {
    pub pool: String,
    pub address: String,
    pub weight_bps: u16,
    pub value: String,
    pub free_liquidity: String,
    pub redeemable: String,
}

#[derive(Debug, Serialize)]
pub struct AllocatorRecord {
    pub address: String,
    pub total_assets: String,
    pub idle: String,
    pub debt: String,
    pub debt_outstanding: String,
    pub emergency_exit: bool,
    pub price_per_share: String,
    pub user_balance: String,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
    pub allocator: AllocatorRecord,
    pub positions: Vec<PositionRecord>,
}

pub fn build_report(world: &World, outcomes: &[StepOutcome]) -> Result<RunReport> {
    let decimals = world.decimals;
    let steps = outcomes
        .iter()
        .map(|o| StepRecord {
            step: o.index,
            action: o.label.clone(),
            profit: format_amount(o.profit, decimals),
            loss: format_amount(o.loss, decimals),
            debt_payment: format_amount(o.debt_payment, decimals),
            liquidated: format_amount(o.liquidated, decimals),
            total_assets: format_amount(o.total_assets, decimals),
        })
        .collect();

    let positions = world
        .allocator
        .position_values(&world.ledger)?
        .into_iter()
        .map(|p| PositionRecord {
            pool: world.pool_name(p.pool),
            address: p.pool.to_string(),
            weight_bps: p.weight_bps,
            value: format_amount(p.value, decimals),
            free_liquidity: format_amount(p.free_liquidity, decimals),
            redeemable: format_amount(p.redeemable, decimals),
        })
        .collect();

    let allocator = AllocatorRecord {
        address: world.allocator.address.to_string(),
        total_assets: format_amount(world.total_assets()?, decimals),
        idle: format_amount(world.allocator.idle(&world.ledger), decimals),
        debt: format_amount(world.vault_debt(), decimals),
        debt_outstanding: format_amount(
            world
                .vault
                .debt_outstanding(&world.ledger, world.allocator.address),
            decimals,
        ),
        emergency_exit: world.allocator.emergency_exit,
        price_per_share: format_amount(world.vault.price_per_share(&world.ledger), decimals),
        user_balance: format_amount(world.user_balance(), decimals),
    };

    Ok(RunReport {
        steps,
        allocator,
        positions,
    })
}

pub fn format_summary(world: &World) -> Result<String> {
    let decimals = world.decimals;
    let allocator = &world.allocator;
    let mut output = String::new();

    // Header
    output.push_str(&format!("{}\n", "=".repeat(60)));
    output.push_str(&format!("{}\n", "Allocator".bold()));
    output.push_str(&format!("{}\n\n", "=".repeat(60)));

    output.push_str(&format!("{}\n", "Books".cyan().bold()));
    output.push_str(&format!("  Address:          {}\n", allocator.address));
    output.push_str(&format!(
        "  Total Assets:     {}\n",
        format_amount(world.total_assets()?, decimals)
    ));
    output.push_str(&format!(
        "  Idle:             {}\n",
        format_amount(allocator.idle(&world.ledger), decimals)
    ));
    output.push_str(&format!(
        "  Debt:             {}\n",
        format_amount(world.vault_debt(), decimals)
    ));
    output.push_str(&format!(
        "  Debt Outstanding: {}\n",
        format_amount(
            world.vault.debt_outstanding(&world.ledger, allocator.address),
            decimals
        )
    ));
    output.push_str(&format!(
        "  Emergency Exit:   {}\n\n",
        if allocator.emergency_exit { "Yes" } else { "No" }
    ));

    output.push_str(&format!("{}\n", "Vault".cyan().bold()));
    output.push_str(&format!(
        "  Price Per Share:  {}\n",
        format_amount(world.vault.price_per_share(&world.ledger), decimals)
    ));
    output.push_str(&format!(
        "  User Balance:     {}\n\n",
        format_amount(world.user_balance(), decimals)
    ));

    let positions = allocator.position_values(&world.ledger)?;
    output.push_str(&format!("{}\n", "Positions".cyan().bold()));
    output.push_str(&format_positions_table(world, &positions));
    output.push('\n');

    let stuck: Vec<_> = positions
        .iter()
        .filter(|p| p.redeemable < p.value)
        .collect();
    if !stuck.is_empty() {
        output.push_str(&format!("\n{}\n", "Warnings".yellow().bold()));
        for position in stuck {
            output.push_str(&format!(
                "  [ILLIQUID] {} can only return {} of {}\n",
                world.pool_name(position.pool),
                format_amount(position.redeemable, decimals),
                format_amount(position.value, decimals)
            ));
        }
    }

    Ok(output)
}
