use super::ui;
use crate::core::allocation::{AllocationAnalysis, AllocationMember, AllocationReport};
use crate::core::currency::ReportingCurrency;
use crate::core::service::PortfolioService;
use crate::store::BookStore;
use anyhow::{Result, anyhow};
use comfy_table::Cell;

pub async fn run(
    service: &PortfolioService,
    group_id: u64,
    currency: ReportingCurrency,
) -> Result<()> {
    let pb = ui::new_spinner("Calculating allocation...");
    let report = service.analyze_allocation_group(group_id, currency).await;
    pb.finish_and_clear();

    match report? {
        AllocationReport::Empty { group_name, .. } => {
            println!("Allocation group '{group_name}' has no holdings with a value to analyze.");
        }
        AllocationReport::Analysis(analysis) => println!("{}", display_allocation_table(&analysis)),
    }
    Ok(())
}

pub fn create_group(book: &BookStore, name: &str, color: Option<String>) -> Result<()> {
    let id = book.create_allocation_group(name, color)?;
    println!("Created allocation group {id} '{name}'");
    Ok(())
}

pub fn assign(book: &BookStore, group_id: u64, members: Vec<AllocationMember>) -> Result<()> {
    let count = members.len();
    book.assign_allocation(group_id, members)?;
    println!("Allocation group {group_id} now has {count} members");
    Ok(())
}

/// Parses `stock#1=40` into a member with a 40% target.
pub fn parse_member(s: &str) -> Result<AllocationMember> {
    let (holding, target) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid member {s} (expected e.g. stock#1=40)"))?;
    let target_percentage = target
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| anyhow!("Invalid target in {s}: {e}"))?;
    Ok(AllocationMember {
        holding: holding.trim().parse()?,
        target_percentage,
    })
}

fn display_allocation_table(analysis: &AllocationAnalysis) -> String {
    let currency = analysis.currency;
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Holding"),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("Current"),
        ui::header_cell("Target"),
        ui::header_cell("Difference"),
        ui::header_cell(&format!("Target value ({currency})")),
        ui::header_cell(&format!("Buy/Sell ({currency})")),
    ]);

    for row in &analysis.rows {
        let name = match &row.ticker {
            Some(ticker) if *ticker != row.name => format!("{} ({ticker})", row.name),
            _ => row.name.clone(),
        };
        table.add_row(vec![
            Cell::new(name),
            ui::amount_cell(row.current_value),
            Cell::new(format!("{:.2}%", row.current_percentage)),
            Cell::new(format!("{:.2}%", row.target_percentage)),
            ui::change_cell(row.difference, "pp"),
            ui::amount_cell(row.target_value),
            ui::change_cell(row.suggestion_value, ""),
        ]);
    }

    format!(
        "Allocation: {}\n\n{}\n\nTotal Value ({}): {}",
        ui::style_text(&analysis.group_name, ui::StyleType::Title),
        table,
        ui::style_text(currency.code(), ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("{:.2}", analysis.total_value),
            ui::StyleType::TotalValue
        )
    )
}
