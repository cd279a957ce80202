use super::ui;
use crate::core::currency::BASE_CURRENCY;
use crate::core::service::PortfolioService;
use crate::core::snapshot::{Snapshot, SnapshotDetail, SnapshotId};
use anyhow::{Result, anyhow};
use comfy_table::Cell;

pub async fn create(service: &PortfolioService) -> Result<()> {
    let pb = ui::new_spinner("Valuing holdings for snapshot...");
    let snapshot = service.create_snapshot().await;
    pb.finish_and_clear();

    let snapshot = snapshot?;
    println!(
        "Snapshot {} taken at {} with {} holdings",
        ui::style_text(&snapshot.id.to_string(), ui::StyleType::TotalLabel),
        snapshot.taken_at.format("%Y-%m-%d %H:%M UTC"),
        snapshot.item_count
    );
    println!(
        "Total: {}",
        ui::style_text(&ui::format_values(&snapshot.totals), ui::StyleType::TotalValue)
    );
    Ok(())
}

pub fn list(service: &PortfolioService) -> Result<()> {
    let snapshots = service.list_snapshots()?;
    if snapshots.is_empty() {
        println!("No snapshots yet. Run `folio snapshot create` to take one.");
        return Ok(());
    }
    println!("{}", render_list(&snapshots));
    Ok(())
}

pub fn show(service: &PortfolioService, id: SnapshotId) -> Result<()> {
    let detail = service
        .get_snapshot(id)?
        .ok_or_else(|| anyhow!("Snapshot {id} not found"))?;
    println!("{}", detail.display_as_table());
    Ok(())
}

fn render_list(snapshots: &[Snapshot]) -> String {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Id"), ui::header_cell("Taken at")];
    header.extend(ui::currency_headers("Total "));
    header.push(ui::header_cell("Holdings"));
    table.set_header(header);

    for snapshot in snapshots {
        let mut row = vec![
            Cell::new(snapshot.id),
            Cell::new(snapshot.taken_at.format("%Y-%m-%d %H:%M")),
        ];
        row.extend(ui::currency_cells(&snapshot.totals));
        row.push(Cell::new(snapshot.item_count));
        table.add_row(row);
    }
    table.to_string()
}

impl SnapshotDetail {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        let mut header = vec![
            ui::header_cell("Holding"),
            ui::header_cell("Labels"),
            ui::header_cell("Shares"),
            ui::header_cell("Price"),
            ui::header_cell("Native value"),
        ];
        header.extend(ui::currency_headers(""));
        table.set_header(header);

        for item in &self.items {
            let name = match &item.ticker {
                Some(ticker) if *ticker != item.name => format!("{} ({ticker})", item.name),
                _ => item.name.clone(),
            };
            let labels = item
                .labels
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            let mut row = vec![
                Cell::new(name),
                Cell::new(labels),
                ui::format_optional_cell(item.shares, |s| format!("{s:.2}")),
                ui::format_optional_cell(item.price, |p| format!("{p:.2}")),
                Cell::new(format!("{:.2} {}", item.native_value, item.native_currency)),
            ];
            row.extend(ui::currency_cells(&item.values));
            table.add_row(row);
        }

        let rates = self
            .snapshot
            .rates
            .rates
            .iter()
            .filter(|(code, _)| code.as_str() != BASE_CURRENCY)
            .map(|(code, rate)| format!("1 {code} = {rate:.4} RON"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Snapshot {} taken at {}\n{}\n\n{}\n\nTotal: {}",
            ui::style_text(&self.snapshot.id.to_string(), ui::StyleType::Title),
            self.snapshot.taken_at.format("%Y-%m-%d %H:%M UTC"),
            ui::style_text(&rates, ui::StyleType::Subtle),
            table,
            ui::style_text(
                &ui::format_values(&self.snapshot.totals),
                ui::StyleType::TotalValue
            )
        )
    }
}
