use super::ui;
use crate::core::currency::{CurrencyValues, ReportingCurrency};
use crate::core::roi::{ChartPoint, RoiRange, RoiResult, RoiStatus};
use crate::core::service::PortfolioService;
use anyhow::Result;
use comfy_table::{Attribute, Cell};

pub async fn run(service: &PortfolioService, range: RoiRange, labels: &[String]) -> Result<()> {
    let pb = ui::new_spinner("Fetching exchange rates for cash flows...");
    let result = service.compute_roi(range, labels).await;
    pb.finish_and_clear();

    println!("{}", render_roi(&result?, labels));
    Ok(())
}

pub async fn chart(service: &PortfolioService, range: RoiRange, labels: &[String]) -> Result<()> {
    let pb = ui::new_spinner("Fetching exchange rates for cash flows...");
    let points = service.get_chart_data(range, labels).await;
    pb.finish_and_clear();

    let points = points?;
    if points.is_empty() {
        println!("No snapshots in range {range}.");
        return Ok(());
    }
    println!("{}", render_chart(&points));
    Ok(())
}

fn title(range: RoiRange, labels: &[String]) -> String {
    let scope = if labels.is_empty() {
        "whole portfolio".to_string()
    } else {
        format!("labels: {}", labels.join(", "))
    };
    format!(
        "Return over {} ({scope})",
        ui::style_text(&range.to_string(), ui::StyleType::Title)
    )
}

fn render_roi(result: &RoiResult, labels: &[String]) -> String {
    let mut output = title(result.range, labels);

    if result.status == RoiStatus::InsufficientSnapshotData {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(
                &format!(
                    "Not enough snapshots: found {}, need at least 2.",
                    result.snapshot_count
                ),
                ui::StyleType::Error
            )
        ));
        return output;
    }

    if let (Some(start), Some(end)) = (result.start_date, result.end_date) {
        output.push_str(&format!(
            "\n{} snapshots from {} to {}",
            result.snapshot_count,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ));
    }

    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("")];
    header.extend(ui::currency_headers(""));
    table.set_header(header);

    let amount_rows: [(&str, Option<CurrencyValues>); 4] = [
        ("Start value", result.start_value),
        ("End value", result.end_value),
        ("Net cash flow", result.net_cash_flow),
        ("Gain", result.absolute_gain),
    ];
    for (name, values) in amount_rows {
        table.add_row(values_row(name, values, ""));
    }

    let percent_rows: [(&str, Option<CurrencyValues>); 3] = [
        ("ROI", result.roi_percent),
        ("Modified Dietz", result.dietz_percent),
        ("Annualized", result.annualized_percent),
    ];
    for (name, values) in percent_rows {
        table.add_row(values_row(name, values, "%"));
    }

    output.push_str(&format!("\n\n{table}"));
    output
}

fn values_row(name: &str, values: Option<CurrencyValues>, suffix: &str) -> Vec<Cell> {
    let mut row = vec![Cell::new(name).add_attribute(Attribute::Bold)];
    for currency in ReportingCurrency::ALL {
        row.push(match values {
            Some(v) if suffix.is_empty() => ui::amount_cell(v.get(currency)),
            Some(v) => ui::change_cell(v.get(currency), suffix),
            None => ui::na_cell(),
        });
    }
    row
}

fn render_chart(points: &[ChartPoint]) -> String {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date")];
    header.extend(ui::currency_headers("Total "));
    header.push(ui::header_cell("ROI (RON)"));
    table.set_header(header);

    for point in points {
        table.add_row(vec![
            Cell::new(point.date.format("%Y-%m-%d %H:%M")),
            ui::amount_cell(point.total_ron),
            ui::amount_cell(point.total_eur),
            ui::amount_cell(point.total_usd),
            point
                .roi_percent
                .map_or_else(ui::na_cell, |r| ui::change_cell(r, "%")),
        ]);
    }
    table.to_string()
}
