use super::ui;
use crate::core::currency::ReportingCurrency;
use crate::core::service::PortfolioService;
use crate::core::valuation::PortfolioValuation;
use anyhow::Result;
use comfy_table::Cell;

impl PortfolioValuation {
    pub fn display_as_table(&self, currency: ReportingCurrency) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Holding"),
            ui::header_cell("Shares"),
            ui::header_cell("Price"),
            ui::header_cell("Native value"),
            ui::header_cell(&format!("Value ({currency})")),
            ui::header_cell("Weight (%)"),
        ]);

        for holding in &self.holdings {
            let name_display = match &holding.ticker {
                Some(ticker) if *ticker != holding.name => format!("{} ({ticker})", holding.name),
                _ => holding.name.clone(),
            };
            let native_currency = &holding.native_currency;

            table.add_row(vec![
                Cell::new(name_display),
                ui::format_optional_cell(holding.shares, |s| format!("{s:.2}")),
                ui::format_optional_cell(holding.price, |p| format!("{p:.2} {native_currency}")),
                Cell::new(format!("{:.2} {native_currency}", holding.native_value)),
                ui::amount_cell(holding.values.get(currency)),
                ui::format_optional_cell(self.weight_of(holding), |w| format!("{w:.2}%")),
            ]);
        }

        let mut output = format!(
            "Portfolio value as of {}\n\n",
            ui::style_text(
                &self.rates.as_of.format("%Y-%m-%d %H:%M UTC").to_string(),
                ui::StyleType::Title
            )
        );
        output.push_str(&table.to_string());

        if !self.currency_totals.is_empty() {
            let by_currency = self
                .currency_totals
                .iter()
                .map(|t| format!("{:.2} {}", t.total, t.currency))
                .collect::<Vec<_>>()
                .join(", ");
            output.push_str(&format!(
                "\n\n{}: {}",
                ui::style_text("By currency", ui::StyleType::Subtle),
                by_currency
            ));
        }

        output.push_str(&format!(
            "\n\nTotal Value ({}): {}\n{}",
            ui::style_text(currency.code(), ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:.2}", self.totals.get(currency)),
                ui::StyleType::TotalValue
            ),
            ui::style_text(&ui::format_values(&self.totals), ui::StyleType::Subtle)
        ));

        output
    }
}

pub async fn run(service: &PortfolioService, currency: ReportingCurrency) -> Result<()> {
    let pb = ui::new_spinner("Fetching prices and exchange rates...");
    let valuation = service.valuate_portfolio().await;
    pb.finish_and_clear();

    let valuation = valuation?;
    if valuation.holdings.is_empty() {
        println!("No holdings found. Add some to the holdings book first.");
        return Ok(());
    }

    println!("{}", valuation.display_as_table(currency));
    Ok(())
}
