use super::ui;
use crate::core::holding::{Holding, HoldingRef, Label, LabelId, Transaction};
use crate::core::store::HoldingsStore;
use crate::core::service::PortfolioService;
use crate::store::{Book, BookStore};
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use comfy_table::Cell;
use std::collections::HashMap;

pub fn list(book: &BookStore) -> Result<()> {
    let book = book.book()?;
    if book.holdings.is_empty() {
        println!("No holdings yet. Add one with `folio holding add-stock` or `add-manual`.");
        return Ok(());
    }
    println!("{}", render_holdings(&book));
    Ok(())
}

pub fn add_stock(
    book: &BookStore,
    ticker: &str,
    shares: f64,
    currency: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let holding = book.add_stock(ticker, shares, currency, name)?;
    println!("Added {holding} ({})", ticker.to_uppercase());
    Ok(())
}

pub fn add_manual(book: &BookStore, name: &str, value: f64, currency: &str) -> Result<()> {
    let holding = book.add_manual(name, value, currency)?;
    println!("Added {holding} ({name})");
    Ok(())
}

pub fn remove(book: &BookStore, holding: HoldingRef) -> Result<()> {
    book.delete_holding(holding)?;
    println!("Removed {holding}; past snapshots keep their copy of it");
    Ok(())
}

pub async fn add_shares(
    service: &PortfolioService,
    holding: HoldingRef,
    shares: f64,
    price: f64,
    date: NaiveDate,
    notes: Option<String>,
) -> Result<()> {
    let pb = ui::new_spinner("Resolving the holding's currency...");
    let tx = service
        .add_shares(holding, shares, price, date, notes)
        .await;
    pb.finish_and_clear();

    let tx = tx?;
    let verb = if tx.shares >= 0.0 { "Bought" } else { "Withdrew" };
    println!(
        "{verb} {:.4} shares of {holding} at {:.2} {} on {} ({:.2} {})",
        tx.shares.abs(),
        tx.price_per_share,
        tx.currency,
        tx.date,
        tx.amount(),
        tx.currency
    );
    Ok(())
}

pub async fn add_value(
    service: &PortfolioService,
    holding: HoldingRef,
    amount: f64,
    date: NaiveDate,
    notes: Option<String>,
) -> Result<()> {
    let increment = service.add_value(holding, amount, date, notes).await?;
    println!(
        "Recorded {:+.2} {} for {holding} on {}",
        increment.amount, increment.currency, increment.date
    );
    Ok(())
}

pub fn list_transactions(book: &BookStore) -> Result<()> {
    let transactions = book.transactions()?;
    if transactions.is_empty() {
        println!("No transactions recorded yet.");
        return Ok(());
    }
    println!("{}", render_transactions(&transactions));
    Ok(())
}

pub fn correct_transaction(
    book: &BookStore,
    id: u64,
    date: Option<NaiveDate>,
    price: Option<f64>,
    notes: Option<String>,
) -> Result<()> {
    if date.is_none() && price.is_none() && notes.is_none() {
        return Err(anyhow!("Nothing to correct; pass --date, --price or --notes"));
    }
    let tx = book.correct_transaction(id, date, price, notes)?;
    println!(
        "Transaction {id} for {} now {:+.4} shares at {:.2} {} on {}",
        tx.holding, tx.shares, tx.price_per_share, tx.currency, tx.date
    );
    Ok(())
}

pub fn add_label(book: &BookStore, name: &str, color: Option<String>) -> Result<()> {
    let id = book.add_label(name, color)?;
    println!("Created label {id} '{name}'");
    Ok(())
}

pub fn rename_label(book: &BookStore, id: LabelId, name: &str) -> Result<()> {
    book.rename_label(id, name)?;
    println!("Renamed label {id} to '{name}'");
    Ok(())
}

/// Replaces the labels of `holding` with the labels named in `names`.
pub fn set_labels(book: &BookStore, holding: HoldingRef, names: &[String]) -> Result<()> {
    let labels = book.book()?.labels;
    let ids = resolve_labels(&labels, names)?;
    book.set_labels(holding, ids)?;
    println!("{holding} labels: {}", names.join(", "));
    Ok(())
}

fn resolve_labels(labels: &[Label], names: &[String]) -> Result<Vec<LabelId>> {
    names
        .iter()
        .map(|name| {
            labels
                .iter()
                .find(|l| l.name.eq_ignore_ascii_case(name))
                .map(|l| l.id)
                .ok_or_else(|| anyhow!("Label '{name}' not found"))
        })
        .collect()
}

fn render_holdings(book: &Book) -> String {
    let label_names: HashMap<LabelId, &str> = book
        .labels
        .iter()
        .map(|l| (l.id, l.name.as_str()))
        .collect();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ref"),
        ui::header_cell("Name"),
        ui::header_cell("Ticker"),
        ui::header_cell("Shares / Value"),
        ui::header_cell("Currency"),
        ui::header_cell("Labels"),
    ]);

    for holding in &book.holdings {
        let (amount, currency) = match holding {
            Holding::Stock(s) => (
                format!("{:.4}", s.shares),
                s.known_currency().unwrap_or("?").to_string(),
            ),
            Holding::Manual(m) => (format!("{:.2}", m.value), m.currency.clone()),
        };
        let labels = holding
            .labels()
            .iter()
            .filter_map(|id| label_names.get(id).copied())
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            Cell::new(holding.holding_ref()),
            Cell::new(holding.name()),
            Cell::new(holding.ticker().unwrap_or("")),
            Cell::new(amount),
            Cell::new(currency),
            Cell::new(labels),
        ]);
    }
    table.to_string()
}

fn render_transactions(transactions: &[Transaction]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Holding"),
        ui::header_cell("Date"),
        ui::header_cell("Shares"),
        ui::header_cell("Price"),
        ui::header_cell("Amount"),
        ui::header_cell("Notes"),
    ]);
    for tx in transactions {
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(tx.holding),
            Cell::new(tx.date),
            Cell::new(format!("{:+.4}", tx.shares)),
            Cell::new(format!("{:.2} {}", tx.price_per_share, tx.currency)),
            ui::amount_cell(tx.amount()),
            Cell::new(tx.notes.as_deref().unwrap_or("")),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_labels_is_case_insensitive() {
        let labels = vec![
            Label {
                id: 1,
                name: "Growth".to_string(),
                color: None,
            },
            Label {
                id: 2,
                name: "Safe".to_string(),
                color: Some("#00ff00".to_string()),
            },
        ];
        let ids = resolve_labels(&labels, &["safe".to_string(), "GROWTH".to_string()]).unwrap();
        assert_eq!(ids, vec![2, 1]);

        let err = resolve_labels(&labels, &["Bonds".to_string()]).unwrap_err();
        assert!(err.to_string().contains("'Bonds' not found"));
    }

    #[test]
    fn test_correct_transaction_rejects_empty_correction() {
        let store = BookStore::in_memory(Book::default());
        let stock = store.add_stock("aapl", 0.0, None, None).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let tx = store.add_shares(stock, 2.0, 10.0, "USD", date, None).unwrap();

        let err = correct_transaction(&store, tx.id, None, None, None).unwrap_err();
        assert!(err.to_string().contains("Nothing to correct"));

        correct_transaction(&store, tx.id, None, Some(12.5), None).unwrap();
        let output = render_transactions(&store.transactions().unwrap());
        assert!(output.contains("stock#1"));
        assert!(output.contains("2025-03-03"));
        assert!(output.contains("+2.0000"));
        assert!(output.contains("12.50 USD"));
        assert!(output.contains("25.00"));
    }

    #[test]
    fn test_render_holdings() {
        let store = BookStore::in_memory(Book::default());
        let stock = store
            .add_stock("vwce.de", 12.0, Some("eur".to_string()), None)
            .unwrap();
        store.add_manual("Deposit", 2500.0, "ron").unwrap();
        let label = store.add_label("Growth", None).unwrap();
        store.set_labels(stock, vec![label]).unwrap();

        let output = render_holdings(&store.book().unwrap());
        assert!(output.contains("stock#1"));
        assert!(output.contains("VWCE.DE"));
        assert!(output.contains("12.0000"));
        assert!(output.contains("EUR"));
        assert!(output.contains("Growth"));
        assert!(output.contains("manual#1"));
        assert!(output.contains("2500.00"));
    }
}
