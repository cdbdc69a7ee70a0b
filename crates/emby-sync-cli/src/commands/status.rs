use super::Context;
use crate::output::Output;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Color, Table};
use watch_sync_core::{load_status, KindCounts, StatusSummary};

pub fn run_status(ctx: &Context, output: &Output) -> Result<()> {
    let summary = load_status(&ctx.snapshot_store(), &ctx.ledger_store())?;
    if output.is_human() {
        if !output.is_quiet() {
            print_tables(&summary);
        }
    } else {
        output.report(&summary);
    }
    Ok(())
}

fn styled(table: &mut Table) {
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
}

fn header(title: &str) -> Cell {
    Cell::new(title).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

fn count_row(label: &str, counts: &KindCounts) -> Vec<Cell> {
    vec![
        Cell::new(label),
        Cell::new(counts.total),
        Cell::new(counts.fully_watched),
        Cell::new(counts.partially_watched),
        Cell::new(counts.pushed),
        Cell::new(counts.pending).fg(if counts.pending > 0 { Color::Yellow } else { Color::Reset }),
    ]
}

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn print_tables(summary: &StatusSummary) {
    let mut items = Table::new();
    items.set_header(vec![
        header("Items"),
        header("Total"),
        header("Watched"),
        header("Partial"),
        header("Pushed"),
        header("Pending"),
    ]);
    items.add_row(count_row("Movies", &summary.movies));
    items.add_row(count_row("Episodes", &summary.episodes));
    styled(&mut items);
    println!("{}", items);
    println!();

    let mut times = Table::new();
    times.set_header(vec![header("Checkpoint"), header("Time")]);
    times.add_row(vec![Cell::new("Last full download"), Cell::new(when(summary.last_full_sync_at))]);
    times.add_row(vec![
        Cell::new("Last incremental download"),
        Cell::new(when(summary.last_incremental_sync_at)),
    ]);
    if summary.last_push_at.is_empty() {
        times.add_row(vec![Cell::new("Last push"), Cell::new(when(None))]);
    }
    for (destination, at) in &summary.last_push_at {
        times.add_row(vec![
            Cell::new(format!("Last push to {}", destination)),
            Cell::new(when(Some(*at))),
        ]);
    }
    styled(&mut times);
    println!("{}", times);

    if summary.unmatched > 0 {
        println!();
        let mut unmatched = Table::new();
        unmatched.set_header(vec![
            header(&format!("Unmatched ({})", summary.unmatched)),
            header("Count"),
        ]);
        for (reason, n) in &summary.unmatched_reasons {
            unmatched.add_row(vec![Cell::new(reason.replace('_', " ")), Cell::new(n)]);
        }
        styled(&mut unmatched);
        println!("{}", unmatched);
    }
}
