//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use ledgersim_sim::{EventStats, InvariantTiming};

fn styled_table(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col)
                    .add_attribute(Attribute::Bold)
                    .fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);
    table
}

fn number(n: impl ToString) -> Cell {
    Cell::new(n.to_string()).set_alignment(CellAlignment::Right)
}

/// Per-route operation counts.
pub fn stats_table(stats: &EventStats) -> Table {
    let mut table = styled_table(&["route", "ok", "skipped", "follow-ups"]);
    for (route, s) in stats.routes() {
        table.add_row(vec![
            Cell::new(route),
            number(s.ok),
            number(s.skipped),
            number(s.scheduled),
        ]);
    }
    table.add_row(vec![
        Cell::new("total").add_attribute(Attribute::Bold),
        number(stats.total_ok()),
        number(stats.total_skipped()),
        number(""),
    ]);
    table
}

/// Invariant timings against one state.
pub fn timing_table(timings: &[InvariantTiming]) -> Table {
    let mut table = styled_table(&["invariant", "time (µs)", "status"]);
    for t in timings {
        let status = match (t.broken, super::no_color()) {
            (false, _) => Cell::new("holds"),
            (true, true) => Cell::new("BROKEN"),
            (true, false) => Cell::new("BROKEN").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&t.route),
            number(t.elapsed.as_micros()),
            status,
        ]);
    }
    table
}

/// Key-value summary (two columns).
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}
