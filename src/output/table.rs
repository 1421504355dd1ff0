//! Plain-text call tree listing.
//!
//! Tracing listings show `FUNCTION CALLS OWN /CALL % DEEP /CALL %`,
//! sampling listings show `FUNCTION OWN % DEEP %`. Percentages are relative
//! to the snapshot's total deep value.

use crate::stats::{flatten, Mode, Snapshot, SortKey, StatRecord};
use std::fmt::Write;
use std::time::Duration;

const NAME_WIDTH: usize = 48;

/// Render `snapshot` as an indented table
///
/// **Public** - used by `profile`, `live` and `view`
///
/// Siblings are ordered by `sort`. Nodes deeper than `max_depth` (when
/// given) are left out.
pub fn render_table(snapshot: &Snapshot, sort: SortKey, max_depth: Option<usize>) -> String {
    let mut out = String::new();
    let total = snapshot.deep_value();

    let _ = writeln!(
        out,
        "{} profile: wall {:?}, cpu {:?} ({:.1}%)",
        snapshot.mode,
        snapshot.wall_time(),
        snapshot.cpu_time(),
        snapshot.cpu_usage() * 100.0
    );
    let _ = writeln!(out, "{}", header(snapshot.mode));

    if snapshot.is_empty() {
        let _ = writeln!(out, "  (no statistics)");
        return out;
    }

    let mut printer = Printer {
        out: &mut out,
        mode: snapshot.mode,
        total,
        sort,
        max_depth,
    };
    printer.records(&snapshot.stats, 0);
    out
}

fn header(mode: Mode) -> String {
    match mode {
        Mode::Tracing => format!(
            "{:<width$} {:>8} {:>10} {:>10} {:>6} {:>10} {:>10} {:>6}",
            "FUNCTION",
            "CALLS",
            "OWN",
            "/CALL",
            "%",
            "DEEP",
            "/CALL",
            "%",
            width = NAME_WIDTH
        ),
        Mode::Sampling { .. } => format!(
            "{:<width$} {:>10} {:>6} {:>10} {:>6}",
            "FUNCTION",
            "OWN",
            "%",
            "DEEP",
            "%",
            width = NAME_WIDTH
        ),
    }
}

struct Printer<'a> {
    out: &'a mut String,
    mode: Mode,
    total: u64,
    sort: SortKey,
    max_depth: Option<usize>,
}

impl Printer<'_> {
    fn records(&mut self, records: &[StatRecord], depth: usize) {
        if self.max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for record in self.sort.sorted(records) {
            self.row(record, depth);
            self.records(&record.children, depth + 1);
        }
    }

    fn row(&mut self, record: &StatRecord, depth: usize) {
        let name = truncate(
            &format!("{}{}", "  ".repeat(depth), record.site.regular_name()),
            NAME_WIDTH,
        );
        let deep = record.deep_value();
        let own_pct = percent(record.own_value, self.total);
        let deep_pct = percent(deep, self.total);

        let _ = match self.mode {
            Mode::Tracing => writeln!(
                self.out,
                "{:<width$} {:>8} {:>10} {:>10} {:>5.1}% {:>10} {:>10} {:>5.1}%",
                name,
                record.call_count,
                format_duration(Duration::from_nanos(record.own_value)),
                format_duration(Duration::from_nanos(record.own_per_call() as u64)),
                own_pct,
                format_duration(Duration::from_nanos(deep)),
                format_duration(Duration::from_nanos(record.deep_per_call() as u64)),
                deep_pct,
                width = NAME_WIDTH
            ),
            Mode::Sampling { .. } => writeln!(
                self.out,
                "{:<width$} {:>10} {:>5.1}% {:>10} {:>5.1}%",
                name,
                record.own_value,
                own_pct,
                deep,
                deep_pct,
                width = NAME_WIDTH
            ),
        };
    }
}

/// Render per-call-site totals, heaviest own value first
///
/// Deep values of recursive functions count every occurrence.
pub fn render_flat(snapshot: &Snapshot, limit: Option<usize>) -> String {
    let mut out = String::new();
    let total = snapshot.deep_value();
    let stats = flatten(snapshot);

    let _ = writeln!(
        out,
        "{:<width$} {:>8} {:>12} {:>6} {:>12}",
        "FUNCTION",
        "CALLS",
        "OWN",
        "%",
        "DEEP",
        width = NAME_WIDTH
    );
    for stat in stats.iter().take(limit.unwrap_or(usize::MAX)) {
        let (own, deep) = match snapshot.mode {
            Mode::Tracing => (
                format_duration(Duration::from_nanos(stat.own_value)),
                format_duration(Duration::from_nanos(stat.deep_value)),
            ),
            Mode::Sampling { .. } => (stat.own_value.to_string(), stat.deep_value.to_string()),
        };
        let _ = writeln!(
            out,
            "{:<width$} {:>8} {:>12} {:>5.1}% {:>12}",
            truncate(&stat.site.regular_name(), NAME_WIDTH),
            stat.call_count,
            own,
            percent(stat.own_value, total),
            deep,
            width = NAME_WIDTH
        );
    }
    out
}

fn percent(value: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        value as f64 / total as f64 * 100.0
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let kept: String = name.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Human-readable duration with a unit picked by magnitude
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.1}us", nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1e6)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
