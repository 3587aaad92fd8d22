// ── Daily schedules ──
//
// Run and Wave programs are lists of entries keyed by a start minute
// (`st`, minutes since midnight). The entry in force is the one with the
// latest start not after the current minute, whatever the list order.

use chrono::{Local, Timelike};
use serde_json::Value;

/// Minutes since local midnight.
pub fn current_minute() -> u32 {
    let now = Local::now();
    now.hour() * 60 + now.minute()
}

/// Index of the entry in force at `minute`.
///
/// Picks the latest start not after `minute`; when every start is later,
/// the earliest entry. Entries without a start count as midnight. `None`
/// only for an empty list.
pub fn select_current(entries: &[Value], minute: u32) -> Option<usize> {
    let minute = u64::from(minute);
    let starts = || entries.iter().enumerate().map(|(i, e)| (i, start_of(e).unwrap_or(0)));

    starts()
        .filter(|&(_, st)| st <= minute)
        .max_by_key(|&(_, st)| st)
        .or_else(|| starts().min_by_key(|&(i, st)| (st, i)))
        .map(|(i, _)| i)
}

fn start_of(entry: &Value) -> Option<u64> {
    entry.get("st").and_then(Value::as_u64)
}
