//! Timetable HTML parsing.
//!
//! The source document is a server-rendered `<table>` with one header row of
//! time ranges and one row per weekday. The markup is genuinely ad hoc --
//! inconsistent whitespace, variable cell counts, hours with and without an
//! AM/PM marker -- so extraction is done with a small set of tolerant
//! regexes rather than a general HTML parser. The grammar is specified by
//! example in the test fixtures.
//!
//! Parsing never fails: malformed structure yields the largest consistent
//! subset of slots (possibly empty), with diagnostics on the `tracing` log.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::slot::{ClassDay, ClassSlot, MINUTES_PER_DAY};

/// A bare hour in `1..=PM_PROMOTION_MAX_HOUR` with no AM/PM marker always
/// means an afternoon block in the source timetable and is promoted by +12.
/// Naive HH:MM ordering breaks without this.
const PM_PROMOTION_MAX_HOUR: u32 = 7;

/// `HH:MM-HH:MM`, each side optionally AM/PM-suffixed, dash optionally spaced.
const RANGE: &str = r"\d{1,2}:\d{2}\s*(?:[AaPp][Mm])?\s*[-\u{2013}]\s*\d{1,2}:\d{2}\s*(?:[AaPp][Mm])?";

static HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // The usual hour-header cell, with or without extra attributes.
        format!(r#"(?i)class=['"]TDtimetableHour['"][^>]*>\s*({RANGE})"#),
        // Alternative cell format seen after template changes.
        format!(r"(?i)>\s*({RANGE})\s*</td>"),
        // Last resort: any tag-delimited range.
        format!(r"(?i)>\s*({RANGE})\s*<"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DAY_ROW_PATTERNS: LazyLock<Vec<(ClassDay, Regex)>> = LazyLock::new(|| {
    ClassDay::ALL
        .iter()
        .map(|&day| {
            let pattern = format!(
                r"(?is)<tr>\s*<td[^>]*>\s*<font[^>]*>\s*<b>\s*{}\s*</b>\s*</font>\s*</td>(.*?)</tr>",
                day.short_name()
            );
            (day, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static CELL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>\s*<font[^>]*>(.*?)</font>\s*</td>").unwrap());

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>|&nbsp;?").unwrap());

/// One parsed `HH:MM-HH:MM` header, already in effective 24h minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimeRange {
    start_min: u16,
    end_min: u16,
}

/// Parse a timetable document into the ordered weekly slot set.
///
/// Returns an empty vec for empty or unrecognizable input. Partial damage
/// (a missing day row, an unreadable header) drops only the affected part.
pub fn parse(html: &str) -> Vec<ClassSlot> {
    if html.trim().is_empty() {
        debug!("empty timetable document");
        return Vec::new();
    }

    let headers = extract_time_headers(html);
    if headers.is_empty() {
        warn!("no time-range headers recognized; returning empty schedule");
        return Vec::new();
    }
    debug!(header_count = headers.len(), "extracted time headers");

    let mut slots = Vec::new();
    for &(day, ref pattern) in DAY_ROW_PATTERNS.iter() {
        slots.extend(parse_day_row(html, day, pattern, &headers));
    }
    slots.sort_by(|a, b| {
        (a.day, a.start_min, a.end_min)
            .cmp(&(b.day, b.start_min, b.end_min))
    });
    debug!(slot_count = slots.len(), "timetable parsed");
    slots
}

/// Collect every time-range header cell, deduplicate, and sort by effective
/// 24h start time.
fn extract_time_headers(html: &str) -> Vec<TimeRange> {
    let mut seen = Vec::new();
    for pattern in HEADER_PATTERNS.iter() {
        for caps in pattern.captures_iter(html) {
            let raw: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            if !seen.contains(&raw) {
                seen.push(raw);
            }
        }
    }

    let mut ranges: Vec<TimeRange> = seen
        .iter()
        .filter_map(|raw| {
            let range = parse_time_range(raw);
            if range.is_none() {
                warn!(range = %raw, "dropping unusable time header");
            }
            range
        })
        .collect();
    ranges.sort();
    ranges.dedup();
    ranges
}

fn parse_day_row(
    html: &str,
    day: ClassDay,
    pattern: &Regex,
    headers: &[TimeRange],
) -> Vec<ClassSlot> {
    let Some(caps) = pattern.captures(html) else {
        debug!(day = %day, "no timetable row; day omitted");
        return Vec::new();
    };
    let row = &caps[1];

    let cells: Vec<String> = CELL_PATTERN
        .captures_iter(row)
        .map(|c| MARKUP.replace_all(&c[1], " ").trim().to_string())
        .collect();

    if cells.len() > headers.len() {
        // Schema drift: the server emitted more subject cells than hour
        // headers. Surplus cells have no time to attach to.
        warn!(
            day = %day,
            cells = cells.len(),
            headers = headers.len(),
            "row has more cells than time headers; dropping surplus"
        );
    }

    cells
        .iter()
        .take(headers.len())
        .enumerate()
        .filter(|(_, label)| !label.is_empty())
        .map(|(i, label)| ClassSlot {
            day,
            start_min: headers[i].start_min,
            end_min: headers[i].end_min,
            label: label.clone(),
        })
        .collect()
}

/// `"09:00-10:00"` / `"4:15-5:15"` / `"01:00PM-02:00PM"` (whitespace already
/// stripped) into effective minutes. `None` if either side is unreadable or
/// the range is empty/inverted after AM/PM correction.
fn parse_time_range(raw: &str) -> Option<TimeRange> {
    let (start, end) = raw.split_once(['-', '\u{2013}'])?;
    let start_min = parse_clock_minute(start)?;
    let end_min = parse_clock_minute(end)?;
    if end_min <= start_min {
        return None;
    }
    Some(TimeRange { start_min, end_min })
}

/// A single clock time into its effective minute of day, applying the
/// ambiguous-hour promotion when no AM/PM marker is present.
fn parse_clock_minute(raw: &str) -> Option<u16> {
    let upper = raw.to_ascii_uppercase();
    let (time, marker) = if let Some(t) = upper.strip_suffix("AM") {
        (t, Some(false))
    } else if let Some(t) = upper.strip_suffix("PM") {
        (t, Some(true))
    } else {
        (upper.as_str(), None)
    };

    let (h, m) = time.split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    if minute >= 60 {
        return None;
    }

    let hour = match marker {
        Some(true) if hour != 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        Some(_) => hour,
        None if (1..=PM_PROMOTION_MAX_HOUR).contains(&hour) => hour + 12,
        None => hour,
    };
    if hour >= 24 {
        return None;
    }

    let minute_of_day = hour * 60 + minute;
    debug_assert!(minute_of_day < MINUTES_PER_DAY as u32);
    Some(minute_of_day as u16)
}
