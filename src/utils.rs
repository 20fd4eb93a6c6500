use chrono::{Duration, NaiveDate};

/// Day zero of the spreadsheet serial date system.
const SHEETS_EPOCH: (i32, u32, u32) = (1899, 12, 30);

const TEXT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%b %d, %Y", "%b %d,%Y", "%B %d, %Y", "%d/%m/%Y", "%d.%m.%Y"];

/// Title-case every whitespace or hyphen separated word ("UNITED KINGDOM" -> "United Kingdom").
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut start_of_word = true;
    for ch in collapse_whitespace(input).chars() {
        if ch.is_whitespace() || ch == '-' || ch == '(' {
            start_of_word = true;
            out.push(ch);
        } else if start_of_word {
            out.extend(ch.to_uppercase());
            start_of_word = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Regional-indicator flag for an ISO 3166-1 alpha-2 code; empty for anything else.
pub fn flag_emoji(country_code: &str) -> String {
    let code = country_code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    code.chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c.to_ascii_uppercase() as u32 - 'A' as u32)))
        .collect()
}

/// Zero-based column index to A1 letters (0 -> "A", 26 -> "AA").
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 column letters to a zero-based index ("A" -> 0).
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    Some(n - 1)
}

/// Convert a spreadsheet serial day number into a calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let (y, m, d) = SHEETS_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Parse a date cell, either a serial number or one of the textual layouts users type.
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(serial) = trimmed.parse::<f64>() {
        return serial_to_date(serial);
    }
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Render a UTC offset in seconds as "+1", "-4" or "+5:30".
pub fn format_offset(offset_secs: i32) -> String {
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let minutes = offset_secs.unsigned_abs() / 60;
    let (h, m) = (minutes / 60, minutes % 60);
    if m == 0 {
        format!("{sign}{h}")
    } else {
        format!("{sign}{h}:{m:02}")
    }
}
