//! Text input parsing and display formatting helpers.
//!
//! These back `Field::evaluate` and `Field::format`. Literal shapes are recognized
//! with regular expressions that are compiled once and cached.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{OnceLock, PoisonError, RwLock};

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;

/// Order of day, month and year in numeric date input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    /// Day, month, year.
    #[default]
    DayMonthYear,
    /// Month, day, year.
    MonthDayYear,
}

/// Culture settings used to parse and render values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// Decimal separator for display.
    pub decimal_separator: char,
    /// Order of numeric date parts.
    pub date_order: DateOrder,
    /// Separator between date parts in display.
    pub date_separator: char,
    /// Caption for `true`.
    pub yes: String,
    /// Caption for `false`.
    pub no: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            date_order: DateOrder::DayMonthYear,
            date_separator: '/',
            yes: "Yes".to_string(),
            no: "No".to_string(),
        }
    }
}

impl Locale {
    /// Create the invariant locale.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decimal separator.
    pub fn decimal_separator(mut self, sep: char) -> Self {
        self.decimal_separator = sep;
        self
    }

    /// Set the date order.
    pub fn date_order(mut self, order: DateOrder) -> Self {
        self.date_order = order;
        self
    }

    /// Set the Yes/No captions.
    pub fn yes_no(mut self, yes: impl Into<String>, no: impl Into<String>) -> Self {
        self.yes = yes.into();
        self.no = no.into();
        self
    }

    /// Render a date in this locale's numeric order.
    pub fn format_date(&self, date: NaiveDate) -> String {
        let s = self.date_separator;
        match self.date_order {
            DateOrder::DayMonthYear => {
                format!("{:02}{s}{:02}{s}{:04}", date.day(), date.month(), date.year())
            }
            DateOrder::MonthDayYear => {
                format!("{:02}{s}{:02}{s}{:04}", date.month(), date.day(), date.year())
            }
        }
    }

    /// Render a decimal with this locale's separator.
    pub fn format_decimal(&self, value: Decimal) -> String {
        let text = value.to_string();
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }
}

/// Cache of compiled patterns used for literal recognition.
struct RegexCache {
    cache: RwLock<HashMap<&'static str, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &'static str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.insert(pattern, regex.clone());
        }
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Capture groups of `pattern` in `text`, as owned strings.
fn captures(pattern: &'static str, text: &str) -> Option<Vec<String>> {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.captures(text).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect()
        }),
        Err(e) => {
            tracing::warn!(pattern = pattern, error = %e, "Invalid literal pattern");
            None
        }
    }
}

const ISO_DATE: &str = r"^(\d{4})-(\d{1,2})-(\d{1,2})$";
const SEPARATED_DATE: &str = r"^(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{2}|\d{4}))?$";
const COMPACT_DATE: &str = r"^(\d{2})(\d{2})(\d{2}|\d{4})?$";
const CLOCK_TIME: &str = r"^(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?$";
const COMPACT_TIME: &str = r"^(\d{2})(\d{2})(\d{2})?$";

/// Parse date input.
///
/// Accepts ISO `yyyy-MM-dd`, separated `dd/MM[/yy[yy]]` (also `-` and `.`),
/// compact `ddMM`, `ddMMyy` and `ddMMyyyy`. Missing years take the year of
/// `today`. Day and month order follow `locale`. Returns `None` for blank input
/// handling left to the caller.
pub fn parse_date(text: &str, locale: &Locale, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("t") || text.eq_ignore_ascii_case("today") {
        return Some(today);
    }
    if let Some(parts) = captures(ISO_DATE, text) {
        return NaiveDate::from_ymd_opt(
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
        );
    }
    let parts = captures(SEPARATED_DATE, text).or_else(|| captures(COMPACT_DATE, text))?;
    let first: u32 = parts[0].parse().ok()?;
    let second: u32 = parts[1].parse().ok()?;
    let year = match parts[2].len() {
        0 => today.year(),
        2 => 2000 + parts[2].parse::<i32>().ok()?,
        _ => parts[2].parse::<i32>().ok()?,
    };
    let (day, month) = match locale.date_order {
        DateOrder::DayMonthYear => (first, second),
        DateOrder::MonthDayYear => (second, first),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse time input: `HH:mm[:ss[.fff]]` or compact `HHmm[ss]`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    if let Some(parts) = captures(CLOCK_TIME, text) {
        let nanos = if parts[3].is_empty() {
            0
        } else {
            format!("{:0<9}", parts[3]).parse().ok()?
        };
        return NaiveTime::from_hms_nano_opt(
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            if parts[2].is_empty() { 0 } else { parts[2].parse().ok()? },
            nanos,
        );
    }
    let parts = captures(COMPACT_TIME, text)?;
    NaiveTime::from_hms_opt(
        parts[0].parse().ok()?,
        parts[1].parse().ok()?,
        if parts[2].is_empty() { 0 } else { parts[2].parse().ok()? },
    )
}

/// Parse decimal input. Both `,` and `.` are accepted as the decimal separator;
/// when both appear, the last one is the decimal separator and the other groups
/// thousands.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let cleaned: String = text.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    Decimal::from_str(&normalized).ok()
}

/// Parse boolean input: the locale's Yes/No captions, `true`/`false`,
/// `yes`/`no`, `y`/`n`, `1`/`0`.
pub fn parse_bool(text: &str, locale: &Locale) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case(&locale.yes) {
        return Some(true);
    }
    if text.eq_ignore_ascii_case(&locale.no) {
        return Some(false);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Derive an identifier-safe code name from a display name: `"Unit Price"` → `"UnitPrice"`.
pub fn code_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect()
}
