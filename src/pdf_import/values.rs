//! Field value parsers: dates, numbers, money, currencies and identifiers.
//!
//! All parsers work on the raw captured text of one field and never look at
//! the surrounding document. Amounts are parsed with exact decimal
//! arithmetic and stored in minor units.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ValueError;
use crate::pp::common::shares;
use crate::pp::Money;

static RE_GERMAN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[1-9]\d{0,2}(?:\.\d{3})+|\d+)(?:,\d+)?$").unwrap());
static RE_ENGLISH_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[1-9]\d{0,2}(?:,\d{3})+|\d+)(?:\.\d+)?$").unwrap());
static RE_SWISS_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[1-9]\d{0,2}(?:'\d{3})+|\d+)(?:\.\d+)?$").unwrap());
static RE_SHORT_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}\.\d{2}$").unwrap());
static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());
static RE_ISIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").unwrap());
static RE_WKN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{6}$").unwrap());

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Digit grouping and decimal separator convention of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberLocale {
    /// 1.234,56
    #[default]
    German,
    /// 1,234.56
    English,
    /// 1'234.56
    Swiss,
}

impl NumberLocale {
    fn grammar(&self) -> &'static Regex {
        match self {
            Self::German => &RE_GERMAN_NUMBER,
            Self::English => &RE_ENGLISH_NUMBER,
            Self::Swiss => &RE_SWISS_NUMBER,
        }
    }

    fn canonical(&self, text: &str) -> String {
        match self {
            Self::German => text.replace('.', "").replace(',', "."),
            Self::English => text.replace(',', ""),
            Self::Swiss => text.replace('\'', ""),
        }
    }
}

// =============================================================================
// Numbers
// =============================================================================

/// Parse an unsigned decimal number written in the given locale.
///
/// Whitespace inside the number is ignored ("1 234,56"). Text that does not
/// follow the locale's grouping rules is rejected rather than guessed.
pub fn parse_decimal(text: &str, locale: NumberLocale) -> Result<Decimal, ValueError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('-') || compact.starts_with('+') {
        return Err(ValueError::SignedLiteral(text.trim().to_string()));
    }
    if !locale.grammar().is_match(&compact) {
        return Err(ValueError::InvalidNumber(text.trim().to_string()));
    }
    Decimal::from_str(&locale.canonical(&compact))
        .map_err(|_| ValueError::InvalidNumber(text.trim().to_string()))
}

/// Parse a money amount into minor units
pub fn parse_amount(text: &str, currency: &str, locale: NumberLocale) -> Result<Money, ValueError> {
    let currency = parse_currency(currency)?;
    let value = parse_decimal(text, locale)?;
    Money::from_decimal(value, currency).ok_or_else(|| ValueError::InvalidNumber(text.to_string()))
}

/// Parse a share count into the internal representation (shares * 10^8)
pub fn parse_shares(text: &str, locale: NumberLocale) -> Result<i64, ValueError> {
    let value = parse_decimal(text, locale)?;
    shares::from_decimal(value).ok_or_else(|| ValueError::InvalidNumber(text.to_string()))
}

/// Parse an exchange rate, which must be strictly positive
pub fn parse_exchange_rate(text: &str, locale: NumberLocale) -> Result<Decimal, ValueError> {
    let rate = parse_decimal(text, locale)?;
    if rate <= Decimal::ZERO {
        return Err(ValueError::InvalidRate(text.to_string()));
    }
    Ok(rate)
}

/// Validate an ISO 4217 style currency code
pub fn parse_currency(text: &str) -> Result<String, ValueError> {
    let code = text.trim();
    if RE_CURRENCY.is_match(code) {
        Ok(code.to_string())
    } else {
        Err(ValueError::InvalidCurrency(text.to_string()))
    }
}

// =============================================================================
// Dates
// =============================================================================

/// Parse a date in one of the supported formats; the time is midnight
pub fn parse_date(text: &str) -> Result<NaiveDateTime, ValueError> {
    let text = text.trim();
    let parsed = if RE_SHORT_YEAR.is_match(text) {
        NaiveDate::parse_from_str(text, "%d.%m.%y").ok()
    } else {
        DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    };
    parsed
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ValueError::InvalidDate(text.to_string()))
}

/// Parse a time of day; seconds are dropped
pub fn parse_time(text: &str) -> Result<NaiveTime, ValueError> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .and_then(|time| time.with_second(0))
        .ok_or_else(|| ValueError::InvalidTime(text.to_string()))
}

/// Parse a date with an optional time component
pub fn parse_date_time(date: &str, time: Option<&str>) -> Result<NaiveDateTime, ValueError> {
    let date = parse_date(date)?;
    match time {
        Some(time) => Ok(date.date().and_time(parse_time(time)?)),
        None => Ok(date),
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Validate an ISIN including its check digit
pub fn parse_isin(text: &str) -> Result<String, ValueError> {
    let isin = text.trim();
    if RE_ISIN.is_match(isin) && isin_check_digit_valid(isin) {
        Ok(isin.to_string())
    } else {
        Err(ValueError::InvalidIsin(text.to_string()))
    }
}

/// Validate a WKN (six alphanumeric characters)
pub fn parse_wkn(text: &str) -> Result<String, ValueError> {
    let wkn = text.trim();
    if RE_WKN.is_match(wkn) {
        Ok(wkn.to_string())
    } else {
        Err(ValueError::InvalidWkn(text.to_string()))
    }
}

/// Luhn check over the ISIN with letters expanded to two digits (A=10 .. Z=35)
fn isin_check_digit_valid(isin: &str) -> bool {
    let mut digits = Vec::with_capacity(24);
    for c in isin.chars() {
        match c.to_digit(36) {
            Some(v) if v >= 10 => {
                digits.push(v / 10);
                digits.push(v % 10);
            }
            Some(v) => digits.push(v),
            None => return false,
        }
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
