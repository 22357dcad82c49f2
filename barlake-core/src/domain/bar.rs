//! Bar: one trading day of price/volume data for one ticker.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field count of a bar line without open interest.
pub const BASE_FIELD_COUNT: usize = 7;

/// Field count of a bar line carrying open interest.
pub const FULL_FIELD_COUNT: usize = 8;

/// Daily OHLCV bar parsed from a fixed-format line.
///
/// A `Bar` only exists fully populated: construction goes through
/// [`Bar::from_fields`], which either validates every field or fails.
/// OHLC ordering is not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vol: f64,
    /// Missing when the 8th field is absent, empty or not a number.
    pub open_interest: Option<f64>,
}

/// Why a set of fields could not become a [`Bar`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("expected {BASE_FIELD_COUNT} or {FULL_FIELD_COUNT} fields, got {0}")]
    FieldCount(usize),

    #[error("empty ticker")]
    EmptyTicker,

    #[error("invalid date '{0}' (expected YYYYMMDD)")]
    InvalidDate(String),

    #[error("invalid number in '{field}': '{value}'")]
    InvalidNumber { field: BarField, value: String },
}

impl Bar {
    /// Build a bar from exactly 7 or 8 delimited fields.
    ///
    /// Layout: `ticker, date, open, high, low, close, vol[, open_interest]`.
    /// Every field is trimmed before validation.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self, ValidationError> {
        if fields.len() != BASE_FIELD_COUNT && fields.len() != FULL_FIELD_COUNT {
            return Err(ValidationError::FieldCount(fields.len()));
        }

        let field = |i: usize| fields[i].as_ref().trim();

        let ticker = field(0);
        if ticker.is_empty() {
            return Err(ValidationError::EmptyTicker);
        }

        let date = parse_date(field(1))?;
        let open = parse_number(BarField::Open, field(2))?;
        let high = parse_number(BarField::High, field(3))?;
        let low = parse_number(BarField::Low, field(4))?;
        let close = parse_number(BarField::Close, field(5))?;
        let vol = parse_number(BarField::Vol, field(6))?;

        let open_interest = if fields.len() == FULL_FIELD_COUNT {
            parse_number(BarField::OpenInterest, field(7)).ok()
        } else {
            None
        };

        Ok(Self {
            ticker: ticker.to_string(),
            date,
            open,
            high,
            low,
            close,
            vol,
            open_interest,
        })
    }

    /// Serialize back into the line field layout.
    ///
    /// With `with_open_interest`, an eighth field is emitted; a missing value
    /// becomes an empty field.
    pub fn to_fields(&self, with_open_interest: bool) -> Vec<String> {
        let mut out = vec![
            self.ticker.clone(),
            format_date(self.date),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.vol.to_string(),
        ];
        if with_open_interest {
            out.push(self.open_interest.map(|v| v.to_string()).unwrap_or_default());
        }
        out
    }

    /// Returns true if open interest is missing.
    pub fn open_interest_missing(&self) -> bool {
        self.open_interest.is_none()
    }
}

/// Parse an 8-digit `YYYYMMDD` token.
pub fn parse_date(token: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate(token.to_string());

    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let year: i32 = token[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = token[4..6].parse().map_err(|_| invalid())?;
    let day: u32 = token[6..8].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Format a date as `YYYYMMDD`.
pub fn format_date(date: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", date.year(), date.month(), date.day())
}

fn parse_number(field: BarField, value: &str) -> Result<f64, ValidationError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// Canonical column names of the bar table.
///
/// The set is pinned by a test: adding, removing or renaming a column must be
/// a deliberate change here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarField {
    Ticker,
    Date,
    Open,
    High,
    Low,
    Close,
    Vol,
    OpenInterest,
}

impl BarField {
    /// All fields in table order.
    pub const ALL: [BarField; 8] = [
        BarField::Ticker,
        BarField::Date,
        BarField::Open,
        BarField::High,
        BarField::Low,
        BarField::Close,
        BarField::Vol,
        BarField::OpenInterest,
    ];

    /// Column name in the table.
    pub fn as_str(&self) -> &'static str {
        match self {
            BarField::Ticker => "ticker",
            BarField::Date => "date",
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Vol => "vol",
            BarField::OpenInterest => "open_interest",
        }
    }
}

impl std::fmt::Display for BarField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
