//! Dataset assembly: bar records → sorted table with derived features.
//!
//! Rows are sorted by `(ticker, date)`; ties keep their input order. Derived
//! features are computed strictly within a ticker so nothing leaks across the
//! boundary between two tickers in the globally sorted frame.

use super::schema::date_to_days;
use crate::domain::{Bar, BarField};
use chrono::Datelike;
use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("dataframe construction failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Builds the bar table.
#[derive(Debug, Clone, Copy)]
pub struct DatasetAssembler {
    pub add_features: bool,
}

impl Default for DatasetAssembler {
    fn default() -> Self {
        Self { add_features: true }
    }
}

impl DatasetAssembler {
    pub fn new(add_features: bool) -> Self {
        Self { add_features }
    }

    /// Sort the records and project them into a table.
    ///
    /// Empty input yields a zero-row frame with the canonical columns and no
    /// feature columns.
    pub fn assemble(&self, mut bars: Vec<Bar>) -> Result<DataFrame, AssembleError> {
        if bars.is_empty() {
            return Ok(DataFrame::new(canonical_columns(&bars)?)?);
        }

        bars.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

        let mut columns = canonical_columns(&bars)?;
        if self.add_features {
            columns.extend(feature_columns(&bars));
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// Convenience wrapper around [`DatasetAssembler::assemble`].
pub fn assemble(bars: Vec<Bar>, add_features: bool) -> Result<DataFrame, AssembleError> {
    DatasetAssembler::new(add_features).assemble(bars)
}

fn canonical_columns(bars: &[Bar]) -> Result<Vec<Column>, AssembleError> {
    let tickers: Vec<&str> = bars.iter().map(|b| b.ticker.as_str()).collect();
    let dates: Vec<i32> = bars.iter().map(|b| date_to_days(b.date)).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let vols: Vec<f64> = bars.iter().map(|b| b.vol).collect();
    let open_interest: Vec<Option<f64>> = bars.iter().map(|b| b.open_interest).collect();

    Ok(vec![
        Column::new(BarField::Ticker.as_str().into(), tickers),
        Column::new(BarField::Date.as_str().into(), dates).cast(&DataType::Date)?,
        Column::new(BarField::Open.as_str().into(), opens),
        Column::new(BarField::High.as_str().into(), highs),
        Column::new(BarField::Low.as_str().into(), lows),
        Column::new(BarField::Close.as_str().into(), closes),
        Column::new(BarField::Vol.as_str().into(), vols),
        Column::new(BarField::OpenInterest.as_str().into(), open_interest),
    ])
}

/// `vol_chg_1d`, `month`, `weekday` for bars already sorted by (ticker, date).
fn feature_columns(bars: &[Bar]) -> Vec<Column> {
    let vol_chg: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev = i.checked_sub(1).map(|p| &bars[p])?;
            if prev.ticker != bar.ticker {
                return None;
            }
            Some((bar.vol - prev.vol) / prev.vol)
        })
        .collect();
    let months: Vec<i32> = bars.iter().map(|b| b.date.month() as i32).collect();
    let weekdays: Vec<i32> = bars
        .iter()
        .map(|b| b.date.weekday().num_days_from_monday() as i32)
        .collect();

    vec![
        Column::new("vol_chg_1d".into(), vol_chg),
        Column::new("month".into(), months),
        Column::new("weekday".into(), weekdays),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{BarSchema, FEATURE_COLUMNS};
    use chrono::NaiveDate;

    fn bar(ticker: &str, day: u32, open: f64, vol: f64) -> Bar {
        Bar {
            ticker: ticker.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open,
            high: open + 1.0,
            low: open - 1.0,
            close: open,
            vol,
            open_interest: None,
        }
    }

    #[test]
    fn empty_input_yields_empty_table_even_with_features() {
        let df = assemble(Vec::new(), true).unwrap();
        assert_eq!(df.height(), 0);
        for name in FEATURE_COLUMNS {
            assert!(df.column(name).is_err());
        }
        assert!(BarSchema::validate(&df, &BarSchema::schema()).is_ok());
    }

    #[test]
    fn builds_without_features() {
        let df = assemble(vec![bar("AAA", 1, 10.0, 100.0), bar("AAA", 2, 10.0, 150.0)], false)
            .unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 8);
        let close = df.column("close").unwrap().f64().unwrap();
        assert_eq!(close.get(0), Some(10.0));
    }

    #[test]
    fn sorts_by_ticker_then_date() {
        let df = assemble(
            vec![
                bar("BBB", 3, 1.0, 1.0),
                bar("AAA", 2, 2.0, 1.0),
                bar("BBB", 1, 3.0, 1.0),
                bar("AAA", 1, 4.0, 1.0),
            ],
            false,
        )
        .unwrap();

        let tickers = df.column("ticker").unwrap().str().unwrap();
        let opens = df.column("open").unwrap().f64().unwrap();
        let got: Vec<(&str, f64)> = (0..df.height())
            .map(|i| (tickers.get(i).unwrap(), opens.get(i).unwrap()))
            .collect();
        assert_eq!(got, vec![("AAA", 4.0), ("AAA", 2.0), ("BBB", 3.0), ("BBB", 1.0)]);
    }

    #[test]
    fn duplicates_are_kept_in_input_order() {
        let df = assemble(
            vec![bar("AAA", 1, 1.0, 1.0), bar("AAA", 1, 2.0, 1.0), bar("AAA", 1, 3.0, 1.0)],
            true,
        )
        .unwrap();

        let opens = df.column("open").unwrap().f64().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(opens.get(0), Some(1.0));
        assert_eq!(opens.get(1), Some(2.0));
        assert_eq!(opens.get(2), Some(3.0));
    }

    #[test]
    fn vol_change_is_computed_per_ticker() {
        let df = assemble(
            vec![
                bar("BBB", 1, 1.0, 50.0),
                bar("AAA", 1, 1.0, 100.0),
                bar("AAA", 2, 1.0, 150.0),
                bar("BBB", 2, 1.0, 25.0),
            ],
            true,
        )
        .unwrap();

        let chg = df.column("vol_chg_1d").unwrap().f64().unwrap();
        assert_eq!(chg.get(0), None);
        assert_eq!(chg.get(1), Some(0.5));
        // first BBB row must not see the last AAA row
        assert_eq!(chg.get(2), None);
        assert_eq!(chg.get(3), Some(-0.5));
    }

    #[test]
    fn month_and_weekday_follow_the_date() {
        // 2024-01-01 was a Monday, 2024-01-07 a Sunday.
        let df = assemble(vec![bar("AAA", 1, 1.0, 1.0), bar("AAA", 7, 1.0, 1.0)], true).unwrap();

        let month = df.column("month").unwrap().i32().unwrap();
        let weekday = df.column("weekday").unwrap().i32().unwrap();
        assert_eq!(month.get(0), Some(1));
        assert_eq!(weekday.get(0), Some(0));
        assert_eq!(weekday.get(1), Some(6));
        assert!(BarSchema::validate(&df, &BarSchema::with_features()).is_ok());
    }

    #[test]
    fn missing_open_interest_becomes_null() {
        let mut with_oi = bar("AAA", 2, 1.0, 1.0);
        with_oi.open_interest = Some(7.0);

        let df = assemble(vec![bar("AAA", 1, 1.0, 1.0), with_oi], false).unwrap();

        let oi = df.column("open_interest").unwrap().f64().unwrap();
        assert_eq!(oi.get(0), None);
        assert_eq!(oi.get(1), Some(7.0));
        assert_eq!(oi.null_count(), 1);
    }
}
