use crate::domain::BarField;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// Derived feature columns appended by the assembler.
pub const FEATURE_COLUMNS: [&str; 3] = ["vol_chg_1d", "month", "weekday"];

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Expected schema for bar tables
pub struct BarSchema;

impl BarSchema {
    /// Get the canonical bar schema
    pub fn schema() -> Schema {
        Schema::from_iter(BarField::ALL.iter().map(|f| {
            Field::new(f.as_str().into(), Self::dtype(*f))
        }))
    }

    /// Canonical schema plus the derived feature columns.
    pub fn with_features() -> Schema {
        let mut schema = Self::schema();
        schema.with_column("vol_chg_1d".into(), DataType::Float64);
        schema.with_column("month".into(), DataType::Int32);
        schema.with_column("weekday".into(), DataType::Int32);
        schema
    }

    /// Column dtype of a canonical field.
    pub fn dtype(field: BarField) -> DataType {
        match field {
            BarField::Ticker => DataType::String,
            BarField::Date => DataType::Date,
            _ => DataType::Float64,
        }
    }

    /// Validate DataFrame against schema
    pub fn validate(df: &DataFrame, expected: &Schema) -> Result<(), SchemaError> {
        let actual = df.schema();

        // Check all required columns exist
        for field in expected.iter_fields() {
            if !actual.contains(field.name()) {
                return Err(SchemaError::MissingColumn(field.name().to_string()));
            }
        }

        // Check data types match
        for field in expected.iter_fields() {
            let actual_dtype = actual.get(field.name()).ok_or_else(|| {
                SchemaError::MissingColumn(field.name().to_string())
            })?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Days since 1970-01-01, the physical representation of a `Date` column.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        let date = Column::new("date".into(), &[date_to_days(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())])
            .cast(&DataType::Date)
            .unwrap();

        DataFrame::new(vec![
            Column::new("ticker".into(), &["AAA"]),
            date,
            Column::new("open".into(), &[400.0]),
            Column::new("high".into(), &[405.0]),
            Column::new("low".into(), &[399.0]),
            Column::new("close".into(), &[403.0]),
            Column::new("vol".into(), &[1000000.0]),
            Column::new("open_interest".into(), &[None::<f64>]),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_has_all_required_columns() {
        let schema = BarSchema::schema();
        for field in BarField::ALL {
            assert!(schema.contains(field.as_str()), "{field}");
        }
        assert_eq!(schema.len(), 8);
    }

    #[test]
    fn test_feature_schema_extends_canonical() {
        let schema = BarSchema::with_features();
        assert_eq!(schema.len(), 11);
        for name in FEATURE_COLUMNS {
            assert!(schema.contains(name));
        }
    }

    #[test]
    fn test_validate_accepts_valid_dataframe() {
        let df = sample_frame();
        let result = BarSchema::validate(&df, &BarSchema::schema());
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let df = sample_frame().drop("vol").unwrap();
        let result = BarSchema::validate(&df, &BarSchema::schema());
        assert!(matches!(result.unwrap_err(), SchemaError::MissingColumn(c) if c == "vol"));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let df = sample_frame()
            .drop("open")
            .unwrap()
            .hstack(&[Column::new("open".into(), &["not_a_number"])])
            .unwrap();

        let result = BarSchema::validate(&df, &BarSchema::schema());
        assert!(matches!(result.unwrap_err(), SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn test_day_conversion() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 2, 1).unwrap()), 31);
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap()), -1);
    }
}
