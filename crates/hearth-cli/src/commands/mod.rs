use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use uuid::Uuid;

pub mod series;
pub mod sweep;

pub fn parse_series_id(input: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim())
        .map_err(|_| anyhow!("'{}' is not a valid series ID", input))
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow!("'{}' is not a valid date, expected YYYY-MM-DD", input))
}
