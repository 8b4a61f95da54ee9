//! Exogenous per-timestep input series.
//!
//! The site data arrives as a CSV table with one column per series. Columns
//! that do not parse as numbers (timestamps, labels) are dropped on load;
//! only the columns the network needs are validated.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result, Stage};
use crate::time_index::TimeIndex;

pub const COL_BEV_AT_HOME: &str = "BEV_at_home";
pub const COL_PV: &str = "PV_kW";
pub const COL_LOAD: &str = "Load_kW";
pub const COL_CONSUMPTION: &str = "consumption";
pub const COL_CHARGING_POWER: &str = "charging_power_kW";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    COL_BEV_AT_HOME,
    COL_PV,
    COL_LOAD,
    COL_CONSUMPTION,
    COL_CHARGING_POWER,
];

/// Column-addressable table of numeric series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExogenousSeries {
    columns: BTreeMap<String, Vec<f64>>,
}

impl ExogenousSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| DispatchError::io(Stage::Timeseries, path, e))?;
        let table = Self::from_csv_reader(file)?;
        info!(path = %path.display(), columns = table.columns.len(), "loaded timeseries");

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .into_iter()
            .filter(|c| table.column(c).is_none())
            .collect();
        if !missing.is_empty() {
            let found: Vec<&str> = table.column_names().collect();
            warn!(?missing, ?found, "timeseries lacks site columns");
        }
        Ok(table)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers: Vec<String> = csv
            .headers()
            .map_err(|e| csv_error(&e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut values: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];
        for record in csv.records() {
            let record = record.map_err(|e| csv_error(&e))?;
            for (i, cell) in record.iter().enumerate().take(headers.len()) {
                if let Some(column) = values[i].as_mut() {
                    match parse_cell(cell) {
                        Some(v) => column.push(v),
                        None => values[i] = None,
                    }
                }
            }
        }

        let mut table = Self::new();
        for (name, column) in headers.into_iter().zip(values) {
            match column {
                Some(column) => table.insert(name, column),
                None => debug!(column = %name, "skipping non-numeric column"),
            }
        }
        Ok(table)
    }

    /// Return the first `len` values of a column.
    ///
    /// Fails if the column is missing, shorter than `len`, or holds values
    /// that are negative or not finite.
    pub fn require(&self, name: &str, len: usize) -> Result<Vec<f64>> {
        let column = self.column(name).ok_or_else(|| {
            DispatchError::configuration(
                Stage::Timeseries,
                format!("required column '{name}' is missing or not numeric"),
            )
        })?;

        if column.len() < len {
            return Err(DispatchError::configuration(
                Stage::Timeseries,
                format!(
                    "column '{name}' has {} values, time index needs {len}",
                    column.len()
                ),
            ));
        }

        let column = &column[..len];
        if let Some((t, v)) = column
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(DispatchError::configuration(
                Stage::Timeseries,
                format!("column '{name}' has invalid value {v} at timestep {t}"),
            ));
        }

        Ok(column.to_vec())
    }

    /// Validated view of the columns the site network is built from
    pub fn site_series(&self, index: &TimeIndex) -> Result<SiteSeries> {
        let len = index.len();
        Ok(SiteSeries {
            bev_at_home: self.require(COL_BEV_AT_HOME, len)?,
            pv_kw: self.require(COL_PV, len)?,
            load_kw: self.require(COL_LOAD, len)?,
            consumption: self.require(COL_CONSUMPTION, len)?,
            charging_power_kw: self.require(COL_CHARGING_POWER, len)?,
        })
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    match cell {
        "True" | "true" => Some(1.0),
        "False" | "false" => Some(0.0),
        _ => cell.parse().ok(),
    }
}

fn csv_error(e: &csv::Error) -> DispatchError {
    DispatchError::configuration(Stage::Timeseries, format!("malformed CSV: {e}"))
}

/// Site series aligned to the time index, each exactly `T` long
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSeries {
    /// 1.0 while the vehicle is parked at home, 0.0 otherwise
    pub bev_at_home: Vec<f64>,
    pub pv_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    /// Vehicle driving energy per timestep (kWh)
    pub consumption: Vec<f64>,
    pub charging_power_kw: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_index::Frequency;

    const CSV: &str = "\
timestamp,BEV_at_home,PV_kW,Load_kW,consumption,charging_power_kW
2022-01-01 00:00:00,1,0.0,0.5,0.0,11
2022-01-01 00:15:00,1,0.0,0.6,0.0,11
2022-01-01 00:30:00,0,0.1,0.4,1.2,0
2022-01-01 00:45:00,False,0.3,0.4,1.1,0
";

    fn index(periods: usize) -> TimeIndex {
        TimeIndex::from_date("2022-01-01", periods, Frequency::minutes(15).unwrap()).unwrap()
    }

    #[test]
    fn test_csv_load_skips_text_columns() {
        let table = ExogenousSeries::from_csv_reader(CSV.as_bytes()).unwrap();

        assert!(table.column("timestamp").is_none());
        assert_eq!(table.column(COL_BEV_AT_HOME).unwrap(), &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(table.column(COL_CONSUMPTION).unwrap()[2], 1.2);
    }

    #[test]
    fn test_site_series_truncates_to_index() {
        let table = ExogenousSeries::from_csv_reader(CSV.as_bytes()).unwrap();
        let series = table.site_series(&index(3)).unwrap();

        assert_eq!(series.pv_kw, vec![0.0, 0.0, 0.1]);
        assert_eq!(series.load_kw.len(), 3);
    }

    #[test]
    fn test_short_column_is_configuration_error() {
        let table = ExogenousSeries::from_csv_reader(CSV.as_bytes()).unwrap();
        let err = table.site_series(&index(5)).unwrap_err();

        assert!(matches!(err, DispatchError::Configuration { stage: Stage::Timeseries, .. }));
        assert!(err.to_string().contains("has 4 values"));
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let table = ExogenousSeries::new()
            .with_column(COL_PV, vec![0.0; 4])
            .with_column(COL_LOAD, vec![1.0; 4]);

        let err = table.site_series(&index(4)).unwrap_err();
        assert!(err.to_string().contains(COL_BEV_AT_HOME));
    }

    #[test]
    fn test_negative_value_rejected() {
        let table = ExogenousSeries::new().with_column(COL_LOAD, vec![1.0, -2.0]);
        assert!(table.require(COL_LOAD, 2).is_err());
        assert!(table.require(COL_LOAD, 1).is_ok());
    }
}
