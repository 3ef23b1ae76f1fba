//! Calibrate command implementation
//!
//! Fits GBM risk factors to historical prices and prints them as a `[model]`
//! fragment for the run configuration.
//!
//! The market data file is a CSV with a header row and one price column per
//! asset; a `date` column is ignored.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use mlmc_pricing::models::{calibrate_gbm, CalibratedFactors, ReturnLength};
use serde::Serialize;
use tracing::{debug, info};

use super::emit;
use crate::config::{AssetSpec, OutputFormat};
use crate::{CliError, Result};

/// Return period used for the volatility estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Five daily observations per return.
    Week,
    /// Thirteen weekly observations per return.
    #[default]
    Quarter,
}

impl From<Period> for ReturnLength {
    fn from(period: Period) -> Self {
        match period {
            Period::Week => ReturnLength::Week,
            Period::Quarter => ReturnLength::Quarter,
        }
    }
}

/// Price columns read from the market data file.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    pub names: Vec<String>,
    pub histories: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct CalibratedModel {
    correlation: Vec<Vec<f64>>,
    assets: Vec<AssetSpec>,
}

#[derive(Serialize)]
struct ModelFragment {
    model: CalibratedModel,
}

#[derive(Serialize)]
struct CalibrationReport<'a> {
    generated_at: DateTime<Utc>,
    period: Period,
    columns: &'a [String],
    model: CalibratedModel,
}

/// Run the calibrate command
pub fn run(market_data: &str, period: Period, drifts: &[f64], format: OutputFormat, output: Option<&str>) -> Result<()> {
    info!(market_data, ?period, "Starting calibration");

    if !Path::new(market_data).exists() {
        return Err(CliError::FileNotFound(market_data.to_string()));
    }
    let table = read_prices(std::fs::File::open(market_data)?)?;
    debug!(columns = ?table.names, rows = table.histories[0].len(), "Market data loaded");

    let factors = calibrate(&table, period, drifts)?;
    for (name, asset) in table.names.iter().zip(&factors.assets) {
        info!(asset = %name, spot = asset.spot(), volatility = asset.volatility(), "Calibrated");
    }

    let rendered = render(&table, period, &factors, format)?;
    emit(&rendered, output)?;
    info!("Calibration complete");
    Ok(())
}

/// Reads a price table from CSV.
///
/// # Errors
///
/// `CliError::Csv` for malformed CSV, `CliError::InvalidArgument` when there
/// is no price column or a field is not a number.
pub fn read_prices<R: Read>(reader: R) -> Result<PriceTable> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = reader.headers()?.clone();
    let columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.eq_ignore_ascii_case("date"))
        .map(|(i, _)| i)
        .collect();
    if columns.is_empty() {
        return Err(CliError::InvalidArgument("market data has no price column".to_string()));
    }

    let names = columns.iter().map(|&i| headers[i].to_string()).collect();
    let mut histories = vec![Vec::new(); columns.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (history, &i) in histories.iter_mut().zip(&columns) {
            let field = &record[i];
            let price = field.parse::<f64>().map_err(|_| {
                CliError::InvalidArgument(format!(
                    "row {}, column '{}': '{}' is not a price",
                    row + 1,
                    &headers[i],
                    field
                ))
            })?;
            history.push(price);
        }
    }

    Ok(PriceTable { names, histories })
}

/// Fits the table's columns.
///
/// No drift means zero drift for every asset, a single value applies to all
/// of them, otherwise there must be one per column.
pub fn calibrate(table: &PriceTable, period: Period, drifts: &[f64]) -> Result<CalibratedFactors> {
    let n = table.histories.len();
    let drifts = match drifts {
        [] => vec![0.0; n],
        [drift] => vec![*drift; n],
        many if many.len() == n => many.to_vec(),
        many => {
            return Err(CliError::InvalidArgument(format!(
                "{} drift(s) given for {} price column(s)",
                many.len(),
                n
            )))
        }
    };
    Ok(calibrate_gbm(&table.histories, &drifts, period.into())?)
}

fn calibrated_model(factors: &CalibratedFactors) -> CalibratedModel {
    let n = factors.correlation.dim();
    CalibratedModel {
        correlation: (0..n)
            .map(|i| (0..n).map(|j| factors.correlation.get(i, j)).collect())
            .collect(),
        assets: factors
            .assets
            .iter()
            .map(|asset| AssetSpec {
                spot: asset.spot(),
                drift: asset.drift(),
                volatility: asset.volatility(),
            })
            .collect(),
    }
}

fn render(table: &PriceTable, period: Period, factors: &CalibratedFactors, format: OutputFormat) -> Result<String> {
    let model = calibrated_model(factors);
    match format {
        OutputFormat::Table => {
            let fragment = toml::to_string(&ModelFragment { model })
                .map_err(|err| CliError::InvalidArgument(format!("cannot render calibration: {}", err)))?;
            Ok(format!(
                "# Calibrated from columns {} ({:?} returns).\n# Add type, horizon and instruments before running.\n{}",
                table.names.join(", "),
                period,
                fragment
            ))
        }
        OutputFormat::Json => {
            let report = CalibrationReport {
                generated_at: Utc::now(),
                period,
                columns: &table.names,
                model,
            };
            let mut json = serde_json::to_string_pretty(&report)?;
            json.push('\n');
            Ok(json)
        }
    }
}
