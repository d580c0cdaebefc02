//! Accuracy analysis: per-competitor error columns, quantile summaries, and
//! the formatted CSV export.

use std::collections::HashMap;

use anyhow::{Context, Result};
use csv::Writer;
use tracing::info;

use crate::collect::{
    DEPARTURE_TIME, DESTINATION, ORIGIN, TravelTimeRecord, capitalized_provider_name,
    travel_time_column,
};
use crate::config::Providers;

pub fn relative_error_column(provider: &str) -> String {
    format!("error_percentage_{provider}")
}

/// Full-precision error values for one (row, competitor) cell.
///
/// A competitor reporting zero seconds drives the relative error to
/// infinity; the row stays in the analysis as an outlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowErrors {
    pub absolute_error: f64,
    pub relative_error: f64,
}

/// A result-table row augmented with per-competitor errors.
#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub record: TravelTimeRecord,
    pub errors: HashMap<String, RowErrors>,
}

/// Integer-truncated quantile errors for one competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantileErrorResult {
    pub absolute_error: i64,
    pub relative_error: i64,
}

/// Computes absolute and relative error against the baseline for every
/// competitor, row-wise.
///
/// The relative error is measured against the competitor's own travel time,
/// not the baseline's. That asymmetry is deliberate and shared by every
/// report format this tool has produced.
pub fn calculate_differences(
    records: &[TravelTimeRecord],
    api_providers: &Providers,
) -> Vec<AnalysisRow> {
    let base_name = &api_providers.base.name;

    records
        .iter()
        .map(|record| {
            let mut errors = HashMap::new();
            let Some(base_time) = record.travel_time(base_name) else {
                return AnalysisRow { record: record.clone(), errors };
            };

            for provider in &api_providers.competitors {
                let Some(competitor_time) = record.travel_time(&provider.name) else {
                    continue;
                };
                let absolute_error = (competitor_time as f64 - base_time as f64).abs();
                let relative_error = absolute_error / competitor_time as f64 * 100.0;
                errors.insert(
                    provider.name.clone(),
                    RowErrors { absolute_error, relative_error },
                );
            }

            AnalysisRow { record: record.clone(), errors }
        })
        .collect()
}

/// Upper-interpolation quantile: among sorted values, the one at rank
/// `ceil(q * (n - 1))`. Never interpolates between elements.
pub fn quantile_upper(values: &[f64], quantile: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (quantile * (sorted.len() - 1) as f64).ceil() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Quantiles of the absolute and relative error for one competitor,
/// truncated to integers for reporting.
pub fn calculate_quantiles(
    rows: &[AnalysisRow],
    quantile: f64,
    api_provider_name: &str,
) -> QuantileErrorResult {
    let absolute: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.errors.get(api_provider_name))
        .map(|e| e.absolute_error)
        .collect();
    let relative: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.errors.get(api_provider_name))
        .map(|e| e.relative_error)
        .collect();

    QuantileErrorResult {
        absolute_error: quantile_upper(&absolute, quantile) as i64,
        relative_error: quantile_upper(&relative, quantile) as i64,
    }
}

fn log_results(rows: &[AnalysisRow], quantile: f64, api_providers: &Providers) {
    for provider in &api_providers.competitors {
        let name = &provider.name;
        let capitalized_provider = capitalized_provider_name(name);

        let relative_errors: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.errors.get(name))
            .map(|e| e.relative_error)
            .collect();
        let mean = relative_errors.iter().sum::<f64>() / relative_errors.len() as f64;
        info!(
            "Mean relative error compared to {} API: {:.2}%",
            capitalized_provider, mean
        );

        let quantile_errors = calculate_quantiles(rows, quantile, name);
        info!(
            "{}% of TravelTime results differ from {} API by less than {}%",
            (quantile * 100.0) as i64,
            capitalized_provider,
            quantile_errors.relative_error
        );
    }
}

/// Writes the analysis export: base columns, every provider's travel time,
/// and one integer-truncated relative-error column per competitor. Absolute
/// errors are intermediate values and are not exported.
fn write_results_csv(
    rows: &[AnalysisRow],
    output_file: &str,
    api_providers: &Providers,
) -> Result<()> {
    let provider_names = api_providers.all_names();
    let mut writer = Writer::from_path(output_file)
        .with_context(|| format!("Failed to create output file {output_file}"))?;

    let mut header = vec![
        ORIGIN.to_string(),
        DESTINATION.to_string(),
        DEPARTURE_TIME.to_string(),
    ];
    header.extend(provider_names.iter().map(|p| travel_time_column(p)));
    header.extend(
        api_providers
            .competitors
            .iter()
            .map(|p| relative_error_column(&p.name)),
    );
    writer.write_record(&header)?;

    for row in rows {
        let mut fields = vec![
            row.record.origin.clone(),
            row.record.destination.clone(),
            row.record.departure_time.clone(),
        ];
        for provider in &provider_names {
            fields.push(crate::output::format_travel_time(
                row.record.travel_time(provider),
            ));
        }
        for provider in &api_providers.competitors {
            // Truncated, not rounded. An infinite error saturates.
            let relative = row
                .errors
                .get(&provider.name)
                .map(|e| e.relative_error)
                .unwrap_or(f64::NAN);
            fields.push((relative as i64).to_string());
        }
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    Ok(())
}

/// The full analysis pipeline: compute differences, log the summary, export
/// the formatted CSV. Numeric anomalies flow through; nothing is retried.
pub fn run_analysis(
    results: &[TravelTimeRecord],
    output_file: &str,
    quantile: f64,
    api_providers: &Providers,
) -> Result<()> {
    let rows = calculate_differences(results, api_providers);
    log_results(&rows, quantile, api_providers);

    info!("Detailed results can be found in {} file", output_file);

    write_results_csv(&rows, output_file, api_providers)
}
