//! CSV input and output for the collection pipeline.
//!
//! The raw result table and the analysis export share the same base layout:
//! `origin,destination,departure_time` plus one travel-time column per
//! provider. Absent travel times are empty cells, never zeroes.

use std::collections::{HashMap, HashSet};
use std::fs::File;

use anyhow::{Context, Result, bail};
use csv::{StringRecord, Writer};
use tracing::debug;

use crate::collect::{DEPARTURE_TIME, DESTINATION, ORIGIN, TravelTimeRecord, travel_time_column};

/// Reads the deduplicated (origin, destination) pairs from the input file,
/// preserving first-seen order.
pub fn read_location_pairs(path: &str) -> Result<Vec<(String, String)>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file {path}"))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let origin_idx = column_index(&headers, ORIGIN, path)?;
    let destination_idx = column_index(&headers, DESTINATION, path)?;

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let pair = (
            record[origin_idx].to_string(),
            record[destination_idx].to_string(),
        );
        if seen.insert(pair.clone()) {
            pairs.push(pair);
        }
    }

    debug!(path, pair_count = pairs.len(), "Loaded location pairs");
    Ok(pairs)
}

/// Reads a previously collected result table (skip-collection mode).
///
/// The file must carry the full output layout: base columns plus a
/// travel-time column for every active provider.
pub fn read_travel_times(path: &str, provider_names: &[String]) -> Result<Vec<TravelTimeRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file {path}"))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let origin_idx = column_index(&headers, ORIGIN, path)?;
    let destination_idx = column_index(&headers, DESTINATION, path)?;
    let departure_idx = column_index(&headers, DEPARTURE_TIME, path)?;

    let mut provider_columns = Vec::with_capacity(provider_names.len());
    for provider in provider_names {
        let column = travel_time_column(provider);
        provider_columns.push((provider.clone(), column_index(&headers, &column, path)?));
    }

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut travel_times = HashMap::with_capacity(provider_columns.len());
        for (provider, idx) in &provider_columns {
            travel_times.insert(provider.clone(), parse_travel_time(&record[*idx])?);
        }
        records.push(TravelTimeRecord {
            origin: record[origin_idx].to_string(),
            destination: record[destination_idx].to_string(),
            departure_time: record[departure_idx].to_string(),
            travel_times,
        });
    }

    debug!(path, row_count = records.len(), "Loaded travel times");
    Ok(records)
}

/// Writes the raw merged result table.
pub fn write_travel_times(
    path: &str,
    records: &[TravelTimeRecord],
    provider_names: &[String],
) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("Failed to create output file {path}"))?;

    let mut header = vec![
        ORIGIN.to_string(),
        DESTINATION.to_string(),
        DEPARTURE_TIME.to_string(),
    ];
    header.extend(provider_names.iter().map(|p| travel_time_column(p)));
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.origin.clone(),
            record.destination.clone(),
            record.departure_time.clone(),
        ];
        for provider in provider_names {
            row.push(format_travel_time(record.travel_time(provider)));
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

pub(crate) fn format_travel_time(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_travel_time(cell: &str) -> Result<Option<u32>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    // Re-ingested files may carry float-formatted values like "600.0".
    let value: f64 = cell
        .parse()
        .with_context(|| format!("Invalid travel time value `{cell}`"))?;
    Ok(Some(value as u32))
}

fn column_index(headers: &StringRecord, column: &str, path: &str) -> Result<usize> {
    match headers.iter().position(|h| h == column) {
        Some(idx) => Ok(idx),
        None => bail!("Input file {path} is missing required column `{column}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn providers() -> Vec<String> {
        vec!["traveltime".to_string(), "google".to_string()]
    }

    fn record(origin: &str, tt: Option<u32>, google: Option<u32>) -> TravelTimeRecord {
        TravelTimeRecord {
            origin: origin.to_string(),
            destination: "51.5074,-0.1278".to_string(),
            departure_time: "2023-09-05 12:00:00+0100".to_string(),
            travel_times: HashMap::from([
                ("traveltime".to_string(), tt),
                ("google".to_string(), google),
            ]),
        }
    }

    #[test]
    fn test_read_location_pairs_deduplicates_preserving_order() {
        let path = temp_path("travel_time_rater_test_pairs.csv");
        fs::write(
            &path,
            "origin,destination\n\
             \"51.1,-0.1\",\"51.2,-0.2\"\n\
             \"51.3,-0.3\",\"51.4,-0.4\"\n\
             \"51.1,-0.1\",\"51.2,-0.2\"\n",
        )
        .unwrap();

        let pairs = read_location_pairs(&path).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("51.1,-0.1".to_string(), "51.2,-0.2".to_string()),
                ("51.3,-0.3".to_string(), "51.4,-0.4".to_string()),
            ]
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_location_pairs_missing_column_is_rejected() {
        let path = temp_path("travel_time_rater_test_no_dest.csv");
        fs::write(&path, "origin\n\"51.1,-0.1\"\n").unwrap();

        let error = read_location_pairs(&path).unwrap_err();
        assert!(error.to_string().contains("destination"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_then_read_travel_times_round_trip() {
        let path = temp_path("travel_time_rater_test_round_trip.csv");
        let records = vec![
            record("51.1,-0.1", Some(600), Some(630)),
            record("51.3,-0.3", Some(900), None),
        ];

        write_travel_times(&path, &records, &providers()).unwrap();
        let reloaded = read_travel_times(&path, &providers()).unwrap();

        assert_eq!(reloaded, records);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_travel_times_uses_column_naming_convention() {
        let path = temp_path("travel_time_rater_test_header_names.csv");
        write_travel_times(&path, &[], &providers()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().next().unwrap(),
            "origin,destination,departure_time,tt_travel_time,google_travel_time"
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_travel_times_missing_provider_column_is_rejected() {
        let path = temp_path("travel_time_rater_test_missing_provider.csv");
        fs::write(
            &path,
            "origin,destination,departure_time,tt_travel_time\n\
             \"51.1,-0.1\",\"51.2,-0.2\",2023-09-05 12:00:00+0100,600\n",
        )
        .unwrap();

        let error = read_travel_times(&path, &providers()).unwrap_err();
        assert!(error.to_string().contains("google_travel_time"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_travel_times_accepts_float_formatted_values() {
        let path = temp_path("travel_time_rater_test_float_cells.csv");
        fs::write(
            &path,
            "origin,destination,departure_time,tt_travel_time,google_travel_time\n\
             \"51.1,-0.1\",\"51.2,-0.2\",2023-09-05 12:00:00+0100,600.0,630.0\n",
        )
        .unwrap();

        let records = read_travel_times(&path, &providers()).unwrap();
        assert_eq!(records[0].travel_time("traveltime"), Some(600));
        assert_eq!(records[0].travel_time("google"), Some(630));

        fs::remove_file(&path).unwrap();
    }
}
