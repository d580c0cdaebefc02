//! Fetch-workload generation and the concurrent collection pipeline.
//!
//! One fetch task exists per (location pair, time instant, provider). Tasks
//! run as independent tokio tasks, gated only by their provider's rate
//! limiter, and every task settles before the merged result table is built.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDateTime};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::config::Mode;
use crate::output;
use crate::providers::RequestHandler;

pub const GOOGLE_API: &str = "google";
pub const TOMTOM_API: &str = "tomtom";
pub const HERE_API: &str = "here";
pub const OSRM_API: &str = "osrm";
pub const MAPBOX_API: &str = "mapbox";
pub const OPENROUTES_API: &str = "openroutes";
pub const TRAVELTIME_API: &str = "traveltime";

pub const ORIGIN: &str = "origin";
pub const DESTINATION: &str = "destination";
pub const DEPARTURE_TIME: &str = "departure_time";

/// Timestamp format used for the `departure_time` column, offset included.
pub const DEPARTURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Column name holding a provider's travel time. The baseline keeps its
/// historical short code.
pub fn travel_time_column(provider: &str) -> String {
    if provider == TRAVELTIME_API {
        "tt_travel_time".to_string()
    } else {
        format!("{provider}_travel_time")
    }
}

pub fn capitalized_provider_name(provider: &str) -> String {
    match provider {
        GOOGLE_API => "Google",
        TOMTOM_API => "TomTom",
        HERE_API => "HERE",
        OSRM_API => "OSRM",
        OPENROUTES_API => "OpenRoutes",
        MAPBOX_API => "Mapbox",
        TRAVELTIME_API => "TravelTime",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Parses a `"lat,lng"` string, tolerating whitespace around either field.
pub fn parse_coordinates(coord_string: &str) -> Result<Coordinates> {
    let parts: Vec<&str> = coord_string.split(',').collect();
    let [lat, lng] = parts.as_slice() else {
        bail!("Invalid coordinate string: `{coord_string}`");
    };
    Ok(Coordinates {
        lat: lat
            .trim()
            .parse()
            .with_context(|| format!("Invalid latitude in `{coord_string}`"))?,
        lng: lng
            .trim()
            .parse()
            .with_context(|| format!("Invalid longitude in `{coord_string}`"))?,
    })
}

/// Interprets a `YYYY-MM-DD` date and `HH:MM` time in the given time zone.
pub fn localize_datetime(date: &str, time: &str, timezone: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M")
        .with_context(|| format!("Invalid date/time `{date} {time}`"))?;
    naive
        .and_local_timezone(timezone)
        .earliest()
        .with_context(|| format!("Time {naive} does not exist in time zone {timezone}"))
}

/// Generates the departure-time series: start and every `interval`-minute
/// step up to and including end. Never overshoots past end.
pub fn generate_time_instants(
    start_time: DateTime<Tz>,
    end_time: DateTime<Tz>,
    interval: i64,
) -> Result<Vec<DateTime<Tz>>> {
    if start_time > end_time {
        bail!("Start time must be before end time.");
    }
    if interval <= 0 {
        bail!("Interval must be a positive number of minutes.");
    }

    let step = Duration::minutes(interval);
    let mut current_time = start_time;
    let mut results = Vec::new();
    while current_time <= end_time {
        results.push(current_time);
        current_time += step;
    }
    Ok(results)
}

/// One unit of fetch work: a location pair, a departure time, a provider.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub origin: String,
    pub destination: String,
    pub provider: String,
    pub departure_time: DateTime<Tz>,
}

/// A single provider's answer for one task, keyed for merging.
#[derive(Debug, Clone)]
pub struct Observation {
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    pub provider: String,
    pub travel_time: Option<u32>,
}

/// One row of the result table: a unique (origin, destination,
/// departure_time) triple with one travel time per provider. A missing
/// provider value is an explicit absence, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelTimeRecord {
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    pub travel_times: HashMap<String, Option<u32>>,
}

impl TravelTimeRecord {
    pub fn travel_time(&self, provider: &str) -> Option<u32> {
        self.travel_times.get(provider).copied().flatten()
    }

    /// True when every listed provider contributed a value.
    pub fn has_all(&self, provider_names: &[String]) -> bool {
        provider_names
            .iter()
            .all(|provider| self.travel_time(provider).is_some())
    }
}

/// Enumerates the full Cartesian workload: |pairs| x |instants| x |providers|.
pub fn generate_tasks(
    pairs: &[(String, String)],
    time_instants: &[DateTime<Tz>],
    provider_names: &[String],
) -> Vec<FetchTask> {
    let mut tasks = Vec::with_capacity(pairs.len() * time_instants.len() * provider_names.len());
    for (origin, destination) in pairs {
        for time_instant in time_instants {
            for provider in provider_names {
                tasks.push(FetchTask {
                    origin: origin.clone(),
                    destination: destination.clone(),
                    provider: provider.clone(),
                    departure_time: *time_instant,
                });
            }
        }
    }
    tasks
}

/// Runs one fetch task: waits for rate-limiter capacity, issues the single
/// provider request, and wraps the outcome as an [`Observation`].
///
/// An `Err` here means a configuration mistake (malformed coordinates, an
/// unsupported mode) and aborts the run; ordinary request failures were
/// already absorbed into an absent travel time by the handler.
pub async fn fetch_travel_time(
    task: FetchTask,
    handler: Arc<dyn RequestHandler>,
    mode: Mode,
) -> Result<Observation> {
    let origin = parse_coordinates(&task.origin)?;
    let destination = parse_coordinates(&task.destination)?;

    handler.rate_limiter().acquire().await;
    debug!(
        provider = %task.provider,
        origin = %task.origin,
        destination = %task.destination,
        departure_time = %task.departure_time,
        "Sending request"
    );
    let result = handler
        .send_request(origin, destination, task.departure_time, mode)
        .await?;
    debug!(provider = %task.provider, "Finished request");

    Ok(Observation {
        departure_time: task.departure_time.format(DEPARTURE_TIME_FORMAT).to_string(),
        origin: task.origin,
        destination: task.destination,
        provider: task.provider,
        travel_time: result.travel_time,
    })
}

/// Merges observations into the deduplicated result table.
///
/// Rows come out sorted by key. When several observations collide on the
/// same (key, provider) cell, the first non-absent value wins.
pub fn merge_observations(observations: Vec<Observation>) -> Vec<TravelTimeRecord> {
    let mut grouped: BTreeMap<(String, String, String), HashMap<String, Option<u32>>> =
        BTreeMap::new();

    for observation in observations {
        let key = (
            observation.origin,
            observation.destination,
            observation.departure_time,
        );
        let row = grouped.entry(key).or_default();
        let cell = row.entry(observation.provider).or_insert(None);
        if cell.is_none() {
            *cell = observation.travel_time;
        }
    }

    grouped
        .into_iter()
        .map(|((origin, destination, departure_time), travel_times)| TravelTimeRecord {
            origin,
            destination,
            departure_time,
            travel_times,
        })
        .collect()
}

/// Executes the full workload concurrently and assembles the result table.
///
/// All tasks are spawned up front; each provider's rate limiter is the only
/// thing bounding its throughput. The merged table is written to
/// `output_path` before being returned.
pub async fn collect_travel_times(
    pairs: &[(String, String)],
    time_instants: &[DateTime<Tz>],
    request_handlers: &HashMap<String, Arc<dyn RequestHandler>>,
    provider_names: &[String],
    mode: Mode,
    output_path: &str,
) -> Result<Vec<TravelTimeRecord>> {
    let tasks = generate_tasks(pairs, time_instants, provider_names);

    let capitalized_providers = provider_names
        .iter()
        .map(|provider| capitalized_provider_name(provider))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "Sending {} requests to {} APIs",
        tasks.len(),
        capitalized_providers
    );

    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let handler = request_handlers
            .get(&task.provider)
            .cloned()
            .with_context(|| format!("No request handler for provider {}", task.provider))?;
        handles.push(tokio::spawn(fetch_travel_time(task, handler, mode)));
    }

    // Every task settles before any fatal error is surfaced.
    let mut settled = Vec::with_capacity(handles.len());
    for handle in handles {
        settled.push(handle.await?);
    }
    let mut observations = Vec::with_capacity(settled.len());
    for outcome in settled {
        observations.push(outcome?);
    }

    let records = merge_observations(observations);
    output::write_travel_times(output_path, &records, provider_names)?;
    Ok(records)
}
