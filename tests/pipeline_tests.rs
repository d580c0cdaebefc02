use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use chrono_tz::{Tz, UTC};

use travel_time_rater::analysis::run_analysis;
use travel_time_rater::collect::{Coordinates, TravelTimeRecord, collect_travel_times};
use travel_time_rater::config::{Credentials, Mode, Provider, Providers};
use travel_time_rater::limiter::RateLimiter;
use travel_time_rater::output::read_travel_times;
use travel_time_rater::providers::{RequestHandler, RequestResult};

fn temp_path(name: &str) -> String {
    format!("{}/{}", std::env::temp_dir().display(), name)
}

fn providers() -> Providers {
    Providers {
        base: Provider {
            name: "traveltime".to_string(),
            max_rpm: 60,
            credentials: Credentials {
                api_key: "test".to_string(),
                app_id: Some("test".to_string()),
            },
        },
        competitors: vec![Provider {
            name: "google".to_string(),
            max_rpm: 60,
            credentials: Credentials { api_key: "test".to_string(), app_id: None },
        }],
    }
}

fn record(origin: &str, departure: &str, tt: u32, google: u32) -> TravelTimeRecord {
    TravelTimeRecord {
        origin: origin.to_string(),
        destination: "51.5074,-0.1278".to_string(),
        departure_time: departure.to_string(),
        travel_times: HashMap::from([
            ("traveltime".to_string(), Some(tt)),
            ("google".to_string(), Some(google)),
        ]),
    }
}

/// Re-running the analysis on its own exported CSV reproduces the export
/// byte for byte.
#[test]
fn test_analysis_is_idempotent_over_its_own_export() {
    let first_output = temp_path("travel_time_rater_test_idempotence_1.csv");
    let second_output = temp_path("travel_time_rater_test_idempotence_2.csv");
    let api_providers = providers();
    let provider_names = api_providers.all_names();

    let records = vec![
        record("51.4614,-0.1120", "2023-09-05 12:00:00+0100", 290, 300),
        record("51.4614,-0.1120", "2023-09-05 13:00:00+0100", 600, 540),
        record("53.4808,-2.2426", "2023-09-05 12:00:00+0100", 1800, 1950),
    ];

    run_analysis(&records, &first_output, 0.90, &api_providers).unwrap();

    let reloaded = read_travel_times(&first_output, &provider_names).unwrap();
    run_analysis(&reloaded, &second_output, 0.90, &api_providers).unwrap();

    let first = std::fs::read_to_string(&first_output).unwrap();
    let second = std::fs::read_to_string(&second_output).unwrap();
    assert_eq!(first, second);
    assert!(first.lines().next().unwrap().contains("error_percentage_google"));

    std::fs::remove_file(&first_output).unwrap();
    std::fs::remove_file(&second_output).unwrap();
}

/// A canned provider client: always answers with the same travel time.
struct StubHandler {
    travel_time: Option<u32>,
    rate_limiter: RateLimiter,
}

impl StubHandler {
    fn new(travel_time: Option<u32>) -> Arc<dyn RequestHandler> {
        Arc::new(Self {
            travel_time,
            rate_limiter: RateLimiter::per_minute(6000),
        })
    }
}

#[async_trait]
impl RequestHandler for StubHandler {
    async fn send_request(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
        _departure_time: DateTime<Tz>,
        _mode: Mode,
    ) -> Result<RequestResult> {
        Ok(RequestResult { travel_time: self.travel_time })
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

#[tokio::test]
async fn test_collect_assembles_and_persists_the_result_table() {
    let output = temp_path("travel_time_rater_test_collect_output.csv");
    let provider_names = vec!["traveltime".to_string(), "google".to_string()];
    let request_handlers = HashMap::from([
        ("traveltime".to_string(), StubHandler::new(Some(600))),
        ("google".to_string(), StubHandler::new(Some(630))),
    ]);

    let pairs = vec![
        ("51.4614,-0.1120".to_string(), "51.5074,-0.1278".to_string()),
        ("53.4808,-2.2426".to_string(), "53.8008,-1.5491".to_string()),
    ];
    let time_instants = vec![
        UTC.with_ymd_and_hms(2023, 9, 5, 12, 0, 0).unwrap(),
        UTC.with_ymd_and_hms(2023, 9, 5, 13, 0, 0).unwrap(),
    ];

    let records = collect_travel_times(
        &pairs,
        &time_instants,
        &request_handlers,
        &provider_names,
        Mode::Driving,
        &output,
    )
    .await
    .unwrap();

    // 2 pairs x 2 instants, providers merged into the same row.
    assert_eq!(records.len(), 4);
    for record in &records {
        assert_eq!(record.travel_time("traveltime"), Some(600));
        assert_eq!(record.travel_time("google"), Some(630));
    }

    // Write-through: the raw table is on disk and re-ingestable.
    let reloaded = read_travel_times(&output, &provider_names).unwrap();
    assert_eq!(reloaded, records);

    std::fs::remove_file(&output).unwrap();
}

#[tokio::test]
async fn test_collect_keeps_failed_tasks_as_absent_values() {
    let output = temp_path("travel_time_rater_test_collect_absent.csv");
    let provider_names = vec!["traveltime".to_string(), "google".to_string()];
    let request_handlers = HashMap::from([
        ("traveltime".to_string(), StubHandler::new(Some(600))),
        ("google".to_string(), StubHandler::new(None)),
    ]);

    let pairs = vec![("51.4614,-0.1120".to_string(), "51.5074,-0.1278".to_string())];
    let time_instants = vec![UTC.with_ymd_and_hms(2023, 9, 5, 12, 0, 0).unwrap()];

    let records = collect_travel_times(
        &pairs,
        &time_instants,
        &request_handlers,
        &provider_names,
        Mode::Driving,
        &output,
    )
    .await
    .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].travel_time("traveltime"), Some(600));
    assert_eq!(records[0].travel_time("google"), None);
    assert!(!records[0].has_all(&provider_names));

    std::fs::remove_file(&output).unwrap();
}
