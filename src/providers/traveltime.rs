//! TravelTime Routes API client, the baseline every competitor is measured
//! against.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::{Value, json};
use tracing::error;

use super::{RequestHandler, RequestResult, http_client};
use crate::collect::Coordinates;
use crate::config::Mode;
use crate::limiter::RateLimiter;

const TRAVELTIME_ROUTES_URL: &str = "https://api.traveltimeapp.com/v4/routes";
const USER_AGENT: &str = "Travel Time Comparison Tool";

const ORIGIN_ID: &str = "o";
const DESTINATION_ID: &str = "d";

pub struct TravelTimeRequestHandler {
    app_id: String,
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl TravelTimeRequestHandler {
    pub fn new(app_id: &str, api_key: &str, max_rpm: u32) -> Result<Self> {
        Ok(Self {
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
            client: http_client()?,
            rate_limiter: RateLimiter::per_minute(max_rpm),
        })
    }

    async fn request_travel_time(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<Option<u32>> {
        let body = routes_request_body(origin, destination, departure_time, mode);

        let response = self
            .client
            .post(TRAVELTIME_ROUTES_URL)
            .header("X-Application-Id", &self.app_id)
            .header("X-Api-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!(
                "TravelTime API returned status {status}: {}",
                data["description"]
            );
        }
        Ok(extract_travel_time(&data))
    }
}

#[async_trait]
impl RequestHandler for TravelTimeRequestHandler {
    async fn send_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<RequestResult> {
        match self
            .request_travel_time(origin, destination, departure_time, mode)
            .await
        {
            Ok(travel_time) => Ok(RequestResult { travel_time }),
            Err(e) => {
                error!(error = %e, "TravelTime API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

fn routes_request_body(
    origin: Coordinates,
    destination: Coordinates,
    departure_time: DateTime<Tz>,
    mode: Mode,
) -> Value {
    json!({
        "locations": [
            { "id": ORIGIN_ID, "coords": { "lat": origin.lat, "lng": origin.lng } },
            { "id": DESTINATION_ID, "coords": { "lat": destination.lat, "lng": destination.lng } }
        ],
        "departure_searches": [{
            "id": "comparison search",
            "departure_location_id": ORIGIN_ID,
            "arrival_location_ids": [DESTINATION_ID],
            "departure_time": departure_time.to_rfc3339(),
            "transportation": { "type": traveltime_specific_mode(mode) },
            "properties": ["travel_time"],
            "snapping": {
                "penalty": "disabled",
                "accept_roads": "both_drivable_and_walkable"
            }
        }]
    })
}

/// An unreachable destination comes back as a result with no location
/// properties rather than an error; that is a plain absent value.
fn extract_travel_time(data: &Value) -> Option<u32> {
    data["results"][0]["locations"][0]["properties"][0]["travel_time"]
        .as_u64()
        .map(|v| v as u32)
}

fn traveltime_specific_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Driving => "driving",
        Mode::PublicTransport => "public_transport",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    #[test]
    fn test_traveltime_specific_mode() {
        assert_eq!(traveltime_specific_mode(Mode::Driving), "driving");
        assert_eq!(
            traveltime_specific_mode(Mode::PublicTransport),
            "public_transport"
        );
    }

    #[test]
    fn test_routes_request_body_shape() {
        let body = routes_request_body(
            Coordinates { lat: 51.4614, lng: -0.1120 },
            Coordinates { lat: 51.5074, lng: -0.1278 },
            UTC.with_ymd_and_hms(2023, 9, 5, 12, 0, 0).unwrap(),
            Mode::Driving,
        );

        assert_eq!(body["locations"][0]["coords"]["lat"], 51.4614);
        assert_eq!(body["departure_searches"][0]["departure_location_id"], "o");
        assert_eq!(body["departure_searches"][0]["arrival_location_ids"][0], "d");
        assert_eq!(
            body["departure_searches"][0]["transportation"]["type"],
            "driving"
        );
        assert_eq!(
            body["departure_searches"][0]["departure_time"],
            "2023-09-05T12:00:00+00:00"
        );
    }

    #[test]
    fn test_extract_travel_time_reads_first_location_properties() {
        let data = serde_json::json!({
            "results": [{
                "locations": [{ "properties": [{ "travel_time": 1745 }] }]
            }]
        });

        assert_eq!(extract_travel_time(&data), Some(1745));
    }

    #[test]
    fn test_extract_travel_time_is_absent_for_unreachable_destination() {
        let data = serde_json::json!({
            "results": [{ "locations": [], "unreachable": ["d"] }]
        });

        assert_eq!(extract_travel_time(&data), None);
    }
}
