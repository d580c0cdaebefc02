//! HERE Routing API client.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;
use tracing::error;

use super::{RequestHandler, RequestResult, http_client};
use crate::collect::Coordinates;
use crate::config::Mode;
use crate::limiter::RateLimiter;

const HERE_ROUTES_URL: &str = "https://router.hereapi.com/v8/routes";

pub struct HereRequestHandler {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl HereRequestHandler {
    pub fn new(api_key: &str, max_rpm: u32) -> Result<Self> {
        Ok(Self {
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
    ) -> Result<u32> {
        let params = [
            ("transportMode", here_specific_mode(mode).to_string()),
            ("origin", format!("{},{}", origin.lat, origin.lng)),
            (
                "destination",
                format!("{},{}", destination.lat, destination.lng),
            ),
            ("return", "summary".to_string()),
            (
                "departureTime",
                departure_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ),
            ("apikey", self.api_key.clone()),
        ];

        let response = self
            .client
            .get(HERE_ROUTES_URL)
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!("HERE API returned status {status}: {}", data["detailedError"]);
        }
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for HereRequestHandler {
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
            Ok(travel_time) => Ok(RequestResult { travel_time: Some(travel_time) }),
            Err(e) => {
                error!(error = %e, "HERE API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// A simple routing request should come back as one section, but the total
/// is summed over all of them just in case.
///
/// HERE sometimes answers with a 0-duration, 0-length route (seen on remote
/// mountain pairs in the UK) without marking the request as failed. A zero
/// total is therefore treated as a failed request.
fn extract_travel_time(data: &Value) -> Result<u32> {
    let sections = data["routes"][0]["sections"]
        .as_array()
        .context("No route found between origin and destination.")?;

    let total_duration: u64 = sections
        .iter()
        .map(|section| section["summary"]["duration"].as_u64().unwrap_or(0))
        .sum();

    if total_duration == 0 {
        bail!("Zero-duration route in HERE API response");
    }
    Ok(total_duration as u32)
}

fn here_specific_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Driving => "car",
        // HERE has no general transit mode; bus is the closest profile.
        Mode::PublicTransport => "bus",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_here_specific_mode() {
        assert_eq!(here_specific_mode(Mode::Driving), "car");
        assert_eq!(here_specific_mode(Mode::PublicTransport), "bus");
    }

    #[test]
    fn test_extract_travel_time_sums_sections() {
        let data = json!({
            "routes": [{
                "sections": [
                    { "summary": { "duration": 600 } },
                    { "summary": { "duration": 120 } }
                ]
            }]
        });

        assert_eq!(extract_travel_time(&data).unwrap(), 720);
    }

    #[test]
    fn test_extract_travel_time_rejects_zero_duration_route() {
        let data = json!({
            "routes": [{ "sections": [{ "summary": { "duration": 0 } }] }]
        });

        let error = extract_travel_time(&data).unwrap_err();
        assert!(error.to_string().contains("Zero-duration"));
    }

    #[test]
    fn test_extract_travel_time_rejects_missing_routes() {
        let data = json!({ "routes": [] });
        assert!(extract_travel_time(&data).is_err());
    }
}
