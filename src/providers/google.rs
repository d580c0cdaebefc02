//! Google Directions API client.

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

const GOOGLE_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

pub struct GoogleRequestHandler {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl GoogleRequestHandler {
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
            ("origin", format!("{},{}", origin.lat, origin.lng)),
            (
                "destination",
                format!("{},{}", destination.lat, destination.lng),
            ),
            ("mode", google_specific_mode(mode).to_string()),
            ("traffic_model", "best_guess".to_string()),
            ("departure_time", departure_time.timestamp().to_string()),
            ("key", self.api_key.clone()),
        ];

        let response = self
            .client
            .get(GOOGLE_DIRECTIONS_URL)
            .query(&params)
            .send()
            .await?;
        let data: Value = response.json().await?;
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for GoogleRequestHandler {
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
                error!(error = %e, "Google API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// Google reports its status in the payload rather than the HTTP code. With
/// traffic data available, `duration_in_traffic` supersedes `duration`.
fn extract_travel_time(data: &Value) -> Result<u32> {
    let status = data["status"].as_str().unwrap_or_default();
    if status != "OK" {
        let error_message = data["error_message"].as_str().unwrap_or_default();
        bail!("Google API returned status {status}: {error_message}");
    }

    let leg = &data["routes"][0]["legs"][0];
    if !leg.is_object() {
        bail!("No route found between origin and destination.");
    }

    let duration = if leg["duration_in_traffic"].is_object() {
        &leg["duration_in_traffic"]
    } else {
        &leg["duration"]
    };
    duration["value"]
        .as_u64()
        .map(|v| v as u32)
        .context("Missing duration value in Google API response")
}

fn google_specific_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Driving => "driving",
        Mode::PublicTransport => "transit",
    }
}
