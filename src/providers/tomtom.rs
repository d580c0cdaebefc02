//! TomTom Routing API client.

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

const TOMTOM_ROUTING_URL: &str = "https://api.tomtom.com/routing/1/calculateRoute/";

pub struct TomTomRequestHandler {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl TomTomRequestHandler {
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
        let route = format!(
            "{},{}:{},{}",
            origin.lat, origin.lng, destination.lat, destination.lng
        );
        let params = [
            ("key", self.api_key.clone()),
            ("departAt", departure_time.to_rfc3339()),
            ("travelMode", tomtom_specific_mode(mode).to_string()),
        ];

        let response = self
            .client
            .get(format!("{TOMTOM_ROUTING_URL}{route}/json"))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!(
                "TomTom API returned status {status}: {}",
                data["detailedError"]
            );
        }
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for TomTomRequestHandler {
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
                error!(error = %e, "TomTom API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

fn extract_travel_time(data: &Value) -> Result<u32> {
    let travel_time = data["routes"][0]["summary"]["travelTimeInSeconds"]
        .as_u64()
        .context("Missing travelTimeInSeconds in TomTom API response")?;
    if travel_time == 0 {
        bail!("No route found between origin and destination.");
    }
    Ok(travel_time as u32)
}

fn tomtom_specific_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Driving => "car",
        // TomTom has no general transit mode; bus is the closest profile.
        Mode::PublicTransport => "bus",
    }
}
