//! Mapbox Directions API client.

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

const MAPBOX_ROUTES_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";

pub struct MapboxRequestHandler {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl MapboxRequestHandler {
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
        // Mapbox expects lng,lat order.
        let route = format!(
            "{},{};{},{}",
            origin.lng, origin.lat, destination.lng, destination.lat
        );
        let transport_mode = mapbox_specific_mode(mode)?;
        let params = [
            (
                "depart_at",
                departure_time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
            ("access_token", self.api_key.clone()),
            // Ferries are excluded to keep routes comparable to plain driving.
            ("exclude", "ferry".to_string()),
        ];

        let response = self
            .client
            .get(format!("{MAPBOX_ROUTES_URL}/{transport_mode}/{route}"))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!(
                "Mapbox API returned status {status}: {}",
                data["detailedError"]
            );
        }
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for MapboxRequestHandler {
    async fn send_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<RequestResult> {
        // An unsupported mode is a configuration error and aborts the run.
        mapbox_specific_mode(mode)?;

        match self
            .request_travel_time(origin, destination, departure_time, mode)
            .await
        {
            Ok(travel_time) => Ok(RequestResult { travel_time: Some(travel_time) }),
            Err(e) => {
                error!(error = %e, "Mapbox API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

fn extract_travel_time(data: &Value) -> Result<u32> {
    let duration = data["routes"][0]["duration"]
        .as_f64()
        .context("Missing duration in Mapbox API response")?;
    if duration == 0.0 {
        bail!("No route found between origin and destination.");
    }
    Ok(duration as u32)
}

fn mapbox_specific_mode(mode: Mode) -> Result<&'static str> {
    match mode {
        Mode::Driving => Ok("driving-traffic"),
        Mode::PublicTransport => bail!("Public transport is not supported for Mapbox requests"),
    }
}
