//! OSRM public router client. No API key, no departure-time awareness.

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

const OSRM_ROUTES_URL: &str = "http://router.project-osrm.org/route/v1/";

pub struct OsrmRequestHandler {
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl OsrmRequestHandler {
    pub fn new(max_rpm: u32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            rate_limiter: RateLimiter::per_minute(max_rpm),
        })
    }

    async fn request_travel_time(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        mode: Mode,
    ) -> Result<u32> {
        // OSRM expects lng,lat order.
        let route = format!(
            "{},{};{},{}",
            origin.lng, origin.lat, destination.lng, destination.lat
        );
        let transport_mode = osrm_specific_mode(mode)?;

        let response = self
            .client
            .get(format!("{OSRM_ROUTES_URL}{transport_mode}/{route}"))
            .query(&[("overview", "false")])
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!("OSRM API returned status {status}: {}", data["detailedError"]);
        }
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for OsrmRequestHandler {
    async fn send_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        _departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<RequestResult> {
        // An unsupported mode is a configuration error and aborts the run.
        osrm_specific_mode(mode)?;

        match self.request_travel_time(origin, destination, mode).await {
            Ok(travel_time) => Ok(RequestResult { travel_time: Some(travel_time) }),
            Err(e) => {
                error!(error = %e, "OSRM API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

fn extract_travel_time(data: &Value) -> Result<u32> {
    let legs = data["routes"][0]["legs"]
        .as_array()
        .context("No route found between origin and destination.")?;

    let total_duration: f64 = legs
        .iter()
        .map(|leg| leg["duration"].as_f64().unwrap_or(0.0))
        .sum();

    Ok(total_duration as u32)
}

fn osrm_specific_mode(mode: Mode) -> Result<&'static str> {
    match mode {
        Mode::Driving => Ok("driving"),
        Mode::PublicTransport => bail!("Public transport is not supported for OSRM requests"),
    }
}
