//! OpenRouteService directions client.

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

const OPEN_ROUTES_URL: &str = "https://api.openrouteservice.org/v2/directions";

pub struct OpenRoutesRequestHandler {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl OpenRoutesRequestHandler {
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
        mode: Mode,
    ) -> Result<u32> {
        let transport_mode = openroutes_specific_mode(mode)?;
        let params = [
            ("api_key", self.api_key.clone()),
            // OpenRouteService expects lng,lat order.
            ("start", format!("{},{}", origin.lng, origin.lat)),
            ("end", format!("{},{}", destination.lng, destination.lat)),
        ];

        let response = self
            .client
            .get(format!("{OPEN_ROUTES_URL}/{transport_mode}"))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let data: Value = response.json().await?;
        if !status.is_success() {
            bail!(
                "OpenRoutes API returned status {status}: {}",
                data["detailedError"]
            );
        }
        extract_travel_time(&data)
    }
}

#[async_trait]
impl RequestHandler for OpenRoutesRequestHandler {
    async fn send_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        _departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<RequestResult> {
        // An unsupported mode is a configuration error and aborts the run.
        openroutes_specific_mode(mode)?;

        match self.request_travel_time(origin, destination, mode).await {
            Ok(travel_time) => Ok(RequestResult { travel_time: Some(travel_time) }),
            Err(e) => {
                error!(error = %e, "OpenRoutes API request failed");
                Ok(RequestResult { travel_time: None })
            }
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

fn extract_travel_time(data: &Value) -> Result<u32> {
    let duration = data["features"][0]["properties"]["segments"][0]["duration"]
        .as_f64()
        .context("Missing segment duration in OpenRoutes API response")?;
    if duration == 0.0 {
        bail!("No route found between origin and destination.");
    }
    Ok(duration as u32)
}

fn openroutes_specific_mode(mode: Mode) -> Result<&'static str> {
    match mode {
        Mode::Driving => Ok("driving-car"),
        Mode::PublicTransport => {
            bail!("Public transport is not supported for OpenRoutes requests")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openroutes_specific_mode_for_driving() {
        assert_eq!(openroutes_specific_mode(Mode::Driving).unwrap(), "driving-car");
    }

    #[test]
    fn test_openroutes_specific_mode_rejects_public_transport() {
        let error = openroutes_specific_mode(Mode::PublicTransport).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Public transport is not supported for OpenRoutes requests"
        );
    }

    #[test]
    fn test_extract_travel_time_reads_first_segment() {
        let data = json!({
            "features": [{
                "properties": { "segments": [{ "duration": 812.6 }] }
            }]
        });

        assert_eq!(extract_travel_time(&data).unwrap(), 812);
    }

    #[test]
    fn test_extract_travel_time_rejects_empty_features() {
        let data = json!({ "features": [] });
        assert!(extract_travel_time(&data).is_err());
    }
}
