//! Provider clients for the baseline and every competitor routing API.
//!
//! Each client translates one (origin, destination, departure time, mode)
//! request into its provider's wire format and normalizes the response to a
//! [`RequestResult`]. Ordinary failures (timeouts, non-2xx statuses, broken
//! payloads, no-route answers) never escape a client; they are logged and
//! become an absent travel time. An `Err` from [`RequestHandler::send_request`]
//! is reserved for configuration mistakes such as an unsupported mode.

mod google;
mod here;
mod mapbox;
mod openroutes;
mod osrm;
mod tomtom;
mod traveltime;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::collect::{
    Coordinates, GOOGLE_API, HERE_API, MAPBOX_API, OPENROUTES_API, OSRM_API, TOMTOM_API,
};
use crate::config::{Mode, Provider, Providers};
use crate::limiter::RateLimiter;

pub use google::GoogleRequestHandler;
pub use here::HereRequestHandler;
pub use mapbox::MapboxRequestHandler;
pub use openroutes::OpenRoutesRequestHandler;
pub use osrm::OsrmRequestHandler;
pub use tomtom::TomTomRequestHandler;
pub use traveltime::TravelTimeRequestHandler;

/// A provider's normalized answer: travel time in seconds, or absence when
/// the request failed in any ordinary way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestResult {
    pub travel_time: Option<u32>,
}

/// The single capability every provider client implements.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn send_request(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        departure_time: DateTime<Tz>,
        mode: Mode,
    ) -> Result<RequestResult>;

    /// The limiter a caller must hold capacity from around one request.
    fn rate_limiter(&self) -> &RateLimiter;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

/// Builds one handler per configured provider, baseline included.
///
/// Adding a provider means adding an arm here and nothing anywhere else;
/// dispatch stays behind the [`RequestHandler`] trait.
pub fn initialize_request_handlers(
    providers: &Providers,
) -> Result<HashMap<String, Arc<dyn RequestHandler>>> {
    let mut handlers: HashMap<String, Arc<dyn RequestHandler>> = HashMap::new();

    for competitor in &providers.competitors {
        handlers.insert(competitor.name.clone(), create_handler(competitor)?);
    }

    // The baseline is always part of the comparison.
    let base = &providers.base;
    handlers.insert(
        base.name.clone(),
        Arc::new(TravelTimeRequestHandler::new(
            base.credentials.app_id.as_deref().unwrap_or_default(),
            &base.credentials.api_key,
            base.max_rpm,
        )?),
    );

    Ok(handlers)
}

fn create_handler(provider: &Provider) -> Result<Arc<dyn RequestHandler>> {
    let api_key = &provider.credentials.api_key;
    let handler: Arc<dyn RequestHandler> = match provider.name.as_str() {
        GOOGLE_API => Arc::new(GoogleRequestHandler::new(api_key, provider.max_rpm)?),
        TOMTOM_API => Arc::new(TomTomRequestHandler::new(api_key, provider.max_rpm)?),
        HERE_API => Arc::new(HereRequestHandler::new(api_key, provider.max_rpm)?),
        OSRM_API => Arc::new(OsrmRequestHandler::new(provider.max_rpm)?),
        MAPBOX_API => Arc::new(MapboxRequestHandler::new(api_key, provider.max_rpm)?),
        OPENROUTES_API => Arc::new(OpenRoutesRequestHandler::new(api_key, provider.max_rpm)?),
        other => bail!("Unsupported API provider: {other}"),
    };
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn provider(name: &str) -> Provider {
        Provider {
            name: name.to_string(),
            max_rpm: 60,
            credentials: Credentials { api_key: "key".to_string(), app_id: None },
        }
    }

    #[test]
    fn test_initialize_request_handlers_always_includes_baseline() {
        let providers = Providers {
            base: Provider {
                name: "traveltime".to_string(),
                max_rpm: 60,
                credentials: Credentials {
                    api_key: "key".to_string(),
                    app_id: Some("app".to_string()),
                },
            },
            competitors: vec![provider("google"), provider("osrm")],
        };

        let handlers = initialize_request_handlers(&providers).unwrap();

        assert_eq!(handlers.len(), 3);
        assert!(handlers.contains_key("traveltime"));
        assert!(handlers.contains_key("google"));
        assert!(handlers.contains_key("osrm"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let error = match create_handler(&provider("waze")) {
            Ok(_) => panic!("expected create_handler to reject unknown provider"),
            Err(e) => e,
        };
        assert_eq!(error.to_string(), "Unsupported API provider: waze");
    }
}
