//! Remote lineup API client
//!
//! The three read endpoints (lineups by market, stations by lineup, station
//! detail by call sign) sit behind the [`LineupApi`] trait so producers can be
//! driven by fakes in tests. [`LineupClient`] is the HTTP implementation:
//! stateless apart from its rate limiter and connection pool, and shared
//! across producers behind an `Arc`.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: rate-limited requests and status classification
//! - `payloads`: wire types and their conversion into models

use std::future::Future;

use tracing::debug;
use url::Url;

use crate::app::models::{Lineup, Market, StationDetail, StationListing, StationRef};
use crate::errors::{ApiError, ApiResult, ConfigResult, CoordinatorError};

pub mod config;
pub mod http;
pub mod payloads;

pub use config::ClientConfig;

use http::HttpHandler;
use payloads::{LineupPayload, StationDetailPayload, StationPayload};

/// Read operations against the remote lineup source
///
/// Empty results are reported as [`ApiError::NotFound`] so callers can tell
/// "legitimately nothing here" apart from transport failure.
pub trait LineupApi: Send + Sync + 'static {
    /// Lineups serving a market
    fn fetch_lineups(&self, market: &Market) -> impl Future<Output = ApiResult<Vec<Lineup>>> + Send;

    /// Station listing of one lineup
    fn fetch_stations(
        &self,
        lineup_id: &str,
    ) -> impl Future<Output = ApiResult<Vec<StationListing>>> + Send;

    /// Detail metadata for one station
    fn fetch_station_detail(
        &self,
        station: &StationRef,
    ) -> impl Future<Output = ApiResult<StationDetail>> + Send;
}

/// HTTP client for the remote lineup API
#[derive(Debug)]
pub struct LineupClient {
    http_handler: HttpHandler,
    base_url: Url,
}

impl LineupClient {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unusable server URL, a zero rate limit, or
    /// an HTTP client that cannot be constructed
    pub fn new(config: &ClientConfig) -> ConfigResult<Self> {
        let base_url = config.base_url()?;
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps)?;

        tracing::info!("Created lineup API client for {}", base_url);

        Ok(Self {
            http_handler,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the server answers at all
    ///
    /// Any HTTP response counts as reachable; only transport failure does not.
    pub async fn probe(&self) -> Result<(), CoordinatorError> {
        match self.http_handler.probe(&self.base_url).await {
            Ok(status) => {
                debug!("Probe of {} answered {}", self.base_url, status);
                Ok(())
            }
            Err(e) => Err(CoordinatorError::Unreachable {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn endpoint(&self, segments: &[&str], resource: &str) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::fatal(resource, "server URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl LineupApi for LineupClient {
    async fn fetch_lineups(&self, market: &Market) -> ApiResult<Vec<Lineup>> {
        let resource = format!("lineups {}", market);
        let url = self.endpoint(&["tms", "lineups", &market.country, &market.postal_code], &resource)?;

        let payload: Vec<LineupPayload> = self.http_handler.get_json(&url, &resource).await?;
        if payload.is_empty() {
            return Err(ApiError::not_found(resource));
        }

        let lineups: Vec<Lineup> = payload
            .into_iter()
            .filter_map(LineupPayload::into_lineup)
            .collect();
        debug!("{}: {} lineups", market, lineups.len());
        Ok(lineups)
    }

    async fn fetch_stations(&self, lineup_id: &str) -> ApiResult<Vec<StationListing>> {
        let resource = format!("stations of {}", lineup_id);
        let url = self.endpoint(&["dvr", "guide", "stations", lineup_id], &resource)?;

        let payload: Vec<StationPayload> = self.http_handler.get_json(&url, &resource).await?;
        if payload.is_empty() {
            return Err(ApiError::not_found(resource));
        }

        Ok(payload
            .into_iter()
            .filter_map(|station| station.into_listing(lineup_id))
            .collect())
    }

    async fn fetch_station_detail(&self, station: &StationRef) -> ApiResult<StationDetail> {
        let resource = format!("station {}", station.station_id);
        let call_sign = match station.call_sign.as_deref() {
            Some(call_sign) if !call_sign.is_empty() => call_sign,
            _ => {
                debug!("No call sign for station {}", station.station_id);
                return Err(ApiError::not_found(resource));
            }
        };

        let url = self.endpoint(&["tms", "stations", call_sign], &resource)?;
        let candidates: Vec<StationDetailPayload> =
            self.http_handler.get_json(&url, &resource).await?;

        let total = candidates.len();
        candidates
            .into_iter()
            .filter_map(StationDetailPayload::into_detail)
            .find(|detail| detail.station_id == station.station_id)
            .ok_or_else(|| {
                debug!(
                    "No station {} among {} results for {}",
                    station.station_id, total, call_sign
                );
                ApiError::not_found(resource)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> LineupClient {
        let config = ClientConfig {
            rate_limit_rps: 100,
            ..ClientConfig::default().with_server_url(server.uri())
        };
        LineupClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_lineups_and_stations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tms/lineups/USA/90210"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "lineupId": "L1", "name": "Cable", "type": "CABLE" },
                { "lineupId": "L2", "name": "Antenna", "type": "OTA" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dvr/guide/stations/L1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "stationId": "S1", "callSign": "KABC", "channel": "7" },
                { "callSign": "NOID" }
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        let lineups = client.fetch_lineups(&Market::new("USA", "90210")).await.unwrap();
        assert_eq!(lineups.len(), 2);
        assert_eq!(lineups[1].lineup_type.as_deref(), Some("OTA"));

        let stations = client.fetch_stations("L1").await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].lineup.lineup_id, "L1");
    }

    #[tokio::test]
    async fn test_error_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tms/lineups/USA/00000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tms/lineups/USA/11111"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tms/lineups/USA/22222"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dvr/guide/stations/GONE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let kind = |r: ApiResult<Vec<Lineup>>| r.unwrap_err().kind();

        assert_eq!(
            kind(client.fetch_lineups(&Market::new("USA", "00000")).await),
            ErrorKind::NotFound
        );
        assert_eq!(
            kind(client.fetch_lineups(&Market::new("USA", "11111")).await),
            ErrorKind::Transient
        );
        assert_eq!(
            kind(client.fetch_lineups(&Market::new("USA", "22222")).await),
            ErrorKind::Fatal
        );
        assert_eq!(
            client.fetch_stations("GONE").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_station_detail_matches_station_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tms/stations/KABC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "stationId": "99999", "callSign": "KABC", "name": "Other" },
                { "stationId": "10035", "callSign": "KABC", "name": "KABC ABC 7", "bcastLangs": ["en"] }
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        let detail = client
            .fetch_station_detail(&StationRef::new("10035", Some("KABC".to_string())))
            .await
            .unwrap();
        assert_eq!(detail.name.as_deref(), Some("KABC ABC 7"));

        let missing = client
            .fetch_station_detail(&StationRef::new("12345", Some("KABC".to_string())))
            .await;
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);

        let no_call_sign = client
            .fetch_station_detail(&StationRef::new("10035", None))
            .await;
        assert_eq!(no_call_sign.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_probe() {
        let server = MockServer::start().await;
        // No mocks mounted: wiremock answers 404, which still means reachable
        let client = client_for(&server).await;
        assert!(client.probe().await.is_ok());

        let unreachable = LineupClient::new(
            &ClientConfig::default().with_server_url("http://127.0.0.1:1"),
        )
        .unwrap();
        assert!(unreachable.probe().await.is_err());
    }
}
