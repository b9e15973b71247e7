//! HTTP client for an OSRM-compatible routing server.

use std::time::Duration;

use serde::Deserialize;
use shadow_runner_core::{
    geodesy::GeoPoint,
    services::{BoxFuture, RoutingError, RoutingService, TravelProfile},
};
use tracing::debug;

pub struct HttpRouter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRouter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn route_url(&self, start: GeoPoint, destination: GeoPoint, profile: TravelProfile) -> String {
        let profile = match profile {
            TravelProfile::Walking => "foot",
        };

        format!(
            "{}/route/v1/{profile}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url,
            start.longitude,
            start.latitude,
            destination.longitude,
            destination.latitude,
        )
    }
}

impl RoutingService for HttpRouter {
    fn route<'a>(
        &'a self,
        start: GeoPoint,
        destination: GeoPoint,
        profile: TravelProfile,
    ) -> BoxFuture<'a, Result<Vec<GeoPoint>, RoutingError>> {
        Box::pin(async move {
            let url = self.route_url(start, destination, profile);
            debug!(%url, "requesting route");

            let response = self.client.get(&url).send().await.map_err(|e| {
                if e.is_timeout() {
                    RoutingError::TimedOut
                } else {
                    RoutingError::Transport(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(RoutingError::Status(status.as_u16()));
            }

            let body: OsrmResponse = response
                .json()
                .await
                .map_err(|e| RoutingError::Decode(e.to_string()))?;

            body.into_route()
        })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// `[longitude, latitude]` pairs.
    coordinates: Vec<[f64; 2]>,
}

impl OsrmResponse {
    fn into_route(self) -> Result<Vec<GeoPoint>, RoutingError> {
        if self.code != "Ok" {
            return Err(RoutingError::NoRoute);
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or(RoutingError::NoRoute)?;

        let points = route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| GeoPoint::new(lat, lng))
            .collect::<Vec<_>>();

        if points.len() < 2 {
            return Err(RoutingError::NoRoute);
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<Vec<GeoPoint>, RoutingError> {
        serde_json::from_str::<OsrmResponse>(body).unwrap().into_route()
    }

    #[test]
    fn test_url_is_lng_lat_ordered() {
        let router = HttpRouter::with_client(reqwest::Client::new(), "https://router.example/");

        let url = router.route_url(
            GeoPoint::new(48.8566, 2.3522),
            GeoPoint::new(48.87, 2.36),
            TravelProfile::Walking,
        );

        assert_eq!(
            url,
            "https://router.example/route/v1/foot/2.3522,48.8566;2.36,48.87?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn test_first_route_geometry_is_used() {
        let route = parse(
            r#"{
                "code": "Ok",
                "routes": [
                    { "geometry": { "type": "LineString", "coordinates": [[2.35, 48.85], [2.36, 48.86]] }, "distance": 1300.2 },
                    { "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(route, vec![GeoPoint::new(48.85, 2.35), GeoPoint::new(48.86, 2.36)]);
    }

    #[test]
    fn test_no_route_answers() {
        assert!(matches!(
            parse(r#"{ "code": "NoRoute", "routes": [] }"#),
            Err(RoutingError::NoRoute)
        ));
        assert!(matches!(parse(r#"{ "code": "Ok" }"#), Err(RoutingError::NoRoute)));
        assert!(matches!(
            parse(r#"{ "code": "Ok", "routes": [{ "geometry": { "coordinates": [[2.35, 48.85]] } }] }"#),
            Err(RoutingError::NoRoute)
        ));
    }
}
