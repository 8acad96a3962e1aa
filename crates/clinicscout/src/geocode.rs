//! Address geocoding and the coordinate columns added to service results.

use std::future::Future;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::types::{Dataset, DatasetError};

pub const LOCATION_COLUMN: &str = "loc";
pub const LAT_COLUMN: &str = "lat";
pub const LON_COLUMN: &str = "lon";

const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid geocoder response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid geocoder URL: {0}")]
    Url(String),
    #[error("Invalid coordinate: {0:?}")]
    Coordinate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Free-text address lookup. `Ok(None)` means the service knows no such place.
pub trait Geocoder {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<Coordinates>, GeocodeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, GeocodeError> {
        Self::with_endpoint(NOMINATIM_SEARCH_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

fn coordinate(raw: &str) -> Result<f64, GeocodeError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| GeocodeError::Coordinate(raw.to_string()))
}

impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[("q", address), ("format", "json"), ("limit", "1")],
        )
        .map_err(|e| GeocodeError::Url(e.to_string()))?;

        let body = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await?;

        let places: Vec<NominatimPlace> = serde_json::from_str(&body)?;
        places
            .first()
            .map(|p| {
                Ok(Coordinates {
                    lat: coordinate(&p.lat)?,
                    lon: coordinate(&p.lon)?,
                })
            })
            .transpose()
    }
}

/// Query text for one address: house and street abbreviations dropped, the
/// region name appended.
pub fn location_query(address: &str, region: &str) -> String {
    format!("{}, {}", address.replace("д. ", "").replace("ул. ", ""), region)
}

/// Adds `loc`, `lat` and `lon` columns, geocoding one row at a time. A miss or
/// a failed lookup leaves that row's coordinates absent and moves on. A
/// dataset that already has coordinates is left alone.
pub async fn enrich_with_coordinates<G: Geocoder>(
    dataset: &mut Dataset,
    region: &str,
    geocoder: &G,
) -> Result<(), DatasetError> {
    if dataset.column_index(LAT_COLUMN).is_some() {
        log::info!("Dataset already has coordinates, skipping geocoding");
        return Ok(());
    }

    let locations: Vec<Option<String>> = dataset
        .column_values(crate::ADDRESS_COLUMN)?
        .map(|address| address.map(|a| location_query(a, region)))
        .collect();

    let mut lats = Vec::with_capacity(locations.len());
    let mut lons = Vec::with_capacity(locations.len());
    let mut found = 0;
    for location in &locations {
        let coords = match location {
            Some(query) => match geocoder.geocode(query).await {
                Ok(coords) => coords,
                Err(e) => {
                    log::warn!("Failed to geocode {}: {}", query, e);
                    None
                }
            },
            None => None,
        };
        if coords.is_none() {
            log::warn!("No coordinates for {:?}", location);
        } else {
            found += 1;
        }
        lats.push(coords.map(|c| c.lat.to_string()));
        lons.push(coords.map(|c| c.lon.to_string()));
    }

    log::info!("Geocoded {} of {} row(s)", found, locations.len());
    dataset.add_column(LOCATION_COLUMN, locations)?;
    dataset.add_column(LAT_COLUMN, lats)?;
    dataset.add_column(LON_COLUMN, lons)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub name: Option<String>,
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// Rows that can be placed on a map; rows missing either coordinate are
/// dropped.
pub fn map_points(dataset: &Dataset) -> Vec<MapPoint> {
    let (Some(lat), Some(lon)) = (
        dataset.column_index(LAT_COLUMN),
        dataset.column_index(LON_COLUMN),
    ) else {
        return Vec::new();
    };
    let name = dataset.column_index(crate::NAME_COLUMN);
    let address = dataset.column_index(crate::ADDRESS_COLUMN);

    dataset
        .rows()
        .iter()
        .filter_map(|r| {
            Some(MapPoint {
                name: name.and_then(|i| r.get(i)).map(str::to_string),
                address: address.and_then(|i| r.get(i)).map(str::to_string),
                lat: r.get(lat)?.parse().ok()?,
                lon: r.get(lon)?.parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedGeocoder(HashMap<&'static str, Coordinates>);

    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
            if address.contains("ошибка") {
                return Err(GeocodeError::Coordinate(address.to_string()));
            }
            Ok(self.0.get(address).copied())
        }
    }

    fn clinics() -> Dataset {
        let mut ds = Dataset::new(["Название", "Адрес"]);
        for (name, address) in [
            ("Клиника Здоровье", Some("ул. Ленина, д. 1")),
            ("Медцентр Плюс", Some("ул. Мира, д. 15")),
            ("Без адреса", None),
            ("Сбой", Some("ошибка")),
        ] {
            ds.push(Record::new(vec![
                Some(name.to_string()),
                address.map(str::to_string),
            ]))
            .unwrap();
        }
        ds
    }

    #[test]
    fn test_location_query() {
        assert_eq!(location_query("ул. Ленина, д. 1", "Сочи"), "Ленина, 1, Сочи");
    }

    #[tokio::test]
    async fn test_enrich_keeps_rows_without_coordinates() {
        let geocoder = FixedGeocoder(HashMap::from([(
            "Ленина, 1, Сочи",
            Coordinates {
                lat: 43.58,
                lon: 39.72,
            },
        )]));
        let mut ds = clinics();

        enrich_with_coordinates(&mut ds, "Сочи", &geocoder)
            .await
            .unwrap();

        assert_eq!(ds.len(), 4);
        assert_eq!(ds.columns(), ["Название", "Адрес", "loc", "lat", "lon"]);
        assert_eq!(
            ds.column_values(LAT_COLUMN).unwrap().collect::<Vec<_>>(),
            vec![Some("43.58"), None, None, None]
        );
        assert_eq!(
            ds.column_values(LOCATION_COLUMN).unwrap().collect::<Vec<_>>(),
            vec![
                Some("Ленина, 1, Сочи"),
                Some("Мира, 15, Сочи"),
                None,
                Some("ошибка, Сочи")
            ]
        );

        let points = map_points(&ds);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name.as_deref(), Some("Клиника Здоровье"));
        assert_eq!(points[0].lon, 39.72);

        // Second pass is a no-op.
        enrich_with_coordinates(&mut ds, "Сочи", &geocoder)
            .await
            .unwrap();
        assert_eq!(ds.columns().len(), 5);
    }

    #[test]
    fn test_map_points_without_coordinate_columns() {
        assert!(map_points(&clinics()).is_empty());
    }

    #[tokio::test]
    async fn test_nominatim_geocoder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Ленина, 1, Сочи"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"lat":"43.5855","lon":"39.7231","display_name":"x"}]"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Нигде"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let geocoder =
            NominatimGeocoder::with_endpoint(format!("{}/search", server.uri())).unwrap();

        let found = geocoder.geocode("Ленина, 1, Сочи").await.unwrap();
        assert_eq!(
            found,
            Some(Coordinates {
                lat: 43.5855,
                lon: 39.7231
            })
        );
        assert_eq!(geocoder.geocode("Нигде").await.unwrap(), None);
    }
}
