//! Who's On First feature model.
//!
//! A [`Feature`] is decoded once from its GeoJSON payload and then handed,
//! read-only, to the attribute extractor, the geometry translator and the
//! ingestion filters.

use geo::Centroid;
use geo_types::{Geometry, Point};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("invalid GeoJSON feature: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported geometry: {0}")]
    Geometry(#[from] geojson::Error),
}

/// Property pairs that carry a precomputed centroid, in order of preference.
const CENTROID_PROPERTIES: [(&str, &str); 3] = [
    ("lbl:latitude", "lbl:longitude"),
    ("reversegeo:latitude", "reversegeo:longitude"),
    ("geom:latitude", "geom:longitude"),
];

#[derive(Clone, Debug)]
pub struct Feature {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub placetype: Option<String>,
    pub inception: Option<String>,
    pub cessation: Option<String>,
    pub belongs_to: Vec<i64>,
    pub alt_label: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    properties: Map<String, Value>,
}

impl Feature {
    pub fn from_slice(body: &[u8]) -> Result<Self, FeatureError> {
        let feature: geojson::Feature = serde_json::from_slice(body)?;
        Self::from_geojson(feature)
    }

    pub fn from_geojson(feature: geojson::Feature) -> Result<Self, FeatureError> {
        let properties = feature.properties.unwrap_or_default();

        let id = properties
            .get("wof:id")
            .and_then(value_as_i64)
            .or_else(|| match &feature.id {
                Some(geojson::feature::Id::Number(n)) => n.as_i64(),
                Some(geojson::feature::Id::String(s)) => s.parse().ok(),
                None => None,
            });

        let belongs_to = properties
            .get("wof:belongsto")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(value_as_i64).collect())
            .unwrap_or_default();

        let geometry = match feature.geometry {
            Some(geometry) => Some(Geometry::<f64>::try_from(geometry)?),
            None => None,
        };

        Ok(Self {
            id,
            name: string_property(&properties, "wof:name"),
            placetype: string_property(&properties, "wof:placetype"),
            inception: string_property(&properties, "edtf:inception"),
            cessation: string_property(&properties, "edtf:cessation"),
            belongs_to,
            alt_label: string_property(&properties, "src:alt_label"),
            geometry,
            properties,
        })
    }

    /// Representative point for the record.
    ///
    /// Label, reverse-geocoding and math centroids published in the
    /// properties win over anything computed here; the computed centroid
    /// covers the full geometry, not its first vertex.
    pub fn centroid(&self) -> Option<Point<f64>> {
        CENTROID_PROPERTIES
            .iter()
            .find_map(|(lat, lon)| {
                let lat = self.properties.get(*lat).and_then(Value::as_f64)?;
                let lon = self.properties.get(*lon).and_then(Value::as_f64)?;
                Some(Point::new(lon, lat))
            })
            .or_else(|| self.geometry.as_ref().and_then(|g| g.centroid()))
    }

    pub fn is_alternate(&self) -> bool {
        self.alt_label.is_some()
    }

    pub fn belongs_to(&self, ancestor: i64) -> bool {
        self.belongs_to.contains(&ancestor)
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_property(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Whether a record path names an alternate geometry file
/// (`<id>-alt-<label>.geojson`).
pub fn is_alternate_path(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let Some(stem) = file_name.strip_suffix(".geojson") else {
        return false;
    };
    let mut parts = stem.splitn(3, '-');
    let id = parts.next().unwrap_or_default();
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && parts.next() == Some("alt")
}
