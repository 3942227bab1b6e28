//! Translation of feature geometries into shapefile shape records.

use clap::ValueEnum;
use geo::Winding;
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::feature::Feature;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("unsupported shape type: cannot build {kind} from {geometry}")]
    UnsupportedShapeType { kind: ShapeKind, geometry: &'static str },
    #[error("feature has no geometry to derive a {0} from")]
    MissingGeometry(ShapeKind),
    #[error("feature geometry has no coordinates")]
    MissingCoordinates,
    #[error("polygon has {0} interior ring(s) and interior rings are rejected")]
    InteriorRingsUnsupported(usize),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ShapeKind {
    #[default]
    #[value(name = "POINT")]
    Point,
    #[value(name = "MULTIPOINT")]
    MultiPoint,
    #[value(name = "POLYLINE")]
    PolyLine,
    #[value(name = "POLYGON")]
    Polygon,
}

impl ShapeKind {
    /// ESRI shape type code written in file headers and record contents.
    pub fn code(self) -> i32 {
        match self {
            ShapeKind::Point => 1,
            ShapeKind::PolyLine => 3,
            ShapeKind::Polygon => 5,
            ShapeKind::MultiPoint => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShapeKind::Point => "POINT",
            ShapeKind::MultiPoint => "MULTIPOINT",
            ShapeKind::PolyLine => "POLYLINE",
            ShapeKind::Polygon => "POLYGON",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "POINT" => Ok(ShapeKind::Point),
            "MULTIPOINT" => Ok(ShapeKind::MultiPoint),
            "POLYLINE" => Ok(ShapeKind::PolyLine),
            "POLYGON" => Ok(ShapeKind::Polygon),
            _ => Err(format!("unsupported shape type: {value}")),
        }
    }
}

/// What to do with polygon holes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingPolicy {
    /// Keep interior rings after their exterior ring.
    #[default]
    Preserve,
    /// Fail any polygon that carries interior rings.
    Reject,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_coords<'a, I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coord<f64>>,
    {
        let mut coords = coords.into_iter();
        let first = coords.next()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for c in coords {
            bbox.min_x = bbox.min_x.min(c.x);
            bbox.min_y = bbox.min_y.min(c.y);
            bbox.max_x = bbox.max_x.max(c.x);
            bbox.max_y = bbox.max_y.max(c.y);
        }
        Some(bbox)
    }

    pub fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingRole {
    Exterior,
    Interior,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ring {
    pub role: RingRole,
    pub coords: Vec<Coord<f64>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShapeRecord {
    Point { x: f64, y: f64 },
    MultiPoint { points: Vec<Coord<f64>>, bbox: BoundingBox },
    PolyLine { parts: Vec<Vec<Coord<f64>>> },
    Polygon { rings: Vec<Ring> },
}

impl ShapeRecord {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeRecord::Point { .. } => ShapeKind::Point,
            ShapeRecord::MultiPoint { .. } => ShapeKind::MultiPoint,
            ShapeRecord::PolyLine { .. } => ShapeKind::PolyLine,
            ShapeRecord::Polygon { .. } => ShapeKind::Polygon,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        let bbox = match self {
            ShapeRecord::Point { x, y } => BoundingBox::from_coords([&Coord { x: *x, y: *y }]),
            ShapeRecord::MultiPoint { bbox, .. } => Some(*bbox),
            ShapeRecord::PolyLine { parts } => BoundingBox::from_coords(parts.iter().flatten()),
            ShapeRecord::Polygon { rings } => {
                BoundingBox::from_coords(rings.iter().flat_map(|r| r.coords.iter()))
            }
        };
        // translation never produces empty records
        bbox.unwrap_or(BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        })
    }

    /// Parts of a multi-part record in write order.
    pub fn parts(&self) -> Vec<&[Coord<f64>]> {
        match self {
            ShapeRecord::Point { .. } | ShapeRecord::MultiPoint { .. } => Vec::new(),
            ShapeRecord::PolyLine { parts } => parts.iter().map(Vec::as_slice).collect(),
            ShapeRecord::Polygon { rings } => rings.iter().map(|r| r.coords.as_slice()).collect(),
        }
    }
}

pub fn translate(
    feature: &Feature,
    kind: ShapeKind,
    rings: RingPolicy,
) -> Result<ShapeRecord, TranslateError> {
    match kind {
        ShapeKind::Point => to_point(feature),
        ShapeKind::MultiPoint => to_multipoint(feature),
        ShapeKind::PolyLine => to_polyline(feature),
        ShapeKind::Polygon => to_polygon(feature, rings),
    }
}

fn to_point(feature: &Feature) -> Result<ShapeRecord, TranslateError> {
    let centroid = feature
        .centroid()
        .ok_or(TranslateError::MissingGeometry(ShapeKind::Point))?;
    Ok(ShapeRecord::Point {
        x: centroid.x(),
        y: centroid.y(),
    })
}

fn to_multipoint(feature: &Feature) -> Result<ShapeRecord, TranslateError> {
    let points: Vec<Coord<f64>> = match required_geometry(feature, ShapeKind::MultiPoint)? {
        Geometry::Point(point) => vec![point.0],
        Geometry::MultiPoint(multi) => multi.0.iter().map(|p| p.0).collect(),
        Geometry::LineString(line) => line.0.clone(),
        other => return Err(unsupported(ShapeKind::MultiPoint, other)),
    };

    let bbox = BoundingBox::from_coords(&points).ok_or(TranslateError::MissingCoordinates)?;
    Ok(ShapeRecord::MultiPoint { points, bbox })
}

fn to_polyline(feature: &Feature) -> Result<ShapeRecord, TranslateError> {
    let parts: Vec<Vec<Coord<f64>>> = match required_geometry(feature, ShapeKind::PolyLine)? {
        Geometry::LineString(line) => vec![line.0.clone()],
        Geometry::MultiLineString(lines) => lines.0.iter().map(|l| l.0.clone()).collect(),
        other => return Err(unsupported(ShapeKind::PolyLine, other)),
    };

    let parts: Vec<_> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(TranslateError::MissingCoordinates);
    }
    Ok(ShapeRecord::PolyLine { parts })
}

fn to_polygon(feature: &Feature, policy: RingPolicy) -> Result<ShapeRecord, TranslateError> {
    let polygons: Vec<&Polygon<f64>> = match required_geometry(feature, ShapeKind::Polygon)? {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0.iter().collect(),
        other => return Err(unsupported(ShapeKind::Polygon, other)),
    };

    let mut rings = Vec::new();
    for polygon in polygons {
        if polygon.exterior().0.is_empty() {
            continue;
        }

        let interiors = polygon.interiors();
        if !interiors.is_empty() && policy == RingPolicy::Reject {
            return Err(TranslateError::InteriorRingsUnsupported(interiors.len()));
        }

        let mut exterior = polygon.exterior().clone();
        let mut holes: Vec<LineString<f64>> = interiors
            .iter()
            .filter(|ring| !ring.0.is_empty())
            .cloned()
            .collect();
        // Readers tell holes from outer rings by winding: outer clockwise,
        // holes counterclockwise. Hole-free rings keep their vertex order.
        if !holes.is_empty() {
            exterior.make_cw_winding();
            for hole in &mut holes {
                hole.make_ccw_winding();
            }
        }

        rings.push(Ring {
            role: RingRole::Exterior,
            coords: exterior.0,
        });
        rings.extend(holes.into_iter().map(|hole| Ring {
            role: RingRole::Interior,
            coords: hole.0,
        }));
    }

    if rings.is_empty() {
        return Err(TranslateError::MissingCoordinates);
    }
    Ok(ShapeRecord::Polygon { rings })
}

fn required_geometry(feature: &Feature, kind: ShapeKind) -> Result<&Geometry<f64>, TranslateError> {
    feature
        .geometry
        .as_ref()
        .ok_or(TranslateError::MissingGeometry(kind))
}

fn unsupported(kind: ShapeKind, geometry: &Geometry<f64>) -> TranslateError {
    TranslateError::UnsupportedShapeType {
        kind,
        geometry: geometry_name(geometry),
    }
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
