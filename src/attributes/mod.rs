//! Attribute rows and the fixed attribute schema.

use thiserror::Error;

use crate::feature::Feature;
use crate::shapefile::CharField;

/// Width of every attribute column.
pub const FIELD_WIDTH: u8 = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("missing required property {0}")]
    MissingRequiredProperty(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeRow {
    pub id: String,
    pub name: String,
    pub placetype: String,
    pub inception: String,
    pub cessation: String,
}

pub fn extract(feature: &Feature) -> Result<AttributeRow, AttributeError> {
    let id = feature
        .id
        .ok_or(AttributeError::MissingRequiredProperty("wof:id"))?;
    let name = feature
        .name
        .clone()
        .ok_or(AttributeError::MissingRequiredProperty("wof:name"))?;
    let placetype = feature
        .placetype
        .clone()
        .ok_or(AttributeError::MissingRequiredProperty("wof:placetype"))?;

    Ok(AttributeRow {
        id: id.to_string(),
        name,
        placetype,
        inception: feature.inception.clone().unwrap_or_default(),
        cessation: feature.cessation.clone().unwrap_or_default(),
    })
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Schema {
    /// ID, NAME, PLACETYPE
    Basic,
    /// ID, NAME, PLACETYPE, INCEPTION, CESSATION
    #[default]
    WithDates,
}

const fn column(name: &'static str) -> CharField {
    CharField {
        name,
        width: FIELD_WIDTH,
    }
}

const BASIC_FIELDS: [CharField; 3] = [
    column("ID"),
    column("NAME"),
    column("PLACETYPE"),
];

const DATED_FIELDS: [CharField; 5] = [
    column("ID"),
    column("NAME"),
    column("PLACETYPE"),
    column("INCEPTION"),
    column("CESSATION"),
];

impl Schema {
    pub fn fields(self) -> &'static [CharField] {
        match self {
            Schema::Basic => &BASIC_FIELDS,
            Schema::WithDates => &DATED_FIELDS,
        }
    }

    /// Row values in column order.
    pub fn values(self, row: &AttributeRow) -> Vec<&str> {
        let mut values = vec![row.id.as_str(), row.name.as_str(), row.placetype.as_str()];
        if self == Schema::WithDates {
            values.push(row.inception.as_str());
            values.push(row.cessation.as_str());
        }
        values
    }
}
