//! Shapefile writer: pairs every geometry record with its attribute row.
//!
//! The writer is not internally synchronized. Callers hand it to a single
//! owner (see `pipeline`) which serializes `append` and calls `close` once
//! every producer is done.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Span;

use crate::attributes::{AttributeError, Schema, extract};
use crate::feature::Feature;
use crate::geometry::{RingPolicy, ShapeKind, TranslateError, translate};
use crate::shapefile::{AttributeStream, GeometryStream};

pub const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.017453292519943295]]"#;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("shapefile writer is closed")]
    Closed,
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WriterError {
    /// Whether later appends can still succeed after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WriterError::Closed | WriterError::Io { .. })
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WriterOptions {
    pub kind: ShapeKind,
    pub schema: Schema,
    pub rings: RingPolicy,
}

enum State {
    Open {
        geometry: GeometryStream,
        attributes: AttributeStream,
    },
    Closed,
}

pub struct ShapefileWriter {
    state: State,
    options: WriterOptions,
    path: PathBuf,
    count: u32,
    span: Span,
}

impl ShapefileWriter {
    /// Create `<base>.shp`, `<base>.shx` and `<base>.dbf`. Whatever
    /// extension `path` carries is replaced with `.shp`.
    pub fn create(path: &Path, options: WriterOptions, span: Span) -> Result<Self, WriterError> {
        let path = std::path::absolute(path)
            .map_err(|source| io_error(path, source))?
            .with_extension("shp");
        let shx = path.with_extension("shx");
        let dbf = path.with_extension("dbf");

        let geometry = GeometryStream::create(&path, &shx, options.kind)
            .map_err(|source| io_error(&path, source))?;
        let attributes = AttributeStream::create(&dbf, options.schema.fields())
            .map_err(|source| io_error(&dbf, source))?;

        span.in_scope(|| {
            tracing::info!(
                "Writer: {} -> {:?} ({} columns, interior rings: {:?})",
                options.kind,
                path,
                options.schema.fields().len(),
                options.rings
            )
        });

        Ok(Self {
            state: State::Open {
                geometry,
                attributes,
            },
            options,
            path,
            count: 0,
            span,
        })
    }

    /// Translate and write one feature, returning its record index.
    ///
    /// Extraction and translation happen before anything touches disk, so a
    /// rejected feature consumes no index.
    pub fn append(&mut self, feature: &Feature) -> Result<u32, WriterError> {
        let State::Open {
            geometry,
            attributes,
        } = &mut self.state
        else {
            return Err(WriterError::Closed);
        };

        let row = extract(feature)?;
        let shape = translate(feature, self.options.kind, self.options.rings)?;

        let index = geometry
            .append(&shape)
            .map_err(|source| io_error(&self.path, source))?;
        let row_index = attributes
            .append(&self.options.schema.values(&row))
            .map_err(|source| io_error(&self.path.with_extension("dbf"), source))?;

        if index != row_index {
            return Err(io_error(
                &self.path,
                io::Error::other(format!(
                    "geometry index {index} and attribute index {row_index} diverged"
                )),
            ));
        }

        self.count += 1;
        let _guard = self.span.enter();
        tracing::trace!("Writer: record {} -> {} ({})", row.id, index, row.placetype);
        Ok(index)
    }

    /// Seal the geometry, index and attribute files, then write the
    /// projection sidecar. Terminal: a second call fails with
    /// [`WriterError::Closed`] and leaves the files alone.
    pub fn close(&mut self) -> Result<(), WriterError> {
        let State::Open {
            geometry,
            attributes,
        } = std::mem::replace(&mut self.state, State::Closed)
        else {
            return Err(WriterError::Closed);
        };

        geometry
            .finish()
            .map_err(|source| io_error(&self.path, source))?;
        let dbf = self.path.with_extension("dbf");
        attributes
            .finish()
            .map_err(|source| io_error(&dbf, source))?;

        let prj = self.path.with_extension("prj");
        std::fs::write(&prj, WGS84_WKT).map_err(|source| io_error(&prj, source))?;

        let _guard = self.span.enter();
        tracing::info!("Writer: closed {:?} with {} records", self.path, self.count);
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }
}

fn io_error(path: &Path, source: io::Error) -> WriterError {
    WriterError::Io {
        path: path.to_path_buf(),
        source,
    }
}
