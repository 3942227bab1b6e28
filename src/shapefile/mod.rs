//! Streaming ESRI Shapefile container.
//!
//! Geometry records go to `.shp` with a matching `.shx` index entry, attribute
//! rows go to a dBASE III `.dbf` table. Headers are written with placeholder
//! lengths on creation and sealed with the final counts and extent on
//! `finish`.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use time::OffsetDateTime;

use crate::geometry::{BoundingBox, ShapeKind, ShapeRecord};

#[cfg(test)]
pub(crate) mod read;

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
/// Main file and index file header size, in bytes.
const HEADER_BYTES: i32 = 100;
/// Per-record header (record number + content length), in bytes.
const RECORD_HEADER_BYTES: i32 = 8;

const DBF_VERSION: u8 = 0x03;
const DBF_HEADER_BYTES: u16 = 32;
const DBF_FIELD_BYTES: u16 = 32;
const DBF_FIELD_TERMINATOR: u8 = 0x0D;
const DBF_RECORD_LIVE: u8 = 0x20;
const DBF_EOF: u8 = 0x1A;

/// `.shp` + `.shx` pair.
pub struct GeometryStream {
    shp: BufWriter<File>,
    shx: BufWriter<File>,
    kind: ShapeKind,
    records: u32,
    /// Current `.shp` length in 16-bit words.
    length_words: i32,
    extent: Option<BoundingBox>,
}

impl GeometryStream {
    pub fn create(shp_path: &Path, shx_path: &Path, kind: ShapeKind) -> io::Result<Self> {
        let mut stream = Self {
            shp: BufWriter::new(File::create(shp_path)?),
            shx: BufWriter::new(File::create(shx_path)?),
            kind,
            records: 0,
            length_words: HEADER_BYTES / 2,
            extent: None,
        };
        write_main_header(&mut stream.shp, kind, HEADER_BYTES / 2, None)?;
        write_main_header(&mut stream.shx, kind, HEADER_BYTES / 2, None)?;
        Ok(stream)
    }

    /// Append one record, returning its zero-based index.
    pub fn append(&mut self, record: &ShapeRecord) -> io::Result<u32> {
        if record.kind() != self.kind {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot write {} record into {} file", record.kind(), self.kind),
            ));
        }

        let content = encode_content(record)?;
        let content_words = word_count(content.len())?;
        let index = self.records;
        let record_number = i32::try_from(index + 1).map_err(too_large)?;

        self.shp.write_i32::<BigEndian>(record_number)?;
        self.shp.write_i32::<BigEndian>(content_words)?;
        self.shp.write_all(&content)?;

        self.shx.write_i32::<BigEndian>(self.length_words)?; // offset
        self.shx.write_i32::<BigEndian>(content_words)?;

        self.length_words = self
            .length_words
            .checked_add(RECORD_HEADER_BYTES / 2 + content_words)
            .ok_or_else(|| too_large("file length"))?;
        let bbox = record.bbox();
        self.extent = Some(match self.extent {
            Some(extent) => extent.union(bbox),
            None => bbox,
        });
        self.records += 1;
        Ok(index)
    }

    /// Rewrite both headers with final lengths and extent, then flush.
    pub fn finish(mut self) -> io::Result<()> {
        let shx_words = HEADER_BYTES / 2
            + i32::try_from(self.records)
                .map_err(too_large)?
                .checked_mul(RECORD_HEADER_BYTES / 2)
                .ok_or_else(|| too_large("index length"))?;

        self.shp.seek(SeekFrom::Start(0))?;
        write_main_header(&mut self.shp, self.kind, self.length_words, self.extent)?;
        self.shp.flush()?;

        self.shx.seek(SeekFrom::Start(0))?;
        write_main_header(&mut self.shx, self.kind, shx_words, self.extent)?;
        self.shx.flush()?;
        Ok(())
    }
}

fn write_main_header<W: Write>(
    writer: &mut W,
    kind: ShapeKind,
    length_words: i32,
    extent: Option<BoundingBox>,
) -> io::Result<()> {
    writer.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        writer.write_i32::<BigEndian>(0)?;
    }
    writer.write_i32::<BigEndian>(length_words)?;
    writer.write_i32::<LittleEndian>(VERSION)?;
    writer.write_i32::<LittleEndian>(kind.code())?;

    let (min_x, min_y, max_x, max_y) = extent
        .map(|b| (b.min_x, b.min_y, b.max_x, b.max_y))
        .unwrap_or_default();
    writer.write_f64::<LittleEndian>(min_x)?;
    writer.write_f64::<LittleEndian>(min_y)?;
    writer.write_f64::<LittleEndian>(max_x)?;
    writer.write_f64::<LittleEndian>(max_y)?;
    // z and m ranges are unused for 2D shapes
    for _ in 0..4 {
        writer.write_f64::<LittleEndian>(0.0)?;
    }
    Ok(())
}

fn encode_content(record: &ShapeRecord) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_i32::<LittleEndian>(record.kind().code())?;

    match record {
        ShapeRecord::Point { x, y } => {
            buf.write_f64::<LittleEndian>(*x)?;
            buf.write_f64::<LittleEndian>(*y)?;
        }
        ShapeRecord::MultiPoint { points, bbox } => {
            write_box(&mut buf, bbox)?;
            buf.write_i32::<LittleEndian>(i32::try_from(points.len()).map_err(too_large)?)?;
            for p in points {
                buf.write_f64::<LittleEndian>(p.x)?;
                buf.write_f64::<LittleEndian>(p.y)?;
            }
        }
        ShapeRecord::PolyLine { .. } | ShapeRecord::Polygon { .. } => {
            let parts = record.parts();
            let num_points: usize = parts.iter().map(|p| p.len()).sum();

            write_box(&mut buf, &record.bbox())?;
            buf.write_i32::<LittleEndian>(i32::try_from(parts.len()).map_err(too_large)?)?;
            buf.write_i32::<LittleEndian>(i32::try_from(num_points).map_err(too_large)?)?;

            let mut start = 0usize;
            for part in &parts {
                buf.write_i32::<LittleEndian>(i32::try_from(start).map_err(too_large)?)?;
                start += part.len();
            }
            for p in parts.iter().flat_map(|part| part.iter()) {
                buf.write_f64::<LittleEndian>(p.x)?;
                buf.write_f64::<LittleEndian>(p.y)?;
            }
        }
    }

    Ok(buf)
}

fn write_box<W: Write>(writer: &mut W, bbox: &BoundingBox) -> io::Result<()> {
    writer.write_f64::<LittleEndian>(bbox.min_x)?;
    writer.write_f64::<LittleEndian>(bbox.min_y)?;
    writer.write_f64::<LittleEndian>(bbox.max_x)?;
    writer.write_f64::<LittleEndian>(bbox.max_y)?;
    Ok(())
}

fn word_count(bytes: usize) -> io::Result<i32> {
    i32::try_from(bytes / 2).map_err(too_large)
}

fn too_large<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::other(format!("shapefile size limit exceeded: {err}"))
}

/// A fixed-width character column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharField {
    pub name: &'static str,
    pub width: u8,
}

/// dBASE III attribute table holding character columns only.
pub struct AttributeStream {
    dbf: BufWriter<File>,
    fields: Vec<CharField>,
    records: u32,
}

impl AttributeStream {
    pub fn create(path: &Path, fields: &[CharField]) -> io::Result<Self> {
        let mut dbf = BufWriter::new(File::create(path)?);
        let field_count = u16::try_from(fields.len()).map_err(too_large)?;
        let header_len = DBF_HEADER_BYTES + field_count * DBF_FIELD_BYTES + 1;
        // deletion flag + every column
        let record_len = 1 + fields.iter().map(|f| u16::from(f.width)).sum::<u16>();

        let today = OffsetDateTime::now_utc();
        dbf.write_u8(DBF_VERSION)?;
        dbf.write_u8(u8::try_from(today.year() - 1900).unwrap_or(u8::MAX))?;
        dbf.write_u8(today.month() as u8)?;
        dbf.write_u8(today.day())?;
        dbf.write_u32::<LittleEndian>(0)?; // sealed in finish
        dbf.write_u16::<LittleEndian>(header_len)?;
        dbf.write_u16::<LittleEndian>(record_len)?;
        dbf.write_all(&[0u8; 20])?;

        for field in fields {
            let mut name = [0u8; 11];
            let bytes = field.name.as_bytes();
            let n = bytes.len().min(10);
            name[..n].copy_from_slice(&bytes[..n]);
            dbf.write_all(&name)?;
            dbf.write_u8(b'C')?;
            dbf.write_all(&[0u8; 4])?;
            dbf.write_u8(field.width)?;
            dbf.write_u8(0)?; // decimal count
            dbf.write_all(&[0u8; 14])?;
        }
        dbf.write_u8(DBF_FIELD_TERMINATOR)?;

        Ok(Self {
            dbf,
            fields: fields.to_vec(),
            records: 0,
        })
    }

    /// Append one row, returning its zero-based index. Values longer than
    /// their column are truncated on a character boundary.
    pub fn append(&mut self, values: &[&str]) -> io::Result<u32> {
        if values.len() != self.fields.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected {} attribute values, got {}",
                    self.fields.len(),
                    values.len()
                ),
            ));
        }

        let row_len = 1 + self.fields.iter().map(|f| usize::from(f.width)).sum::<usize>();
        let mut row = Vec::with_capacity(row_len);
        row.push(DBF_RECORD_LIVE);
        for (field, value) in self.fields.iter().zip(values) {
            let width = usize::from(field.width);
            let value = truncate_to_boundary(value, width);
            row.extend_from_slice(value.as_bytes());
            row.resize(row.len() + (width - value.len()), b' ');
        }
        self.dbf.write_all(&row)?;

        let index = self.records;
        self.records += 1;
        Ok(index)
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.dbf.write_u8(DBF_EOF)?;
        self.dbf.seek(SeekFrom::Start(4))?;
        self.dbf.write_u32::<LittleEndian>(self.records)?;
        self.dbf.flush()?;
        Ok(())
    }
}

fn truncate_to_boundary(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
