//! Minimal readers used to check written files in tests.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use geo_types::Coord;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub struct Header {
    pub file_code: i32,
    pub length_words: i32,
    pub shape_type: i32,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

pub struct Shape {
    pub shape_type: i32,
    /// Single-point shapes and multipoints are returned as one part.
    pub parts: Vec<Vec<Coord<f64>>>,
    pub bbox: Option<(f64, f64, f64, f64)>,
}

pub struct Table {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn read_header(path: &Path) -> io::Result<Header> {
    let mut reader = BufReader::new(File::open(path)?);
    parse_header(&mut reader)
}

fn parse_header<R: Read>(reader: &mut R) -> io::Result<Header> {
    let file_code = reader.read_i32::<BigEndian>()?;
    for _ in 0..5 {
        reader.read_i32::<BigEndian>()?;
    }
    let length_words = reader.read_i32::<BigEndian>()?;
    let _version = reader.read_i32::<LittleEndian>()?;
    let shape_type = reader.read_i32::<LittleEndian>()?;
    let min_x = reader.read_f64::<LittleEndian>()?;
    let min_y = reader.read_f64::<LittleEndian>()?;
    let max_x = reader.read_f64::<LittleEndian>()?;
    let max_y = reader.read_f64::<LittleEndian>()?;
    for _ in 0..4 {
        reader.read_f64::<LittleEndian>()?;
    }
    Ok(Header {
        file_code,
        length_words,
        shape_type,
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

/// `(offset, content length)` pairs, both in 16-bit words.
pub fn read_index(path: &Path) -> io::Result<Vec<(i32, i32)>> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = parse_header(&mut reader)?;
    let count = (header.length_words - 50) / 4;
    (0..count)
        .map(|_| {
            let offset = reader.read_i32::<BigEndian>()?;
            let length = reader.read_i32::<BigEndian>()?;
            Ok((offset, length))
        })
        .collect()
}

pub fn read_shapes(path: &Path) -> io::Result<Vec<Shape>> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = parse_header(&mut reader)?;
    let end = u64::try_from(header.length_words).unwrap_or(0) * 2;

    let mut shapes = Vec::new();
    while reader.stream_position()? < end {
        let _record_number = reader.read_i32::<BigEndian>()?;
        let _content_words = reader.read_i32::<BigEndian>()?;
        let shape_type = reader.read_i32::<LittleEndian>()?;
        let shape = match shape_type {
            1 => {
                let x = reader.read_f64::<LittleEndian>()?;
                let y = reader.read_f64::<LittleEndian>()?;
                Shape {
                    shape_type,
                    parts: vec![vec![Coord { x, y }]],
                    bbox: None,
                }
            }
            8 => {
                let bbox = read_box(&mut reader)?;
                let num_points = reader.read_i32::<LittleEndian>()? as usize;
                let points = read_points(&mut reader, num_points)?;
                Shape {
                    shape_type,
                    parts: vec![points],
                    bbox: Some(bbox),
                }
            }
            3 | 5 => {
                let bbox = read_box(&mut reader)?;
                let num_parts = reader.read_i32::<LittleEndian>()? as usize;
                let num_points = reader.read_i32::<LittleEndian>()? as usize;
                let mut starts = Vec::with_capacity(num_parts);
                for _ in 0..num_parts {
                    starts.push(reader.read_i32::<LittleEndian>()? as usize);
                }
                let points = read_points(&mut reader, num_points)?;
                let parts = starts
                    .iter()
                    .enumerate()
                    .map(|(i, &start)| {
                        let stop = starts.get(i + 1).copied().unwrap_or(num_points);
                        points[start..stop].to_vec()
                    })
                    .collect();
                Shape {
                    shape_type,
                    parts,
                    bbox: Some(bbox),
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected shape type {other}"),
                ));
            }
        };
        shapes.push(shape);
    }
    Ok(shapes)
}

fn read_box<R: Read>(reader: &mut R) -> io::Result<(f64, f64, f64, f64)> {
    Ok((
        reader.read_f64::<LittleEndian>()?,
        reader.read_f64::<LittleEndian>()?,
        reader.read_f64::<LittleEndian>()?,
        reader.read_f64::<LittleEndian>()?,
    ))
}

fn read_points<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<Coord<f64>>> {
    (0..count)
        .map(|_| {
            let x = reader.read_f64::<LittleEndian>()?;
            let y = reader.read_f64::<LittleEndian>()?;
            Ok(Coord { x, y })
        })
        .collect()
}

pub fn read_table(path: &Path) -> io::Result<Table> {
    let mut reader = BufReader::new(File::open(path)?);
    let _version = reader.read_u8()?;
    let mut date = [0u8; 3];
    reader.read_exact(&mut date)?;
    let num_records = reader.read_u32::<LittleEndian>()?;
    let header_len = reader.read_u16::<LittleEndian>()?;
    let _record_len = reader.read_u16::<LittleEndian>()?;

    let field_count = (usize::from(header_len) - 33) / 32;
    let mut fields = Vec::with_capacity(field_count);
    let mut widths = Vec::with_capacity(field_count);
    for i in 0..field_count {
        reader.seek(SeekFrom::Start(32 + 32 * i as u64))?;
        let mut name = [0u8; 11];
        reader.read_exact(&mut name)?;
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        fields.push(String::from_utf8_lossy(&name[..end]).into_owned());
        reader.seek(SeekFrom::Current(5))?;
        widths.push(usize::from(reader.read_u8()?));
    }

    reader.seek(SeekFrom::Start(u64::from(header_len)))?;
    let mut rows = Vec::with_capacity(num_records as usize);
    for _ in 0..num_records {
        let _deleted = reader.read_u8()?;
        let mut row = Vec::with_capacity(widths.len());
        for &width in &widths {
            let mut value = vec![0u8; width];
            reader.read_exact(&mut value)?;
            row.push(String::from_utf8_lossy(&value).trim_end().to_string());
        }
        rows.push(row);
    }

    Ok(Table { fields, rows })
}
