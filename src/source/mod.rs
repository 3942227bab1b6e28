//! Record sources: where GeoJSON feature payloads come from.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One payload plus the path (or `file:line`) that identifies it in logs.
#[derive(Clone, Debug)]
pub struct Record {
    pub path: String,
    pub body: Vec<u8>,
}

pub type Records = Box<dyn Iterator<Item = io::Result<Record>> + Send>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Walk directories for `*.geojson` files (a repo's `data/` when present)
    #[default]
    #[value(alias = "repo")]
    #[serde(alias = "repo")]
    Directory,
    /// Each path is a GeoJSON feature file
    Files,
    /// Each path is a line-delimited feature file (`-` for stdin)
    #[value(alias = "geojson-ls")]
    #[serde(alias = "geojson-ls")]
    Geojsonl,
}

pub fn open(mode: SourceMode, paths: &[PathBuf]) -> Result<Records> {
    match mode {
        SourceMode::Directory => {
            let mut files = Vec::new();
            for root in paths {
                let root = repo_data_dir(root);
                collect_geojson(&root, &mut files)
                    .with_context(|| format!("Source: Failed to walk {:?}", root))?;
            }
            files.sort();
            tracing::info!("Source: {} GeoJSON files under {} path(s)", files.len(), paths.len());
            Ok(read_files(files))
        }
        SourceMode::Files => Ok(read_files(paths.to_vec())),
        SourceMode::Geojsonl => {
            let mut readers: Vec<(String, Box<dyn BufRead + Send>)> = Vec::new();
            for path in paths {
                if path == Path::new("-") {
                    readers.push(("stdin".to_string(), Box::new(BufReader::new(io::stdin()))));
                } else {
                    let file = File::open(path)
                        .with_context(|| format!("Source: Failed to open {:?}", path))?;
                    readers.push((path.display().to_string(), Box::new(BufReader::new(file))));
                }
            }
            Ok(Box::new(readers.into_iter().flat_map(|(label, reader)| {
                reader
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
                    .map(move |(n, line)| {
                        line.map(|line| Record {
                            path: format!("{}:{}", label, n + 1),
                            body: line.into_bytes(),
                        })
                    })
            })))
        }
    }
}

/// A WOF repository keeps its records under `data/`.
fn repo_data_dir(root: &Path) -> PathBuf {
    let data = root.join("data");
    if data.is_dir() {
        data
    } else {
        root.to_path_buf()
    }
}

fn collect_geojson(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    if dir.is_file() {
        out.push(dir.to_path_buf());
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_geojson(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "geojson") {
            out.push(path);
        }
    }
    Ok(())
}

fn read_files(files: Vec<PathBuf>) -> Records {
    Box::new(files.into_iter().map(|path| {
        std::fs::read(&path).map(|body| Record {
            path: path.display().to_string(),
            body,
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect(records: Records) -> Vec<Record> {
        records.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn walks_repo_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data/101/748/479");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("101748479.geojson"), "{}").unwrap();
        std::fs::write(nested.join("101748479-alt-quattroshapes.geojson"), "{}").unwrap();
        std::fs::write(nested.join("README.md"), "skip").unwrap();
        std::fs::write(dir.path().join("outside.geojson"), "{}").unwrap();

        let roots = [dir.path().to_path_buf()];
        let records = collect(open(SourceMode::Directory, &roots).unwrap());
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.path.contains("data")));
    }

    #[test]
    fn reads_line_delimited_features() {
        let mut file = tempfile::NamedTempFile::with_suffix(".geojsonl").unwrap();
        writeln!(file, "{{\"type\": \"Feature\"}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{\"type\": \"Feature\", \"id\": 2}}").unwrap();

        let inputs = [file.path().to_path_buf()];
        let records = collect(open(SourceMode::Geojsonl, &inputs).unwrap());
        assert_eq!(records.len(), 2);
        assert!(records[1].path.ends_with(":3"));
        assert!(String::from_utf8_lossy(&records[1].body).contains("\"id\": 2"));
    }

    #[test]
    fn accepts_mode_aliases() {
        let parse = |name| <SourceMode as ValueEnum>::from_str(name, true);
        assert_eq!(parse("repo"), Ok(SourceMode::Directory));
        assert_eq!(parse("GeoJSONL"), Ok(SourceMode::Geojsonl));
        assert_eq!(parse("geojson-ls"), Ok(SourceMode::Geojsonl));
        assert!(parse("sqlite").is_err());

        let mode: SourceMode = serde_json::from_value(serde_json::json!("geojson-ls")).unwrap();
        assert_eq!(mode, SourceMode::Geojsonl);
    }
}
