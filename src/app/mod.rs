use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::attributes::Schema;
use crate::config::{FileConfig, FiltersConfig};
use crate::geometry::{RingPolicy, ShapeKind};
use crate::pipeline::{IngestStats, Pipeline};
use crate::source::{self, SourceMode};
use crate::utils::{ProgressCounter, per_second};
use crate::writer::{ShapefileWriter, WriterOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Index Who's On First records into an ESRI shapefile", long_about = None)]
pub struct Cli {
    /// Where to write the new shapefile (.shx, .dbf and .prj are written alongside)
    #[arg(short, long)]
    pub out: PathBuf,

    /// The shapefile type to use indexing data
    #[arg(long, value_enum, ignore_case = true)]
    pub shapetype: Option<ShapeKind>,

    /// How to read the input paths
    #[arg(long, value_enum)]
    pub mode: Option<SourceMode>,

    /// Include only records of this placetype (repeatable)
    #[arg(long = "include-placetype")]
    pub include_placetype: Vec<String>,

    /// Exclude records of this placetype (repeatable)
    #[arg(long = "exclude-placetype")]
    pub exclude_placetype: Vec<String>,

    /// Include only records that belong to this ID (repeatable)
    #[arg(long = "belongs-to")]
    pub belongs_to: Vec<i64>,

    /// Leave out the INCEPTION and CESSATION columns
    #[arg(long)]
    pub no_dates: bool,

    /// Fail polygons that carry interior rings instead of writing the holes
    #[arg(long)]
    pub reject_interior_rings: bool,

    /// Settings file (YAML)
    #[arg(short, long, env = "WOF_SHAPEFILE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Display timings during and after indexing
    #[arg(long)]
    pub timings: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Paths to index
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Everything a run needs, after merging the settings file with the flags.
#[derive(Debug)]
pub struct RunConfig {
    pub out: PathBuf,
    pub mode: SourceMode,
    pub writer: WriterOptions,
    pub filters: FiltersConfig,
    pub paths: Vec<PathBuf>,
    pub timings: bool,
}

pub fn resolve_config(cli: &Cli, file: FileConfig) -> Result<RunConfig> {
    let kind = match (cli.shapetype, file.shapetype.as_deref()) {
        (Some(kind), _) => kind,
        (None, Some(name)) => name
            .parse::<ShapeKind>()
            .map_err(anyhow::Error::msg)
            .context("Config: Invalid shapetype")?,
        (None, None) => ShapeKind::Point,
    };

    let schema = if cli.no_dates || file.dates == Some(false) {
        Schema::Basic
    } else {
        Schema::WithDates
    };

    let rings = if cli.reject_interior_rings {
        RingPolicy::Reject
    } else {
        file.rings.unwrap_or_default()
    };

    let mut filters = FiltersConfig {
        include_placetypes: file.include_placetypes.into_iter().collect(),
        exclude_placetypes: file.exclude_placetypes.into_iter().collect(),
        belongs_to: file.belongs_to,
    };
    filters
        .include_placetypes
        .extend(cli.include_placetype.iter().cloned());
    filters
        .exclude_placetypes
        .extend(cli.exclude_placetype.iter().cloned());
    for id in &cli.belongs_to {
        if !filters.belongs_to.contains(id) {
            filters.belongs_to.push(*id);
        }
    }

    Ok(RunConfig {
        out: cli.out.clone(),
        mode: cli.mode.or(file.mode).unwrap_or_default(),
        writer: WriterOptions {
            kind,
            schema,
            rings,
        },
        filters,
        paths: cli.paths.clone(),
        timings: cli.timings,
    })
}

pub fn load_config(cli: &Cli) -> Result<RunConfig> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Config: Failed to load {:?}", path))?,
        None => FileConfig::default(),
    };
    resolve_config(cli, file)
}

pub fn summarize_filters(filters: &FiltersConfig) -> String {
    if filters.is_empty() {
        return "none".to_string();
    }
    let mut include: Vec<&str> = filters.include_placetypes.iter().map(String::as_str).collect();
    let mut exclude: Vec<&str> = filters.exclude_placetypes.iter().map(String::as_str).collect();
    include.sort_unstable();
    exclude.sort_unstable();
    format!(
        "include [{}], exclude [{}], belongs to {:?}",
        include.join(", "),
        exclude.join(", "),
        filters.belongs_to
    )
}

/// Create the writer, ingest every record and close the writer.
pub fn run(config: RunConfig) -> Result<IngestStats> {
    tracing::info!(
        "Shapefile: {} from {} path(s) ({:?} mode)",
        config.writer.kind,
        config.paths.len(),
        config.mode
    );
    tracing::info!("Filters: {}", summarize_filters(&config.filters));

    // open inputs before any output file exists
    let records = source::open(config.mode, &config.paths)?;

    let writer_span = tracing::info_span!("writer", out = %config.out.display());
    let writer = ShapefileWriter::create(&config.out, config.writer, writer_span)
        .context("Writer: Failed to create shapefile")?;

    let mut pipeline = Pipeline::new(config.filters, tracing::info_span!("ingest"));
    let progress = config
        .timings
        .then(|| Arc::new(ProgressCounter::new("Records", 10_000)));
    if let Some(progress) = &progress {
        pipeline = pipeline.with_progress(Arc::clone(progress));
    }

    let start = std::time::Instant::now();
    let (mut writer, stats) = pipeline.run(records, writer)?;
    writer.close().context("Writer: Failed to close shapefile")?;

    if let Some(progress) = &progress {
        progress.finish();
    }

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!("Wrote {} records to {:?}", writer.count(), writer.path());
    tracing::info!(
        "Done! Written {} of {} records in {:.2}s ({} records/s); {} alternate, {} filtered, {} failed",
        stats.written,
        stats.seen,
        elapsed,
        per_second(stats.seen, elapsed),
        stats.skipped_alt,
        stats.filtered,
        stats.failed
    );
    if config.timings {
        eprintln!("time to index all ({}) : {:.3}s", stats.seen, elapsed);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["wof-shapefile"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn shapetype_is_case_insensitive() {
        let cli = parse(&["--out", "x.shp", "--shapetype", "polygon", "data"]);
        assert_eq!(cli.shapetype, Some(ShapeKind::Polygon));
        let cli = parse(&["--out", "x.shp", "--shapetype", "MultiPoint", "data"]);
        assert_eq!(cli.shapetype, Some(ShapeKind::MultiPoint));
    }

    #[test]
    fn rejects_unknown_shapetype() {
        assert!(
            Cli::try_parse_from(["wof-shapefile", "--out", "x", "--shapetype", "ring", "data"])
                .is_err()
        );
    }

    #[test]
    fn flags_extend_file_settings() {
        let cli = parse(&[
            "--out",
            "x.shp",
            "--include-placetype",
            "locality",
            "--belongs-to",
            "2",
            "--belongs-to",
            "1",
            "--no-dates",
            "data",
        ]);
        let file = FileConfig {
            include_placetypes: vec!["region".to_string()],
            belongs_to: vec![1],
            shapetype: Some("polyline".to_string()),
            mode: Some(SourceMode::Files),
            rings: Some(RingPolicy::Reject),
            ..FileConfig::default()
        };

        let config = resolve_config(&cli, file).unwrap();
        assert_eq!(config.writer.kind, ShapeKind::PolyLine);
        assert_eq!(config.writer.schema, Schema::Basic);
        assert_eq!(config.writer.rings, RingPolicy::Reject);
        assert_eq!(config.mode, SourceMode::Files);
        assert_eq!(config.filters.belongs_to, [1, 2]);
        assert!(config.filters.include_placetypes.contains("region"));
        assert!(config.filters.include_placetypes.contains("locality"));
    }

    #[test]
    fn defaults_without_settings() {
        let cli = parse(&["--out", "x.shp", "data"]);
        let config = resolve_config(&cli, FileConfig::default()).unwrap();
        assert_eq!(config.writer.kind, ShapeKind::Point);
        assert_eq!(config.writer.schema, Schema::WithDates);
        assert_eq!(config.writer.rings, RingPolicy::Preserve);
        assert_eq!(config.mode, SourceMode::Directory);
        assert!(config.filters.is_empty());
        assert_eq!(summarize_filters(&config.filters), "none");
    }

    #[test]
    fn missing_input_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.shp");
        let missing = dir.path().join("missing");
        let cli = parse(&["--out", out.to_str().unwrap(), missing.to_str().unwrap()]);

        let config = resolve_config(&cli, FileConfig::default()).unwrap();
        assert!(run(config).is_err());
        assert!(!out.exists());
        assert!(!dir.path().join("out.dbf").exists());
    }

    #[test]
    fn accepts_original_mode_name() {
        let cli = parse(&["--out", "x.shp", "--mode", "geojson-ls", "-"]);
        assert_eq!(cli.mode, Some(SourceMode::Geojsonl));
    }

    #[test]
    fn invalid_file_shapetype_is_an_error() {
        let file = FileConfig {
            shapetype: Some("hexagon".to_string()),
            ..FileConfig::default()
        };
        assert!(resolve_config(&parse(&["--out", "x.shp", "data"]), file).is_err());
    }
}
