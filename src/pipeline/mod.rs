//! Ingestion: parse and filter records in parallel, append them through a
//! single writer worker.

use anyhow::{Result, anyhow, bail};
use crossbeam_channel::bounded;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Span;

use crate::config::FiltersConfig;
use crate::feature::{Feature, is_alternate_path};
use crate::source::{Record, Records};
use crate::utils::ProgressCounter;
use crate::writer::ShapefileWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Alternate,
    Filtered,
}

/// Decide whether a parsed record should be written.
pub fn verdict(path: &str, feature: &Feature, filters: &FiltersConfig) -> Verdict {
    if is_alternate_path(path) || feature.is_alternate() {
        return Verdict::Alternate;
    }

    let placetype = feature.placetype.as_deref().unwrap_or_default();
    if !filters.include_placetypes.is_empty() && !filters.include_placetypes.contains(placetype) {
        return Verdict::Filtered;
    }
    if filters.exclude_placetypes.contains(placetype) {
        return Verdict::Filtered;
    }
    if !filters.belongs_to.is_empty()
        && !filters.belongs_to.iter().any(|&id| feature.belongs_to(id))
    {
        return Verdict::Filtered;
    }

    Verdict::Accept
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub seen: u64,
    pub skipped_alt: u64,
    pub filtered: u64,
    pub written: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    seen: AtomicU64,
    skipped_alt: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

struct Submission {
    path: String,
    feature: Feature,
}

pub struct Pipeline {
    pub filters: Arc<FiltersConfig>,
    pub progress: Option<Arc<ProgressCounter>>,
    pub span: Span,
}

impl Pipeline {
    pub fn new(filters: FiltersConfig, span: Span) -> Self {
        Self {
            filters: Arc::new(filters),
            progress: None,
            span,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressCounter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Drain `records` into `writer`. The writer comes back still open; the
    /// caller closes it.
    pub fn run(
        &self,
        records: Records,
        writer: ShapefileWriter,
    ) -> Result<(ShapefileWriter, IngestStats)> {
        if writer.is_closed() {
            bail!("Pipeline: Writer {:?} is already closed", writer.path());
        }

        let (tx, rx) = bounded::<Submission>(256);
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker_span = self.span.clone();
        let worker = std::thread::spawn(move || -> Result<(ShapefileWriter, u64)> {
            let _guard = worker_span.enter();
            let mut writer = writer;
            let mut written = 0u64;
            for Submission { path, feature } in rx {
                match writer.append(&feature) {
                    Ok(_) => written += 1,
                    Err(err) if err.is_fatal() => {
                        return Err(anyhow::Error::new(err)
                            .context(format!("Pipeline: Failed to append {}", path)));
                    }
                    Err(err) => {
                        worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Pipeline: Skipping {}: {}", path, err);
                    }
                }
            }
            Ok((writer, written))
        });

        let produce_result = records.par_bridge().try_for_each(|record| -> Result<()> {
            let _guard = self.span.enter();
            counters.seen.fetch_add(1, Ordering::Relaxed);
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }

            let Some(submission) = self.prepare(record, &counters) else {
                return Ok(());
            };
            tx.send(submission)
                .map_err(|err| anyhow!("Pipeline: Failed to send feature: {}", err))?;
            Ok(())
        });

        drop(tx);

        // The worker holds the root cause if the channel disconnected
        let (writer, written) = match worker.join() {
            Ok(Ok(result)) => result,
            Ok(Err(worker_err)) => {
                return if produce_result.is_err() {
                    Err(worker_err
                        .context("Pipeline: Writer worker failed (caused channel disconnect)"))
                } else {
                    Err(worker_err)
                };
            }
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return Err(anyhow!("Pipeline: Writer worker panicked: {}", panic_msg));
            }
        };

        produce_result?;

        let stats = IngestStats {
            seen: counters.seen.load(Ordering::Relaxed),
            skipped_alt: counters.skipped_alt.load(Ordering::Relaxed),
            filtered: counters.filtered.load(Ordering::Relaxed),
            written,
            failed: counters.failed.load(Ordering::Relaxed),
        };
        Ok((writer, stats))
    }

    /// Parse and filter one record. Per-record problems are logged and
    /// counted, never propagated.
    fn prepare(&self, record: std::io::Result<Record>, counters: &Counters) -> Option<Submission> {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Pipeline: Failed to read record: {}", err);
                return None;
            }
        };

        if is_alternate_path(&record.path) {
            counters.skipped_alt.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let feature = match Feature::from_slice(&record.body) {
            Ok(feature) => feature,
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Pipeline: Unable to load {}: {}", record.path, err);
                return None;
            }
        };

        match verdict(&record.path, &feature, &self.filters) {
            Verdict::Accept => Some(Submission {
                path: record.path,
                feature,
            }),
            Verdict::Alternate => {
                counters.skipped_alt.fetch_add(1, Ordering::Relaxed);
                None
            }
            Verdict::Filtered => {
                counters.filtered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Pipeline: Filtered {}", record.path);
                None
            }
        }
    }
}
