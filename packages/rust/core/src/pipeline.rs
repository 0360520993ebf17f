//! End-to-end `export` pipeline: root module → traversal → assembly → bytes.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use modexport_shared::{
    Container, ContainerAccessor, ExportDocument, ModExportError, Result, TraversalConfig,
};
use modexport_traverser::{ContainerTraverser, TraversalObserver, TraversalReport};

use crate::assembler::{DocumentAssembler, serialize_document};

/// Configuration for the `export_module` pipeline.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Path of the root module.
    pub root_module: String,
    /// Depth bound, scope patterns and attribute filters.
    pub traversal: TraversalConfig,
    /// Pretty-print the output.
    pub pretty: bool,
    /// Fixed export timestamp (defaults to now).
    pub generated_at: Option<DateTime<Utc>>,
}

/// Result of the `export_module` pipeline.
#[derive(Debug)]
pub struct ExportOutcome {
    /// The assembled document.
    pub document: ExportDocument,
    /// Serialized document, ready to be written verbatim.
    pub bytes: Vec<u8>,
    /// SHA-256 of `bytes`, hex encoded.
    pub sha256: String,
    /// Objects across all modules.
    pub object_count: usize,
    /// Links across all modules.
    pub link_count: usize,
    /// What the traversal skipped or left out.
    pub report: TraversalReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a module has been exported.
    fn module_exported(&self, path: &str, current: usize, queued: usize);
    /// Called when a module had to be skipped.
    fn module_skipped(&self, path: &str, reason: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &ExportOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn module_exported(&self, _path: &str, _current: usize, _queued: usize) {}
    fn module_skipped(&self, _path: &str, _reason: &str) {}
    fn done(&self, _outcome: &ExportOutcome) {}
}

/// Forwards traversal events to a [`ProgressReporter`].
struct ProgressBridge<'p> {
    progress: &'p dyn ProgressReporter,
    exported: std::cell::Cell<usize>,
    queued: std::cell::Cell<usize>,
}

impl TraversalObserver for ProgressBridge<'_> {
    fn container_started(&self, _path: &str, _depth: u32, remaining: usize) {
        self.queued.set(remaining);
    }

    fn container_finished(&self, container: &Container) {
        self.exported.set(self.exported.get() + 1);
        self.progress
            .module_exported(&container.path, self.exported.get(), self.queued.get());
    }

    fn container_skipped(&self, path: &str, error: &ModExportError) {
        self.progress.module_skipped(path, &error.to_string());
    }
}

/// Run the full `export` pipeline.
///
/// 1. Traverse from the root module within the depth bound
/// 2. Assemble finished modules into the export document
/// 3. Serialize and fingerprint the document
///
/// Fails if the root module itself cannot be exported, if the accessor
/// reports an error that is not recoverable (see
/// [`ModExportError::is_recoverable`]), or if the assembled document cannot
/// be serialized. Every other problem is reported in
/// [`ExportOutcome::report`].
#[instrument(skip_all, fields(root = %config.root_module, max_depth = config.traversal.max_depth))]
pub fn export_module<A: ContainerAccessor>(
    config: &ExportConfig,
    accessor: &mut A,
    progress: &dyn ProgressReporter,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<ExportOutcome> {
    let start = Instant::now();
    let generated_at = config.generated_at.unwrap_or_else(Utc::now);
    let max_depth = config.traversal.max_depth;

    info!("starting export pipeline");

    // --- Phase 1: Traverse ---
    progress.phase("Traversing modules");
    let mut assembler = DocumentAssembler::new(&config.root_module, max_depth, generated_at);
    let bridge = ProgressBridge {
        progress,
        exported: std::cell::Cell::new(0),
        queued: std::cell::Cell::new(0),
    };

    let mut traverser = ContainerTraverser::new(accessor, &config.traversal);
    if let Some(flag) = cancel {
        traverser = traverser.with_cancel_flag(flag);
    }
    let mut report = traverser.run(&config.root_module, max_depth, &mut assembler, &bridge);

    if let Some(pos) = report.skipped.iter().position(|e| !e.is_recoverable()) {
        return Err(report.skipped.remove(pos));
    }

    if assembler.containers().is_empty() {
        let cause = if report.cancelled {
            ModExportError::Cancelled {
                message: format!("stopped before root module {} was read", config.root_module),
            }
        } else if report.skipped.is_empty() {
            ModExportError::validation(format!(
                "root module {} was not exported",
                config.root_module
            ))
        } else {
            report.skipped.remove(0)
        };
        return Err(cause);
    }

    // --- Phase 2: Assemble ---
    progress.phase("Assembling document");
    let document = assembler.finish()?;
    let (object_count, link_count) = document
        .containers
        .iter()
        .fold((0, 0), |(o, l), c| (o + c.item_count(), l + c.link_count()));

    // --- Phase 3: Serialize ---
    progress.phase("Serializing");
    let bytes = serialize_document(&document, config.pretty)?;
    let sha256 = compute_hash(&bytes);

    for skipped in &report.skipped {
        warn!(error = %skipped, "module missing from export");
    }

    let outcome = ExportOutcome {
        document,
        bytes,
        sha256,
        object_count,
        link_count,
        report,
        elapsed: start.elapsed(),
    };

    info!(
        modules = outcome.document.containers.len(),
        objects = outcome.object_count,
        links = outcome.link_count,
        bytes = outcome.bytes.len(),
        elapsed_ms = outcome.elapsed.as_millis(),
        "export pipeline complete"
    );

    progress.done(&outcome);
    Ok(outcome)
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
