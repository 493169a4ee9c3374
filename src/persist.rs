//! Write a finished post to disk.
//!
//! ```text
//! <dir>/
//!   001.png        one file per successful page, numbered by page
//!   002.png
//!   caption.txt    caption text, trailing newline
//!   meta.json      title, size, template, plan, diagnostics, failures
//! ```
//!
//! Every file is written atomically: content goes to a temporary file in the
//! same directory and is renamed into place, so a reader never sees a
//! partial image or half a metadata file.

use crate::error::{CardError, Diagnostic, PageError, Stage};
use crate::output::ConversionOutput;
use crate::paginate::PageSummary;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Metadata document written as `meta.json`.
#[derive(Debug, Serialize)]
struct MetaFile<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    pages: usize,
    width: u32,
    height: u32,
    template: &'a str,
    images: Vec<String>,
    plan: &'a [PageSummary],
    diagnostics: Vec<DiagnosticEntry<'a>>,
    failures: Vec<&'a PageError>,
}

#[derive(Debug, Serialize)]
struct DiagnosticEntry<'a> {
    message: String,
    #[serde(flatten)]
    detail: &'a Diagnostic,
}

/// File name of the image for `page_num`.
pub fn page_file_name(page_num: usize, extension: &str) -> String {
    format!("{page_num:03}.{extension}")
}

/// Write images, caption and metadata for `output` into `dir`, creating it
/// if needed. Returns the paths written, images first.
pub async fn write_output(output: &ConversionOutput, dir: &Path) -> Result<Vec<PathBuf>, CardError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CardError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::new();
    let mut images = Vec::new();

    // ── Images ───────────────────────────────────────────────────────────
    for artifact in output.artifacts() {
        let name = page_file_name(artifact.page_num, artifact.extension());
        let path = dir.join(&name);
        write_atomic(&path, artifact.bytes.clone()).await?;
        debug!("Wrote {} ({} bytes)", path.display(), artifact.len());
        images.push(name);
        written.push(path);
    }

    // ── Caption ──────────────────────────────────────────────────────────
    let caption_path = dir.join("caption.txt");
    write_atomic(&caption_path, format!("{}\n", output.caption).into_bytes()).await?;
    written.push(caption_path);

    // ── Metadata ─────────────────────────────────────────────────────────
    let meta = MetaFile {
        title: &output.metadata.title,
        source: output.metadata.source.as_deref(),
        pages: output.metadata.pages,
        width: output.metadata.width,
        height: output.metadata.height,
        template: &output.metadata.template,
        images,
        plan: &output.plan,
        diagnostics: output
            .diagnostics
            .iter()
            .map(|d| DiagnosticEntry {
                message: d.to_string(),
                detail: d,
            })
            .collect(),
        failures: output.failures().collect(),
    };
    let meta_path = dir.join("meta.json");
    let json = serde_json::to_vec_pretty(&meta).map_err(|e| {
        CardError::internal(Stage::Output, format!("Failed to serialise metadata: {e}"))
    })?;
    write_atomic(&meta_path, json).await?;
    written.push(meta_path);

    info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), CardError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || persist_file(&target, &bytes))
        .await
        .map_err(|e| CardError::internal(Stage::Output, format!("Write task panicked: {e}")))?
}

fn persist_file(path: &Path, bytes: &[u8]) -> Result<(), CardError> {
    let fail = |e| CardError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}
