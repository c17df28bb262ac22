//! Zip packaging of rendered records

use crate::{BatchReport, RecordOutcome, Result, REPORT_ENTRY_NAME};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One output file of a rendered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Data row the file came from
    pub row: usize,
    /// Record key, used as the file name stem
    pub stem: String,
    /// Appended to the sanitized stem (`.jpg`, `_filled.pdf`, `_page1.jpg`)
    pub suffix: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(row: usize, stem: impl Into<String>, suffix: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            row,
            stem: stem.into(),
            suffix: suffix.into(),
            bytes,
        }
    }

    /// Entry name before de-duplication
    pub fn file_name(&self) -> String {
        format!("{}{}", sanitize_entry_name(&self.stem, self.row), self.suffix)
    }
}

/// Make a record key safe to use as a flat archive entry name
///
/// Path separators, characters rejected by common file systems and control
/// characters become `_`. Leading dots are dropped so no entry is hidden or
/// climbs out of the extraction directory. A key with nothing left becomes
/// `record_<row>`.
pub fn sanitize_entry_name(key: &str, row: usize) -> String {
    let replaced: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let name = replaced.trim().trim_start_matches('.').trim_start();
    if name.is_empty() {
        format!("record_{row}")
    } else {
        name.to_string()
    }
}

/// Insert `_<n>` before the extension of `name`
fn numbered(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{n}{}", &name[..dot], &name[dot..]),
        _ => format!("{name}_{n}"),
    }
}

/// Streaming zip writer with unique entry names
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
    options: SimpleFileOptions,
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("entries", &self.names.len())
            .finish_non_exhaustive()
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        let mut names = HashSet::new();
        names.insert(REPORT_ENTRY_NAME.to_string());
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            names,
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    /// Reserve a unique entry name
    ///
    /// Names are compared case-insensitively; a clash gets `_2`, `_3`, ...
    /// before the extension.
    fn claim(&mut self, name: String) -> String {
        if self.names.insert(name.to_lowercase()) {
            return name;
        }
        let mut n = 2;
        loop {
            let candidate = numbered(&name, n);
            if self.names.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Write an artifact and return the entry name it was stored under
    pub fn add(&mut self, artifact: &Artifact) -> Result<String> {
        let name = self.claim(artifact.file_name());
        self.zip.start_file(name.as_str(), self.options)?;
        self.zip.write_all(&artifact.bytes)?;
        Ok(name)
    }

    fn add_report(&mut self, report: &BatchReport) -> Result<()> {
        self.zip.start_file(REPORT_ENTRY_NAME, self.options)?;
        self.zip.write_all(report.to_json()?.as_bytes())?;
        Ok(())
    }

    /// Finish the central directory and return the archive bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

/// A finished batch: the zip bytes and what went into them
#[derive(Debug, Clone)]
pub struct OutputBundle {
    pub bytes: Vec<u8>,
    pub report: BatchReport,
}

/// Consume record outcomes into a zip archive
///
/// Artifacts are written in outcome order. Skipped and failed records are
/// collected in the report, which is added as `errors.json` when
/// `include_manifest` is set and the batch was not clean.
pub fn package_archive(
    outcomes: impl IntoIterator<Item = RecordOutcome>,
    include_manifest: bool,
) -> Result<OutputBundle> {
    let mut writer = ArchiveWriter::new();
    let mut report = BatchReport::default();

    for outcome in outcomes {
        report.total += 1;
        match outcome {
            RecordOutcome::Rendered(record) => {
                for artifact in &record.artifacts {
                    let name = writer.add(artifact)?;
                    report.entries.push(name);
                }
                report.rendered += 1;
            }
            RecordOutcome::Skipped(e) => {
                warn!(row = e.row(), "skipped: {e}");
                report.skipped.push(e);
            }
            RecordOutcome::Failed(e) => {
                warn!(row = e.row(), "failed: {e}");
                report.failed.push(e);
            }
        }
    }

    if include_manifest && !report.is_clean() {
        writer.add_report(&report)?;
    }
    let bytes = writer.finish()?;

    info!(
        total = report.total,
        rendered = report.rendered,
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        bytes = bytes.len(),
        "archive written"
    );
    Ok(OutputBundle { bytes, report })
}
