//! Recursive document loader.
//!
//! Walks a corpus directory and turns every readable file into a
//! [`Document`]. Per-file failures are collected in the [`LoadReport`] and
//! never abort the batch. Files are read on a bounded rayon pool.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Document, SourceType};

/// Extensions read verbatim as plain text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "text", "rst", "csv", "tsv", "json", "jsonl", "html", "htm", "xml", "tex", "org", "log",
    "yaml", "yml", "toml", "ini", "py", "rs", "js", "ts", "java", "c", "h", "cpp", "sql", "r",
    "ipynb",
];

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Bytes inspected when deciding whether an unknown file is binary.
const SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Reader threads; 0 means one per CPU.
    pub workers: usize,
    pub max_file_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { workers: 0, max_file_bytes: 50 * 1024 * 1024 }
    }
}

/// A file that could not be turned into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl From<FileFailure> for Error {
    fn from(f: FileFailure) -> Self {
        Error::FileLoad { path: f.path, reason: f.reason }
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<FileFailure>,
    /// Files deliberately ignored (binary content).
    pub skipped: Vec<PathBuf>,
}

impl LoadReport {
    /// No documents were produced. Not an error by itself.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

enum Outcome {
    Loaded(Document),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    config: LoaderConfig,
}

impl DocumentLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load every file under `root`. Documents come back sorted by id.
    pub fn load(&self, root: &Path) -> Result<LoadReport> {
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!("{} is not a directory", root.display())));
        }
        let (files, mut failures) = list_files(root);
        let workers = if self.config.workers == 0 { num_cpus::get() } else { self.config.workers };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("coursedb-loader-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("loader pool: {e}")))?;
        tracing::info!(
            "Loading {} files from {} with {} workers",
            files.len(),
            root.display(),
            workers
        );

        let outcomes: Vec<(PathBuf, Outcome)> = pool.install(|| {
            files
                .into_par_iter()
                .map(|path| {
                    let outcome = self.load_file(root, &path);
                    (path, outcome)
                })
                .collect()
        });

        let mut report = LoadReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Outcome::Loaded(doc) => report.documents.push(doc),
                Outcome::Skipped => {
                    tracing::debug!("Skipping binary file {}", path.display());
                    report.skipped.push(path);
                }
                Outcome::Failed(reason) => {
                    tracing::warn!("Failed to load {}: {}", path.display(), reason);
                    failures.push(FileFailure { path, reason });
                }
            }
        }
        report.failures = failures;
        report.documents.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(
            "Loaded {} documents ({} failed, {} skipped)",
            report.documents.len(),
            report.failures.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn load_file(&self, root: &Path, path: &Path) -> Outcome {
        match fs::metadata(path) {
            Ok(meta) if meta.len() > self.config.max_file_bytes => {
                return Outcome::Failed(format!(
                    "file is {} bytes, limit is {}",
                    meta.len(),
                    self.config.max_file_bytes
                ));
            }
            Ok(_) => {}
            Err(e) => return Outcome::Failed(e.to_string()),
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let extracted = match ext.as_str() {
            "pdf" => extract_pdf(path).map(|t| Some((t, SourceType::Pdf))),
            "docx" => extract_docx(path).map(|t| Some((t, SourceType::Docx))),
            e if MARKDOWN_EXTENSIONS.contains(&e) => {
                read_text(path).map(|t| Some((t, SourceType::Markdown)))
            }
            e if TEXT_EXTENSIONS.contains(&e) => {
                read_text(path).map(|t| Some((t, SourceType::Text)))
            }
            _ => read_unknown(path).map(|t| t.map(|t| (t, SourceType::Text))),
        };
        match extracted {
            Ok(Some((text, source_type))) => Outcome::Loaded(Document {
                id: doc_id(root, path),
                path: path.to_string_lossy().to_string(),
                category: category(root, path),
                source_type,
                loaded_at: Utc::now(),
                text,
            }),
            Ok(None) => Outcome::Skipped,
            Err(reason) => Outcome::Failed(reason),
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

fn list_files(root: &Path) -> (Vec<PathBuf>, Vec<FileFailure>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                failures.push(FileFailure { path, reason: e.to_string() });
            }
        }
    }
    files.sort();
    (files, failures)
}

fn slash_joined(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn doc_id(root: &Path, path: &Path) -> String {
    slash_joined(path.strip_prefix(root).unwrap_or(path))
}

fn category(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    match relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => slash_joined(parent),
        _ => "misc".to_string(),
    }
}

fn read_text(path: &Path) -> std::result::Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
    })
}

/// Unknown extension: text unless the leading bytes contain NUL.
fn read_unknown(path: &Path) -> std::result::Result<Option<String>, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    if bytes.iter().take(SNIFF_LEN).any(|&b| b == 0) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
}

fn extract_pdf(path: &Path) -> std::result::Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    // pdf-extract panics on some malformed inputs; keep that inside this file.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(format!("PDF extraction failed: {e}")),
        Err(_) => Err("PDF extractor panicked".to_string()),
    }
}

/// Paragraph text of `word/document.xml`, one paragraph per blank-line block.
fn extract_docx(path: &Path) -> std::result::Result<String, String> {
    use quick_xml::events::Event;

    let file = fs::File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| format!("not a DOCX archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| "missing word/document.xml".to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !paragraph.is_empty() {
                        out.push_str(&paragraph);
                        out.push_str("\n\n");
                        paragraph.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| format!("DOCX text: {e}"))?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("DOCX XML parse error: {e}")),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
