use std::fs;
use std::io::Write;
use std::path::Path;

use coursedb_core::loader::{DocumentLoader, LoaderConfig};
use coursedb_core::types::SourceType;
use coursedb_core::Error;

fn write(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

fn write_docx(root: &Path, rel: &str, document_xml: &str) {
    let file = fs::File::create(root.join(rel)).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document_xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[test]
fn loads_nested_corpus_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "syllabus.txt", b"Course overview and grading.");
    write(root, "week1/intro.md", b"# Intro\n\nData-driven decision making.");
    write(root, "week1/notes.xyz", b"plain text with an unknown extension");
    write(root, "blob.bin", &[0x7f, 0x45, 0x00, 0x01, 0x02]);
    write(root, "broken.pdf", b"this is not a pdf");
    write(root, "broken.docx", b"this is not a zip archive");
    write(root, ".hidden/secret.txt", b"should not be loaded");
    write(root, ".notes.txt", b"should not be loaded either");

    let report = DocumentLoader::new(LoaderConfig::default()).load(root).unwrap();

    let ids: Vec<&str> = report.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["syllabus.txt", "week1/intro.md", "week1/notes.xyz"]);
    assert_eq!(report.failures.len(), 2, "{:?}", report.failures);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].ends_with("blob.bin"));

    let intro = &report.documents[1];
    assert_eq!(intro.category, "week1");
    assert_eq!(intro.source_type, SourceType::Markdown);
    assert!(intro.text.contains("decision making"));
    assert_eq!(report.documents[0].category, "misc");
    assert_eq!(report.documents[0].source_type, SourceType::Text);
}

#[test]
fn extracts_docx_paragraphs() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:tab/><w:t>world</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Second &amp; last</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
    write_docx(dir.path(), "lecture.docx", xml);

    let report = DocumentLoader::new(LoaderConfig::default()).load(dir.path()).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.documents.len(), 1);
    let doc = &report.documents[0];
    assert_eq!(doc.source_type, SourceType::Docx);
    assert_eq!(doc.text, "Hello\tworld\n\nSecond & last");
}

#[test]
fn empty_directory_is_empty_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let report = DocumentLoader::new(LoaderConfig::default()).load(dir.path()).unwrap();
    assert!(report.is_empty());
    assert!(report.failures.is_empty());
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(DocumentLoader::new(LoaderConfig::default()).load(&missing).is_err());
}

#[test]
fn oversized_files_fail_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "small.txt", b"tiny");
    write(dir.path(), "large.txt", &vec![b'a'; 4096]);

    let loader = DocumentLoader::new(LoaderConfig { workers: 2, max_file_bytes: 1024 });
    let report = loader.load(dir.path()).unwrap();
    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.documents[0].id, "small.txt");
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("large.txt"));
    let err: Error = report.failures[0].clone().into();
    assert!(matches!(err, Error::FileLoad { .. }));
    assert!(err.to_string().contains("large.txt"));
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "latin1.txt", b"caf\xe9 au lait");
    let report = DocumentLoader::new(LoaderConfig::default()).load(dir.path()).unwrap();
    assert_eq!(report.documents.len(), 1);
    assert!(report.documents[0].text.starts_with("caf"));
    assert!(report.documents[0].text.ends_with("au lait"));
}
