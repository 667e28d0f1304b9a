//! Line-delimited JSON corpus: atomic writer and streaming validator.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::model::RagDocument;

/// Writes `documents` to `destination`, one JSON record per line, in order.
///
/// The file is written beside the destination and renamed into place, so
/// a failure leaves any previous corpus untouched. Returns the record count.
#[instrument(skip_all, fields(destination = %destination.display(), count = documents.len()))]
pub fn write_corpus(documents: &[RagDocument], destination: &Path) -> Result<usize> {
    write_atomic(destination, |out| {
        for doc in documents {
            serde_json::to_writer(&mut *out, doc)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    })?;
    info!(count = documents.len(), "corpus written");
    Ok(documents.len())
}

/// Writes one pretty-printed JSON object atomically.
pub fn write_json<T: Serialize>(value: &T, destination: &Path) -> Result<()> {
    write_atomic(destination, |out| {
        serde_json::to_writer_pretty(&mut *out, value)?;
        out.write_all(b"\n")
    })
}

/// Temp file in the destination directory, then rename over the target.
/// The temp file is removed on any error.
pub(crate) fn write_atomic<F>(destination: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;

    let mut writer = BufWriter::new(temp.as_file());
    fill(&mut writer).map_err(|e| Error::io(temp.path(), e))?;
    writer.flush().map_err(|e| Error::io(temp.path(), e))?;
    drop(writer);
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(temp.path(), e))?;

    temp.persist(destination)
        .map_err(|e| Error::io(destination, e.error))?;
    debug!(path = %destination.display(), "renamed into place");
    Ok(())
}

/// A record that failed validation. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: usize,
    pub errors: Vec<LineError>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parses one corpus line into a checked document.
pub fn parse_record(line: &str) -> std::result::Result<RagDocument, String> {
    if line.trim().is_empty() {
        return Err("empty record".into());
    }
    let doc: RagDocument = serde_json::from_str(line).map_err(|e| e.to_string())?;
    doc.check()?;
    Ok(doc)
}

/// Feeds each line to `visit` with its 1-based number, without the line
/// terminator. Lines that are not UTF-8 arrive as `None`; only read
/// errors stop the scan.
pub(crate) fn scan_lines<R, F>(mut reader: R, mut visit: F) -> std::io::Result<()>
where
    R: BufRead,
    F: FnMut(usize, Option<&str>),
{
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        line_no += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        visit(line_no, std::str::from_utf8(&buf).ok());
    }
}

/// Re-parses every line of a corpus file, collecting every failure.
///
/// Only an unreadable file aborts; bad records never do.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn validate_corpus(path: &Path) -> Result<ValidationReport> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    validate_reader(BufReader::new(file)).map_err(|e| Error::io(path, e))
}

pub fn validate_reader<R: BufRead>(reader: R) -> std::io::Result<ValidationReport> {
    let mut report = ValidationReport::default();
    scan_lines(reader, |line_no, line| {
        let parsed = match line {
            Some(line) => parse_record(line).map(drop),
            None => Err("invalid UTF-8".to_string()),
        };
        match parsed {
            Ok(()) => report.valid += 1,
            Err(error) => report.errors.push(LineError {
                line: line_no,
                error,
            }),
        }
    })?;
    info!(
        valid = report.valid,
        invalid = report.errors.len(),
        "validation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentMetadata, ISSUE_SOURCE_TYPE};
    use std::collections::BTreeSet;

    fn make_document(id: &str, content: &str) -> RagDocument {
        RagDocument {
            content: content.into(),
            metadata: DocumentMetadata {
                title: format!("Issue {id}"),
                pipeline: "Backlog".into(),
                epic: Some("Launch".into()),
                sprint: None,
                estimate: Some(2.5),
                labels: BTreeSet::from(["bug".to_string()]),
                assignees: BTreeSet::new(),
                dependencies: Some(vec!["d1".into()]),
                source_id: id.into(),
                source_type: ISSUE_SOURCE_TYPE.into(),
            },
        }
    }

    #[test]
    fn written_corpus_validates_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let docs = vec![
            make_document("a", "first\n\nwith \"quotes\""),
            make_document("b", "second"),
        ];

        assert_eq!(write_corpus(&docs, &path).unwrap(), 2);

        let report = validate_corpus(&path).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.valid, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let reread: Vec<RagDocument> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(reread, docs);
    }

    #[test]
    fn empty_corpus_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        assert_eq!(write_corpus(&[], &path).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn failed_write_keeps_previous_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        write_corpus(&[make_document("a", "old")], &path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let result = write_atomic(&path, |out| {
            out.write_all(b"{\"content\":\"trunc")?;
            Err(std::io::Error::other("disk full"))
        });

        let err = result.unwrap_err();
        assert_eq!(err.kind(), "IOError");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        // No stray temp file left behind.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_first_write_leaves_destination_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let _ = write_atomic(&path, |_| Err(std::io::Error::other("boom")));
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/corpus.jsonl");
        let err = write_corpus(&[make_document("a", "x")], &path).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn validation_collects_every_bad_line() {
        let good = serde_json::to_string(&make_document("a", "ok")).unwrap();
        let blank_content = serde_json::to_string(&make_document("b", "")).unwrap();
        let input = format!("{good}\nnot json\n\n{blank_content}\n{good}\n");

        let report = validate_reader(input.as_bytes()).unwrap();
        assert_eq!(report.valid, 2);
        let lines: Vec<usize> = report.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [2, 3, 4]);
        assert_eq!(report.errors[1].error, "empty record");
        assert_eq!(report.errors[2].error, "content is empty");
    }

    #[test]
    fn non_utf8_line_does_not_stop_validation() {
        let good = serde_json::to_string(&make_document("a", "ok")).unwrap();
        let mut input = Vec::new();
        input.extend_from_slice(good.as_bytes());
        input.extend_from_slice(b"\n\xff\xfe bad\n");
        input.extend_from_slice(good.as_bytes());
        input.extend_from_slice(b"\nnot json\n");

        let report = validate_reader(input.as_slice()).unwrap();
        assert_eq!(report.valid, 2);
        let lines: Vec<usize> = report.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, [2, 4]);
        assert_eq!(report.errors[0].error, "invalid UTF-8");
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let good = serde_json::to_string(&make_document("a", "ok")).unwrap();
        let input = format!("{good}\r\n{good}");
        let report = validate_reader(input.as_bytes()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.valid, 2);
    }

    #[test]
    fn missing_required_key_is_reported() {
        let line = r#"{"content":"x","metadata":{"title":"x","labels":[],"assignees":[],"source_id":"1","source_type":"zenhub_issue"}}"#;
        let err = parse_record(line).unwrap_err();
        assert!(err.contains("pipeline"));
    }

    #[test]
    fn validate_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_corpus(&dir.path().join("nope.jsonl")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }
}
