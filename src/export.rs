use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::query::{AttachmentInfo, format_bytes};

const MAX_SUBJECT_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no attachments exported:\n{}", .0.join("\n"))]
    NothingExported(Vec<String>),
}

/// Outcome of an export. Per-attachment failures are collected, not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub dir: PathBuf,
    pub exported: usize,
    pub bytes: u64,
    pub errors: Vec<String>,
}

impl ExportReport {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Exported {} attachment(s) ({}) to {}",
            self.exported,
            format_bytes(self.bytes as i64),
            self.dir.display()
        );
        if !self.errors.is_empty() {
            text.push_str(&format!("\n{} failed", self.errors.len()));
        }
        text
    }
}

/// Replaces characters that are invalid in file names on common platforms
pub fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\n' | '\r' | '\t' => '_',
            _ => c,
        })
        .collect()
}

/// Directory name for one message's export: `<subject>_<id>`
pub fn export_dir_name(subject: &str, message_id: i64) -> String {
    let subject = if subject.trim().is_empty() {
        "attachments"
    } else {
        subject
    };
    let subject: String = sanitize_filename(subject)
        .chars()
        .take(MAX_SUBJECT_LEN)
        .collect();
    format!("{subject}_{message_id}")
}

/// Last path component only, so a crafted filename can't escape the export dir
fn safe_basename(attachment: &AttachmentInfo) -> String {
    let base = Path::new(&attachment.filename.replace('\\', "/"))
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        format!("attachment_{}", attachment.id)
    } else {
        base
    }
}

fn unique_name(used: &mut HashMap<String, usize>, name: String) -> String {
    match used.get_mut(&name) {
        None => {
            used.insert(name.clone(), 0);
            name
        }
        Some(count) => {
            *count += 1;
            let path = Path::new(&name);
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match path.extension() {
                Some(ext) => format!("{stem}_{}.{}", count, ext.to_string_lossy()),
                None => format!("{stem}_{count}"),
            }
        }
    }
}

/// Content-addressed location of an attachment blob
pub fn storage_path(attachments_dir: &Path, content_hash: &str) -> Option<PathBuf> {
    let prefix = content_hash.get(..2)?;
    Some(attachments_dir.join(prefix).join(content_hash))
}

/// Copies attachments from the content store into `out_dir`
pub fn export_attachments(
    attachments_dir: &Path,
    out_dir: &Path,
    attachments: &[AttachmentInfo],
) -> Result<ExportReport, ExportError> {
    fs::create_dir_all(out_dir).map_err(|source| ExportError::CreateDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut used = HashMap::new();
    let mut report = ExportReport {
        dir: out_dir.to_path_buf(),
        exported: 0,
        bytes: 0,
        errors: Vec::new(),
    };

    for attachment in attachments {
        let Some(src) = storage_path(attachments_dir, &attachment.content_hash) else {
            report
                .errors
                .push(format!("{}: missing content hash", attachment.filename));
            continue;
        };
        let name = unique_name(&mut used, safe_basename(attachment));
        match fs::copy(&src, out_dir.join(&name)) {
            Ok(bytes) => {
                report.exported += 1;
                report.bytes += bytes;
            }
            Err(e) => {
                warn!("export of {} failed: {e}", attachment.filename);
                report.errors.push(format!("{}: {e}", attachment.filename));
            }
        }
    }

    if report.exported == 0 {
        return Err(ExportError::NothingExported(report.errors));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(id: i64, filename: &str, hash: &str) -> AttachmentInfo {
        AttachmentInfo {
            id,
            filename: filename.to_string(),
            content_hash: hash.to_string(),
            ..AttachmentInfo::default()
        }
    }

    fn store(dir: &Path, hash: &str, content: &[u8]) {
        let path = storage_path(dir, hash).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j\nk"), "a_b_c_d_e_f_g_h_i_j_k");
        assert_eq!(sanitize_filename("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_export_dir_name_caps_subject() {
        let long = "x".repeat(80);
        let name = export_dir_name(&long, 7);
        assert_eq!(name, format!("{}_7", "x".repeat(50)));
        assert_eq!(export_dir_name("  ", 3), "attachments_3");
        assert_eq!(export_dir_name("Re: Q3/Q4", 1), "Re_ Q3_Q4_1");
    }

    #[test]
    fn test_safe_basename_strips_directories() {
        assert_eq!(
            safe_basename(&attachment(1, "../../etc/passwd", "h")),
            "passwd"
        );
        assert_eq!(
            safe_basename(&attachment(2, "C:\\Users\\x\\doc.pdf", "h")),
            "doc.pdf"
        );
        assert_eq!(safe_basename(&attachment(3, "..", "h")), "attachment_3");
    }

    #[test]
    fn test_unique_name_numbers_duplicates() {
        let mut used = HashMap::new();
        assert_eq!(unique_name(&mut used, "a.pdf".into()), "a.pdf");
        assert_eq!(unique_name(&mut used, "a.pdf".into()), "a_1.pdf");
        assert_eq!(unique_name(&mut used, "a.pdf".into()), "a_2.pdf");
        assert_eq!(unique_name(&mut used, "README".into()), "README");
        assert_eq!(unique_name(&mut used, "README".into()), "README_1");
    }

    #[test]
    fn test_export_copies_and_reports_failures() {
        let store_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        store(store_dir.path(), "abcdef", b"hello");

        let report = export_attachments(
            store_dir.path(),
            &out.path().join("msg_1"),
            &[
                attachment(1, "report.pdf", "abcdef"),
                attachment(2, "report.pdf", "abcdef"),
                attachment(3, "lost.bin", "ffffff"),
                attachment(4, "nohash.bin", ""),
            ],
        )
        .unwrap();

        assert_eq!(report.exported, 2);
        assert_eq!(report.bytes, 10);
        assert_eq!(report.errors.len(), 2);
        assert!(out.path().join("msg_1/report.pdf").exists());
        assert!(out.path().join("msg_1/report_1.pdf").exists());
        assert!(report.summary().contains("Exported 2 attachment(s)"));
    }

    #[test]
    fn test_export_with_nothing_copied_is_error() {
        let store_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let result = export_attachments(
            store_dir.path(),
            out.path(),
            &[attachment(1, "a.txt", "001122")],
        );
        assert!(matches!(result, Err(ExportError::NothingExported(errs)) if errs.len() == 1));
    }
}
