//! CLI output: error mapping and result formatting.

use crate::dataset::{
    ChangeKind, Commit, ImagePushReport, IndexProblem, PullReport, PushReport, StatusReport,
};
use crate::error::{ApiError, StorageError};
use crate::proxy::TypeProxy;
use comfy_table::{presets, Table};
use owo_colors::OwoColorize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Error text for the CLI, with a next step where one is obvious.
pub fn map_error(e: &ApiError) -> String {
    let hint = match e {
        ApiError::NonLinearHistory { .. } => Some("pull the remote changes before pushing"),
        ApiError::UncommittedChanges(_) => Some("commit first, or pass --yes to discard"),
        ApiError::EmptyCommit => Some("run `cvc add` to stage changes"),
        ApiError::UploadFailed { .. } => Some("run `cvc upload` again to retry the failed files"),
        ApiError::StorageError(StorageError::InvalidLocalDataset(_)) => {
            Some("run inside a working copy or pass --path")
        }
        ApiError::ConfigError(_) => Some("see `cvc config set`"),
        _ => None,
    };
    match hint {
        Some(hint) => format!("Error: {}\nHint: {}", e, hint),
        None => format!("Error: {}", e),
    }
}

fn to_json_string(value: &Value) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::MalformedQuery(format!("Failed to render JSON: {}", e)))
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Modified => "modified",
        ChangeKind::Removed => "removed",
    }
}

pub fn format_status_text(report: &StatusReport) -> String {
    let mut out = match report.head {
        Some(head) => format!("On commit {}", head.short()),
        None => "No commits yet".to_string(),
    };
    if report.unpushed {
        out.push_str(&format!(" {}", "(unpushed)".yellow()));
    }

    if report.staged.is_empty() && report.unstaged.is_empty() {
        out.push_str("\n\nNothing to commit, working tree clean");
    }
    if !report.staged.is_empty() {
        out.push_str(&format!("\n\n{}", "Staged changes:".bold()));
        for (key, kind) in &report.staged {
            let line = format!("{:>10}: {}", kind_label(*kind), key);
            out.push_str(&format!("\n  {}", line.green()));
        }
    }
    if !report.unstaged.is_empty() {
        out.push_str(&format!("\n\n{}", "Changes not staged:".bold()));
        for (key, kind) in &report.unstaged {
            let line = format!("{:>10}: {}", kind_label(*kind), key);
            out.push_str(&format!("\n  {}", line.red()));
        }
    }
    if report.staged_images > 0 {
        out.push_str(&format!(
            "\n\n{} image(s) staged for upload (`cvc upload`)",
            report.staged_images
        ));
    }
    out
}

pub fn format_status_json(report: &StatusReport) -> Result<String, ApiError> {
    let changes = |list: &[(String, ChangeKind)]| -> Vec<Value> {
        list.iter()
            .map(|(key, kind)| json!({"path": key, "change": kind_label(*kind)}))
            .collect()
    };
    to_json_string(&json!({
        "head": report.head.map(|h| h.to_hex()),
        "unpushed": report.unpushed,
        "staged": changes(&report.staged),
        "unstaged": changes(&report.unstaged),
        "staged_images": report.staged_images,
    }))
}

pub fn format_log(commits: &[Commit]) -> String {
    if commits.is_empty() {
        return "No commits yet".to_string();
    }
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(vec!["Commit", "Date", "Author", "Files", "Message"]);
    for commit in commits {
        table.add_row(vec![
            commit.hash.short(),
            commit.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            commit.author.clone(),
            commit.tree.len().to_string(),
            commit.message.clone(),
        ]);
    }
    table.to_string()
}

pub fn format_problems(problems: &[IndexProblem], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        let list: Vec<Value> = problems
            .iter()
            .map(|p| match p {
                IndexProblem::Missing { key } => json!({"path": key, "problem": "missing"}),
                IndexProblem::HashMismatch {
                    key,
                    expected,
                    actual,
                } => json!({
                    "path": key,
                    "problem": "hash_mismatch",
                    "expected": expected.to_hex(),
                    "actual": actual.to_hex(),
                }),
            })
            .collect();
        return to_json_string(&json!({"valid": problems.is_empty(), "problems": list}));
    }

    if problems.is_empty() {
        return Ok(format!("{}", "Index is valid".green()));
    }
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(vec!["Path", "Problem"]);
    for problem in problems {
        let detail = match problem {
            IndexProblem::Missing { .. } => "missing".to_string(),
            IndexProblem::HashMismatch {
                expected, actual, ..
            } => format!("hash {} != {}", actual.short(), expected.short()),
        };
        table.add_row(vec![problem.key().to_string(), detail]);
    }
    Ok(format!(
        "{}\n{}",
        format!("{} problem(s) found", problems.len()).red(),
        table
    ))
}

pub fn format_staged_images(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "No images staged".to_string();
    }
    let mut lines = vec![format!("{} image(s) staged for upload:", paths.len())];
    lines.extend(paths.iter().map(|p| format!("  {}", p.display())));
    lines.join("\n")
}

pub fn format_push(report: &PushReport) -> String {
    match (report.commits, report.head) {
        (0, _) => "Everything up to date".to_string(),
        (n, Some(head)) => format!(
            "Pushed {} commit(s), uploaded {} file(s); remote is at {}",
            n,
            report.blobs_uploaded,
            head.short()
        ),
        (n, None) => format!("Pushed {} commit(s)", n),
    }
}

pub fn format_pull(report: &PullReport) -> String {
    match (report.commits, report.head) {
        (0, _) => "Already up to date".to_string(),
        (n, Some(head)) => format!("Pulled {} commit(s); now at {}", n, head.short()),
        (n, None) => format!("Pulled {} commit(s)", n),
    }
}

pub fn format_image_push(report: &ImagePushReport) -> String {
    if report.frames.is_empty() {
        return "No staged images to upload".to_string();
    }
    let mut lines = vec![format!(
        "Uploaded {} image(s), {} already on the server; added {} frame(s):",
        report.uploaded,
        report.skipped,
        report.frames.len()
    )];
    lines.extend(report.frames.iter().map(|f| format!("  {}", f)));
    lines.push("Run `cvc commit` and `cvc push` to publish them".to_string());
    lines.join("\n")
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One row per proxy, one column per field path.
pub fn format_search_table(items: &[TypeProxy], columns: &[String]) -> String {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(columns.to_vec());
    for item in items {
        table.add_row(columns.iter().map(|c| cell(item.get(c))).collect::<Vec<_>>());
    }
    format!("{}\n{} result(s)", table, items.len())
}

pub fn format_search_json(items: &[TypeProxy]) -> Result<String, ApiError> {
    let list: Vec<Value> = items.iter().map(TypeProxy::to_json).collect();
    to_json_string(&Value::Array(list))
}

pub fn format_object(proxy: &TypeProxy) -> Result<String, ApiError> {
    to_json_string(&proxy.to_json())
}
