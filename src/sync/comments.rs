//! Copies comments between the two sides of a linked pair.
//!
//! A copied comment is prefixed with `[From <System> <origin id>] `. Comments
//! carrying such a prefix are never copied again, and a comment is only
//! written when its rendered form is not already present on the target, so
//! repeated runs without new comments write nothing.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;

use crate::model::Comment;
use crate::providers::{IssueSystem, ListSystem};

static PROVENANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[From [^\]\s]+ [^\]]+\] ").expect("provenance pattern is valid")
});

/// `body` as it appears once copied from `system`'s item `origin_id`.
pub fn with_provenance(system: &str, origin_id: &str, body: &str) -> String {
    format!("[From {system} {origin_id}] {body}")
}

pub fn is_copied(body: &str) -> bool {
    PROVENANCE.is_match(body)
}

/// Rendered bodies from `source` that `target` does not have yet.
pub fn missing_copies(
    system: &str,
    origin_id: &str,
    source: &[Comment],
    target: &[Comment],
) -> Vec<String> {
    source
        .iter()
        .filter(|c| !c.body.trim().is_empty() && !is_copied(&c.body))
        .map(|c| with_provenance(system, origin_id, &c.body))
        .filter(|rendered| !target.iter().any(|t| &t.body == rendered))
        .collect()
}

/// Number of comments written to each side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Propagated {
    pub to_list: usize,
    pub to_issue: usize,
}

/// Bring the comment threads of a linked pair up to date in both directions.
///
/// Failing to read either thread is an error. A comment that fails to be
/// written is logged and skipped; the next cycle tries it again.
pub async fn propagate(
    list: &dyn ListSystem,
    issues: &dyn IssueSystem,
    task_id: &str,
    key: &str,
) -> Result<Propagated> {
    let (list_comments, issue_comments) = tokio::try_join!(
        async {
            list.list_comments(task_id)
                .await
                .with_context(|| format!("list comments of task {task_id}"))
        },
        async {
            issues
                .list_comments(key)
                .await
                .with_context(|| format!("list comments of {key}"))
        },
    )?;

    let mut out = Propagated::default();

    for body in missing_copies(issues.name(), key, &issue_comments, &list_comments) {
        match list.create_comment(task_id, &body).await {
            Ok(_) => out.to_list += 1,
            Err(err) => tracing::warn!(
                task_id,
                issue_key = key,
                error = %format!("{err:#}"),
                "failed to copy comment to {}",
                list.name()
            ),
        }
    }

    for body in missing_copies(list.name(), task_id, &list_comments, &issue_comments) {
        match issues.create_comment(key, &body).await {
            Ok(_) => out.to_issue += 1,
            Err(err) => tracing::warn!(
                task_id,
                issue_key = key,
                error = %format!("{err:#}"),
                "failed to copy comment to {}",
                issues.name()
            ),
        }
    }

    if out.to_list + out.to_issue > 0 {
        tracing::info!(
            task_id,
            issue_key = key,
            to_list = out.to_list,
            to_issue = out.to_issue,
            "copied comments"
        );
    }
    Ok(out)
}
