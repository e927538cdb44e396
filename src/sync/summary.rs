use std::fmt::Write;
use std::time::Duration;

/// Which part of the report an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreatedIssue,
    CreatedListItem,
    PushedToList,
    PushedToIssue,
    CompletedListItem,
    ResolvedIssue,
    Error,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::CreatedIssue,
        ActionKind::CreatedListItem,
        ActionKind::PushedToList,
        ActionKind::PushedToIssue,
        ActionKind::CompletedListItem,
        ActionKind::ResolvedIssue,
        ActionKind::Error,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::CreatedIssue => "Created in Jira",
            ActionKind::CreatedListItem => "Created in Todoist",
            ActionKind::PushedToList => "Updated Jira -> Todoist",
            ActionKind::PushedToIssue => "Updated Todoist -> Jira",
            ActionKind::CompletedListItem => "Completed in Todoist",
            ActionKind::ResolvedIssue => "Resolved in Jira",
            ActionKind::Error => "Errors",
        }
    }
}

/// One operation performed (or attempted) during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    pub kind: ActionKind,
    /// Issue key of the pair involved, when one exists yet.
    pub key: Option<String>,
    pub description: String,
}

/// Everything a single cycle did, in the order it happened.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    actions: Vec<SyncAction>,
}

impl RunSummary {
    pub fn record(&mut self, kind: ActionKind, key: Option<&str>, description: impl Into<String>) {
        self.actions.push(SyncAction {
            kind,
            key: key.map(String::from),
            description: description.into(),
        });
    }

    pub fn error(&mut self, key: Option<&str>, description: impl Into<String>) {
        self.record(ActionKind::Error, key, description);
    }

    pub fn of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.count(ActionKind::Error) > 0
    }

    /// Grouped, human-readable report.
    pub fn render(&self, elapsed: Duration) -> String {
        let rule = "================================";
        let mut out = String::new();
        let _ = writeln!(out, "{rule}\n  Sync Summary\n{rule}");

        for kind in ActionKind::ALL {
            let actions: Vec<&SyncAction> = self.of_kind(kind).collect();
            if actions.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{} ({}):", kind.label(), actions.len());
            for a in actions {
                match &a.key {
                    Some(key) => {
                        let _ = writeln!(out, "  - [{key}] {}", a.description);
                    }
                    None => {
                        let _ = writeln!(out, "  - {}", a.description);
                    }
                }
            }
        }

        if self.is_empty() {
            out.push_str("\nEverything is up to date.\n");
        }
        let _ = writeln!(out, "\nCompleted in {}ms\n{rule}", elapsed.as_millis());
        out
    }
}
