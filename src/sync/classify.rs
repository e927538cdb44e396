use std::collections::{BTreeMap, HashSet};

use crate::model::issue::IssueItem;
use crate::model::list_item::ListItem;

use super::link::LinkCodec;

/// A List item and the issue its title points at.
#[derive(Debug, Clone, Copy)]
pub struct LinkedPair<'a> {
    pub list: &'a ListItem,
    pub issue: &'a IssueItem,
}

/// The fetched item sets split by what the cycle has to do with them.
#[derive(Debug, Default)]
pub struct Classification<'a> {
    pub linked: Vec<LinkedPair<'a>>,
    /// Linked List items whose issue was not among the search results.
    pub orphaned: Vec<(String, &'a ListItem)>,
    /// Sync-labelled List items without a link yet.
    pub unlinked_list: Vec<&'a ListItem>,
    /// Issues whose List item was completed recently and must be resolved.
    pub to_resolve: Vec<&'a IssueItem>,
    /// Open issues with no List item yet.
    pub unlinked_issues: Vec<&'a IssueItem>,
}

pub struct Classifier<'c> {
    pub codec: &'c dyn LinkCodec,
    pub sync_label: &'c str,
    /// Keys linked from List items completed within the lookback window.
    pub completed_keys: &'c HashSet<String>,
    /// Extra condition an issue must meet before a List item is created for it.
    pub include: &'c (dyn Fn(&IssueItem) -> bool + Send + Sync),
}

impl Classifier<'_> {
    pub fn classify<'a>(&self, items: &'a [ListItem], issues: &'a [IssueItem]) -> Classification<'a> {
        let mut out = Classification::default();

        let mut by_key: BTreeMap<String, &'a ListItem> = BTreeMap::new();
        for item in items {
            match self.codec.extract(&item.title) {
                Some(key) => {
                    if let Some(existing) = by_key.get(&key) {
                        tracing::warn!(
                            issue_key = %key,
                            task_id = %item.id,
                            kept_task_id = %existing.id,
                            "issue already linked from another task, ignoring duplicate"
                        );
                        continue;
                    }
                    by_key.insert(key, item);
                }
                None if item.has_label(self.sync_label) => out.unlinked_list.push(item),
                None => {}
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for issue in issues {
            seen.insert(&issue.key);
            if let Some(item) = by_key.get(&issue.key) {
                out.linked.push(LinkedPair { list: *item, issue });
                continue;
            }
            // Checked before creation so an issue whose task was just closed
            // does not get a fresh task.
            if self.completed_keys.contains(&issue.key) {
                if !issue.is_resolved() {
                    out.to_resolve.push(issue);
                }
                continue;
            }
            if issue.is_resolved() {
                continue;
            }
            if !(self.include)(issue) {
                tracing::debug!(issue_key = %issue.key, "issue excluded by filter, skipping task creation");
                continue;
            }
            out.unlinked_issues.push(issue);
        }

        for (key, item) in by_key {
            if !seen.contains(key.as_str()) {
                out.orphaned.push((key, item));
            }
        }
        out
    }
}
