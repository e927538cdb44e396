use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::issue::{IssueItem, IssueUpdate};
use crate::model::list_item::{ListItem, ListItemUpdate};
use crate::model::Bucket;

use super::link::LinkCodec;

/// Which side of a linked pair is authoritative this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    IssueToList,
    ListToIssue,
}

/// The issue wins only when both timestamps are known and the issue's is
/// strictly newer. Ties and missing timestamps keep the List side's edits.
pub fn decide_direction(
    list_updated: Option<DateTime<Utc>>,
    issue_updated: Option<DateTime<Utc>>,
) -> Direction {
    match (list_updated, issue_updated) {
        (Some(list), Some(issue)) if issue > list => Direction::IssueToList,
        _ => Direction::ListToIssue,
    }
}

/// Jira priority id to Todoist priority (4 is most urgent).
pub fn list_priority(priority_id: Option<&str>) -> u8 {
    match priority_id {
        Some("1") => 4,
        Some("2") => 3,
        Some("3") => 2,
        _ => 1,
    }
}

/// Fields of `issue` that differ from what `item` carries, as a List update.
/// The title keeps the link marker.
pub fn list_update(item: &ListItem, issue: &IssueItem, codec: &dyn LinkCodec) -> ListItemUpdate {
    let title = codec.embed(&issue.summary, &issue.key);
    ListItemUpdate {
        title: (title != item.title).then_some(title),
        description: (issue.description != item.description).then(|| issue.description.clone()),
        due: issue.due.filter(|d| item.due != Some(*d)),
    }
}

/// Fields of `item` that differ from what `issue` carries, as an issue update.
pub fn issue_update(item: &ListItem, issue: &IssueItem, codec: &dyn LinkCodec) -> IssueUpdate {
    let summary = codec.strip(&item.title);
    IssueUpdate {
        summary: (summary != issue.summary).then(|| summary.to_string()),
        description: (item.description != issue.description).then(|| item.description.clone()),
        due: item.due.filter(|d| issue.due != Some(*d)),
    }
}

/// Buckets of the container by id and by name. Grows as buckets are created
/// during a cycle.
#[derive(Debug, Default)]
pub struct BucketIndex {
    by_id: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl BucketIndex {
    pub fn new(buckets: &[Bucket]) -> Self {
        let mut index = Self::default();
        for b in buckets {
            index.insert(b.clone());
        }
        index
    }

    pub fn insert(&mut self, bucket: Bucket) {
        self.by_name.insert(bucket.name.clone(), bucket.id.clone());
        self.by_id.insert(bucket.id, bucket.name);
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::issue::IssueStatus;
    use crate::sync::link::TitleLinkCodec;
    use chrono::{NaiveDate, TimeZone};

    fn at(h: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap())
    }

    fn pair() -> (ListItem, IssueItem) {
        let item = ListItem {
            id: "t1".into(),
            title: "[DX-1](https://jira.test/browse/DX-1) Fix bug".into(),
            description: "details".into(),
            due: NaiveDate::from_ymd_opt(2024, 6, 1),
            labels: vec!["jira-sync".into()],
            bucket_id: None,
            priority: 1,
            updated_at: at(10),
            completed: false,
        };
        let issue = IssueItem {
            key: "DX-1".into(),
            summary: "Fix bug".into(),
            description: "details".into(),
            due: NaiveDate::from_ymd_opt(2024, 6, 1),
            status: Some(IssueStatus {
                name: "In Progress".into(),
                terminal: false,
            }),
            resolution: None,
            priority_id: Some("3".into()),
            updated_at: at(9),
            in_active_sprint: true,
        };
        (item, issue)
    }

    #[test]
    fn newer_issue_wins_otherwise_list_side() {
        assert_eq!(decide_direction(at(9), at(10)), Direction::IssueToList);
        assert_eq!(decide_direction(at(10), at(9)), Direction::ListToIssue);
        assert_eq!(decide_direction(at(10), at(10)), Direction::ListToIssue);
        assert_eq!(decide_direction(None, at(10)), Direction::ListToIssue);
        assert_eq!(decide_direction(at(10), None), Direction::ListToIssue);
        assert_eq!(decide_direction(None, None), Direction::ListToIssue);
    }

    #[test]
    fn priority_table() {
        assert_eq!(list_priority(Some("1")), 4);
        assert_eq!(list_priority(Some("2")), 3);
        assert_eq!(list_priority(Some("3")), 2);
        assert_eq!(list_priority(Some("5")), 1);
        assert_eq!(list_priority(None), 1);
    }

    #[test]
    fn identical_pair_produces_empty_updates() {
        let codec = TitleLinkCodec::new("https://jira.test");
        let (item, issue) = pair();
        assert!(list_update(&item, &issue, &codec).is_empty());
        assert!(issue_update(&item, &issue, &codec).is_empty());
    }

    #[test]
    fn updates_carry_only_changed_fields() {
        let codec = TitleLinkCodec::new("https://jira.test");
        let (mut item, mut issue) = pair();
        issue.summary = "Fix login bug".into();
        let to_list = list_update(&item, &issue, &codec);
        assert_eq!(
            to_list.title.as_deref(),
            Some("[DX-1](https://jira.test/browse/DX-1) Fix login bug")
        );
        assert_eq!(to_list.description, None);
        assert_eq!(to_list.due, None);

        item.description = "more details".into();
        item.due = NaiveDate::from_ymd_opt(2024, 7, 1);
        let to_issue = issue_update(&item, &issue, &codec);
        assert_eq!(to_issue.summary.as_deref(), Some("Fix bug"));
        assert_eq!(to_issue.description.as_deref(), Some("more details"));
        assert_eq!(to_issue.due, NaiveDate::from_ymd_opt(2024, 7, 1));
    }

    #[test]
    fn missing_due_date_is_never_pushed() {
        let codec = TitleLinkCodec::new("https://jira.test");
        let (mut item, issue) = pair();
        item.due = None;
        assert_eq!(issue_update(&item, &issue, &codec).due, None);
        assert_eq!(
            list_update(&item, &issue, &codec).due,
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
    }

    #[test]
    fn bucket_index_tracks_inserts() {
        let mut index = BucketIndex::new(&[Bucket {
            id: "s1".into(),
            name: "To Do".into(),
        }]);
        assert_eq!(index.id_of("To Do"), Some("s1"));
        assert_eq!(index.name_of("s2"), None);
        index.insert(Bucket {
            id: "s2".into(),
            name: "Blocked".into(),
        });
        assert_eq!(index.name_of("s2"), Some("Blocked"));
        assert_eq!(index.id_of("Blocked"), Some("s2"));
    }
}
