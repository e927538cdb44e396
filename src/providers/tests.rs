use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{IssueSystem, ListSystem};
use crate::model::issue::{
    CreatedIssue, IssueItem, IssueStatus, IssueUpdate, NewIssue, Transition,
};
use crate::model::list_item::{ListItem, ListItemUpdate, NewListItem};
use crate::model::{Bucket, Comment, Container};

#[derive(Default)]
pub(crate) struct ListState {
    pub container: String,
    pub buckets: Vec<Bucket>,
    pub items: Vec<ListItem>,
    pub completed: Vec<ListItem>,
    pub comments: HashMap<String, Vec<Comment>>,
    pub created: Vec<NewListItem>,
    pub created_buckets: Vec<String>,
    pub updates: Vec<(String, ListItemUpdate)>,
    pub closed: Vec<String>,
    pub moves: Vec<(String, String)>,
    pub fail_completed: bool,
}

/// In-memory List System recording every mutation.
pub(crate) struct FakeList {
    pub state: Mutex<ListState>,
}

impl FakeList {
    pub fn new(buckets: &[(&str, &str)], items: Vec<ListItem>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ListState {
                container: "Work".into(),
                buckets: buckets
                    .iter()
                    .map(|(id, name)| Bucket {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
                items,
                ..Default::default()
            }),
        })
    }

    pub fn comments_on(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .comments
            .get(id)
            .map(|cs| cs.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ListSystem for FakeList {
    fn name(&self) -> &str {
        "Todoist"
    }

    async fn find_container(&self, name: &str) -> Result<Container> {
        let state = self.state.lock().unwrap();
        if state.container != name {
            bail!("project {name:?} not found");
        }
        Ok(Container {
            id: "p1".into(),
            name: name.into(),
        })
    }

    async fn list_buckets(&self, _container_id: &str) -> Result<Vec<Bucket>> {
        Ok(self.state.lock().unwrap().buckets.clone())
    }

    async fn create_bucket(&self, _container_id: &str, name: &str) -> Result<Bucket> {
        let mut state = self.state.lock().unwrap();
        let bucket = Bucket {
            id: format!("s{}", state.buckets.len() + 1),
            name: name.into(),
        };
        state.buckets.push(bucket.clone());
        state.created_buckets.push(name.into());
        Ok(bucket)
    }

    async fn list_items(&self, _container_id: &str) -> Result<Vec<ListItem>> {
        Ok(self.state.lock().unwrap().items.clone())
    }

    async fn list_recently_completed(
        &self,
        _container_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ListItem>> {
        assert!(since < until);
        let state = self.state.lock().unwrap();
        if state.fail_completed {
            bail!("completed tasks unavailable");
        }
        Ok(state.completed.clone())
    }

    async fn create_item(&self, item: &NewListItem) -> Result<ListItem> {
        let mut state = self.state.lock().unwrap();
        let created = ListItem {
            id: format!("t{}", 100 + state.created.len()),
            title: item.title.clone(),
            description: item.description.clone(),
            due: item.due,
            labels: item.labels.clone(),
            bucket_id: item.bucket_id.clone(),
            priority: item.priority,
            updated_at: Some(Utc::now()),
            completed: false,
        };
        state.created.push(item.clone());
        state.items.push(created.clone());
        Ok(created)
    }

    async fn update_item(&self, id: &str, update: &ListItemUpdate) -> Result<ListItem> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((id.into(), update.clone()));
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("task {id} not found"))?;
        if let Some(title) = &update.title {
            item.title = title.clone();
        }
        if let Some(description) = &update.description {
            item.description = description.clone();
        }
        if update.due.is_some() {
            item.due = update.due;
        }
        Ok(item.clone())
    }

    async fn close_item(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closed.push(id.into());
        state.items.retain(|i| i.id != id);
        Ok(())
    }

    async fn move_item_to_bucket(&self, id: &str, bucket_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.moves.push((id.into(), bucket_id.into()));
        if let Some(item) = state.items.iter_mut().find(|i| i.id == id) {
            item.bucket_id = Some(bucket_id.into());
        }
        Ok(())
    }

    async fn list_comments(&self, item_id: &str) -> Result<Vec<Comment>> {
        let state = self.state.lock().unwrap();
        Ok(state.comments.get(item_id).cloned().unwrap_or_default())
    }

    async fn create_comment(&self, item_id: &str, body: &str) -> Result<Comment> {
        let mut state = self.state.lock().unwrap();
        let thread = state.comments.entry(item_id.into()).or_default();
        let comment = Comment {
            id: format!("c{}", thread.len() + 1),
            author: None,
            body: body.into(),
        };
        thread.push(comment.clone());
        Ok(comment)
    }
}

#[derive(Default)]
pub(crate) struct IssueState {
    pub issues: Vec<IssueItem>,
    pub transitions: Vec<Transition>,
    pub comments: HashMap<String, Vec<Comment>>,
    pub queries: Vec<String>,
    pub created: Vec<NewIssue>,
    pub updates: Vec<(String, IssueUpdate)>,
    /// (issue key, target status) of every applied transition.
    pub applied: Vec<(String, String)>,
    pub fail_search: bool,
    /// Searches sleep this long before answering.
    pub stall_search: Option<Duration>,
    pub fail_create: bool,
    pub fail_transition: bool,
    pub fail_comment: bool,
}

/// In-memory Issue System recording every mutation.
pub(crate) struct FakeIssues {
    pub state: Mutex<IssueState>,
}

impl FakeIssues {
    pub fn new(issues: Vec<IssueItem>) -> Arc<Self> {
        let transitions = [
            ("11", "Reopen", "To Do"),
            ("21", "Start progress", "In Progress"),
            ("31", "Request review", "In Review"),
            ("41", "Done", "Done"),
            ("51", "Block", "Blocked"),
        ]
        .into_iter()
        .map(|(id, name, to)| Transition {
            id: id.into(),
            name: name.into(),
            to: to.into(),
        })
        .collect();
        Arc::new(Self {
            state: Mutex::new(IssueState {
                issues,
                transitions,
                ..Default::default()
            }),
        })
    }

    pub fn comments_on(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .comments
            .get(key)
            .map(|cs| cs.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IssueSystem for FakeIssues {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn search_issues(
        &self,
        query: &str,
        _fields: &[&str],
        max_results: usize,
    ) -> Result<Vec<IssueItem>> {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.queries.push(query.into());
            if state.fail_search {
                bail!("Jira API error 503: unavailable");
            }
            state.stall_search
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        let state = self.state.lock().unwrap();
        Ok(state.issues.iter().take(max_results).cloned().collect())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            bail!("Jira API error 400: summary is invalid");
        }
        let key = format!("DX-{}", 100 + state.created.len());
        state.created.push(issue.clone());
        state.issues.push(IssueItem {
            key: key.clone(),
            summary: issue.summary.clone(),
            description: issue.description.clone(),
            due: issue.due,
            status: Some(IssueStatus {
                name: "Open".into(),
                terminal: false,
            }),
            resolution: None,
            priority_id: None,
            updated_at: Some(Utc::now()),
            in_active_sprint: true,
        });
        Ok(CreatedIssue {
            id: format!("{}", 10_000 + state.created.len()),
            key,
        })
    }

    async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .updates
            .push((key.into(), update.clone()));
        Ok(())
    }

    async fn list_transitions(&self, _key: &str) -> Result<Vec<Transition>> {
        Ok(self.state.lock().unwrap().transitions.clone())
    }

    async fn apply_transition(&self, key: &str, transition: &Transition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transition {
            bail!("Jira API error 400: transition is not valid");
        }
        state.applied.push((key.into(), transition.to.clone()));
        Ok(())
    }

    async fn list_comments(&self, key: &str) -> Result<Vec<Comment>> {
        let state = self.state.lock().unwrap();
        Ok(state.comments.get(key).cloned().unwrap_or_default())
    }

    async fn create_comment(&self, key: &str, body: &str) -> Result<Comment> {
        let mut state = self.state.lock().unwrap();
        if state.fail_comment {
            bail!("Jira API error 403: cannot comment");
        }
        let thread = state.comments.entry(key.into()).or_default();
        let comment = Comment {
            id: format!("{}", 20_000 + thread.len()),
            author: Some("Sync Bot".into()),
            body: body.into(),
        };
        thread.push(comment.clone());
        Ok(comment)
    }
}

#[tokio::test]
async fn transition_to_matches_name_or_target_status() {
    let issues = FakeIssues::new(vec![]);
    issues.transition_to("DX-1", "start progress").await.unwrap();
    issues.transition_to("DX-1", "in review").await.unwrap();
    let err = issues.transition_to("DX-1", "Archived").await.unwrap_err();
    assert!(err.to_string().contains("Archived"));
    assert_eq!(
        issues.state.lock().unwrap().applied,
        [
            ("DX-1".to_string(), "In Progress".to_string()),
            ("DX-1".to_string(), "In Review".to_string())
        ]
    );
}

#[tokio::test]
async fn failing_transition_is_reported_and_not_applied() {
    let issues = FakeIssues::new(vec![]);
    issues.state.lock().unwrap().fail_transition = true;
    let err = issues.transition_to("DX-1", "Done").await.unwrap_err();
    assert!(err.to_string().contains("400"), "{err}");
    assert!(issues.state.lock().unwrap().applied.is_empty());
}
