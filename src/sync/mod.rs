pub mod classify;
pub mod comments;
pub mod link;
pub mod reconcile;
pub mod status_map;
pub mod summary;


use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::AppConfig;
use crate::error::SyncError;
use crate::model::issue::{IssueItem, NewIssue};
use crate::model::list_item::{ListItem, ListItemUpdate, NewListItem};
use crate::model::{Bucket, Container};
use crate::providers::jira::SEARCH_FIELDS;
use crate::providers::{IssueSystem, ListSystem};

use classify::{Classifier, LinkedPair};
use link::LinkCodec;
use reconcile::{decide_direction, issue_update, list_priority, list_update, BucketIndex, Direction};
use status_map::StatusMap;
use summary::{ActionKind, RunSummary};

/// Engine settings, taken from the validated config once at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub container: String,
    pub issue_project: String,
    pub issue_query: String,
    pub search_fields: &'static [&'static str],
    pub max_results: usize,
    pub sync_label: String,
    pub default_issue_type: String,
    pub initial_status: String,
    pub done_status: String,
    pub completed_lookback: chrono::Duration,
    pub require_active_sprint: bool,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            container: cfg.todoist.project.clone(),
            issue_project: cfg.jira.project.clone(),
            issue_query: cfg.issue_query(),
            search_fields: SEARCH_FIELDS,
            max_results: cfg.sync.max_results,
            sync_label: cfg.sync.label.clone(),
            default_issue_type: cfg.sync.default_issue_type.clone(),
            initial_status: cfg.sync.initial_status.clone(),
            done_status: cfg.sync.done_status.clone(),
            completed_lookback: chrono::Duration::hours(cfg.sync.completed_lookback_hours),
            require_active_sprint: cfg.sync.require_active_sprint,
        }
    }
}

/// Everything fetched at the start of a cycle.
struct Snapshot {
    container: Container,
    buckets: Vec<Bucket>,
    items: Vec<ListItem>,
    /// `None` when the completed items could not be fetched.
    completed: Option<Vec<ListItem>>,
    issues: Vec<IssueItem>,
}

/// Runs sync cycles between a List System and an Issue System.
///
/// The engine keeps no state between cycles: every run fetches both sides in
/// full and re-derives links from item titles.
pub struct Engine {
    list: Arc<dyn ListSystem>,
    issues: Arc<dyn IssueSystem>,
    codec: Box<dyn LinkCodec>,
    status_map: StatusMap,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        list: Arc<dyn ListSystem>,
        issues: Arc<dyn IssueSystem>,
        codec: Box<dyn LinkCodec>,
        status_map: StatusMap,
        settings: EngineSettings,
    ) -> Self {
        Self {
            list,
            issues,
            codec,
            status_map,
            settings,
        }
    }

    /// One full cycle. Only fetch failures are returned as errors; failures on
    /// individual items end up in the summary.
    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        tracing::info!("syncing {} and {}", self.list.name(), self.issues.name());
        let snapshot = self.fetch().await?;
        let mut summary = RunSummary::default();

        let completed_keys: HashSet<String> = snapshot
            .completed
            .iter()
            .flatten()
            .filter_map(|item| self.codec.extract(&item.title))
            .collect();
        let require_sprint = self.settings.require_active_sprint;
        let include = move |issue: &IssueItem| !require_sprint || issue.in_active_sprint;
        let classifier = Classifier {
            codec: self.codec.as_ref(),
            sync_label: &self.settings.sync_label,
            completed_keys: &completed_keys,
            include: &include,
        };
        let plan = classifier.classify(&snapshot.items, &snapshot.issues);
        tracing::debug!(
            linked = plan.linked.len(),
            unlinked_tasks = plan.unlinked_list.len(),
            unlinked_issues = plan.unlinked_issues.len(),
            to_resolve = plan.to_resolve.len(),
            "classified items"
        );

        let mut buckets = BucketIndex::new(&snapshot.buckets);
        let container_id = snapshot.container.id.as_str();

        for issue in plan.to_resolve {
            self.resolve_issue(issue, &mut summary).await;
        }

        for item in plan.unlinked_list {
            if let Err(err) = self.create_issue_from(item, &buckets, &mut summary).await {
                tracing::error!(
                    task_id = %item.id,
                    task = %item.title,
                    error = %format!("{err:#}"),
                    "failed to create issue from task"
                );
                summary.error(None, format!("create {} from: {}", self.issues.name(), item.title));
            }
        }

        for issue in plan.unlinked_issues {
            if let Err(err) = self
                .create_item_from(issue, container_id, &mut buckets, &mut summary)
                .await
            {
                tracing::error!(
                    issue_key = %issue.key,
                    issue = %issue.summary,
                    error = %format!("{err:#}"),
                    "failed to create task from issue"
                );
                summary.error(
                    Some(issue.key.as_str()),
                    format!("create {} from: {}", self.list.name(), issue.summary),
                );
            }
        }

        for pair in plan.linked {
            if let Err(err) = self
                .sync_linked_pair(pair, container_id, &mut buckets, &mut summary)
                .await
            {
                tracing::error!(
                    task_id = %pair.list.id,
                    issue_key = %pair.issue.key,
                    error = %format!("{err:#}"),
                    "failed to sync linked pair"
                );
                summary.error(Some(pair.issue.key.as_str()), format!("sync: {}", pair.issue.summary));
            }
        }

        for (key, item) in plan.orphaned {
            tracing::warn!(
                issue_key = %key,
                task_id = %item.id,
                task = %item.title,
                "linked issue not found, skipping"
            );
        }

        Ok(summary)
    }

    async fn fetch(&self) -> Result<Snapshot, SyncError> {
        let list_side = async {
            let system = self.list.name();
            let container = self
                .list
                .find_container(&self.settings.container)
                .await
                .map_err(|source| SyncError::Container {
                    system: system.to_string(),
                    name: self.settings.container.clone(),
                    source,
                })?;
            tracing::debug!(container_id = %container.id, container = %container.name, "found container");

            let buckets = self
                .list
                .list_buckets(&container.id)
                .await
                .map_err(|source| SyncError::Buckets {
                    system: system.to_string(),
                    source,
                })?;
            let items = self
                .list
                .list_items(&container.id)
                .await
                .map_err(|source| SyncError::Items {
                    system: system.to_string(),
                    source,
                })?;

            let until = Utc::now();
            let since = until - self.settings.completed_lookback;
            let completed = match self
                .list
                .list_recently_completed(&container.id, since, until)
                .await
            {
                Ok(done) => Some(done),
                Err(err) => {
                    tracing::warn!(
                        error = %format!("{err:#}"),
                        "failed to fetch completed tasks, skipping completion sync"
                    );
                    None
                }
            };
            tracing::debug!(count = items.len(), "fetched tasks");
            Ok::<_, SyncError>((container, buckets, items, completed))
        };

        let issue_side = async {
            let issues = self
                .issues
                .search_issues(
                    &self.settings.issue_query,
                    self.settings.search_fields,
                    self.settings.max_results,
                )
                .await
                .map_err(|source| SyncError::Issues {
                    system: self.issues.name().to_string(),
                    source,
                })?;
            tracing::debug!(count = issues.len(), "fetched issues");
            Ok::<_, SyncError>(issues)
        };

        let ((container, buckets, items, completed), issues) =
            tokio::try_join!(list_side, issue_side)?;
        Ok(Snapshot {
            container,
            buckets,
            items,
            completed,
            issues,
        })
    }

    /// Move the issue of a recently completed task to the done status.
    async fn resolve_issue(&self, issue: &IssueItem, summary: &mut RunSummary) {
        tracing::info!(issue_key = %issue.key, issue = %issue.summary, "task completed, resolving issue");
        match self
            .issues
            .transition_to(&issue.key, &self.settings.done_status)
            .await
        {
            Ok(()) => summary.record(ActionKind::ResolvedIssue, Some(issue.key.as_str()), &issue.summary),
            Err(err) => {
                tracing::error!(
                    issue_key = %issue.key,
                    error = %format!("{err:#}"),
                    "failed to resolve issue"
                );
                summary.error(Some(issue.key.as_str()), format!("resolve: {}", issue.summary));
            }
        }
    }

    async fn create_issue_from(
        &self,
        item: &ListItem,
        buckets: &BucketIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let title = self.codec.strip(&item.title).to_string();
        let created = self
            .issues
            .create_issue(&NewIssue {
                project: self.settings.issue_project.clone(),
                summary: title.clone(),
                description: item.description.clone(),
                issue_type: self.settings.default_issue_type.clone(),
                due: item.due,
            })
            .await
            .context("create issue")?;
        summary.record(ActionKind::CreatedIssue, Some(created.key.as_str()), &title);
        tracing::info!(task_id = %item.id, task = %title, issue_key = %created.key, "created issue from task");

        let linked = self.codec.embed(&item.title, &created.key);
        self.list
            .update_item(
                &item.id,
                &ListItemUpdate {
                    title: Some(linked),
                    ..Default::default()
                },
            )
            .await
            .context("write issue link into task")?;

        if let Some(bucket) = item.bucket_id.as_deref().and_then(|id| buckets.name_of(id)) {
            let target = self.status_map.status_for_bucket(bucket);
            if !self
                .status_map
                .statuses_equivalent(target, &self.settings.initial_status)
            {
                if let Err(err) = self.issues.transition_to(&created.key, target).await {
                    tracing::warn!(
                        issue_key = %created.key,
                        target_status = target,
                        error = %format!("{err:#}"),
                        "failed to transition new issue"
                    );
                }
            }
        }

        self.sync_comments(&item.id, &created.key).await;
        Ok(())
    }

    async fn create_item_from(
        &self,
        issue: &IssueItem,
        container_id: &str,
        buckets: &mut BucketIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let bucket_name = self.status_map.bucket_for_status(issue.status_name());
        let bucket_id = if bucket_name.is_empty() {
            None
        } else {
            Some(self.ensure_bucket(container_id, bucket_name, buckets).await?)
        };
        let priority = list_priority(issue.priority_id.as_deref());

        let created = self
            .list
            .create_item(&NewListItem {
                title: self.codec.embed(&issue.summary, &issue.key),
                description: issue.description.clone(),
                container_id: container_id.to_string(),
                bucket_id,
                labels: vec![self.settings.sync_label.clone()],
                priority,
                due: issue.due,
            })
            .await
            .context("create task")?;
        summary.record(ActionKind::CreatedListItem, Some(issue.key.as_str()), &issue.summary);
        tracing::info!(
            issue_key = %issue.key,
            task_id = %created.id,
            issue = %issue.summary,
            priority,
            "created task from issue"
        );

        self.sync_comments(&created.id, &issue.key).await;
        Ok(())
    }

    async fn sync_linked_pair(
        &self,
        pair: LinkedPair<'_>,
        container_id: &str,
        buckets: &mut BucketIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let LinkedPair { list: item, issue } = pair;

        if issue.is_resolved() {
            tracing::info!(task_id = %item.id, issue_key = %issue.key, "issue resolved, closing task");
            self.list.close_item(&item.id).await.context("close task")?;
            summary.record(ActionKind::CompletedListItem, Some(issue.key.as_str()), &issue.summary);
            return Ok(());
        }

        if item.updated_at.is_none() {
            tracing::debug!(task_id = %item.id, "task has no usable updated timestamp, treating it as newer");
        }
        match decide_direction(item.updated_at, issue.updated_at) {
            Direction::IssueToList => {
                tracing::debug!(task_id = %item.id, issue_key = %issue.key, "issue is newer, pushing to task");
                self.push_to_list(item, issue, container_id, buckets, summary)
                    .await?;
            }
            Direction::ListToIssue => {
                tracing::debug!(task_id = %item.id, issue_key = %issue.key, "task is newer or same, pushing to issue");
                self.push_to_issue(item, issue, buckets, summary).await?;
            }
        }

        self.sync_comments(&item.id, &issue.key).await;
        Ok(())
    }

    async fn push_to_list(
        &self,
        item: &ListItem,
        issue: &IssueItem,
        container_id: &str,
        buckets: &mut BucketIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut changed = false;

        let update = list_update(item, issue, self.codec.as_ref());
        if !update.is_empty() {
            self.list
                .update_item(&item.id, &update)
                .await
                .context("update task")?;
            changed = true;
        }

        if let Some(status) = issue.status.as_ref() {
            let in_place = item
                .bucket_id
                .as_deref()
                .and_then(|id| buckets.name_of(id))
                .is_some_and(|bucket| {
                    self.status_map
                        .statuses_equivalent(self.status_map.status_for_bucket(bucket), &status.name)
                });
            if !in_place {
                let target = self.status_map.bucket_for_status(&status.name);
                let bucket_id = self.ensure_bucket(container_id, target, buckets).await?;
                self.list
                    .move_item_to_bucket(&item.id, &bucket_id)
                    .await
                    .with_context(|| format!("move task to bucket {target:?}"))?;
                changed = true;
            }
        }

        if changed {
            summary.record(ActionKind::PushedToList, Some(issue.key.as_str()), &issue.summary);
        }
        Ok(())
    }

    async fn push_to_issue(
        &self,
        item: &ListItem,
        issue: &IssueItem,
        buckets: &BucketIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut changed = false;

        let update = issue_update(item, issue, self.codec.as_ref());
        if !update.is_empty() {
            self.issues
                .update_issue(&issue.key, &update)
                .await
                .context("update issue")?;
            changed = true;
        }

        if let Some(bucket) = item.bucket_id.as_deref().and_then(|id| buckets.name_of(id)) {
            let target = self.status_map.status_for_bucket(bucket);
            if !self.status_map.statuses_equivalent(target, issue.status_name()) {
                match self.issues.transition_to(&issue.key, target).await {
                    Ok(()) => changed = true,
                    Err(err) => {
                        tracing::error!(
                            issue_key = %issue.key,
                            target_status = target,
                            error = %format!("{err:#}"),
                            "failed to transition issue"
                        );
                        summary.error(
                            Some(issue.key.as_str()),
                            format!("transition to {target}: {}", issue.summary),
                        );
                    }
                }
            }
        }

        if changed {
            summary.record(
                ActionKind::PushedToIssue,
                Some(issue.key.as_str()),
                self.codec.strip(&item.title),
            );
        }
        Ok(())
    }

    async fn ensure_bucket(
        &self,
        container_id: &str,
        name: &str,
        buckets: &mut BucketIndex,
    ) -> Result<String> {
        if let Some(id) = buckets.id_of(name) {
            return Ok(id.to_string());
        }
        let bucket = self
            .list
            .create_bucket(container_id, name)
            .await
            .with_context(|| format!("create bucket {name:?}"))?;
        tracing::info!(bucket_id = %bucket.id, bucket = %bucket.name, "created bucket");
        let id = bucket.id.clone();
        buckets.insert(bucket);
        Ok(id)
    }

    async fn sync_comments(&self, task_id: &str, key: &str) {
        if let Err(err) =
            comments::propagate(self.list.as_ref(), self.issues.as_ref(), task_id, key).await
        {
            tracing::warn!(
                task_id,
                issue_key = key,
                error = %format!("{err:#}"),
                "failed to sync comments"
            );
        }
    }
}
