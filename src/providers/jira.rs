use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{check_status, IssueSystem};
use crate::model::issue::{
    CreatedIssue, IssueItem, IssueStatus, IssueUpdate, NewIssue, Transition,
};
use crate::model::Comment;
use crate::util::adf::{adf_to_text, text_to_adf};

/// Custom field carrying sprint membership on Jira Cloud.
pub const SPRINT_FIELD: &str = "customfield_10020";

/// Fields requested by the sync engine's search.
pub const SEARCH_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "updated",
    "duedate",
    "priority",
    "resolution",
    SPRINT_FIELD,
];

const PAGE_SIZE: usize = 100;

pub struct JiraClient {
    base_url: String,
    auth_header: String,
    client: reqwest::Client,
}

impl JiraClient {
    /// `base_url` is the site root, e.g. `https://acme.atlassian.net`.
    pub fn new(base_url: String, email: String, api_token: String) -> Self {
        let creds = format!("{email}:{api_token}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/rest/api/3{path}", self.base_url)
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let resp = req
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Jira {what} request failed"))?;
        check_status("Jira", resp).await
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder, what: &str) -> Result<T> {
        self.send(req, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Jira {what} response"))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
    next_page_token: Option<String>,
    #[serde(default)]
    is_last: Option<bool>,
}

#[derive(Deserialize)]
struct JiraIssue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<Value>,
    status: Option<StatusField>,
    priority: Option<PriorityField>,
    duedate: Option<String>,
    updated: Option<String>,
    resolution: Option<ResolutionField>,
    /// Shape varies between sites, so it is inspected loosely.
    #[serde(rename = "customfield_10020")]
    sprints: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusField {
    name: String,
    status_category: Option<StatusCategory>,
}

#[derive(Deserialize)]
struct StatusCategory {
    key: String,
}

#[derive(Deserialize)]
struct PriorityField {
    id: String,
}

#[derive(Deserialize)]
struct ResolutionField {
    name: String,
}

#[derive(Deserialize)]
struct TransitionsResponse {
    transitions: Vec<JiraTransition>,
}

#[derive(Deserialize)]
struct JiraTransition {
    id: String,
    name: String,
    to: TransitionTarget,
}

#[derive(Deserialize)]
struct TransitionTarget {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentPage {
    comments: Vec<JiraComment>,
    total: usize,
}

#[derive(Deserialize)]
struct JiraComment {
    id: String,
    author: Option<Author>,
    body: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    display_name: String,
}

/// Parse Jira's `2024-01-31T10:00:00.000+0000` form, falling back to RFC 3339.
pub fn parse_jira_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

impl From<JiraIssue> for IssueItem {
    fn from(issue: JiraIssue) -> Self {
        let f = issue.fields;
        let updated_at = f.updated.as_deref().and_then(|raw| {
            let parsed = parse_jira_timestamp(raw);
            if parsed.is_none() {
                tracing::warn!(issue_key = %issue.key, raw, "could not parse jira updated timestamp");
            }
            parsed
        });
        IssueItem {
            summary: f.summary.unwrap_or_default(),
            description: f.description.as_ref().map(adf_to_text).unwrap_or_default(),
            due: f
                .duedate
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            status: f.status.map(|s| IssueStatus {
                terminal: s.status_category.is_some_and(|c| c.key == "done"),
                name: s.name,
            }),
            resolution: f.resolution.map(|r| r.name),
            priority_id: f.priority.map(|p| p.id),
            updated_at,
            in_active_sprint: f.sprints.as_ref().is_some_and(has_active_sprint),
            key: issue.key,
        }
    }
}

impl From<JiraComment> for Comment {
    fn from(c: JiraComment) -> Self {
        Comment {
            id: c.id,
            author: c.author.map(|a| a.display_name),
            body: c.body.as_ref().map(adf_to_text).unwrap_or_default(),
        }
    }
}

fn has_active_sprint(sprints: &Value) -> bool {
    sprints
        .as_array()
        .is_some_and(|list| list.iter().any(|s| s.get("state").and_then(Value::as_str) == Some("active")))
}

fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

#[async_trait]
impl IssueSystem for JiraClient {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn search_issues(
        &self,
        query: &str,
        fields: &[&str],
        max_results: usize,
    ) -> Result<Vec<IssueItem>> {
        let fields = fields.join(",");
        let mut issues = Vec::new();
        let mut token: Option<String> = None;
        while issues.len() < max_results {
            let page_size = (max_results - issues.len()).min(PAGE_SIZE).to_string();
            let mut params = vec![
                ("jql", query),
                ("maxResults", page_size.as_str()),
            ];
            if !fields.is_empty() {
                params.push(("fields", fields.as_str()));
            }
            if let Some(t) = token.as_deref() {
                params.push(("nextPageToken", t));
            }
            let req = self.client.get(self.api("/search/jql")).query(&params);
            let page: SearchResponse = self.send_json(req, "search").await?;
            let done = page.is_last.unwrap_or(page.next_page_token.is_none());
            issues.extend(page.issues.into_iter().map(IssueItem::from));
            match page.next_page_token {
                Some(next) if !done => token = Some(next),
                _ => break,
            }
        }
        issues.truncate(max_results);
        Ok(issues)
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<CreatedIssue> {
        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": issue.project }));
        fields.insert("summary".into(), json!(issue.summary));
        fields.insert("issuetype".into(), json!({ "name": issue.issue_type }));
        if let Some(doc) = text_to_adf(&issue.description) {
            fields.insert("description".into(), doc);
        }
        if let Some(due) = issue.due {
            fields.insert("duedate".into(), date_value(due));
        }
        let req = self
            .client
            .post(self.api("/issue"))
            .json(&json!({ "fields": fields }));
        self.send_json(req, "create issue").await
    }

    async fn update_issue(&self, key: &str, update: &IssueUpdate) -> Result<()> {
        let mut fields = Map::new();
        if let Some(summary) = &update.summary {
            fields.insert("summary".into(), json!(summary));
        }
        if let Some(description) = &update.description {
            fields.insert(
                "description".into(),
                text_to_adf(description).unwrap_or(Value::Null),
            );
        }
        if let Some(due) = update.due {
            fields.insert("duedate".into(), date_value(due));
        }
        let req = self
            .client
            .put(self.api(&format!("/issue/{}", urlencoding::encode(key))))
            .json(&json!({ "fields": fields }));
        self.send(req, "update issue").await?;
        Ok(())
    }

    async fn list_transitions(&self, key: &str) -> Result<Vec<Transition>> {
        let req = self
            .client
            .get(self.api(&format!("/issue/{}/transitions", urlencoding::encode(key))));
        let resp: TransitionsResponse = self.send_json(req, "get transitions").await?;
        Ok(resp
            .transitions
            .into_iter()
            .map(|t| Transition {
                id: t.id,
                name: t.name,
                to: t.to.name,
            })
            .collect())
    }

    async fn apply_transition(&self, key: &str, transition: &Transition) -> Result<()> {
        let req = self
            .client
            .post(self.api(&format!("/issue/{}/transitions", urlencoding::encode(key))))
            .json(&json!({ "transition": { "id": transition.id } }));
        self.send(req, "do transition").await?;
        Ok(())
    }

    async fn list_comments(&self, key: &str) -> Result<Vec<Comment>> {
        let path = self.api(&format!("/issue/{}/comment", urlencoding::encode(key)));
        let mut all = Vec::new();
        loop {
            let start_at = all.len().to_string();
            let req = self
                .client
                .get(&path)
                .query(&[("startAt", start_at.as_str()), ("maxResults", "100")]);
            let page: CommentPage = self.send_json(req, "get comments").await?;
            let fetched = page.comments.len();
            all.extend(page.comments.into_iter().map(Comment::from));
            if fetched == 0 || all.len() >= page.total {
                break;
            }
        }
        Ok(all)
    }

    async fn create_comment(&self, key: &str, body: &str) -> Result<Comment> {
        let doc = text_to_adf(body).context("refusing to post an empty comment")?;
        let req = self
            .client
            .post(self.api(&format!("/issue/{}/comment", urlencoding::encode(key))))
            .json(&json!({ "body": doc }));
        let comment: JiraComment = self.send_json(req, "add comment").await?;
        Ok(comment.into())
    }
}
