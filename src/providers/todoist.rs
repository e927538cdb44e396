use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{check_status, ListSystem};
use crate::model::list_item::{ListItem, ListItemUpdate, NewListItem};
use crate::model::{Bucket, Comment, Container};

const BASE_URL: &str = "https://api.todoist.com/api/v1";

pub struct TodoistClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl TodoistClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(BASE_URL.into(), token)
    }

    pub fn with_base_url(base_url: String, token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .query(query)
            .send()
            .await
            .with_context(|| format!("Todoist GET {path} failed"))?;
        let resp = check_status("Todoist", resp).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse Todoist response for {path}"))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("X-Request-Id", Uuid::new_v4().to_string());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("Todoist POST {path} failed"))?;
        check_status("Todoist", resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.post(path, Some(body))
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Todoist response for {path}"))
    }

    /// Fetch every page of a cursor-paginated list endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut params = query.to_vec();
            if let Some(c) = cursor.as_deref() {
                params.push(("cursor", c));
            }
            let page: Page<T> = self.get_json(path, &params).await?;
            all.extend(page.results);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(all)
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(alias = "items")]
    results: Vec<T>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Section {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Due {
    date: String,
}

#[derive(Deserialize)]
struct Task {
    id: String,
    content: String,
    #[serde(default)]
    description: String,
    section_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default = "default_priority")]
    priority: u8,
    due: Option<Due>,
    updated_at: Option<String>,
    #[serde(default)]
    checked: bool,
}

fn default_priority() -> u8 {
    1
}

#[derive(Deserialize)]
struct TodoistComment {
    id: String,
    content: String,
    posted_uid: Option<String>,
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    content: &'a str,
    description: &'a str,
    project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    section_id: Option<&'a str>,
    labels: &'a [String],
    priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
}

#[derive(Serialize)]
struct UpdateTaskRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
}

/// Parse a due date, tolerating datetime values by keeping the date part.
fn parse_due(due: &Due) -> Option<NaiveDate> {
    let date = due.date.get(..10).unwrap_or(&due.date);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

impl From<Task> for ListItem {
    fn from(task: Task) -> Self {
        let updated_at = task.updated_at.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                tracing::warn!(task_id = %task.id, raw, "could not parse todoist updated_at");
            }
            parsed
        });
        ListItem {
            due: task.due.as_ref().and_then(parse_due),
            bucket_id: task.section_id.filter(|s| !s.is_empty()),
            id: task.id,
            title: task.content,
            description: task.description,
            labels: task.labels,
            priority: task.priority,
            updated_at,
            completed: task.checked,
        }
    }
}

impl From<TodoistComment> for Comment {
    fn from(c: TodoistComment) -> Self {
        Comment {
            id: c.id,
            author: c.posted_uid,
            body: c.content,
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl ListSystem for TodoistClient {
    fn name(&self) -> &str {
        "Todoist"
    }

    async fn find_container(&self, name: &str) -> Result<Container> {
        let projects: Vec<Project> = self.get_all("/projects", &[]).await?;
        projects
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Container { id: p.id, name: p.name })
            .with_context(|| format!("todoist project {name:?} not found"))
    }

    async fn list_buckets(&self, container_id: &str) -> Result<Vec<Bucket>> {
        let sections: Vec<Section> = self
            .get_all("/sections", &[("project_id", container_id)])
            .await?;
        Ok(sections
            .into_iter()
            .map(|s| Bucket { id: s.id, name: s.name })
            .collect())
    }

    async fn create_bucket(&self, container_id: &str, name: &str) -> Result<Bucket> {
        let body = serde_json::json!({ "project_id": container_id, "name": name });
        let section: Section = self.post_json("/sections", &body).await?;
        Ok(Bucket {
            id: section.id,
            name: section.name,
        })
    }

    async fn list_items(&self, container_id: &str) -> Result<Vec<ListItem>> {
        let tasks: Vec<Task> = self
            .get_all("/tasks", &[("project_id", container_id)])
            .await?;
        Ok(tasks.into_iter().map(ListItem::from).collect())
    }

    async fn list_recently_completed(
        &self,
        container_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ListItem>> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let until = until.to_rfc3339_opts(SecondsFormat::Secs, true);
        let tasks: Vec<Task> = self
            .get_all(
                "/tasks/completed/by_completion_date",
                &[
                    ("project_id", container_id),
                    ("since", &since),
                    ("until", &until),
                ],
            )
            .await?;
        Ok(tasks
            .into_iter()
            .map(|t| ListItem {
                completed: true,
                ..ListItem::from(t)
            })
            .collect())
    }

    async fn create_item(&self, item: &NewListItem) -> Result<ListItem> {
        let req = CreateTaskRequest {
            content: &item.title,
            description: &item.description,
            project_id: &item.container_id,
            section_id: item.bucket_id.as_deref(),
            labels: &item.labels,
            priority: item.priority,
            due_date: item.due.map(format_date),
        };
        let task: Task = self.post_json("/tasks", &req).await?;
        Ok(task.into())
    }

    async fn update_item(&self, id: &str, update: &ListItemUpdate) -> Result<ListItem> {
        let req = UpdateTaskRequest {
            content: update.title.as_deref(),
            description: update.description.as_deref(),
            due_date: update.due.map(format_date),
        };
        let path = format!("/tasks/{}", urlencoding::encode(id));
        let task: Task = self.post_json(&path, &req).await?;
        Ok(task.into())
    }

    async fn close_item(&self, id: &str) -> Result<()> {
        let path = format!("/tasks/{}/close", urlencoding::encode(id));
        self.post::<()>(&path, None).await?;
        Ok(())
    }

    async fn move_item_to_bucket(&self, id: &str, bucket_id: &str) -> Result<()> {
        let path = format!("/tasks/{}/move", urlencoding::encode(id));
        let body = serde_json::json!({ "section_id": bucket_id });
        self.post(&path, Some(&body)).await?;
        Ok(())
    }

    async fn list_comments(&self, item_id: &str) -> Result<Vec<Comment>> {
        let comments: Vec<TodoistComment> = self
            .get_all("/comments", &[("task_id", item_id)])
            .await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn create_comment(&self, item_id: &str, body: &str) -> Result<Comment> {
        let req = serde_json::json!({ "task_id": item_id, "content": body });
        let comment: TodoistComment = self.post_json("/comments", &req).await?;
        Ok(comment.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> TodoistClient {
        TodoistClient::with_base_url(server.base_url(), "secret".into())
    }

    #[tokio::test]
    async fn find_container_follows_cursor() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET).path("/projects").query_param("cursor", "abc");
                then.status(200).json_body(json!({
                    "results": [{ "id": "2", "name": "Work" }],
                    "next_cursor": null
                }));
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/projects")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({
                    "results": [{ "id": "1", "name": "Inbox" }],
                    "next_cursor": "abc"
                }));
            })
            .await;

        let project = client(&server).find_container("Work").await.unwrap();
        assert_eq!(project.id, "2");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn missing_container_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/projects");
                then.status(200).json_body(json!({ "results": [], "next_cursor": null }));
            })
            .await;

        let err = client(&server).find_container("Work").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn tasks_map_to_list_items() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tasks").query_param("project_id", "p1");
                then.status(200).json_body(json!({
                    "results": [{
                        "id": "t1",
                        "content": "Fix bug",
                        "description": "details",
                        "section_id": "s1",
                        "labels": ["jira-sync"],
                        "priority": 3,
                        "due": { "date": "2026-12-25T10:00:00", "string": "xmas", "is_recurring": false },
                        "updated_at": "2026-01-02T03:04:05.123456Z",
                        "checked": false
                    }, {
                        "id": "t2",
                        "content": "No section",
                        "section_id": null,
                        "updated_at": "garbage"
                    }],
                    "next_cursor": null
                }));
            })
            .await;

        let items = client(&server).list_items("p1").await.unwrap();
        assert_eq!(items.len(), 2);
        let first = &items[0];
        assert_eq!(first.title, "Fix bug");
        assert_eq!(first.bucket_id.as_deref(), Some("s1"));
        assert_eq!(first.due, NaiveDate::from_ymd_opt(2026, 12, 25));
        assert_eq!(first.priority, 3);
        assert!(first.has_label("jira-sync"));
        assert!(first.updated_at.is_some());

        let second = &items[1];
        assert_eq!(second.bucket_id, None);
        assert_eq!(second.priority, 1);
        assert_eq!(second.updated_at, None);
    }

    #[tokio::test]
    async fn completed_tasks_read_items_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/tasks/completed/by_completion_date")
                    .query_param("project_id", "p1")
                    .query_param("since", "2026-01-01T00:00:00Z");
                then.status(200).json_body(json!({
                    "items": [{ "id": "t9", "content": "[DX-1](https://x/browse/DX-1) Done thing" }],
                    "next_cursor": null
                }));
            })
            .await;

        let since = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let until = since + chrono::Duration::hours(72);
        let items = client(&server)
            .list_recently_completed("p1", since, until)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].completed);
    }

    #[tokio::test]
    async fn update_sends_only_set_fields() {
        let server = MockServer::start_async().await;
        let update = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tasks/t1")
                    .header_exists("X-Request-Id")
                    .json_body(json!({ "content": "New title" }));
                then.status(200).json_body(json!({ "id": "t1", "content": "New title" }));
            })
            .await;

        let item = client(&server)
            .update_item(
                "t1",
                &ListItemUpdate {
                    title: Some("New title".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(item.title, "New title");
        update.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tasks/t1/close");
                then.status(403).body("forbidden");
            })
            .await;

        let err = client(&server).close_item("t1").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("403"), "{msg}");
        assert!(msg.contains("forbidden"), "{msg}");
    }

    #[tokio::test]
    async fn create_item_posts_labels_and_section() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/tasks").json_body(json!({
                    "content": "[DX-7](https://acme/browse/DX-7) Ship it",
                    "description": "",
                    "project_id": "p1",
                    "section_id": "s2",
                    "labels": ["jira-sync"],
                    "priority": 4,
                    "due_date": "2026-11-15"
                }));
                then.status(200).json_body(json!({
                    "id": "t5",
                    "content": "[DX-7](https://acme/browse/DX-7) Ship it",
                    "section_id": "s2"
                }));
            })
            .await;

        let item = client(&server)
            .create_item(&NewListItem {
                title: "[DX-7](https://acme/browse/DX-7) Ship it".into(),
                description: String::new(),
                container_id: "p1".into(),
                bucket_id: Some("s2".into()),
                labels: vec!["jira-sync".into()],
                priority: 4,
                due: NaiveDate::from_ymd_opt(2026, 11, 15),
            })
            .await
            .unwrap();
        assert_eq!(item.id, "t5");
        create.assert_async().await;
    }
}
