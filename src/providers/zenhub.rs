//! Zenhub GraphQL client.
//!
//! All knowledge of the upstream JSON shape lives in this file: the wire
//! structs below are translated into [`WorkspaceSnapshot`] and never leak
//! past this module.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::WorkspaceSource;
use crate::config::{ZenhubConfig, DEFAULT_API_URL};
use crate::error::{Error, Result};
use crate::model::{Epic, Issue, Label, Pipeline, Sprint, WorkspaceSnapshot};

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

pub struct ZenhubClient {
    token: String,
    api_url: String,
    page_size: u32,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ZenhubClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_url: DEFAULT_API_URL.to_string(),
            page_size: 50,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(token: String, config: &ZenhubConfig) -> Self {
        Self::new(token)
            .with_api_url(config.api_url.clone())
            .with_page_size(config.page_size)
            .with_timeout(config.timeout())
            .with_retry_policy(RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.retry_base_delay(),
            })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_page_with_retry(
        &self,
        workspace_id: &str,
        after: Option<&str>,
    ) -> Result<WorkspaceNode> {
        let mut attempt = 1;
        loop {
            match self.fetch_page(workspace_id, after).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn fetch_page(&self, workspace_id: &str, after: Option<&str>) -> Result<WorkspaceNode> {
        let body = GqlRequest {
            query: QUERY,
            variables: Variables {
                workspace_id,
                first: self.page_size,
                after,
            },
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, workspace_id));
        }

        let bytes = resp.bytes().await.map_err(transport_error)?;
        let gql: GqlResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::UpstreamProtocol(format!("undecodable response body: {e}")))?;

        match gql.data {
            Some(GqlData {
                workspace: Some(ws),
            }) => Ok(ws),
            Some(GqlData { workspace: None }) => {
                Err(Error::UpstreamNotFound(workspace_id.to_string()))
            }
            None => {
                let messages: Vec<String> = gql.errors.into_iter().map(|e| e.message).collect();
                let detail = if messages.is_empty() {
                    "response has neither data nor errors".to_string()
                } else {
                    messages.join("; ")
                };
                Err(Error::UpstreamProtocol(detail))
            }
        }
    }
}

#[async_trait]
impl WorkspaceSource for ZenhubClient {
    fn name(&self) -> &str {
        "Zenhub"
    }

    #[instrument(skip(self), fields(page_size = self.page_size))]
    async fn fetch(&self, workspace_id: &str) -> Result<WorkspaceSnapshot> {
        let mut snapshot = WorkspaceSnapshot::new(workspace_id);
        let mut seen: HashSet<String> = HashSet::new();
        let mut after: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            let ws = self
                .fetch_page_with_retry(workspace_id, after.as_deref())
                .await?;

            if page == 1 {
                snapshot.name = ws.display_name;
                for p in nodes(ws.pipelines_connection) {
                    snapshot.pipelines.insert(
                        p.id.clone(),
                        Pipeline {
                            id: p.id,
                            name: p.name,
                        },
                    );
                }
            }

            let IssueConnection {
                page_info,
                nodes: issue_nodes,
            } = ws.issues;
            for node in issue_nodes {
                let issue = absorb_issue(&mut snapshot, node);
                if !issue.id.is_empty() && !seen.insert(issue.id.clone()) {
                    return Err(Error::UpstreamProtocol(format!(
                        "issue {} reported twice",
                        issue.id
                    )));
                }
                snapshot.issues.push(issue);
            }
            debug!(page, issues = snapshot.issues.len(), "page fetched");

            if !page_info.has_next_page {
                break;
            }
            match page_info.end_cursor {
                Some(cursor) if after.as_deref() != Some(cursor.as_str()) => after = Some(cursor),
                _ => {
                    return Err(Error::UpstreamProtocol(
                        "hasNextPage set without a new endCursor".into(),
                    ))
                }
            }
        }

        info!(
            pages = page,
            issues = snapshot.issues.len(),
            epics = snapshot.epics.len(),
            pipelines = snapshot.pipelines.len(),
            "workspace fetched"
        );
        Ok(snapshot)
    }
}

/// Translates one wire issue, registering its references in the side tables.
fn absorb_issue(snapshot: &mut WorkspaceSnapshot, node: IssueNode) -> Issue {
    let pipeline = node.pipeline_issue.and_then(|pi| pi.pipeline).map(|p| {
        snapshot.pipelines.entry(p.id.clone()).or_insert(Pipeline {
            id: p.id,
            name: p.name.clone(),
        });
        p.name
    });

    let epic_id = first(node.parent_zenhub_epics).map(|e| {
        snapshot.epics.entry(e.id.clone()).or_insert(Epic {
            id: e.id.clone(),
            title: e.title,
        });
        e.id
    });

    let sprint_id = first(node.sprints).map(|s| {
        snapshot.sprints.entry(s.id.clone()).or_insert(Sprint {
            id: s.id.clone(),
            name: s.name,
        });
        s.id
    });

    let labels = nodes(node.labels)
        .into_iter()
        .filter(|l| !l.name.is_empty())
        .map(|l| {
            snapshot.labels.entry(l.id.clone()).or_insert(Label {
                id: l.id,
                name: l.name.clone(),
            });
            l.name
        })
        .collect();

    Issue {
        id: node.id.unwrap_or_default(),
        number: node.number,
        title: node.title.unwrap_or_default(),
        body: node.body.filter(|b| !b.trim().is_empty()),
        pipeline,
        epic_id,
        sprint_id,
        estimate: node.estimate.map(|e| e.value),
        labels,
        assignees: nodes(node.assignees).into_iter().map(|u| u.login).collect(),
        dependencies: nodes(node.blocking_issues)
            .into_iter()
            .map(|r| r.id)
            .collect(),
    }
}

fn nodes<T>(conn: Option<Connection<T>>) -> Vec<T> {
    conn.map(|c| c.nodes).unwrap_or_default()
}

fn first<T>(conn: Option<Connection<T>>) -> Option<T> {
    nodes(conn).into_iter().next()
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamTransient(format!("request timed out: {e}"))
    } else {
        Error::UpstreamTransient(format!("request failed: {e}"))
    }
}

fn status_error(status: StatusCode, workspace_id: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::UpstreamAuth(format!("Zenhub rejected the access token ({status})"))
        }
        StatusCode::NOT_FOUND => Error::UpstreamNotFound(workspace_id.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::UpstreamTransient(format!("Zenhub returned {status}"))
        }
        s if s.is_server_error() => Error::UpstreamTransient(format!("Zenhub returned {status}")),
        _ => Error::UpstreamProtocol(format!("unexpected status {status}")),
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

const QUERY: &str = r#"query WorkspaceIssues($workspaceId: ID!, $first: Int!, $after: String) {
  workspace(id: $workspaceId) {
    id
    displayName
    pipelinesConnection(first: 100) { nodes { id name } }
    issues(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      nodes {
        id number title body
        pipelineIssue(workspaceId: $workspaceId) { pipeline { id name } }
        estimate { value }
        labels { nodes { id name } }
        assignees { nodes { login } }
        sprints(first: 1) { nodes { id name } }
        parentZenhubEpics(first: 1) { nodes { id title } }
        blockingIssues { nodes { id } }
      }
    }
  }
}"#;

#[derive(Serialize)]
struct GqlRequest<'a> {
    query: &'static str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    workspace_id: &'a str,
    first: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<&'a str>,
}

#[derive(Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Deserialize)]
struct GqlData {
    workspace: Option<WorkspaceNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceNode {
    display_name: Option<String>,
    pipelines_connection: Option<Connection<PipelineNode>>,
    issues: IssueConnection,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<IssueNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    id: Option<String>,
    number: Option<u64>,
    title: Option<String>,
    body: Option<String>,
    pipeline_issue: Option<PipelineIssueNode>,
    estimate: Option<EstimateNode>,
    labels: Option<Connection<LabelNode>>,
    assignees: Option<Connection<UserNode>>,
    sprints: Option<Connection<SprintNode>>,
    parent_zenhub_epics: Option<Connection<EpicNode>>,
    blocking_issues: Option<Connection<IssueRefNode>>,
}

#[derive(Deserialize)]
struct PipelineIssueNode {
    pipeline: Option<PipelineNode>,
}

#[derive(Deserialize)]
struct PipelineNode {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct EstimateNode {
    value: f64,
}

#[derive(Deserialize)]
struct LabelNode {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct UserNode {
    login: String,
}

#[derive(Deserialize)]
struct SprintNode {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct EpicNode {
    id: String,
    title: String,
}

#[derive(Deserialize)]
struct IssueRefNode {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ZenhubClient {
        ZenhubClient::new("tok".into())
            .with_api_url(format!("{}/graphql", server.uri()))
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            })
    }

    fn page(nodes: Value, has_next: bool, cursor: Option<&str>) -> Value {
        json!({
            "data": {
                "workspace": {
                    "id": "ws1",
                    "displayName": "Platform",
                    "pipelinesConnection": { "nodes": [
                        { "id": "p1", "name": "Backlog" },
                        { "id": "p2", "name": "Sprint Backlog" }
                    ]},
                    "issues": {
                        "pageInfo": { "hasNextPage": has_next, "endCursor": cursor },
                        "nodes": nodes
                    }
                }
            }
        })
    }

    fn issue_node(id: &str, title: &str) -> Value {
        json!({ "id": id, "number": 1, "title": title, "body": "" })
    }

    #[tokio::test]
    async fn pages_are_concatenated_in_order() {
        let server = MockServer::start().await;

        let second = json!([
            {
                "id": "i3", "number": 3, "title": "Third", "body": "Body",
                "pipelineIssue": { "pipeline": { "id": "p2", "name": "Sprint Backlog" } },
                "estimate": { "value": 5 },
                "labels": { "nodes": [ { "id": "l1", "name": "bug" } ] },
                "assignees": { "nodes": [ { "login": "amir" } ] },
                "sprints": { "nodes": [ { "id": "s1", "name": "Sprint 4" } ] },
                "parentZenhubEpics": { "nodes": [ { "id": "e1", "title": "Launch" } ] },
                "blockingIssues": { "nodes": [ { "id": "i1" }, { "id": "i2" } ] }
            }
        ]);
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "after": "c1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(second, false, None)))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        let first = json!([issue_node("i1", "First"), issue_node("i2", "Second")]);
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({ "variables": { "workspaceId": "ws1" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(first, true, Some("c1"))))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server).fetch("ws1").await.unwrap();

        let ids: Vec<&str> = snapshot.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["i1", "i2", "i3"]);
        assert_eq!(snapshot.name.as_deref(), Some("Platform"));
        assert_eq!(snapshot.pipelines.len(), 2);

        let third = &snapshot.issues[2];
        assert_eq!(third.pipeline.as_deref(), Some("Sprint Backlog"));
        assert_eq!(third.estimate, Some(5.0));
        assert_eq!(third.labels, ["bug"]);
        assert_eq!(third.assignees, ["amir"]);
        assert_eq!(third.dependencies, ["i1", "i2"]);
        assert_eq!(snapshot.epic_title("e1"), Some("Launch"));
        assert_eq!(snapshot.sprint_name("s1"), Some("Sprint 4"));
        assert!(snapshot.labels.contains_key("l1"));
        // Blank bodies are normalized away.
        assert!(snapshot.issues[0].body.is_none());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(json!([issue_node("i1", "One")]), false, None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server).fetch("ws1").await.unwrap();
        assert_eq!(snapshot.issues.len(), 1);
    }

    #[tokio::test]
    async fn persistent_server_errors_give_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamTransientError");
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamAuth(_)));
    }

    #[tokio::test]
    async fn forbidden_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamAuth(_)));
    }

    #[tokio::test]
    async fn http_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("gone").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamNotFound(ref id) if id == "gone"));
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(json!([issue_node("i1", "One")]), false, None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server).fetch("ws1").await.unwrap();
        assert_eq!(snapshot.issues.len(), 1);
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let kind = |code: u16| status_error(StatusCode::from_u16(code).unwrap(), "ws1").kind();
        assert_eq!(kind(401), "UpstreamAuthError");
        assert_eq!(kind(403), "UpstreamAuthError");
        assert_eq!(kind(404), "UpstreamNotFoundError");
        assert_eq!(kind(408), "UpstreamTransientError");
        assert_eq!(kind(429), "UpstreamTransientError");
        assert_eq!(kind(500), "UpstreamTransientError");
        assert_eq!(kind(503), "UpstreamTransientError");
        assert_eq!(kind(400), "UpstreamProtocolError");
        assert_eq!(kind(418), "UpstreamProtocolError");
    }

    #[tokio::test]
    async fn null_workspace_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "workspace": null },
                "errors": [ { "message": "Workspace not found" } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("missing").await.unwrap_err();
        assert!(matches!(err, Error::UpstreamNotFound(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamProtocolError");
    }

    #[tokio::test]
    async fn graphql_errors_without_data_are_protocol_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [ { "message": "Field 'issuez' doesn't exist" } ]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert!(err.to_string().contains("issuez"));
    }

    #[tokio::test]
    async fn next_page_without_cursor_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(json!([issue_node("i1", "One")]), true, None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("ws1").await.unwrap_err();
        assert_eq!(err.kind(), "UpstreamProtocolError");
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(json!([]), false, None))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server)
            .with_timeout(Duration::from_millis(50))
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            });
        let err = client.fetch("ws1").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
