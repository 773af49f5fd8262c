use crate::{
    adapters::{BoardSource, EventSubscriber, MoveRequest, ProjectLoader, TicketMover},
    domain::ticket::Project,
    error::{BoardError, Result},
    events::{BoardEvent, Subscription, SubscriptionParams},
    permissions::Role,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 64;
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Client for the role-scoped kanban REST API and its event stream
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    role: Role,
    token: Option<String>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, role: Role) -> Self {
        Self::with_client(Client::new(), base_url, role)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, role: Role) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            role,
            token: None,
        }
    }

    /// Sends the token as a bearer credential on every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn projects_url(&self) -> String {
        format!("{}/{}/projects", self.base_url, self.role.api_scope())
    }

    pub fn board_url(&self) -> String {
        format!("{}/{}/kanban", self.base_url, self.role.api_scope())
    }

    pub fn ticket_url(&self, ticket_id: &str) -> String {
        format!("{}/tickets/{}", self.base_url, ticket_id)
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = self.authorize(request).send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

/// Accepts `[...]`, `{data: [...]}` and `{projects: [...]}`
pub fn projects_from_response(response: Value) -> Result<Vec<Project>> {
    let list = match response {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("data")
            .filter(Value::is_array)
            .or_else(|| map.remove("projects"))
            .ok_or_else(|| BoardError::InvalidResponse("no project list in response".to_string()))?,
        other => {
            return Err(BoardError::InvalidResponse(format!(
                "unexpected project list: {}",
                other
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}

/// Flattens subscription params into query pairs; strings are sent unquoted
fn query_pairs(params: &SubscriptionParams) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[async_trait]
impl BoardSource for RestBackend {
    async fn fetch_board(&self, project_id: Option<&str>) -> anyhow::Result<Value> {
        let mut request = self.client.get(self.board_url());
        if let Some(id) = project_id {
            request = request.query(&[("projectId", id)]);
        }
        debug!(url = %self.board_url(), project = ?project_id, "fetching board");
        Ok(self.get_json(request).await?)
    }
}

#[async_trait]
impl ProjectLoader for RestBackend {
    async fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        let response = self.get_json(self.client.get(self.projects_url())).await?;
        Ok(projects_from_response(response)?)
    }
}

#[async_trait]
impl TicketMover for RestBackend {
    async fn move_ticket(&self, request: &MoveRequest) -> anyhow::Result<()> {
        let url = self.ticket_url(request.ticket.id().as_str());
        let body = json!({
            "status": request.target_status(),
            "projectId": request.project_id,
        });

        let response = self
            .authorize(self.client.put(&url).json(&body))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("Failed to move ticket ({})", status));
            anyhow::bail!(message);
        }

        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for RestBackend {
    async fn subscribe(&self, params: &SubscriptionParams) -> anyhow::Result<Subscription> {
        let request = self
            .client
            .get(self.events_url())
            .query(&query_pairs(params))
            .header(header::ACCEPT, "text/event-stream");
        let response = self.authorize(request).send().await?.error_for_status()?;

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let mut stream = Box::pin(response.bytes_stream());

        let pump = tokio::spawn(async move {
            let mut parser = SseParser::default();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "event stream failed");
                        break;
                    }
                };
                for event in parser.feed(&chunk) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            debug!("event stream closed");
        });

        Ok(Subscription::new(events).with_pump(pump))
    }
}

/// Incremental `text/event-stream` decoder.
///
/// An event's type comes from its `event:` field. Without one, a JSON
/// `data:` body carrying `type` is unwrapped (`data`/`payload` become the
/// payload); anything else is reported as `message`.
///
/// `\r\n`, `\n` and a bare `\r` all end a line. An event larger than the
/// size cap is dropped whole.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a blank line
    scanned: usize,
    /// Last byte fed was `\r`; a following `\n` belongs to the same line end
    pending_cr: bool,
    /// Skipping the rest of an oversized event
    discarding: bool,
    max_event_bytes: usize,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_event_bytes(MAX_EVENT_BYTES)
    }
}

impl SseParser {
    pub fn with_max_event_bytes(max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            pending_cr: false,
            discarding: false,
            max_event_bytes,
        }
    }

    /// Feeds raw bytes and returns every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<BoardEvent> {
        for &byte in bytes {
            if std::mem::take(&mut self.pending_cr) && byte == b'\n' {
                continue;
            }
            if byte == b'\r' {
                self.pending_cr = true;
                self.buffer.push(b'\n');
            } else {
                self.buffer.push(byte);
            }
        }

        let mut events = Vec::new();
        let mut consumed = 0;
        // a blank line may straddle the previous chunk
        let mut from = self.scanned.saturating_sub(1);
        while let Some(offset) = find_blank_line(&self.buffer[from..]) {
            let end = from + offset;
            if std::mem::take(&mut self.discarding) {
                debug!("skipped the tail of an oversized event");
            } else {
                let block = String::from_utf8_lossy(&self.buffer[consumed..end]);
                if let Some(event) = parse_block(&block) {
                    events.push(event);
                }
            }
            consumed = end + 2;
            from = consumed;
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_event_bytes {
            warn!(
                size = self.buffer.len(),
                limit = self.max_event_bytes,
                "dropping oversized event"
            );
            let ends_line = self.buffer.last() == Some(&b'\n');
            self.buffer.clear();
            if ends_line {
                self.buffer.push(b'\n');
            }
            self.discarding = true;
        }
        self.scanned = self.buffer.len();

        events
    }
}

fn find_blank_line(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<BoardEvent> {
    let mut event_name: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_name = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event_name.is_none() && data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    let body = serde_json::from_str::<Value>(&data).unwrap_or(Value::String(data));

    match event_name {
        Some(name) => Some(BoardEvent::new(name, body)),
        None => match body.get("type").and_then(Value::as_str) {
            Some(kind) => {
                let kind = kind.to_string();
                let payload = body
                    .get("data")
                    .or_else(|| body.get("payload"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Some(BoardEvent::new(kind, payload))
            }
            None => Some(BoardEvent::new("message", body)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{column::ColumnKey, drag::DragPayload, ticket::Ticket, StatusMap};
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn move_request(to: ColumnKey) -> MoveRequest {
        let ticket = Ticket::from_value(json!({ "_id": "t1", "status": "todo" })).unwrap();
        MoveRequest {
            ticket: ticket.clone(),
            from_key: ColumnKey::Todo,
            to_key: to,
            project_id: Some("p1".to_string()),
            context: DragPayload {
                ticket,
                from: ColumnKey::Todo,
                from_id: None,
            },
            to_id: None,
            status_map: StatusMap::default(),
        }
    }

    #[test]
    fn test_role_scoped_urls() {
        let backend = RestBackend::new("https://api.example.test/api/", Role::Developer);
        assert_eq!(backend.board_url(), "https://api.example.test/api/developer/kanban");
        assert_eq!(backend.projects_url(), "https://api.example.test/api/developer/projects");
        assert_eq!(backend.ticket_url("t1"), "https://api.example.test/api/tickets/t1");
        assert_eq!(backend.events_url(), "https://api.example.test/api/events");
    }

    #[test]
    fn test_projects_response_shapes() {
        let bare = projects_from_response(json!([{ "_id": "p1", "name": "Alpha" }])).unwrap();
        let data = projects_from_response(json!({ "data": [{ "_id": "p1", "name": "Alpha" }] })).unwrap();
        let named = projects_from_response(json!({ "projects": [{ "id": "p1", "name": "Alpha" }] })).unwrap();

        assert_eq!(bare, vec![Project::new("p1", "Alpha")]);
        assert_eq!(bare, data);
        assert_eq!(bare, named);
        assert!(projects_from_response(json!({ "ok": true })).is_err());
    }

    #[test]
    fn test_query_pairs() {
        let params = SubscriptionParams::new().with("projectId", "p1").with("limit", 5);
        let pairs = query_pairs(&params);
        assert!(pairs.contains(&("projectId".to_string(), "p1".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn test_sse_named_event_split_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: ticket.updated\r\nda").is_empty());

        let events = parser.feed(b"ta: {\"projectId\":\"p1\"}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ticket.updated");
        assert_eq!(events[0].project_id(), Some("p1"));
    }

    #[test]
    fn test_sse_typed_json_body() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b": keep-alive\n\ndata: {\"type\":\"kanban.refresh\",\"data\":{\"projectId\":\"p2\"}}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "kanban.refresh");
        assert_eq!(events[0].project_id(), Some("p2"));
    }

    #[test]
    fn test_sse_plain_message() {
        let mut parser = SseParser::default();
        let events = parser.feed(b"data: hello\ndata: world\n\n");
        assert_eq!(events[0].event_type, "message");
        assert_eq!(events[0].payload, json!("hello\nworld"));
    }

    #[test]
    fn test_sse_bare_cr_line_endings() {
        let mut parser = SseParser::default();
        let events = parser.feed(b"event: ticket.created\rdata: {\"projectId\":\"p1\"}\r\r");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ticket.created");
        assert_eq!(events[0].project_id(), Some("p1"));
    }

    #[test]
    fn test_sse_crlf_split_between_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"data: one\r").is_empty());
        assert!(parser.feed(b"\n").is_empty());
        assert!(parser.feed(b"data: two\r").is_empty());

        let events = parser.feed(b"\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!("one\ntwo"));
    }

    #[test]
    fn test_sse_escaped_carriage_return_in_json_kept() {
        let mut parser = SseParser::default();
        let events = parser.feed(b"event: bug.updated\ndata: {\"note\":\"a\\rb\"}\n\n");
        assert_eq!(events[0].payload["note"], json!("a\rb"));
    }

    #[test]
    fn test_sse_blank_line_split_between_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: kanban.refresh\n").is_empty());
        let events = parser.feed(b"\nevent: ticket.updated\n\n");
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["kanban.refresh", "ticket.updated"]);
    }

    #[test]
    fn test_sse_oversized_event_dropped() {
        let mut parser = SseParser::with_max_event_bytes(32);
        assert!(parser.feed(b"event: ticket.updated\ndata: ").is_empty());
        assert!(parser.feed(&[b'x'; 64]).is_empty());
        assert!(parser.buffer.len() <= 32);
        assert!(parser.feed(&[b'y'; 16]).is_empty());

        let events = parser.feed(b"\n\nevent: bug.created\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "bug.created");
        assert!(parser.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_board_sends_project_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/developer/kanban"))
            .and(query_param("projectId", "p1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "board": { "columns": {} } } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer).with_token("secret");
        let board = backend.fetch_board(Some("p1")).await.unwrap();
        assert_eq!(board, json!({ "data": { "board": { "columns": {} } } }));
    }

    #[tokio::test]
    async fn test_fetch_board_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tester/kanban"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Tester);
        assert!(backend.fetch_board(None).await.is_err());
    }

    #[tokio::test]
    async fn test_load_projects_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "_id": "p1", "id": "p1", "name": "Alpha" },
                    { "_id": "p2", "title": "Beta" }
                ]
            })))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Admin);
        let projects = backend.load_projects().await.unwrap();
        assert_eq!(
            projects,
            vec![Project::new("p1", "Alpha"), Project::new("p2", "Beta")]
        );
    }

    #[tokio::test]
    async fn test_move_ticket_puts_target_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tickets/t1"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({ "status": "review", "projectId": "p1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer).with_token("secret");
        backend
            .move_ticket(&move_request(ColumnKey::Review))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_move_ticket_failure_uses_body_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tickets/t1"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "message": "Ticket is locked" })),
            )
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer);
        let err = backend
            .move_ticket(&move_request(ColumnKey::Done))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Ticket is locked");
    }

    #[tokio::test]
    async fn test_move_ticket_failure_without_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tickets/t1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer);
        let err = backend
            .move_ticket(&move_request(ColumnKey::Done))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to move ticket (500"));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_stream_events() {
        let server = MockServer::start().await;
        let body = "event: ticket.updated\r\ndata: {\"projectId\":\"p1\"}\r\n\r\n\
                    : keep-alive\n\n\
                    data: {\"type\":\"kanban.refresh\",\"data\":{\"projectId\":\"p1\"}}\n\n";
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(query_param("projectId", "p1"))
            .and(header("accept", "text/event-stream"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer).with_token("secret");
        let params = SubscriptionParams::new().with("projectId", "p1");
        let mut subscription = backend.subscribe(&params).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.event_type, "ticket.updated");
        assert_eq!(first.project_id(), Some("p1"));

        let second = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.event_type, "kanban.refresh");

        // body fully read, the pump ends and closes the channel
        let end = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_rejected_by_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = RestBackend::new(server.uri(), Role::Developer);
        assert!(backend.subscribe(&SubscriptionParams::new()).await.is_err());
    }
}
