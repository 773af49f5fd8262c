use crate::{
    adapters::{BoardSource, MoveRequest, ProjectLoader, TicketMover},
    domain::{board::Board, ticket::Project},
    error::{BoardError, Result},
    events::{BoardEvent, LocalEventHub},
    normalize::normalize_board,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// JSON-file backend for local boards and fixtures.
///
/// Layout under the project root:
///
/// ```text
/// .kanban/
///   projects.json
///   boards/<project id>.json
/// ```
pub struct FileBackend {
    root_path: PathBuf,
    events: Option<LocalEventHub>,
}

impl FileBackend {
    const KANBAN_DIR: &'static str = ".kanban";
    const BOARDS_DIR: &'static str = "boards";
    const PROJECTS_FILE: &'static str = "projects.json";
    const DEFAULT_BOARD: &'static str = "default";
    const STATUS_FIELD: &'static str = "status";

    /// Creates a backend rooted at the given directory
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::KANBAN_DIR),
            events: None,
        }
    }

    /// Publishes `ticket.moved` on the hub after each successful move
    pub fn with_events(mut self, hub: LocalEventHub) -> Self {
        self.events = Some(hub);
        self
    }

    fn boards_dir(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_DIR)
    }

    fn projects_file(&self) -> PathBuf {
        self.root_path.join(Self::PROJECTS_FILE)
    }

    /// Board file for a project. The id becomes a file name, so it must not
    /// be empty or carry path separators or `..`.
    fn board_file(&self, project_id: Option<&str>) -> Result<PathBuf> {
        let name = project_id.unwrap_or(Self::DEFAULT_BOARD);
        if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
            return Err(BoardError::InvalidProjectId(name.to_string()));
        }
        Ok(self.boards_dir().join(format!("{}.json", name)))
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Creates the directory layout and an empty project list
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;
        self.ensure_directory_exists(&self.boards_dir()).await?;

        if !self.projects_file().exists() {
            self.save_projects(&[]).await?;
        }

        info!(path = %self.root_path.display(), "initialized file backend");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.root_path.exists() && self.projects_file().exists()
    }

    pub async fn save_projects(&self, projects: &[Project]) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;
        let json = serde_json::to_string_pretty(projects)?;
        fs::write(self.projects_file(), json).await?;
        Ok(())
    }

    pub async fn read_projects(&self) -> Result<Vec<Project>> {
        let file_path = self.projects_file();
        if !file_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&file_path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes a board in the wrapped-lane shape (`{columns: {todo: {tickets}}}`)
    pub async fn save_board(&self, project_id: Option<&str>, board: &Board) -> Result<()> {
        self.ensure_directory_exists(&self.boards_dir()).await?;
        let file_path = self.board_file(project_id)?;
        let json = serde_json::to_string_pretty(board)?;
        fs::write(file_path, json).await?;
        Ok(())
    }

    /// Writes a raw board payload verbatim, in whatever shape it has
    pub async fn save_raw_board(&self, project_id: Option<&str>, raw: &Value) -> Result<()> {
        self.ensure_directory_exists(&self.boards_dir()).await?;
        let file_path = self.board_file(project_id)?;
        let json = serde_json::to_string_pretty(raw)?;
        fs::write(file_path, json).await?;
        Ok(())
    }

    pub async fn read_board(&self, project_id: Option<&str>) -> Result<Value> {
        let file_path = self.board_file(project_id)?;

        if !file_path.exists() {
            return Err(BoardError::BoardNotFound(
                project_id.unwrap_or(Self::DEFAULT_BOARD).to_string(),
            ));
        }

        let contents = fs::read_to_string(&file_path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn apply_move(&self, request: &MoveRequest) -> Result<()> {
        let project_id = request.project_id.as_deref();
        let raw = self.read_board(project_id).await?;
        let mut board = normalize_board(&raw, None)?;

        let ticket_id = request.ticket.id();
        let mut ticket = board
            .take_ticket(request.from_key, ticket_id)
            .ok_or_else(|| BoardError::TicketNotFound(ticket_id.to_string()))?;

        ticket.set_field(Self::STATUS_FIELD, Value::from(request.target_status()));
        board.push_ticket(request.to_key, ticket);

        let board = board.with_project(request.project_id.clone());
        self.save_board(project_id, &board).await?;

        debug!(
            ticket = %ticket_id,
            from = %request.from_key,
            to = %request.to_key,
            "moved ticket"
        );

        if let Some(hub) = &self.events {
            hub.publish(BoardEvent::new(
                "ticket.moved",
                json!({
                    "projectId": request.project_id,
                    "ticketId": ticket_id.as_str(),
                    "from": request.from_key,
                    "to": request.to_key,
                }),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl BoardSource for FileBackend {
    async fn fetch_board(&self, project_id: Option<&str>) -> anyhow::Result<Value> {
        Ok(self.read_board(project_id).await?)
    }
}

#[async_trait]
impl TicketMover for FileBackend {
    async fn move_ticket(&self, request: &MoveRequest) -> anyhow::Result<()> {
        Ok(self.apply_move(request).await?)
    }
}

#[async_trait]
impl ProjectLoader for FileBackend {
    async fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        Ok(self.read_projects().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::EventSubscriber,
        domain::{column::ColumnKey, drag::DragPayload, ticket::Ticket, StatusMap},
        events::SubscriptionParams,
    };
    use tempfile::TempDir;

    fn move_request(board: &Board, from: ColumnKey, to: ColumnKey, project: &str) -> MoveRequest {
        let ticket = board.tickets(from)[0].clone();
        MoveRequest {
            ticket: ticket.clone(),
            from_key: from,
            to_key: to,
            project_id: Some(project.to_string()),
            context: DragPayload {
                ticket,
                from,
                from_id: None,
            },
            to_id: None,
            status_map: StatusMap::default(),
        }
    }

    #[tokio::test]
    async fn test_backend_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());

        assert!(!backend.is_initialized().await);

        backend.initialize().await.unwrap();

        assert!(backend.is_initialized().await);
        assert!(backend.boards_dir().exists());
        assert!(backend.load_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_projects_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let projects = vec![Project::new("p1", "Alpha"), Project::new("p2", "Beta")];
        backend.save_projects(&projects).await.unwrap();

        assert_eq!(backend.load_projects().await.unwrap(), projects);
    }

    #[tokio::test]
    async fn test_missing_board() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let err = backend.fetch_board(Some("nope")).await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_project_id_cannot_escape_boards_dir() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let raw = json!({ "columns": {} });
        for id in ["../projects", "a/b", "..", "a\\b", ""] {
            let err = backend.save_raw_board(Some(id), &raw).await.unwrap_err();
            assert!(matches!(err, BoardError::InvalidProjectId(_)), "{id}");
            assert!(backend.fetch_board(Some(id)).await.is_err());
        }

        // projects.json is untouched
        assert!(backend.read_projects().await.unwrap().is_empty());
        assert!(!temp_dir.path().join(".kanban/b.json").exists());
    }

    #[tokio::test]
    async fn test_raw_board_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let raw = json!({ "data": { "board": { "columns": [{ "name": "QA", "tickets": [{ "_id": "t1" }] }] } } });
        backend.save_raw_board(Some("p1"), &raw).await.unwrap();

        let fetched = backend.fetch_board(Some("p1")).await.unwrap();
        let board = normalize_board(&fetched, None).unwrap();
        assert_eq!(board.tickets(ColumnKey::Testing).len(), 1);
    }

    #[tokio::test]
    async fn test_move_rewrites_status_and_lane() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let raw = json!({ "columns": { "todo": [{ "_id": "t1", "status": "todo", "title": "Login" }] } });
        backend.save_raw_board(Some("p1"), &raw).await.unwrap();
        let board = normalize_board(&raw, None).unwrap();

        let request = move_request(&board, ColumnKey::Todo, ColumnKey::Review, "p1");
        backend.move_ticket(&request).await.unwrap();

        let reloaded = normalize_board(&backend.fetch_board(Some("p1")).await.unwrap(), None).unwrap();
        assert!(reloaded.tickets(ColumnKey::Todo).is_empty());

        let moved: &Ticket = &reloaded.tickets(ColumnKey::Review)[0];
        assert_eq!(moved.id().as_str(), "t1");
        assert_eq!(moved.field("status"), Some(&json!("review")));
        assert_eq!(moved.title(), "Login");
        assert_eq!(reloaded.project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_move_unknown_ticket_fails() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path());
        backend.initialize().await.unwrap();

        let raw = json!({ "columns": { "todo": [{ "_id": "t1" }] } });
        backend.save_raw_board(Some("p1"), &raw).await.unwrap();
        let board = normalize_board(&raw, None).unwrap();

        // ticket sits in todo, request claims it is in review
        let mut request = move_request(&board, ColumnKey::Todo, ColumnKey::Done, "p1");
        request.from_key = ColumnKey::Review;

        let err = backend.move_ticket(&request).await.unwrap_err();
        assert!(err.to_string().contains("t1"));
    }

    #[tokio::test]
    async fn test_move_publishes_event() {
        let temp_dir = TempDir::new().unwrap();
        let hub = LocalEventHub::default();
        let backend = FileBackend::new(temp_dir.path()).with_events(hub.clone());
        backend.initialize().await.unwrap();

        let raw = json!({ "columns": { "inProgress": [{ "_id": "t1" }] } });
        backend.save_raw_board(Some("p1"), &raw).await.unwrap();
        let board = normalize_board(&raw, None).unwrap();

        let params = SubscriptionParams::new().with("projectId", "p1");
        let mut subscription = hub.subscribe(&params).await.unwrap();

        let request = move_request(&board, ColumnKey::InProgress, ColumnKey::Testing, "p1");
        backend.move_ticket(&request).await.unwrap();

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.event_type, "ticket.moved");
        assert_eq!(event.payload["to"], json!("testing"));
        assert_eq!(event.payload["ticketId"], json!("t1"));
    }
}
