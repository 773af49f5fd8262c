//! The board controller: owns board state and drives the data adapters.

use crate::{
    adapters::{BoardSource, EventSubscriber, MoveRequest, ProjectLoader, TicketMover},
    config::BoardConfig,
    domain::{
        board::Board,
        drag::{check_forward_move, DragContext, DragPayload, DropOutcome, DropTarget, IgnoreReason},
        ticket::Project,
    },
    error::Result,
    events::{BoardEvent, SseParams, Subscription, SubscriptionParams},
    normalize::{normalize_board, NormalizeFn},
    permissions::{AllowAll, Permissions},
    view::{BoardView, ColumnView, DefaultTicketCard, ProjectSelector, TicketCard, TicketRenderer, ToolbarAction},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Host hooks for lifecycle and toolbar actions. All methods default to no-ops.
pub trait BoardCallbacks: Send + Sync {
    fn on_create_board(&self, _project_id: Option<&str>) {}
    fn on_add_module(&self, _project_id: Option<&str>) {}
    fn on_add_ticket(&self, _project_id: Option<&str>) {}
    fn on_column_settings(&self, _project_id: Option<&str>) {}
    fn on_project_change(&self, _project_id: Option<&str>) {}
    fn on_ticket_updated(&self, _event: &BoardEvent) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl BoardCallbacks for NoCallbacks {}

/// Everything the board displays or remembers between interactions
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    pub projects: Vec<Project>,
    pub project_id: Option<String>,
    pub board: Board,
    pub loading: bool,
    pub error: Option<String>,
    pub drag: Option<DragContext>,
    pub refresh_key: Option<String>,
    pub last_loaded_at: Option<DateTime<Utc>>,
}

struct ActiveSubscription {
    signature: String,
    subscription: Subscription,
}

/// Union of two project lists by id; entries from `incoming` replace
/// existing ones and new ids are appended in order
fn merge_projects(known: &mut Vec<Project>, incoming: Vec<Project>) {
    for project in incoming {
        match known.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project,
            None => known.push(project),
        }
    }
}

fn error_message(err: &anyhow::Error, fallback: &str) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub struct KanbanBoardBuilder {
    source: Arc<dyn BoardSource>,
    mover: Arc<dyn TicketMover>,
    project_loader: Option<Arc<dyn ProjectLoader>>,
    subscriber: Option<Arc<dyn EventSubscriber>>,
    sse_params: SseParams,
    normalizer: Option<NormalizeFn>,
    permissions: Arc<dyn Permissions>,
    callbacks: Arc<dyn BoardCallbacks>,
    renderer: Arc<dyn TicketRenderer>,
    config: BoardConfig,
    initial_project_id: Option<String>,
    refresh_key: Option<String>,
}

impl KanbanBoardBuilder {
    pub fn config(mut self, config: BoardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn project_loader(mut self, loader: Arc<dyn ProjectLoader>) -> Self {
        self.project_loader = Some(loader);
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    pub fn sse_params(mut self, params: SseParams) -> Self {
        self.sse_params = params;
        self
    }

    pub fn normalizer(mut self, normalizer: NormalizeFn) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn Permissions>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<dyn BoardCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TicketRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Project to open first. An empty id means "none selected".
    pub fn initial_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.initial_project_id = non_empty(project_id.into());
        self
    }

    pub fn refresh_key(mut self, key: impl Into<String>) -> Self {
        self.refresh_key = Some(key.into());
        self
    }

    pub fn build(self) -> Result<KanbanBoard> {
        self.config.validate()?;

        Ok(KanbanBoard {
            source: self.source,
            mover: self.mover,
            project_loader: self.project_loader,
            subscriber: self.subscriber,
            sse_params: self.sse_params,
            normalizer: self.normalizer,
            permissions: self.permissions,
            callbacks: self.callbacks,
            renderer: self.renderer,
            config: self.config,
            state: BoardState {
                project_id: self.initial_project_id,
                refresh_key: self.refresh_key,
                ..BoardState::default()
            },
            subscription: None,
        })
    }
}

/// A five-lane kanban board bound to caller-supplied data adapters.
///
/// The board never persists anything itself: it fetches through
/// [`BoardSource`], moves through [`TicketMover`] and reloads after every
/// change. Adapter errors end up in [`BoardState::error`]; they are never
/// returned to the caller.
pub struct KanbanBoard {
    source: Arc<dyn BoardSource>,
    mover: Arc<dyn TicketMover>,
    project_loader: Option<Arc<dyn ProjectLoader>>,
    subscriber: Option<Arc<dyn EventSubscriber>>,
    sse_params: SseParams,
    normalizer: Option<NormalizeFn>,
    permissions: Arc<dyn Permissions>,
    callbacks: Arc<dyn BoardCallbacks>,
    renderer: Arc<dyn TicketRenderer>,
    config: BoardConfig,
    state: BoardState,
    subscription: Option<ActiveSubscription>,
}

impl KanbanBoard {
    pub fn builder(source: Arc<dyn BoardSource>, mover: Arc<dyn TicketMover>) -> KanbanBoardBuilder {
        KanbanBoardBuilder {
            source,
            mover,
            project_loader: None,
            subscriber: None,
            sse_params: SseParams::default(),
            normalizer: None,
            permissions: Arc::new(AllowAll),
            callbacks: Arc::new(NoCallbacks),
            renderer: Arc::new(DefaultTicketCard),
            config: BoardConfig::default(),
            initial_project_id: None,
            refresh_key: None,
        }
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.state.board
    }

    pub fn project_id(&self) -> Option<&str> {
        self.state.project_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn can_edit(&self) -> bool {
        self.permissions.can_edit_board()
    }

    /// Signature of the live push subscription, if any
    pub fn subscription_signature(&self) -> Option<&str> {
        self.subscription.as_ref().map(|active| active.signature.as_str())
    }

    /// Loads projects (selecting the first when none is chosen), then the
    /// board, then opens the push subscription. A project-list failure stays
    /// in `error` even when the board itself loads.
    pub async fn mount(&mut self) {
        let project_error = match self.project_loader.clone() {
            Some(loader) => self.load_projects(loader.as_ref()).await,
            None => None,
        };
        if self.refresh().await && project_error.is_some() {
            self.state.error = project_error;
        }
        self.sync_subscription().await;
    }

    /// Drops the push subscription and any pending drag
    pub fn unmount(&mut self) {
        if self.subscription.take().is_some() {
            debug!("closed board event subscription");
        }
        self.state.drag = None;
    }

    async fn load_projects(&mut self, loader: &dyn ProjectLoader) -> Option<String> {
        self.state.loading = true;
        let failure = match loader.load_projects().await {
            Ok(projects) => {
                info!(count = projects.len(), "loaded projects");
                merge_projects(&mut self.state.projects, projects);
                if self.state.project_id.is_none() {
                    self.state.project_id = self.state.projects.first().map(|p| p.id.clone());
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to load projects");
                let message = error_message(&e, "Failed to load projects");
                self.state.error = Some(message.clone());
                Some(message)
            }
        };
        self.state.loading = false;
        failure
    }

    /// Fetches and replaces the board. On failure the previous board stays
    /// and the message is stored in `error`. Returns whether it succeeded.
    pub async fn refresh(&mut self) -> bool {
        let project_id = self.state.project_id.clone();
        self.state.loading = true;
        debug!(project = ?project_id, "fetching board");

        let result = match self.source.fetch_board(project_id.as_deref()).await {
            Ok(raw) => normalize_board(&raw, self.normalizer.as_ref()).map_err(|e| e.to_string()),
            Err(e) => Err(error_message(&e, "Failed to load board")),
        };
        self.state.loading = false;

        match result {
            Ok(board) => {
                self.apply_board(board);
                true
            }
            Err(message) => {
                warn!(project = ?project_id, error = %message, "board fetch failed");
                self.state.error = Some(message);
                false
            }
        }
    }

    fn apply_board(&mut self, board: Board) {
        if !board.available_projects.is_empty() {
            merge_projects(&mut self.state.projects, board.available_projects.clone());
        }
        if self.state.project_id.is_none() {
            self.state.project_id = board.project_id.clone();
        }
        debug!(tickets = board.total_tickets(), "board loaded");
        self.state.board = board;
        self.state.error = None;
        self.state.last_loaded_at = Some(Utc::now());
    }

    /// Switches to another project. The old board and drag are discarded.
    pub async fn select_project(&mut self, project_id: impl Into<String>) {
        let next = non_empty(project_id.into());
        if next == self.state.project_id {
            return;
        }

        info!(project = ?next, "switching project");
        self.state.project_id = next;
        self.state.board = Board::empty();
        self.state.drag = None;
        self.callbacks.on_project_change(self.state.project_id.as_deref());

        self.refresh().await;
        self.sync_subscription().await;
    }

    /// Reloads the board when the key differs from the previous one
    pub async fn set_refresh_key(&mut self, key: impl Into<String>) {
        let key = Some(key.into());
        if key != self.state.refresh_key {
            self.state.refresh_key = key;
            self.refresh().await;
        }
    }

    /// Starts dragging a card. Returns false when the user may not edit.
    /// A new drag replaces any earlier one.
    pub fn drag_start(&mut self, payload: DragPayload) -> bool {
        if !self.can_edit() {
            return false;
        }
        debug!(ticket = %payload.ticket.id(), from = %payload.from, "drag started");
        self.state.drag = Some(payload);
        true
    }

    /// Drops the dragged card on a column.
    ///
    /// Only strictly forward moves reach the [`TicketMover`]. A successful
    /// move clears the error and reloads the board once.
    pub async fn drop(&mut self, target: DropTarget) -> DropOutcome {
        let Some(context) = self.state.drag.take() else {
            return DropOutcome::Ignored(IgnoreReason::NoActiveDrag);
        };
        if !self.can_edit() {
            return DropOutcome::Ignored(IgnoreReason::ReadOnly);
        }
        if context.from == target.key {
            return DropOutcome::Ignored(IgnoreReason::SameColumn);
        }

        if let Err(e) = check_forward_move(context.from, target.key) {
            let message = e.to_string();
            debug!(from = %context.from, to = %target.key, "rejected backward move");
            self.state.error = Some(message.clone());
            return DropOutcome::Rejected(message);
        }

        let (from, to) = (context.from, target.key);
        let request = MoveRequest {
            ticket: context.ticket.clone(),
            from_key: from,
            to_key: to,
            project_id: self.state.project_id.clone(),
            context,
            to_id: target.id,
            status_map: self.config.status_map.clone(),
        };

        match self.mover.move_ticket(&request).await {
            Ok(()) => {
                info!(ticket = %request.ticket.id(), %from, %to, "ticket moved");
                self.state.error = None;
                self.refresh().await;
                DropOutcome::Moved { from, to }
            }
            Err(e) => {
                let message = error_message(&e, "Failed to move ticket");
                warn!(ticket = %request.ticket.id(), error = %message, "ticket move failed");
                self.state.error = Some(message.clone());
                DropOutcome::Failed(message)
            }
        }
    }

    /// Runs a toolbar action. Refresh reloads the board; the others hand the
    /// current project to the matching callback.
    pub async fn trigger(&mut self, action: ToolbarAction) {
        if action == ToolbarAction::Refresh {
            self.refresh().await;
            return;
        }

        let project_id = self.state.project_id.as_deref();
        match action {
            ToolbarAction::CreateBoard => self.callbacks.on_create_board(project_id),
            ToolbarAction::AddModule => self.callbacks.on_add_module(project_id),
            ToolbarAction::AddTicket => self.callbacks.on_add_ticket(project_id),
            ToolbarAction::ColumnSettings => self.callbacks.on_column_settings(project_id),
            ToolbarAction::Refresh => {}
        }
    }

    /// Makes the live subscription match the current parameters. An
    /// unchanged signature keeps the existing stream.
    pub async fn sync_subscription(&mut self) {
        let Some(subscriber) = self.subscriber.clone() else {
            return;
        };

        let params = self.sse_params.resolve(self.state.project_id.as_deref());
        let signature = params.as_ref().map(SubscriptionParams::signature);
        if signature.as_deref() == self.subscription_signature() {
            return;
        }

        // old stream goes before the new one opens
        self.subscription = None;

        let (Some(params), Some(signature)) = (params, signature) else {
            return;
        };
        match subscriber.subscribe(&params).await {
            Ok(subscription) => {
                info!(%signature, "subscribed to board events");
                self.subscription = Some(ActiveSubscription {
                    signature,
                    subscription,
                });
            }
            Err(e) => warn!(%signature, error = %e, "board event subscription failed"),
        }
    }

    /// Waits for the next push event. `None` without a live subscription or
    /// once the stream ends.
    pub async fn next_event(&mut self) -> Option<BoardEvent> {
        self.subscription.as_mut()?.subscription.recv().await
    }

    /// Reloads the board for `ticket.`, `kanban.` and `bug.` events (or the
    /// configured prefixes) and notifies the host. Returns whether it reloaded.
    pub async fn handle_event(&mut self, event: &BoardEvent) -> bool {
        if !self.config.is_refresh_event(&event.event_type) {
            debug!(event_type = %event.event_type, "ignoring board event");
            return false;
        }
        debug!(event_type = %event.event_type, "board event triggers reload");
        self.refresh().await;
        self.callbacks.on_ticket_updated(event);
        true
    }

    /// Handles every event already buffered without waiting for more.
    /// Returns how many triggered a reload.
    pub async fn process_pending_events(&mut self) -> usize {
        let mut reloads = 0;
        loop {
            let Some(event) = self
                .subscription
                .as_mut()
                .and_then(|active| active.subscription.try_recv())
            else {
                break;
            };
            if self.handle_event(&event).await {
                reloads += 1;
            }
        }
        reloads
    }

    /// Snapshot for the UI layer
    pub fn view(&self) -> BoardView {
        let draggable = self.can_edit();
        let board = &self.state.board;

        let columns = self
            .config
            .columns_order
            .iter()
            .map(|key| {
                let lane = board.lane(*key);
                ColumnView {
                    key: *key,
                    id: lane.id.clone(),
                    title: self.config.column_title(*key).to_string(),
                    cards: lane
                        .tickets
                        .iter()
                        .map(|ticket| TicketCard {
                            ticket: ticket.clone(),
                            content: self.renderer.render(ticket),
                        })
                        .collect(),
                    draggable,
                }
            })
            .collect();

        let toolbar = &self.config.toolbar;
        let actions = [
            (toolbar.create_board, ToolbarAction::CreateBoard),
            (toolbar.add_module, ToolbarAction::AddModule),
            (toolbar.add_ticket, ToolbarAction::AddTicket),
            (toolbar.column_settings, ToolbarAction::ColumnSettings),
            (true, ToolbarAction::Refresh),
        ]
        .into_iter()
        .filter_map(|(enabled, action)| enabled.then_some(action))
        .collect();

        let has_projects = self.project_loader.is_some() || !self.state.projects.is_empty();
        let project_selector = (self.config.show_project_selector && has_projects).then(|| {
            ProjectSelector {
                options: self.state.projects.clone(),
                selected: self.state.project_id.clone(),
            }
        });

        BoardView {
            title: self.config.title.clone(),
            description: self.config.description.clone(),
            project_selector,
            actions,
            loading: self.state.loading,
            error: self.state.error.clone(),
            columns,
        }
    }
}
