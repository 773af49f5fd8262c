use crate::{
    domain::column::{ColumnKey, StatusMap},
    error::{BoardError, Result},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};
use tokio::fs;
use tracing::debug;

/// Which toolbar actions the host wires up. Refresh is always available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolbarConfig {
    pub create_board: bool,
    pub add_module: bool,
    pub add_ticket: bool,
    pub column_settings: bool,
}

/// Board presentation and workflow settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoardConfig {
    pub title: String,
    pub description: Option<String>,
    pub columns_order: Vec<ColumnKey>,
    /// Heading overrides; lanes not listed use their default title
    pub column_titles: BTreeMap<ColumnKey, String>,
    pub status_map: StatusMap,
    /// Push events whose type starts with one of these trigger a reload
    pub refresh_event_prefixes: Vec<String>,
    pub show_project_selector: bool,
    pub toolbar: ToolbarConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            title: "Kanban Board".to_string(),
            description: None,
            columns_order: ColumnKey::ALL.to_vec(),
            column_titles: BTreeMap::new(),
            status_map: StatusMap::default(),
            refresh_event_prefixes: vec![
                "ticket.".to_string(),
                "kanban.".to_string(),
                "bug.".to_string(),
            ],
            show_project_selector: true,
            toolbar: ToolbarConfig::default(),
        }
    }
}

impl BoardConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_columns_order(mut self, order: Vec<ColumnKey>) -> Self {
        self.columns_order = order;
        self
    }

    pub fn with_column_title(mut self, key: ColumnKey, title: impl Into<String>) -> Self {
        self.column_titles.insert(key, title.into());
        self
    }

    pub fn column_title(&self, key: ColumnKey) -> &str {
        self.column_titles
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.title())
    }

    pub fn with_status_map(mut self, status_map: StatusMap) -> Self {
        self.status_map = status_map;
        self
    }

    pub fn with_toolbar(mut self, toolbar: ToolbarConfig) -> Self {
        self.toolbar = toolbar;
        self
    }

    pub fn with_project_selector(mut self, show: bool) -> Self {
        self.show_project_selector = show;
        self
    }

    /// Checks the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.columns_order.is_empty() {
            return Err(BoardError::ConfigError(
                "columnsOrder must name at least one column".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.columns_order {
            if !seen.insert(key) {
                return Err(BoardError::ConfigError(format!(
                    "column {} appears twice in columnsOrder",
                    key
                )));
            }
        }

        if self.refresh_event_prefixes.iter().any(|p| p.is_empty()) {
            return Err(BoardError::ConfigError(
                "refresh event prefixes must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true when a push event of this type should reload the board
    pub fn is_refresh_event(&self, event_type: &str) -> bool {
        self.refresh_event_prefixes
            .iter()
            .any(|prefix| event_type.starts_with(prefix.as_str()))
    }

    /// Loads and validates a JSON config file. Missing fields take defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).await?;
        let config: BoardConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded board config");
        Ok(config)
    }
}
