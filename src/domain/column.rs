use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// One of the fixed lanes of a kanban board, in workflow order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKey {
    Todo,
    InProgress,
    Review,
    Testing,
    Done,
}

impl ColumnKey {
    /// All keys in workflow order
    pub const ALL: [ColumnKey; 5] = [
        ColumnKey::Todo,
        ColumnKey::InProgress,
        ColumnKey::Review,
        ColumnKey::Testing,
        ColumnKey::Done,
    ];

    /// Position of the key in the fixed workflow order
    pub fn order_index(self) -> usize {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::Review => 2,
            Self::Testing => 3,
            Self::Done => 4,
        }
    }

    /// Wire form of the key (`todo`, `inProgress`, ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "inProgress",
            Self::Review => "review",
            Self::Testing => "testing",
            Self::Done => "done",
        }
    }

    /// Default lane heading
    pub fn title(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Review => "Review",
            Self::Testing => "Testing",
            Self::Done => "Done",
        }
    }

    /// Default backend status string for tickets in this lane
    pub fn default_status(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Testing => "testing",
            Self::Done => "done",
        }
    }

    /// Returns true when moving from `self` to `target` advances the workflow
    pub fn is_forward_to(self, target: ColumnKey) -> bool {
        target.order_index() > self.order_index()
    }

    /// Resolves a free-form backend label ("To Do", "in_progress", "QA") to a key.
    ///
    /// Matching ignores case, whitespace, `_` and `-`. Returns `None` for labels
    /// that do not correspond to any lane.
    pub fn from_label(label: &str) -> Option<ColumnKey> {
        let compact: String = label
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        match compact.as_str() {
            "todo" | "backlog" | "open" | "new" => Some(Self::Todo),
            "inprogress" | "progress" | "doing" | "wip" => Some(Self::InProgress),
            "review" | "inreview" | "codereview" => Some(Self::Review),
            "testing" | "test" | "qa" | "intesting" => Some(Self::Testing),
            "done" | "complete" | "completed" | "closed" | "resolved" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnKey {
    type Err = crate::error::BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| crate::error::BoardError::UnknownColumn(s.to_string()))
    }
}

/// Mapping from lane to the status string the backend stores for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMap(BTreeMap<ColumnKey, String>);

impl StatusMap {
    pub fn new(entries: BTreeMap<ColumnKey, String>) -> Self {
        Self(entries)
    }

    /// Overrides the status for one lane
    pub fn with_status(mut self, key: ColumnKey, status: impl Into<String>) -> Self {
        self.0.insert(key, status.into());
        self
    }

    /// Backend status for a lane, falling back to the built-in default
    pub fn status_for(&self, key: ColumnKey) -> &str {
        self.0
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_status())
    }

    /// Reverse lookup from a backend status string
    pub fn key_for_status(&self, status: &str) -> Option<ColumnKey> {
        ColumnKey::ALL
            .into_iter()
            .find(|key| self.status_for(*key).eq_ignore_ascii_case(status))
            .or_else(|| ColumnKey::from_label(status))
    }
}

impl Default for StatusMap {
    fn default() -> Self {
        Self(
            ColumnKey::ALL
                .into_iter()
                .map(|key| (key, key.default_status().to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_strictly_increasing() {
        let indices: Vec<usize> = ColumnKey::ALL.iter().map(|k| k.order_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_forward_only() {
        assert!(ColumnKey::Todo.is_forward_to(ColumnKey::Review));
        assert!(!ColumnKey::Review.is_forward_to(ColumnKey::Todo));
        assert!(!ColumnKey::Testing.is_forward_to(ColumnKey::Testing));
    }

    #[test]
    fn test_label_heuristics() {
        assert_eq!(ColumnKey::from_label("To Do"), Some(ColumnKey::Todo));
        assert_eq!(ColumnKey::from_label("inProgress"), Some(ColumnKey::InProgress));
        assert_eq!(ColumnKey::from_label("in_progress"), Some(ColumnKey::InProgress));
        assert_eq!(ColumnKey::from_label("Code Review"), Some(ColumnKey::Review));
        assert_eq!(ColumnKey::from_label("QA"), Some(ColumnKey::Testing));
        assert_eq!(ColumnKey::from_label("Completed"), Some(ColumnKey::Done));
        assert_eq!(ColumnKey::from_label("archived"), None);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("blocked".parse::<ColumnKey>().is_err());
        assert_eq!("testing".parse::<ColumnKey>().unwrap(), ColumnKey::Testing);
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&ColumnKey::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
    }

    #[test]
    fn test_status_map_defaults_and_overrides() {
        let map = StatusMap::default().with_status(ColumnKey::Done, "Closed");
        assert_eq!(map.status_for(ColumnKey::InProgress), "in_progress");
        assert_eq!(map.status_for(ColumnKey::Done), "Closed");
        assert_eq!(map.key_for_status("closed"), Some(ColumnKey::Done));
        assert_eq!(map.key_for_status("in_progress"), Some(ColumnKey::InProgress));
    }

    #[test]
    fn test_status_map_serializes_by_key() {
        let json = serde_json::to_value(StatusMap::default()).unwrap();
        assert_eq!(json["inProgress"], "in_progress");
        assert_eq!(json["todo"], "todo");
    }
}
