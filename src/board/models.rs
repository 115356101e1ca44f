use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: String,
}

/// A board-specific workflow stage, referenced from `ColumnType::Custom`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomColumnType {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub owner_id: String,
    pub members: Vec<String>,
    pub is_public: bool,
    pub custom_column_types: Vec<CustomColumnType>,
    pub display_order: Option<i64>,
    pub created_at: String,
}

impl Board {
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.members.iter().any(|m| m == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    Backlog,
    Todo,
    InProgress,
    Review,
    Blocked,
    Done,
    WontDo,
    /// Id of one of the board's `custom_column_types`.
    Custom(String),
}

impl ColumnType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::WontDo => "wont_do",
            Self::Custom(id) => id,
        }
    }
}

impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "backlog" => Self::Backlog,
            "todo" => Self::Todo,
            "in_progress" => Self::InProgress,
            "review" => Self::Review,
            "blocked" => Self::Blocked,
            "done" => Self::Done,
            "wont_do" => Self::WontDo,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl From<String> for ColumnType {
    fn from(s: String) -> Self {
        match ColumnType::from_str(&s) {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub column_type: Option<ColumnType>,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: String,
    pub column_id: String,
    pub board_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub color: Option<String>,
    pub story_points: Option<i64>,
    /// Minutes.
    pub time_estimate: Option<i64>,
    /// Minutes.
    pub time_spent: Option<i64>,
    pub assignees: Vec<String>,
    pub labels: Vec<String>,
    pub order: i64,
    pub created_by: String,
    pub created_at: String,
}

/// Fields for a card insert; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub column_id: String,
    pub board_id: String,
    pub title: String,
    pub description: Option<String>,
    pub order: i64,
    pub created_by: String,
}

/// Keeps an explicit `null` apart from an absent field: absent is `None`,
/// `null` is `Some(None)`. Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of a card's content fields.
///
/// `None` leaves a field untouched. For the nullable fields `Some(None)`
/// clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardChanges {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub story_points: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub time_estimate: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub time_spent: Option<Option<i64>>,
    pub assignees: Option<Vec<String>>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub card_id: String,
    pub board_id: String,
    pub author_id: String,
    pub body: String,
    pub mentions: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub board_id: String,
    pub author_id: String,
    pub body: String,
    pub mentions: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Assigned,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Assigned => "assigned",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mention" => Ok(Self::Mention),
            "assigned" => Ok(Self::Assigned),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub board_id: String,
    pub card_id: Option<String>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub board_id: String,
    pub card_id: Option<String>,
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    BoardCreated,
    MemberAdded,
    MemberRemoved,
    ColumnCreated,
    ColumnDeleted,
    CardCreated,
    CardUpdated,
    CardMoved,
    CardDeleted,
    CommentAdded,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BoardCreated => "board_created",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
            Self::ColumnCreated => "column_created",
            Self::ColumnDeleted => "column_deleted",
            Self::CardCreated => "card_created",
            Self::CardUpdated => "card_updated",
            Self::CardMoved => "card_moved",
            Self::CardDeleted => "card_deleted",
            Self::CommentAdded => "comment_added",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "board_created" => Ok(Self::BoardCreated),
            "member_added" => Ok(Self::MemberAdded),
            "member_removed" => Ok(Self::MemberRemoved),
            "column_created" => Ok(Self::ColumnCreated),
            "column_deleted" => Ok(Self::ColumnDeleted),
            "card_created" => Ok(Self::CardCreated),
            "card_updated" => Ok(Self::CardUpdated),
            "card_moved" => Ok(Self::CardMoved),
            "card_deleted" => Ok(Self::CardDeleted),
            "comment_added" => Ok(Self::CommentAdded),
            _ => Err(format!("Invalid activity kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: String,
    pub board_id: String,
    pub user_id: String,
    pub card_id: Option<String>,
    pub kind: ActivityKind,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub board_id: String,
    pub user_id: String,
    pub card_id: Option<String>,
    pub kind: ActivityKind,
    pub metadata: serde_json::Value,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub board: Board,
    pub columns: Vec<ColumnView>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetail {
    pub card: Card,
    pub comments: Vec<Comment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_round_trips_builtin_and_custom() {
        assert_eq!(ColumnType::from_str("in_progress").unwrap(), ColumnType::InProgress);
        assert_eq!(ColumnType::from_str("wont_do").unwrap(), ColumnType::WontDo);
        assert_eq!(
            ColumnType::from_str("qa-gate").unwrap(),
            ColumnType::Custom("qa-gate".to_string())
        );
        assert_eq!(ColumnType::Custom("qa-gate".into()).as_str(), "qa-gate");
    }

    #[test]
    fn column_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&ColumnType::Review).unwrap();
        assert_eq!(json, "\"review\"");
        let parsed: ColumnType = serde_json::from_str("\"design\"").unwrap();
        assert_eq!(parsed, ColumnType::Custom("design".to_string()));
    }

    #[test]
    fn board_membership_includes_owner() {
        let board = Board {
            id: "b1".into(),
            name: "Roadmap".into(),
            description: None,
            icon: None,
            owner_id: "alice".into(),
            members: vec!["bob".into()],
            is_public: false,
            custom_column_types: vec![],
            display_order: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        };
        assert!(board.is_member("alice"));
        assert!(board.is_member("bob"));
        assert!(!board.is_member("carol"));
        assert!(board.is_owner("alice"));
        assert!(!board.is_owner("bob"));
    }

    #[test]
    fn activity_kind_strings_are_stable() {
        for kind in [
            ActivityKind::CardCreated,
            ActivityKind::CardMoved,
            ActivityKind::CardDeleted,
            ActivityKind::CommentAdded,
        ] {
            assert_eq!(ActivityKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(ActivityKind::from_str("card_teleported").is_err());
    }
}
