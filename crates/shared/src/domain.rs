use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UnknownLane;

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

key_newtype!(ItemId);
key_newtype!(ContextKey);

/// Board column. Declaration order is the left to right column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
}

impl Lane {
    pub const ALL: [Lane; 5] = [
        Lane::Backlog,
        Lane::Todo,
        Lane::InProgress,
        Lane::Review,
        Lane::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Backlog => "backlog",
            Lane::Todo => "todo",
            Lane::InProgress => "in_progress",
            Lane::Review => "review",
            Lane::Done => "done",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = UnknownLane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Lane::ALL
            .into_iter()
            .find(|lane| lane.as_str() == normalized)
            .ok_or_else(|| UnknownLane(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A task-like card on the board.
///
/// `lane` and `rank` drive placement; every other field is carried along
/// verbatim so a rollback restores the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub lane: Lane,
    #[serde(rename = "ordem")]
    pub rank: i64,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(id: impl Into<String>, lane: Lane, rank: i64, title: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(id),
            lane,
            rank,
            title: title.into(),
            priority: Priority::default(),
            assignee: None,
            description: None,
            due_date: None,
            archived: false,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_parses_dashed_and_mixed_case_names() {
        assert_eq!("In-Progress".parse::<Lane>().expect("lane"), Lane::InProgress);
        assert_eq!(" todo ".parse::<Lane>().expect("lane"), Lane::Todo);
        assert!("blocked".parse::<Lane>().is_err());
    }

    #[test]
    fn lanes_are_ordered_left_to_right() {
        let mut shuffled = vec![Lane::Done, Lane::Backlog, Lane::Review, Lane::Todo];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Lane::Backlog, Lane::Todo, Lane::Review, Lane::Done]
        );
    }

    #[test]
    fn item_rank_uses_ordem_on_the_wire() {
        let item = Item::new("t-1", Lane::InProgress, 3, "write docs");
        let json = serde_json::to_value(&item).expect("encode");
        assert_eq!(json["ordem"], 3);
        assert_eq!(json["lane"], "in_progress");
        assert!(json.get("assignee").is_none());

        let decoded: Item = serde_json::from_value(serde_json::json!({
            "id": "t-2",
            "lane": "done",
            "ordem": 0,
            "title": "ship"
        }))
        .expect("decode");
        assert_eq!(decoded.priority, Priority::Medium);
        assert!(!decoded.archived);
    }
}
