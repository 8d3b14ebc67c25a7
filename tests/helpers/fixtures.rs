/// Common test fixtures and data structures
///
/// Defines the schemas shared by the integration tests and helpers that build
/// records for them.
use chrono::{DateTime, Utc};
use dynamo_model::schema::{FieldKind, Record, Schema, Value};

use super::{Deserialize, Serialize};

/// Songs, keyed by a numeric hash only
pub fn song_schema() -> Schema {
    Schema::builder("song", "songs")
        .hash("id", FieldKind::Number)
        .field("title", FieldKind::String)
        .field("artist", FieldKind::String)
        .field("loved", FieldKind::Boolean)
        .field("plays", FieldKind::Number)
        .field("tags", FieldKind::StringSet)
        .field("meta", FieldKind::Json)
        .build()
        .unwrap()
}

/// Edits of a song, keyed by song id and a numeric creation stamp
pub fn edit_schema() -> Schema {
    Schema::builder("edit", "song_edits")
        .hash("song_id", FieldKind::Number)
        .range("created", FieldKind::Number)
        .field("by", FieldKind::String)
        .field("at", FieldKind::Date)
        .build()
        .unwrap()
}

/// Users, keyed by a string hash
pub fn user_schema() -> Schema {
    Schema::builder("user", "users")
        .hash("username", FieldKind::String)
        .field("email", FieldKind::String)
        .build()
        .unwrap()
}

/// Record for the `song` alias
pub fn song(id: i64, title: &str) -> Record {
    Record::from([
        ("id".to_string(), Value::from(id)),
        ("title".to_string(), Value::from(title)),
    ])
}

/// Record for the `edit` alias
pub fn edit(song_id: i64, created: i64) -> Record {
    Record::from([
        ("song_id".to_string(), Value::from(song_id)),
        ("created".to_string(), Value::from(created)),
        ("by".to_string(), Value::from("lucas")),
    ])
}

/// Record for the `user` alias
pub fn user(username: &str) -> Record {
    Record::from([
        ("username".to_string(), Value::from(username)),
        ("email".to_string(), Value::from(format!("{username}@example.com"))),
    ])
}

/// Typed view of a song
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub loved: Option<bool>,
    pub tags: Option<Vec<String>>,
}

/// Typed view of an edit
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Edit {
    pub song_id: i64,
    pub created: i64,
    pub by: String,
    pub at: DateTime<Utc>,
}
