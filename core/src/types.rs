//! Domain types for the todo service.
//!
//! # Design
//! `Todo` is the only persisted entity and doubles as its own wire format:
//! serde emits the fields in declaration order, so every response body has the
//! keys `id`, `title`, `done` in that order.
//!
//! Request bodies are deliberately *not* bound to a strict schema. A
//! `TodoPayload` keeps whatever JSON object the client sent and answers
//! per-field questions ("is `title` present?", "is `done` truthy?") when a
//! handler converts it into a `NewTodo` or a `TodoPatch`. Anything that is not
//! a JSON object collapses to the empty payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single todo item as stored and as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub done: bool,
}

/// Validated input for inserting a new todo. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: Title,
    pub done: bool,
}

/// Field-level changes for an existing todo. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub title: Option<Title>,
    pub done: Option<bool>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.done.is_none()
    }
}

/// A client-supplied title as it will be written to the `title` column.
///
/// Scalars are stored in their JSON text form. `Null` and `Structured` are
/// passed through to the store, whose schema rejects them; they surface as
/// store errors rather than validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Title {
    Text(String),
    /// An array or object, kept as its JSON encoding.
    Structured(String),
    Null,
}

impl Title {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text.clone()),
            Value::Bool(_) | Value::Number(_) => Self::Text(value.to_string()),
            Value::Array(_) | Value::Object(_) => Self::Structured(value.to_string()),
        }
    }
}

impl From<&str> for Title {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Rejections raised while turning a payload into a store input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("title is required")]
    TitleRequired,
}

/// Weakly-typed request body: the JSON object the client sent, or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoPayload {
    fields: Map<String, Value>,
}

impl TodoPayload {
    /// Parse a request body. Unparsable input and non-object JSON both yield
    /// the empty payload.
    pub fn from_json_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::default(),
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Build the insert input for `POST /todos`.
    ///
    /// `title` must be present and truthy; `done` defaults to `false` and is
    /// otherwise coerced by truthiness.
    pub fn into_new_todo(self) -> Result<NewTodo, PayloadError> {
        let title = match self.fields.get("title") {
            Some(value) if is_truthy(value) => Title::from_json(value),
            _ => return Err(PayloadError::TitleRequired),
        };
        let done = self.fields.get("done").is_some_and(is_truthy);
        Ok(NewTodo { title, done })
    }

    /// Build the field changes for `PUT`/`PATCH /todos/{id}`.
    ///
    /// Only keys present in the body produce changes. Nothing is validated
    /// here, not even title emptiness.
    pub fn into_patch(self) -> TodoPatch {
        TodoPatch {
            title: self.fields.get("title").map(Title::from_json),
            done: self.fields.get("done").map(is_truthy),
        }
    }
}

/// JSON truthiness: `null`, `false`, zero, and empty strings, arrays, and
/// objects are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
