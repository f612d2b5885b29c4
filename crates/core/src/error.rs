//! The categorised error envelope crossing the service boundary.
//!
//! Every failure a client can observe is a [`RenderError`]: a category, a
//! human-readable message, an optional internal cause and a set of
//! structured extras. The JSON form merges extras at the top level next to
//! the reserved `error` and `category` keys; the cause is logged but never
//! serialised.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Extra key/value context attached to an error.
pub type Extras = serde_json::Map<String, Value>;

/// Error categories, driving HTTP status mapping and client-visible JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Input,
    Compilation,
    Queue,
    Reference,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Input => "input",
            Category::Compilation => "compilation",
            Category::Queue => "queue",
            Category::Reference => "reference",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorised error with structured extras.
#[derive(Debug)]
pub struct RenderError {
    category: Category,
    message: String,
    cause: Option<Cause>,
    extra: Extras,
}

impl RenderError {
    fn new(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            cause: None,
            extra: Extras::new(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(Category::Input, message)
    }

    pub fn compilation(message: impl Into<String>) -> Self {
        Self::new(Category::Compilation, message)
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::new(Category::Queue, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Category::Unknown, message)
    }

    /// Build the error for unresolved `ref=use` identifiers. The ids are
    /// listed, sorted, under the `references` extra.
    pub fn reference(mut references: Vec<String>) -> Self {
        references.sort();
        Self::new(Category::Reference, "unknown file references")
            .with_extra("references", references)
    }

    /// Attach an internal cause. Kept out of the JSON encoding.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attach one extra key/value pair.
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extras(&self) -> &Extras {
        &self.extra
    }

    pub fn is_input(&self) -> bool {
        self.category == Category::Input
    }

    pub fn is_compilation(&self) -> bool {
        self.category == Category::Compilation
    }

    pub fn is_queue(&self) -> bool {
        self.category == Category::Queue
    }

    pub fn is_reference(&self) -> bool {
        self.category == Category::Reference
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl Serialize for RenderError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extras = self
            .extra
            .iter()
            .filter(|(k, _)| k.as_str() != "error" && k.as_str() != "category");
        let mut map = serializer.serialize_map(None)?;
        // message only; the cause could leak internal data
        map.serialize_entry("error", &self.message)?;
        map.serialize_entry("category", self.category.as_str())?;
        for (k, v) in extras {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
