use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::record::Record;

/// What happened to the record a notification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Add,
    Update,
    Delete,
}

impl NotificationKind {
    /// Path segment appended to the delivery target
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Add => "add",
            NotificationKind::Update => "update",
            NotificationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending webhook call: a delivery target, the kind of mutation and an
/// immutable snapshot of the record as committed.
///
/// Messages built for the same mutation share the snapshot.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    target: String,
    kind: NotificationKind,
    record: Arc<Record>,
}

impl NotificationMessage {
    pub fn new(target: impl Into<String>, kind: NotificationKind, record: Arc<Record>) -> Self {
        Self {
            target: target.into(),
            kind,
            record,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Full callback URL: the target without its trailing `/`, then the kind.
    pub fn url(&self) -> String {
        format!("{}/{}", self.target.trim_end_matches('/'), self.kind.as_str())
    }
}
