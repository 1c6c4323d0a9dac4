//! Launch context for correlating loader construction events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one loader construction.
///
/// Extension loaders built during a launch get a child span that shares the
/// root's `launch_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpan {
    /// Unique id of this construction.
    pub span_id: Uuid,
    /// Id shared by every construction of one top-level launch.
    pub launch_id: Uuid,
    /// Parent construction, for extensions.
    pub parent_id: Option<Uuid>,
    /// Cooperation key.
    pub key: String,
    /// Descriptor location.
    pub descriptor: String,
    /// When construction started.
    pub started_at: DateTime<Utc>,
}

impl LaunchSpan {
    /// Start a top-level launch.
    #[must_use]
    pub fn new(key: impl Into<String>, descriptor: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            span_id: id,
            launch_id: id,
            parent_id: None,
            key: key.into(),
            descriptor: descriptor.into(),
            started_at: Utc::now(),
        }
    }

    /// A nested construction, such as an extension loader.
    #[must_use]
    pub fn child(&self, descriptor: impl Into<String>) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            launch_id: self.launch_id,
            parent_id: Some(self.span_id),
            key: self.key.clone(),
            descriptor: descriptor.into(),
            started_at: Utc::now(),
        }
    }

    /// Milliseconds since construction started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Whether this is a nested construction.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.parent_id.is_some()
    }

    /// A tracing span carrying this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "launch",
            launch_id = %self.launch_id,
            span_id = %self.span_id,
            key = %self.key,
            descriptor = %self.descriptor,
        )
    }

    /// Enter the span until the guard drops.
    #[must_use = "the span is exited when the guard is dropped"]
    pub fn enter(self) -> LaunchGuard {
        LaunchGuard::new(self)
    }
}

/// Keeps a [`LaunchSpan`] entered and logs completion on drop.
pub struct LaunchGuard {
    context: LaunchSpan,
    _span: tracing::span::EnteredSpan,
}

impl LaunchGuard {
    /// Enter `context`.
    #[must_use]
    pub fn new(context: LaunchSpan) -> Self {
        let span = context.span().entered();
        tracing::debug!("Loader construction started");
        Self {
            context,
            _span: span,
        }
    }

    /// The entered context.
    #[must_use]
    pub fn context(&self) -> &LaunchSpan {
        &self.context
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        tracing::debug!(
            elapsed_ms = self.context.elapsed_ms(),
            "Loader construction finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_span_is_root() {
        let span = LaunchSpan::new("editor", "https://apps.example.com/editor.jnlp");
        assert_eq!(span.span_id, span.launch_id);
        assert!(!span.is_nested());
        assert_eq!(span.key, "editor");
    }

    #[test]
    fn test_child_shares_launch() {
        let root = LaunchSpan::new("editor", "https://apps.example.com/editor.jnlp");
        let child = root.child("https://apps.example.com/ext.jnlp");
        assert_eq!(child.launch_id, root.launch_id);
        assert_eq!(child.parent_id, Some(root.span_id));
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.key, "editor");
    }

    #[test]
    fn test_elapsed() {
        let span = LaunchSpan::new("k", "d");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(span.elapsed_ms() >= 10);
    }

    #[test]
    fn test_guard_holds_context() {
        let guard = LaunchSpan::new("k", "d").enter();
        assert_eq!(guard.context().key, "k");
    }

    #[test]
    fn test_serialization() {
        let span = LaunchSpan::new("editor", "https://h/editor.jnlp");
        let json = serde_json::to_string(&span).unwrap();
        assert!(json.contains("\"key\":\"editor\""));
        let parsed: LaunchSpan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.launch_id, span.launch_id);
    }
}
