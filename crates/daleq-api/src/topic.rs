//! Topic naming for the device tree.
//!
//! Every topic is `<root>/<channel>/<path...>`, segments joined by `/`.
//! Inbound commands arrive on the `request` channel, state pushes on the
//! `update` channel. The `<path...>` tail is the target path handed to the
//! device tree.

use serde::{Deserialize, Serialize};

/// Separator between topic segments.
pub const SEPARATOR: char = '/';

/// Channel carrying inbound commands.
pub const REQUEST: &str = "request";

/// Channel carrying inbound state pushes.
pub const UPDATE: &str = "update";

/// Multi-level wildcard, only valid as the last filter segment.
pub const MULTI_LEVEL: &str = "#";

/// Single-level wildcard.
pub const SINGLE_LEVEL: &str = "+";

pub const DEFAULT_ROOT: &str = "dev";

// ── TopicScheme ──────────────────────────────────────────────────────

/// The root marker all device topics live under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    root: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.into(),
        }
    }
}

impl TopicScheme {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Join the root and `segments` into a topic.
    ///
    /// `make_topic(&["a", "b", "c"])` under root `dev` is `dev/a/b/c`.
    pub fn make_topic<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut topic = self.root.clone();
        for segment in segments {
            topic.push(SEPARATOR);
            topic.push_str(segment.as_ref());
        }
        topic
    }

    /// Subscription filter for every request topic.
    pub fn request_filter(&self) -> String {
        self.make_topic(&[REQUEST, MULTI_LEVEL])
    }

    /// Subscription filter for every update topic.
    pub fn update_filter(&self) -> String {
        self.make_topic(&[UPDATE, MULTI_LEVEL])
    }

    /// Strip the `<root>/request` prefix and return the remaining target path.
    ///
    /// Returns `None` when the topic is not a request topic under this root.
    pub fn request_path(&self, topic: &str) -> Option<Vec<String>> {
        let segments: Vec<&str> = topic.split(SEPARATOR).collect();
        let expected = [self.root.as_str(), REQUEST];
        let (prefix, rest) = split_at(&segments, expected.len());

        if prefix != expected {
            return None;
        }
        Some(rest.iter().map(|s| (*s).to_string()).collect())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Split a slice at `at`, clamping to its length.
///
/// The first half is at most `at` long; the second half is whatever remains
/// (empty when the slice is shorter than `at`).
pub fn split_at<T>(list: &[T], at: usize) -> (&[T], &[T]) {
    list.split_at(at.min(list.len()))
}

/// Match a topic against a subscription filter.
///
/// `+` matches exactly one segment; `#` as the final segment matches the
/// remaining segments, including none (`dev/request/#` matches `dev/request`).
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_segments = filter.split(SEPARATOR);
    let mut topic_segments = topic.split(SEPARATOR);

    loop {
        match (filter_segments.next(), topic_segments.next()) {
            (Some(MULTI_LEVEL), _) => return filter_segments.next().is_none(),
            (Some(SINGLE_LEVEL), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
