//! Lookup rows: the immutable candidate entries produced by providers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker trait for lookup key types.
///
/// Blanket-implemented: any clonable, comparable, debuggable type that can
/// cross a task boundary qualifies. Keys are caller-supplied (ids, codes,
/// plain strings).
pub trait LookupKey: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> LookupKey for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// One selectable candidate entry: key, display text and decoration.
///
/// Rows are value objects owned by the result that produced them; the
/// resolution layer may cache a reference to the accepted row until the
/// field value changes. Two rows denote the same selection iff their keys
/// are equal (`None == None` counts, representing "no selection").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRow<K> {
    pub key: Option<K>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<K>,
}

fn default_true() -> bool {
    true
}

impl<K: LookupKey> LookupRow<K> {
    pub fn new(key: K, text: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            text: text.into(),
            tooltip: None,
            background_color: None,
            foreground_color: None,
            font: None,
            icon_id: None,
            active: true,
            enabled: true,
            parent_key: None,
        }
    }

    /// The sentinel "nothing selected yet" row.
    ///
    /// Formatting code treats this as a valid row with empty text, never as
    /// an absent one.
    pub fn empty() -> Self {
        Self {
            key: None,
            text: String::new(),
            tooltip: None,
            background_color: None,
            foreground_color: None,
            font: None,
            icon_id: None,
            active: true,
            enabled: true,
            parent_key: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    pub fn with_foreground_color(mut self, color: impl Into<String>) -> Self {
        self.foreground_color = Some(color.into());
        self
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn with_icon_id(mut self, icon_id: impl Into<String>) -> Self {
        self.icon_id = Some(icon_id.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_parent_key(mut self, parent_key: K) -> Self {
        self.parent_key = Some(parent_key);
        self
    }

    /// Whether this row and `other` denote the same selection (key equality,
    /// with both-`None` meaning "no selection" on both sides).
    pub fn same_selection(&self, other: &Self) -> bool {
        self.key == other.key
    }

    /// Whether this row denotes the given committed value.
    pub fn matches_key(&self, key: Option<&K>) -> bool {
        self.key.as_ref() == key
    }
}
