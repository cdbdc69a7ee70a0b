use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier namespaces shared by the source and destination services.
///
/// Declaration order is the preference order used when resolving identities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum IdNamespace {
    Imdb,
    Tmdb,
    Tvdb,
}

impl IdNamespace {
    pub const PREFERENCE: [IdNamespace; 3] = [IdNamespace::Imdb, IdNamespace::Tmdb, IdNamespace::Tvdb];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdNamespace::Imdb => "imdb",
            IdNamespace::Tmdb => "tmdb",
            IdNamespace::Tvdb => "tvdb",
        }
    }

    /// Maps a provider key as reported by a media server ("Imdb", "tmdb", ...).
    pub fn from_provider_key(key: &str) -> Option<Self> {
        match key.to_lowercase().as_str() {
            "imdb" => Some(IdNamespace::Imdb),
            "tmdb" => Some(IdNamespace::Tmdb),
            "tvdb" => Some(IdNamespace::Tvdb),
            _ => None,
        }
    }
}

impl fmt::Display for IdNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External identifiers known for a media item, keyed by namespace.
///
/// May be partially populated or empty. Empty and whitespace-only values are
/// never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ExternalIds(BTreeMap<IdNamespace, String>);

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, namespace: IdNamespace, value: impl Into<String>) -> Self {
        self.insert(namespace, value);
        self
    }

    pub fn insert(&mut self, namespace: IdNamespace, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.0.insert(namespace, trimmed.to_string());
        }
    }

    pub fn get(&self, namespace: IdNamespace) -> Option<&str> {
        self.0.get(&namespace).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Available ids in resolution preference order.
    pub fn iter(&self) -> impl Iterator<Item = (IdNamespace, &str)> {
        IdNamespace::PREFERENCE
            .into_iter()
            .filter_map(move |ns| self.get(ns).map(|v| (ns, v)))
    }

    /// The most preferred id rendered as `namespace:value`, for logs and reports.
    pub fn primary_id(&self) -> Option<String> {
        self.iter().next().map(|(ns, v)| format!("{}:{}", ns, v))
    }
}

impl fmt::Display for ExternalIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(ns, v)| format!("{}:{}", ns, v)).collect();
        if parts.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&parts.join(","))
        }
    }
}
