use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media unit a watch event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Movie,
    Episode,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Episode => "episode",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restricts an operation to movies, episodes or both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentFilter {
    Movies,
    Episodes,
    #[default]
    All,
}

impl ContentFilter {
    pub fn includes(&self, kind: ItemKind) -> bool {
        match self {
            ContentFilter::All => true,
            ContentFilter::Movies => kind == ItemKind::Movie,
            ContentFilter::Episodes => kind == ItemKind::Episode,
        }
    }

    /// The item kinds this filter admits, in a stable order.
    pub fn kinds(&self) -> Vec<ItemKind> {
        [ItemKind::Movie, ItemKind::Episode]
            .into_iter()
            .filter(|k| self.includes(*k))
            .collect()
    }
}

impl FromStr for ContentFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movies" | "movie" => Ok(ContentFilter::Movies),
            "episodes" | "episode" | "shows" => Ok(ContentFilter::Episodes),
            "all" => Ok(ContentFilter::All),
            other => Err(format!("unknown content filter '{}'", other)),
        }
    }
}
