pub mod events;
pub mod graph;
pub mod reconcile;
pub mod resolve;
pub mod sink;
pub mod tally;

pub use events::{EventAction, GraphEvent};
pub use graph::{GraphSource, SceneGraph, SceneGraphCache};
pub use reconcile::{LoopPhase, ReconcileHandle, ReconcileLoop};
pub use resolve::{resolve, resolve_rooted, resolve_scene};
pub use sink::{IndicatorBank, IndicatorDriver, IndicatorSink};
pub use tally::{map_state, validate_tallies, Tally, TallyEntry, TallyState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Input,
    Group,
    Scene,
    Filter,
    Transition,
    #[serde(other)]
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Input => "input",
            SourceKind::Group => "group",
            SourceKind::Scene => "scene",
            SourceKind::Filter => "filter",
            SourceKind::Transition => "transition",
            SourceKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = std::convert::Infallible;

    /// Unrecognised kinds map to `Unknown` rather than failing; the remote
    /// service may grow new source types at any time.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let kind = match input.trim().to_lowercase().as_str() {
            "input" => SourceKind::Input,
            "group" => SourceKind::Group,
            "scene" => SourceKind::Scene,
            "filter" => SourceKind::Filter,
            "transition" => SourceKind::Transition,
            _ => SourceKind::Unknown,
        };
        Ok(kind)
    }
}

/// A named source as seen by the resolver. Identity is `(name, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source {
    pub name: String,
    pub kind: SourceKind,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// What a scene item holds besides its name and visibility bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemContent {
    /// A plain source (input, filter, ...). Never `Group` or `Scene`.
    Source(SourceKind),
    /// A group with its own ordered item list.
    Group(Vec<SceneItem>),
    /// A nested reference to another scene, by name.
    Scene(String),
}

/// One entry of a scene's item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItem {
    pub name: String,
    pub visible: bool,
    pub content: ItemContent,
}

impl SceneItem {
    /// Build a leaf item. `Group` and `Scene` kinds are rejected into
    /// `Unknown`; use [`SceneItem::group`] and [`SceneItem::scene`] for those.
    pub fn source(name: impl Into<String>, kind: SourceKind, visible: bool) -> Self {
        let kind = match kind {
            SourceKind::Group | SourceKind::Scene => SourceKind::Unknown,
            other => other,
        };
        Self {
            name: name.into(),
            visible,
            content: ItemContent::Source(kind),
        }
    }

    pub fn input(name: impl Into<String>, visible: bool) -> Self {
        Self::source(name, SourceKind::Input, visible)
    }

    pub fn group(name: impl Into<String>, visible: bool, children: Vec<SceneItem>) -> Self {
        Self {
            name: name.into(),
            visible,
            content: ItemContent::Group(children),
        }
    }

    /// A nested scene item. The remote service names the item after the
    /// scene it references.
    pub fn scene(name: impl Into<String>, visible: bool) -> Self {
        let name = name.into();
        Self {
            content: ItemContent::Scene(name.clone()),
            name,
            visible,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match &self.content {
            ItemContent::Source(kind) => *kind,
            ItemContent::Group(_) => SourceKind::Group,
            ItemContent::Scene(_) => SourceKind::Scene,
        }
    }

    pub fn as_source(&self) -> Source {
        Source::new(self.name.clone(), self.kind())
    }

    pub fn children(&self) -> Option<&[SceneItem]> {
        match &self.content {
            ItemContent::Group(children) => Some(children),
            _ => None,
        }
    }

    pub fn referenced_scene(&self) -> Option<&str> {
        match &self.content {
            ItemContent::Scene(name) => Some(name),
            _ => None,
        }
    }
}

/// The remote scene-graph service could not deliver a snapshot.
///
/// Always transient: the reconciliation loop keeps its last good state and
/// retries on the next wake.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not connected to the scene-graph service")]
    Disconnected,
    #[error("remote call {request} failed: {message}")]
    Remote { request: String, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("remote call {0} timed out")]
    TimedOut(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no tallies configured")]
    NoTallies,
    #[error("tally #{index} has an empty name")]
    EmptyTallyName { index: usize },
    #[error("tally {name:?} is configured more than once")]
    DuplicateTally { name: String },
    #[error("indicator {id} is assigned to more than one tally")]
    DuplicateIndicator { id: u32 },
    #[error("invalid connection parameters: {0}")]
    Connection(String),
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("indicator {0} is not available")]
    Unavailable(u32),
    #[error("indicator {id} write failed: {message}")]
    Write { id: u32, message: String },
}
