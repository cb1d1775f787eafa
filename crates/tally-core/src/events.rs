use crate::SceneItem;

/// Notifications from the remote scene-graph service that matter for
/// tally state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    SceneSwitched { scene: String, items: Vec<SceneItem> },
    SceneListChanged,
    SourceCreated,
    SourceDestroyed,
    SourceRenamed,
    SceneItemAdded,
    SceneItemRemoved,
    SceneItemVisibilityChanged,
}

/// What the reconciliation loop does about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Re-fetch the whole graph.
    Refresh,
    /// Resolve the carried item list against the cached graph.
    ApplyScene,
}

impl GraphEvent {
    pub fn action(&self) -> EventAction {
        match self {
            GraphEvent::SceneSwitched { .. } => EventAction::ApplyScene,
            GraphEvent::SceneListChanged
            | GraphEvent::SourceCreated
            | GraphEvent::SourceDestroyed
            | GraphEvent::SourceRenamed
            | GraphEvent::SceneItemAdded
            | GraphEvent::SceneItemRemoved
            | GraphEvent::SceneItemVisibilityChanged => EventAction::Refresh,
        }
    }

    /// The carried scene and item list of a scene switch.
    pub fn into_switched(self) -> Option<(String, Vec<SceneItem>)> {
        match self {
            GraphEvent::SceneSwitched { scene, items } => Some((scene, items)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::SceneSwitched { .. } => "scene_switched",
            GraphEvent::SceneListChanged => "scene_list_changed",
            GraphEvent::SourceCreated => "source_created",
            GraphEvent::SourceDestroyed => "source_destroyed",
            GraphEvent::SourceRenamed => "source_renamed",
            GraphEvent::SceneItemAdded => "scene_item_added",
            GraphEvent::SceneItemRemoved => "scene_item_removed",
            GraphEvent::SceneItemVisibilityChanged => "scene_item_visibility_changed",
        }
    }
}
