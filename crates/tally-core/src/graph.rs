use crate::{FetchError, SceneItem};
use std::collections::HashMap;
use std::future::Future;

/// One full snapshot of the remote scene graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneGraph {
    pub scenes: HashMap<String, Vec<SceneItem>>,
    pub active_scene: String,
}

impl SceneGraph {
    pub fn new(active_scene: impl Into<String>) -> Self {
        Self {
            scenes: HashMap::new(),
            active_scene: active_scene.into(),
        }
    }

    pub fn with_scene(mut self, name: impl Into<String>, items: Vec<SceneItem>) -> Self {
        self.scenes.insert(name.into(), items);
        self
    }
}

/// The remote service's full-graph query.
pub trait GraphSource: Send + Sync + 'static {
    fn fetch_graph(&self) -> impl Future<Output = Result<SceneGraph, FetchError>> + Send;
}

/// Last known scene graph.
///
/// Only ever replaced wholesale; the one partial update allowed is moving
/// the active scene pointer after a scene-switch notification.
#[derive(Debug, Default)]
pub struct SceneGraphCache {
    graph: Option<SceneGraph>,
    generation: u64,
}

impl SceneGraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, graph: SceneGraph) {
        self.graph = Some(graph);
        self.generation += 1;
    }

    /// Number of full snapshots swapped in so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scene(&self, name: &str) -> Option<&[SceneItem]> {
        self.graph
            .as_ref()
            .and_then(|graph| graph.scenes.get(name))
            .map(Vec::as_slice)
    }

    pub fn active_scene(&self) -> Option<&str> {
        self.graph.as_ref().map(|graph| graph.active_scene.as_str())
    }

    pub fn set_active_scene(&mut self, name: &str) {
        if let Some(graph) = self.graph.as_mut() {
            graph.active_scene = name.to_string();
        }
    }

    pub fn snapshot(&self) -> Option<&SceneGraph> {
        self.graph.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SceneGraph {
        SceneGraph::new("Main")
            .with_scene("Main", vec![SceneItem::input("Cam1", true)])
            .with_scene("Break", vec![SceneItem::input("Slides", true)])
    }

    #[test]
    fn empty_cache_has_no_scenes() {
        let cache = SceneGraphCache::new();
        assert!(cache.snapshot().is_none());
        assert_eq!(cache.active_scene(), None);
        assert_eq!(cache.scene("Main"), None);
    }

    #[test]
    fn replace_swaps_the_whole_snapshot() {
        let mut cache = SceneGraphCache::new();
        cache.replace(sample());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.snapshot().map(|graph| graph.scenes.len()), Some(2));

        cache.replace(SceneGraph::new("Solo").with_scene("Solo", vec![]));
        assert_eq!(cache.generation(), 2);
        assert_eq!(cache.scene("Main"), None);
        assert_eq!(cache.active_scene(), Some("Solo"));
    }

    #[test]
    fn set_active_scene_requires_a_snapshot() {
        let mut cache = SceneGraphCache::new();
        cache.set_active_scene("Main");
        assert_eq!(cache.active_scene(), None);

        cache.replace(sample());
        cache.set_active_scene("Break");
        assert_eq!(cache.active_scene(), Some("Break"));
        assert_eq!(cache.generation(), 1);
    }
}
