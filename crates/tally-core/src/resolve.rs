//! Flattening of a nested scene graph into its effectively-visible sources.

use crate::{ItemContent, SceneGraphCache, SceneItem, Source};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Collect every source reachable from `items`.
///
/// An item contributes itself when it is visible or `include_invisible` is
/// set. Contributing groups are descended into, contributing scene
/// references are looked up in `cache` and descended into. Each child is
/// gated by its own visibility bit only.
pub fn resolve(
    items: &[SceneItem],
    cache: &SceneGraphCache,
    include_invisible: bool,
) -> BTreeSet<Source> {
    let mut walk = Walk::new(cache, include_invisible);
    walk.items(items);
    walk.sources
}

/// Like [`resolve`], starting from a named scene in the cache.
///
/// The root name is placed on the expansion path up front, so a scene that
/// nests itself is never expanded a second time.
pub fn resolve_scene(
    scene: &str,
    cache: &SceneGraphCache,
    include_invisible: bool,
) -> BTreeSet<Source> {
    let Some(items) = cache.scene(scene) else {
        debug!(event = "scene_missing", scene = %scene);
        return BTreeSet::new();
    };
    resolve_rooted(scene, items, cache, include_invisible)
}

/// Resolve `items`, which belong to the scene named `root`.
pub fn resolve_rooted(
    root: &str,
    items: &[SceneItem],
    cache: &SceneGraphCache,
    include_invisible: bool,
) -> BTreeSet<Source> {
    let mut walk = Walk::new(cache, include_invisible);
    walk.path.insert(root);
    walk.items(items);
    walk.sources
}

struct Walk<'a> {
    cache: &'a SceneGraphCache,
    include_invisible: bool,
    // scenes currently being expanded on the recursion path
    path: HashSet<&'a str>,
    // scenes whose expansion already finished; a second visit adds nothing
    expanded: HashSet<&'a str>,
    sources: BTreeSet<Source>,
}

impl<'a> Walk<'a> {
    fn new(cache: &'a SceneGraphCache, include_invisible: bool) -> Self {
        Self {
            cache,
            include_invisible,
            path: HashSet::new(),
            expanded: HashSet::new(),
            sources: BTreeSet::new(),
        }
    }

    fn items(&mut self, items: &[SceneItem]) {
        for item in items {
            if !(item.visible || self.include_invisible) {
                continue;
            }
            self.sources.insert(item.as_source());
            match &item.content {
                ItemContent::Source(_) => {}
                ItemContent::Group(children) => self.items(children),
                ItemContent::Scene(name) => self.nested_scene(name),
            }
        }
    }

    fn nested_scene(&mut self, name: &str) {
        let Some((key, items)) = self.lookup(name) else {
            debug!(event = "scene_reference_missing", scene = %name);
            return;
        };
        if self.expanded.contains(key) {
            return;
        }
        if !self.path.insert(key) {
            warn!(event = "scene_reference_cycle", scene = %name, depth = self.path.len());
            return;
        }
        self.items(items);
        self.path.remove(key);
        self.expanded.insert(key);
    }

    fn lookup(&self, name: &str) -> Option<(&'a str, &'a [SceneItem])> {
        let graph = self.cache.snapshot()?;
        graph
            .scenes
            .get_key_value(name)
            .map(|(key, items)| (key.as_str(), items.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SceneGraph, SourceKind};

    fn cache_of(graph: SceneGraph) -> SceneGraphCache {
        let mut cache = SceneGraphCache::new();
        cache.replace(graph);
        cache
    }

    fn src(name: &str, kind: SourceKind) -> Source {
        Source::new(name, kind)
    }

    fn main_with_group() -> SceneGraphCache {
        cache_of(SceneGraph::new("Main").with_scene(
            "Main",
            vec![
                SceneItem::input("Cam1", true),
                SceneItem::group("Grp", true, vec![SceneItem::input("Cam2", false)]),
            ],
        ))
    }

    #[test]
    fn empty_items_resolve_to_nothing() {
        let cache = main_with_group();
        assert!(resolve(&[], &cache, false).is_empty());
        assert!(resolve(&[], &cache, true).is_empty());
    }

    #[test]
    fn invisible_group_child_is_excluded_unless_requested() {
        let cache = main_with_group();
        let root = cache.scene("Main").unwrap();

        let visible = resolve(root, &cache, false);
        let expected: BTreeSet<_> = [src("Cam1", SourceKind::Input), src("Grp", SourceKind::Group)]
            .into_iter()
            .collect();
        assert_eq!(visible, expected);

        let all = resolve(root, &cache, true);
        assert_eq!(all.len(), 3);
        assert!(all.contains(&src("Cam2", SourceKind::Input)));
    }

    #[test]
    fn invisible_group_hides_its_visible_children() {
        let cache = cache_of(SceneGraph::new("Main").with_scene(
            "Main",
            vec![SceneItem::group("Grp", false, vec![SceneItem::input("Cam2", true)])],
        ));
        let root = cache.scene("Main").unwrap();
        assert!(resolve(root, &cache, false).is_empty());
    }

    #[test]
    fn nested_scenes_are_followed_through_the_cache() {
        let cache = cache_of(
            SceneGraph::new("Main")
                .with_scene("Main", vec![SceneItem::scene("Studio", true)])
                .with_scene(
                    "Studio",
                    vec![
                        SceneItem::input("Cam1", true),
                        SceneItem::group("Desk", true, vec![SceneItem::scene("Guests", true)]),
                    ],
                )
                .with_scene("Guests", vec![SceneItem::input("Cam3", true)]),
        );
        let sources = resolve_scene("Main", &cache, false);
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Cam1", "Cam3", "Desk", "Guests", "Studio"]);
    }

    #[test]
    fn missing_scene_reference_contributes_only_itself() {
        let cache = cache_of(SceneGraph::new("Main").with_scene(
            "Main",
            vec![SceneItem::scene("Ghost", true), SceneItem::input("Cam1", true)],
        ));
        let sources = resolve_scene("Main", &cache, false);
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&src("Ghost", SourceKind::Scene)));
        assert!(resolve_scene("Nowhere", &cache, true).is_empty());
    }

    #[test]
    fn shared_source_is_reported_once() {
        let cache = cache_of(SceneGraph::new("Main").with_scene(
            "Main",
            vec![
                SceneItem::group("Left", true, vec![SceneItem::input("Cam1", true)]),
                SceneItem::group("Right", true, vec![SceneItem::input("Cam1", true)]),
                SceneItem::input("Cam1", true),
            ],
        ));
        let sources = resolve_scene("Main", &cache, false);
        let cams = sources.iter().filter(|s| s.name == "Cam1").count();
        assert_eq!(cams, 1);
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn self_reference_terminates() {
        let cache = cache_of(SceneGraph::new("Loop").with_scene(
            "Loop",
            vec![SceneItem::scene("Loop", true), SceneItem::input("Cam1", true)],
        ));
        let from_name = resolve_scene("Loop", &cache, false);
        assert_eq!(from_name.len(), 2);

        let root = cache.scene("Loop").unwrap();
        assert_eq!(resolve(root, &cache, false), from_name);
    }

    #[test]
    fn mutual_reference_terminates_and_keeps_both_sides() {
        let cache = cache_of(
            SceneGraph::new("A")
                .with_scene("A", vec![SceneItem::scene("B", true), SceneItem::input("CamA", true)])
                .with_scene("B", vec![SceneItem::scene("A", true), SceneItem::input("CamB", true)]),
        );
        let sources = resolve_scene("A", &cache, true);
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "CamA", "CamB"]);
    }

    #[test]
    fn diamond_of_scene_references_is_not_a_cycle() {
        let cache = cache_of(
            SceneGraph::new("Main")
                .with_scene(
                    "Main",
                    vec![SceneItem::scene("Left", true), SceneItem::scene("Right", true)],
                )
                .with_scene("Left", vec![SceneItem::scene("Shared", true)])
                .with_scene("Right", vec![SceneItem::scene("Shared", true)])
                .with_scene("Shared", vec![SceneItem::input("Logo", true)]),
        );
        let sources = resolve_scene("Main", &cache, false);
        assert!(sources.contains(&src("Logo", SourceKind::Input)));
        assert_eq!(sources.len(), 4);
    }

    #[test]
    fn stacked_diamonds_expand_each_scene_once() {
        let depth = 40;
        let mut graph = SceneGraph::new("Level0");
        for level in 0..depth {
            let next = format!("Level{}", level + 1);
            graph = graph.with_scene(
                format!("Level{level}"),
                vec![
                    SceneItem::group("Left", true, vec![SceneItem::scene(next.clone(), true)]),
                    SceneItem::group("Right", true, vec![SceneItem::scene(next, true)]),
                ],
            );
        }
        graph = graph.with_scene(format!("Level{depth}"), vec![SceneItem::input("Cam1", true)]);
        let cache = cache_of(graph);

        let sources = resolve_scene("Level0", &cache, false);
        assert!(sources.contains(&src("Cam1", SourceKind::Input)));
        // Left, Right, Cam1 and every nested level except the root
        assert_eq!(sources.len(), 3 + depth);
    }

    #[test]
    fn resolve_is_idempotent_on_one_snapshot() {
        let cache = main_with_group();
        let root = cache.scene("Main").unwrap();
        assert_eq!(resolve(root, &cache, true), resolve(root, &cache, true));
    }
}
