use std::collections::HashMap;

use mise_core::MiseService;
use mise_core::models::{NewRecipe, UpdateRecipe, VersionEntry};
use proptest::prelude::*;
use proptest::test_runner::Config;

const OWNERS: &[&str] = &["ana", "ben", "cho"];

#[derive(Debug, Clone)]
struct Node {
    parent: prop::sample::Index,
    owner: prop::sample::Index,
    is_public: bool,
}

fn node() -> impl Strategy<Value = Node> {
    (any::<prop::sample::Index>(), any::<prop::sample::Index>(), any::<bool>()).prop_map(
        |(parent, owner, is_public)| Node {
            parent,
            owner,
            is_public,
        },
    )
}

/// Build a random fork tree; returns recipe ids in creation order.
fn build_tree(svc: &MiseService, root_public: bool, nodes: &[Node]) -> Vec<i64> {
    let mut root = NewRecipe::named("Base");
    root.owner_id = Some(OWNERS[0].to_string());
    root.is_public = root_public;
    let mut ids = vec![svc.create_recipe(&root).unwrap().id];

    for node in nodes {
        let parent = ids[node.parent.index(ids.len())];
        let owner = OWNERS[node.owner.index(OWNERS.len())];
        let forked = svc.fork_recipe(parent, Some(owner)).unwrap();
        if node.is_public {
            svc.update_recipe(
                forked.id,
                &UpdateRecipe {
                    is_public: Some(true),
                    ..UpdateRecipe::default()
                },
            )
            .unwrap();
        }
        ids.push(forked.id);
    }
    ids
}

proptest! {
    #![proptest_config(Config::with_cases(64))]
    #[test]
    fn masked_tree_has_no_dangling_links(
        root_public in any::<bool>(),
        nodes in prop::collection::vec(node(), 0..10),
        start in any::<prop::sample::Index>(),
        viewer in prop::sample::select(vec!["ana", "ben", "cho", "dee"])
    ) {
        let svc = MiseService::new_in_memory().unwrap();
        let ids = build_tree(&svc, root_public, &nodes);
        let from = ids[start.index(ids.len())];

        let tree = svc.get_version_tree(from, Some(viewer)).unwrap();
        prop_assert_eq!(tree.len(), ids.len());

        let by_id: HashMap<i64, &VersionEntry> = tree.iter().map(|e| (e.id(), e)).collect();
        for entry in &tree {
            if let Some(parent_id) = entry.root_id() {
                let parent = by_id.get(&parent_id);
                prop_assert!(parent.is_some(), "{} links to omitted {}", entry.id(), parent_id);
                // Links always land on a version the viewer can open.
                prop_assert!(parent.is_some_and(|p| !p.is_masked()));
            }
        }

        // Versions ascend along the list
        for pair in tree.windows(2) {
            prop_assert!(pair[0].version() <= pair[1].version());
        }
    }

    #[test]
    fn unfiltered_tree_is_the_whole_lineage(
        nodes in prop::collection::vec(node(), 0..10),
        start in any::<prop::sample::Index>()
    ) {
        let svc = MiseService::new_in_memory().unwrap();
        let ids = build_tree(&svc, true, &nodes);
        let from = ids[start.index(ids.len())];

        let tree = svc.get_version_tree(from, None).unwrap();
        let mut got: Vec<i64> = tree.iter().map(VersionEntry::id).collect();
        got.sort_unstable();
        prop_assert_eq!(got, ids);
        prop_assert!(tree.iter().all(|e| !e.is_masked()));
    }
}
