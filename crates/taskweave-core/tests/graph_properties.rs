use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use taskweave_core::{
    advance_recurring_tasks, create_child, delete_subtree, recompute_depths,
    reorder_children_by_position, Graph, NodeId, NodeOverrides,
};

/// Build a tree where node `i` (1-based) hangs under `parents[i - 1]`, an
/// index strictly smaller than `i`. Node 0 is the root. Depths are
/// scrambled on purpose.
fn tree_from_parents(parents: &[usize], depths: &[u32]) -> Graph {
    let name = |i: usize| if i == 0 { "root".to_string() } else { format!("n{i}") };
    let mut children: Vec<Vec<String>> = vec![Vec::new(); parents.len() + 1];
    for (offset, parent) in parents.iter().enumerate() {
        children[*parent].push(name(offset + 1));
    }
    let mut doc = Map::new();
    for (i, kids) in children.into_iter().enumerate() {
        doc.insert(
            name(i),
            json!({ "title": name(i), "children": kids, "depth": depths.get(i).copied().unwrap_or(0) }),
        );
    }
    Graph::from_value(Value::Object(doc)).unwrap()
}

fn arb_tree() -> impl Strategy<Value = Graph> {
    (1..30usize)
        .prop_flat_map(|n| {
            let parents: Vec<_> = (1..=n).map(|i| 0..i).collect();
            (parents, proptest::collection::vec(0..10u32, n + 1))
        })
        .prop_map(|(parents, depths)| tree_from_parents(&parents, &depths))
}

proptest! {
    #[test]
    fn prop_delete_subtree_leaves_no_trace(graph in arb_tree(), pick in any::<prop::sample::Index>()) {
        let ids: Vec<NodeId> = graph.ids().cloned().collect();
        let target = pick.get(&ids).clone();
        let removed: HashSet<NodeId> = graph.subtree(target.as_str()).into_iter().collect();

        let next = delete_subtree(&graph, target.as_str());

        if target.is_root() {
            prop_assert_eq!(next, graph);
        } else {
            for id in &removed {
                prop_assert!(!next.contains(id.as_str()));
            }
            for (_, node) in next.iter() {
                for child in &node.children {
                    prop_assert!(!removed.contains(child));
                    prop_assert!(next.contains(child.as_str()));
                }
            }
            prop_assert_eq!(next.len(), graph.len() - removed.len());
        }
    }

    #[test]
    fn prop_depth_is_parent_plus_one(graph in arb_tree()) {
        let next = recompute_depths(&graph);
        prop_assert_eq!(next.root().depth, 0);
        for (id, node) in next.iter() {
            if let Some(parent) = next.parent_of(id.as_str()) {
                let parent_depth = next.get(parent.as_str()).unwrap().depth;
                prop_assert_eq!(node.depth, parent_depth + 1);
            }
        }
    }

    #[test]
    fn prop_reorder_is_idempotent(graph in arb_tree(), seed in any::<u64>()) {
        let position = |id: &NodeId| {
            let hash = id.as_str().bytes().fold(seed, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
            (hash % 7) as f64
        };
        let once = reorder_children_by_position(&graph, "root", position);
        let twice = reorder_children_by_position(&once, "root", position);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_recurrence_never_before_today(
        offset in 1..5000u64,
        repeat in 0..400u32,
        completed in any::<bool>(),
    ) {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let due = today.checked_sub_days(Days::new(offset)).unwrap();
        let graph = Graph::from_value(json!({
            "root": { "children": ["t"] },
            "t": {
                "dueDate": due.format("%Y-%m-%d").to_string(),
                "repeatDays": repeat,
                "completed": completed
            }
        })).unwrap();

        let next = advance_recurring_tasks(&graph, today);
        let task = next.get("t").unwrap().as_task().unwrap().clone();

        if completed && repeat > 0 {
            prop_assert!(task.due().unwrap() >= today);
            prop_assert!(task.due().unwrap() < today + Days::new(u64::from(repeat)));
            prop_assert!(!task.completed);
        } else {
            prop_assert_eq!(next, graph);
        }
    }
}

#[test]
fn create_child_scenario() {
    let graph = Graph::from_value(json!({
        "root": { "children": ["A"] },
        "A": { "depth": 1 }
    }))
    .unwrap();

    let (next, b) = create_child(&graph, "root", NodeOverrides::default());
    let b = b.unwrap();

    assert_eq!(next.root().children, vec![NodeId::from("A"), b.clone()]);
    assert_eq!(next.get(b.as_str()).unwrap().depth, 1);
}

#[test]
fn create_then_delete_keeps_depths_consistent() {
    let graph = Graph::new();
    let (graph, a) = create_child(&graph, "root", NodeOverrides::titled("a"));
    let a = a.unwrap();
    let (graph, b) = create_child(&graph, a.as_str(), NodeOverrides::titled("b"));
    let b = b.unwrap();
    let (graph, c) = create_child(&graph, b.as_str(), NodeOverrides::titled("c"));
    let c = c.unwrap();

    assert_eq!(graph.get(c.as_str()).unwrap().depth, 3);
    assert_eq!(recompute_depths(&graph), graph);
    assert_eq!(graph.ancestors(c.as_str()), vec![b.clone(), a.clone(), NodeId::root()]);

    let graph = delete_subtree(&graph, b.as_str());
    assert_eq!(graph.len(), 2);
    assert!(graph.get(a.as_str()).unwrap().children.is_empty());
}
