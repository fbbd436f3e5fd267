//! Pipeline exercises over Zachary's karate club graph: translation,
//! interning, merging, and adjacency assembly wired together the way the
//! orchestrator drives them, without a live server.

use crate::adjacency::AdjacencyDict;
use crate::edges::{translate_coo_edges, translate_graph_edges, EdgeDoc, EdgeMerge};
use crate::intern::{IdMap, InternerSet, SharedIdMap};
use crate::output::Attrs;
use crate::request::GraphConfig;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// The 78 undirected friendships among the 34 club members.
const KARATE_EDGES: &[(u32, u32)] = &[
    (1, 2), (1, 3), (1, 4), (1, 5), (1, 6), (1, 7), (1, 8), (1, 9), (1, 11), (1, 12),
    (1, 13), (1, 14), (1, 18), (1, 20), (1, 22), (1, 32),
    (2, 3), (2, 4), (2, 8), (2, 14), (2, 18), (2, 20), (2, 22), (2, 31),
    (3, 4), (3, 8), (3, 9), (3, 10), (3, 14), (3, 28), (3, 29), (3, 33),
    (4, 8), (4, 13), (4, 14),
    (5, 7), (5, 11),
    (6, 7), (6, 11), (6, 17),
    (7, 17),
    (9, 31), (9, 33), (9, 34),
    (10, 34),
    (14, 34),
    (15, 33), (15, 34),
    (16, 33), (16, 34),
    (19, 33), (19, 34),
    (20, 34),
    (21, 33), (21, 34),
    (23, 33), (23, 34),
    (24, 26), (24, 28), (24, 30), (24, 33), (24, 34),
    (25, 26), (25, 28), (25, 32),
    (26, 32),
    (27, 30), (27, 34),
    (28, 34),
    (29, 32), (29, 34),
    (30, 33), (30, 34),
    (31, 33), (31, 34),
    (32, 33), (32, 34),
    (33, 34),
];

fn edge_docs() -> Vec<EdgeDoc> {
    KARATE_EDGES
        .iter()
        .enumerate()
        .map(|(i, (u, v))| EdgeDoc {
            id: format!("knows/{i}"),
            from: format!("person/{u}"),
            to: format!("person/{v}"),
            attrs: Attrs::new(),
        })
        .collect()
}

fn fresh_ids() -> SharedIdMap {
    Arc::new(Mutex::new(IdMap::new()))
}

fn merged(config: GraphConfig) -> (EdgeMerge, SharedIdMap) {
    let ids = fresh_ids();
    let segment = translate_graph_edges(edge_docs(), "knows", &ids, &[], false).unwrap();
    let mut merge = EdgeMerge::new(config, Vec::new());
    merge.absorb(segment);
    (merge, ids)
}

#[test]
fn karate_dataset_sanity() {
    assert_eq!(KARATE_EDGES.len(), 78);
    let members: BTreeSet<u32> = KARATE_EDGES
        .iter()
        .flat_map(|&(u, v)| [u, v])
        .collect();
    assert_eq!(members.len(), 34);
}

#[test]
fn simple_undirected_realizes_all_edges() {
    let config = GraphConfig {
        is_directed: false,
        is_multigraph: false,
        ..GraphConfig::default()
    };
    let (merge, ids) = merged(config);
    let outputs = merge.finish();

    assert_eq!(ids.lock().unwrap().len(), 34);
    assert_eq!(outputs.adjacency.len(), 34);
    assert!(outputs.edge_indices.is_empty());

    let AdjacencyDict::SimpleUndirected { adj } = &outputs.adjacency else {
        panic!("wrong shape");
    };
    // Each of the 78 edges appears in both orientations.
    let oriented: usize = adj.values().map(|inner| inner.len()).sum();
    assert_eq!(oriented, 156);

    let unique: BTreeSet<(&str, &str)> = adj
        .iter()
        .flat_map(|(u, inner)| inner.keys().map(move |v| (u.as_str(), v.as_str())))
        .map(|(u, v)| if u <= v { (u, v) } else { (v, u) })
        .collect();
    assert_eq!(unique.len(), 78);
}

#[test]
fn multi_directed_symmetrized_doubles_the_coo() {
    let config = GraphConfig {
        is_directed: true,
        is_multigraph: true,
        symmetrize_edges_if_directed: true,
        ..GraphConfig::default()
    };
    let (merge, _) = merged(config);
    let outputs = merge.finish();

    let (src, dst) = outputs.coo.into_parts();
    assert_eq!(src.len(), 156);
    assert_eq!(dst.len(), 156);
    assert_eq!(outputs.edge_indices.len(), 156);
    // No parallel friendships: every discriminator is the pair's first.
    assert!(outputs.edge_indices.iter().all(|&index| index == 0));

    // The symmetrized COO is a symmetric multiset.
    let mut forward: Vec<(i64, i64)> = src.iter().zip(&dst).map(|(&s, &d)| (s, d)).collect();
    let mut reversed: Vec<(i64, i64)> = forward.iter().map(|&(s, d)| (d, s)).collect();
    forward.sort_unstable();
    reversed.sort_unstable();
    assert_eq!(forward, reversed);
}

#[test]
fn adjacency_and_coo_describe_the_same_edges() {
    let config = GraphConfig {
        is_directed: true,
        is_multigraph: true,
        ..GraphConfig::default()
    };
    let (merge, ids) = merged(config);
    let outputs = merge.finish();

    let (_, ind_to_key) = ids.lock().unwrap().clone_maps();
    let (src, dst) = outputs.coo.into_parts();
    let from_coo: BTreeSet<(String, String)> = src
        .iter()
        .zip(&dst)
        .map(|(&s, &d)| (ind_to_key[s as usize].clone(), ind_to_key[d as usize].clone()))
        .collect();

    let AdjacencyDict::MultiDirected { succ, .. } = &outputs.adjacency else {
        panic!("wrong shape");
    };
    let from_adjacency: BTreeSet<(String, String)> = succ
        .iter()
        .flat_map(|(u, inner)| inner.keys().map(move |v| (u.clone(), v.clone())))
        .collect();

    assert_eq!(from_coo, from_adjacency);
}

#[test]
fn listed_vertices_intern_before_edge_discovery() {
    // Vertex scans intern the listed collection in scan order; the edge pass
    // then resolves every endpoint to an already-assigned index.
    let interner = InternerSet::new();
    let members: BTreeSet<u32> = KARATE_EDGES.iter().flat_map(|&(u, v)| [u, v]).collect();
    for member in &members {
        interner.get_or_insert("person", &format!("person/{member}"));
    }
    let before = interner.len_of("person");

    let segment = translate_coo_edges(&edge_docs(), &interner).unwrap();
    assert_eq!(interner.len_of("person"), before);

    let matrix = &segment.groups[&("person".to_string(), "person".to_string())];
    assert_eq!(matrix.shape(), (2, 78));

    let (key_to_ind, ind_to_key) = interner.snapshot();
    for (&s, &d) in matrix.src().iter().zip(matrix.dst()) {
        let src_key = &ind_to_key["person"][s as usize];
        let dst_key = &ind_to_key["person"][d as usize];
        assert_eq!(key_to_ind["person"][src_key], s as usize);
        assert_eq!(key_to_ind["person"][dst_key], d as usize);
    }
}

#[test]
fn unlisted_vertices_are_discovered_from_edges_alone() {
    let interner = InternerSet::new();
    let segment = translate_coo_edges(&edge_docs(), &interner).unwrap();

    assert_eq!(interner.len_of("person"), 34);
    let matrix = &segment.groups[&("person".to_string(), "person".to_string())];
    assert_eq!(matrix.shape(), (2, 78));
}

#[test]
fn numeric_edge_attributes_stay_aligned_with_coo() {
    let docs: Vec<EdgeDoc> = edge_docs()
        .into_iter()
        .enumerate()
        .map(|(i, mut doc)| {
            doc.attrs
                .insert("weight".to_string(), serde_json::json!(i as f64 * 0.5));
            doc
        })
        .collect();

    let ids = fresh_ids();
    let fields = vec!["weight".to_string()];
    let segment = translate_graph_edges(docs, "knows", &ids, &fields, false).unwrap();

    let config = GraphConfig {
        is_directed: false,
        is_multigraph: true,
        ..GraphConfig::default()
    };
    let mut merge = EdgeMerge::new(config, fields);
    merge.absorb(segment);
    let outputs = merge.finish();

    let (src, _) = outputs.coo.into_parts();
    let weights = &outputs.attr_vectors["weight"];
    assert_eq!(weights.len(), src.len());
    assert_eq!(weights.len(), 156);
    // Both orientations of edge i carry its weight.
    assert_eq!(weights[0], 0.0);
    assert_eq!(weights[1], 0.0);
    assert_eq!(weights[2], 0.5);
    assert_eq!(weights[3], 0.5);
}
