use crate::output::Attrs;
use std::collections::{BTreeMap, HashMap};

/// Nested adjacency maps keyed by identifier strings. The innermost value is
/// the edge's attribute map; multigraph shapes key it further by edge index.
pub type SimpleAdj = HashMap<String, HashMap<String, Attrs>>;
pub type MultiAdj = HashMap<String, HashMap<String, BTreeMap<i64, Attrs>>>;

/// One of the four adjacency-dictionary shapes. Identifier strings, not dense
/// indices, key every level: the dictionary is consumed directly by graph
/// libraries that address vertices by identifier.
#[derive(Clone, Debug, PartialEq)]
pub enum AdjacencyDict {
    SimpleDirected { succ: SimpleAdj, pred: SimpleAdj },
    SimpleUndirected { adj: SimpleAdj },
    MultiDirected { succ: MultiAdj, pred: MultiAdj },
    MultiUndirected { adj: MultiAdj },
}

impl AdjacencyDict {
    pub fn new(is_directed: bool, is_multigraph: bool) -> Self {
        match (is_directed, is_multigraph) {
            (true, false) => AdjacencyDict::SimpleDirected {
                succ: HashMap::new(),
                pred: HashMap::new(),
            },
            (false, false) => AdjacencyDict::SimpleUndirected {
                adj: HashMap::new(),
            },
            (true, true) => AdjacencyDict::MultiDirected {
                succ: HashMap::new(),
                pred: HashMap::new(),
            },
            (false, true) => AdjacencyDict::MultiUndirected {
                adj: HashMap::new(),
            },
        }
    }

    /// Record one realized edge emission `src -> dst`.
    ///
    /// Directed shapes write the forward entry under `succ` and the mirrored
    /// entry under `pred`. Undirected shapes write both orientations into the
    /// single symmetric map, so callers insert each input edge exactly once.
    /// Simple shapes overwrite repeated endpoint pairs (last write wins);
    /// multigraph shapes file the attributes under `edge_index`.
    pub fn insert(&mut self, src_id: &str, dst_id: &str, edge_index: i64, attrs: &Attrs) {
        match self {
            AdjacencyDict::SimpleDirected { succ, pred } => {
                insert_simple(succ, src_id, dst_id, attrs);
                insert_simple(pred, dst_id, src_id, attrs);
            }
            AdjacencyDict::SimpleUndirected { adj } => {
                insert_simple(adj, src_id, dst_id, attrs);
                insert_simple(adj, dst_id, src_id, attrs);
            }
            AdjacencyDict::MultiDirected { succ, pred } => {
                insert_multi(succ, src_id, dst_id, edge_index, attrs);
                insert_multi(pred, dst_id, src_id, edge_index, attrs);
            }
            AdjacencyDict::MultiUndirected { adj } => {
                insert_multi(adj, src_id, dst_id, edge_index, attrs);
                insert_multi(adj, dst_id, src_id, edge_index, attrs);
            }
        }
    }

    /// Number of vertices appearing as an outer key.
    pub fn len(&self) -> usize {
        match self {
            AdjacencyDict::SimpleDirected { succ, .. } => succ.len(),
            AdjacencyDict::SimpleUndirected { adj } => adj.len(),
            AdjacencyDict::MultiDirected { succ, .. } => succ.len(),
            AdjacencyDict::MultiUndirected { adj } => adj.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_simple(map: &mut SimpleAdj, from: &str, to: &str, attrs: &Attrs) {
    map.entry(from.to_string())
        .or_default()
        .insert(to.to_string(), attrs.clone());
}

fn insert_multi(map: &mut MultiAdj, from: &str, to: &str, edge_index: i64, attrs: &Attrs) {
    map.entry(from.to_string())
        .or_default()
        .entry(to.to_string())
        .or_default()
        .insert(edge_index, attrs.clone());
}
