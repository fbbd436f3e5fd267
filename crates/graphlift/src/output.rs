use crate::adjacency::AdjacencyDict;
use std::collections::{BTreeMap, HashMap};

/// Attribute values of one document, as returned by the server.
pub type Attrs = serde_json::Map<String, serde_json::Value>;

/// A dense row-major `rows x dim` matrix of f64 features. Scalar columns have
/// `dim == 1`. Row `i` belongs to the vertex with dense index `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub(crate) fn new(rows: usize, dim: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(rows * dim, data.len());
        Self { rows, dim, data }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.dim)
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
}

/// Edge endpoints in coordinate form: column `i` is `[src[i], dst[i]]`,
/// indices drawn from the endpoint collections' identifier maps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CooMatrix {
    src: Vec<i64>,
    dst: Vec<i64>,
}

impl CooMatrix {
    pub(crate) fn push(&mut self, src: i64, dst: i64) {
        self.src.push(src);
        self.dst.push(dst);
    }

    pub(crate) fn append(&mut self, mut other: CooMatrix) {
        self.src.append(&mut other.src);
        self.dst.append(&mut other.dst);
    }

    /// `(2, m)` where `m` is the number of edges.
    pub fn shape(&self) -> (usize, usize) {
        (2, self.src.len())
    }

    pub fn src(&self) -> &[i64] {
        &self.src
    }

    pub fn dst(&self) -> &[i64] {
        &self.dst
    }

    pub fn into_parts(self) -> (Vec<i64>, Vec<i64>) {
        (self.src, self.dst)
    }
}

/// COO matrices keyed by `(edge collection, source collection, destination
/// collection)`.
pub type CooKey = (String, String, String);
pub type CooMap = HashMap<CooKey, CooMatrix>;

/// Output of [`crate::load_features`].
#[derive(Debug, Default)]
pub struct FeatureBundle {
    /// Per vertex collection, per source field: the assembled matrix.
    pub features: HashMap<String, HashMap<String, FeatureMatrix>>,
    pub coo: CooMap,
    pub key_to_ind: HashMap<String, HashMap<String, usize>>,
    pub ind_to_key: HashMap<String, Vec<String>>,
    /// Per vertex collection: source field name to the caller's output alias.
    pub source_to_output: HashMap<String, HashMap<String, String>>,
}

/// Output of [`crate::load_networkx`].
#[derive(Debug)]
pub struct NetworkXBundle {
    /// Identifier string to the document's (filtered) attributes.
    pub node_dict: HashMap<String, Attrs>,
    pub adj_dict: AdjacencyDict,
    pub src_indices: Vec<i64>,
    pub dst_indices: Vec<i64>,
    /// Per-edge multiplicity discriminators; empty unless the graph is a
    /// multigraph.
    pub edge_indices: Vec<i64>,
    pub key_to_ind: HashMap<String, usize>,
    /// Requested numeric edge attributes, aligned with COO column order.
    pub edge_attr_vectors: BTreeMap<String, Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_index_by_dense_vertex_index() {
        let matrix = FeatureMatrix::new(3, 2, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(matrix.shape(), (3, 2));
        assert_eq!(matrix.row(0), &[0.0, 1.0]);
        assert_eq!(matrix.row(2), &[4.0, 5.0]);
    }

    #[test]
    fn coo_shape_is_two_by_m() {
        let mut coo = CooMatrix::default();
        assert_eq!(coo.shape(), (2, 0));
        coo.push(0, 1);
        coo.push(1, 2);
        assert_eq!(coo.shape(), (2, 2));
        assert_eq!(coo.src(), &[0, 1]);
        assert_eq!(coo.dst(), &[1, 2]);
    }

    #[test]
    fn coo_append_preserves_order() {
        let mut head = CooMatrix::default();
        head.push(0, 1);
        let mut tail = CooMatrix::default();
        tail.push(2, 3);
        tail.push(4, 5);

        head.append(tail);
        assert_eq!(head.src(), &[0, 2, 4]);
        assert_eq!(head.dst(), &[1, 3, 5]);
    }
}
