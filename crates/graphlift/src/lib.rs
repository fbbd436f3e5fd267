//! Parallel extraction of graph data from a document store into dense,
//! contiguous structures for graph-learning pipelines.
//!
//! Collections are scanned in disjoint shards over pooled HTTP connections;
//! documents stream through typed column decoders while vertex identifiers
//! are interned into dense indices. Edges translate into COO index pairs and,
//! on request, adjacency dictionaries in the directed/undirected and
//! simple/multi shapes.

mod adjacency;
mod columns;
mod edges;
mod intern;
mod load;
mod output;
mod plan;
mod request;
#[cfg(test)]
mod scenarios;

pub use adjacency::{AdjacencyDict, MultiAdj, SimpleAdj};
pub use arango_client::DatabaseConfig;
pub use intern::{IdMap, InternerSet};
pub use output::{
    Attrs, CooKey, CooMap, CooMatrix, FeatureBundle, FeatureMatrix, NetworkXBundle,
};
pub use plan::{plan_shards, ShardSpec};
pub use request::{AttrMetaGraph, FeatureMetaGraph, FieldSpec, GraphConfig, LoadConfig};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected by validation before any I/O.
    #[error("invalid request: {0}")]
    RequestInvalid(String),
    #[error(transparent)]
    Client(#[from] arango_client::Error),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("malformed document identifier '{0}'")]
    MalformedId(String),
    #[error("failed to decode document: {context}")]
    Decode { context: String },
    #[error(
        "field '{field}' of collection '{collection}': expected a row of width {expected}, \
         found {actual}"
    )]
    ShapeMismatch {
        collection: String,
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("field '{field}' of collection '{collection}' must be a {expected} value")]
    TypeError {
        collection: String,
        field: String,
        expected: &'static str,
    },
    /// The wording is load-bearing: callers match on these substrings.
    #[error(
        "Could not insert edge of collection '{collection}': Edge data must be a numeric value \
         (attribute '{field}')"
    )]
    EdgeAttrNonNumeric { collection: String, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Load per-collection feature matrices plus COO edge lists.
///
/// Vertex collections and their field projections come from `metagraph`;
/// every listed vertex collection is scanned fully before any edge scan, so
/// listed endpoints are interned ahead of edge translation. Returns the
/// matrices, the COO map keyed by `(edge collection, source collection,
/// destination collection)`, both identifier maps, and the caller's
/// field-alias mapping.
pub async fn load_features(
    database: &str,
    metagraph: &FeatureMetaGraph,
    db_config: &DatabaseConfig,
    load_config: &LoadConfig,
) -> Result<FeatureBundle> {
    load::run_feature_load(database, metagraph, false, db_config, load_config).await
}

/// [`load_features`] for homogeneous outputs: exactly one vertex collection
/// and at most one edge collection are accepted.
pub async fn load_features_homogeneous(
    database: &str,
    metagraph: &FeatureMetaGraph,
    db_config: &DatabaseConfig,
    load_config: &LoadConfig,
) -> Result<FeatureBundle> {
    load::run_feature_load(database, metagraph, true, db_config, load_config).await
}

/// Load only the COO edge lists. Both vertex and edge collections are
/// required, and vertex scans still run first to pin identifier order.
pub async fn load_coo(
    database: &str,
    metagraph: &AttrMetaGraph,
    db_config: &DatabaseConfig,
    load_config: &LoadConfig,
) -> Result<CooMap> {
    load::run_coo_load(database, metagraph, db_config, load_config).await
}

/// Load the NetworkX-like projection: node dictionary, adjacency dictionary
/// in the shape selected by `graph_config`, COO index arrays, and numeric
/// edge-attribute vectors.
///
/// Vertex collections may be empty, in which case vertices are discovered
/// exclusively from edge endpoints and the node dictionary stays empty.
pub async fn load_networkx(
    database: &str,
    metagraph: &AttrMetaGraph,
    graph_config: &GraphConfig,
    db_config: &DatabaseConfig,
    load_config: &LoadConfig,
) -> Result<NetworkXBundle> {
    load::run_networkx_load(database, metagraph, graph_config, db_config, load_config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_attr_error_keeps_compat_wording() {
        let err = Error::EdgeAttrNonNumeric {
            collection: "knows".to_string(),
            field: "_key".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Could not insert edge"));
        assert!(message.contains("Edge data must be a numeric value"));
    }

    #[test]
    fn client_errors_surface_transparently() {
        let err = Error::from(arango_client::Error::Auth);
        assert_eq!(err.to_string(), "authentication rejected by the server");
    }
}
