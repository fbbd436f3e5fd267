use crate::Error;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A vertex feature entry: either the short form `alias: "source_field"`, or
/// the nested form `alias: {"source_field": null}`. The nested form is an
/// input alias only; validation collapses it to the short form.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Source(String),
    Nested(BTreeMap<String, serde_json::Value>),
}

/// Metagraph accepted by the feature entry point: per vertex collection a map
/// of output alias to source field, per edge collection the same (edge fields
/// are accepted for symmetry but carry no feature output).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeatureMetaGraph {
    #[serde(default, rename = "vertexCollections")]
    pub vertex_collections: Option<BTreeMap<String, BTreeMap<String, FieldSpec>>>,
    #[serde(default, rename = "edgeCollections")]
    pub edge_collections: Option<BTreeMap<String, BTreeMap<String, FieldSpec>>>,
}

/// Metagraph accepted by the COO and NetworkX entry points: per collection a
/// set of attribute names to project.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AttrMetaGraph {
    #[serde(default, rename = "vertexCollections")]
    pub vertex_collections: Option<BTreeMap<String, BTreeSet<String>>>,
    #[serde(default, rename = "edgeCollections")]
    pub edge_collections: Option<BTreeMap<String, BTreeSet<String>>>,
}

/// Shape selectors for the NetworkX-like output.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub is_directed: bool,
    pub is_multigraph: bool,
    pub symmetrize_edges_if_directed: bool,
    pub load_adj_dict: bool,
    pub load_coo: bool,
    pub load_all_vertex_attributes: bool,
    pub load_all_edge_attributes: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            is_directed: true,
            is_multigraph: true,
            symmetrize_edges_if_directed: false,
            load_adj_dict: true,
            load_coo: true,
            load_all_vertex_attributes: false,
            load_all_edge_attributes: false,
        }
    }
}

/// Scan tuning knobs shared by every entry point.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub parallelism: usize,
    pub batch_size: usize,
    /// Batches a cursor may buffer ahead of its consumer.
    pub prefetch: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            parallelism: 8,
            batch_size: 400_000,
            prefetch: 5,
        }
    }
}

/// A scan-ready vertex collection: its name and deduplicated source fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VertexRequest {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EdgeRequest {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ResolvedFeatureRequest {
    pub vertices: Vec<VertexRequest>,
    pub edges: Vec<EdgeRequest>,
    pub source_to_output: HashMap<String, HashMap<String, String>>,
}

/// Collapse one feature entry to its source field name.
fn collapse_field(alias: &str, spec: &FieldSpec) -> crate::Result<String> {
    match spec {
        FieldSpec::Source(source) => Ok(source.clone()),
        FieldSpec::Nested(entries) => match entries.iter().next() {
            Some((field, value)) if entries.len() == 1 => {
                if !value.is_null() {
                    return Err(Error::RequestInvalid(format!(
                        "Invalid value for feature {alias}: {field}. Found {value}"
                    )));
                }
                Ok(field.clone())
            }
            _ => Err(Error::RequestInvalid(format!(
                "Only one feature field should be specified per attribute. Found {entries:?}"
            ))),
        },
    }
}

fn collapse_entries(
    entries: &BTreeMap<String, FieldSpec>,
) -> crate::Result<(Vec<String>, HashMap<String, String>)> {
    let mut sources = BTreeSet::new();
    let mut source_to_output = HashMap::new();
    for (alias, spec) in entries {
        let source = collapse_field(alias, spec)?;
        sources.insert(source.clone());
        source_to_output.insert(source, alias.clone());
    }
    Ok((sources.into_iter().collect(), source_to_output))
}

pub(crate) fn resolve_feature_request(
    metagraph: &FeatureMetaGraph,
    homogeneous: bool,
) -> crate::Result<ResolvedFeatureRequest> {
    let vertex_collections = metagraph.vertex_collections.as_ref().ok_or_else(|| {
        Error::RequestInvalid("vertexCollections not found in metagraph".to_string())
    })?;
    let edge_collections = metagraph.edge_collections.clone().unwrap_or_default();

    if homogeneous && (vertex_collections.len() > 1 || edge_collections.len() > 1) {
        return Err(Error::RequestInvalid(format!(
            "homogeneous output requires a single vertex collection and a single edge \
             collection, found {} and {}",
            vertex_collections.len(),
            edge_collections.len(),
        )));
    }

    let mut vertices = Vec::with_capacity(vertex_collections.len());
    let mut source_to_output = HashMap::with_capacity(vertex_collections.len());
    for (name, entries) in vertex_collections {
        let (fields, aliases) = collapse_entries(entries)?;
        vertices.push(VertexRequest {
            name: name.clone(),
            fields,
        });
        source_to_output.insert(name.clone(), aliases);
    }

    let mut edges = Vec::with_capacity(edge_collections.len());
    for (name, entries) in &edge_collections {
        let (fields, _) = collapse_entries(entries)?;
        edges.push(EdgeRequest {
            name: name.clone(),
            fields,
        });
    }

    Ok(ResolvedFeatureRequest {
        vertices,
        edges,
        source_to_output,
    })
}

fn attr_requests(
    collections: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<(String, Vec<String>)> {
    collections
        .iter()
        .map(|(name, attrs)| (name.clone(), attrs.iter().cloned().collect()))
        .collect()
}

pub(crate) fn resolve_coo_request(
    metagraph: &AttrMetaGraph,
) -> crate::Result<(Vec<VertexRequest>, Vec<EdgeRequest>)> {
    let vertex_collections = metagraph.vertex_collections.as_ref().ok_or_else(|| {
        Error::RequestInvalid("vertexCollections not found in metagraph".to_string())
    })?;
    let edge_collections = metagraph.edge_collections.as_ref().ok_or_else(|| {
        Error::RequestInvalid("edgeCollections not found in metagraph".to_string())
    })?;
    if vertex_collections.is_empty() {
        return Err(Error::RequestInvalid(
            "vertexCollections must map to non-empty dictionary".to_string(),
        ));
    }
    if edge_collections.is_empty() {
        return Err(Error::RequestInvalid(
            "edgeCollections must map to non-empty dictionary".to_string(),
        ));
    }

    let vertices = attr_requests(vertex_collections)
        .into_iter()
        .map(|(name, fields)| VertexRequest { name, fields })
        .collect();
    let edges = attr_requests(edge_collections)
        .into_iter()
        .map(|(name, fields)| EdgeRequest { name, fields })
        .collect();
    Ok((vertices, edges))
}

pub(crate) fn resolve_networkx_request(
    metagraph: &AttrMetaGraph,
    graph: &GraphConfig,
) -> crate::Result<(Vec<VertexRequest>, Vec<EdgeRequest>)> {
    let vertex_collections = metagraph.vertex_collections.as_ref().ok_or_else(|| {
        Error::RequestInvalid("vertexCollections not found in metagraph".to_string())
    })?;
    let edge_collections = metagraph.edge_collections.as_ref().ok_or_else(|| {
        Error::RequestInvalid("edgeCollections not found in metagraph".to_string())
    })?;

    if graph.load_all_vertex_attributes {
        if let Some((name, _)) = vertex_collections.iter().find(|(_, attrs)| !attrs.is_empty()) {
            return Err(Error::RequestInvalid(format!(
                "load_all_vertex_attributes is set but vertex collection '{name}' specifies \
                 an attribute set; use one or the other"
            )));
        }
    }
    if graph.load_all_edge_attributes {
        if let Some((name, _)) = edge_collections.iter().find(|(_, attrs)| !attrs.is_empty()) {
            return Err(Error::RequestInvalid(format!(
                "load_all_edge_attributes is set but edge collection '{name}' specifies \
                 an attribute set; use one or the other"
            )));
        }
    }

    let vertices = attr_requests(vertex_collections)
        .into_iter()
        .map(|(name, fields)| VertexRequest { name, fields })
        .collect();
    let edges = attr_requests(edge_collections)
        .into_iter()
        .map(|(name, fields)| EdgeRequest { name, fields })
        .collect();
    Ok((vertices, edges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_metagraph(value: serde_json::Value) -> FeatureMetaGraph {
        serde_json::from_value(value).unwrap()
    }

    fn attr_metagraph(value: serde_json::Value) -> AttrMetaGraph {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn short_and_nested_forms_collapse_identically() {
        let short = feature_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": {"x": "brain_fmri_features"}},
            "edgeCollections": {"medical_affinity_graph": {}},
        }));
        let nested = feature_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": {"x": {"brain_fmri_features": null}}},
            "edgeCollections": {"medical_affinity_graph": {}},
        }));

        let a = resolve_feature_request(&short, false).unwrap();
        let b = resolve_feature_request(&nested, false).unwrap();
        assert_eq!(a.vertices, b.vertices);
        assert_eq!(a.vertices[0].fields, vec!["brain_fmri_features"]);
        assert_eq!(
            a.source_to_output["Subjects"]["brain_fmri_features"],
            "x"
        );
        assert_eq!(a.edges.len(), 1);
    }

    #[test]
    fn nested_form_with_multiple_entries_is_rejected() {
        let metagraph = feature_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": {"x": {"a": null, "b": null}}},
        }));
        let err = resolve_feature_request(&metagraph, false).unwrap_err();
        assert!(err
            .to_string()
            .contains("Only one feature field should be specified per attribute"));
    }

    #[test]
    fn nested_form_with_non_null_value_is_rejected() {
        let metagraph = feature_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": {"x": {"a": 1}}},
        }));
        let err = resolve_feature_request(&metagraph, false).unwrap_err();
        assert!(err.to_string().contains("Invalid value for feature x: a"));
    }

    #[test]
    fn missing_vertex_collections_is_rejected() {
        let err = resolve_feature_request(&FeatureMetaGraph::default(), false).unwrap_err();
        assert!(err
            .to_string()
            .contains("vertexCollections not found in metagraph"));
    }

    #[test]
    fn feature_request_tolerates_missing_edge_collections() {
        let metagraph = feature_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": {"x": "brain_fmri_features"}},
        }));
        let resolved = resolve_feature_request(&metagraph, false).unwrap();
        assert!(resolved.edges.is_empty());
    }

    #[test]
    fn homogeneous_requires_single_collections() {
        let metagraph = feature_metagraph(serde_json::json!({
            "vertexCollections": {
                "a": {"x": "f"},
                "b": {"x": "f"},
            },
        }));
        assert!(resolve_feature_request(&metagraph, true).is_err());
        assert!(resolve_feature_request(&metagraph, false).is_ok());
    }

    #[test]
    fn coo_request_requires_non_empty_mappings() {
        let err = resolve_coo_request(&attr_metagraph(serde_json::json!({
            "vertexCollections": {},
            "edgeCollections": {"knows": []},
        })))
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("vertexCollections must map to non-empty dictionary"));

        let err = resolve_coo_request(&attr_metagraph(serde_json::json!({
            "vertexCollections": {"person": []},
            "edgeCollections": {},
        })))
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("edgeCollections must map to non-empty dictionary"));
    }

    #[test]
    fn networkx_request_allows_empty_vertex_collections() {
        let metagraph = attr_metagraph(serde_json::json!({
            "vertexCollections": {},
            "edgeCollections": {"knows": []},
        }));
        let (vertices, edges) =
            resolve_networkx_request(&metagraph, &GraphConfig::default()).unwrap();
        assert!(vertices.is_empty());
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn load_all_with_attribute_set_is_ambiguous() {
        let metagraph = attr_metagraph(serde_json::json!({
            "vertexCollections": {"Subjects": ["label"]},
            "edgeCollections": {"medical_affinity_graph": ["_rev"]},
        }));

        let vertex_all = GraphConfig {
            load_all_vertex_attributes: true,
            ..GraphConfig::default()
        };
        assert!(resolve_networkx_request(&metagraph, &vertex_all).is_err());

        let edge_all = GraphConfig {
            load_all_edge_attributes: true,
            ..GraphConfig::default()
        };
        assert!(resolve_networkx_request(&metagraph, &edge_all).is_err());

        assert!(resolve_networkx_request(&metagraph, &GraphConfig::default()).is_ok());
    }
}
