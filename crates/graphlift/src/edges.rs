use crate::adjacency::AdjacencyDict;
use crate::intern::{InternerSet, SharedIdMap};
use crate::output::{Attrs, CooMap, CooMatrix};
use crate::request::GraphConfig;
use crate::Error;
use std::collections::{BTreeMap, HashMap};

/// An edge document as projected by the scan query. Fields beyond the three
/// system attributes land in `attrs`.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct EdgeDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    #[serde(flatten)]
    pub attrs: Attrs,
}

/// Split `<collection>/<key>`. The collection name never contains `/`.
pub(crate) fn split_identifier(id: &str) -> crate::Result<(&str, &str)> {
    match id.split_once('/') {
        Some((collection, key)) if !collection.is_empty() && !key.is_empty() => {
            Ok((collection, key))
        }
        _ => Err(Error::MalformedId(id.to_string())),
    }
}

/// Shard-local COO emission for the feature and COO-only modes, grouped by
/// `(source collection, destination collection)`.
#[derive(Debug, Default)]
pub(crate) struct CooSegment {
    pub groups: BTreeMap<(String, String), CooMatrix>,
}

/// Translate one shard's edge documents against the shared per-collection
/// interner. Endpoints never seen by a vertex scan are interned here, which
/// is how vertices of unlisted collections are discovered.
pub(crate) fn translate_coo_edges(
    docs: &[EdgeDoc],
    interner: &InternerSet,
) -> crate::Result<CooSegment> {
    let mut segment = CooSegment::default();
    for doc in docs {
        let (from_col, _) = split_identifier(&doc.from)?;
        let (to_col, _) = split_identifier(&doc.to)?;
        let src = interner.get_or_insert(from_col, &doc.from) as i64;
        let dst = interner.get_or_insert(to_col, &doc.to) as i64;
        segment
            .groups
            .entry((from_col.to_string(), to_col.to_string()))
            .or_default()
            .push(src, dst);
    }
    Ok(segment)
}

impl CooSegment {
    /// Append a later batch's emissions, preserving per-group order.
    pub fn extend(&mut self, other: CooSegment) {
        for (pair, matrix) in other.groups {
            self.groups.entry(pair).or_default().append(matrix);
        }
    }
}

/// Concatenate shard segments, in shard order, into the COO map.
pub(crate) fn merge_coo_segments(
    edge_collection: &str,
    segments: Vec<CooSegment>,
    coo: &mut CooMap,
) {
    for segment in segments {
        for ((from_col, to_col), matrix) in segment.groups {
            coo.entry((edge_collection.to_string(), from_col, to_col))
                .or_default()
                .append(matrix);
        }
    }
}

/// One translated edge of the NetworkX-like mode, ready for the serialized
/// merge. Indices come from the run's single identifier map; the identifier
/// strings ride along because the adjacency dictionary is string-keyed.
#[derive(Debug)]
pub(crate) struct EdgeEntry {
    pub src_idx: i64,
    pub dst_idx: i64,
    pub src_id: String,
    pub dst_id: String,
    pub attrs: Attrs,
    /// Values of the requested numeric attributes, in `numeric_fields` order.
    pub numeric: Vec<f64>,
}

#[derive(Debug, Default)]
pub(crate) struct EdgeSegment {
    pub entries: Vec<EdgeEntry>,
}

/// Translate one shard's edge documents for the NetworkX-like mode.
///
/// `numeric_fields` is empty unless COO output is requested; a requested
/// attribute that is absent or non-numeric aborts the ingest.
pub(crate) fn translate_graph_edges(
    docs: Vec<EdgeDoc>,
    collection: &str,
    ids: &SharedIdMap,
    numeric_fields: &[String],
    load_all_attributes: bool,
) -> crate::Result<EdgeSegment> {
    let mut entries = Vec::with_capacity(docs.len());

    for doc in docs {
        split_identifier(&doc.from)?;
        split_identifier(&doc.to)?;

        let (src_idx, dst_idx) = {
            let mut ids = ids.lock().unwrap();
            (
                ids.get_or_insert(&doc.from) as i64,
                ids.get_or_insert(&doc.to) as i64,
            )
        };

        let mut numeric = Vec::with_capacity(numeric_fields.len());
        for field in numeric_fields {
            let value = doc.attrs.get(field).and_then(serde_json::Value::as_f64);
            match value {
                Some(value) => numeric.push(value),
                None => {
                    return Err(Error::EdgeAttrNonNumeric {
                        collection: collection.to_string(),
                        field: field.clone(),
                    })
                }
            }
        }

        let mut attrs = Attrs::new();
        attrs.insert("_id".to_string(), doc.id.clone().into());
        if load_all_attributes {
            attrs.insert("_from".to_string(), doc.from.clone().into());
            attrs.insert("_to".to_string(), doc.to.clone().into());
        }
        attrs.extend(doc.attrs);

        entries.push(EdgeEntry {
            src_idx,
            dst_idx,
            src_id: doc.from,
            dst_id: doc.to,
            attrs,
            numeric,
        });
    }
    Ok(EdgeSegment { entries })
}

/// Serialized merge of translated edge segments, in shard order.
///
/// Edge-index counters are keyed by the ordered endpoint pair for directed
/// graphs and the unordered pair for undirected ones; undirected edges emit
/// both orientations with a shared index, while a symmetrized directed edge
/// draws a fresh index from the reversed pair's counter.
pub(crate) struct EdgeMerge {
    config: GraphConfig,
    numeric_fields: Vec<String>,
    counters: HashMap<(i64, i64), i64>,
    pub coo: CooMatrix,
    pub edge_indices: Vec<i64>,
    pub attr_vectors: BTreeMap<String, Vec<f64>>,
    pub adjacency: AdjacencyDict,
}

impl EdgeMerge {
    pub fn new(config: GraphConfig, numeric_fields: Vec<String>) -> Self {
        let attr_vectors = numeric_fields
            .iter()
            .map(|field| (field.clone(), Vec::new()))
            .collect();
        Self {
            config,
            numeric_fields,
            counters: HashMap::new(),
            coo: CooMatrix::default(),
            edge_indices: Vec::new(),
            attr_vectors,
            adjacency: AdjacencyDict::new(config.is_directed, config.is_multigraph),
        }
    }

    pub fn absorb(&mut self, segment: EdgeSegment) {
        for entry in segment.entries {
            self.insert(entry);
        }
    }

    fn insert(&mut self, entry: EdgeEntry) {
        if self.config.is_directed {
            let index = self.next_edge_index(entry.src_idx, entry.dst_idx);
            self.emit(entry.src_idx, entry.dst_idx, index, &entry.numeric);
            if self.config.load_adj_dict {
                self.adjacency
                    .insert(&entry.src_id, &entry.dst_id, index, &entry.attrs);
            }

            if self.config.symmetrize_edges_if_directed {
                let reversed = self.next_edge_index(entry.dst_idx, entry.src_idx);
                self.emit(entry.dst_idx, entry.src_idx, reversed, &entry.numeric);
                if self.config.load_adj_dict {
                    self.adjacency
                        .insert(&entry.dst_id, &entry.src_id, reversed, &entry.attrs);
                }
            }
        } else {
            let (a, b) = unordered(entry.src_idx, entry.dst_idx);
            let index = self.next_edge_index(a, b);
            self.emit(entry.src_idx, entry.dst_idx, index, &entry.numeric);
            self.emit(entry.dst_idx, entry.src_idx, index, &entry.numeric);
            if self.config.load_adj_dict {
                // Undirected adjacency shapes insert both orientations.
                self.adjacency
                    .insert(&entry.src_id, &entry.dst_id, index, &entry.attrs);
            }
        }
    }

    fn next_edge_index(&mut self, a: i64, b: i64) -> i64 {
        let counter = self.counters.entry((a, b)).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub fn finish(self) -> MergedEdges {
        MergedEdges {
            coo: self.coo,
            edge_indices: self.edge_indices,
            attr_vectors: self.attr_vectors,
            adjacency: self.adjacency,
        }
    }

    fn emit(&mut self, src: i64, dst: i64, index: i64, numeric: &[f64]) {
        if !self.config.load_coo {
            return;
        }
        self.coo.push(src, dst);
        if self.config.is_multigraph {
            self.edge_indices.push(index);
        }
        for (field, value) in self.numeric_fields.iter().zip(numeric) {
            if let Some(vector) = self.attr_vectors.get_mut(field) {
                vector.push(*value);
            }
        }
    }
}

/// Final products of the serialized edge merge.
pub(crate) struct MergedEdges {
    pub coo: CooMatrix,
    pub edge_indices: Vec<i64>,
    pub attr_vectors: BTreeMap<String, Vec<f64>>,
    pub adjacency: AdjacencyDict,
}

fn unordered(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
