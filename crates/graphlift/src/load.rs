use crate::columns::ColumnData;
use crate::edges::{
    merge_coo_segments, translate_coo_edges, translate_graph_edges, CooSegment, EdgeDoc,
    EdgeMerge, EdgeSegment,
};
use crate::intern::{IdMap, InternerSet, SharedIdMap};
use crate::output::{Attrs, CooMap, FeatureBundle, FeatureMatrix, NetworkXBundle};
use crate::plan::{plan_shards, ShardSpec};
use crate::request::{
    resolve_coo_request, resolve_feature_request, resolve_networkx_request, AttrMetaGraph,
    EdgeRequest, FeatureMetaGraph, GraphConfig, LoadConfig, VertexRequest,
};
use crate::Error;
use arango_client::{count_documents, CursorQuery, CursorStream, DatabaseConfig, Pool};
use futures::{StreamExt, TryStreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

const SCAN_PROJECTED: &str =
    "FOR d IN @@collection SORT d._key LIMIT @offset, @count RETURN KEEP(d, @fields)";
const SCAN_FULL: &str = "FOR d IN @@collection SORT d._key LIMIT @offset, @count RETURN d";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Validating,
    Planning,
    ScanningVertices,
    ScanningEdges,
    Merging,
    Done,
    Aborted,
}

/// Tracks and logs the orchestrator's progress through its phases.
struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: Phase::Idle,
        }
    }

    fn enter(&mut self, next: Phase) {
        tracing::debug!(from = ?self.current, to = ?next, "ingest phase");
        self.current = next;
    }
}

fn abort<T>(phase: &mut PhaseTracker, err: Error) -> crate::Result<T> {
    // Dropping the scan streams already cancelled in-flight cursors; worker
    // buffers went with their futures. No partial output survives.
    phase.enter(Phase::Aborted);
    tracing::error!(error = %err, "graph ingest aborted");
    Err(err)
}

/// Load feature matrices plus COO edge lists.
pub(crate) async fn run_feature_load(
    database: &str,
    metagraph: &FeatureMetaGraph,
    homogeneous: bool,
    db_config: &DatabaseConfig,
    load: &LoadConfig,
) -> crate::Result<FeatureBundle> {
    let mut phase = PhaseTracker::new();
    match feature_load(&mut phase, database, metagraph, homogeneous, db_config, load).await {
        Ok(bundle) => {
            phase.enter(Phase::Done);
            Ok(bundle)
        }
        Err(err) => abort(&mut phase, err),
    }
}

/// Load only the COO edge lists.
pub(crate) async fn run_coo_load(
    database: &str,
    metagraph: &AttrMetaGraph,
    db_config: &DatabaseConfig,
    load: &LoadConfig,
) -> crate::Result<CooMap> {
    let mut phase = PhaseTracker::new();
    let result = async {
        phase.enter(Phase::Validating);
        let (vertices, edges) = resolve_coo_request(metagraph)?;
        let pool = Pool::connect(db_config).await?;
        let interner = InternerSet::new();

        let (_features, coo) = scan_and_merge_coo(
            &mut phase, &pool, database, &vertices, &edges, load, &interner,
        )
        .await?;
        Ok(coo)
    }
    .await;

    match result {
        Ok(coo) => {
            phase.enter(Phase::Done);
            Ok(coo)
        }
        Err(err) => abort(&mut phase, err),
    }
}

/// Load the NetworkX-like projection.
pub(crate) async fn run_networkx_load(
    database: &str,
    metagraph: &AttrMetaGraph,
    graph: &GraphConfig,
    db_config: &DatabaseConfig,
    load: &LoadConfig,
) -> crate::Result<NetworkXBundle> {
    let mut phase = PhaseTracker::new();
    match networkx_load(&mut phase, database, metagraph, graph, db_config, load).await {
        Ok(bundle) => {
            phase.enter(Phase::Done);
            Ok(bundle)
        }
        Err(err) => abort(&mut phase, err),
    }
}

async fn feature_load(
    phase: &mut PhaseTracker,
    database: &str,
    metagraph: &FeatureMetaGraph,
    homogeneous: bool,
    db_config: &DatabaseConfig,
    load: &LoadConfig,
) -> crate::Result<FeatureBundle> {
    phase.enter(Phase::Validating);
    let resolved = resolve_feature_request(metagraph, homogeneous)?;
    let pool = Pool::connect(db_config).await?;
    let interner = InternerSet::new();

    let (features, coo) = scan_and_merge_coo(
        phase,
        &pool,
        database,
        &resolved.vertices,
        &resolved.edges,
        load,
        &interner,
    )
    .await?;

    let (key_to_ind, ind_to_key) = interner.snapshot();
    Ok(FeatureBundle {
        features,
        coo,
        key_to_ind,
        ind_to_key,
        source_to_output: resolved.source_to_output,
    })
}

/// The shared pipeline of the feature and COO-only modes: plan shards, scan
/// vertices and intern them in shard order, then scan edges and merge their
/// COO segments in shard order.
async fn scan_and_merge_coo(
    phase: &mut PhaseTracker,
    pool: &Pool,
    database: &str,
    vertices: &[VertexRequest],
    edges: &[EdgeRequest],
    load: &LoadConfig,
    interner: &InternerSet,
) -> crate::Result<(HashMap<String, HashMap<String, FeatureMatrix>>, CooMap)> {
    phase.enter(Phase::Planning);
    let vertex_plans = plan_collections(
        pool,
        database,
        vertices.iter().map(|v| v.name.as_str()),
        load.parallelism,
    )
    .await?;
    let edge_plans = plan_collections(
        pool,
        database,
        edges.iter().map(|e| e.name.as_str()),
        load.parallelism,
    )
    .await?;

    // Listed collections materialize in the output even when empty.
    for vertex in vertices {
        interner.collection(&vertex.name);
    }

    phase.enter(Phase::ScanningVertices);
    let segments =
        scan_vertex_shards(pool, database, vertices, &vertex_plans, load, false, false).await?;
    let features = merge_feature_segments(segments, interner, vertices)?;

    phase.enter(Phase::ScanningEdges);
    let edge_segments = scan_coo_edge_shards(pool, database, edges, &edge_plans, load, interner).await?;

    phase.enter(Phase::Merging);
    let mut by_collection: BTreeMap<String, Vec<(usize, CooSegment)>> = BTreeMap::new();
    for (name, shard, segment) in edge_segments {
        by_collection.entry(name).or_default().push((shard, segment));
    }
    let mut coo = CooMap::new();
    for (name, mut segments) in by_collection {
        segments.sort_by_key(|(shard, _)| *shard);
        merge_coo_segments(
            &name,
            segments.into_iter().map(|(_, segment)| segment).collect(),
            &mut coo,
        );
    }
    Ok((features, coo))
}

async fn networkx_load(
    phase: &mut PhaseTracker,
    database: &str,
    metagraph: &AttrMetaGraph,
    graph: &GraphConfig,
    db_config: &DatabaseConfig,
    load: &LoadConfig,
) -> crate::Result<NetworkXBundle> {
    phase.enter(Phase::Validating);
    let (vertices, edges) = resolve_networkx_request(metagraph, graph)?;
    let pool = Pool::connect(db_config).await?;

    phase.enter(Phase::Planning);
    let vertex_plans = plan_collections(
        &pool,
        database,
        vertices.iter().map(|v| v.name.as_str()),
        load.parallelism,
    )
    .await?;
    let edge_plans = plan_collections(
        &pool,
        database,
        edges.iter().map(|e| e.name.as_str()),
        load.parallelism,
    )
    .await?;

    let ids: SharedIdMap = Arc::new(Mutex::new(IdMap::new()));
    let mut node_dict: HashMap<String, Attrs> = HashMap::new();

    if vertices.is_empty() {
        tracing::debug!("no vertex collections listed; vertices are discovered from edges alone");
    } else {
        phase.enter(Phase::ScanningVertices);
        let segments = scan_vertex_shards(
            &pool,
            database,
            &vertices,
            &vertex_plans,
            load,
            true,
            graph.load_all_vertex_attributes,
        )
        .await?;

        // Serialized shard-order interning: dense indices follow scan order.
        let mut ids = ids.lock().unwrap();
        for segment in segments {
            for (id, attrs) in segment.ids.into_iter().zip(segment.attrs) {
                ids.get_or_insert(&id);
                node_dict.insert(id, attrs);
            }
        }
    }

    phase.enter(Phase::ScanningEdges);
    let numeric_fields: Vec<String> = if graph.load_coo {
        edges
            .iter()
            .flat_map(|e| e.fields.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };
    let mut segments = scan_graph_edge_shards(
        &pool,
        database,
        &edges,
        &edge_plans,
        load,
        &ids,
        &numeric_fields,
        graph.load_all_edge_attributes,
    )
    .await?;

    phase.enter(Phase::Merging);
    segments.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));
    let mut merge = EdgeMerge::new(*graph, numeric_fields);
    for (_, _, segment) in segments {
        merge.absorb(segment);
    }
    let merged = merge.finish();

    let key_to_ind = {
        let ids = ids.lock().unwrap();
        ids.clone_maps().0
    };
    let (src_indices, dst_indices) = merged.coo.into_parts();

    Ok(NetworkXBundle {
        node_dict,
        adj_dict: merged.adjacency,
        src_indices,
        dst_indices,
        edge_indices: merged.edge_indices,
        key_to_ind,
        edge_attr_vectors: merged.attr_vectors,
    })
}

/// One count round-trip per collection, then disjoint skip/limit shards.
async fn plan_collections<'a>(
    pool: &Pool,
    database: &str,
    names: impl Iterator<Item = &'a str>,
    parallelism: usize,
) -> crate::Result<HashMap<String, Vec<ShardSpec>>> {
    let mut plans = HashMap::new();
    for name in names {
        let count = count_documents(pool, database, name)
            .await
            .map_err(|err| count_error(name, err))?;
        tracing::info!(collection = name, count, parallelism, "planned collection scan");
        plans.insert(name.to_string(), plan_shards(name, count, parallelism));
    }
    Ok(plans)
}

fn count_error(collection: &str, err: arango_client::Error) -> Error {
    match err {
        arango_client::Error::HttpStatus { code: 404, .. } => {
            Error::UnknownCollection(collection.to_string())
        }
        other => Error::Client(other),
    }
}

#[derive(Debug, serde::Deserialize)]
struct VertexDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    attrs: Attrs,
}

/// One shard's worth of scanned vertices. `columns` is filled in feature
/// mode, `attrs` in the NetworkX-like mode.
struct VertexSegment {
    collection: String,
    shard: usize,
    ids: Vec<String>,
    columns: BTreeMap<String, ColumnData>,
    attrs: Vec<Attrs>,
}

async fn scan_vertex_shards(
    pool: &Pool,
    database: &str,
    requests: &[VertexRequest],
    plans: &HashMap<String, Vec<ShardSpec>>,
    load: &LoadConfig,
    keep_attrs: bool,
    load_all: bool,
) -> crate::Result<Vec<VertexSegment>> {
    let mut tasks = Vec::new();
    for request in requests {
        for spec in plans.get(&request.name).cloned().unwrap_or_default() {
            tasks.push(scan_vertex_shard(
                pool.clone(),
                database.to_string(),
                spec,
                request.fields.clone(),
                *load,
                keep_attrs,
                load_all,
            ));
        }
    }

    let mut segments: Vec<VertexSegment> = futures::stream::iter(tasks)
        .buffer_unordered(load.parallelism.max(1))
        .try_collect()
        .await?;
    segments.sort_by(|a, b| (a.collection.as_str(), a.shard).cmp(&(b.collection.as_str(), b.shard)));
    Ok(segments)
}

/// A lost cursor invalidates only its own shard; the shard re-plans as a
/// fresh scan once before the failure aborts the ingest.
fn is_cursor_lost(err: &Error) -> bool {
    matches!(
        err,
        Error::Client(arango_client::Error::CursorLost { .. })
    )
}

async fn scan_vertex_shard(
    pool: Pool,
    database: String,
    spec: ShardSpec,
    fields: Vec<String>,
    load: LoadConfig,
    keep_attrs: bool,
    load_all: bool,
) -> crate::Result<VertexSegment> {
    match scan_vertex_shard_once(&pool, &database, &spec, &fields, load, keep_attrs, load_all).await
    {
        Err(err) if is_cursor_lost(&err) => {
            tracing::warn!(collection = %spec.collection, shard = spec.index, "cursor lost; re-planning shard scan");
            scan_vertex_shard_once(&pool, &database, &spec, &fields, load, keep_attrs, load_all)
                .await
        }
        other => other,
    }
}

async fn scan_vertex_shard_once(
    pool: &Pool,
    database: &str,
    spec: &ShardSpec,
    fields: &[String],
    load: LoadConfig,
    keep_attrs: bool,
    load_all: bool,
) -> crate::Result<VertexSegment> {
    let mut stream = open_scan(pool, database, spec, (!load_all).then(|| projected_fields(fields, false)), &load);

    let mut segment = VertexSegment {
        collection: spec.collection.clone(),
        shard: spec.index,
        ids: Vec::with_capacity(spec.limit as usize),
        columns: if keep_attrs {
            BTreeMap::new()
        } else {
            fields
                .iter()
                .map(|field| (field.clone(), ColumnData::with_capacity(spec.limit as usize)))
                .collect()
        },
        attrs: Vec::new(),
    };

    while let Some(batch) = stream.try_next().await? {
        for raw in &batch.documents {
            let doc: VertexDoc = decode_doc(raw, &spec.collection)?;
            if keep_attrs {
                let mut attrs = doc.attrs;
                if load_all {
                    attrs.insert("_id".to_string(), doc.id.clone().into());
                }
                segment.attrs.push(attrs);
            } else {
                for field in fields {
                    let column = segment
                        .columns
                        .get_mut(field)
                        .ok_or_else(|| Error::Decode {
                            context: format!("column '{field}' missing from shard state"),
                        })?;
                    column.push_value(&spec.collection, field, doc.attrs.get(field))?;
                }
            }
            segment.ids.push(doc.id);
        }
    }

    tracing::debug!(
        collection = %spec.collection,
        shard = spec.index,
        rows = segment.ids.len(),
        "vertex shard scanned"
    );
    Ok(segment)
}

/// Serialized merge of vertex segments: intern identifiers in shard order (so
/// dense indices equal row positions) and concatenate column segments.
fn merge_feature_segments(
    segments: Vec<VertexSegment>,
    interner: &InternerSet,
    requests: &[VertexRequest],
) -> crate::Result<HashMap<String, HashMap<String, FeatureMatrix>>> {
    let mut per_collection: BTreeMap<String, Vec<VertexSegment>> = BTreeMap::new();
    for segment in segments {
        per_collection
            .entry(segment.collection.clone())
            .or_default()
            .push(segment);
    }

    let mut features = HashMap::with_capacity(requests.len());
    for request in requests {
        let segments = per_collection.remove(&request.name).unwrap_or_default();
        let mut merged: BTreeMap<String, ColumnData> = request
            .fields
            .iter()
            .map(|field| (field.clone(), ColumnData::with_capacity(0)))
            .collect();

        let map = interner.collection(&request.name);
        let mut map = map.lock().unwrap();
        for segment in segments {
            for id in &segment.ids {
                map.get_or_insert(id);
            }
            for (field, column) in segment.columns {
                if let Some(target) = merged.get_mut(&field) {
                    target.append(column, &request.name, &field)?;
                }
            }
        }

        let mut matrices = HashMap::with_capacity(merged.len());
        for (field, column) in merged {
            debug_assert_eq!(column.rows(), map.len());
            matrices.insert(field, column.into_matrix());
        }
        features.insert(request.name.clone(), matrices);
    }
    Ok(features)
}

async fn scan_coo_edge_shards(
    pool: &Pool,
    database: &str,
    requests: &[EdgeRequest],
    plans: &HashMap<String, Vec<ShardSpec>>,
    load: &LoadConfig,
    interner: &InternerSet,
) -> crate::Result<Vec<(String, usize, CooSegment)>> {
    let mut tasks = Vec::new();
    for request in requests {
        for spec in plans.get(&request.name).cloned().unwrap_or_default() {
            tasks.push(scan_coo_edge_shard(
                pool.clone(),
                database.to_string(),
                spec,
                *load,
                interner,
            ));
        }
    }

    futures::stream::iter(tasks)
        .buffer_unordered(load.parallelism.max(1))
        .try_collect()
        .await
}

async fn scan_coo_edge_shard(
    pool: Pool,
    database: String,
    spec: ShardSpec,
    load: LoadConfig,
    interner: &InternerSet,
) -> crate::Result<(String, usize, CooSegment)> {
    match scan_coo_edge_shard_once(&pool, &database, &spec, load, interner).await {
        Err(err) if is_cursor_lost(&err) => {
            tracing::warn!(collection = %spec.collection, shard = spec.index, "cursor lost; re-planning shard scan");
            scan_coo_edge_shard_once(&pool, &database, &spec, load, interner).await
        }
        other => other,
    }
}

async fn scan_coo_edge_shard_once(
    pool: &Pool,
    database: &str,
    spec: &ShardSpec,
    load: LoadConfig,
    interner: &InternerSet,
) -> crate::Result<(String, usize, CooSegment)> {
    let mut stream = open_scan(pool, database, spec, Some(projected_fields(&[], true)), &load);

    let mut segment = CooSegment::default();
    let mut edges = 0usize;
    while let Some(batch) = stream.try_next().await? {
        let docs = decode_batch::<EdgeDoc>(&batch.documents, &spec.collection)?;
        edges += docs.len();
        segment.extend(translate_coo_edges(&docs, interner)?);
    }

    tracing::debug!(collection = %spec.collection, shard = spec.index, edges, "edge shard scanned");
    Ok((spec.collection.clone(), spec.index, segment))
}

#[allow(clippy::too_many_arguments)]
async fn scan_graph_edge_shards(
    pool: &Pool,
    database: &str,
    requests: &[EdgeRequest],
    plans: &HashMap<String, Vec<ShardSpec>>,
    load: &LoadConfig,
    ids: &SharedIdMap,
    numeric_fields: &[String],
    load_all: bool,
) -> crate::Result<Vec<(String, usize, EdgeSegment)>> {
    let mut tasks = Vec::new();
    for request in requests {
        // Project the collection's requested attributes plus whatever the
        // numeric vectors need.
        let mut fields: BTreeSet<String> = request.fields.iter().cloned().collect();
        fields.extend(numeric_fields.iter().cloned());
        let fields: Vec<String> = fields.into_iter().collect();

        for spec in plans.get(&request.name).cloned().unwrap_or_default() {
            tasks.push(scan_graph_edge_shard(
                pool.clone(),
                database.to_string(),
                spec,
                fields.clone(),
                *load,
                ids.clone(),
                numeric_fields.to_vec(),
                load_all,
            ));
        }
    }

    futures::stream::iter(tasks)
        .buffer_unordered(load.parallelism.max(1))
        .try_collect()
        .await
}

#[allow(clippy::too_many_arguments)]
async fn scan_graph_edge_shard(
    pool: Pool,
    database: String,
    spec: ShardSpec,
    fields: Vec<String>,
    load: LoadConfig,
    ids: SharedIdMap,
    numeric_fields: Vec<String>,
    load_all: bool,
) -> crate::Result<(String, usize, EdgeSegment)> {
    match scan_graph_edge_shard_once(&pool, &database, &spec, &fields, load, &ids, &numeric_fields, load_all).await
    {
        Err(err) if is_cursor_lost(&err) => {
            tracing::warn!(collection = %spec.collection, shard = spec.index, "cursor lost; re-planning shard scan");
            scan_graph_edge_shard_once(
                &pool,
                &database,
                &spec,
                &fields,
                load,
                &ids,
                &numeric_fields,
                load_all,
            )
            .await
        }
        other => other,
    }
}

#[allow(clippy::too_many_arguments)]
async fn scan_graph_edge_shard_once(
    pool: &Pool,
    database: &str,
    spec: &ShardSpec,
    fields: &[String],
    load: LoadConfig,
    ids: &SharedIdMap,
    numeric_fields: &[String],
    load_all: bool,
) -> crate::Result<(String, usize, EdgeSegment)> {
    let mut stream = open_scan(
        pool,
        database,
        spec,
        (!load_all).then(|| projected_fields(fields, true)),
        &load,
    );

    let mut segment = EdgeSegment::default();
    while let Some(batch) = stream.try_next().await? {
        let docs = decode_batch::<EdgeDoc>(&batch.documents, &spec.collection)?;
        let translated =
            translate_graph_edges(docs, &spec.collection, ids, numeric_fields, load_all)?;
        segment.entries.extend(translated.entries);
    }

    tracing::debug!(
        collection = %spec.collection,
        shard = spec.index,
        edges = segment.entries.len(),
        "edge shard scanned"
    );
    Ok((spec.collection.clone(), spec.index, segment))
}

fn open_scan(
    pool: &Pool,
    database: &str,
    spec: &ShardSpec,
    fields: Option<Vec<String>>,
    load: &LoadConfig,
) -> CursorStream {
    let query = if fields.is_some() {
        SCAN_PROJECTED
    } else {
        SCAN_FULL
    };

    let mut bind_vars = serde_json::Map::new();
    bind_vars.insert("@collection".to_string(), spec.collection.clone().into());
    bind_vars.insert("offset".to_string(), spec.skip.into());
    bind_vars.insert("count".to_string(), spec.limit.into());
    if let Some(fields) = fields {
        bind_vars.insert("fields".to_string(), fields.into());
    }

    CursorStream::open(
        pool.clone(),
        CursorQuery {
            database: database.to_string(),
            query: query.to_string(),
            bind_vars,
            batch_size: load.batch_size,
        },
        load.prefetch,
    )
}

/// The projection always carries the system fields the decoder relies on.
fn projected_fields(fields: &[String], is_edge: bool) -> Vec<String> {
    let mut all: BTreeSet<String> = fields.iter().cloned().collect();
    all.insert("_id".to_string());
    if is_edge {
        all.insert("_from".to_string());
        all.insert("_to".to_string());
    }
    all.into_iter().collect()
}

fn decode_doc<T: serde::de::DeserializeOwned>(
    raw: &serde_json::value::RawValue,
    collection: &str,
) -> crate::Result<T> {
    serde_json::from_str(raw.get()).map_err(|err| Error::Decode {
        context: format!("document of collection '{collection}': {err}"),
    })
}

fn decode_batch<T: serde::de::DeserializeOwned>(
    raw: &[Box<serde_json::value::RawValue>],
    collection: &str,
) -> crate::Result<Vec<T>> {
    raw.iter().map(|raw| decode_doc(raw, collection)).collect()
}
