use graphlift::{
    load_coo, load_features, load_features_homogeneous, load_networkx, AttrMetaGraph,
    DatabaseConfig, Error, FeatureMetaGraph, GraphConfig, LoadConfig,
};

fn unreachable_config() -> DatabaseConfig {
    // Nothing listens on port 1; connections are refused immediately.
    let mut config = DatabaseConfig::new(vec!["http://127.0.0.1:1".to_string()]);
    config.retries = 0;
    config
}

fn subjects_metagraph() -> FeatureMetaGraph {
    serde_json::from_value(serde_json::json!({
        "vertexCollections": {"Subjects": {"x": "brain_fmri_features"}},
        "edgeCollections": {"medical_affinity_graph": {}},
    }))
    .unwrap()
}

#[tokio::test]
async fn validation_rejects_before_any_io() {
    // The endpoint is bogus, but validation fires first: no vertexCollections.
    let metagraph = FeatureMetaGraph::default();
    let err = load_features("abide", &metagraph, &unreachable_config(), &LoadConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestInvalid(_)));
    assert!(err.to_string().contains("vertexCollections not found in metagraph"));

    let metagraph: AttrMetaGraph = serde_json::from_value(serde_json::json!({
        "vertexCollections": {"Subjects": []},
    }))
    .unwrap();
    let err = load_coo("abide", &metagraph, &unreachable_config(), &LoadConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("edgeCollections not found in metagraph"));
}

#[tokio::test]
async fn homogeneous_mode_rejects_multiple_collections() {
    let metagraph: FeatureMetaGraph = serde_json::from_value(serde_json::json!({
        "vertexCollections": {
            "Subjects": {"x": "brain_fmri_features"},
            "Scanners": {"x": "vendor_code"},
        },
    }))
    .unwrap();

    let err = load_features_homogeneous(
        "abide",
        &metagraph,
        &unreachable_config(),
        &LoadConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::RequestInvalid(_)));
}

#[tokio::test]
async fn ambiguous_attribute_request_is_rejected() {
    let metagraph: AttrMetaGraph = serde_json::from_value(serde_json::json!({
        "vertexCollections": {"Subjects": ["label"]},
        "edgeCollections": {"medical_affinity_graph": []},
    }))
    .unwrap();
    let graph = GraphConfig {
        load_all_vertex_attributes: true,
        ..GraphConfig::default()
    };

    let err = load_networkx(
        "abide",
        &metagraph,
        &graph,
        &unreachable_config(),
        &LoadConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::RequestInvalid(_)));
}

#[tokio::test]
async fn transport_failures_surface_and_abort() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();

    let err = load_features(
        "abide",
        &subjects_metagraph(),
        &unreachable_config(),
        &LoadConfig::default(),
    )
    .await
    .unwrap_err();

    // The failure comes from the wire layer; no partial bundle is returned.
    match err {
        Error::Client(cause) => assert!(cause.is_transient()),
        other => panic!("expected a client error, got {other}"),
    }
}
