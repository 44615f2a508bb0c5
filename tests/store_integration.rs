//! Cross-module store flows: add/search/delete/persist across topologies.

mod common;

use common::{HashEmbedder, embed_all, shared_flat_store};
use contexture::{
    CancellationToken, EmbeddingProvider, IndexOptions, IndexStore, IndexTopology, StoreError,
    VectorDimension,
};
use tempfile::TempDir;

fn unit_axis(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

/// Three 128-dim vectors bound to a/b/c; a query equal to b's vector with
/// top_k=1 returns exactly b at score ~1.0.
#[test]
fn query_equal_to_stored_vector_returns_it_first() {
    let store = shared_flat_store(128);

    let vectors = vec![
        unit_axis(128, 3),
        unit_axis(128, 40),
        unit_axis(128, 90),
    ];
    let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    store.add_vectors(&vectors, &ids).unwrap();

    let hits = store.search(&vectors[1], 1, 0.0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id, "b");
    assert!((hits[0].score.get() - 1.0).abs() < 1e-5);
}

#[test]
fn search_never_returns_more_than_top_k_or_below_threshold() {
    let embedder = HashEmbedder::new(96);
    let store = shared_flat_store(96);

    let entries: Vec<(String, String)> = (0..20)
        .map(|i| (format!("frag-{i}"), format!("fragment number {i} about topic {}", i % 5)))
        .collect();
    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(a, b)| (a.as_str(), b.as_str()))
        .collect();
    let (vectors, ids) = embed_all(&embedder, &borrowed);
    store.add_vectors(&vectors, &ids).unwrap();

    for top_k in [1, 3, 20] {
        for threshold in [0.0, 0.4, 0.9] {
            let query = embedder.embed("fragment number 7 about topic 2").unwrap();
            let hits = store.search(&query, top_k, threshold).unwrap();
            assert!(hits.len() <= top_k);
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
            for hit in &hits {
                assert!(hit.score.get() >= threshold);
            }
        }
    }
}

#[test]
fn add_then_delete_subset_updates_count_and_bindings() {
    let store = shared_flat_store(32);

    let n = 10;
    let vectors: Vec<Vec<f32>> = (0..n).map(|i| unit_axis(32, i * 3)).collect();
    let ids: Vec<String> = (0..n).map(|i| format!("chunk-{i}")).collect();
    store.add_vectors(&vectors, &ids).unwrap();
    assert_eq!(store.count(), n);

    let doomed: Vec<String> = [1, 4, 7].iter().map(|i| format!("chunk-{i}")).collect();
    assert!(store.delete_vectors(&doomed).unwrap());

    assert_eq!(store.count(), n - 3);
    for id in &doomed {
        assert!(matches!(
            store.get_vector(id),
            Err(StoreError::UnknownIdentifier { .. })
        ));
    }
    // Survivors still searchable at full similarity
    let hits = store.search(&vectors[5], 1, 0.0).unwrap();
    assert_eq!(hits[0].external_id, "chunk-5");
}

#[test]
fn delete_with_fired_cancellation_rolls_back() {
    let store = shared_flat_store(16);
    let vectors: Vec<Vec<f32>> = (0..6).map(|i| unit_axis(16, i * 2)).collect();
    let ids: Vec<String> = (0..6).map(|i| format!("v{i}")).collect();
    store.add_vectors(&vectors, &ids).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = store
        .delete_vectors_with_cancel(&["v0".to_string()], &token)
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled));
    assert_eq!(store.count(), 6);
    assert!(store.get_vector("v0").is_ok());
}

#[test]
fn save_load_roundtrip_preserves_vectors_for_every_topology() {
    for topology in [IndexTopology::Flat, IndexTopology::Ivf, IndexTopology::Hnsw] {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(24).unwrap();
        let options = IndexOptions {
            nlist: 2,
            nprobe: 2,
            ..IndexOptions::default()
        };

        let mut store = IndexStore::new(topology, dimension, options).unwrap();
        let vectors: Vec<Vec<f32>> = (0..8).map(|i| unit_axis(24, i * 3)).collect();
        let ids: Vec<String> = (0..8).map(|i| format!("row-{i}")).collect();
        if topology == IndexTopology::Ivf {
            store.train(&vectors).unwrap();
        }
        store.add_vectors(&vectors, &ids).unwrap();
        store.save(temp_dir.path()).unwrap();

        let mut restored = IndexStore::new(topology, dimension, options).unwrap();
        restored.load(temp_dir.path()).unwrap();

        assert_eq!(restored.count(), 8, "topology {topology}");
        for (vector, id) in vectors.iter().zip(&ids) {
            let recovered = restored.get_vector(id).unwrap();
            for (a, b) in recovered.iter().zip(vector) {
                assert!((a - b).abs() < 1e-5, "topology {topology}, id {id}");
            }
        }
    }
}

/// An image built for dimension 768 must be rejected by a 384-dim store,
/// and the store's prior state must survive untouched.
#[test]
fn load_rejects_dimension_mismatch_and_keeps_state() {
    let temp_dir = TempDir::new().unwrap();

    let mut big = IndexStore::new(
        IndexTopology::Flat,
        VectorDimension::new(768).unwrap(),
        IndexOptions::default(),
    )
    .unwrap();
    big.add_vectors(&[unit_axis(768, 0)], &["wide".to_string()])
        .unwrap();
    big.save(temp_dir.path()).unwrap();

    let mut narrow = IndexStore::new(
        IndexTopology::Flat,
        VectorDimension::new(384).unwrap(),
        IndexOptions::default(),
    )
    .unwrap();
    narrow
        .add_vectors(&[unit_axis(384, 1)], &["prior".to_string()])
        .unwrap();

    let err = narrow.load(temp_dir.path()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::PersistedDimensionMismatch {
            expected: 384,
            actual: 768
        }
    ));
    assert_eq!(narrow.count(), 1);
    assert!(narrow.get_vector("prior").is_ok());

    // An empty store is equally protected on first boot
    let mut empty = IndexStore::new(
        IndexTopology::Flat,
        VectorDimension::new(384).unwrap(),
        IndexOptions::default(),
    )
    .unwrap();
    assert!(empty.load(temp_dir.path()).is_err());
    assert_eq!(empty.count(), 0);
}

#[test]
fn ivf_untrained_add_bootstraps_and_assigns_positions() {
    let mut store = IndexStore::new(
        IndexTopology::Ivf,
        VectorDimension::new(32).unwrap(),
        IndexOptions {
            nlist: 4,
            nprobe: 4,
            ..IndexOptions::default()
        },
    )
    .unwrap();

    let positions = store
        .add_vectors(
            &[unit_axis(32, 0), unit_axis(32, 9)],
            &["first".to_string(), "second".to_string()],
        )
        .unwrap();

    assert_eq!(positions[0].get(), 0);
    assert_eq!(positions[1].get(), 1);
    assert_eq!(store.count(), 2);
}

#[test]
fn deletion_then_save_then_load_is_consistent() {
    let temp_dir = TempDir::new().unwrap();
    let store = shared_flat_store(16);

    let vectors: Vec<Vec<f32>> = (0..5).map(|i| unit_axis(16, i)).collect();
    let ids: Vec<String> = (0..5).map(|i| format!("k{i}")).collect();
    store.add_vectors(&vectors, &ids).unwrap();
    store.delete_vectors(&["k2".to_string()]).unwrap();
    store.save(temp_dir.path()).unwrap();

    let restored = shared_flat_store(16);
    restored.load(temp_dir.path()).unwrap();

    assert_eq!(restored.count(), 4);
    assert!(restored.get_vector("k2").is_err());
    let hits = restored.search(&vectors[3], 1, 0.0).unwrap();
    assert_eq!(hits[0].external_id, "k3");
}

#[test]
fn concurrent_readers_during_rebuild_see_consistent_snapshots() {
    let store = shared_flat_store(16);
    let vectors: Vec<Vec<f32>> = (0..16).map(|i| unit_axis(16, i)).collect();
    let ids: Vec<String> = (0..16).map(|i| format!("n{i}")).collect();
    store.add_vectors(&vectors, &ids).unwrap();

    let deleter = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in (0..16).step_by(2) {
                store
                    .delete_vectors(std::slice::from_ref(&format!("n{i}")))
                    .unwrap();
            }
        })
    };

    let searcher = {
        let store = store.clone();
        let query = unit_axis(16, 7);
        std::thread::spawn(move || {
            for _ in 0..100 {
                // Hits must always resolve: a half-rebuilt index would
                // surface unmappable positions or panic
                let hits = store.search(&query, 4, 0.0).unwrap();
                for hit in hits {
                    assert!(hit.external_id.starts_with('n'));
                }
            }
        })
    };

    deleter.join().unwrap();
    searcher.join().unwrap();
    assert_eq!(store.count(), 8);
}
