use audit_index::{ChunkIndex, Embedder, HashEmbedder};
use audit_protocol::{chunk_id, Chunk, Corpus, Document};
use proptest::prelude::*;
use std::sync::Arc;

const DIMENSION: usize = 16;

fn document(id: &str, corpus: Corpus, texts: &[String]) -> Document {
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(seq, text)| Chunk {
            id: chunk_id(id, seq),
            document_id: id.to_string(),
            corpus,
            sequence: seq,
            heading_path: vec![format!("Section {seq}")],
            label: Some(format!("{}", seq + 1)),
            text: text.clone(),
            start: 0,
            end: text.len(),
            embedding: None,
        })
        .collect();
    Document {
        id: id.to_string(),
        corpus,
        title: id.to_string(),
        chunks,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

#[tokio::test]
async fn shared_index_serves_concurrent_readers() {
    let embedder = Arc::new(HashEmbedder::new(DIMENSION));
    let mut index = ChunkIndex::new(embedder.clone());
    let texts: Vec<String> = (0..6).map(|i| format!("regulation paragraph {i}")).collect();
    index
        .upsert_document(&document("reg", Corpus::Regulation, &texts))
        .await
        .expect("upsert");
    let shared = index.into_shared();

    let mut handles = Vec::new();
    for i in 0..4 {
        let shared = Arc::clone(&shared);
        let embedder = Arc::clone(&embedder);
        handles.push(tokio::spawn(async move {
            let query = embedder.embed(&format!("paragraph {i}")).await.expect("embed");
            let guard = shared.read().await;
            guard.nearest(Corpus::Regulation, &query, 3).expect("nearest").len()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join"), 3);
    }
}

proptest! {
    #[test]
    fn proptest_nearest_is_bounded_sorted_and_partitioned(
        manual in prop::collection::vec("[a-z]{2,8}( [a-z]{2,8}){0,6}", 0..12),
        regulation in prop::collection::vec("[a-z]{2,8}( [a-z]{2,8}){0,6}", 0..12),
        query in "[a-z]{2,8}( [a-z]{2,8}){0,3}",
        k in 0usize..8,
    ) {
        let rt = runtime();
        let embedder = Arc::new(HashEmbedder::new(DIMENSION));
        let mut index = ChunkIndex::new(embedder.clone());
        rt.block_on(async {
            index.upsert_document(&document("moe", Corpus::Manual, &manual)).await
        }).expect("manual");
        rt.block_on(async {
            index.upsert_document(&document("reg", Corpus::Regulation, &regulation)).await
        }).expect("regulation");

        let vector = embedder.embed_sync(&query);
        let hits = index.nearest(Corpus::Regulation, &vector, k).expect("nearest");

        prop_assert!(hits.len() <= k);
        prop_assert_eq!(hits.len(), k.min(regulation.len()));
        for hit in &hits {
            prop_assert_eq!(hit.chunk.corpus, Corpus::Regulation);
        }
        for pair in hits.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
    }
}
