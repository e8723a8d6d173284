use audit_chunker::{Chunker, ChunkerConfig};
use audit_context::{ContextBuilder, ContextLimits, EntryOrigin};
use audit_index::{ChunkIndex, HashEmbedder};
use audit_protocol::{Corpus, Document};
use audit_references::{ReferenceResolver, ResolverConfig};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const MANUAL: &str = "\
## 1 Scope

This manual covers line maintenance of the fleet.

## 2 Certifying staff

Staff authorisation follows the scope defined in Section 1.

## 3 Tools

Tools are calibrated annually.
";

const REGULATION: &str = "\
145.A.30 Personnel requirements

The organisation shall appoint certifying staff.

145.A.40 Equipment and tools

Tools shall be controlled and calibrated.
";

fn chunk(id: &str, corpus: Corpus, text: &str) -> Document {
    Chunker::new(ChunkerConfig::default())
        .expect("config")
        .chunk_into_document(id, corpus, id, text)
        .expect("chunks")
}

async fn builder(documents: &[Document], limits: ContextLimits) -> ContextBuilder {
    let mut index = ChunkIndex::new(Arc::new(HashEmbedder::new(64)));
    for document in documents {
        index.upsert_document(document).await.expect("index");
    }
    ContextBuilder::new(
        index.into_shared(),
        ReferenceResolver::new(ResolverConfig::default()),
        limits,
    )
    .expect("builder")
}

#[tokio::test]
async fn referenced_chunk_lands_in_references_slice() {
    let manual = chunk("moe", Corpus::Manual, MANUAL);
    let regulation = chunk("part145", Corpus::Regulation, REGULATION);
    let builder = builder(&[manual.clone(), regulation], ContextLimits::default()).await;

    let second = builder
        .build(Arc::new(manual.chunks[1].clone()), &[])
        .await
        .expect("bundle");
    assert_eq!(second.references.len(), 1);
    assert_eq!(second.references[0].chunk.id, "moe#0");
    assert_eq!(
        second.references[0].origin,
        EntryOrigin::Reference {
            label: "1".to_string(),
            depth: 1
        }
    );
    assert!(!second.manual_neighbors.iter().any(|e| e.chunk.id == "moe#0"));
    assert_eq!(second.regulation.len(), 2);
    assert!(second.render_text(0).contains("line maintenance"));

    let first = builder
        .build(Arc::new(manual.chunks[0].clone()), &[])
        .await
        .expect("bundle");
    assert!(first.references.is_empty());
    assert!(first.manual_neighbors.iter().any(|e| e.chunk.id == "moe#1"));
}

#[tokio::test]
async fn follow_up_queries_add_hits_without_duplicates() {
    let manual = chunk("moe", Corpus::Manual, MANUAL);
    let regulation = chunk("part145", Corpus::Regulation, REGULATION);
    let limits = ContextLimits {
        k_manual: 1,
        k_regulation: 1,
        ..Default::default()
    };
    let builder = builder(&[manual.clone(), regulation], limits).await;

    let focus = Arc::new(manual.chunks[2].clone());
    let without = builder.build(Arc::clone(&focus), &[]).await.expect("bundle");
    let with = builder
        .build(Arc::clone(&focus), &["certifying staff appointment".to_string()])
        .await
        .expect("bundle");

    assert_eq!(with.queries, vec!["certifying staff appointment"]);
    assert!(with.counts().total() > without.counts().total());
    assert!(with.entries().any(
        |e| matches!(&e.origin, EntryOrigin::Query(q) if q == "certifying staff appointment")
    ));

    let ids: Vec<&str> = with.entries().map(|e| e.chunk.id.as_str()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert!(!unique.contains(focus.id.as_str()));
}

proptest! {
    #[test]
    fn proptest_bundle_excludes_focus_and_duplicates(
        focus_seq in 0usize..3,
        queries in prop::collection::vec("[a-z]{3,10}( [a-z]{3,10}){0,2}", 0..4),
        k in 0usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let bundle = runtime.block_on(async {
            let manual = chunk("moe", Corpus::Manual, MANUAL);
            let regulation = chunk("part145", Corpus::Regulation, REGULATION);
            let limits = ContextLimits {
                k_manual: k,
                k_regulation: k,
                k_guidance: k,
                k_evidence: k,
                ..Default::default()
            };
            let builder = builder(&[manual.clone(), regulation], limits).await;
            builder
                .build(Arc::new(manual.chunks[focus_seq].clone()), &queries)
                .await
                .expect("bundle")
        });

        let mut seen = HashSet::new();
        for entry in bundle.entries() {
            prop_assert!(entry.chunk.id != bundle.focus.id);
            prop_assert!(seen.insert(entry.chunk.id.clone()));
        }
        for corpus in Corpus::ALL {
            prop_assert!(bundle.slice(corpus).len() <= ContextLimits::default().max_slice_entries);
            for entry in bundle.slice(corpus) {
                prop_assert_eq!(entry.chunk.corpus, corpus);
            }
        }
    }
}
