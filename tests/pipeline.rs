mod common;

use common::{BucketEmbedder, Workspace};
use forex_rag::error::IndexError;
use forex_rag::index::{IndexMode, IndexedCorpus};
use forex_rag::pipeline::{refresh, RefreshKind};
use forex_rag::progress::NoProgress;

#[tokio::test]
async fn cold_start_then_warm_then_incremental() {
    let ws = Workspace::new();
    ws.write("news/eurusd.txt", "EUR/USD rallied after the ECB decision.");
    ws.write(
        "economic_events/nfp.json",
        r#"{"event": "Non-Farm Payrolls", "currency": "USD", "impact": "High"}"#,
    );
    let embedder = BucketEmbedder::new();

    let cold = refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();
    assert_eq!(cold.kind, RefreshKind::ColdStart);
    assert_eq!(cold.changed_files, 2);
    let sources: Vec<_> = cold
        .data
        .corpus()
        .iter()
        .map(|d| d.source.clone().unwrap())
        .collect();
    assert_eq!(sources, vec!["economic_events/nfp.json", "news/eurusd.txt"]);
    assert!(cold.data.corpus()[0].text.contains("Event: Non-Farm Payrolls"));

    let warm = refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();
    assert_eq!(warm.kind, RefreshKind::Warm);
    assert_eq!(warm.changed_files, 0);
    assert_eq!(warm.data.corpus().len(), 2);

    ws.write("news/eurusd.txt", "EUR/USD fell as the dollar strengthened.");
    ws.write("news/gbpusd.txt", "GBP/USD consolidates ahead of the BoE.");
    let inc = refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();
    assert_eq!(inc.kind, RefreshKind::Incremental);
    assert_eq!(inc.changed_files, 2);
    assert_eq!(inc.documents_updated, 2);

    let corpus = inc.data.corpus();
    assert_eq!(corpus.len(), 3);
    // Edited file keeps its slot; the new file is appended.
    assert_eq!(corpus[1].source.as_deref(), Some("news/eurusd.txt"));
    assert_eq!(corpus[1].text, "EUR/USD fell as the dollar strengthened.");
    assert_eq!(corpus[2].source.as_deref(), Some("news/gbpusd.txt"));
    assert_eq!(inc.data.index().len(), 3);
}

#[tokio::test]
async fn saved_pair_reloads_aligned() {
    let ws = Workspace::new();
    ws.write("a.txt", "Gold and the yen both caught a safe-haven bid.");
    ws.write("b.txt", "AUD/USD tracks iron ore prices.");
    let embedder = BucketEmbedder::new();

    refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();
    let loaded = IndexedCorpus::load(&ws.config).unwrap();
    assert_eq!(loaded.corpus().len(), 2);
    assert_eq!(loaded.index().len(), 2);
    assert_eq!(loaded.index().dims(), common::DIMS);
    assert_eq!(loaded.index().model(), "bucket");
    assert_eq!(loaded.index().mode(), IndexMode::Exact);
}

#[tokio::test]
async fn empty_root_is_an_error() {
    let ws = Workspace::new();
    let err = refresh(&ws.config, &BucketEmbedder::new(), false, &NoProgress)
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::EmptyCorpus)
    ));
}

#[tokio::test]
async fn files_without_text_are_skipped() {
    let ws = Workspace::new();
    ws.write("good.txt", "USD/JPY breaks 150.");
    ws.write("blank.txt", "   \n\n");
    ws.write("broken.json", "{not json");

    let outcome = refresh(&ws.config, &BucketEmbedder::new(), false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.changed_files, 3);
    assert_eq!(outcome.documents_updated, 1);
    assert_eq!(outcome.data.corpus().len(), 1);
}

#[tokio::test]
async fn corrupt_index_triggers_cold_start() {
    let ws = Workspace::new();
    ws.write("a.txt", "EUR/CHF pinned near parity.");
    let embedder = BucketEmbedder::new();
    refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();

    std::fs::write(ws.config.index_path(), b"not an index").unwrap();
    let outcome = refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();
    assert_eq!(outcome.kind, RefreshKind::ColdStart);
    assert_eq!(outcome.data.corpus().len(), 1);
    assert!(IndexedCorpus::load(&ws.config).is_ok());
}

#[tokio::test]
async fn full_refresh_rebuilds_unchanged_data() {
    let ws = Workspace::new();
    ws.write("a.txt", "NZD/USD slips on dairy auction.");
    let embedder = BucketEmbedder::new();
    refresh(&ws.config, &embedder, false, &NoProgress).await.unwrap();

    let outcome = refresh(&ws.config, &embedder, true, &NoProgress).await.unwrap();
    assert_eq!(outcome.kind, RefreshKind::ColdStart);
    assert_eq!(outcome.changed_files, 1);
}

#[tokio::test]
async fn excluded_directories_are_not_indexed() {
    let ws = Workspace::new();
    ws.write("news/a.txt", "EUR/USD flat.");
    ws.write("economic_events/raw/dump.txt", "raw feed that must stay out");

    let outcome = refresh(&ws.config, &BucketEmbedder::new(), false, &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.data.corpus().len(), 1);
    assert_eq!(
        outcome.data.corpus()[0].source.as_deref(),
        Some("news/a.txt")
    );
}

#[tokio::test]
async fn large_corpus_builds_clustered_index() {
    let mut ws = Workspace::new();
    ws.config.index.clustered_threshold = 8;
    ws.config.index.max_clusters = 4;
    ws.config.index.nprobe = 4;
    for i in 0..12 {
        ws.write(
            &format!("notes/n{:02}.txt", i),
            &format!("note {} about pair{} and level{}", i, i % 3, i % 5),
        );
    }

    let outcome = refresh(&ws.config, &BucketEmbedder::new(), false, &NoProgress)
        .await
        .unwrap();
    assert!(matches!(
        outcome.data.index().mode(),
        IndexMode::Clustered { clusters: 4, nprobe: 4 }
    ));

    let loaded = IndexedCorpus::load(&ws.config).unwrap();
    assert_eq!(loaded.index().len(), 12);
}

#[tokio::test]
async fn embedder_change_forces_cold_start() {
    let ws = Workspace::new();
    ws.write("a.txt", "EUR/USD holds above 1.08.");
    ws.write("b.txt", "USD/CAD follows crude oil.");
    let original = BucketEmbedder::new();
    refresh(&ws.config, &original, false, &NoProgress).await.unwrap();

    // Different dimension: the saved vectors cannot be searched at all.
    let smaller = BucketEmbedder::named("bucket-small", 8);
    let outcome = refresh(&ws.config, &smaller, false, &NoProgress).await.unwrap();
    assert_eq!(outcome.kind, RefreshKind::ColdStart);
    assert_eq!(outcome.data.index().dims(), 8);
    assert_eq!(outcome.data.index().model(), "bucket-small");
    assert_eq!(outcome.data.corpus().len(), 2);

    // Same dimension, different model: vectors would be silently wrong.
    let renamed = BucketEmbedder::named("bucket-v2", 8);
    let outcome = refresh(&ws.config, &renamed, false, &NoProgress).await.unwrap();
    assert_eq!(outcome.kind, RefreshKind::ColdStart);
    assert_eq!(outcome.data.index().model(), "bucket-v2");

    // Unchanged embedder: warm again.
    let outcome = refresh(&ws.config, &renamed, false, &NoProgress).await.unwrap();
    assert_eq!(outcome.kind, RefreshKind::Warm);
}
