mod common;

use common::{BucketEmbedder, EchoGenerator, FailingGenerator};
use forex_rag::config::IndexConfig;
use forex_rag::index::{IndexBuilder, IndexedCorpus};
use forex_rag::knowledge::{self, KnowledgeFacts, RuleExtractor};
use forex_rag::models::Document;
use forex_rag::retrieve::{Retriever, UNABLE_TO_ANSWER};

fn doc(text: &str, source: &str) -> Document {
    Document::new(text, Some(source.to_string())).unwrap()
}

async fn indexed(docs: Vec<Document>, embedder: &BucketEmbedder) -> IndexedCorpus {
    let index = IndexBuilder::new(IndexConfig::default(), 8, 1)
        .build(&docs, embedder)
        .await
        .unwrap();
    IndexedCorpus::new(docs, index).unwrap()
}

fn corpus() -> Vec<Document> {
    vec![
        doc("Symbol: EURUSD\nStrategy: Bounce\nTrend: bullish", "strategies/a.txt"),
        doc("Gold rallied as real yields dropped", "news/gold.txt"),
        doc("Event: CPI\nCurrency: USD\nImpact: High", "economic_events/cpi.json"),
    ]
}

#[tokio::test]
async fn retrieve_ranks_the_closest_document_first() {
    let embedder = BucketEmbedder::new();
    let data = indexed(corpus(), &embedder).await;
    let generator = EchoGenerator::new();
    let retriever = Retriever::new(&embedder, &generator, 8, 2);

    let hits = retriever
        .retrieve("why gold rallied when yields dropped", &data)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].1.source.as_deref(), Some("news/gold.txt"));
    assert!(hits[0].0.score >= hits[1].0.score);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let embedder = BucketEmbedder::new();
    let data = indexed(corpus(), &embedder).await;
    let facts = knowledge::extract(data.corpus(), &RuleExtractor::new().unwrap());
    let generator = EchoGenerator::new();
    let mut retriever = Retriever::new(&embedder, &generator, 8, 3);

    let embedded_for_index = embedder.calls();
    let first = retriever.answer("What is the EURUSD trend?", &data, &facts).await;
    assert!(!first.cached);
    assert_eq!(first.documents.len(), 3);
    assert_eq!(generator.calls(), 2);
    // One query embedding for the vector candidate.
    assert_eq!(embedder.calls(), embedded_for_index + 1);

    let second = retriever.answer("  what is the eurusd TREND?  ", &data, &facts).await;
    assert!(second.cached);
    assert_eq!(second.text, first.text);
    assert!(second.documents.is_empty());
    // A hit does no embedding, search or generation.
    assert_eq!(generator.calls(), 2);
    assert_eq!(embedder.calls(), embedded_for_index + 1);
    assert_eq!(retriever.cache().len(), 1);
}

#[tokio::test]
async fn vector_answer_used_when_graph_has_no_facts() {
    let embedder = BucketEmbedder::new();
    let data = indexed(corpus(), &embedder).await;
    let generator = EchoGenerator::new();
    let mut retriever = Retriever::new(&embedder, &generator, 8, 1);

    let answer = retriever
        .answer("gold yields", &data, &KnowledgeFacts::default())
        .await
        .text;
    assert!(answer.starts_with("gold yields => "));
    assert!(answer.contains("Gold rallied as real yields dropped"));
}

#[tokio::test]
async fn both_sources_failing_gives_fixed_message() {
    let embedder = BucketEmbedder::new();
    let data = indexed(corpus(), &embedder).await;
    let facts = knowledge::extract(data.corpus(), &RuleExtractor::new().unwrap());
    let mut retriever = Retriever::new(&embedder, &FailingGenerator, 8, 3);

    let answer = retriever.answer("EURUSD outlook", &data, &facts).await;
    assert_eq!(answer.text, UNABLE_TO_ANSWER);
    assert_eq!(retriever.cache().len(), 1);
}

#[tokio::test]
async fn longer_candidate_wins() {
    let embedder = BucketEmbedder::new();
    let data = indexed(corpus(), &embedder).await;
    let facts = knowledge::extract(data.corpus(), &RuleExtractor::new().unwrap());
    assert!(!facts.is_empty());
    let generator = EchoGenerator::new();
    // top_k 1 keeps the vector context to one short document, while the
    // graph context carries every extracted fact.
    let mut retriever = Retriever::new(&embedder, &generator, 8, 1);

    let answer = retriever.answer("CPI", &data, &facts).await;
    assert!(answer.text.contains("Entity: "));
    assert_eq!(answer.documents.len(), 1);
}
