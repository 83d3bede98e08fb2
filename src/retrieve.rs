//! Hybrid retriever and answer arbiter.
//!
//! Per query:
//!
//! 1. Normalize the query and check the [`ResultCache`]; a hit returns at
//!    once, without embedding or searching.
//! 2. Produce two [`Candidate`]s concurrently:
//!    - graph: the flattened [`KnowledgeFacts`] as context
//!    - vector: the top-k corpus documents by cosine similarity
//! 3. [`arbitrate`] between them and cache the result.
//!
//! Collaborator failures become [`Candidate::Failed`]; nothing on this path
//! returns an error to the query loop.

use tracing::{debug, warn};

use crate::cache::{normalize_query, ResultCache};
use crate::embedding::{embed_query, Embedder};
use crate::generate::Generator;
use crate::index::IndexedCorpus;
use crate::knowledge::KnowledgeFacts;
use crate::models::{Document, SearchHit};

/// Returned when neither context source produced an answer.
pub const UNABLE_TO_ANSWER: &str =
    "Unable to answer: neither the knowledge graph nor the document index produced a response.";

/// One context source's answer, or the reason it has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Answer(String),
    Failed(String),
}

impl Candidate {
    pub fn is_failed(&self) -> bool {
        matches!(self, Candidate::Failed(_))
    }
}

/// Pick the final answer.
///
/// Both failed gives [`UNABLE_TO_ANSWER`]; one failed gives the other.
/// Otherwise the longer text wins, as a rough proxy for detail, and a
/// tie goes to the vector candidate.
pub fn arbitrate(graph: Candidate, vector: Candidate) -> String {
    match (graph, vector) {
        (Candidate::Failed(_), Candidate::Failed(_)) => UNABLE_TO_ANSWER.to_string(),
        (Candidate::Failed(_), Candidate::Answer(v)) => v,
        (Candidate::Answer(g), Candidate::Failed(_)) => g,
        (Candidate::Answer(g), Candidate::Answer(v)) => {
            if g.chars().count() > v.chars().count() {
                g
            } else {
                v
            }
        }
    }
}

/// Map search hits to corpus documents, dropping positions past the end.
pub fn select_documents<'c>(hits: &[SearchHit], corpus: &'c [Document]) -> Vec<(SearchHit, &'c Document)> {
    hits.iter()
        .filter_map(|hit| corpus.get(hit.position).map(|doc| (*hit, doc)))
        .collect()
}

/// Final answer plus the documents the vector candidate was given.
#[derive(Debug, Clone)]
pub struct Answer<'c> {
    pub text: String,
    /// Empty on a cache hit.
    pub documents: Vec<(SearchHit, &'c Document)>,
    pub cached: bool,
}

pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    generator: &'a dyn Generator,
    cache: ResultCache,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
        cache_capacity: usize,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            cache: ResultCache::new(cache_capacity),
            top_k: top_k.max(1),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Answer `query`, serving repeated queries from the cache.
    pub async fn answer<'c>(
        &mut self,
        query: &str,
        data: &'c IndexedCorpus,
        facts: &KnowledgeFacts,
    ) -> Answer<'c> {
        let key = normalize_query(query);
        if let Some(text) = self.cache.get(&key) {
            debug!(query = %key, "cache hit");
            return Answer {
                text,
                documents: Vec::new(),
                cached: true,
            };
        }

        let (graph, (vector, documents)) = tokio::join!(
            self.graph_candidate(query, facts),
            self.vector_candidate(query, data)
        );
        for (source, candidate) in [("graph", &graph), ("vector", &vector)] {
            if let Candidate::Failed(reason) = candidate {
                warn!(source, reason = %reason, "candidate failed");
            }
        }

        let text = arbitrate(graph, vector);
        self.cache.put(&key, text.clone());
        Answer {
            text,
            documents,
            cached: false,
        }
    }

    /// Top-k documents for `query`, best first.
    pub async fn retrieve<'c>(
        &self,
        query: &str,
        data: &'c IndexedCorpus,
    ) -> anyhow::Result<Vec<(SearchHit, &'c Document)>> {
        let vector = embed_query(self.embedder, query.trim()).await?;
        let hits = data.index().search(&vector, self.top_k)?;
        Ok(select_documents(&hits, data.corpus()))
    }

    async fn graph_candidate(&self, query: &str, facts: &KnowledgeFacts) -> Candidate {
        let context = facts.to_context_lines();
        match self.generator.generate(query.trim(), &context).await {
            Ok(text) => Candidate::Answer(text),
            Err(e) => Candidate::Failed(e.to_string()),
        }
    }

    async fn vector_candidate<'c>(
        &self,
        query: &str,
        data: &'c IndexedCorpus,
    ) -> (Candidate, Vec<(SearchHit, &'c Document)>) {
        let documents = match self.retrieve(query, data).await {
            Ok(docs) => docs,
            Err(e) => return (Candidate::Failed(format!("{:#}", e)), Vec::new()),
        };
        let context: Vec<String> = documents.iter().map(|(_, d)| d.text.clone()).collect();
        let candidate = match self.generator.generate(query.trim(), &context).await {
            Ok(text) => Candidate::Answer(text),
            Err(e) => Candidate::Failed(e.to_string()),
        };
        (candidate, documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(s: &str) -> Candidate {
        Candidate::Answer(s.to_string())
    }

    fn failed() -> Candidate {
        Candidate::Failed("no valid context found".to_string())
    }

    #[test]
    fn failed_graph_yields_vector_answer() {
        assert_eq!(arbitrate(failed(), answer("valid answer")), "valid answer");
        assert_eq!(arbitrate(answer("graph answer"), failed()), "graph answer");
    }

    #[test]
    fn both_failed_yields_fixed_message() {
        assert_eq!(arbitrate(failed(), failed()), UNABLE_TO_ANSWER);
    }

    #[test]
    fn longer_answer_wins_and_ties_favor_vector() {
        let short = "s".repeat(50);
        let long = "l".repeat(80);
        assert_eq!(arbitrate(answer(&short), answer(&long)), long);
        assert_eq!(arbitrate(answer(&long), answer(&short)), long);
        assert_eq!(arbitrate(answer("graph"), answer("vectr")), "vectr");
    }

    #[test]
    fn out_of_range_positions_are_dropped() {
        let corpus = vec![
            Document::new("a", None).unwrap(),
            Document::new("b", None).unwrap(),
        ];
        let hits = [
            SearchHit { position: 1, score: 0.9 },
            SearchHit { position: 7, score: 0.8 },
            SearchHit { position: 0, score: 0.1 },
        ];
        let selected = select_documents(&hits, &corpus);
        let texts: Vec<&str> = selected.iter().map(|(_, d)| d.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
    }
}
