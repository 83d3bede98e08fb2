//! Knowledge signal: entities and relationships extracted from the corpus.
//!
//! Extraction is delegated to a [`FactExtractor`]. [`extract`] runs it over
//! every document and keeps the first occurrence of each distinct entity
//! and relationship, so the flattened context is stable across runs over
//! the same corpus.
//!
//! The built-in [`RuleExtractor`] is regex based and tuned to the corpus
//! shapes the normalizer produces: `Key: value` lines from JSON events and
//! strategy files, currency pairs, ISO dates, and percentages.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::models::Document;
use crate::persist::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relationship {
    pub source: String,
    pub predicate: String,
    pub target: String,
    pub weight: u32,
}

/// Per-document entity/relationship extraction.
pub trait FactExtractor: Send + Sync {
    /// `(name, label)` pairs found in `text`.
    fn extract_entities(&self, text: &str) -> Vec<(String, String)>;
    /// `(subject, predicate, object)` triples found in `text`.
    fn extract_relationships(&self, text: &str) -> Vec<(String, String, String)>;
}

/// Flat, de-duplicated fact set for the whole corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeFacts {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Run `extractor` over every document and aggregate the results.
pub fn extract(corpus: &[Document], extractor: &dyn FactExtractor) -> KnowledgeFacts {
    let mut facts = KnowledgeFacts::default();
    let mut seen_entities = HashSet::new();
    let mut seen_relationships = HashSet::new();

    for doc in corpus {
        for (name, label) in extractor.extract_entities(&doc.text) {
            let entity = Entity { name, label };
            if seen_entities.insert(entity.clone()) {
                facts.entities.push(entity);
            }
        }
        for (source, predicate, target) in extractor.extract_relationships(&doc.text) {
            let rel = Relationship {
                source,
                predicate,
                target,
                weight: 1,
            };
            if seen_relationships.insert(rel.clone()) {
                facts.relationships.push(rel);
            }
        }
    }

    debug!(
        documents = corpus.len(),
        entities = facts.entities.len(),
        relationships = facts.relationships.len(),
        "extracted knowledge facts"
    );
    facts
}

impl KnowledgeFacts {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// One line per entity, then one per relationship.
    pub fn to_context_lines(&self) -> Vec<String> {
        let entities = self
            .entities
            .iter()
            .map(|e| format!("Entity: {}, Label: {}", e.name, e.label));
        let relationships = self.relationships.iter().map(|r| {
            format!(
                "Relationship: {} -[{}-{}-]-> {}",
                r.source, r.predicate, r.weight, r.target
            )
        });
        entities.chain(relationships).collect()
    }

    /// Write `nodes.csv` (`name,label`) and `relationships.csv`
    /// (`source,target,type,weight`) into `dir`.
    pub fn export_csv(&self, dir: &Path) -> Result<()> {
        let mut nodes = String::from("name,label\n");
        for e in &self.entities {
            nodes.push_str(&csv_row(&[e.name.as_str(), e.label.as_str()]));
        }

        let mut rels = String::from("source,target,type,weight\n");
        for r in &self.relationships {
            rels.push_str(&csv_row(&[
                r.source.as_str(),
                r.target.as_str(),
                r.predicate.as_str(),
                r.weight.to_string().as_str(),
            ]));
        }

        for (name, body) in [("nodes.csv", nodes), ("relationships.csv", rels)] {
            let path = dir.join(name);
            write_atomic(&path, body.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        info!(
            dir = %dir.display(),
            entities = self.entities.len(),
            relationships = self.relationships.len(),
            "exported knowledge graph"
        );
        Ok(())
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

/// RFC 4180 quoting: fields with a comma, quote or line break are wrapped
/// in quotes with inner quotes doubled.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "JPY", "GBP", "AUD", "NZD", "CAD", "CHF", "CNY", "HKD", "SGD", "SEK", "NOK",
    "MXN", "ZAR", "TRY", "XAU", "XAG",
];

/// Keys whose value names what a document is about.
const SUBJECT_KEYS: &[&str] = &["Symbol", "Event", "Title"];

/// Regex-based extractor for forex documents.
pub struct RuleExtractor {
    pair: Regex,
    currency: Regex,
    date: Regex,
    percent: Regex,
    field: Regex,
}

impl RuleExtractor {
    pub fn new() -> Result<Self> {
        let codes = CURRENCY_CODES.join("|");
        Ok(Self {
            pair: Regex::new(&format!(r"\b({codes})/?({codes})[a-z]?\b"))?,
            currency: Regex::new(&format!(r"\b({codes})\b"))?,
            date: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b")?,
            percent: Regex::new(r"[-+]?\b\d+(?:\.\d+)?%")?,
            field: Regex::new(r"^([A-Z][A-Za-z ]{0,30}?):\s*(.+?)\s*$")?,
        })
    }

    /// `Key: value` pairs of a line. A line made only of comma-separated
    /// pairs (a flattened JSON list item) yields each; otherwise the whole
    /// line is one pair or none.
    fn fields<'t>(&self, line: &'t str) -> Vec<(&'t str, &'t str)> {
        let parse = |s: &'t str| {
            self.field.captures(s.trim()).and_then(|c| {
                let key = c.get(1)?.as_str();
                let value = c.get(2)?.as_str();
                Some((key, value))
            })
        };
        let segments: Vec<&str> = line.split(", ").collect();
        if segments.len() > 1 {
            let parsed: Vec<_> = segments.iter().filter_map(|s| parse(*s)).collect();
            if parsed.len() == segments.len() {
                return parsed;
            }
        }
        parse(line).into_iter().collect()
    }
}

fn subject_of<'t>(fields: &[(&'t str, &'t str)]) -> Option<&'t str> {
    fields
        .iter()
        .find(|(k, _)| SUBJECT_KEYS.contains(k))
        .map(|(_, v)| *v)
}

impl FactExtractor for RuleExtractor {
    fn extract_entities(&self, text: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for c in self.pair.captures_iter(text) {
            if let (Some(base), Some(quote)) = (c.get(1), c.get(2)) {
                if base.as_str() != quote.as_str() {
                    out.push((
                        format!("{}/{}", base.as_str(), quote.as_str()),
                        "CURRENCY_PAIR".to_string(),
                    ));
                }
            }
        }
        for m in self.currency.find_iter(text) {
            out.push((m.as_str().to_string(), "CURRENCY".to_string()));
        }
        for m in self.date.find_iter(text) {
            out.push((m.as_str().to_string(), "DATE".to_string()));
        }
        for m in self.percent.find_iter(text) {
            out.push((m.as_str().to_string(), "PERCENT".to_string()));
        }

        let mut seen = HashSet::new();
        out.retain(|e| seen.insert(e.clone()));
        out
    }

    fn extract_relationships(&self, text: &str) -> Vec<(String, String, String)> {
        let lines: Vec<Vec<(&str, &str)>> = text.lines().map(|l| self.fields(l)).collect();
        let document_subject = lines.iter().find_map(|f| subject_of(f));

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for fields in &lines {
            let Some(subject) = subject_of(fields).or(document_subject) else {
                continue;
            };
            for (key, value) in fields {
                if SUBJECT_KEYS.contains(key) && *value == subject {
                    continue;
                }
                let triple = (subject.to_string(), key.to_string(), value.to_string());
                if seen.insert(triple.clone()) {
                    out.push(triple);
                }
            }
        }
        out
    }
}
