//! # Forex RAG
//!
//! Incremental indexing and hybrid retrieval for question answering over a
//! growing corpus of forex documents: news text, PDF reports, JSON economic
//! events, spreadsheets, and strategy signal files.
//!
//! ## Architecture
//!
//! ```text
//!  index refresh                                   query loop
//! ┌──────────┐  ┌───────────┐  ┌────────┐        ┌─────────┐
//! │ Tracker  │─▶│ Normalize │─▶│ Corpus │        │  Cache  │
//! │ sha-256  │  │ txt/pdf/… │  └───┬────┘        └────┬────┘
//! └──────────┘  └───────────┘      ▼    miss          ▼
//!                             ┌─────────┐  ┌──────────────────────┐
//!                             │  Index  │─▶│ Retriever + Arbiter  │
//!                             │ exact / │  │ graph ∥ vector       │
//!                             │ IVF     │  └──────────────────────┘
//!                             └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fxrag index                 # scan data/, embed, build the index
//! fxrag ask "EUR/USD outlook after NFP?"
//! fxrag chat                  # interactive loop, `exit` to quit
//! fxrag graph export          # nodes.csv + relationships.csv
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed errors for index, generation, extraction |
//! | [`models`] | Core data types |
//! | [`tracker`] | Content-fingerprint change detection |
//! | [`extract`] | PDF / XLSX / CSV text extraction |
//! | [`normalize`] | File → single plain-text document |
//! | [`corpus`] | Ordered document store |
//! | [`persist`] | Atomic file replacement |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Exact and clustered vector index, persistence |
//! | [`knowledge`] | Entity/relationship facts and CSV export |
//! | [`generate`] | Answer generation provider |
//! | [`cache`] | LRU answer cache |
//! | [`retrieve`] | Hybrid retriever and arbiter |
//! | [`pipeline`] | Index refresh state machine |
//! | [`progress`] | Refresh progress on stderr |
//! | [`signals`] | Strategy signal generators and registry |
//! | [`stats`] | Index statistics |

pub mod cache;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod knowledge;
pub mod models;
pub mod normalize;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod retrieve;
pub mod signals;
pub mod stats;
pub mod tracker;
