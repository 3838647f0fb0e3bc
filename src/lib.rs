//! portfoliograph: landlord portfolios from HPD registration contacts
//!
//! Building owners in NYC register a set of contacts (owners, officers,
//! agents) for each building with HPD. This library links those contacts
//! into an identity graph and cuts it into portfolios: groups of tax lots
//! (BBLs) that appear to share a landlord.
//!
//! The batch runs in five stages:
//!
//! 1. [`source`] and [`standardize`]: read a snapshot and standardize
//!    business addresses.
//! 2. [`extract`]: keep current owner/officer contacts.
//! 3. [`normalize`] and [`graph`]: canonical names and addresses become
//!    nodes, each contact an edge.
//! 4. [`split`]: connected components, with oversized ones partitioned by
//!    Louvain community detection ([`community`]).
//! 5. [`export`] and [`search_index`]: the portfolio table and the landlord
//!    search feed.
//!
//! # Example
//!
//! ```no_run
//! use portfoliograph::{
//!     JsonLinesIndex, Passthrough, Pipeline, PipelineConfig, SqlitePortfolioTable,
//!     SqliteSnapshot,
//! };
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let mut source = SqliteSnapshot::new("nycdb.db");
//! let batch = pipeline.run(&mut source, &Passthrough)?;
//!
//! let table = SqlitePortfolioTable::new("wow_portfolios.db");
//! let mut index = JsonLinesIndex::new("landlord_index.jsonl");
//! pipeline.publish(&batch, &table, &mut index)?;
//! # Ok::<(), portfoliograph::PortfolioError>(())
//! ```

pub mod cli;
pub mod commands;
pub mod community;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod fs_utils;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod search_index;
pub mod source;
pub mod split;
pub mod standardize;

// Re-export commonly used types
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{PipelineConfig, StandardizationMode};
pub use error::{PortfolioError, Result};
pub use export::{PortfolioRow, PortfolioTableSink, SqlitePortfolioTable};
pub use extract::{extract_contacts, ExtractOptions, ExtractStats};
pub use graph::OwnerGraph;
pub use pipeline::{BatchStats, Pipeline, PortfolioBatch, PublishReport};
pub use schema::{Bbl, ContactRecord, ContactType, OwnerNode, PortfolioId};
pub use search_index::{JsonLinesIndex, SearchIndexRecord, SearchIndexSink};
pub use source::{ContactSource, RawContactRow, SqliteSnapshot, VecSource};
pub use split::{split_portfolios, PortfolioComponent, SplitOptions, SplitTerminal};
pub use standardize::{AddressStandardizer, Passthrough, StreetSuffixes};
