//! Parallel parsing support
//!
//! A [`Language`] is immutable and `Send + Sync`, so any number of
//! documents can be parsed concurrently against one shared language.
//!
//! # Feature Flag
//!
//! Work is spread over a rayon thread pool when the `parallel` feature is
//! enabled; without it the same functions parse sequentially:
//!
//! ```toml
//! [dependencies]
//! tessera = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use tessera::engine::parallel::parse_batch_parallel;
//!
//! let language = tessera::languages::tessera::language().unwrap();
//! let results = parse_batch_parallel(&language, &["i32 x := 1;", "fn void f() {}"]);
//!
//! // Results are in same order as inputs
//! assert_eq!(results.len(), 2);
//! assert!(results.iter().all(|r| r.is_ok()));
//! ```

use super::error::ParseError;
use super::language::Language;
use super::parser::{Parser, ParserConfig};
use super::tree::Tree;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

fn parse_one(language: &Language, config: ParserConfig, input: &str) -> Result<Tree, ParseError> {
    let mut parser = Parser::with_config(config);
    parser.set_language(language.clone());
    parser.parse(input)
}

/// Parse multiple inputs in parallel
///
/// Results are returned in the same order as `inputs`. Each document gets
/// its own parser; only the language is shared.
#[cfg(feature = "rayon")]
pub fn parse_batch_parallel(language: &Language, inputs: &[&str]) -> Vec<Result<Tree, ParseError>> {
    inputs
        .par_iter()
        .map(|input| parse_one(language, ParserConfig::default(), input))
        .collect()
}

/// Parse multiple inputs sequentially (fallback when rayon is not available)
#[cfg(not(feature = "rayon"))]
pub fn parse_batch_parallel(language: &Language, inputs: &[&str]) -> Vec<Result<Tree, ParseError>> {
    inputs
        .iter()
        .map(|input| parse_one(language, ParserConfig::default(), input))
        .collect()
}

/// Parse multiple inputs with explicit parser and pool settings
///
/// A dedicated pool is built when `parallel.num_threads` is set; if that
/// fails the global pool is used.
#[cfg(feature = "rayon")]
pub fn parse_batch_with_config(
    language: &Language,
    inputs: &[&str],
    config: ParserConfig,
    parallel: &ParallelConfig,
) -> Vec<Result<Tree, ParseError>> {
    let run = || -> Vec<Result<Tree, ParseError>> {
        inputs
            .par_iter()
            .with_min_len(parallel.min_chunk_size.max(1))
            .map(|input| parse_one(language, config, input))
            .collect()
    };
    match parallel
        .num_threads
        .and_then(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build().ok())
    {
        Some(pool) => pool.install(run),
        None => run(),
    }
}

/// Parse multiple inputs with explicit parser settings (sequential fallback)
#[cfg(not(feature = "rayon"))]
pub fn parse_batch_with_config(
    language: &Language,
    inputs: &[&str],
    config: ParserConfig,
    _parallel: &ParallelConfig,
) -> Vec<Result<Tree, ParseError>> {
    inputs
        .iter()
        .map(|input| parse_one(language, config, input))
        .collect()
}

/// Configuration for parallel parsing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads to use (None = auto)
    pub num_threads: Option<usize>,
    /// Minimum number of documents handed to one task
    pub min_chunk_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_chunk_size: 1,
        }
    }
}

impl ParallelConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads to use
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set the minimum chunk size for parallel processing
    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }
}
