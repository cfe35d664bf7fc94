//! listscrape: selector-driven scraper for catalog list pages and their detail pages, outputting
//! CSV or JSON.

pub mod cli;
pub mod config;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod validate;

// Re-exports for CLI and consumers.
pub use export::{write_csv, write_json, write_records, ColumnSet, ExportError, OutputFormat};
pub use extract::{Css, ExtractMode, SelectorError, SelectorSpec};
pub use fetch::{Fetch, FetchError, Fetcher, FetcherBuilder, RetryPolicy};
pub use model::{FieldSpecs, Record, Target, TargetMode};
pub use pipeline::{
    collect_records, run, PipelineError, RunOptions, RunResult, RunStatus, RunSummary,
    SkipReason, SkippedItem,
};
pub use validate::{format_report, summarize, QualityReport};
