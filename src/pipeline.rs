//! Run orchestration for one target.
//!
//! FetchList, then ExtractItems (list-only) or ExtractLinks and the per-link detail loop
//! (detail-follow), then Normalize, trace-field injection, Report, and Export. Detail pages that
//! fail to fetch are skipped and counted; every other failure ends the run.

use crate::export::{self, ExportError, OutputFormat};
use crate::extract::{self, Css};
use crate::fetch::{Fetch, FetchError};
use crate::model::{FieldSpecs, Record, Target, TargetMode, DETAIL_URL, SOURCE_LIST_URL};
use crate::normalize::{is_absolute, normalize_record};
use crate::validate::{self, QualityReport};
use reqwest::Url;
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Outcome reported to the CLI, which maps it to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    ConfigContractViolation,
    FatalFetchFailure,
    NoRecordsProduced,
    UnexpectedError,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::UnexpectedError => 1,
            RunStatus::ConfigContractViolation => 2,
            RunStatus::FatalFetchFailure => 3,
            RunStatus::NoRecordsProduced => 4,
        }
    }
}

/// Fatal run failures. Nothing is written when one of these is returned before Export.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Target '{target}': list_url {url:?} is not a valid absolute URL: {reason}")]
    InvalidListUrl {
        target: String,
        url: String,
        reason: String,
    },

    #[error("Target '{target}': failed to fetch list page: {source}")]
    ListFetch {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("Target '{target}': no records produced from {url} ({skipped} item(s) skipped).")]
    NoRecords {
        target: String,
        url: String,
        skipped: usize,
    },

    #[error("Target '{target}': {source}")]
    Export {
        target: String,
        #[source]
        source: ExportError,
    },
}

impl PipelineError {
    pub fn status(&self) -> RunStatus {
        match self {
            PipelineError::InvalidListUrl { .. } => RunStatus::ConfigContractViolation,
            PipelineError::ListFetch { .. } => RunStatus::FatalFetchFailure,
            PipelineError::NoRecords { .. } => RunStatus::NoRecordsProduced,
            PipelineError::Export { .. } => RunStatus::UnexpectedError,
        }
    }
}

/// Why a detail link produced no record.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("cannot resolve link against the list URL: {0}")]
    UnresolvableLink(String),
}

/// A detail link that was given up on. The run continues past it.
#[derive(Debug)]
pub struct SkippedItem {
    /// The link as resolved, or as found on the page if it could not be resolved.
    pub url: String,
    pub reason: SkipReason,
}

/// Records of one run, in discovery order, plus per-item counts.
#[derive(Debug, Default)]
pub struct RunResult {
    pub records: Vec<Record>,
    /// Items considered after the limit: list items, or detail links.
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedItem>,
}

impl RunResult {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub result: RunResult,
    /// `None` when validation is disabled.
    pub report: Option<QualityReport>,
    /// False for dry runs.
    pub output_written: bool,
}

/// Per-run settings owned by the caller.
pub struct RunOptions<'a> {
    /// Keep only the first N items (list-only) or links (detail-follow).
    pub limit: Option<usize>,
    /// Sleep between successive detail-page fetches.
    pub delay_between_requests: Duration,
    pub validation_enabled: bool,
    /// Run every stage except Export.
    pub dry_run: bool,
    pub format: OutputFormat,
    /// Called with (current, total) before each detail fetch.
    pub progress: Option<&'a dyn Fn(usize, usize)>,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            limit: None,
            delay_between_requests: Duration::ZERO,
            validation_enabled: true,
            dry_run: false,
            format: OutputFormat::Csv,
            progress: None,
        }
    }
}

/// Run every stage for `target`. `open_sink` is only called at Export, so a failed or dry run
/// creates no output.
pub fn run<F, W, O>(
    target: &Target,
    fetcher: &mut F,
    options: &RunOptions<'_>,
    open_sink: O,
) -> Result<RunSummary, PipelineError>
where
    F: Fetch + ?Sized,
    W: Write,
    O: FnOnce() -> io::Result<W>,
{
    let result = collect_records(target, fetcher, options)?;
    info!(
        target_name = %target.name,
        records = result.records.len(),
        attempted = result.attempted,
        succeeded = result.succeeded,
        skipped = result.skipped_count(),
        "Extraction finished"
    );

    let report = if options.validation_enabled {
        Some(validate::summarize(&result.records))
    } else {
        info!("Validation disabled; skipping quality report.");
        None
    };

    let output_written = if options.dry_run {
        info!("Dry run enabled; skipping export.");
        false
    } else {
        let export_err = |source: ExportError| PipelineError::Export {
            target: target.name.clone(),
            source,
        };
        let sink = open_sink().map_err(|e| export_err(e.into()))?;
        export::write_records(options.format, &result.records, sink).map_err(export_err)?;
        true
    };

    Ok(RunSummary {
        result,
        report,
        output_written,
    })
}

/// Fetch, extract, normalise, and tag records for `target`. Fails if no record results.
pub fn collect_records<F: Fetch + ?Sized>(
    target: &Target,
    fetcher: &mut F,
    options: &RunOptions<'_>,
) -> Result<RunResult, PipelineError> {
    let list_url = Url::parse(&target.list_url).map_err(|e| PipelineError::InvalidListUrl {
        target: target.name.clone(),
        url: target.list_url.clone(),
        reason: e.to_string(),
    })?;

    info!(
        target_name = %target.name,
        mode = target.mode.label(),
        url = %target.list_url,
        "Fetching list page"
    );
    let list_html = fetcher
        .fetch(&target.list_url)
        .map_err(|source| PipelineError::ListFetch {
            target: target.name.clone(),
            source,
        })?;

    let result = match &target.mode {
        TargetMode::ListOnly {
            item_selector,
            item_fields,
        } => extract_items(target, &list_url, &list_html, item_selector, item_fields, options),
        TargetMode::DetailFollow {
            link_selector,
            detail_fields,
        } => follow_links(
            target,
            &list_url,
            &list_html,
            link_selector,
            detail_fields,
            fetcher,
            options,
        ),
    };

    if result.records.is_empty() {
        return Err(PipelineError::NoRecords {
            target: target.name.clone(),
            url: target.list_url.clone(),
            skipped: result.skipped_count(),
        });
    }
    Ok(result)
}

fn extract_items(
    target: &Target,
    list_url: &Url,
    html: &str,
    item_selector: &Css,
    item_fields: &FieldSpecs,
    options: &RunOptions<'_>,
) -> RunResult {
    let mut records = extract::list_items(html, item_selector, item_fields);
    info!(count = records.len(), selector = %item_selector, "Matched list items");
    if let Some(limit) = options.limit {
        records.truncate(limit);
    }
    for record in &mut records {
        normalize_record(record, list_url);
        record.insert(SOURCE_LIST_URL, Some(target.list_url.clone()));
    }
    RunResult {
        attempted: records.len(),
        succeeded: records.len(),
        records,
        skipped: Vec::new(),
    }
}

fn follow_links<F: Fetch + ?Sized>(
    target: &Target,
    list_url: &Url,
    html: &str,
    link_selector: &Css,
    detail_fields: &FieldSpecs,
    fetcher: &mut F,
    options: &RunOptions<'_>,
) -> RunResult {
    let mut links = extract::links(html, link_selector);
    info!(count = links.len(), selector = %link_selector, "Found detail links");
    if let Some(limit) = options.limit {
        links.truncate(limit);
    }

    let total = links.len();
    let mut result = RunResult::default();
    let mut fetched_before = false;
    for (i, href) in links.iter().enumerate() {
        if let Some(progress) = options.progress {
            progress(i + 1, total);
        }
        result.attempted += 1;

        let (detail_url, base) = match resolve_link(list_url, href) {
            Ok(resolved) => resolved,
            Err(reason) => {
                warn!(link = %href, %reason, "Skipping detail link");
                result.skipped.push(SkippedItem {
                    url: href.clone(),
                    reason: SkipReason::UnresolvableLink(reason),
                });
                continue;
            }
        };

        if fetched_before && !options.delay_between_requests.is_zero() {
            std::thread::sleep(options.delay_between_requests);
        }
        fetched_before = true;

        let detail_html = match fetcher.fetch(&detail_url) {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %detail_url, error = %e, "Skipping detail page");
                result.skipped.push(SkippedItem {
                    url: detail_url,
                    reason: e.into(),
                });
                continue;
            }
        };

        let mut record = extract::detail(&detail_html, detail_fields);
        normalize_record(&mut record, &base);
        record.insert(SOURCE_LIST_URL, Some(target.list_url.clone()));
        record.insert(DETAIL_URL, Some(detail_url));
        result.records.push(record);
        result.succeeded += 1;
    }

    if !result.skipped.is_empty() {
        warn!(
            skipped = result.skipped_count(),
            succeeded = result.succeeded,
            "Some detail pages were skipped"
        );
    }
    result
}

/// URL to fetch for `href` and the base for resolving the detail page's own URL fields.
/// Absolute hrefs are fetched as written.
fn resolve_link(list_url: &Url, href: &str) -> Result<(String, Url), String> {
    if is_absolute(href) {
        let url = Url::parse(href).map_err(|e| e.to_string())?;
        Ok((href.to_string(), url))
    } else {
        let url = list_url.join(href).map_err(|e| e.to_string())?;
        Ok((url.to_string(), url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SelectorSpec;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::time::Instant;

    const LIST_URL: &str = "https://shop.example.com/catalogue/index.html";

    /// Serves pages from a map; any other URL gets a 404. Records every requested URL.
    #[derive(Default)]
    struct FakeFetch {
        pages: HashMap<String, Result<String, u16>>,
        requested: Vec<String>,
        fetched_at: Vec<Instant>,
    }

    impl FakeFetch {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(html.to_string()));
            self
        }

        fn failing(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), Err(status));
            self
        }
    }

    impl Fetch for FakeFetch {
        fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
            self.requested.push(url.to_string());
            self.fetched_at.push(Instant::now());
            match self.pages.get(url) {
                Some(Ok(html)) => Ok(html.clone()),
                Some(Err(status)) => Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: *status,
                    attempts: 3,
                }),
                None => Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                    attempts: 1,
                }),
            }
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldSpecs {
        let mut specs = FieldSpecs::new();
        for (name, spec) in pairs {
            specs.push(*name, SelectorSpec::parse(spec).expect("valid selector"));
        }
        specs
    }

    fn list_only(item_selector: &str, pairs: &[(&str, &str)]) -> Target {
        Target {
            name: "cards".into(),
            list_url: LIST_URL.into(),
            mode: TargetMode::ListOnly {
                item_selector: Css::parse(item_selector).expect("valid css"),
                item_fields: fields(pairs),
            },
        }
    }

    fn detail_follow(link_selector: &str, pairs: &[(&str, &str)]) -> Target {
        Target {
            name: "details".into(),
            list_url: LIST_URL.into(),
            mode: TargetMode::DetailFollow {
                link_selector: Css::parse(link_selector).expect("valid css"),
                detail_fields: fields(pairs),
            },
        }
    }

    const CARDS: &str = r#"<html><body>
<div class="card"><h2>Alpha</h2><span class="price">$10</span><a href="../p/alpha.html">view</a></div>
<div class="card"><h2>Beta</h2><span class="price">$20</span><a href="https://cdn.example.com/p/beta">view</a></div>
</body></html>"#;

    const LINKS: &str = r#"<html><body>
<a class="product" href="p/1.html">1</a>
<a class="product" href="p/2.html">2</a>
<a class="product" href="https://other.example.com/p/3">3</a>
</body></html>"#;

    fn detail_page(title: &str) -> String {
        format!(
            r#"<html><body><h1>{}</h1><p class="price">$5</p><img class="main" src="../img/{}.jpg"></body></html>"#,
            title, title
        )
    }

    #[test]
    fn list_only_end_to_end() -> Result<(), PipelineError> {
        let target = list_only(
            "div.card",
            &[("title", "h2"), ("price", "span.price"), ("url", "a@href")],
        );
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let result = collect_records(&target, &mut fetcher, &RunOptions::default())?;

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.attempted, 2);
        assert_eq!(result.succeeded, 2);
        let first = &result.records[0];
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            vec!["title", "price", "url", SOURCE_LIST_URL]
        );
        assert_eq!(first.get("title"), Some("Alpha"));
        assert_eq!(first.get("url"), Some("https://shop.example.com/p/alpha.html"));
        assert_eq!(first.get(SOURCE_LIST_URL), Some(LIST_URL));
        assert_eq!(
            result.records[1].get("url"),
            Some("https://cdn.example.com/p/beta")
        );
        assert!(!result.records[1].contains_key(DETAIL_URL));
        assert_eq!(fetcher.requested, vec![LIST_URL]);
        Ok(())
    }

    #[test]
    fn list_only_limit_truncates_items() -> Result<(), PipelineError> {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let options = RunOptions {
            limit: Some(1),
            ..RunOptions::default()
        };
        let result = collect_records(&target, &mut fetcher, &options)?;
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].get("title"), Some("Alpha"));
        Ok(())
    }

    #[test]
    fn detail_follow_skips_failed_page_and_succeeds() -> Result<(), PipelineError> {
        let target = detail_follow(
            "a.product",
            &[("title", "h1"), ("price", "p.price"), ("image_url", "img.main@src")],
        );
        let mut fetcher = FakeFetch::default()
            .page(LIST_URL, LINKS)
            .page("https://shop.example.com/catalogue/p/1.html", &detail_page("one"))
            .failing("https://shop.example.com/catalogue/p/2.html", 503)
            .page("https://other.example.com/p/3", &detail_page("three"));

        let result = collect_records(&target, &mut fetcher, &RunOptions::default())?;
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(
            result.skipped[0].url,
            "https://shop.example.com/catalogue/p/2.html"
        );
        assert!(matches!(
            result.skipped[0].reason,
            SkipReason::Fetch(FetchError::HttpStatus { status: 503, .. })
        ));

        let first = &result.records[0];
        assert_eq!(first.get("title"), Some("one"));
        assert_eq!(
            first.get(DETAIL_URL),
            Some("https://shop.example.com/catalogue/p/1.html")
        );
        assert_eq!(first.get(SOURCE_LIST_URL), Some(LIST_URL));
        // Relative fields resolve against the detail page, not the list page.
        assert_eq!(
            first.get("image_url"),
            Some("https://shop.example.com/catalogue/img/one.jpg")
        );
        let third = &result.records[1];
        assert_eq!(third.get(DETAIL_URL), Some("https://other.example.com/p/3"));
        assert_eq!(
            third.get("image_url"),
            Some("https://other.example.com/img/three.jpg")
        );
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            vec![
                "title",
                "price",
                "image_url",
                "description",
                SOURCE_LIST_URL,
                DETAIL_URL
            ]
        );
        Ok(())
    }

    #[test]
    fn detail_follow_limit_bounds_fetches() -> Result<(), PipelineError> {
        let target = detail_follow("a.product", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default()
            .page(LIST_URL, LINKS)
            .page("https://shop.example.com/catalogue/p/1.html", &detail_page("one"))
            .page("https://shop.example.com/catalogue/p/2.html", &detail_page("two"));
        let options = RunOptions {
            limit: Some(2),
            ..RunOptions::default()
        };
        let result = collect_records(&target, &mut fetcher, &options)?;
        assert_eq!(result.records.len(), 2);
        assert_eq!(fetcher.requested.len(), 3);
        Ok(())
    }

    const DELAY: Duration = Duration::from_millis(40);

    fn delayed() -> RunOptions<'static> {
        RunOptions {
            delay_between_requests: DELAY,
            ..RunOptions::default()
        }
    }

    fn gaps(fetcher: &FakeFetch) -> Vec<Duration> {
        fetcher
            .fetched_at
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }

    #[test]
    fn delay_only_between_successive_detail_fetches() -> Result<(), PipelineError> {
        let target = detail_follow("a.product", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default()
            .page(LIST_URL, LINKS)
            .page("https://shop.example.com/catalogue/p/1.html", &detail_page("one"))
            .page("https://shop.example.com/catalogue/p/2.html", &detail_page("two"))
            .page("https://other.example.com/p/3", &detail_page("three"));
        let started = Instant::now();
        collect_records(&target, &mut fetcher, &delayed())?;
        let elapsed = started.elapsed();

        assert_eq!(fetcher.requested.len(), 4);
        let gaps = gaps(&fetcher);
        // List page to first detail page: no sleep.
        assert!(gaps[0] < DELAY, "slept before first detail fetch: {:?}", gaps);
        assert!(gaps[1] >= DELAY && gaps[2] >= DELAY, "{:?}", gaps);
        assert!(elapsed >= DELAY * 2);
        assert!(elapsed < DELAY * 3, "elapsed {:?}", elapsed);
        Ok(())
    }

    #[test]
    fn unresolvable_link_adds_no_delay() -> Result<(), PipelineError> {
        let html = r#"<html><body>
<a class="product" href="http://[::1">bad</a>
<a class="product" href="p/1.html">1</a>
<a class="product" href="http://[::1">bad</a>
<a class="product" href="p/2.html">2</a>
</body></html>"#;
        let target = detail_follow("a.product", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default()
            .page(LIST_URL, html)
            .page("https://shop.example.com/catalogue/p/1.html", &detail_page("one"))
            .page("https://shop.example.com/catalogue/p/2.html", &detail_page("two"));
        let started = Instant::now();
        let result = collect_records(&target, &mut fetcher, &delayed())?;
        let elapsed = started.elapsed();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.skipped_count(), 2);
        assert!(result
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::UnresolvableLink(_))));
        assert!(elapsed >= DELAY);
        assert!(elapsed < DELAY * 2, "elapsed {:?}", elapsed);
        Ok(())
    }

    #[test]
    fn list_only_never_sleeps() -> Result<(), PipelineError> {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let started = Instant::now();
        collect_records(&target, &mut fetcher, &delayed())?;
        assert!(started.elapsed() < DELAY, "elapsed {:?}", started.elapsed());
        Ok(())
    }

    #[test]
    fn detail_follow_reports_progress() -> Result<(), PipelineError> {
        let target = detail_follow("a.product", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default()
            .page(LIST_URL, LINKS)
            .page("https://shop.example.com/catalogue/p/1.html", &detail_page("one"));
        let calls = Cell::new(0usize);
        let last = Cell::new((0usize, 0usize));
        let progress = |n: usize, total: usize| {
            calls.set(calls.get() + 1);
            last.set((n, total));
        };
        let options = RunOptions {
            progress: Some(&progress),
            ..RunOptions::default()
        };
        collect_records(&target, &mut fetcher, &options)?;
        assert_eq!(calls.get(), 3);
        assert_eq!(last.get(), (3, 3));
        Ok(())
    }

    #[test]
    fn list_fetch_failure_is_fatal() {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().failing(LIST_URL, 500);
        let err = collect_records(&target, &mut fetcher, &RunOptions::default()).unwrap_err();
        assert_eq!(err.status(), RunStatus::FatalFetchFailure);
        assert_eq!(err.status().exit_code(), 3);
        assert!(err.to_string().contains(LIST_URL));
    }

    #[test]
    fn no_matching_items_is_no_records() {
        let target = list_only("article.none", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let err = collect_records(&target, &mut fetcher, &RunOptions::default()).unwrap_err();
        assert_eq!(err.status(), RunStatus::NoRecordsProduced);
    }

    #[test]
    fn no_matching_links_is_no_records() {
        let target = detail_follow("a.none", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, LINKS);
        let err = collect_records(&target, &mut fetcher, &RunOptions::default()).unwrap_err();
        assert_eq!(err.status(), RunStatus::NoRecordsProduced);
        assert_eq!(fetcher.requested.len(), 1);
    }

    #[test]
    fn all_detail_pages_failing_is_no_records() {
        let target = detail_follow("a.product", &[("title", "h1")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, LINKS);
        let err = collect_records(&target, &mut fetcher, &RunOptions::default()).unwrap_err();
        match err {
            PipelineError::NoRecords { skipped, .. } => assert_eq!(skipped, 3),
            other => panic!("expected NoRecords, got {:?}", other),
        }
    }

    #[test]
    fn invalid_list_url_is_contract_violation_without_fetching() {
        let mut target = list_only("div.card", &[("title", "h2")]);
        target.list_url = "catalogue/index.html".into();
        let mut fetcher = FakeFetch::default();
        let err = collect_records(&target, &mut fetcher, &RunOptions::default()).unwrap_err();
        assert_eq!(err.status(), RunStatus::ConfigContractViolation);
        assert!(fetcher.requested.is_empty());
    }

    #[test]
    fn run_exports_and_reports() -> Result<(), Box<dyn std::error::Error>> {
        let target = list_only("div.card", &[("title", "h2"), ("sku", "span.sku")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let mut out = Vec::new();
        let summary = run(&target, &mut fetcher, &RunOptions::default(), || Ok(&mut out))?;
        assert!(summary.output_written);
        let report = summary.report.ok_or("expected a report")?;
        assert_eq!(report.total, 2);
        assert_eq!(report.missing("sku"), Some(2));
        assert_eq!(report.missing("title"), Some(0));
        let csv = String::from_utf8(out)?;
        assert_eq!(csv.lines().next(), Some("title,sku,source_list_url"));
        assert_eq!(csv.lines().count(), 3);
        Ok(())
    }

    #[test]
    fn dry_run_never_opens_the_sink() -> Result<(), PipelineError> {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let opened = Cell::new(false);
        let options = RunOptions {
            dry_run: true,
            validation_enabled: false,
            ..RunOptions::default()
        };
        let summary = run(&target, &mut fetcher, &options, || {
            opened.set(true);
            Ok(Vec::new())
        })?;
        assert!(!opened.get());
        assert!(!summary.output_written);
        assert!(summary.report.is_none());
        assert_eq!(summary.result.records.len(), 2);
        Ok(())
    }

    #[test]
    fn fatal_run_never_opens_the_sink() {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().failing(LIST_URL, 404);
        let opened = Cell::new(false);
        let result = run(&target, &mut fetcher, &RunOptions::default(), || {
            opened.set(true);
            Ok(Vec::new())
        });
        assert!(result.is_err());
        assert!(!opened.get());
    }

    #[test]
    fn sink_open_failure_is_unexpected_error() {
        let target = list_only("div.card", &[("title", "h2")]);
        let mut fetcher = FakeFetch::default().page(LIST_URL, CARDS);
        let err = run(&target, &mut fetcher, &RunOptions::default(), || {
            Err::<Vec<u8>, _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        })
        .unwrap_err();
        assert_eq!(err.status(), RunStatus::UnexpectedError);
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            RunStatus::Success,
            RunStatus::ConfigContractViolation,
            RunStatus::FatalFetchFailure,
            RunStatus::NoRecordsProduced,
            RunStatus::UnexpectedError,
        ]
        .map(RunStatus::exit_code);
        assert_eq!(codes[0], 0);
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
