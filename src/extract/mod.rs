//! HTML extraction for both target modes. Pure functions over page HTML: a selector that matches
//! nothing produces missing values or empty lists, never an error.

mod selector;

pub use selector::{Css, ExtractMode, SelectorError, SelectorSpec};

use crate::model::{FieldSpecs, Record};
use scraper::{ElementRef, Html};

/// Keys every detail record carries, in this order, so the output schema does not depend on which
/// fields a particular page happened to configure.
pub const DETAIL_BASELINE_FIELDS: [&str; 4] = ["title", "price", "image_url", "description"];

/// One record per element matching `item_selector`, in document order.
///
/// Field selectors are applied within each item's subtree, not the whole page.
pub fn list_items(html: &str, item_selector: &Css, fields: &FieldSpecs) -> Vec<Record> {
    let doc = Html::parse_document(html);
    doc.select(item_selector.selector())
        .map(|item| apply_fields(item, fields))
        .collect()
}

/// `href` of every element matching `link_selector`, in document order, duplicates kept.
///
/// Values are returned as written (trimmed); resolution happens later against the list URL.
/// Elements without an `href`, or with a blank one, are skipped.
pub fn links(html: &str, link_selector: &Css) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(link_selector.selector())
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(String::from)
        .collect()
}

/// One record from a detail page: baseline keys first, then any other configured fields.
pub fn detail(html: &str, fields: &FieldSpecs) -> Record {
    let doc = Html::parse_document(html);
    let mut record = Record::new();
    for name in DETAIL_BASELINE_FIELDS {
        record.insert(name, fields.get(name).and_then(|spec| spec.apply_document(&doc)));
    }
    for (name, spec) in fields.iter() {
        if !record.contains_key(name) {
            record.insert(name, spec.apply_document(&doc));
        }
    }
    record
}

fn apply_fields(node: ElementRef<'_>, fields: &FieldSpecs) -> Record {
    fields
        .iter()
        .map(|(name, spec)| (name, spec.apply(node)))
        .collect()
}
