//! Selector expressions: a CSS selector plus what to read from the first match.
//!
//! Grammar, one expression per field:
//! - `css` or `css::text` reads the trimmed text of the first match.
//! - `css@attr` or `css::attr(attr)` reads an attribute of the first match.
//!
//! No match, an absent attribute, or an empty value yields `None`, never an error.

use scraper::{ElementRef, Html, Selector};
use std::fmt;
use thiserror::Error;

const TEXT_SUFFIX: &str = "::text";
const ATTR_PREFIX: &str = "::attr(";

/// Errors from parsing a selector expression. Raised at config load, never during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector expression")]
    Empty,

    #[error("invalid CSS selector {css:?}: {reason}")]
    InvalidCss { css: String, reason: String },

    #[error("malformed selector expression {spec:?}: {reason}")]
    Malformed { spec: String, reason: String },
}

/// A compiled CSS selector that remembers its source text for logs and errors.
#[derive(Clone)]
pub struct Css {
    source: String,
    selector: Selector,
}

impl Css {
    pub fn parse(css: &str) -> Result<Self, SelectorError> {
        let css = css.trim();
        if css.is_empty() {
            return Err(SelectorError::Empty);
        }
        let selector = Selector::parse(css).map_err(|e| SelectorError::InvalidCss {
            css: css.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: css.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl fmt::Debug for Css {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Css").field(&self.source).finish()
    }
}

impl fmt::Display for Css {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// What to read from the matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractMode {
    Text,
    /// Attribute name, lowercased (the HTML parser lowercases attribute names).
    Attribute(String),
}

/// Parsed selector expression. Parse once per configured field, apply to every item.
#[derive(Debug, Clone)]
pub struct SelectorSpec {
    css: Css,
    mode: ExtractMode,
}

impl SelectorSpec {
    pub fn parse(spec: &str) -> Result<Self, SelectorError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(SelectorError::Empty);
        }
        let (css, mode) = split_mode(spec)?;
        if css.trim().is_empty() {
            return Err(SelectorError::Malformed {
                spec: spec.to_string(),
                reason: "missing CSS selector before the extraction suffix".to_string(),
            });
        }
        Ok(Self {
            css: Css::parse(css)?,
            mode,
        })
    }

    pub fn css(&self) -> &Css {
        &self.css
    }

    pub fn mode(&self) -> &ExtractMode {
        &self.mode
    }

    /// Apply to the descendants of `node`. First match in document order wins.
    pub fn apply(&self, node: ElementRef<'_>) -> Option<String> {
        self.read(node.select(self.css.selector()).next()?)
    }

    /// Apply to a whole document. Unlike [SelectorSpec::apply], the `<html>` element can match.
    pub fn apply_document(&self, doc: &Html) -> Option<String> {
        self.read(doc.select(self.css.selector()).next()?)
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.mode {
            ExtractMode::Text => element.text().collect::<String>(),
            ExtractMode::Attribute(name) => element.value().attr(name)?.to_string(),
        };
        let value = raw.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Split the extraction suffix off an expression. Anything without a recognised suffix is text mode.
fn split_mode(spec: &str) -> Result<(&str, ExtractMode), SelectorError> {
    if let Some(css) = spec.strip_suffix(TEXT_SUFFIX) {
        return Ok((css, ExtractMode::Text));
    }
    if let Some(pos) = spec.rfind(ATTR_PREFIX) {
        let inner = spec[pos + ATTR_PREFIX.len()..]
            .strip_suffix(')')
            .ok_or_else(|| SelectorError::Malformed {
                spec: spec.to_string(),
                reason: "expected ::attr(name) at the end of the expression".to_string(),
            })?
            .trim();
        if !is_attr_name(inner) {
            return Err(SelectorError::Malformed {
                spec: spec.to_string(),
                reason: format!("invalid attribute name {:?}", inner),
            });
        }
        return Ok((&spec[..pos], ExtractMode::Attribute(inner.to_ascii_lowercase())));
    }
    // `@` may also appear inside an attribute selector value, e.g. a[href^="mailto:x@"].
    if let Some(pos) = spec.rfind('@') {
        let name = &spec[pos + 1..];
        if is_attr_name(name) {
            return Ok((&spec[..pos], ExtractMode::Attribute(name.to_ascii_lowercase())));
        }
    }
    Ok((spec, ExtractMode::Text))
}

fn is_attr_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"<html><body>
<div class="card">
  <h2>  First
     Title </h2>
  <a class="link" href="/p/1">More</a>
  <a class="link" href="/p/1-dup">Dup</a>
  <img src="" alt="no src">
  <span class="blank">   </span>
</div>
</body></html>"#;

    fn apply(spec: &str, html: &str) -> Result<Option<String>, SelectorError> {
        let doc = Html::parse_document(html);
        Ok(SelectorSpec::parse(spec)?.apply(doc.root_element()))
    }

    #[test]
    fn parse_text_forms() -> Result<(), SelectorError> {
        let plain = SelectorSpec::parse("h2")?;
        assert_eq!(plain.mode(), &ExtractMode::Text);
        assert_eq!(plain.css().as_str(), "h2");
        let explicit = SelectorSpec::parse("div.card h2::text")?;
        assert_eq!(explicit.mode(), &ExtractMode::Text);
        assert_eq!(explicit.css().as_str(), "div.card h2");
        Ok(())
    }

    #[test]
    fn parse_attribute_forms() -> Result<(), SelectorError> {
        let at = SelectorSpec::parse("a.link@href")?;
        assert_eq!(at.mode(), &ExtractMode::Attribute("href".into()));
        assert_eq!(at.css().as_str(), "a.link");
        let func = SelectorSpec::parse("img::attr( data-src )")?;
        assert_eq!(func.mode(), &ExtractMode::Attribute("data-src".into()));
        assert_eq!(func.css().as_str(), "img");
        Ok(())
    }

    #[test]
    fn at_sign_inside_attribute_selector_is_not_a_mode() -> Result<(), SelectorError> {
        let spec = SelectorSpec::parse(r#"a[href$="@"]"#)?;
        assert_eq!(spec.mode(), &ExtractMode::Text);
        let spec = SelectorSpec::parse(r#"a[href^="mailto:"]@href"#)?;
        assert_eq!(spec.mode(), &ExtractMode::Attribute("href".into()));
        assert_eq!(spec.css().as_str(), r#"a[href^="mailto:"]"#);
        Ok(())
    }

    #[test]
    fn parse_rejects_bad_expressions() {
        assert_eq!(SelectorSpec::parse("   ").unwrap_err(), SelectorError::Empty);
        assert!(matches!(
            SelectorSpec::parse("@href"),
            Err(SelectorError::Malformed { .. })
        ));
        assert!(matches!(
            SelectorSpec::parse("img::attr(src"),
            Err(SelectorError::Malformed { .. })
        ));
        assert!(matches!(
            SelectorSpec::parse("div[[["),
            Err(SelectorError::InvalidCss { .. })
        ));
    }

    #[test]
    fn text_is_trimmed_and_first_match_wins() -> Result<(), SelectorError> {
        let title = apply("h2", CARD)?.unwrap_or_default();
        assert!(title.starts_with("First"));
        assert!(title.ends_with("Title"));
        assert_eq!(apply("a.link@href", CARD)?.as_deref(), Some("/p/1"));
        Ok(())
    }

    #[test]
    fn no_match_is_missing_in_every_mode() -> Result<(), SelectorError> {
        assert_eq!(apply("p.absent", CARD)?, None);
        assert_eq!(apply("p.absent::text", CARD)?, None);
        assert_eq!(apply("p.absent@href", CARD)?, None);
        assert_eq!(apply("p.absent::attr(href)", CARD)?, None);
        Ok(())
    }

    #[test]
    fn absent_or_empty_attribute_is_missing() -> Result<(), SelectorError> {
        assert_eq!(apply("h2@href", CARD)?, None);
        assert_eq!(apply("img@src", CARD)?, None);
        assert_eq!(apply("img@alt", CARD)?.as_deref(), Some("no src"));
        Ok(())
    }

    #[test]
    fn whitespace_only_text_is_missing() -> Result<(), SelectorError> {
        assert_eq!(apply("span.blank", CARD)?, None);
        Ok(())
    }

    #[test]
    fn document_level_apply_matches_root_element() -> Result<(), SelectorError> {
        let doc = Html::parse_document(r#"<html lang="en"><body><h1>X</h1></body></html>"#);
        let lang = SelectorSpec::parse("html@lang")?;
        assert_eq!(lang.apply_document(&doc).as_deref(), Some("en"));
        assert_eq!(lang.apply(doc.root_element()), None);
        Ok(())
    }

    #[test]
    fn attribute_name_is_case_insensitive() -> Result<(), SelectorError> {
        assert_eq!(apply("a.link@HREF", CARD)?.as_deref(), Some("/p/1"));
        Ok(())
    }
}
