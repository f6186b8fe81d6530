//! Citation locator.
//!
//! Finds the most specific pointer into a source document for a retrieved
//! passage: a clause id, else a table, else a figure, else a page. The page
//! is always the last resort and comes from an explicit marker in the text
//! (`p.184`, `page 184`) or from the chunk's own page metadata.
//!
//! When nothing at all can be located the citation degrades to the bare
//! source name and the caller is told via [`Degradation::MalformedLocator`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{Citation, Degradation, DocumentChunk, LocatorType};

/// `clause 5.3.2`, `cl. E2.3`, `§ 9.1`.
static CLAUSE_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bclause\s+|\bcl\.\s*|§\s*)([a-z]?\d{1,3}(?:\.\d{1,3}){0,3}[a-z]?)\b")
        .expect("clause label regex")
});

/// Letter-prefixed id with at least two groups, e.g. `E2.3.7`.
static CLAUSE_LETTERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])([A-H]\d{1,2}(?:\.\d{1,3}){1,3})\b").expect("lettered clause regex")
});

/// Bare numeric id with at least three groups, e.g. `5.3.2`.
static CLAUSE_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])(\d{1,3}(?:\.\d{1,3}){2,3})\b").expect("numeric clause regex")
});

/// Clause metadata that is already just an id.
static CLAUSE_ID_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:clause\s+|cl\.\s*|§\s*)?([a-z]?\d{1,3}(?:\.\d{1,3}){0,3}[a-z]?)$")
        .expect("clause id regex")
});

static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btable\s+(\d{1,3}[a-z]?)\b").expect("table regex"));

static FIGURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bfigure\s+|\bfig\.\s*)(\d{1,3}[a-z]?)\b").expect("figure regex")
});

/// Page marker followed by the whole run of digits; length is checked after.
static PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:pp\.|p\.|pg\.?|page)\s*(\d+)").expect("page regex")
});

/// Fallback chain, most specific first.
const CHAIN: [LocatorType; 4] = [
    LocatorType::Clause,
    LocatorType::Table,
    LocatorType::Figure,
    LocatorType::Page,
];

/// Page number from an explicit marker in `text`.
///
/// The full 1–4 digit number is returned; markers followed by five or more
/// digits, or by `0`, are skipped.
///
/// ```rust
/// use compliance_harness_core::citation::extract_page;
///
/// assert_eq!(extract_page("see p.184 for details"), Some(184));
/// assert_eq!(extract_page("Page 7"), Some(7));
/// assert_eq!(extract_page("no marker 184"), None);
/// ```
pub fn extract_page(text: &str) -> Option<u32> {
    PAGE.captures_iter(text).find_map(|caps| {
        let digits = caps.get(1)?.as_str();
        if digits.len() > 4 {
            return None;
        }
        digits.parse::<u32>().ok().filter(|&n| n > 0)
    })
}

/// Clause id from free text.
pub fn extract_clause(text: &str) -> Option<String> {
    [&*CLAUSE_LABELED, &*CLAUSE_LETTERED, &*CLAUSE_NUMERIC]
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

pub fn extract_table(text: &str) -> Option<String> {
    TABLE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

pub fn extract_figure(text: &str) -> Option<String> {
    FIGURE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// A located citation plus the degradation raised when nothing was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub citation: Citation,
    pub degradation: Option<Degradation>,
}

/// Locate `chunk`, starting at `preferred` and falling back one level at a
/// time down to page-only.
pub fn locate(chunk: &DocumentChunk, preferred: LocatorType) -> Located {
    let start = CHAIN.iter().position(|t| *t == preferred).unwrap_or(0);
    let page = page_of(chunk);

    for kind in &CHAIN[start..] {
        let value = match kind {
            LocatorType::Clause => clause_of(chunk),
            LocatorType::Table => search_text(chunk, extract_table),
            LocatorType::Figure => search_text(chunk, extract_figure),
            LocatorType::Page => page.map(|p| p.to_string()),
            LocatorType::Source => None,
        };
        if let Some(value) = value {
            return Located {
                citation: build(&chunk.source, *kind, value, page),
                degradation: None,
            };
        }
    }

    Located {
        citation: Citation {
            source: chunk.source.clone(),
            locator_type: LocatorType::Source,
            locator_value: String::new(),
            page: None,
            display_text: chunk.source.clone(),
        },
        degradation: Some(Degradation::MalformedLocator {
            source: chunk.source.clone(),
        }),
    }
}

/// Up to `limit` citations with distinct display texts, in chunk order.
pub fn cite<'a, I>(chunks: I, limit: usize) -> (Vec<Citation>, Vec<Degradation>)
where
    I: IntoIterator<Item = &'a DocumentChunk>,
{
    let mut citations = Vec::new();
    let mut degraded = Vec::new();
    let mut seen = HashSet::new();

    for chunk in chunks {
        if citations.len() == limit {
            break;
        }
        let located = locate(chunk, LocatorType::Clause);
        if !seen.insert(located.citation.display_text.clone()) {
            continue;
        }
        if let Some(d) = located.degradation {
            degraded.push(d);
        }
        citations.push(located.citation);
    }

    (citations, degraded)
}

fn build(source: &str, kind: LocatorType, value: String, page: Option<u32>) -> Citation {
    let suffix = page.map(|p| format!(" (p.{})", p)).unwrap_or_default();
    let display_text = match kind {
        LocatorType::Clause => format!("{} clause {}{}", source, value, suffix),
        LocatorType::Table => format!("{} Table {}{}", source, value, suffix),
        LocatorType::Figure => format!("{} Figure {}{}", source, value, suffix),
        LocatorType::Page => format!("{} p.{}", source, value),
        LocatorType::Source => source.to_string(),
    };
    Citation {
        source: source.to_string(),
        locator_type: kind,
        locator_value: value,
        page,
        display_text,
    }
}

fn texts(chunk: &DocumentChunk) -> impl Iterator<Item = &str> {
    [Some(chunk.content.as_str()), Some(chunk.snippet.as_str()), chunk.section.as_deref()]
        .into_iter()
        .flatten()
        .filter(|t| !t.is_empty())
}

fn search_text(chunk: &DocumentChunk, extract: fn(&str) -> Option<String>) -> Option<String> {
    texts(chunk).find_map(extract)
}

fn clause_of(chunk: &DocumentChunk) -> Option<String> {
    if let Some(meta) = chunk.clause.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(id) = CLAUSE_ID_ONLY.captures(meta).and_then(|c| c.get(1)) {
            return Some(id.as_str().to_string());
        }
        if let Some(id) = extract_clause(meta) {
            return Some(id);
        }
    }
    search_text(chunk, extract_clause)
}

fn page_of(chunk: &DocumentChunk) -> Option<u32> {
    texts(chunk)
        .find_map(extract_page)
        .or((chunk.page > 0).then_some(chunk.page))
}
