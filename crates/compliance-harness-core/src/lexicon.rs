//! Domain vocabularies and term matching.
//!
//! Each Building Code family has a small fixed lexicon of terms that signal
//! a passage is on-topic. The scorer counts distinct lexicon hits shared by
//! the question and the passage; the classifier uses the combined lexicon to
//! decide whether a question is about building work at all.

/// Per-family lexicons, keyed by code family.
const FAMILY_LEXICONS: &[(&str, &[&str])] = &[
    (
        "B1",
        &[
            "bracing", "foundation", "footing", "pile", "structure", "structural", "load",
            "wind zone", "earthquake", "lintel", "beam", "joist", "rafter", "stud", "span",
            "fixing",
        ],
    ),
    (
        "B2",
        &["durability", "corrosion", "coating", "stainless", "galvanised", "service life"],
    ),
    (
        "C",
        &[
            "fire", "fire rating", "fire separation", "smoke", "escape", "sprinkler",
            "boundary", "frr",
        ],
    ),
    (
        "D1",
        &["access", "ramp", "stair", "handrail", "slip", "accessible", "landing"],
    ),
    (
        "E1",
        &[
            "surface water", "drainage", "gutter", "downpipe", "stormwater", "flooding",
            "floor level",
        ],
    ),
    (
        "E2",
        &[
            "flashing", "apron", "cladding", "cavity", "weathertight", "weathertightness",
            "membrane", "roof", "sill", "jamb", "underlay", "cover", "lap", "parapet", "deck",
            "penetration", "pitch",
        ],
    ),
    (
        "E3",
        &["wet area", "shower", "waterproofing", "moisture", "bathroom", "condensation"],
    ),
    (
        "F4",
        &["barrier", "fall", "balustrade", "height", "opening", "climbable"],
    ),
    ("G4", &["ventilation", "air", "extract", "opening window"]),
    (
        "G12",
        &["water supply", "hot water", "valve", "pipe", "tempering", "cylinder"],
    ),
    ("G13", &["sanitary", "drain", "trap", "vent", "waste"]),
    (
        "H1",
        &[
            "insulation", "r-value", "thermal", "glazing", "energy", "window", "skylight",
        ],
    ),
];

/// Lexicon for a family code such as `"E2"` or `"C3"`.
///
/// Fire clauses (`C1`..`C6`) share the `"C"` lexicon. Families without a
/// dedicated lexicon get `None`; callers fall back to [`all_terms`].
pub fn lexicon_for(family: &str) -> Option<&'static [&'static str]> {
    let key = if family.starts_with('C') && family.len() <= 2 {
        "C"
    } else {
        family
    };
    FAMILY_LEXICONS
        .iter()
        .find(|(f, _)| *f == key)
        .map(|(_, terms)| *terms)
}

/// Every term in every family lexicon, deduplicated, in declaration order.
pub fn all_terms() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for (_, terms) in FAMILY_LEXICONS {
        for t in *terms {
            if !out.contains(t) {
                out.push(t);
            }
        }
    }
    out
}

/// Lowercase, collapse whitespace, and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `term` occurs in `haystack` (already lowercased) on word
/// boundaries. A plural `s`/`es` suffix still counts as a match.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let mut end = start + term.len();
        let before_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        if haystack[end..].starts_with("es") && !haystack[end + 2..].starts_with(is_word_char) {
            end += 2;
        } else if haystack[end..].starts_with('s')
            && !haystack[end + 1..].starts_with(is_word_char)
        {
            end += 1;
        }
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
        while from < haystack.len() && !haystack.is_char_boundary(from) {
            from += 1;
        }
        if from >= haystack.len() {
            break;
        }
    }
    false
}

/// Terms from `terms` that appear in `text` (already normalized).
pub fn matching_terms<'a>(text: &str, terms: &[&'a str]) -> Vec<&'a str> {
    terms
        .iter()
        .copied()
        .filter(|t| contains_term(text, t))
        .collect()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
