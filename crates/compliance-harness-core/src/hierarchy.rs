//! Source hierarchy resolution.
//!
//! A superseded document and its replacement must never be cited side by
//! side. Candidates are grouped by code family and each group is reduced to
//! its single most authoritative member. Ungrouped candidates pass through
//! untouched, and the output keeps the input's ranked order.
//!
//! Within a group the representative is chosen by:
//!
//! 1. the amendment hint, if the question named an amendment that a member
//!    matches (a legacy acceptable solution never displaces a current one);
//! 2. doc-type precedence (see [`DocType::precedence`]);
//! 3. priority, higher first;
//! 4. status, current before legacy before expired;
//! 5. score, higher first;
//! 6. page, lower first.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::family::CodeFamily;
use crate::models::DocType;
use crate::scorer::{AmendmentRef, ScoredChunk};

/// Reduce each code family to one representative.
pub fn resolve(candidates: Vec<ScoredChunk>, amendment: Option<&AmendmentRef>) -> Vec<ScoredChunk> {
    let mut groups: HashMap<CodeFamily, Vec<usize>> = HashMap::new();
    for (i, c) in candidates.iter().enumerate() {
        if let Some(family) = &c.family {
            groups.entry(family.clone()).or_default().push(i);
        }
    }

    let mut keep = vec![true; candidates.len()];
    for members in groups.values() {
        if members.len() < 2 {
            continue;
        }
        let winner = representative(&candidates, members, amendment);
        for &i in members {
            keep[i] = i == winner;
        }
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c))
        .collect()
}

fn representative(
    candidates: &[ScoredChunk],
    members: &[usize],
    amendment: Option<&AmendmentRef>,
) -> usize {
    let by_authority = most_authoritative(candidates, members.iter().copied()).unwrap_or(members[0]);

    let Some(amendment) = amendment else {
        return by_authority;
    };
    let hinted = most_authoritative(
        candidates,
        members
            .iter()
            .copied()
            .filter(|&i| amendment.matches(&candidates[i].chunk)),
    );

    match hinted {
        Some(i) => {
            let legacy_over_current = candidates[i].chunk.doc_type
                == DocType::AcceptableSolutionLegacy
                && members
                    .iter()
                    .any(|&m| candidates[m].chunk.doc_type == DocType::AcceptableSolutionCurrent);
            if legacy_over_current {
                by_authority
            } else {
                i
            }
        }
        None => by_authority,
    }
}

fn most_authoritative(
    candidates: &[ScoredChunk],
    pool: impl Iterator<Item = usize>,
) -> Option<usize> {
    pool.min_by(|&a, &b| authority_order(&candidates[a], &candidates[b]).then(a.cmp(&b)))
}

/// Most authoritative first.
fn authority_order(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    a.chunk
        .doc_type
        .precedence()
        .cmp(&b.chunk.doc_type.precedence())
        .then(b.chunk.priority.cmp(&a.chunk.priority))
        .then(a.chunk.status.cmp(&b.chunk.status))
        .then(b.score.total_cmp(&a.score))
        .then(a.chunk.page.cmp(&b.chunk.page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::FamilyTable;
    use crate::models::{DocStatus, DocumentChunk, ScoreBreakdown};
    use crate::scorer::AmendmentDetector;

    fn scored(source: &str, page: u32, doc_type: DocType, priority: i32, score: f64) -> ScoredChunk {
        let mut chunk = DocumentChunk::new(source, page, "");
        chunk.doc_type = doc_type;
        chunk.priority = priority;
        ScoredChunk {
            family: FamilyTable::building_code().family_of(source),
            chunk,
            score,
            breakdown: ScoreBreakdown {
                vector_similarity: score,
                keyword_boost: 0.0,
                source_bias: 0.0,
                vector_weight: 1.0,
                keyword_weight: 0.0,
                source_bias_weight: 0.0,
                amendment_match: false,
            },
        }
    }

    fn sources(v: &[ScoredChunk]) -> Vec<&str> {
        v.iter().map(|c| c.chunk.source.as_str()).collect()
    }

    #[test]
    fn test_current_beats_legacy() {
        let out = resolve(
            vec![
                scored("E2/AS1 3rd edition", 12, DocType::AcceptableSolutionLegacy, 90, 0.9),
                scored("E2/AS1", 12, DocType::AcceptableSolutionCurrent, 90, 0.8),
            ],
            None,
        );
        assert_eq!(sources(&out), vec!["E2/AS1"]);
    }

    #[test]
    fn test_ungrouped_pass_through_in_order() {
        let out = resolve(
            vec![
                scored("NZ Metal Roofing", 40, DocType::IndustryCodeOfPractice, 75, 0.9),
                scored("E2/VM1", 3, DocType::VerificationMethodCurrent, 80, 0.85),
                scored("BRANZ Good Practice", 2, DocType::HandbookGuide, 40, 0.8),
                scored("E2/AS1", 90, DocType::AcceptableSolutionCurrent, 90, 0.7),
            ],
            None,
        );
        assert_eq!(
            sources(&out),
            vec!["NZ Metal Roofing", "BRANZ Good Practice", "E2/AS1"]
        );
    }

    #[test]
    fn test_priority_breaks_same_type() {
        let out = resolve(
            vec![
                scored("B1/AS1", 1, DocType::AcceptableSolutionCurrent, 60, 0.9),
                scored("B1/AS3", 1, DocType::AcceptableSolutionCurrent, 80, 0.5),
            ],
            None,
        );
        assert_eq!(sources(&out), vec!["B1/AS3"]);
    }

    #[test]
    fn test_status_then_score() {
        let mut expired = scored("G12/AS1", 1, DocType::AcceptableSolutionCurrent, 70, 0.95);
        expired.chunk.status = DocStatus::Expired;
        let out = resolve(
            vec![
                expired,
                scored("G12/AS2", 5, DocType::AcceptableSolutionCurrent, 70, 0.4),
                scored("G12/AS3", 3, DocType::AcceptableSolutionCurrent, 70, 0.6),
            ],
            None,
        );
        assert_eq!(sources(&out), vec!["G12/AS3"]);
    }

    #[test]
    fn test_amendment_hint_selects_named_document() {
        let amendment = AmendmentDetector::default().detect("Amendment 13 bracing").unwrap();
        let out = resolve(
            vec![
                scored("B1/AS1", 10, DocType::AcceptableSolutionCurrent, 90, 0.81),
                scored("B1 Amendment 13", 3, DocType::AcceptableSolutionCurrent, 90, 0.80),
            ],
            Some(&amendment),
        );
        assert_eq!(sources(&out), vec!["B1 Amendment 13"]);
    }

    #[test]
    fn test_amendment_hint_never_promotes_legacy_over_current() {
        let amendment = AmendmentDetector::default().detect("amendment 5").unwrap();
        let out = resolve(
            vec![
                scored("E2/AS1 Amendment 5", 10, DocType::AcceptableSolutionLegacy, 90, 0.9),
                scored("E2/AS1", 10, DocType::AcceptableSolutionCurrent, 90, 0.7),
            ],
            Some(&amendment),
        );
        assert_eq!(sources(&out), vec!["E2/AS1"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve(Vec::new(), None).is_empty());
    }
}
