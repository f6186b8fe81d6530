use compliance_harness_core::citation::extract_page;
use compliance_harness_core::dedup::dedup;
use compliance_harness_core::family::FamilyTable;
use compliance_harness_core::hierarchy::resolve;
use compliance_harness_core::models::{DocStatus, DocType, DocumentChunk};
use compliance_harness_core::scorer::{
    AmendmentDetector, Candidate, HybridScorer, ScoredChunk, ScoringWeights, SourceBiasTable,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn arb_doc_type() -> impl Strategy<Value = DocType> {
    prop_oneof![
        Just(DocType::AcceptableSolutionCurrent),
        Just(DocType::AcceptableSolutionLegacy),
        Just(DocType::VerificationMethodCurrent),
        Just(DocType::VerificationMethodLegacy),
        Just(DocType::IndustryCodeOfPractice),
        Just(DocType::NzStandard),
        Just(DocType::HandbookGuide),
        Just(DocType::Unclassified),
    ]
}

fn arb_status() -> impl Strategy<Value = DocStatus> {
    prop_oneof![
        Just(DocStatus::Current),
        Just(DocStatus::Legacy),
        Just(DocStatus::Expired),
    ]
}

fn arb_source() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("E2/AS1".to_string()),
        Just("E2/AS1 3rd edition".to_string()),
        Just("E2/VM1".to_string()),
        Just("B1/AS1".to_string()),
        Just("B1 Amendment 13".to_string()),
        Just("NZ Metal Roofing".to_string()),
        Just("BRANZ Good Practice".to_string()),
    ]
}

prop_compose! {
    fn arb_candidate()(
        source in arb_source(),
        page in 1u32..6,
        doc_type in arb_doc_type(),
        status in arb_status(),
        priority in -20i32..140,
        similarity in -1.0f64..1.0,
    ) -> Candidate {
        let mut chunk = DocumentChunk::new(source, page, "apron flashing cover bracing");
        chunk.doc_type = doc_type;
        chunk.status = status;
        chunk.priority = priority;
        Candidate { chunk, similarity }
    }
}

fn score(candidates: Vec<Candidate>, question: &str) -> Vec<ScoredChunk> {
    let scorer = HybridScorer::default();
    let query = scorer.query(question, true, false);
    scorer.score_all(&query, candidates)
}

// ── Score bounds ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn blended_score_in_unit_interval(
        candidates in prop::collection::vec(arb_candidate(), 0..20),
        vector in 0.0f64..5.0,
        keyword in 0.0f64..5.0,
        bias in 0.0f64..5.0,
        keyword_only in any::<bool>(),
    ) {
        prop_assume!(vector + keyword + bias > 0.0);
        let scorer = HybridScorer::new(
            ScoringWeights::normalized(vector, keyword, bias).unwrap(),
            SourceBiasTable::default(),
            AmendmentDetector::default(),
            FamilyTable::default(),
        );
        let query = scorer.query("Amendment 13 apron flashing cover", true, keyword_only);
        for s in scorer.score_all(&query, candidates) {
            prop_assert!((0.0..=1.0).contains(&s.score), "score {} out of range", s.score);
            prop_assert!((0.0..=1.0).contains(&s.breakdown.source_bias));
        }
    }

    #[test]
    fn ranking_is_deterministic(candidates in prop::collection::vec(arb_candidate(), 0..20)) {
        let key = |v: Vec<ScoredChunk>| -> Vec<(String, u32, u64)> {
            v.into_iter()
                .map(|s| (s.chunk.source, s.chunk.page, s.score.to_bits()))
                .collect()
        };
        let a = key(score(candidates.clone(), "apron flashing cover"));
        let b = key(score(candidates, "apron flashing cover"));
        prop_assert_eq!(a.clone(), b);
        prop_assert!(a.windows(2).all(|w| f64::from_bits(w[0].2) >= f64::from_bits(w[1].2)));
    }
}

// ── Deduplicator ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn dedup_one_per_key_with_max_score(candidates in prop::collection::vec(arb_candidate(), 0..30)) {
        let scored = score(candidates, "apron flashing cover");
        let mut best: HashMap<(String, u32), f64> = HashMap::new();
        for s in &scored {
            let e = best.entry((s.chunk.source.clone(), s.chunk.page)).or_insert(f64::MIN);
            if s.score > *e {
                *e = s.score;
            }
        }

        let out = dedup(scored);
        prop_assert_eq!(out.len(), best.len());
        let mut seen = std::collections::HashSet::new();
        for s in &out {
            let key = (s.chunk.source.clone(), s.chunk.page);
            prop_assert!(seen.insert(key.clone()), "duplicate key {:?}", key);
            prop_assert_eq!(s.score, best[&key]);
        }
    }
}

// ── Hierarchy resolver ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn hierarchy_never_prefers_legacy_over_current(
        candidates in prop::collection::vec(arb_candidate(), 0..30),
        with_amendment in any::<bool>(),
    ) {
        let question = if with_amendment { "Amendment 13 bracing" } else { "bracing" };
        let amendment = AmendmentDetector::default().detect(question);
        let scored = dedup(score(candidates, question));

        let mut has_current: HashMap<String, bool> = HashMap::new();
        for s in &scored {
            if let Some(f) = &s.family {
                *has_current.entry(f.as_str().to_string()).or_default() |=
                    s.chunk.doc_type == DocType::AcceptableSolutionCurrent;
            }
        }

        let out = resolve(scored, amendment.as_ref());
        let mut per_family: HashMap<String, usize> = HashMap::new();
        for s in &out {
            if let Some(f) = &s.family {
                *per_family.entry(f.as_str().to_string()).or_default() += 1;
                if has_current[f.as_str()] {
                    prop_assert_ne!(s.chunk.doc_type, DocType::AcceptableSolutionLegacy);
                }
            }
        }
        prop_assert!(per_family.values().all(|&n| n == 1));
    }

    #[test]
    fn hierarchy_preserves_relative_order(candidates in prop::collection::vec(arb_candidate(), 0..30)) {
        let scored = dedup(score(candidates, "bracing"));
        let order: Vec<(String, u32)> = scored.iter().map(|s| (s.chunk.source.clone(), s.chunk.page)).collect();
        let out = resolve(scored, None);
        let positions: Vec<usize> = out
            .iter()
            .map(|s| order.iter().position(|k| k.0 == s.chunk.source && k.1 == s.chunk.page).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

// ── Page extraction ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn page_marker_parses_full_number(page in 1u32..10_000, marker in prop_oneof![Just("p."), Just("page "), Just("P."), Just("pg ")]) {
        let text = format!("refer to {}{} for details", marker, page);
        prop_assert_eq!(extract_page(&text), Some(page));
    }

    #[test]
    fn no_marker_no_page(n in 0u32..100_000) {
        let text = format!("minimum cover of {} mm", n);
        prop_assert_eq!(extract_page(&text), None);
    }

    #[test]
    fn five_digit_marker_rejected(n in 10_000u32..1_000_000) {
        prop_assert_eq!(extract_page(&format!("p.{}", n)), None);
    }
}
