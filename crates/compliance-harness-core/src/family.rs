//! Code-family derivation.
//!
//! A code family groups the documents that address the same regulatory
//! clause lineage across editions and amendments (`"E2/AS1"`,
//! `"E2/VM1"`, `"E2 Amendment 10"` all belong to `E2`). Families are computed
//! per query from the source name against a known prefix table; nothing is
//! persisted.

use serde::Serialize;
use std::fmt;

/// NZ Building Code clauses recognised out of the box.
const BUILDING_CODE_CLAUSES: &[&str] = &[
    "B1", "B2", "C1", "C2", "C3", "C4", "C5", "C6", "D1", "D2", "E1", "E2", "E3", "F1", "F2",
    "F3", "F4", "F5", "F6", "F7", "F8", "F9", "G1", "G2", "G3", "G4", "G5", "G6", "G7", "G8",
    "G9", "G10", "G11", "G12", "G13", "G14", "G15", "H1",
];

/// Leading tokens stripped before prefix matching (`"NZBC E2/AS1"`).
const NOISE_PREFIXES: &[&str] = &["NZBC ", "BUILDING CODE ", "CLAUSE "];

/// A derived grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CodeFamily(String);

impl CodeFamily {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps source names to code families by prefix.
#[derive(Debug, Clone)]
pub struct FamilyTable {
    /// `(family, uppercase prefix)`, longest prefix first.
    prefixes: Vec<(String, String)>,
}

impl FamilyTable {
    /// Empty table; nothing is grouped.
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    /// Table covering the NZ Building Code clauses.
    pub fn building_code() -> Self {
        let mut table = Self::empty();
        for clause in BUILDING_CODE_CLAUSES {
            table.add_prefix(clause, clause);
        }
        table
    }

    /// Register an extra prefix for `family`.
    pub fn add_prefix(&mut self, family: &str, prefix: &str) {
        let prefix = prefix.trim().to_uppercase();
        if prefix.is_empty() {
            return;
        }
        self.prefixes.push((family.trim().to_string(), prefix));
        self.prefixes
            .sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.1.cmp(&b.1)));
    }

    /// Builder-style variant of [`add_prefix`](Self::add_prefix).
    pub fn with_family<S: AsRef<str>>(mut self, family: &str, prefixes: &[S]) -> Self {
        for p in prefixes {
            self.add_prefix(family, p.as_ref());
        }
        self
    }

    /// Family of a source name, if any prefix matches.
    ///
    /// A prefix only matches when it is followed by a non-alphanumeric
    /// character or the end of the name, so `E2` does not claim `E21`.
    pub fn family_of(&self, source: &str) -> Option<CodeFamily> {
        let mut name = source.trim().to_uppercase();
        for noise in NOISE_PREFIXES {
            if let Some(rest) = name.strip_prefix(noise) {
                name = rest.trim_start().to_string();
            }
        }
        self.prefixes.iter().find_map(|(family, prefix)| {
            let rest = name.strip_prefix(prefix.as_str())?;
            match rest.chars().next() {
                Some(c) if c.is_ascii_alphanumeric() => None,
                _ => Some(CodeFamily(family.clone())),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Default for FamilyTable {
    fn default() -> Self {
        Self::building_code()
    }
}
