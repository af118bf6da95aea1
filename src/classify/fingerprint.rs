//! Multi-criterion fingerprint matcher.
//!
//! Each fingerprint names a required instruction set, the program(s) it must
//! originate from, a combinator, and a minimum score. Fingerprints are tried
//! in configuration order and the first one that passes wins.

use crate::config::{FingerprintSpec, MatchLogic};
use crate::types::Tag;

/// Compiled fingerprint: instruction names lowercased once at build time.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub tag: Tag,
    pub required_instructions: Vec<String>,
    pub required_programs: Vec<String>,
    pub logic: MatchLogic,
    pub min_score: f64,
    pub confidence: f64,
}

impl From<&FingerprintSpec> for Fingerprint {
    fn from(spec: &FingerprintSpec) -> Self {
        Self {
            tag: spec.tag,
            required_instructions: spec
                .required_instructions
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            required_programs: spec.required_programs.clone(),
            logic: spec.logic,
            min_score: spec.min_score,
            confidence: spec.confidence,
        }
    }
}

pub fn compile(specs: &[FingerprintSpec]) -> Vec<Fingerprint> {
    specs.iter().map(Fingerprint::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintHit {
    pub tag: Tag,
    pub confidence: f64,
}

impl Fingerprint {
    /// Count required instructions present either in the decoded instruction
    /// names or as substrings of the joined log text.
    fn match_count(&self, joined_lower: &str, decoded_instructions: Option<&[String]>) -> usize {
        self.required_instructions
            .iter()
            .filter(|needle| {
                let in_decoded = decoded_instructions
                    .map(|names| names.iter().any(|n| n.to_lowercase() == **needle))
                    .unwrap_or(false);
                in_decoded || joined_lower.contains(needle.as_str())
            })
            .count()
    }

    /// A program matches by exact equality against the message's program id
    /// or alias, or by appearing verbatim in the log text (program invoke
    /// lines carry the address).
    fn program_matched(&self, joined: &str, program_id: &str, program_alias: &str) -> bool {
        self.required_programs
            .iter()
            .any(|p| p == program_id || p == program_alias || joined.contains(p.as_str()))
    }

    fn passes(
        &self,
        joined: &str,
        joined_lower: &str,
        decoded_instructions: Option<&[String]>,
        program_id: &str,
        program_alias: &str,
    ) -> bool {
        let program_matched = self.program_matched(joined, program_id, program_alias);
        if !program_matched {
            return false;
        }
        let match_count = self.match_count(joined_lower, decoded_instructions);
        // Program equality is worth one point toward the gate.
        if (match_count as f64) + 1.0 < self.min_score {
            return false;
        }
        match self.logic {
            MatchLogic::And => match_count == self.required_instructions.len(),
            MatchLogic::Or => match_count >= 1 || program_matched,
            MatchLogic::Fuzzy => {
                let needed = self.required_instructions.len().div_ceil(2);
                match_count >= needed
            }
        }
    }
}

/// First fingerprint that passes wins; ties are impossible by construction
/// because iteration order is configuration order.
pub fn match_fingerprints(
    fingerprints: &[Fingerprint],
    lines: &[String],
    decoded_instructions: Option<&[String]>,
    program_id: &str,
    program_alias: &str,
) -> Option<FingerprintHit> {
    let joined = lines.join("\n");
    let joined_lower = joined.to_lowercase();
    fingerprints
        .iter()
        .find(|fp| {
            fp.passes(
                &joined,
                &joined_lower,
                decoded_instructions,
                program_id,
                program_alias,
            )
        })
        .map(|fp| FingerprintHit {
            tag: fp.tag,
            confidence: fp.confidence,
        })
}
