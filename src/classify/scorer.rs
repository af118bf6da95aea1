//! Weighted signal scorer.
//!
//! A pure function over `(log lines, context, weight table)`: each
//! case-insensitive occurrence of a configured instruction name in any log
//! line adds its weight, plus two conjunctive bonuses that reward launch
//! shapes (a buy right next to mint creation, a mint right next to a virtual
//! pool being initialised).

use std::collections::BTreeMap;

/// Bonus for `buyExactIn`: larger when the broader context also shows a mint
/// being created.
const BUY_EXACT_IN_WITH_MINT: f64 = 0.6;
const BUY_EXACT_IN_ALONE: f64 = 0.2;

/// Bonus for `mintTo`: larger when the context shows a virtual pool or a
/// second-generation mint initialisation.
const MINT_TO_WITH_POOL: f64 = 0.7;
const MINT_TO_ALONE: f64 = 0.4;

pub fn score_logs(lines: &[String], context: &str, weights: &BTreeMap<String, f64>) -> f64 {
    let lowered: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
    let context = context.to_lowercase();

    let mut score = 0.0;
    for (name, weight) in weights {
        let needle = name.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        for line in &lowered {
            score += weight * line.matches(needle.as_str()).count() as f64;
        }
    }

    let joined = lowered.join("\n");
    if joined.contains("buyexactin") {
        score += if context.contains("mintto") || context.contains("initializemint") {
            BUY_EXACT_IN_WITH_MINT
        } else {
            BUY_EXACT_IN_ALONE
        };
    }
    if joined.contains("mintto") {
        score += if context.contains("initializevirtualpoolwithspltoken")
            || context.contains("initializemint2")
        {
            MINT_TO_WITH_POOL
        } else {
            MINT_TO_ALONE
        };
    }

    score
}
