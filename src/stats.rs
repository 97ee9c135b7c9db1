//! Aggregated counts and success rates over validation outcomes.
//!
//! Aggregation is pure and order-independent: the same multiset of outcomes
//! always produces identical statistics, serialized byte-for-byte the same.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contact::ProofType;
use crate::proof::{ValidationOutcome, ValidationStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub total: usize,
    pub valid: usize,
    /// Mismatches, malformed declarations and relays without a proof.
    pub invalid: usize,
    /// Network errors and timeouts; not counted as failed proofs.
    pub errors: usize,
    /// `valid / total` as a percentage, two decimals; 0 when empty.
    pub success_rate: f64,
}

impl GroupStats {
    fn add(&mut self, status: ValidationStatus) {
        self.total += 1;
        match status {
            ValidationStatus::Valid => self.valid += 1,
            s if s.is_error() => self.errors += 1,
            _ => self.invalid += 1,
        }
    }

    fn seal(&mut self) {
        self.success_rate = success_rate(self.valid, self.total);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub overall: GroupStats,
    /// Always holds all three proof types.
    pub by_proof_type: BTreeMap<ProofType, GroupStats>,
    pub by_status: BTreeMap<ValidationStatus, usize>,
}

impl Statistics {
    pub fn proof_type(&self, proof_type: ProofType) -> GroupStats {
        self.by_proof_type.get(&proof_type).cloned().unwrap_or_default()
    }

    pub fn status_count(&self, status: ValidationStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Percentage rounded to two decimals.
pub fn success_rate(valid: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (valid as f64 * 10_000.0 / total as f64).round() / 100.0
}

/// Reduce outcomes into per-proof-type and overall statistics.
pub fn aggregate(outcomes: &[ValidationOutcome]) -> Statistics {
    let mut stats = Statistics::default();
    for proof_type in [ProofType::DnsRsa, ProofType::UriRsa, ProofType::None] {
        stats.by_proof_type.insert(proof_type, GroupStats::default());
    }

    for outcome in outcomes {
        stats.overall.add(outcome.status);
        stats
            .by_proof_type
            .entry(outcome.proof_type)
            .or_default()
            .add(outcome.status);
        *stats.by_status.entry(outcome.status).or_insert(0) += 1;
    }

    stats.overall.seal();
    for group in stats.by_proof_type.values_mut() {
        group.seal();
    }
    stats
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn arb_proof_type() -> impl Strategy<Value = ProofType> {
        prop_oneof![Just(ProofType::DnsRsa), Just(ProofType::UriRsa), Just(ProofType::None)]
    }

    fn arb_status() -> impl Strategy<Value = ValidationStatus> {
        prop_oneof![
            Just(ValidationStatus::Valid),
            Just(ValidationStatus::InvalidMismatch),
            Just(ValidationStatus::NoProof),
            Just(ValidationStatus::MalformedDeclaration),
            Just(ValidationStatus::NetworkError),
            Just(ValidationStatus::Timeout),
        ]
    }

    fn arb_outcome() -> impl Strategy<Value = ValidationOutcome> {
        (arb_proof_type(), arb_status()).prop_map(|(proof_type, status)| ValidationOutcome {
            fingerprint: "ABCDEF0123456789ABCDEF0123456789ABCDEF01".into(),
            nickname: String::new(),
            proof_type,
            target: None,
            status,
            steps: Vec::new(),
            error_message: status.is_error().then(|| "error".to_string()),
            elapsed_ms: 0,
        })
    }

    proptest! {
        #[test]
        fn order_independent(
            (outcomes, shuffled) in prop::collection::vec(arb_outcome(), 0..64)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let a = aggregate(&outcomes);
            let b = aggregate(&shuffled);
            prop_assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }

        #[test]
        fn totals_account_for_every_outcome(outcomes in prop::collection::vec(arb_outcome(), 0..64)) {
            let stats = aggregate(&outcomes);
            prop_assert_eq!(stats.overall.total, outcomes.len());
            prop_assert_eq!(
                stats.overall.valid + stats.overall.invalid + stats.overall.errors,
                outcomes.len()
            );
            let per_type: usize = stats.by_proof_type.values().map(|g| g.total).sum();
            prop_assert_eq!(per_type, outcomes.len());
        }
    }
}
