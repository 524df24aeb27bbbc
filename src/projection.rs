// 📈 Goal Projector - Proportional vote targets per municipality
//
//   growth_factor    = target / baseline_total
//   contribution_pct = votes_base / baseline_total × 100
//   target_votes     = round(votes_base × growth_factor)
//   additional       = target_votes − votes_base
//
// Rounding drift is NOT reconciled: Σ target_votes may differ from the global
// target by at most one vote per municipality. The drift is reported as is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{IntelError, IntelResult};
use crate::store::{CandidateDirectory, DemographicSource, VoteSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub candidate_id: i64,

    /// Election/round used as the historical baseline
    pub election_id: i64,

    /// Global vote target
    pub target: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    #[serde(rename = "municipio_id")]
    pub municipality_id: i64,

    #[serde(rename = "municipio")]
    pub municipality: String,

    #[serde(rename = "uf")]
    pub state: String,

    #[serde(rename = "votos_base")]
    pub votes_base: u64,

    #[serde(rename = "contribuicao_pct")]
    pub contribution_pct: f64,

    #[serde(rename = "meta_votos")]
    pub target_votes: u64,

    /// Signed: negative when the municipality is above its share
    #[serde(rename = "necessario_adicional")]
    pub additional_needed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResult {
    #[serde(rename = "total_base")]
    pub baseline_total: u64,

    #[serde(rename = "meta_global")]
    pub target: u64,

    #[serde(rename = "fator_crescimento")]
    pub growth_factor: f64,

    /// Σ target_votes over all rows
    #[serde(rename = "total_projetado")]
    pub projected_total: u64,

    /// projected_total − target
    #[serde(rename = "desvio_arredondamento")]
    pub rounding_drift: i64,

    #[serde(rename = "data")]
    pub rows: Vec<ProjectionRow>,
}

/// Distribute `target` across municipalities proportionally to the baseline.
///
/// Fails with `InvalidTarget` when the baseline has no votes.
pub fn project_goal<S>(store: &S, params: &ProjectionParams) -> IntelResult<ProjectionResult>
where
    S: DemographicSource + VoteSource + CandidateDirectory + ?Sized,
{
    store
        .election(params.election_id)?
        .ok_or_else(|| IntelError::not_found("election", params.election_id))?;
    store
        .candidate(params.candidate_id)?
        .ok_or_else(|| IntelError::not_found("candidate", params.candidate_id))?;

    let baseline: Vec<_> = store
        .vote_aggregates(params.election_id, params.candidate_id)?
        .into_iter()
        .filter(|a| a.votes > 0)
        .collect();

    let baseline_total: u64 = baseline.iter().map(|a| a.votes).sum();
    if baseline_total == 0 {
        return Err(IntelError::InvalidTarget(format!(
            "candidate {} has no recorded votes in election {}",
            params.candidate_id, params.election_id
        )));
    }

    let growth_factor = params.target as f64 / baseline_total as f64;

    let names: HashMap<i64, (String, String)> = store
        .municipalities()?
        .into_iter()
        .map(|m| (m.id, (m.name, m.state)))
        .collect();

    let mut rows: Vec<ProjectionRow> = baseline
        .into_iter()
        .map(|a| {
            let target_votes = (a.votes as f64 * growth_factor).round() as u64;
            let (municipality, state) = names.get(&a.municipality_id).cloned().unwrap_or_default();
            ProjectionRow {
                municipality_id: a.municipality_id,
                municipality,
                state,
                votes_base: a.votes,
                contribution_pct: a.votes as f64 * 100.0 / baseline_total as f64,
                target_votes,
                additional_needed: target_votes as i64 - a.votes as i64,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.votes_base
            .cmp(&a.votes_base)
            .then_with(|| a.municipality.cmp(&b.municipality))
            .then(a.municipality_id.cmp(&b.municipality_id))
    });

    let projected_total: u64 = rows.iter().map(|r| r.target_votes).sum();

    Ok(ProjectionResult {
        baseline_total,
        target: params.target,
        growth_factor,
        projected_total,
        rounding_drift: projected_total as i64 - params.target as i64,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, Election, Municipality};
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn base_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_election(Election {
            id: 1,
            year: 2018,
            round: 1,
            kind: "Geral".to_string(),
        });
        store.add_candidate(Candidate {
            id: 9,
            election_id: 1,
            legal_name: "JOAO".to_string(),
            ballot_name: "JOAO".to_string(),
            office: "SENADOR".to_string(),
            party: "XYZ".to_string(),
            expenditure: None,
        });
        store
    }

    fn add_municipality(store: &mut MemoryStore, id: i64, name: &str) {
        store.add_municipality(Municipality {
            id,
            code: 8000 + id,
            name: name.to_string(),
            state: "SC".to_string(),
            registered_voters: 100_000,
        });
    }

    fn params(target: u64) -> ProjectionParams {
        ProjectionParams {
            candidate_id: 9,
            election_id: 1,
            target,
        }
    }

    #[test]
    fn test_scenario_growth() {
        let mut store = base_store();
        add_municipality(&mut store, 1, "JOINVILLE");
        add_municipality(&mut store, 2, "BLUMENAU");
        store.add_votes(1, 9, 1, 1_000);
        store.add_votes(1, 9, 2, 9_000);

        let result = project_goal(&store, &params(15_000)).unwrap();
        assert_eq!(result.baseline_total, 10_000);
        assert_eq!(result.growth_factor, 1.5);

        let joinville = result.rows.iter().find(|r| r.municipality_id == 1).unwrap();
        assert_eq!(joinville.target_votes, 1_500);
        assert_eq!(joinville.additional_needed, 500);
        assert!((joinville.contribution_pct - 10.0).abs() < 1e-9);

        // Largest baseline first
        assert_eq!(result.rows[0].municipality_id, 2);
        assert_eq!(result.rounding_drift, 0);
    }

    #[test]
    fn test_rounding_drift_is_left_unreconciled() {
        let mut store = base_store();
        for id in 1..=3 {
            add_municipality(&mut store, id, &format!("M{}", id));
            store.add_votes(1, 9, id, 1);
        }

        // 10 / 3 → each rounds 3.33 down to 3, total 9
        let result = project_goal(&store, &params(10)).unwrap();
        assert!(result.rows.iter().all(|r| r.target_votes == 3));
        assert_eq!(result.projected_total, 9);
        assert_eq!(result.rounding_drift, -1);
    }

    #[test]
    fn test_shrinking_target_gives_negative_additional() {
        let mut store = base_store();
        add_municipality(&mut store, 1, "M1");
        store.add_votes(1, 9, 1, 200);

        let result = project_goal(&store, &params(100)).unwrap();
        assert_eq!(result.rows[0].target_votes, 100);
        assert_eq!(result.rows[0].additional_needed, -100);
    }

    #[test]
    fn test_zero_baseline_is_invalid_target() {
        let store = base_store();
        let err = project_goal(&store, &params(1_000)).unwrap_err();
        assert!(matches!(err, IntelError::InvalidTarget(_)));
    }

    #[test]
    fn test_unknown_entities_are_not_found() {
        let store = base_store();
        let err = project_goal(
            &store,
            &ProjectionParams {
                candidate_id: 9,
                election_id: 77,
                target: 10,
            },
        )
        .unwrap_err();
        assert!(err.is_not_found());

        let err = project_goal(
            &store,
            &ProjectionParams {
                candidate_id: 77,
                election_id: 1,
                target: 10,
            },
        )
        .unwrap_err();
        assert!(err.is_not_found());
    }

    proptest! {
        #[test]
        fn prop_projected_total_within_rounding_bound(
            votes in proptest::collection::vec(1u64..50_000, 1..40),
            target in 0u64..5_000_000,
        ) {
            let mut store = base_store();
            for (i, v) in votes.iter().enumerate() {
                let id = i as i64 + 1;
                add_municipality(&mut store, id, &format!("M{}", id));
                store.add_votes(1, 9, id, *v);
            }

            let result = project_goal(&store, &params(target)).unwrap();
            let drift = (result.projected_total as i64 - target as i64).unsigned_abs();
            prop_assert!(drift <= result.rows.len() as u64);
            prop_assert_eq!(result.rows.len(), votes.len());
        }
    }
}
