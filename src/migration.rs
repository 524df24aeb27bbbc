// 🔀 Migration Comparator - Vote deltas between two selections
//
// Full outer join of two per-municipality aggregates (base A, comparison B).
// A side missing a municipality contributes 0. Percentage change from a zero
// base is undefined and reported as None, never as 0% or 100%.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{IntelError, IntelResult};
use crate::store::{CandidateDirectory, DemographicSource, VoteSource};

/// One (election, candidate) side of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub election_id: i64,
    pub candidate_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationParams {
    pub base: Selection,
    pub comparison: Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRow {
    #[serde(rename = "municipio_id")]
    pub municipality_id: i64,

    #[serde(rename = "municipio")]
    pub municipality: String,

    #[serde(rename = "sigla_uf")]
    pub state: String,

    #[serde(rename = "votos_antigos")]
    pub votes_a: u64,

    #[serde(rename = "votos_novos")]
    pub votes_b: u64,

    #[serde(rename = "variacao_absoluta")]
    pub absolute_change: i64,

    /// None when votes_a = 0
    #[serde(rename = "variacao_perc")]
    pub percent_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    #[serde(rename = "total_anterior")]
    pub total_a: u64,

    #[serde(rename = "total_atual")]
    pub total_b: u64,

    /// None when total_a = 0
    #[serde(rename = "variacao_total_perc")]
    pub total_percent_change: Option<f64>,

    #[serde(rename = "data")]
    pub rows: Vec<MigrationRow>,
}

fn percent_change(from: u64, to: u64) -> Option<f64> {
    if from == 0 {
        return None;
    }
    Some((to as f64 - from as f64) / from as f64 * 100.0)
}

fn validate<S>(store: &S, selection: &Selection) -> IntelResult<()>
where
    S: CandidateDirectory + ?Sized,
{
    store
        .election(selection.election_id)?
        .ok_or_else(|| IntelError::not_found("election", selection.election_id))?;
    store
        .candidate(selection.candidate_id)?
        .ok_or_else(|| IntelError::not_found("candidate", selection.candidate_id))?;
    Ok(())
}

/// Compare per-municipality votes of selection B against base selection A.
///
/// Rows are ordered by municipality name, then id.
pub fn compare_migration<S>(store: &S, params: &MigrationParams) -> IntelResult<MigrationResult>
where
    S: DemographicSource + VoteSource + CandidateDirectory + ?Sized,
{
    validate(store, &params.base)?;
    validate(store, &params.comparison)?;

    // municipality → (votes_a, votes_b)
    let mut joined: BTreeMap<i64, (u64, u64)> = BTreeMap::new();
    for a in store.vote_aggregates(params.base.election_id, params.base.candidate_id)? {
        joined.entry(a.municipality_id).or_default().0 += a.votes;
    }
    for b in store.vote_aggregates(params.comparison.election_id, params.comparison.candidate_id)? {
        joined.entry(b.municipality_id).or_default().1 += b.votes;
    }

    let names: HashMap<i64, (String, String)> = store
        .municipalities()?
        .into_iter()
        .map(|m| (m.id, (m.name, m.state)))
        .collect();

    let mut rows: Vec<MigrationRow> = joined
        .into_iter()
        .filter(|(_, (a, b))| *a > 0 || *b > 0)
        .map(|(municipality_id, (votes_a, votes_b))| {
            let (municipality, state) = names.get(&municipality_id).cloned().unwrap_or_default();
            MigrationRow {
                municipality_id,
                municipality,
                state,
                votes_a,
                votes_b,
                absolute_change: votes_b as i64 - votes_a as i64,
                percent_change: percent_change(votes_a, votes_b),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.municipality
            .cmp(&b.municipality)
            .then(a.municipality_id.cmp(&b.municipality_id))
    });

    let total_a: u64 = rows.iter().map(|r| r.votes_a).sum();
    let total_b: u64 = rows.iter().map(|r| r.votes_b).sum();

    Ok(MigrationResult {
        total_a,
        total_b,
        total_percent_change: percent_change(total_a, total_b),
        rows,
    })
}
