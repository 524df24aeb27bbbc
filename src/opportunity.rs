// 🎯 Opportunity Scorer - Demographic gap per municipality
//
//   profile_pct = voters in the target category / group total × 100
//   votes_pct   = candidate votes / registered voters × 100
//   gap         = profile_pct − votes_pct
//
// Registered voters are the fixed denominator for votes_pct.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{IntelError, IntelResult};
use crate::model::CategoryGroup;
use crate::profile::ProfileVector;
use crate::store::{CandidateDirectory, DemographicSource, VoteSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityParams {
    pub candidate_id: i64,

    /// Category group the target value belongs to
    pub criterion: CategoryGroup,

    /// Target category, e.g. "18 A 20 ANOS"
    pub value: String,

    pub min_profile_pct: f64,
    pub max_votes_pct: f64,

    /// Skip municipalities with fewer registered voters
    #[serde(default)]
    pub min_registered_voters: u64,

    #[serde(default)]
    pub limit: Option<usize>,

    /// Election year of the profile counts; latest stored when absent
    #[serde(default)]
    pub profile_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityRow {
    #[serde(rename = "municipio_id")]
    pub municipality_id: i64,

    #[serde(rename = "municipio")]
    pub municipality: String,

    #[serde(rename = "sigla_uf")]
    pub state: String,

    #[serde(rename = "total_eleitores")]
    pub registered_voters: u64,

    /// Voters in the target category
    #[serde(rename = "total_perfil")]
    pub profile_voters: u64,

    #[serde(rename = "perfil_pct")]
    pub profile_pct: f64,

    #[serde(rename = "votos_candidato")]
    pub candidate_votes: u64,

    #[serde(rename = "votos_pct")]
    pub votes_pct: f64,

    pub gap: f64,
}

/// Rank municipalities by untapped potential for one candidate.
///
/// Returns an empty list when no municipality passes both thresholds.
pub fn score_opportunities<S>(store: &S, params: &OpportunityParams) -> IntelResult<Vec<OpportunityRow>>
where
    S: DemographicSource + VoteSource + CandidateDirectory + ?Sized,
{
    let candidate = store
        .candidate(params.candidate_id)?
        .ok_or_else(|| IntelError::not_found("candidate", params.candidate_id))?;

    let category_idx = params.criterion.index_of(&params.value).ok_or_else(|| {
        IntelError::InvalidParameter(format!(
            "'{}' is not a {} category",
            params.value, params.criterion
        ))
    })?;

    let aggregates = store.vote_aggregates(candidate.election_id, candidate.id)?;
    if aggregates.is_empty() {
        return Err(IntelError::not_found("votes for candidate", candidate.id));
    }
    let votes_by_municipality: HashMap<i64, u64> = aggregates
        .iter()
        .map(|a| (a.municipality_id, a.votes))
        .collect();

    let Some(year) = store.resolve_profile_year(params.profile_year)? else {
        debug!(candidate_id = candidate.id, "no voter profile stored");
        return Ok(Vec::new());
    };
    let counts = store.all_category_counts(year, params.criterion)?;

    let mut rows = Vec::new();
    for municipality in store.municipalities()? {
        let Some(raw) = counts.get(&municipality.id) else {
            continue;
        };
        // Zero registered voters: votes_pct undefined
        if municipality.registered_voters == 0
            || municipality.registered_voters < params.min_registered_voters
        {
            continue;
        }
        let profile = match ProfileVector::build(municipality.id, params.criterion, raw) {
            Ok(p) => p,
            Err(IntelError::InvalidProfileData { .. }) => continue,
            Err(e) => return Err(e),
        };

        let profile_voters = profile.counts[category_idx];
        let profile_pct = profile_voters as f64 * 100.0 / profile.total as f64;
        let candidate_votes = votes_by_municipality
            .get(&municipality.id)
            .copied()
            .unwrap_or(0);
        let votes_pct = candidate_votes as f64 * 100.0 / municipality.registered_voters as f64;

        if profile_pct < params.min_profile_pct || votes_pct > params.max_votes_pct {
            continue;
        }

        rows.push(OpportunityRow {
            municipality_id: municipality.id,
            municipality: municipality.name,
            state: municipality.state,
            registered_voters: municipality.registered_voters,
            profile_voters,
            profile_pct,
            candidate_votes,
            votes_pct,
            gap: profile_pct - votes_pct,
        });
    }

    rows.sort_by(|a, b| {
        b.gap
            .total_cmp(&a.gap)
            .then(b.profile_pct.total_cmp(&a.profile_pct))
            .then(a.municipality_id.cmp(&b.municipality_id))
    });

    if let Some(limit) = params.limit {
        rows.truncate(limit);
    }

    debug!(
        candidate_id = candidate.id,
        year,
        criterion = %params.criterion,
        value = %params.value,
        rows = rows.len(),
        "opportunities scored"
    );

    Ok(rows)
}
