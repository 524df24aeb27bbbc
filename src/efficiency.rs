// 💰 Efficiency Ranker - Cost per vote
//
// Only candidates with votes > 0 AND declared expenditure > 0 are ranked.
// Zero-cost campaigns would otherwise top every "most efficient" list.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{IntelError, IntelResult};
use crate::store::{CandidateDirectory, VoteSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostOrder {
    /// Cheapest votes first
    #[default]
    #[serde(rename = "custo_crescente")]
    Ascending,

    /// Most expensive votes first; exact reverse of `Ascending`
    #[serde(rename = "custo_decrescente")]
    Descending,
}

impl FromStr for CostOrder {
    type Err = IntelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "custo_crescente" | "asc" => Ok(CostOrder::Ascending),
            "custo_decrescente" | "desc" => Ok(CostOrder::Descending),
            other => Err(IntelError::InvalidParameter(format!(
                "unknown sort order '{}' (expected custo_crescente or custo_decrescente)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyParams {
    #[serde(default)]
    pub election_id: Option<i64>,

    /// Case-insensitive substring of the office
    #[serde(default)]
    pub office: Option<String>,

    #[serde(default)]
    pub order: CostOrder,

    #[serde(default)]
    pub offset: usize,

    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyRow {
    #[serde(rename = "id")]
    pub candidate_id: i64,

    #[serde(rename = "eleicao_id")]
    pub election_id: i64,

    #[serde(rename = "nome_urna")]
    pub ballot_name: String,

    #[serde(rename = "sigla_partido")]
    pub party: String,

    #[serde(rename = "cargo")]
    pub office: String,

    #[serde(rename = "despesa")]
    pub expenditure: f64,

    #[serde(rename = "votos")]
    pub votes: u64,

    #[serde(rename = "custo_por_voto")]
    pub cost_per_vote: f64,
}

/// Rank candidates by cost per vote.
///
/// Ascending: cost asc, then votes desc, then candidate id asc.
/// Descending is the exact reverse, so ties flip with it.
pub fn rank_efficiency<S>(store: &S, params: &EfficiencyParams) -> IntelResult<Vec<EfficiencyRow>>
where
    S: VoteSource + CandidateDirectory + ?Sized,
{
    if let Some(election_id) = params.election_id {
        store
            .election(election_id)?
            .ok_or_else(|| IntelError::not_found("election", election_id))?;
    }

    let declared: Vec<_> = store
        .candidates(params.election_id, params.office.as_deref())?
        .into_iter()
        .filter_map(|c| c.declared_expenditure().map(|spent| (c, spent)))
        .collect();

    let ids: Vec<i64> = declared.iter().map(|(c, _)| c.id).collect();
    let totals: HashMap<i64, u64> = store
        .candidate_vote_totals(params.election_id, &ids)?
        .into_iter()
        .map(|t| (t.candidate_id, t.votes))
        .collect();

    let mut rows: Vec<EfficiencyRow> = declared
        .into_iter()
        .filter_map(|(candidate, expenditure)| {
            let votes = totals.get(&candidate.id).copied().filter(|v| *v > 0)?;
            Some(EfficiencyRow {
                candidate_id: candidate.id,
                election_id: candidate.election_id,
                ballot_name: candidate.ballot_name,
                party: candidate.party,
                office: candidate.office,
                expenditure,
                votes,
                cost_per_vote: expenditure / votes as f64,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.cost_per_vote
            .total_cmp(&b.cost_per_vote)
            .then(b.votes.cmp(&a.votes))
            .then(a.candidate_id.cmp(&b.candidate_id))
    });

    if params.order == CostOrder::Descending {
        rows.reverse();
    }

    Ok(rows
        .into_iter()
        .skip(params.offset)
        .take(params.limit.unwrap_or(usize::MAX))
        .collect())
}
