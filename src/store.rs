// 🗄️ Storage Collaborator Interfaces
//
// The engine reads through these three traits only. SQLite implements them in
// `db.rs`; `MemoryStore` implements them for fixtures and embedding.

use std::collections::{BTreeMap, HashMap};

use crate::error::{IntelError, IntelResult};
use crate::model::{
    normalize_category, Candidate, CandidateVotes, CategoryCounts, CategoryGroup, Election,
    Municipality, VoteAggregate,
};
use crate::profile::ProfileVector;

// ============================================================================
// TRAITS
// ============================================================================

pub trait DemographicSource {
    fn municipality(&self, municipality_id: i64) -> IntelResult<Option<Municipality>>;

    fn municipalities(&self) -> IntelResult<Vec<Municipality>>;

    /// Election years with stored profile rows, ascending
    fn profile_years(&self) -> IntelResult<Vec<i32>>;

    /// Raw counts for one year, municipality and group (None = no rows)
    fn category_counts(
        &self,
        year: i32,
        municipality_id: i64,
        group: CategoryGroup,
    ) -> IntelResult<Option<CategoryCounts>>;

    /// Raw counts for every municipality that has rows for the year and group
    fn all_category_counts(
        &self,
        year: i32,
        group: CategoryGroup,
    ) -> IntelResult<BTreeMap<i64, CategoryCounts>>;

    /// Fraction vector of one municipality and group
    fn demographic_profile(
        &self,
        year: i32,
        municipality_id: i64,
        group: CategoryGroup,
    ) -> IntelResult<ProfileVector> {
        let counts = self
            .category_counts(year, municipality_id, group)?
            .ok_or_else(|| IntelError::not_found("demographic profile", municipality_id))?;
        ProfileVector::build(municipality_id, group, &counts)
    }

    /// Profile year to analyse: the requested one, or the latest stored.
    ///
    /// `Ok(None)` means nothing was requested and no profile is stored.
    /// A requested year without rows is `NotFound`.
    fn resolve_profile_year(&self, requested: Option<i32>) -> IntelResult<Option<i32>> {
        let years = self.profile_years()?;
        match requested {
            Some(year) if years.contains(&year) => Ok(Some(year)),
            Some(year) => Err(IntelError::not_found("profile year", i64::from(year))),
            None => Ok(years.last().copied()),
        }
    }
}

pub trait VoteSource {
    /// Per-municipality votes of one candidate in one election, grouped by municipality
    fn vote_aggregates(&self, election_id: i64, candidate_id: i64) -> IntelResult<Vec<VoteAggregate>>;

    /// Total votes per candidate, optionally restricted to one election
    fn candidate_vote_totals(
        &self,
        election_id: Option<i64>,
        candidate_ids: &[i64],
    ) -> IntelResult<Vec<CandidateVotes>>;
}

pub trait CandidateDirectory {
    fn candidate(&self, candidate_id: i64) -> IntelResult<Option<Candidate>>;

    /// Candidates filtered by election and office (case-insensitive substring)
    fn candidates(&self, election_id: Option<i64>, office: Option<&str>) -> IntelResult<Vec<Candidate>>;

    fn election(&self, election_id: i64) -> IntelResult<Option<Election>>;
}

/// Everything the engine reads
pub trait ElectoralStore: DemographicSource + VoteSource + CandidateDirectory {}

impl<T: DemographicSource + VoteSource + CandidateDirectory> ElectoralStore for T {}

/// Case-insensitive substring match used for office filters
pub fn office_matches(office: &str, filter: &str) -> bool {
    office.to_lowercase().contains(&filter.trim().to_lowercase())
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    elections: HashMap<i64, Election>,
    municipalities: HashMap<i64, Municipality>,
    /// (year, municipality, group) → counts
    profiles: BTreeMap<(i32, i64, CategoryGroup), CategoryCounts>,
    candidates: HashMap<i64, Candidate>,
    /// (election, candidate, municipality) → votes
    votes: BTreeMap<(i64, i64, i64), u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_election(&mut self, election: Election) {
        self.elections.insert(election.id, election);
    }

    pub fn add_municipality(&mut self, municipality: Municipality) {
        self.municipalities.insert(municipality.id, municipality);
    }

    /// Add (or accumulate) a profile count
    pub fn add_profile_count(
        &mut self,
        year: i32,
        municipality_id: i64,
        group: CategoryGroup,
        category: &str,
        count: u64,
    ) {
        *self
            .profiles
            .entry((year, municipality_id, group))
            .or_default()
            .entry(normalize_category(category))
            .or_insert(0) += count;
    }

    pub fn add_candidate(&mut self, candidate: Candidate) {
        self.candidates.insert(candidate.id, candidate);
    }

    /// Add (or accumulate) votes for one municipality
    pub fn add_votes(&mut self, election_id: i64, candidate_id: i64, municipality_id: i64, votes: u64) {
        *self
            .votes
            .entry((election_id, candidate_id, municipality_id))
            .or_insert(0) += votes;
    }
}

impl DemographicSource for MemoryStore {
    fn municipality(&self, municipality_id: i64) -> IntelResult<Option<Municipality>> {
        Ok(self.municipalities.get(&municipality_id).cloned())
    }

    fn municipalities(&self) -> IntelResult<Vec<Municipality>> {
        let mut all: Vec<Municipality> = self.municipalities.values().cloned().collect();
        all.sort_by_key(|m| m.id);
        Ok(all)
    }

    fn profile_years(&self) -> IntelResult<Vec<i32>> {
        let mut years: Vec<i32> = self.profiles.keys().map(|(year, _, _)| *year).collect();
        years.dedup();
        Ok(years)
    }

    fn category_counts(
        &self,
        year: i32,
        municipality_id: i64,
        group: CategoryGroup,
    ) -> IntelResult<Option<CategoryCounts>> {
        Ok(self.profiles.get(&(year, municipality_id, group)).cloned())
    }

    fn all_category_counts(
        &self,
        year: i32,
        group: CategoryGroup,
    ) -> IntelResult<BTreeMap<i64, CategoryCounts>> {
        Ok(self
            .profiles
            .iter()
            .filter(|((y, _, g), _)| *y == year && *g == group)
            .map(|((_, id, _), counts)| (*id, counts.clone()))
            .collect())
    }
}

impl VoteSource for MemoryStore {
    fn vote_aggregates(&self, election_id: i64, candidate_id: i64) -> IntelResult<Vec<VoteAggregate>> {
        Ok(self
            .votes
            .range((election_id, candidate_id, i64::MIN)..=(election_id, candidate_id, i64::MAX))
            .map(|(&(_, _, municipality_id), &votes)| VoteAggregate {
                municipality_id,
                votes,
            })
            .collect())
    }

    fn candidate_vote_totals(
        &self,
        election_id: Option<i64>,
        candidate_ids: &[i64],
    ) -> IntelResult<Vec<CandidateVotes>> {
        let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
        for (&(e, c, _), &votes) in &self.votes {
            if election_id.map_or(true, |id| id == e) && candidate_ids.contains(&c) {
                *totals.entry(c).or_insert(0) += votes;
            }
        }

        Ok(totals
            .into_iter()
            .map(|(candidate_id, votes)| CandidateVotes {
                candidate_id,
                votes,
            })
            .collect())
    }
}

impl CandidateDirectory for MemoryStore {
    fn candidate(&self, candidate_id: i64) -> IntelResult<Option<Candidate>> {
        Ok(self.candidates.get(&candidate_id).cloned())
    }

    fn candidates(&self, election_id: Option<i64>, office: Option<&str>) -> IntelResult<Vec<Candidate>> {
        let mut found: Vec<Candidate> = self
            .candidates
            .values()
            .filter(|c| election_id.map_or(true, |id| c.election_id == id))
            .filter(|c| office.map_or(true, |f| office_matches(&c.office, f)))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    fn election(&self, election_id: i64) -> IntelResult<Option<Election>> {
        Ok(self.elections.get(&election_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_aggregates_group_by_municipality() {
        let mut store = MemoryStore::new();
        store.add_votes(1, 10, 100, 5);
        store.add_votes(1, 10, 100, 7);
        store.add_votes(1, 10, 200, 3);
        store.add_votes(1, 11, 100, 99);
        store.add_votes(2, 10, 100, 50);

        let rows = store.vote_aggregates(1, 10).unwrap();
        assert_eq!(
            rows,
            vec![
                VoteAggregate { municipality_id: 100, votes: 12 },
                VoteAggregate { municipality_id: 200, votes: 3 },
            ]
        );

        let totals = store.candidate_vote_totals(None, &[10]).unwrap();
        assert_eq!(totals, vec![CandidateVotes { candidate_id: 10, votes: 65 }]);
    }

    #[test]
    fn test_demographic_profile_not_found() {
        let store = MemoryStore::new();
        let err = store
            .demographic_profile(2022, 5, CategoryGroup::Gender)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_profile_counts_are_normalized() {
        let mut store = MemoryStore::new();
        store.add_profile_count(2022, 1, CategoryGroup::Gender, "masculino", 10);
        store.add_profile_count(2022, 1, CategoryGroup::Gender, "MASCULINO ", 5);

        let counts = store.category_counts(2022, 1, CategoryGroup::Gender).unwrap().unwrap();
        assert_eq!(counts.get("MASCULINO"), Some(&15));
    }

    #[test]
    fn test_profile_years_are_kept_apart() {
        let mut store = MemoryStore::new();
        store.add_profile_count(2018, 1, CategoryGroup::Gender, "FEMININO", 100);
        store.add_profile_count(2022, 1, CategoryGroup::Gender, "FEMININO", 120);
        store.add_profile_count(2022, 2, CategoryGroup::Gender, "FEMININO", 7);

        assert_eq!(store.profile_years().unwrap(), vec![2018, 2022]);
        let old = store.category_counts(2018, 1, CategoryGroup::Gender).unwrap().unwrap();
        assert_eq!(old.get("FEMININO"), Some(&100));
        assert_eq!(store.all_category_counts(2018, CategoryGroup::Gender).unwrap().len(), 1);
        assert_eq!(store.all_category_counts(2022, CategoryGroup::Gender).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_profile_year() {
        let mut store = MemoryStore::new();
        assert_eq!(store.resolve_profile_year(None).unwrap(), None);

        store.add_profile_count(2018, 1, CategoryGroup::Gender, "FEMININO", 1);
        store.add_profile_count(2022, 1, CategoryGroup::Gender, "FEMININO", 1);
        assert_eq!(store.resolve_profile_year(None).unwrap(), Some(2022));
        assert_eq!(store.resolve_profile_year(Some(2018)).unwrap(), Some(2018));

        let err = store.resolve_profile_year(Some(2020)).unwrap_err();
        assert!(matches!(err, IntelError::NotFound { entity: "profile year", id: 2020 }));
    }

    #[test]
    fn test_office_filter() {
        assert!(office_matches("Deputado Federal", "deputado"));
        assert!(office_matches("PREFEITO", " prefeito "));
        assert!(!office_matches("VEREADOR", "prefeito"));
    }
}
