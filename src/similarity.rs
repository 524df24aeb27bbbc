// 🏙️ Similarity Engine - "Twin cities"
//
// Ranks every other municipality by Euclidean distance between concatenated
// demographic fraction vectors (age ‖ education ‖ gender).
// Ordering: distance ascending, then municipality id ascending.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{IntelError, IntelResult};
use crate::model::{CategoryCounts, CategoryGroup};
use crate::profile::{DemographicProfile, ProfileHighlights};
use crate::store::DemographicSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityParams {
    pub municipality_id: i64,

    /// Result cap; engine default applies when absent
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Election year of the profiles compared; latest stored when absent
    #[serde(default)]
    pub profile_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityProfileSummary {
    #[serde(rename = "id")]
    pub municipality_id: i64,

    #[serde(rename = "nome")]
    pub name: String,

    #[serde(rename = "sigla_uf")]
    pub state: String,

    #[serde(flatten)]
    pub highlights: ProfileHighlights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMunicipality {
    #[serde(flatten)]
    pub municipality: MunicipalityProfileSummary,

    #[serde(rename = "distancia")]
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    #[serde(rename = "alvo")]
    pub target: MunicipalityProfileSummary,

    #[serde(rename = "similares")]
    pub similar: Vec<SimilarMunicipality>,
}

/// Display-only similarity score: `max(0, 100 − distance × 100)`.
///
/// A monotonic transform of the distance for UI badges. It is not a
/// calibrated probability and plays no part in the ranking.
pub fn similarity_percentage(distance: f64) -> f64 {
    (100.0 - distance * 100.0).max(0.0)
}

/// Build every complete profile available in the store
fn load_profiles<S: DemographicSource + ?Sized>(
    store: &S,
    year: i32,
) -> IntelResult<BTreeMap<i64, DemographicProfile>> {
    let mut by_group: BTreeMap<CategoryGroup, BTreeMap<i64, CategoryCounts>> = BTreeMap::new();
    let mut ids = BTreeSet::new();

    for group in CategoryGroup::ALL {
        let counts = store.all_category_counts(year, group)?;
        ids.extend(counts.keys().copied());
        by_group.insert(group, counts);
    }

    let mut profiles = BTreeMap::new();
    for id in ids {
        let counts: BTreeMap<CategoryGroup, CategoryCounts> = by_group
            .iter()
            .filter_map(|(group, rows)| rows.get(&id).map(|c| (*group, c.clone())))
            .collect();

        match DemographicProfile::from_counts(id, &counts) {
            Ok(profile) => {
                profiles.insert(id, profile);
            }
            Err(IntelError::InvalidProfileData { group, .. }) => {
                debug!(municipality_id = id, year, %group, "excluded from similarity: empty group");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(profiles)
}

/// Rank municipalities by demographic distance to `target_id`.
///
/// Profiles of `profile_year` are compared, or of the latest stored year.
/// Fails with `NotFound` when the target does not exist or lacks a complete
/// profile for that year. An empty ranking is a valid outcome.
pub fn find_similar<S: DemographicSource + ?Sized>(
    store: &S,
    target_id: i64,
    top_k: usize,
    profile_year: Option<i32>,
) -> IntelResult<SimilarityResult> {
    let target_municipality = store
        .municipality(target_id)?
        .ok_or_else(|| IntelError::not_found("municipality", target_id))?;

    let year = store
        .resolve_profile_year(profile_year)?
        .ok_or_else(|| IntelError::not_found("demographic profile", target_id))?;
    let profiles = load_profiles(store, year)?;
    let target_profile = profiles
        .get(&target_id)
        .ok_or_else(|| IntelError::not_found("demographic profile", target_id))?;

    let mut ranked: Vec<(i64, f64)> = profiles
        .iter()
        .filter(|(id, _)| **id != target_id)
        .map(|(id, profile)| (*id, target_profile.distance_to(profile)))
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut similar = Vec::with_capacity(top_k.min(ranked.len()));
    for (id, distance) in ranked {
        if similar.len() >= top_k {
            break;
        }
        // Profile rows without a municipality record cannot be displayed
        let Some(municipality) = store.municipality(id)? else {
            debug!(municipality_id = id, "profile without municipality record");
            continue;
        };
        similar.push(SimilarMunicipality {
            municipality: MunicipalityProfileSummary {
                municipality_id: id,
                name: municipality.name,
                state: municipality.state,
                highlights: profiles[&id].highlights(),
            },
            distance,
        });
    }

    Ok(SimilarityResult {
        target: MunicipalityProfileSummary {
            municipality_id: target_id,
            name: target_municipality.name,
            state: target_municipality.state,
            highlights: target_profile.highlights(),
        },
        similar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Municipality;
    use crate::store::MemoryStore;

    fn add_municipality(store: &mut MemoryStore, id: i64, young: u64, old: u64, superior: u64, male: u64) {
        let total = young + old;
        store.add_municipality(Municipality {
            id,
            code: 1000 + id,
            name: format!("CIDADE {}", id),
            state: "SC".to_string(),
            registered_voters: total,
        });
        store.add_profile_count(2022, id, CategoryGroup::AgeBracket, "18 A 20 ANOS", young);
        store.add_profile_count(2022, id, CategoryGroup::AgeBracket, "60 A 69 ANOS", old);
        store.add_profile_count(2022, id, CategoryGroup::Education, "SUPERIOR COMPLETO", superior);
        store.add_profile_count(2022, id, CategoryGroup::Education, "ANALFABETO", total - superior);
        store.add_profile_count(2022, id, CategoryGroup::Gender, "MASCULINO", male);
        store.add_profile_count(2022, id, CategoryGroup::Gender, "FEMININO", total - male);
    }

    fn sample_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        // totals of 64 keep every fraction exact in binary
        add_municipality(&mut store, 1, 32, 32, 16, 32);
        add_municipality(&mut store, 2, 36, 28, 16, 32); // closest to 1
        add_municipality(&mut store, 3, 60, 4, 50, 20); // far from 1
        add_municipality(&mut store, 4, 28, 36, 16, 32); // tied with 2
        add_municipality(&mut store, 5, 32, 32, 20, 28);
        store
    }

    #[test]
    fn test_ranking_order_and_ties() {
        let store = sample_store();
        let result = find_similar(&store, 1, 10, None).unwrap();

        let ids: Vec<i64> = result.similar.iter().map(|s| s.municipality.municipality_id).collect();
        // 2 and 4 are equidistant from 1; id breaks the tie
        assert_eq!(ids, vec![2, 4, 5, 3]);
        assert_eq!(result.target.municipality_id, 1);
    }

    #[test]
    fn test_target_never_in_own_result() {
        let store = sample_store();
        for target in 1..=5 {
            let result = find_similar(&store, target, 10, None).unwrap();
            assert!(result
                .similar
                .iter()
                .all(|s| s.municipality.municipality_id != target));
        }
    }

    #[test]
    fn test_sorted_non_decreasing() {
        let store = sample_store();
        let result = find_similar(&store, 3, 10, None).unwrap();
        assert!(result.similar.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_top_k_cap() {
        let store = sample_store();
        let result = find_similar(&store, 1, 2, None).unwrap();
        assert_eq!(result.similar.len(), 2);
    }

    #[test]
    fn test_identical_profile_has_zero_distance() {
        let mut store = sample_store();
        add_municipality(&mut store, 6, 32, 32, 16, 32);
        let result = find_similar(&store, 1, 1, None).unwrap();
        assert_eq!(result.similar[0].municipality.municipality_id, 6);
        assert_eq!(result.similar[0].distance, 0.0);
    }

    #[test]
    fn test_unknown_target_is_not_found() {
        let store = sample_store();
        assert!(find_similar(&store, 99, 10, None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_target_without_profile_is_not_found() {
        let mut store = sample_store();
        store.add_municipality(Municipality {
            id: 7,
            code: 1007,
            name: "SEM PERFIL".to_string(),
            state: "SC".to_string(),
            registered_voters: 0,
        });
        let err = find_similar(&store, 7, 10, None).unwrap_err();
        assert!(matches!(err, IntelError::NotFound { entity: "demographic profile", id: 7 }));
    }

    #[test]
    fn test_incomplete_profiles_are_excluded() {
        let mut store = sample_store();
        store.add_municipality(Municipality {
            id: 8,
            code: 1008,
            name: "SO GENERO".to_string(),
            state: "SC".to_string(),
            registered_voters: 10,
        });
        store.add_profile_count(2022, 8, CategoryGroup::Gender, "FEMININO", 10);

        let result = find_similar(&store, 1, 10, None).unwrap();
        assert!(result.similar.iter().all(|s| s.municipality.municipality_id != 8));
    }

    #[test]
    fn test_single_municipality_yields_empty_result() {
        let mut store = MemoryStore::new();
        add_municipality(&mut store, 1, 32, 32, 16, 32);
        let result = find_similar(&store, 1, 10, None).unwrap();
        assert!(result.similar.is_empty());
    }

    #[test]
    fn test_profile_year_selects_census() {
        let mut store = sample_store();
        // 2018: municipality 3 mirrors municipality 1 exactly
        for id in [1, 3] {
            store.add_profile_count(2018, id, CategoryGroup::AgeBracket, "18 A 20 ANOS", 32);
            store.add_profile_count(2018, id, CategoryGroup::AgeBracket, "60 A 69 ANOS", 32);
            store.add_profile_count(2018, id, CategoryGroup::Education, "ANALFABETO", 64);
            store.add_profile_count(2018, id, CategoryGroup::Gender, "FEMININO", 64);
        }

        let latest = find_similar(&store, 1, 10, None).unwrap();
        assert_eq!(latest.similar.len(), 4);
        assert_eq!(latest.similar[0].municipality.municipality_id, 2);

        let old = find_similar(&store, 1, 10, Some(2018)).unwrap();
        assert_eq!(old.similar.len(), 1);
        assert_eq!(old.similar[0].municipality.municipality_id, 3);
        assert_eq!(old.similar[0].distance, 0.0);

        let err = find_similar(&store, 1, 10, Some(2010)).unwrap_err();
        assert!(matches!(err, IntelError::NotFound { entity: "profile year", .. }));
    }

    #[test]
    fn test_similarity_percentage() {
        assert_eq!(similarity_percentage(0.0), 100.0);
        assert!((similarity_percentage(0.125) - 87.5).abs() < 1e-9);
        assert_eq!(similarity_percentage(1.7), 0.0);
        assert!(similarity_percentage(0.1) > similarity_percentage(0.2));
    }
}
