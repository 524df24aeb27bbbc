// 🧠 Electoral Intelligence Engine - The five analyses behind one facade
//
// Stateless between requests: every call reads what it needs from the store,
// computes in memory and returns. The optional cache is consulted first and
// filled after a successful run; errors are never cached.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::efficiency::{rank_efficiency, EfficiencyParams, EfficiencyRow};
use crate::error::{IntelError, IntelResult};
use crate::migration::{compare_migration, MigrationParams, MigrationResult};
use crate::opportunity::{score_opportunities, OpportunityParams, OpportunityRow};
use crate::projection::{project_goal, ProjectionParams, ProjectionResult};
use crate::similarity::{find_similar, SimilarityParams, SimilarityResult};
use crate::store::ElectoralStore;

pub struct IntelligenceEngine<'a, S: ?Sized> {
    store: &'a S,
    config: EngineConfig,
    cache: Option<&'a ResultCache>,
}

impl<'a, S: ElectoralStore + ?Sized> IntelligenceEngine<'a, S> {
    pub fn new(store: &'a S, config: EngineConfig) -> Self {
        IntelligenceEngine {
            store,
            config,
            cache: None,
        }
    }

    /// Attach a result cache (ignored when `config.cache_enabled` is false)
    pub fn with_cache(mut self, cache: &'a ResultCache) -> Self {
        if self.config.cache_enabled {
            self.cache = Some(cache);
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Twin cities: municipalities closest to the target's demographic profile
    pub fn similar_municipalities(&self, params: &SimilarityParams) -> IntelResult<SimilarityResult> {
        let top_k = params.top_k.unwrap_or(self.config.similarity_top_k);
        if top_k == 0 {
            return Err(IntelError::InvalidParameter("top_k must be at least 1".to_string()));
        }
        let resolved = SimilarityParams {
            municipality_id: params.municipality_id,
            top_k: Some(top_k),
            profile_year: params.profile_year,
        };

        self.cached("similares", &resolved, || {
            find_similar(self.store, resolved.municipality_id, top_k, resolved.profile_year)
        })
    }

    /// Municipalities where a demographic segment is large and the candidate weak
    pub fn opportunities(&self, params: &OpportunityParams) -> IntelResult<Vec<OpportunityRow>> {
        if !params.min_profile_pct.is_finite() || !params.max_votes_pct.is_finite() {
            return Err(IntelError::InvalidParameter(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        self.cached("oportunidades", params, || score_opportunities(self.store, params))
    }

    /// Candidates ranked by declared expenditure per vote
    pub fn efficiency_ranking(&self, params: &EfficiencyParams) -> IntelResult<Vec<EfficiencyRow>> {
        self.cached("eficiencia", params, || rank_efficiency(self.store, params))
    }

    /// Proportional per-municipality targets for a global vote goal
    pub fn goal_projection(&self, params: &ProjectionParams) -> IntelResult<ProjectionResult> {
        self.cached("projecao", params, || project_goal(self.store, params))
    }

    /// Per-municipality vote deltas between two selections
    pub fn vote_migration(&self, params: &MigrationParams) -> IntelResult<MigrationResult> {
        self.cached("migracao", params, || compare_migration(self.store, params))
    }

    fn cached<P, R, F>(&self, analysis: &str, params: &P, compute: F) -> IntelResult<R>
    where
        P: Serialize,
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> IntelResult<R>,
    {
        let Some(cache) = self.cache else {
            return compute();
        };

        let key = ResultCache::key(analysis, params);
        if let Some(value) = cache.get(&key) {
            match serde_json::from_value(value) {
                Ok(result) => {
                    debug!(analysis, "served from cache");
                    return Ok(result);
                }
                Err(e) => warn!(analysis, error = %e, "discarding unreadable cache entry"),
            }
        }

        let result = compute()?;
        match serde_json::to_value(&result) {
            Ok(value) => cache.insert(key, value),
            Err(e) => warn!(analysis, error = %e, "result not cacheable"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficiency::CostOrder;
    use crate::migration::Selection;
    use crate::model::{Candidate, CategoryGroup, Election, Municipality};
    use crate::store::MemoryStore;

    fn sample_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (id, year) in [(1, 2018), (2, 2022)] {
            store.add_election(Election {
                id,
                year,
                round: 1,
                kind: "Geral".to_string(),
            });
        }
        for (id, election_id, spent) in [(10, 1, Some(3_000.0)), (20, 2, Some(1_000.0))] {
            store.add_candidate(Candidate {
                id,
                election_id,
                legal_name: format!("CANDIDATO {}", id),
                ballot_name: format!("C{}", id),
                office: "PREFEITO".to_string(),
                party: "XYZ".to_string(),
                expenditure: spent,
            });
        }
        for id in 1..=3 {
            store.add_municipality(Municipality {
                id,
                code: 4200 + id,
                name: format!("MUNICIPIO {}", id),
                state: "SC".to_string(),
                registered_voters: 1_000,
            });
            let young = 100 * id as u64;
            store.add_profile_count(2022, id, CategoryGroup::AgeBracket, "21 A 24 ANOS", young);
            store.add_profile_count(2022, id, CategoryGroup::AgeBracket, "45 A 59 ANOS", 1_000 - young);
            store.add_profile_count(2022, id, CategoryGroup::Education, "SUPERIOR COMPLETO", young);
            store.add_profile_count(2022, id, CategoryGroup::Education, "ENSINO MÉDIO COMPLETO", 1_000 - young);
            store.add_profile_count(2022, id, CategoryGroup::Gender, "FEMININO", 500);
            store.add_profile_count(2022, id, CategoryGroup::Gender, "MASCULINO", 500);

            store.add_votes(1, 10, id, 10 * id as u64);
            store.add_votes(2, 20, id, 15 * id as u64);
        }
        store
    }

    #[test]
    fn test_all_five_operations() {
        let store = sample_store();
        let engine = IntelligenceEngine::new(&store, EngineConfig::default());

        let similar = engine
            .similar_municipalities(&SimilarityParams {
                municipality_id: 1,
                top_k: None,
                profile_year: None,
            })
            .unwrap();
        assert_eq!(similar.similar[0].municipality.municipality_id, 2);

        let opportunities = engine
            .opportunities(&OpportunityParams {
                candidate_id: 10,
                criterion: CategoryGroup::AgeBracket,
                value: "21 A 24 ANOS".to_string(),
                min_profile_pct: 15.0,
                max_votes_pct: 10.0,
                min_registered_voters: 0,
                limit: None,
                profile_year: Some(2022),
            })
            .unwrap();
        assert_eq!(opportunities.len(), 2);

        let efficiency = engine
            .efficiency_ranking(&EfficiencyParams {
                order: CostOrder::Ascending,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(efficiency[0].candidate_id, 20);

        let projection = engine
            .goal_projection(&ProjectionParams {
                candidate_id: 10,
                election_id: 1,
                target: 120,
            })
            .unwrap();
        assert_eq!(projection.growth_factor, 2.0);

        let migration = engine
            .vote_migration(&MigrationParams {
                base: Selection {
                    election_id: 1,
                    candidate_id: 10,
                },
                comparison: Selection {
                    election_id: 2,
                    candidate_id: 20,
                },
            })
            .unwrap();
        assert_eq!(migration.total_a, 60);
        assert_eq!(migration.total_b, 90);
        assert_eq!(migration.total_percent_change, Some(50.0));
    }

    #[test]
    fn test_cached_result_is_identical() {
        let store = sample_store();
        let cache = ResultCache::new(300);
        let engine = IntelligenceEngine::new(&store, EngineConfig::default()).with_cache(&cache);

        let params = SimilarityParams {
            municipality_id: 2,
            top_k: Some(5),
            profile_year: None,
        };
        let fresh = engine.similar_municipalities(&params).unwrap();
        assert_eq!(cache.stats().size, 1);

        let cached = engine.similar_municipalities(&params).unwrap();
        assert_eq!(fresh, cached);

        let uncached = IntelligenceEngine::new(&store, EngineConfig::default())
            .similar_municipalities(&params)
            .unwrap();
        assert_eq!(fresh, uncached);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let store = sample_store();
        let cache = ResultCache::new(300);
        let engine = IntelligenceEngine::new(&store, EngineConfig::default()).with_cache(&cache);

        let err = engine
            .goal_projection(&ProjectionParams {
                candidate_id: 10,
                election_id: 2,
                target: 100,
            })
            .unwrap_err();
        assert!(matches!(err, IntelError::InvalidTarget(_)));
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_cache_disabled_by_config() {
        let store = sample_store();
        let cache = ResultCache::new(300);
        let config = EngineConfig {
            cache_enabled: false,
            ..Default::default()
        };
        let engine = IntelligenceEngine::new(&store, config).with_cache(&cache);

        engine
            .efficiency_ranking(&EfficiencyParams::default())
            .unwrap();
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let store = sample_store();
        let engine = IntelligenceEngine::new(&store, EngineConfig::default());
        let err = engine
            .similar_municipalities(&SimilarityParams {
                municipality_id: 1,
                top_k: Some(0),
                profile_year: None,
            })
            .unwrap_err();
        assert!(matches!(err, IntelError::InvalidParameter(_)));
    }
}
