// 📊 Demographic Profile Builder
//
// Turns raw voter-registration counts into fraction vectors over the fixed
// category set of each group. Absent categories are zero, never omitted, so
// any two vectors of the same group are always comparable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{IntelError, IntelResult};
use crate::model::{CategoryCounts, CategoryGroup};

// ============================================================================
// PROFILE VECTOR (one group)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileVector {
    pub group: CategoryGroup,

    /// Sum of the counts over the fixed category set
    pub total: u64,

    /// Counts in `group.categories()` order
    pub counts: Vec<u64>,

    /// Fractions in `group.categories()` order; sum to 1
    pub fractions: Vec<f64>,
}

impl ProfileVector {
    /// Build the fraction vector for one municipality and group.
    ///
    /// Fails with `InvalidProfileData` when the group total is zero.
    pub fn build(
        municipality_id: i64,
        group: CategoryGroup,
        raw_counts: &CategoryCounts,
    ) -> IntelResult<Self> {
        let mut counts = vec![0u64; group.dimension()];

        for (value, count) in raw_counts {
            match group.index_of(value) {
                Some(idx) => counts[idx] += count,
                None => debug!(
                    municipality_id,
                    %group,
                    category = %value,
                    "dropping category outside the fixed set"
                ),
            }
        }

        let total: u64 = counts.iter().sum();
        if total == 0 {
            return Err(IntelError::InvalidProfileData {
                municipality_id,
                group,
            });
        }

        let fractions = counts
            .iter()
            .map(|&c| c as f64 / total as f64)
            .collect();

        Ok(ProfileVector {
            group,
            total,
            counts,
            fractions,
        })
    }

    pub fn fraction(&self, idx: usize) -> f64 {
        self.fractions.get(idx).copied().unwrap_or(0.0)
    }

    /// Share of the group total in `raw_value`, as a percentage
    pub fn percentage_of(&self, raw_value: &str) -> Option<f64> {
        let idx = self.group.index_of(raw_value)?;
        Some(self.counts[idx] as f64 * 100.0 / self.total as f64)
    }

    /// Sum of the fractions of several categories
    fn fraction_sum(&self, values: &[&str]) -> f64 {
        values
            .iter()
            .filter_map(|v| self.group.index_of(v))
            .map(|idx| self.fraction(idx))
            .sum()
    }
}

// ============================================================================
// DEMOGRAPHIC PROFILE (all groups of one municipality)
// ============================================================================

/// Auxiliary scalars for display; not part of any distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileHighlights {
    #[serde(rename = "pct_superior")]
    pub higher_education: f64,

    #[serde(rename = "pct_jovem")]
    pub youth: f64,

    #[serde(rename = "pct_idoso")]
    pub elderly: f64,

    #[serde(rename = "pct_masc")]
    pub male: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemographicProfile {
    pub municipality_id: i64,
    pub age: ProfileVector,
    pub education: ProfileVector,
    pub gender: ProfileVector,
}

impl DemographicProfile {
    /// Build a complete profile; every group must have a non-zero total
    pub fn from_counts(
        municipality_id: i64,
        counts: &BTreeMap<CategoryGroup, CategoryCounts>,
    ) -> IntelResult<Self> {
        let empty = CategoryCounts::new();
        let build = |group: CategoryGroup| {
            ProfileVector::build(municipality_id, group, counts.get(&group).unwrap_or(&empty))
        };

        Ok(DemographicProfile {
            municipality_id,
            age: build(CategoryGroup::AgeBracket)?,
            education: build(CategoryGroup::Education)?,
            gender: build(CategoryGroup::Gender)?,
        })
    }

    pub fn group(&self, group: CategoryGroup) -> &ProfileVector {
        match group {
            CategoryGroup::AgeBracket => &self.age,
            CategoryGroup::Education => &self.education,
            CategoryGroup::Gender => &self.gender,
        }
    }

    /// Concatenated fractions: age ‖ education ‖ gender
    pub fn feature_vector(&self) -> Vec<f64> {
        CategoryGroup::ALL
            .iter()
            .flat_map(|g| self.group(*g).fractions.iter().copied())
            .collect()
    }

    pub fn distance_to(&self, other: &DemographicProfile) -> f64 {
        euclidean_distance(&self.feature_vector(), &other.feature_vector())
    }

    pub fn highlights(&self) -> ProfileHighlights {
        ProfileHighlights {
            higher_education: self
                .education
                .fraction_sum(&["SUPERIOR INCOMPLETO", "SUPERIOR COMPLETO"]),
            youth: self
                .age
                .fraction_sum(&["16 A 17 ANOS", "18 A 20 ANOS", "21 A 24 ANOS"]),
            elderly: self
                .age
                .fraction_sum(&["60 A 69 ANOS", "70 A 79 ANOS", "SUPERIOR A 79 ANOS"]),
            male: self.gender.fraction_sum(&["MASCULINO"]),
        }
    }
}

/// Euclidean distance; vectors of one feature layout always share a length
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

// ============================================================================
// TESTS
// ============================================================================
