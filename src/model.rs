// 🗳️ Entity Model - Elections, municipalities, candidates, vote aggregates
//
// All persistent entities are owned by the storage collaborator.
// The engine only ever sees them read-only, one request at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::IntelError;

/// Raw per-category voter counts for one municipality and one group
pub type CategoryCounts = BTreeMap<String, u64>;

// ============================================================================
// CATEGORY GROUPS
// ============================================================================

const AGE_BRACKETS: [&str; 9] = [
    "16 A 17 ANOS",
    "18 A 20 ANOS",
    "21 A 24 ANOS",
    "25 A 34 ANOS",
    "35 A 44 ANOS",
    "45 A 59 ANOS",
    "60 A 69 ANOS",
    "70 A 79 ANOS",
    "SUPERIOR A 79 ANOS",
];

/// Alternative raw spellings → canonical category
const CATEGORY_ALIASES: [(&str, &str); 2] = [
    ("79 ANOS", "SUPERIOR A 79 ANOS"),
    ("79 ANOS OU MAIS", "SUPERIOR A 79 ANOS"),
];

const EDUCATION_LEVELS: [&str; 8] = [
    "ANALFABETO",
    "LÊ E ESCREVE",
    "ENSINO FUNDAMENTAL INCOMPLETO",
    "ENSINO FUNDAMENTAL COMPLETO",
    "ENSINO MÉDIO INCOMPLETO",
    "ENSINO MÉDIO COMPLETO",
    "SUPERIOR INCOMPLETO",
    "SUPERIOR COMPLETO",
];

const GENDERS: [&str; 3] = ["MASCULINO", "FEMININO", "NÃO INFORMADO"];

/// Demographic category group with a fixed, known category set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryGroup {
    #[serde(rename = "faixa_etaria")]
    AgeBracket,

    #[serde(rename = "escolaridade")]
    Education,

    #[serde(rename = "genero")]
    Gender,
}

impl CategoryGroup {
    /// Groups in feature-vector order
    pub const ALL: [CategoryGroup; 3] = [
        CategoryGroup::AgeBracket,
        CategoryGroup::Education,
        CategoryGroup::Gender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryGroup::AgeBracket => "faixa_etaria",
            CategoryGroup::Education => "escolaridade",
            CategoryGroup::Gender => "genero",
        }
    }

    /// Fixed category set, in vector order
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            CategoryGroup::AgeBracket => &AGE_BRACKETS,
            CategoryGroup::Education => &EDUCATION_LEVELS,
            CategoryGroup::Gender => &GENDERS,
        }
    }

    pub fn dimension(&self) -> usize {
        self.categories().len()
    }

    /// Position of a raw category value in this group's vector
    pub fn index_of(&self, raw_value: &str) -> Option<usize> {
        let normalized = normalize_category(raw_value);
        let canonical = CATEGORY_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map_or(normalized.as_str(), |(_, canonical)| *canonical);
        self.categories().iter().position(|c| *c == canonical)
    }
}

impl fmt::Display for CategoryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryGroup {
    type Err = IntelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "faixa_etaria" => Ok(CategoryGroup::AgeBracket),
            "escolaridade" => Ok(CategoryGroup::Education),
            "genero" => Ok(CategoryGroup::Gender),
            other => Err(IntelError::InvalidParameter(format!(
                "unknown criterion '{}' (expected faixa_etaria, escolaridade or genero)",
                other
            ))),
        }
    }
}

/// Trim + uppercase, the form categories are stored and compared in
pub fn normalize_category(raw_value: &str) -> String {
    raw_value.trim().to_uppercase()
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub id: i64,
    pub year: i32,
    pub round: i32,
    /// Type label, e.g. "Geral", "Municipal"
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: i64,
    /// TSE municipality code
    pub code: i64,
    pub name: String,
    /// Two-letter state code (UF)
    pub state: String,
    pub registered_voters: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub election_id: i64,
    pub legal_name: String,
    /// Name shown on the ballot; used for display and matching
    pub ballot_name: String,
    pub office: String,
    pub party: String,
    /// Declared campaign expenditure (None = undeclared)
    pub expenditure: Option<f64>,
}

impl Candidate {
    /// Declared and strictly positive expenditure
    pub fn declared_expenditure(&self) -> Option<f64> {
        self.expenditure.filter(|v| v.is_finite() && *v > 0.0)
    }
}

/// (candidate, municipality) → votes for one election/round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAggregate {
    pub municipality_id: i64,
    pub votes: u64,
}

/// Total votes of one candidate across all municipalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVotes {
    pub candidate_id: i64,
    pub votes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_dimensions() {
        assert_eq!(CategoryGroup::AgeBracket.dimension(), 9);
        assert_eq!(CategoryGroup::Education.dimension(), 8);
        assert_eq!(CategoryGroup::Gender.dimension(), 3);
    }

    #[test]
    fn test_index_of_normalizes() {
        assert_eq!(CategoryGroup::AgeBracket.index_of("  18 a 20 anos "), Some(1));
        assert_eq!(CategoryGroup::Education.index_of("Superior Completo"), Some(7));
        assert_eq!(CategoryGroup::Gender.index_of("não informado"), Some(2));
        assert_eq!(CategoryGroup::AgeBracket.index_of("INVÁLIDO"), None);
    }

    #[test]
    fn test_over_79_bracket_and_aliases() {
        let group = CategoryGroup::AgeBracket;
        assert_eq!(group.index_of("SUPERIOR A 79 ANOS"), Some(8));
        assert_eq!(group.index_of("79 anos"), Some(8));
        assert_eq!(group.index_of("79 ANOS OU MAIS"), Some(8));
        // Aliases are per group
        assert_eq!(CategoryGroup::Education.index_of("79 ANOS"), None);
    }

    #[test]
    fn test_group_from_str() {
        assert_eq!("genero".parse::<CategoryGroup>().unwrap(), CategoryGroup::Gender);
        assert_eq!(
            "Faixa_Etaria".parse::<CategoryGroup>().unwrap(),
            CategoryGroup::AgeBracket
        );
        assert!("renda".parse::<CategoryGroup>().is_err());
    }

    #[test]
    fn test_group_serde_names() {
        let json = serde_json::to_string(&CategoryGroup::Education).unwrap();
        assert_eq!(json, "\"escolaridade\"");
    }

    #[test]
    fn test_declared_expenditure() {
        let mut candidate = Candidate {
            id: 1,
            election_id: 1,
            legal_name: "MARIA DA SILVA".to_string(),
            ballot_name: "MARIA".to_string(),
            office: "PREFEITO".to_string(),
            party: "ABC".to_string(),
            expenditure: None,
        };
        assert_eq!(candidate.declared_expenditure(), None);

        candidate.expenditure = Some(0.0);
        assert_eq!(candidate.declared_expenditure(), None);

        candidate.expenditure = Some(1500.0);
        assert_eq!(candidate.declared_expenditure(), Some(1500.0));
    }
}
