// 📥 CSV Ingestion - Normalized tables + TSE voter-profile files
//
// All inputs are `;`-separated with a header row. Malformed rows are skipped
// with a warning; everything else goes through the `db` write functions, so a
// repeated import leaves the database unchanged. Files are streamed: only
// per-municipality aggregates and one vote batch are held in memory.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::db::{
    ensure_municipality, insert_candidate, insert_election, insert_municipality, insert_votes,
    refresh_registered_voters, replace_profile_counts, VoteRecord,
};
use crate::model::{normalize_category, Candidate, CategoryCounts, CategoryGroup, Election, Municipality};

// ============================================================================
// CSV RECORDS
// ============================================================================

#[derive(Debug, Deserialize)]
struct ElectionRecord {
    id: i64,
    ano: i32,
    turno: i32,
    tipo: String,
}

#[derive(Debug, Deserialize)]
struct MunicipalityRecord {
    id: i64,
    codigo_tse: i64,
    nome: String,
    sigla_uf: String,
    #[serde(default)]
    total_eleitores: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CandidateRecord {
    id: i64,
    eleicao_id: i64,
    nome_completo: String,
    nome_urna: String,
    cargo: String,
    sigla_partido: String,
    /// Empty = undeclared; accepts "1234.56" and "1234,56"
    #[serde(default)]
    despesa: Option<String>,
}

/// Vote rows per transaction while importing
const VOTE_BATCH_SIZE: usize = 10_000;

/// Subset of the TSE `perfil_eleitor_secao` layout; other columns are ignored
#[derive(Debug, Deserialize)]
struct VoterProfileRecord {
    #[serde(rename = "ANO_ELEICAO")]
    year: i32,

    #[serde(rename = "CD_MUNICIPIO")]
    municipality_code: i64,

    #[serde(rename = "NM_MUNICIPIO")]
    municipality_name: String,

    #[serde(rename = "SG_UF")]
    state: String,

    #[serde(rename = "DS_GENERO")]
    gender: String,

    #[serde(rename = "DS_FAIXA_ETARIA")]
    age_bracket: String,

    #[serde(rename = "DS_GRAU_ESCOLARIDADE")]
    education: String,

    #[serde(rename = "QT_ELEITORES_PERFIL")]
    voters: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    /// Rows read successfully from the file
    pub read: usize,

    /// Rows skipped because they could not be parsed
    pub skipped: usize,

    /// Rows written (new or replaced); for votes, new rows only
    pub stored: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileImportSummary {
    pub rows: ImportSummary,

    /// Election years found in the file
    pub years: Vec<i32>,

    pub municipalities: usize,

    /// Sum of the touched municipalities' totals after import
    pub registered_voters: u64,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Stream every well-formed record of `path` into `handle`.
/// Returns (read, skipped); an error from `handle` aborts the import.
fn for_each_record<T, F>(path: &Path, mut handle: F) -> Result<(usize, usize)>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<()>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let mut read = 0;
    let mut skipped = 0;

    for (line, result) in rdr.deserialize().enumerate() {
        match result {
            Ok(record) => {
                read += 1;
                handle(record)?;
            }
            Err(e) => {
                skipped += 1;
                // +2: header row and 1-based numbering
                warn!(file = %path.display(), line = line + 2, error = %e, "skipping malformed row");
            }
        }
    }

    Ok((read, skipped))
}

/// Brazilian or plain decimal; None for empty or unparsable values
fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// NORMALIZED TABLES
// ============================================================================

pub fn import_elections(conn: &Connection, path: &Path) -> Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;

    let (read, skipped) = for_each_record(path, |r: ElectionRecord| {
        insert_election(
            &tx,
            &Election {
                id: r.id,
                year: r.ano,
                round: r.turno,
                kind: r.tipo,
            },
        )
    })?;
    tx.commit()?;

    info!(stored = read, skipped, "elections imported");
    Ok(ImportSummary {
        read,
        skipped,
        stored: read,
    })
}

pub fn import_municipalities(conn: &Connection, path: &Path) -> Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;

    let (read, skipped) = for_each_record(path, |r: MunicipalityRecord| {
        insert_municipality(
            &tx,
            &Municipality {
                id: r.id,
                code: r.codigo_tse,
                name: r.nome,
                state: r.sigla_uf.to_uppercase(),
                registered_voters: r.total_eleitores.unwrap_or(0),
            },
        )
    })?;
    tx.commit()?;

    info!(stored = read, skipped, "municipalities imported");
    Ok(ImportSummary {
        read,
        skipped,
        stored: read,
    })
}

pub fn import_candidates(conn: &Connection, path: &Path) -> Result<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    let mut undeclared = 0;

    let (read, skipped) = for_each_record(path, |r: CandidateRecord| {
        let expenditure = r.despesa.as_deref().and_then(parse_decimal);
        if expenditure.is_none() {
            undeclared += 1;
        }
        insert_candidate(
            &tx,
            &Candidate {
                id: r.id,
                election_id: r.eleicao_id,
                legal_name: r.nome_completo,
                ballot_name: r.nome_urna,
                office: r.cargo,
                party: r.sigla_partido,
                expenditure,
            },
        )
    })?;
    tx.commit()?;

    info!(stored = read, undeclared, skipped, "candidates imported");
    Ok(ImportSummary {
        read,
        skipped,
        stored: read,
    })
}

/// Columns: eleicao_id;municipio_id;zona;secao;candidato_id;votos
///
/// Rows are committed every `VOTE_BATCH_SIZE` records.
pub fn import_votes(conn: &Connection, path: &Path) -> Result<ImportSummary> {
    let mut batch: Vec<VoteRecord> = Vec::with_capacity(VOTE_BATCH_SIZE);
    let mut inserted = 0;

    let (read, skipped) = for_each_record(path, |record: VoteRecord| {
        batch.push(record);
        if batch.len() >= VOTE_BATCH_SIZE {
            inserted += insert_votes(conn, &batch)?;
            batch.clear();
        }
        Ok(())
    })?;
    if !batch.is_empty() {
        inserted += insert_votes(conn, &batch)?;
    }

    info!(read, inserted, skipped, "votes imported");
    Ok(ImportSummary {
        read,
        skipped,
        stored: inserted,
    })
}

// ============================================================================
// TSE VOTER PROFILE
// ============================================================================

#[derive(Debug, Default)]
struct MunicipalityProfile {
    name: String,
    state: String,
    groups: BTreeMap<CategoryGroup, CategoryCounts>,
}

impl MunicipalityProfile {
    fn add(&mut self, group: CategoryGroup, category: &str, voters: u64) {
        *self
            .groups
            .entry(group)
            .or_default()
            .entry(normalize_category(category))
            .or_insert(0) += voters;
    }
}

/// Import a section-level TSE profile file.
///
/// Rows are summed per election year, municipality and category; each
/// group's counts replace what was stored for that year. Missing
/// municipalities are created from the file's code/name/state. Registered
/// voters become the summed gender counts of the latest stored year, so a
/// file spanning several years never adds them together.
pub fn import_voter_profile(conn: &Connection, path: &Path) -> Result<ProfileImportSummary> {
    let mut by_code: BTreeMap<(i32, i64), MunicipalityProfile> = BTreeMap::new();

    let (read, skipped) = for_each_record(path, |r: VoterProfileRecord| {
        let entry = by_code.entry((r.year, r.municipality_code)).or_default();
        if entry.name.is_empty() {
            entry.name = r.municipality_name;
            entry.state = r.state;
        }
        entry.add(CategoryGroup::Gender, &r.gender, r.voters);
        entry.add(CategoryGroup::AgeBracket, &r.age_bracket, r.voters);
        entry.add(CategoryGroup::Education, &r.education, r.voters);
        Ok(())
    })?;

    let tx = conn.unchecked_transaction()?;
    let mut touched = BTreeSet::new();
    let mut years = BTreeSet::new();
    let mut stored = 0;

    for ((year, code), profile) in &by_code {
        let municipality_id = ensure_municipality(&tx, *code, &profile.name, &profile.state)?;
        for (group, counts) in &profile.groups {
            stored += replace_profile_counts(&tx, *year, municipality_id, *group, counts)?;
        }
        debug!(year, code, municipality_id, "profile stored");
        touched.insert(municipality_id);
        years.insert(*year);
    }

    let mut registered_voters = 0;
    for municipality_id in &touched {
        registered_voters += refresh_registered_voters(&tx, *municipality_id)?;
    }
    tx.commit()?;

    let years: Vec<i32> = years.into_iter().collect();
    info!(
        rows = read,
        skipped,
        ?years,
        municipalities = touched.len(),
        registered_voters,
        "voter profile imported"
    );

    Ok(ProfileImportSummary {
        rows: ImportSummary {
            read,
            skipped,
            stored,
        },
        years,
        municipalities: touched.len(),
        registered_voters,
    })
}
