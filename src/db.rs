use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use crate::error::IntelResult;
use crate::model::{
    normalize_category, Candidate, CandidateVotes, CategoryCounts, CategoryGroup, Election,
    Municipality, VoteAggregate,
};
use crate::store::{office_matches, CandidateDirectory, DemographicSource, VoteSource};

/// One section-level vote count, as imported
/// Unique on (election, municipality, zone, section, candidate)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VoteRecord {
    #[serde(rename = "eleicao_id")]
    pub election_id: i64,

    #[serde(rename = "municipio_id")]
    pub municipality_id: i64,

    #[serde(rename = "zona")]
    pub zone: i64,

    #[serde(rename = "secao")]
    pub section: i64,

    #[serde(rename = "candidato_id")]
    pub candidate_id: i64,

    #[serde(rename = "votos")]
    pub votes: u64,
}

/// SQLite caps bound parameters per statement (32766 by default)
const MAX_IDS_PER_QUERY: usize = 500;

/// Row counts per table, for import summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableCounts {
    pub eleicoes: i64,
    pub municipios: i64,
    pub perfil_eleitorado: i64,
    pub candidatos: i64,
    pub votos: i64,
}

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Elections & municipalities
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS eleicoes (
            id INTEGER PRIMARY KEY,
            ano INTEGER NOT NULL,
            turno INTEGER NOT NULL,
            tipo TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS municipios (
            id INTEGER PRIMARY KEY,
            codigo_tse INTEGER UNIQUE NOT NULL,
            nome TEXT NOT NULL,
            sigla_uf TEXT NOT NULL,
            total_eleitores INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Voter profile (pre-aggregated per year / municipality / group / category)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS perfil_eleitorado (
            ano INTEGER NOT NULL,
            municipio_id INTEGER NOT NULL REFERENCES municipios(id),
            grupo TEXT NOT NULL,
            categoria TEXT NOT NULL,
            quantidade INTEGER NOT NULL,
            PRIMARY KEY (ano, municipio_id, grupo, categoria)
        )",
        [],
    )?;

    // ==========================================================================
    // Candidates & votes
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS candidatos (
            id INTEGER PRIMARY KEY,
            eleicao_id INTEGER NOT NULL REFERENCES eleicoes(id),
            nome_completo TEXT NOT NULL,
            nome_urna TEXT NOT NULL,
            cargo TEXT NOT NULL,
            sigla_partido TEXT NOT NULL,
            despesa REAL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS votos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eleicao_id INTEGER NOT NULL REFERENCES eleicoes(id),
            municipio_id INTEGER NOT NULL REFERENCES municipios(id),
            zona INTEGER NOT NULL,
            secao INTEGER NOT NULL,
            candidato_id INTEGER NOT NULL REFERENCES candidatos(id),
            quantidade INTEGER NOT NULL,
            UNIQUE (eleicao_id, municipio_id, zona, secao, candidato_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_votos_candidato ON votos(eleicao_id, candidato_id, municipio_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_perfil_grupo ON perfil_eleitorado(ano, grupo, municipio_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_candidatos_eleicao ON candidatos(eleicao_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

pub fn insert_election(conn: &Connection, election: &Election) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO eleicoes (id, ano, turno, tipo) VALUES (?1, ?2, ?3, ?4)",
        params![election.id, election.year, election.round, election.kind],
    )
    .with_context(|| format!("Failed to insert election {}", election.id))?;
    Ok(())
}

pub fn insert_municipality(conn: &Connection, municipality: &Municipality) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO municipios (id, codigo_tse, nome, sigla_uf, total_eleitores)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            municipality.id,
            municipality.code,
            municipality.name,
            municipality.state,
            to_sql_count(municipality.registered_voters),
        ],
    )
    .with_context(|| format!("Failed to insert municipality {}", municipality.id))?;
    Ok(())
}

/// Id of the municipality with this TSE code, creating it when missing
pub fn ensure_municipality(conn: &Connection, code: i64, name: &str, state: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM municipios WHERE codigo_tse = ?1",
            params![code],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO municipios (codigo_tse, nome, sigla_uf, total_eleitores) VALUES (?1, ?2, ?3, 0)",
        params![code, name.trim(), state.trim().to_uppercase()],
    )
    .with_context(|| format!("Failed to create municipality {}", code))?;
    Ok(conn.last_insert_rowid())
}

pub fn set_registered_voters(conn: &Connection, municipality_id: i64, registered_voters: u64) -> Result<()> {
    conn.execute(
        "UPDATE municipios SET total_eleitores = ?2 WHERE id = ?1",
        params![municipality_id, to_sql_count(registered_voters)],
    )?;
    Ok(())
}

/// Registered voters from the gender counts of the latest stored profile year.
/// Municipalities without profile rows keep their current total.
pub fn refresh_registered_voters(conn: &Connection, municipality_id: i64) -> Result<u64> {
    let total: Option<i64> = conn.query_row(
        "SELECT SUM(quantidade)
         FROM perfil_eleitorado
         WHERE municipio_id = ?1 AND grupo = ?2
           AND ano = (SELECT MAX(ano) FROM perfil_eleitorado WHERE municipio_id = ?1)",
        params![municipality_id, CategoryGroup::Gender.as_str()],
        |row| row.get(0),
    )?;

    match total {
        Some(total) => {
            let total = from_sql_count(total);
            set_registered_voters(conn, municipality_id, total)?;
            Ok(total)
        }
        None => {
            let current: i64 = conn.query_row(
                "SELECT total_eleitores FROM municipios WHERE id = ?1",
                params![municipality_id],
                |row| row.get(0),
            )?;
            Ok(from_sql_count(current))
        }
    }
}

/// Replace every category count of one year, municipality and group
pub fn replace_profile_counts(
    conn: &Connection,
    year: i32,
    municipality_id: i64,
    group: CategoryGroup,
    counts: &CategoryCounts,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM perfil_eleitorado WHERE ano = ?1 AND municipio_id = ?2 AND grupo = ?3",
        params![year, municipality_id, group.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO perfil_eleitorado (ano, municipio_id, grupo, categoria, quantidade)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (ano, municipio_id, grupo, categoria)
         DO UPDATE SET quantidade = quantidade + excluded.quantidade",
    )?;

    for (category, count) in counts {
        stmt.execute(params![
            year,
            municipality_id,
            group.as_str(),
            normalize_category(category),
            to_sql_count(*count),
        ])?;
    }

    Ok(counts.len())
}

pub fn insert_candidate(conn: &Connection, candidate: &Candidate) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO candidatos
            (id, eleicao_id, nome_completo, nome_urna, cargo, sigla_partido, despesa)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            candidate.id,
            candidate.election_id,
            candidate.legal_name,
            candidate.ballot_name,
            candidate.office,
            candidate.party,
            candidate.expenditure,
        ],
    )
    .with_context(|| format!("Failed to insert candidate {}", candidate.id))?;
    Ok(())
}

/// Insert section-level votes; rows already present are skipped.
/// Returns how many rows were actually inserted.
pub fn insert_votes(conn: &Connection, votes: &[VoteRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    let mut duplicates = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO votos
                (eleicao_id, municipio_id, zona, secao, candidato_id, quantidade)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for v in votes {
            let changed = stmt.execute(params![
                v.election_id,
                v.municipality_id,
                v.zone,
                v.section,
                v.candidate_id,
                to_sql_count(v.votes),
            ])?;
            if changed == 0 {
                duplicates += 1;
            } else {
                inserted += changed;
            }
        }
    }

    tx.commit()?;
    debug!(inserted, duplicates, "vote batch stored");
    Ok(inserted)
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |table: &str| -> Result<i64> {
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n)
    };

    Ok(TableCounts {
        eleicoes: count("eleicoes")?,
        municipios: count("municipios")?,
        perfil_eleitorado: count("perfil_eleitorado")?,
        candidatos: count("candidatos")?,
        votos: count("votos")?,
    })
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ============================================================================
// READS (storage collaborator traits)
// ============================================================================

fn row_to_municipality(row: &rusqlite::Row) -> rusqlite::Result<Municipality> {
    Ok(Municipality {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        state: row.get(3)?,
        registered_voters: from_sql_count(row.get(4)?),
    })
}

fn row_to_candidate(row: &rusqlite::Row) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: row.get(0)?,
        election_id: row.get(1)?,
        legal_name: row.get(2)?,
        ballot_name: row.get(3)?,
        office: row.get(4)?,
        party: row.get(5)?,
        expenditure: row.get(6)?,
    })
}

impl DemographicSource for Connection {
    fn municipality(&self, municipality_id: i64) -> IntelResult<Option<Municipality>> {
        let found = self
            .query_row(
                "SELECT id, codigo_tse, nome, sigla_uf, total_eleitores FROM municipios WHERE id = ?1",
                params![municipality_id],
                row_to_municipality,
            )
            .optional()?;
        Ok(found)
    }

    fn municipalities(&self) -> IntelResult<Vec<Municipality>> {
        let mut stmt = self.prepare(
            "SELECT id, codigo_tse, nome, sigla_uf, total_eleitores FROM municipios ORDER BY id",
        )?;
        let all = stmt
            .query_map([], row_to_municipality)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(all)
    }

    fn profile_years(&self) -> IntelResult<Vec<i32>> {
        let mut stmt = self.prepare("SELECT DISTINCT ano FROM perfil_eleitorado ORDER BY ano")?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i32>, _>>()?;
        Ok(years)
    }

    fn category_counts(
        &self,
        year: i32,
        municipality_id: i64,
        group: CategoryGroup,
    ) -> IntelResult<Option<CategoryCounts>> {
        let mut stmt = self.prepare(
            "SELECT categoria, SUM(quantidade)
             FROM perfil_eleitorado
             WHERE ano = ?1 AND municipio_id = ?2 AND grupo = ?3
             GROUP BY categoria",
        )?;
        let counts: CategoryCounts = stmt
            .query_map(params![year, municipality_id, group.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, from_sql_count(row.get(1)?)))
            })?
            .collect::<Result<_, _>>()?;

        Ok(if counts.is_empty() { None } else { Some(counts) })
    }

    fn all_category_counts(
        &self,
        year: i32,
        group: CategoryGroup,
    ) -> IntelResult<BTreeMap<i64, CategoryCounts>> {
        let mut stmt = self.prepare(
            "SELECT municipio_id, categoria, SUM(quantidade)
             FROM perfil_eleitorado
             WHERE ano = ?1 AND grupo = ?2
             GROUP BY municipio_id, categoria",
        )?;
        let rows = stmt.query_map(params![year, group.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                from_sql_count(row.get(2)?),
            ))
        })?;

        let mut all: BTreeMap<i64, CategoryCounts> = BTreeMap::new();
        for row in rows {
            let (municipality_id, category, count) = row?;
            all.entry(municipality_id).or_default().insert(category, count);
        }
        Ok(all)
    }
}

impl VoteSource for Connection {
    fn vote_aggregates(&self, election_id: i64, candidate_id: i64) -> IntelResult<Vec<VoteAggregate>> {
        let mut stmt = self.prepare(
            "SELECT municipio_id, SUM(quantidade)
             FROM votos
             WHERE eleicao_id = ?1 AND candidato_id = ?2
             GROUP BY municipio_id
             ORDER BY municipio_id",
        )?;
        let rows = stmt
            .query_map(params![election_id, candidate_id], |row| {
                Ok(VoteAggregate {
                    municipality_id: row.get(0)?,
                    votes: from_sql_count(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn candidate_vote_totals(
        &self,
        election_id: Option<i64>,
        candidate_ids: &[i64],
    ) -> IntelResult<Vec<CandidateVotes>> {
        // Sorted and unique, so per-chunk results concatenate in id order
        let ids: Vec<i64> = candidate_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut totals = Vec::new();
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut sql = format!(
                "SELECT candidato_id, SUM(quantidade) FROM votos WHERE candidato_id IN ({})",
                placeholders
            );
            let mut bound: Vec<i64> = chunk.to_vec();
            if let Some(id) = election_id {
                sql.push_str(" AND eleicao_id = ?");
                bound.push(id);
            }
            sql.push_str(" GROUP BY candidato_id ORDER BY candidato_id");

            let mut stmt = self.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
                Ok(CandidateVotes {
                    candidate_id: row.get(0)?,
                    votes: from_sql_count(row.get(1)?),
                })
            })?;
            for row in rows {
                totals.push(row?);
            }
        }
        Ok(totals)
    }
}

impl CandidateDirectory for Connection {
    fn candidate(&self, candidate_id: i64) -> IntelResult<Option<Candidate>> {
        let found = self
            .query_row(
                "SELECT id, eleicao_id, nome_completo, nome_urna, cargo, sigla_partido, despesa
                 FROM candidatos WHERE id = ?1",
                params![candidate_id],
                row_to_candidate,
            )
            .optional()?;
        Ok(found)
    }

    fn candidates(&self, election_id: Option<i64>, office: Option<&str>) -> IntelResult<Vec<Candidate>> {
        let mut stmt = self.prepare(
            "SELECT id, eleicao_id, nome_completo, nome_urna, cargo, sigla_partido, despesa
             FROM candidatos
             WHERE ?1 IS NULL OR eleicao_id = ?1
             ORDER BY id",
        )?;
        let all = stmt
            .query_map(params![election_id], row_to_candidate)?
            .collect::<Result<Vec<_>, _>>()?;

        // SQLite LOWER() only folds ASCII
        Ok(all
            .into_iter()
            .filter(|c| office.map_or(true, |f| office_matches(&c.office, f)))
            .collect())
    }

    fn election(&self, election_id: i64) -> IntelResult<Option<Election>> {
        let found = self
            .query_row(
                "SELECT id, ano, turno, tipo FROM eleicoes WHERE id = ?1",
                params![election_id],
                |row| {
                    Ok(Election {
                        id: row.get(0)?,
                        year: row.get(1)?,
                        round: row.get(2)?,
                        kind: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }
}
