use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

// Use library instead of local modules
use electoral_intelligence::{
    import_candidates, import_elections, import_municipalities, import_voter_profile,
    import_votes, open_database, table_counts, AppConfig, CategoryGroup, CostOrder,
    EfficiencyParams, IntelligenceEngine, MigrationParams, OpportunityParams, ProjectionParams,
    Selection, SimilarityParams,
};

#[derive(Parser, Debug)]
#[command(
    name = "electoral-intelligence",
    version,
    about = "Electoral intelligence over TSE election data"
)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, env = "ELECTORAL_DB", global = true)]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long, env = "ELECTORAL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ImportKind {
    Eleicoes,
    Municipios,
    Candidatos,
    Votos,
    /// TSE perfil_eleitor_secao file
    Perfil,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    Init,

    /// Import a `;`-separated CSV file
    Import {
        #[arg(value_enum)]
        kind: ImportKind,
        csv: PathBuf,
    },

    /// Municipalities with the most similar voter profile
    Similar {
        municipio_id: i64,
        #[arg(short, long)]
        k: Option<usize>,
        /// Profile election year (latest imported when omitted)
        #[arg(long)]
        ano_eleicao: Option<i32>,
    },

    /// Municipalities where a segment is large and the candidate is weak
    Opportunities {
        #[arg(long)]
        candidato: i64,
        /// faixa_etaria | escolaridade | genero
        #[arg(long)]
        criterio: CategoryGroup,
        /// e.g. "18 A 20 ANOS"
        #[arg(long)]
        valor: String,
        #[arg(long)]
        min_perfil_pct: Option<f64>,
        #[arg(long)]
        max_votos_pct: Option<f64>,
        /// Defaults to engine.default_min_registered_voters
        #[arg(long)]
        min_eleitorado: Option<u64>,
        #[arg(long)]
        limite: Option<usize>,
        #[arg(long)]
        ano_eleicao: Option<i32>,
    },

    /// Candidates ranked by cost per vote
    Efficiency {
        #[arg(long)]
        eleicao: Option<i64>,
        #[arg(long)]
        cargo: Option<String>,
        /// custo_crescente | custo_decrescente
        #[arg(long, default_value = "custo_crescente")]
        ordem: CostOrder,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limite: Option<usize>,
    },

    /// Per-municipality targets for a global vote goal
    Projection {
        #[arg(long)]
        candidato: i64,
        #[arg(long)]
        eleicao: i64,
        #[arg(long)]
        meta: u64,
    },

    /// Per-municipality vote change between two selections
    Migration {
        #[arg(long)]
        eleicao_a: i64,
        #[arg(long)]
        candidato_a: i64,
        #[arg(long)]
        eleicao_b: i64,
        #[arg(long)]
        candidato_b: i64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let conn = open_database(&config.database_path)?;
    info!(database = %config.database_path.display(), "database ready");

    let engine = IntelligenceEngine::new(&conn, config.engine.clone());

    match cli.command {
        Command::Init => {
            let counts = table_counts(&conn)?;
            println!("✓ Database initialized with WAL mode: {:?}", config.database_path);
            print_json(&counts)?;
        }

        Command::Import { kind, csv } => {
            match kind {
                ImportKind::Eleicoes => print_json(&import_elections(&conn, &csv)?)?,
                ImportKind::Municipios => print_json(&import_municipalities(&conn, &csv)?)?,
                ImportKind::Candidatos => print_json(&import_candidates(&conn, &csv)?)?,
                ImportKind::Votos => print_json(&import_votes(&conn, &csv)?)?,
                ImportKind::Perfil => print_json(&import_voter_profile(&conn, &csv)?)?,
            }
            print_json(&table_counts(&conn)?)?;
        }

        Command::Similar {
            municipio_id,
            k,
            ano_eleicao,
        } => {
            let result = engine.similar_municipalities(&SimilarityParams {
                municipality_id: municipio_id,
                top_k: k,
                profile_year: ano_eleicao,
            })?;
            print_json(&result)?;
        }

        Command::Opportunities {
            candidato,
            criterio,
            valor,
            min_perfil_pct,
            max_votos_pct,
            min_eleitorado,
            limite,
            ano_eleicao,
        } => {
            let rows = engine.opportunities(&OpportunityParams {
                candidate_id: candidato,
                criterion: criterio,
                value: valor,
                min_profile_pct: min_perfil_pct.unwrap_or(config.engine.default_min_profile_pct),
                max_votes_pct: max_votos_pct.unwrap_or(config.engine.default_max_votes_pct),
                min_registered_voters: min_eleitorado
                    .unwrap_or(config.engine.default_min_registered_voters),
                limit: limite,
                profile_year: ano_eleicao,
            })?;
            print_json(&rows)?;
        }

        Command::Efficiency {
            eleicao,
            cargo,
            ordem,
            offset,
            limite,
        } => {
            let rows = engine.efficiency_ranking(&EfficiencyParams {
                election_id: eleicao,
                office: cargo,
                order: ordem,
                offset,
                limit: limite,
            })?;
            print_json(&rows)?;
        }

        Command::Projection {
            candidato,
            eleicao,
            meta,
        } => {
            let result = engine.goal_projection(&ProjectionParams {
                candidate_id: candidato,
                election_id: eleicao,
                target: meta,
            })?;
            print_json(&result)?;
        }

        Command::Migration {
            eleicao_a,
            candidato_a,
            eleicao_b,
            candidato_b,
        } => {
            let result = engine.vote_migration(&MigrationParams {
                base: Selection {
                    election_id: eleicao_a,
                    candidate_id: candidato_a,
                },
                comparison: Selection {
                    election_id: eleicao_b,
                    candidate_id: candidato_b,
                },
            })?;
            print_json(&result)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
