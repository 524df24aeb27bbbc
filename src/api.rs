// 🌐 REST API - Axum router over the intelligence engine
//
// Every request opens its own SQLite connection inside a blocking task; the
// only state shared across requests is the result cache.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::cache::ResultCache;
use crate::config::{AppConfig, EngineConfig};
use crate::efficiency::{CostOrder, EfficiencyParams, EfficiencyRow};
use crate::engine::IntelligenceEngine;
use crate::error::{IntelError, IntelResult};
use crate::migration::{MigrationParams, MigrationResult, Selection};
use crate::model::CategoryGroup;
use crate::opportunity::{OpportunityParams, OpportunityRow};
use crate::projection::{ProjectionParams, ProjectionResult};
use crate::similarity::{
    similarity_percentage, MunicipalityProfileSummary, SimilarMunicipality, SimilarityParams,
    SimilarityResult,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
    engine: EngineConfig,
    cache: Arc<ResultCache>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        AppState {
            db_path: Arc::new(config.database_path.clone()),
            engine: config.engine.clone(),
            cache: Arc::new(ResultCache::new(config.engine.cache_ttl_secs)),
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(IntelError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            IntelError::NotFound { .. } => StatusCode::NOT_FOUND,
            IntelError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            IntelError::InvalidTarget(_) | IntelError::InvalidProfileData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IntelError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IntelError> for ApiError {
    fn from(err: IntelError) -> Self {
        ApiError(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(IntelError::InvalidParameter(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(IntelError::InvalidParameter(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, %status, "request rejected");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run one analysis on a fresh connection in a blocking task
async fn run_analysis<T, F>(state: AppState, analysis: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&IntelligenceEngine<'_, Connection>) -> IntelResult<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || -> IntelResult<T> {
        let conn = Connection::open(state.db_path.as_path())?;
        let engine = IntelligenceEngine::new(&conn, state.engine.clone()).with_cache(&state.cache);
        analysis(&engine)
    })
    .await;

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError(IntelError::Storage(anyhow::anyhow!(
            "analysis task failed: {}",
            e
        )))),
    }
}

// ============================================================================
// Request / response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    k: Option<usize>,
    ano_eleicao: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SimilarEntry {
    #[serde(flatten)]
    municipality: SimilarMunicipality,
    similaridade_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    alvo: MunicipalityProfileSummary,
    similares: Vec<SimilarEntry>,
}

impl From<SimilarityResult> for SimilarResponse {
    fn from(result: SimilarityResult) -> Self {
        Self {
            alvo: result.target,
            similares: result
                .similar
                .into_iter()
                .map(|m| SimilarEntry {
                    similaridade_pct: similarity_percentage(m.distance),
                    municipality: m,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpportunityQuery {
    candidato_id: i64,
    criterio: String,
    valor: String,
    min_perfil_pct: Option<f64>,
    max_votos_pct: Option<f64>,
    min_eleitorado: Option<u64>,
    limite: Option<usize>,
    ano_eleicao: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct EfficiencyQuery {
    eleicao_id: Option<i64>,
    cargo_filtro: Option<String>,
    ordenar_por: Option<String>,
    offset: Option<usize>,
    limite: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    meta_votos: u64,
    eleicao_id: i64,
    candidato_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MigrationQuery {
    eleicao_a: i64,
    candidato_a: i64,
    eleicao_b: i64,
    candidato_b: i64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    cache_entries: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: crate::VERSION,
        cache_entries: state.cache.stats().size,
    }))
}

/// GET /api/inteligencia/similares/:municipio_id?k=&ano_eleicao=
async fn similar_municipalities(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<SimilarQuery>, QueryRejection>,
) -> ApiResult<SimilarResponse> {
    let Path(municipio_id) = path?;
    let Query(q) = query?;
    debug!(municipio_id, k = ?q.k, ano = ?q.ano_eleicao, "similares");

    let params = SimilarityParams {
        municipality_id: municipio_id,
        top_k: q.k,
        profile_year: q.ano_eleicao,
    };
    let data = run_analysis(state, move |engine| {
        engine.similar_municipalities(&params).map(SimilarResponse::from)
    })
    .await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// GET /api/inteligencia/oportunidades
async fn opportunities(
    State(state): State<AppState>,
    query: Result<Query<OpportunityQuery>, QueryRejection>,
) -> ApiResult<Vec<OpportunityRow>> {
    let Query(q) = query?;
    debug!(?q, "oportunidades");

    let params = OpportunityParams {
        candidate_id: q.candidato_id,
        criterion: q.criterio.parse::<CategoryGroup>()?,
        value: q.valor,
        min_profile_pct: q.min_perfil_pct.unwrap_or(state.engine.default_min_profile_pct),
        max_votes_pct: q.max_votos_pct.unwrap_or(state.engine.default_max_votes_pct),
        min_registered_voters: q
            .min_eleitorado
            .unwrap_or(state.engine.default_min_registered_voters),
        limit: q.limite,
        profile_year: q.ano_eleicao,
    };
    let data = run_analysis(state, move |engine| engine.opportunities(&params)).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// GET /api/inteligencia/eficiencia
async fn efficiency(
    State(state): State<AppState>,
    query: Result<Query<EfficiencyQuery>, QueryRejection>,
) -> ApiResult<Vec<EfficiencyRow>> {
    let Query(q) = query?;
    debug!(?q, "eficiencia");

    let order = match q.ordenar_por.as_deref() {
        Some(raw) => raw.parse::<CostOrder>()?,
        None => CostOrder::default(),
    };
    let params = EfficiencyParams {
        election_id: q.eleicao_id,
        office: q.cargo_filtro.filter(|c| !c.trim().is_empty()),
        order,
        offset: q.offset.unwrap_or(0),
        limit: q.limite,
    };
    let data = run_analysis(state, move |engine| engine.efficiency_ranking(&params)).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// GET /api/inteligencia/projecao
async fn projection(
    State(state): State<AppState>,
    query: Result<Query<ProjectionQuery>, QueryRejection>,
) -> ApiResult<ProjectionResult> {
    let Query(q) = query?;
    debug!(?q, "projecao");

    let params = ProjectionParams {
        candidate_id: q.candidato_id,
        election_id: q.eleicao_id,
        target: q.meta_votos,
    };
    let data = run_analysis(state, move |engine| engine.goal_projection(&params)).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// GET /api/inteligencia/migracao
async fn migration(
    State(state): State<AppState>,
    query: Result<Query<MigrationQuery>, QueryRejection>,
) -> ApiResult<MigrationResult> {
    let Query(q) = query?;
    debug!(?q, "migracao");

    let params = MigrationParams {
        base: Selection {
            election_id: q.eleicao_a,
            candidate_id: q.candidato_a,
        },
        comparison: Selection {
            election_id: q.eleicao_b,
            candidate_id: q.candidato_b,
        },
    };
    let data = run_analysis(state, move |engine| engine.vote_migration(&params)).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// Build the full router (API routes nested under /api)
pub fn router(state: AppState) -> Router {
    let intelligence = Router::new()
        .route("/similares/:municipio_id", get(similar_municipalities))
        .route("/oportunidades", get(opportunities))
        .route("/eficiencia", get(efficiency))
        .route("/projecao", get(projection))
        .route("/migracao", get(migration));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/inteligencia", intelligence)
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
