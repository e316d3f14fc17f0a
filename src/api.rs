use std::path::PathBuf;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    rag::CourseAnalytics,
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct QueryPayload {
    query: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    answer: String,
    sources: Vec<String>,
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/courses", get(courses_handler))
        .route("/api/health", get(health_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Json<QueryResponse> {
    if payload.query.trim().is_empty() {
        return Json(QueryResponse {
            answer: "Please provide a question to search the course materials.".to_string(),
            sources: Vec::new(),
            session_id: payload.session_id.unwrap_or_default(),
            error: Some("Empty query".to_string()),
        });
    }

    // Se acuña una sesión nueva cuando el cliente no aporta una.
    let session_id = match payload.session_id {
        Some(id) if !id.is_empty() => id,
        _ => state.rag.session_manager().create(),
    };

    info!("Procesando consulta: {:.50}...", payload.query);
    let (mut answer, sources) = state.rag.query(&payload.query, Some(&session_id)).await;

    if answer.trim().is_empty() {
        answer =
            "I couldn't generate a response. Please try rephrasing your question.".to_string();
    }

    Json(QueryResponse {
        answer,
        sources,
        session_id,
        error: None,
    })
}

#[axum::debug_handler]
async fn courses_handler(
    State(state): State<AppState>,
) -> Result<Json<CourseAnalytics>, (StatusCode, Json<serde_json::Value>)> {
    match state.rag.get_course_analytics().await {
        Ok(analytics) => Ok(Json(analytics)),
        Err(e) => {
            error!("Error consultando estadísticas de cursos: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Error retrieving course statistics: {e}")})),
            ))
        }
    }
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let courses_loaded = match state.rag.course_count().await {
        Ok(count) => json!(count),
        Err(e) => json!(format!("error: {e}")),
    };

    Json(json!({
        "rag_system": "initialized",
        "courses_loaded": courses_loaded,
        "active_sessions": state.rag.session_manager().session_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    {
        let status = state.status.lock().unwrap();
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una ingesta en curso."})),
            ));
        }
    }

    let docs_dir = PathBuf::from(&state.config.docs_dir);
    spawn(async move {
        {
            let mut status = state.status.lock().unwrap();
            status.is_busy = true;
            status.message = "Iniciando ingesta...".to_string();
        }

        let result = state.rag.ingest_folder(&docs_dir, false).await;

        let mut status = state.status.lock().unwrap();
        status.is_busy = false;
        match result {
            Ok((courses, chunks)) => {
                status.message = format!(
                    "Ingesta completada: {courses} cursos nuevos, {chunks} chunks."
                );
            }
            Err(err) => {
                status.message = format!("Error en la ingesta: {err}");
                error!("Error de ingesta: {err:#}");
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
