use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use rag_qa::config::Settings;
use rag_qa::generation::{GenerationConfig, GenerationManager};
use rag_qa::indexer::build_chunks;
use rag_qa::indexer::chunker::Chunker;
use rag_qa::indexer::extractor::extract_bytes;
use rag_qa::indexer::walker::DocumentFormat;
use rag_qa::models::{
    FailedFile, MessageResponse, QueryAnswer, QueryParams, StatusResponse, UploadResponse,
};
use rag_qa::query::QueryEngine;
use rag_qa::rag::embeddings::{EmbeddingGenerator, EmbeddingProvider};
use rag_qa::rag::RetrievalEngine;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const STREAM_WORD_DELAY: Duration = Duration::from_millis(50);

struct AppState {
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<GenerationManager>,
    query_engine: QueryEngine,
    chunker: Chunker,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;
    tracing::info!("Vector store: {}", settings.vector_store_path.display());
    tracing::info!("Primary model: {}", settings.hf_llm_model);

    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(EmbeddingGenerator::new(
        &settings.embedding_model_dir,
        settings.embedding_dim,
    )?);
    // A corrupt store stops startup here rather than serving misaligned results.
    let retrieval = Arc::new(RetrievalEngine::open(&settings.vector_store_path, embeddings)?);
    let generator = Arc::new(GenerationManager::new(GenerationConfig::from_settings(&settings))?);

    let state = Arc::new(AppState {
        query_engine: QueryEngine::new(retrieval.clone(), generator.clone(), settings.top_k),
        retrieval,
        generator,
        chunker: Chunker::new(settings.chunk_size, settings.chunk_overlap),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/query", post(query_handler))
        .route("/api/query-stream", post(query_stream_handler))
        .route("/api/status", get(status_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut processed = Vec::new();
    let mut failed = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e)))?
    {
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                failed.push(FailedFile {
                    filename: "Unknown".to_string(),
                    reason: "No filename provided".to_string(),
                });
                continue;
            }
        };

        let Some(format) = DocumentFormat::from_filename(&filename) else {
            failed.push(FailedFile {
                filename,
                reason: "Unsupported file type (expected .pdf, .txt or .md)".to_string(),
            });
            continue;
        };

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                failed.push(FailedFile {
                    filename,
                    reason: format!("Failed to read upload: {}", e),
                });
                continue;
            }
        };

        match ingest(&state, &filename, format, bytes.to_vec()).await {
            Ok(count) => {
                tracing::info!("Indexed {} chunks from {}", count, filename);
                processed.push(filename);
            }
            Err(e) => {
                tracing::warn!("Failed to index {}: {:#}", filename, e);
                failed.push(FailedFile {
                    filename,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    Ok(Json(UploadResponse {
        message: format!("Processed {} files", processed.len()),
        processed,
        failed,
    }))
}

async fn ingest(
    state: &AppState,
    filename: &str,
    format: DocumentFormat,
    bytes: Vec<u8>,
) -> Result<usize> {
    let text = tokio::task::spawn_blocking(move || extract_bytes(&bytes, format)).await??;
    let chunks = build_chunks(&text, filename, &state.chunker);
    if chunks.is_empty() {
        anyhow::bail!("No extractable text");
    }
    let count = chunks.len();
    state.retrieval.add_documents(chunks).await?;
    Ok(count)
}

async fn answer_query(state: &AppState, params: &QueryParams) -> Result<QueryAnswer, ApiError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query must not be empty".to_string()));
    }

    let request_id = Uuid::new_v4();
    tracing::info!("Query {} received", request_id);
    state.query_engine.answer(query).await.map_err(|e| {
        tracing::error!("Query {} failed: {}", request_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Retrieval error: {}", e))
    })
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryAnswer>, ApiError> {
    Ok(Json(answer_query(&state, &params).await?))
}

async fn query_stream_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = answer_query(&state, &params).await?.answer;
    let words: Vec<String> = answer.split_whitespace().map(str::to_string).collect();
    let last = words.len().saturating_sub(1);

    let stream = futures::stream::iter(words.into_iter().enumerate()).then(move |(i, word)| async move {
        tokio::time::sleep(STREAM_WORD_DELAY).await;
        let piece = if i < last { format!("{} ", word) } else { word };
        Ok::<_, Infallible>(piece)
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    ))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let model_status = if state.generator.is_configured() {
        "ready"
    } else {
        "not configured"
    };

    Json(StatusResponse {
        status: "online".to_string(),
        vector_store: state.retrieval.status().await,
        model_status: model_status.to_string(),
        current_model: state.generator.current_backend().map(str::to_string),
    })
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, ApiError> {
    state.retrieval.reset().await.map_err(|e| {
        tracing::error!("Reset failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Reset error: {}", e))
    })?;

    Ok(Json(MessageResponse {
        message: "Index reset successfully".to_string(),
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "store_dir": state.retrieval.store_dir().display().to_string(),
    }))
}
