use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::Settings;
use crate::rag::RagPipeline;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const INVALID_FILE_TYPE: &str = "Invalid file type. Please upload a PDF.";
const STILL_INITIALIZING: &str =
    "RAG pipeline is still initializing. Please try again in a few moments.";

#[derive(Clone)]
pub struct AppState {
    /// `None` when the pipeline failed to start; uploads and questions get 503.
    pub pipeline: Option<Arc<RagPipeline>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pipeline: Option<Arc<RagPipeline>>, settings: Settings) -> Self {
        Self {
            pipeline,
            settings: Arc::new(settings),
        }
    }

    fn pipeline(&self) -> Result<Arc<RagPipeline>, ApiError> {
        self.pipeline
            .clone()
            .ok_or_else(|| ApiError::Unavailable(STILL_INITIALIZING.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Processing(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

#[derive(Serialize)]
struct TestResponse {
    message: String,
    timestamp: String,
}

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    filename: String,
    message: String,
}

#[derive(Deserialize, Validate)]
pub struct AskRequest {
    #[validate(custom = "not_blank")]
    query: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.settings.max_upload_bytes;
    let concurrency = state.settings.max_concurrent_requests;

    Router::new()
        .route("/", get(root))
        .route("/test", get(test_endpoint))
        .route("/upload", post(upload_handler))
        .route("/ask", post(ask_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(GlobalConcurrencyLimitLayer::new(concurrency))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "InfoGenie Backend is running!".to_string(),
    })
}

async fn test_endpoint() -> Json<TestResponse> {
    Json(TestResponse {
        message: "Simple test endpoint works!".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.file_name().is_some() => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(ApiError::InvalidInput(
                    "No file was included in the upload.".to_string(),
                ))
            }
            Err(e) => return Err(multipart_error(e, state.settings.max_upload_bytes)),
        }
    };

    if !is_pdf_content_type(field.content_type()) {
        warn!(
            "Rejected upload with content type {:?}",
            field.content_type()
        );
        return Err(ApiError::InvalidInput(INVALID_FILE_TYPE.to_string()));
    }

    let pipeline = state.pipeline()?;

    let filename = field
        .file_name()
        .and_then(sanitize_filename)
        .ok_or_else(|| ApiError::InvalidInput("The uploaded file has no usable name.".to_string()))?;
    info!("Receiving upload: {}", filename);

    let path = save_upload(
        field,
        &state.settings.docs_directory,
        &filename,
        state.settings.max_upload_bytes,
    )
    .await
    .map_err(|e| {
        error!("Failed to store upload {}: {}", filename, e);
        e
    })?;

    // Ingestion runs on its own task so a dropped connection cannot cancel it
    // between deleting and rewriting a document's chunks.
    let ingest = tokio::spawn(async move { pipeline.process_document(&path).await });
    match ingest.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Failed to process {}: {}", filename, e);
            return Err(ApiError::Processing(format!("Failed to process file: {}", e)));
        }
        Err(e) => {
            error!("Ingestion task for {} failed: {}", filename, e);
            return Err(ApiError::Processing(format!("Failed to process file: {}", e)));
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            status: "success".to_string(),
            filename,
            message: "File processed and ready for questions.".to_string(),
        }),
    ))
}

async fn ask_handler(
    State(state): State<AppState>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    request
        .validate()
        .map_err(|_| ApiError::InvalidInput("The query must not be empty.".to_string()))?;

    let pipeline = state.pipeline()?;

    let answer = pipeline.ask_question(&request.query).await.map_err(|e| {
        error!("Failed to answer query: {}", e);
        ApiError::Processing(format!("Failed to get an answer: {}", e))
    })?;

    Ok(Json(AskResponse { answer }))
}

fn is_pdf_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Strips any directory components a client put in the file name.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c| c == '/' || c == '\\').next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

/// Maps a multipart read failure to a response. Bodies over the upload limit
/// get 413, anything else malformed gets 400.
fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Rejected upload larger than {} bytes", limit);
        ApiError::PayloadTooLarge(format!(
            "The uploaded file exceeds the {} byte limit.",
            limit
        ))
    } else {
        ApiError::InvalidInput(e.body_text())
    }
}

fn storage_error(e: std::io::Error) -> ApiError {
    ApiError::Processing(format!("Failed to process file: {}", e))
}

/// Streams the file part to a unique temporary file in `dir`, then renames it
/// to `filename`. The temporary file is removed if the stream fails.
async fn save_upload(
    mut field: Field<'_>,
    dir: &Path,
    filename: &str,
    limit: usize,
) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir).await.map_err(storage_error)?;

    let temp_path = dir.join(format!(".{}.part", Uuid::new_v4()));
    let destination = dir.join(filename);

    let written = async {
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(storage_error)?;
        let mut bytes = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            bytes += chunk.len();
            file.write_all(&chunk).await.map_err(storage_error)?;
        }
        file.flush().await.map_err(storage_error)?;
        Ok::<usize, ApiError>(bytes)
    }
    .await;

    match written {
        Ok(bytes) => {
            tokio::fs::rename(&temp_path, &destination)
                .await
                .map_err(storage_error)?;
            info!("Saved {} ({} bytes)", destination.display(), bytes);
            Ok(destination)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_content_type() {
        assert!(is_pdf_content_type(Some("application/pdf")));
        assert!(is_pdf_content_type(Some("Application/PDF; name=a.pdf")));
        assert!(!is_pdf_content_type(Some("text/plain")));
        assert!(!is_pdf_content_type(None));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), Some("report.pdf".to_string()));
        assert_eq!(sanitize_filename("../../etc/passwd"), Some("passwd".to_string()));
        assert_eq!(sanitize_filename("C:\\Users\\me\\a.pdf"), Some("a.pdf".to_string()));
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    #[test]
    fn test_not_blank() {
        assert!(not_blank("what?").is_ok());
        assert!(not_blank("  \n").is_err());
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ApiError::InvalidInput("x".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::PayloadTooLarge("x".to_string()), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::Unavailable("x".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::Processing("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
