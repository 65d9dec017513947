//! Axum Handlers for the REST API
//!
//! Thin adapters from HTTP to the orchestrator. Each mutating handler owns a
//! `CancellationToken` whose drop guard fires if the request future is
//! dropped, so a client that disconnects mid-turn stops the generator call
//! and nothing is written.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use interview_core::{InterviewError, RepositoryError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

use crate::{
    models::{
        AppendMessagePayload, CatalogTopicView, ConversationResponse, CreateConversationPayload,
        ErrorResponse,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<InterviewError> for ApiError {
    fn from(err: InterviewError) -> Self {
        match err {
            InterviewError::Validation(message) => ApiError::BadRequest(message),
            InterviewError::ConversationNotFound(_) | InterviewError::InterviewNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            InterviewError::Repository(RepositoryError::Conflict(id)) => ApiError::Conflict(
                format!("Conversation '{id}' was updated concurrently; retry the request"),
            ),
            other => ApiError::InternalServerError(other.into()),
        }
    }
}

/// Start a new interview conversation.
#[utoipa::path(
    post,
    path = "/interviews/{interview_id}/conversations",
    request_body = CreateConversationPayload,
    responses(
        (status = 201, description = "Conversation created with its opening question", body = ConversationResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Interview not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("interview_id" = Uuid, Path, description = "Interview the conversation belongs to")
    )
)]
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Path(interview_id): Path<Uuid>,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let conversation = state
        .orchestrator
        .create_conversation(interview_id, &payload.message, &cancel)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse::from(&conversation)),
    ))
}

/// Record the candidate's answer and return the interviewer's next turn.
#[utoipa::path(
    post,
    path = "/conversations/{id}/messages",
    request_body = AppendMessagePayload,
    responses(
        (status = 200, description = "Turn recorded", body = ConversationResponse),
        (status = 400, description = "Bad request or conversation already finished", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 409, description = "Concurrent update", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    )
)]
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendMessagePayload>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let conversation = state
        .orchestrator
        .append(id, &payload.message, &cancel)
        .await?;

    Ok(Json(ConversationResponse::from(&conversation)))
}

/// Get a conversation with every topic, question and message.
#[utoipa::path(
    get,
    path = "/conversations/{id}",
    responses(
        (status = 200, description = "Conversation details", body = ConversationResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    )
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = state.orchestrator.get_conversation(id).await?;
    Ok(Json(ConversationResponse::from(&conversation)))
}

/// List the interview curriculum in order.
#[utoipa::path(
    get,
    path = "/topics",
    responses(
        (status = 200, description = "Catalog topics", body = [CatalogTopicView])
    )
)]
pub async fn list_topics(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogTopicView>> {
    Json(
        state
            .orchestrator
            .catalog()
            .list_topics()
            .iter()
            .map(CatalogTopicView::from)
            .collect(),
    )
}
