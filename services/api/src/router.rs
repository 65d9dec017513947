//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and the OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AppendMessagePayload, AuthorView, CatalogTopicView, ConversationResponse,
        CreateConversationPayload, ErrorResponse, MessageView, QuestionView, StatusView,
        TopicView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_conversation,
        handlers::append_message,
        handlers::get_conversation,
        handlers::list_topics,
    ),
    components(
        schemas(
            ConversationResponse, TopicView, QuestionView, MessageView, StatusView, AuthorView,
            CatalogTopicView, CreateConversationPayload, AppendMessagePayload, ErrorResponse
        )
    ),
    tags(
        (name = "Interview API", description = "Conversation management for the technical interviewer")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/interviews/{interview_id}/conversations",
            post(handlers::create_conversation),
        )
        .route("/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/conversations/{id}/messages",
            post(handlers::append_message),
        )
        .route("/topics", get(handlers::list_topics))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/interviews/{interview_id}/conversations",
            "/conversations/{id}",
            "/conversations/{id}/messages",
            "/topics",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
