use crate::error::Result;
use crate::query::PrintParams;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use quire::{ContentItem, RenderRequest};

type QueryPairs = Query<Vec<(String, String)>>;

/// Prints the request body as a single markup document.
pub async fn print_document(
    State(state): State<AppState>,
    Query(query): QueryPairs,
    body: String,
) -> Result<Response> {
    let params = PrintParams::parse(&query, &state.config.document.producer)?;
    tracing::info!("Print request for one document -> {}", params.filename);

    let pdf = state
        .printer
        .print_one(ContentItem::markup(body), params.options)
        .await?;
    Ok(pdf_response(&params.filename, pdf))
}

/// Prints every URL of a newline-separated body, in order, into one PDF.
pub async fn print_urls(
    State(state): State<AppState>,
    Query(query): QueryPairs,
    body: String,
) -> Result<Response> {
    let params = PrintParams::parse(&query, &state.config.document.producer)?;
    let urls = split_urls(&body);
    tracing::info!("Print request for {} URL(s) -> {}", urls.len(), params.filename);

    let pdf = state
        .printer
        .print(RenderRequest::urls(urls, params.options))
        .await?;
    Ok(pdf_response(&params.filename, pdf))
}

/// Prints a JSON array of markup documents, in order, into one PDF.
pub async fn print_multiple(
    State(state): State<AppState>,
    Query(query): QueryPairs,
    payload: std::result::Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Response> {
    let Json(documents) = payload?;
    let params = PrintParams::parse(&query, &state.config.document.producer)?;
    tracing::info!(
        "Print request for {} document(s) -> {}",
        documents.len(),
        params.filename
    );

    let pdf = state
        .printer
        .print(RenderRequest::markup(documents, params.options))
        .await?;
    Ok(pdf_response(&params.filename, pdf))
}

/// One URL per line; surrounding whitespace and blank lines are dropped.
pub fn split_urls(body: &str) -> Vec<&str> {
    body.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

fn pdf_response(filename: &str, pdf: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        pdf,
    )
        .into_response()
}
