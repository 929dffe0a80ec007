//! `pado serve` - read-only query API
//!
//! Exposes the two output contracts (trend projections and org scores) plus
//! health and Prometheus metrics endpoints. Strictly read-only: ingestion
//! stays with the batch pipeline.

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::models::{TrendEventProjection, TrendStage};
use crate::projector::OrgTrendScore;
use crate::store::{TrendFilter, TrendStore};

#[derive(Clone)]
struct AppState {
    store: Arc<TrendStore>,
}

pub async fn execute(config: &Config) -> Result<()> {
    let store = Arc::new(super::open_store(config)?);
    let state = AppState { store };

    let app = Router::new()
        .route("/health", get(health))
        .route("/trends", get(list_trends))
        .route("/trends/{event_key}", get(get_trend))
        .route("/orgs/{org_id}/scores", get(org_scores))
        .route("/metrics", get(metrics_text))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = &config.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Query API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    #[serde(default)]
    breaking: bool,
    #[serde(default)]
    trending: bool,
    stage: Option<String>,
    limit: Option<usize>,
}

async fn list_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<Vec<TrendEventProjection>>, StatusCode> {
    let stage = match &query.stage {
        Some(s) => Some(TrendStage::parse(s).ok_or(StatusCode::BAD_REQUEST)?),
        None => None,
    };

    let filter = TrendFilter {
        stage,
        breaking_only: query.breaking,
        trending_only: query.trending,
        min_confidence: None,
        limit: Some(query.limit.unwrap_or(50)),
    };

    let events = state
        .store
        .active_trends(&filter)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(events.iter().map(|e| e.projection()).collect()))
}

async fn get_trend(
    State(state): State<AppState>,
    Path(event_key): Path<String>,
) -> Result<Json<TrendEventProjection>, StatusCode> {
    let event = state
        .store
        .get_event(&event_key)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(event.projection()))
}

async fn org_scores(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<OrgTrendScore>>, StatusCode> {
    let scores = state
        .store
        .repo()
        .list_org_scores(&org_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(scores))
}

async fn metrics_text() -> String {
    crate::metrics::gather()
}
