use super::AppState;
use crate::domain::LedgerMetadata;
use crate::error::ServiceResult;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RecordEntryRequest {
    pub participant_id: String,
    pub amount: f64,
    pub message: Option<String>,
    pub category: Option<String>,
}

pub async fn record_entry(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: web::Json<RecordEntryRequest>,
) -> ServiceResult<HttpResponse> {
    let req = req.into_inner();
    let entry = state
        .services
        .monetization
        .record_entry(
            &id,
            &req.participant_id,
            req.amount,
            LedgerMetadata {
                message: req.message,
                category: req.category,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(entry))
}

pub async fn list_entries(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let entries = state.services.monetization.entries(&id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn leaderboard(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let rows = state.services.monetization.leaderboard(&id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn stats(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let stats = state.services.monetization.stats(&id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn reconcile(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let stats = state.services.monetization.reconcile(&id).await?;
    Ok(HttpResponse::Ok().json(stats))
}
