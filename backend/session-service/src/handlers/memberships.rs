use super::AppState;
use crate::domain::{Admission, Role};
use crate::error::ServiceResult;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub participant_id: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 201 with the membership when admitted, 403 with the reason when denied
pub async fn join(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: web::Json<JoinRequest>,
) -> ServiceResult<HttpResponse> {
    let admission = state
        .services
        .admission
        .try_admit_as(&id, &req.participant_id, req.role)
        .await?;

    Ok(match admission {
        Admission::Admitted { .. } => HttpResponse::Created().json(admission),
        Admission::Denied { .. } => HttpResponse::Forbidden().json(admission),
    })
}

pub async fn leave(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ServiceResult<HttpResponse> {
    let (resource_id, membership_id) = path.into_inner();
    let outcome = state
        .services
        .admission
        .leave(&resource_id, &membership_id)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn active_members(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let members = state.services.membership.active_members(&id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "resource_id": id.as_str(),
        "count": members.len(),
        "members": members,
    })))
}

pub async fn history(
    state: web::Data<AppState>,
    id: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> ServiceResult<HttpResponse> {
    let page = state
        .services
        .membership
        .history_page(
            &id,
            query.cursor.as_deref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}
