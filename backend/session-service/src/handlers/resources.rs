use super::AppState;
use crate::error::ServiceResult;
use crate::services::CreateResource;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub participant_id: String,
}

pub async fn create_resource(
    state: web::Data<AppState>,
    req: web::Json<CreateResource>,
) -> ServiceResult<HttpResponse> {
    let resource = state.services.resources.create(req.into_inner()).await?;
    Ok(HttpResponse::Created().json(resource))
}

pub async fn get_resource(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let resource = state.services.resources.get(&id).await?;
    Ok(HttpResponse::Ok().json(resource))
}

pub async fn set_capacity(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: web::Json<CapacityRequest>,
) -> ServiceResult<HttpResponse> {
    let resource = state
        .services
        .resources
        .set_capacity(&id, req.capacity)
        .await?;
    Ok(HttpResponse::Ok().json(resource))
}

pub async fn teardown_resource(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    state.services.resources.teardown(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Idempotent: blocking an already blocked participant returns 200 as well
pub async fn block_participant(
    state: web::Data<AppState>,
    id: web::Path<String>,
    req: web::Json<BlockRequest>,
) -> ServiceResult<HttpResponse> {
    let resource = state
        .services
        .admission
        .block(&id, &req.participant_id)
        .await?;
    Ok(HttpResponse::Ok().json(resource))
}
