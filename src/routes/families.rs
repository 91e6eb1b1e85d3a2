use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::family::{
    CreateFamilyRequest, Family, FamilySettingsPatch, UpdateFamilyRequest, UserFamily,
};
use crate::services::family::{self, CreateFamily};
use crate::services::member;
use crate::services::permission::Permissions;

use super::FamilyAccess;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/families", post(create_family).get(list_families))
        .route(
            "/api/families/{id}",
            get(get_family).patch(update_family).delete(delete_family),
        )
        .route("/api/families/{id}/settings", put(update_settings))
        .route("/api/families/{id}/permissions", get(get_permissions))
        .route("/api/families/{id}/viewed", post(mark_viewed))
}

async fn create_family(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateFamilyRequest>,
) -> Result<(StatusCode, Json<Family>), AppError> {
    let owner_name = body
        .display_name
        .or(auth.display_name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("displayName is required".into()))?;

    let family = family::create_family(
        &state.store,
        CreateFamily {
            name: body.name,
            description: body.description,
            owner_id: auth.user_id,
            owner_name,
            owner_relation: body.relation,
            owner_photo_url: body.photo_url.or(auth.photo_url),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(family)))
}

async fn list_families(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserFamily>>, AppError> {
    let families = family::list_user_families(&state.store, &auth.user_id).await?;
    Ok(Json(families))
}

async fn get_family(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Family>, AppError> {
    let access = FamilyAccess::member(&state, &id, &auth).await?;
    Ok(Json(access.family))
}

async fn update_family(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateFamilyRequest>,
) -> Result<Json<Family>, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_edit_family)?;

    let family = family::update_family(&state.store, &id, body).await?;
    Ok(Json(family))
}

async fn delete_family(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_delete_family)?;

    family::delete_family(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<FamilySettingsPatch>,
) -> Result<Json<Family>, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_edit_family)?;

    let family = family::update_family_settings(&state.store, &id, body).await?;
    Ok(Json(family))
}

async fn get_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Permissions>, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    Ok(Json(access.permissions))
}

async fn mark_viewed(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    member::mark_viewed(&state.store, &id, &auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
