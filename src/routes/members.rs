use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use axum::{Json, Router};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::family::{
    FamilyMember, UpdateProfileRequest, UpdateRelationRequest, UpdateRoleRequest,
};
use crate::services::member;

use super::FamilyAccess;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/families/{id}/members", get(list_members))
        .route(
            "/api/families/{id}/members/{user_id}",
            get(get_member).delete(remove_member),
        )
        .route("/api/families/{id}/members/{user_id}/role", put(update_role))
        .route(
            "/api/families/{id}/members/{user_id}/relation",
            put(update_relation),
        )
        .route(
            "/api/families/{id}/members/{user_id}/profile",
            patch(update_profile),
        )
}

async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<FamilyMember>>, AppError> {
    FamilyAccess::member(&state, &id, &auth).await?;
    let members = member::list_members(&state.store, &id).await?;
    Ok(Json(members))
}

async fn get_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<FamilyMember>, AppError> {
    FamilyAccess::member(&state, &id, &auth).await?;
    member::get_member(&state.store, &id, &user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Member not found".into()))
}

/// Admins remove others; any member may leave on their own.
async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let access = FamilyAccess::member(&state, &id, &auth).await?;
    access.require(user_id == auth.user_id || access.permissions.can_remove_member)?;

    member::remove_member(&state.store, &id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(String, String)>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<StatusCode, AppError> {
    let access = FamilyAccess::member(&state, &id, &auth).await?;
    access.require(access.permissions.is_admin)?;

    member::update_member_role(&state.store, &id, &user_id, body.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_relation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(String, String)>,
    Json(body): Json<UpdateRelationRequest>,
) -> Result<StatusCode, AppError> {
    let access = FamilyAccess::member(&state, &id, &auth).await?;
    access.require(user_id == auth.user_id || access.permissions.is_admin)?;

    member::update_member_relation(&state.store, &id, &user_id, body.relation).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(String, String)>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<FamilyMember>, AppError> {
    if user_id != auth.user_id {
        return Err(AppError::Forbidden);
    }

    let member =
        member::update_member_profile(&state.store, &id, &user_id, body.display_name, body.photo_url)
            .await?;
    Ok(Json(member))
}
