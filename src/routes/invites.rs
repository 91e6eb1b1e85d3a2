use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::invite::{
    CreateInviteRequest, InviteCode, InviteCodeRequest, ListInvitesParams, RedeemInviteRequest,
    RedeemInviteResponse, ValidateInviteResponse,
};
use crate::services::invitation::{self, CreateInviteCode};

use super::FamilyAccess;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/families/{id}/invites",
            post(create_invite).get(list_invites),
        )
        .route(
            "/api/families/{id}/invites/{invite_id}/deactivate",
            post(deactivate_family_invite),
        )
        .route("/api/invites/validate", post(validate_invite))
        .route("/api/invites/redeem", post(redeem_invite))
        .route("/api/invites/{code}/deactivate", post(deactivate_invite))
}

async fn create_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<InviteCode>), AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_invite_member)?;

    let expires_at = match (body.expires_at, body.expires_in_days) {
        (Some(at), _) => Some(at),
        (None, Some(days)) if days >= 1 => Some(Utc::now() + Duration::days(days)),
        (None, Some(_)) => {
            return Err(AppError::BadRequest(
                "expiresInDays must be at least 1".into(),
            ));
        }
        (None, None) => None,
    };
    if expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(AppError::BadRequest("expiresAt must be in the future".into()));
    }

    let invite = invitation::create_invite_code(
        &state.store,
        &state.config.invites,
        CreateInviteCode {
            family_id: id,
            created_by: auth.user_id,
            max_uses: body.max_uses,
            expires_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(invite)))
}

async fn list_invites(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<ListInvitesParams>,
) -> Result<Json<Vec<InviteCode>>, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_invite_member)?;

    let invites = if params.active {
        invitation::get_active_invite_codes(&state.store, &id).await?
    } else {
        invitation::list_family_invite_codes(&state.store, &id).await?
    };
    Ok(Json(invites))
}

async fn deactivate_family_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, invite_id)): Path<(String, String)>,
) -> Result<Json<InviteCode>, AppError> {
    let access = FamilyAccess::load(&state, &id, &auth).await?;
    access.require(access.permissions.can_invite_member)?;

    let belongs = invitation::get_invite_code(&state.store, &invite_id)
        .await?
        .is_some_and(|invite| invite.family_id == id);
    if !belongs {
        return Err(AppError::NotFound("Invite code not found".into()));
    }

    let invite = invitation::deactivate_invite_code_by_id(&state.store, &invite_id).await?;
    Ok(Json(invite))
}

/// Rejections are a normal answer here, not an error status.
async fn validate_invite(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(body): Json<InviteCodeRequest>,
) -> Result<Json<ValidateInviteResponse>, AppError> {
    let response = match invitation::validate_invite_code(&state.store, &body.code).await {
        Ok(family_id) => ValidateInviteResponse {
            is_valid: true,
            family_id: Some(family_id),
            error: None,
            reason: None,
        },
        Err(AppError::Invite(rejection)) => ValidateInviteResponse {
            is_valid: false,
            family_id: None,
            error: Some(rejection.message()),
            reason: Some(rejection),
        },
        Err(e) => return Err(e),
    };
    Ok(Json(response))
}

async fn redeem_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RedeemInviteRequest>,
) -> Result<Json<RedeemInviteResponse>, AppError> {
    let display_name = body
        .display_name
        .or(auth.display_name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("displayName is required".into()))?;
    let photo_url = body.photo_url.or(auth.photo_url);

    let family_id = invitation::redeem_invite_code(
        &state.store,
        &state.config.invites,
        &body.code,
        &auth.user_id,
        &display_name,
        photo_url.as_deref(),
    )
    .await?;

    Ok(Json(RedeemInviteResponse {
        success: true,
        family_id,
    }))
}

async fn deactivate_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<InviteCode>, AppError> {
    let invite = invitation::get_invite_code_by_code(&state.store, &code)
        .await?
        .ok_or_else(|| AppError::NotFound("Invite code not found".into()))?;
    let access = FamilyAccess::load(&state, &invite.family_id, &auth).await?;
    access.require(access.permissions.can_invite_member)?;

    let invite = invitation::deactivate_invite_code_by_id(&state.store, &invite.id).await?;
    Ok(Json(invite))
}
