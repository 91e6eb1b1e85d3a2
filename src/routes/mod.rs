pub mod families;
pub mod invites;
pub mod members;

use axum::Router;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::family::Family;
use crate::services::family::require_family;
use crate::services::member::get_member;
use crate::services::permission::Permissions;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(families::router())
        .merge(members::router())
        .merge(invites::router())
}

/// The caller's view of one family.
pub(crate) struct FamilyAccess {
    pub family: Family,
    pub permissions: Permissions,
}

impl FamilyAccess {
    pub async fn load(state: &AppState, family_id: &str, auth: &AuthUser) -> Result<Self, AppError> {
        let family = require_family(&state.store, family_id).await?;
        let role = get_member(&state.store, family_id, &auth.user_id)
            .await?
            .map(|m| m.role);
        let permissions = Permissions::resolve(Some(&family), Some(&auth.user_id), role);
        Ok(Self { family, permissions })
    }

    /// Like [`FamilyAccess::load`] but rejects callers outside the family.
    pub async fn member(state: &AppState, family_id: &str, auth: &AuthUser) -> Result<Self, AppError> {
        let access = Self::load(state, family_id, auth).await?;
        if !access.permissions.is_member {
            return Err(AppError::Forbidden);
        }
        Ok(access)
    }

    pub fn require(&self, allowed: bool) -> Result<(), AppError> {
        if allowed { Ok(()) } else { Err(AppError::Forbidden) }
    }
}
