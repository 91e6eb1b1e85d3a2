use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Father,
    Mother,
    OlderBrother,
    OlderSister,
    YoungerBrother,
    YoungerSister,
    Grandfather,
    Grandmother,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySettings {
    pub allow_children_to_post: bool,
    pub allow_children_to_comment: bool,
    pub require_approval_for_posts: bool,
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            allow_children_to_post: true,
            allow_children_to_comment: true,
            require_approval_for_posts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "iconURL")]
    pub icon_url: Option<String>,
    pub owner_id: String,
    pub admin_ids: Vec<String>,
    pub member_count: i64,
    pub post_count: i64,
    pub settings: FamilySettings,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Family {
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.admin_ids.iter().any(|id| id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub user_id: String,
    pub display_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub relation: Relation,
    pub role: MemberRole,
    #[serde(with = "ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<String>,
}

/// Per-user index entry for a membership, keyed `{userId}_{familyId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFamily {
    pub user_id: String,
    pub family_id: String,
    pub family_name: String,
    #[serde(rename = "familyIconURL")]
    pub family_icon_url: Option<String>,
    pub role: MemberRole,
    pub relation: Relation,
    #[serde(with = "ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub last_viewed_at: DateTime<Utc>,
    pub unread_post_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFamilyRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub relation: Relation,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFamilyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "iconURL")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySettingsPatch {
    pub allow_children_to_post: Option<bool>,
    pub allow_children_to_comment: Option<bool>,
    pub require_approval_for_posts: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: MemberRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRelationRequest {
    pub relation: Relation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}
