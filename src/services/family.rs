use chrono::Utc;
use serde_json::Value;

use crate::error::AppError;
use crate::models::collections::{self, FAMILIES, INVITE_CODES, USER_FAMILIES};
use crate::models::family::{
    Family, FamilyMember, FamilySettings, FamilySettingsPatch, MemberRole, Relation,
    UpdateFamilyRequest, UserFamily,
};
use crate::store::{
    timestamp, to_data, Direction, DocumentStore, Filter, Query, StoreError, Update, WriteBatch,
};

use super::member::{list_members, stage_member_documents};
use super::not_found;

const MAX_NAME_CHARS: usize = 50;
const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct CreateFamily {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_relation: Relation,
    pub owner_photo_url: Option<String>,
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "Family name must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Blank descriptions are stored as absent.
fn validate_description(description: &str) -> Result<Option<String>, AppError> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::BadRequest(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

fn nullable(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::from)
}

pub async fn create_family(store: &DocumentStore, input: CreateFamily) -> Result<Family, AppError> {
    let name = validate_name(&input.name)?;
    let description = match input.description.as_deref() {
        Some(d) => validate_description(d)?,
        None => None,
    };

    let now = Utc::now();
    let family = Family {
        id: DocumentStore::new_id(),
        name,
        description,
        icon_url: None,
        owner_id: input.owner_id.clone(),
        admin_ids: vec![input.owner_id.clone()],
        member_count: 1,
        post_count: 0,
        settings: FamilySettings::default(),
        created_at: now,
        updated_at: now,
    };
    let owner = FamilyMember {
        user_id: input.owner_id,
        display_name: input.owner_name,
        photo_url: input.owner_photo_url,
        relation: input.owner_relation,
        role: MemberRole::Admin,
        joined_at: now,
        invited_by: None,
    };

    let mut batch = WriteBatch::new();
    batch.create(FAMILIES, &family.id, to_data(&family)?);
    stage_member_documents(&mut batch, &family, &owner)?;
    store.commit(batch).await?;

    tracing::info!(family_id = %family.id, owner_id = %family.owner_id, "family created");
    Ok(family)
}

pub async fn get_family(store: &DocumentStore, family_id: &str) -> Result<Option<Family>, AppError> {
    let doc = store.get(FAMILIES, family_id).await?;
    Ok(doc.map(|d| d.decode()).transpose()?)
}

pub async fn require_family(store: &DocumentStore, family_id: &str) -> Result<Family, AppError> {
    get_family(store, family_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Family not found".into()))
}

const UPDATE_ATTEMPTS: u32 = 3;

/// Stages the family changes, plus the matching index changes for every
/// current member. The batch only commits while membership is unchanged.
/// `None` when there is nothing to change.
async fn stage_family_update(
    store: &DocumentStore,
    family: &Family,
    changes: &UpdateFamilyRequest,
) -> Result<Option<WriteBatch>, AppError> {
    let mut family_update = Update::new();
    let mut index_update = Update::new();
    if let Some(name) = &changes.name {
        let name = validate_name(name)?;
        family_update = family_update.set("name", name.clone());
        index_update = index_update.set("familyName", name);
    }
    if let Some(description) = &changes.description {
        family_update = family_update.set("description", nullable(validate_description(description)?));
    }
    if let Some(icon_url) = &changes.icon_url {
        let icon_url = Some(icon_url.trim().to_string()).filter(|u| !u.is_empty());
        family_update = family_update.set("iconURL", nullable(icon_url.clone()));
        index_update = index_update.set("familyIconURL", nullable(icon_url));
    }
    if family_update.is_empty() {
        return Ok(None);
    }

    let mut batch = WriteBatch::new();
    if !index_update.is_empty() {
        batch.require(
            FAMILIES,
            &family.id,
            vec![
                Filter::eq("memberCount", family.member_count),
                Filter::eq("updatedAt", timestamp(family.updated_at)),
            ],
        );
        for member in list_members(store, &family.id).await? {
            batch.update(
                USER_FAMILIES,
                &collections::user_family_id(&member.user_id, &family.id),
                index_update.clone(),
            );
        }
    }
    batch.update(
        FAMILIES,
        &family.id,
        family_update.set("updatedAt", timestamp(Utc::now())),
    );
    Ok(Some(batch))
}

/// A rename or icon change is copied to every member's index entry in the
/// same batch. If membership changes meanwhile the update is restaged.
pub async fn update_family(
    store: &DocumentStore,
    family_id: &str,
    changes: UpdateFamilyRequest,
) -> Result<Family, AppError> {
    for attempt in 1..=UPDATE_ATTEMPTS {
        let family = require_family(store, family_id).await?;
        let Some(batch) = stage_family_update(store, &family, &changes).await? else {
            return Ok(family);
        };

        match store.commit(batch).await {
            Ok(()) => {
                tracing::info!(family_id, "family updated");
                return require_family(store, family_id).await;
            }
            Err(StoreError::PreconditionFailed { .. }) => {
                tracing::debug!(attempt, family_id, "family changed concurrently, retrying");
            }
            Err(e) => return Err(not_found("Family")(e)),
        }
    }

    Err(AppError::Conflict(
        "The family is being changed, please try again".into(),
    ))
}

/// Merges the given flags into the existing settings.
pub async fn update_family_settings(
    store: &DocumentStore,
    family_id: &str,
    patch: FamilySettingsPatch,
) -> Result<Family, AppError> {
    let flags = [
        ("settings.allowChildrenToPost", patch.allow_children_to_post),
        ("settings.allowChildrenToComment", patch.allow_children_to_comment),
        ("settings.requireApprovalForPosts", patch.require_approval_for_posts),
    ];
    let update = flags
        .into_iter()
        .filter_map(|(field, flag)| flag.map(|flag| (field, flag)))
        .fold(Update::new(), |update, (field, flag)| update.set(field, flag));

    if !update.is_empty() {
        store
            .update(
                FAMILIES,
                family_id,
                update.set("updatedAt", timestamp(Utc::now())),
            )
            .await
            .map_err(not_found("Family"))?;
    }
    require_family(store, family_id).await
}

/// Deletes the family, its members, their index entries and the family's
/// invite codes in one batch.
pub async fn delete_family(store: &DocumentStore, family_id: &str) -> Result<(), AppError> {
    require_family(store, family_id).await?;
    let members = list_members(store, family_id).await?;
    let invites = store
        .query(&Query::new(INVITE_CODES).where_eq("familyId", family_id))
        .await?;

    let members_collection = collections::members(family_id);
    let mut batch = WriteBatch::new();
    for member in &members {
        batch
            .delete(
                USER_FAMILIES,
                &collections::user_family_id(&member.user_id, family_id),
            )
            .delete(&members_collection, &member.user_id);
    }
    for invite in &invites {
        batch.delete(INVITE_CODES, &invite.id);
    }
    batch.delete(FAMILIES, family_id);
    store.commit(batch).await?;

    tracing::info!(
        family_id,
        members = members.len(),
        invite_codes = invites.len(),
        "family deleted"
    );
    Ok(())
}

pub async fn list_user_families(
    store: &DocumentStore,
    user_id: &str,
) -> Result<Vec<UserFamily>, AppError> {
    let docs = store
        .query(
            &Query::new(USER_FAMILIES)
                .where_eq("userId", user_id)
                .order_by("joinedAt", Direction::Asc),
        )
        .await?;
    Ok(docs
        .iter()
        .map(|doc| doc.decode())
        .collect::<Result<_, _>>()?)
}

pub async fn is_user_admin(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    Ok(get_family(store, family_id)
        .await?
        .is_some_and(|f| f.is_admin(user_id)))
}

pub async fn is_user_owner(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    Ok(get_family(store, family_id)
        .await?
        .is_some_and(|f| f.is_owner(user_id)))
}
