use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AppError;
use crate::models::collections::{self, FAMILIES, USER_FAMILIES};
use crate::models::family::{Family, FamilyMember, MemberRole, Relation, UserFamily};
use crate::store::{
    timestamp, to_data, Direction, DocumentStore, Query, StoreError, Update, WriteBatch,
};

use super::family::require_family;
use super::not_found;

#[derive(Debug, Clone)]
pub struct AddMember {
    pub family_id: String,
    pub user_id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub relation: Relation,
    pub role: MemberRole,
    pub invited_by: Option<String>,
}

/// Stages the member document (create-only) and the user's index entry.
pub(crate) fn stage_member_documents(
    batch: &mut WriteBatch,
    family: &Family,
    member: &FamilyMember,
) -> Result<(), StoreError> {
    let entry = UserFamily {
        user_id: member.user_id.clone(),
        family_id: family.id.clone(),
        family_name: family.name.clone(),
        family_icon_url: family.icon_url.clone(),
        role: member.role,
        relation: member.relation,
        joined_at: member.joined_at,
        last_viewed_at: member.joined_at,
        unread_post_count: 0,
    };
    batch
        .create(
            &collections::members(&family.id),
            &member.user_id,
            to_data(member)?,
        )
        .set(
            USER_FAMILIES,
            &collections::user_family_id(&member.user_id, &family.id),
            to_data(&entry)?,
        );
    Ok(())
}

/// Family counter changes for a newly joined member.
pub(crate) fn joined_family_update(member: &FamilyMember, now: DateTime<Utc>) -> Update {
    let update = Update::new()
        .increment("memberCount", 1)
        .set("updatedAt", timestamp(now));
    if member.role == MemberRole::Admin {
        update.array_union("adminIds", member.user_id.as_str())
    } else {
        update
    }
}

pub async fn add_member(store: &DocumentStore, input: AddMember) -> Result<FamilyMember, AppError> {
    let family = require_family(store, &input.family_id).await?;
    let now = Utc::now();
    let member = FamilyMember {
        user_id: input.user_id,
        display_name: input.display_name,
        photo_url: input.photo_url,
        relation: input.relation,
        role: input.role,
        joined_at: now,
        invited_by: input.invited_by,
    };

    let mut batch = WriteBatch::new();
    stage_member_documents(&mut batch, &family, &member)?;
    batch.update(FAMILIES, &family.id, joined_family_update(&member, now));

    match store.commit(batch).await {
        Ok(()) => {}
        Err(StoreError::AlreadyExists { .. }) => {
            return Err(AppError::Conflict(
                "User is already a member of this family".into(),
            ));
        }
        Err(e) => return Err(not_found("Family")(e)),
    }

    tracing::info!(family_id = %family.id, user_id = %member.user_id, role = ?member.role, "member added");
    Ok(member)
}

pub async fn remove_member(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let family = require_family(store, family_id).await?;
    if family.is_owner(user_id) {
        return Err(AppError::Forbidden);
    }

    let members = collections::members(family_id);
    let mut batch = WriteBatch::new();
    batch
        .require(&members, user_id, vec![])
        .delete(&members, user_id)
        .update(
            FAMILIES,
            family_id,
            Update::new()
                .increment("memberCount", -1)
                .array_remove("adminIds", user_id)
                .set("updatedAt", timestamp(Utc::now())),
        )
        .delete(
            USER_FAMILIES,
            &collections::user_family_id(user_id, family_id),
        );
    store.commit(batch).await.map_err(not_found("Member"))?;

    tracing::info!(family_id, user_id, "member removed");
    Ok(())
}

pub async fn update_member_role(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
    role: MemberRole,
) -> Result<(), AppError> {
    let family = require_family(store, family_id).await?;
    if family.is_owner(user_id) && role != MemberRole::Admin {
        return Err(AppError::BadRequest(
            "The family owner must remain an admin".into(),
        ));
    }

    let family_update = Update::new().set("updatedAt", timestamp(Utc::now()));
    let family_update = if role == MemberRole::Admin {
        family_update.array_union("adminIds", user_id)
    } else {
        family_update.array_remove("adminIds", user_id)
    };
    let role_value = to_data(&role)?;

    let members = collections::members(family_id);
    let mut batch = WriteBatch::new();
    batch
        .require(&members, user_id, vec![])
        .update(&members, user_id, Update::new().set("role", role_value.clone()))
        .update(FAMILIES, family_id, family_update)
        .update(
            USER_FAMILIES,
            &collections::user_family_id(user_id, family_id),
            Update::new().set("role", role_value),
        );
    store.commit(batch).await.map_err(not_found("Member"))?;

    tracing::info!(family_id, user_id, ?role, "member role updated");
    Ok(())
}

pub async fn update_member_relation(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
    relation: Relation,
) -> Result<(), AppError> {
    let relation = to_data(&relation)?;
    let mut batch = WriteBatch::new();
    batch
        .update(
            &collections::members(family_id),
            user_id,
            Update::new().set("relation", relation.clone()),
        )
        .update(
            USER_FAMILIES,
            &collections::user_family_id(user_id, family_id),
            Update::new().set("relation", relation),
        );
    store.commit(batch).await.map_err(not_found("Member"))
}

pub async fn update_member_profile(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
    display_name: Option<String>,
    photo_url: Option<String>,
) -> Result<FamilyMember, AppError> {
    let mut update = Update::new();
    if let Some(name) = display_name {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 50 {
            return Err(AppError::BadRequest(
                "Display name must be 1-50 characters".into(),
            ));
        }
        update = update.set("displayName", name);
    }
    if let Some(url) = photo_url {
        // An empty URL clears the photo.
        let url = url.trim();
        update = update.set(
            "photoURL",
            if url.is_empty() {
                Value::Null
            } else {
                Value::from(url)
            },
        );
    }

    if !update.is_empty() {
        store
            .update(&collections::members(family_id), user_id, update)
            .await
            .map_err(not_found("Member"))?;
    }

    get_member(store, family_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".into()))
}

pub async fn list_members(
    store: &DocumentStore,
    family_id: &str,
) -> Result<Vec<FamilyMember>, AppError> {
    let docs = store
        .query(&Query::new(&collections::members(family_id)).order_by("joinedAt", Direction::Asc))
        .await?;
    Ok(docs
        .iter()
        .map(|doc| doc.decode())
        .collect::<Result<_, _>>()?)
}

pub async fn get_member(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<Option<FamilyMember>, AppError> {
    let doc = store
        .get(&collections::members(family_id), user_id)
        .await?;
    Ok(doc.map(|d| d.decode()).transpose()?)
}

pub async fn is_member(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<bool, AppError> {
    Ok(store
        .get(&collections::members(family_id), user_id)
        .await?
        .is_some())
}

pub async fn mark_viewed(
    store: &DocumentStore,
    family_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    store
        .update(
            USER_FAMILIES,
            &collections::user_family_id(user_id, family_id),
            Update::new()
                .set("lastViewedAt", timestamp(Utc::now()))
                .set("unreadPostCount", 0),
        )
        .await
        .map_err(not_found("Member"))
}
