//! Invite-code lifecycle: issuance, validation, redemption, deactivation and
//! cleanup.
//!
//! A code is usable while it is active, unexpired and under its use limit.
//! Redemption commits the new member and the code's counters in one batch,
//! guarded by a precondition on the code's observed `usedCount`, so two
//! concurrent redemptions can never both consume the last use.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::config::InviteConfig;
use crate::error::AppError;
use crate::models::collections::{FAMILIES, INVITE_CODES};
use crate::models::family::{FamilyMember, MemberRole, Relation};
use crate::models::invite::{InviteCode, InviteRejection};
use crate::store::{
    timestamp, to_data, Direction, Document, DocumentStore, Filter, Op, Query, StoreError,
    Update, WriteBatch,
};

use super::family::get_family;
use super::member::{joined_family_update, stage_member_documents};
use super::not_found;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone)]
pub struct CreateInviteCode {
    pub family_id: String,
    pub created_by: String,
    pub max_uses: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and ignoring surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn decode_all(docs: &[Document]) -> Result<Vec<InviteCode>, StoreError> {
    docs.iter().map(Document::decode).collect()
}

async fn find_by_code(store: &DocumentStore, code: &str) -> Result<Option<InviteCode>, StoreError> {
    let docs = store
        .query(&Query::new(INVITE_CODES).where_eq("code", code).limit(1))
        .await?;
    docs.first().map(Document::decode).transpose()
}

async fn code_taken(store: &DocumentStore, code: &str) -> Result<bool, StoreError> {
    let docs = store
        .query(&Query::new(INVITE_CODES).where_eq("code", code).limit(1))
        .await?;
    Ok(!docs.is_empty())
}

async fn unique_code(store: &DocumentStore, config: &InviteConfig) -> Result<String, AppError> {
    for attempt in 1..=config.max_generation_attempts {
        let candidate = generate_code(config.code_length);
        if !code_taken(store, &candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(attempt, "invite code collision, regenerating");
    }
    tracing::warn!(
        attempts = config.max_generation_attempts,
        "gave up generating a unique invite code"
    );
    Err(AppError::Conflict(
        "Could not generate a unique invite code".into(),
    ))
}

pub async fn create_invite_code(
    store: &DocumentStore,
    config: &InviteConfig,
    input: CreateInviteCode,
) -> Result<InviteCode, AppError> {
    let max_uses = input.max_uses.unwrap_or(config.default_max_uses);
    if max_uses == 0 {
        return Err(AppError::BadRequest("maxUses must be at least 1".into()));
    }

    let code = unique_code(store, config).await?;
    let now = Utc::now();
    let invite = InviteCode {
        id: DocumentStore::new_id(),
        family_id: input.family_id,
        code,
        created_by: input.created_by,
        created_at: now,
        expires_at: input
            .expires_at
            .unwrap_or_else(|| now + Duration::days(config.expiry_days)),
        max_uses,
        used_count: 0,
        used_by: Vec::new(),
        is_active: true,
    };

    let mut batch = WriteBatch::new();
    batch.create(INVITE_CODES, &invite.id, to_data(&invite)?);
    store.commit(batch).await?;

    tracing::info!(
        family_id = %invite.family_id,
        invite_id = %invite.id,
        max_uses,
        expires_at = %invite.expires_at,
        "invite code issued"
    );
    Ok(invite)
}

pub async fn get_invite_code(
    store: &DocumentStore,
    invite_id: &str,
) -> Result<Option<InviteCode>, AppError> {
    let doc = store.get(INVITE_CODES, invite_id).await?;
    Ok(doc.map(|d| d.decode()).transpose()?)
}

pub async fn get_invite_code_by_code(
    store: &DocumentStore,
    code: &str,
) -> Result<Option<InviteCode>, AppError> {
    Ok(find_by_code(store, &normalize_code(code)).await?)
}

async fn usable_invite(store: &DocumentStore, code: &str) -> Result<InviteCode, AppError> {
    let invite = get_invite_code_by_code(store, code)
        .await?
        .ok_or(AppError::Invite(InviteRejection::NotFound))?;
    invite.check(Utc::now()).map_err(AppError::Invite)?;
    Ok(invite)
}

/// Returns the family the code grants access to, or the reason it cannot be
/// used as `AppError::Invite`. Read-only.
pub async fn validate_invite_code(store: &DocumentStore, code: &str) -> Result<String, AppError> {
    Ok(usable_invite(store, code).await?.family_id)
}

/// Joins `user_id` to the code's family as a child member and consumes one
/// use of the code. Returns the family id.
pub async fn redeem_invite_code(
    store: &DocumentStore,
    config: &InviteConfig,
    code: &str,
    user_id: &str,
    display_name: &str,
    photo_url: Option<&str>,
) -> Result<String, AppError> {
    let redemption = Redemption {
        code,
        user_id,
        display_name,
        photo_url,
    };
    redeem_with(store, config, &redemption, || std::future::ready(())).await
}

struct Redemption<'a> {
    code: &'a str,
    user_id: &'a str,
    display_name: &'a str,
    photo_url: Option<&'a str>,
}

/// Reads and re-validates the code, then stages the conditional batch that
/// consumes one use of it.
async fn stage_redemption(
    store: &DocumentStore,
    redemption: &Redemption<'_>,
) -> Result<(InviteCode, WriteBatch), AppError> {
    let invite = usable_invite(store, redemption.code).await?;
    let family = get_family(store, &invite.family_id)
        .await?
        .ok_or(AppError::Invite(InviteRejection::NotFound))?;

    let now = Utc::now();
    let member = FamilyMember {
        user_id: redemption.user_id.to_string(),
        display_name: redemption.display_name.to_string(),
        photo_url: redemption.photo_url.map(str::to_string),
        relation: Relation::Other,
        role: MemberRole::Child,
        joined_at: now,
        invited_by: Some(invite.created_by.clone()),
    };

    let mut code_update = Update::new()
        .increment("usedCount", 1)
        .array_union("usedBy", redemption.user_id);
    if invite.used_count + 1 >= invite.max_uses {
        code_update = code_update.set("isActive", false);
    }

    let mut batch = WriteBatch::new();
    batch.require(
        INVITE_CODES,
        &invite.id,
        vec![
            Filter::eq("isActive", true),
            Filter::eq("usedCount", invite.used_count),
        ],
    );
    stage_member_documents(&mut batch, &family, &member)?;
    batch
        .update(FAMILIES, &family.id, joined_family_update(&member, now))
        .update(INVITE_CODES, &invite.id, code_update);

    Ok((invite, batch))
}

/// `before_commit` runs between staging and committing each attempt.
async fn redeem_with<F, Fut>(
    store: &DocumentStore,
    config: &InviteConfig,
    redemption: &Redemption<'_>,
    mut before_commit: F,
) -> Result<String, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let user_id = redemption.user_id;
    for attempt in 1..=config.redeem_attempts {
        let (invite, batch) = stage_redemption(store, redemption).await?;
        before_commit().await;

        match store.commit(batch).await {
            Ok(()) => {
                tracing::info!(
                    family_id = %invite.family_id,
                    invite_id = %invite.id,
                    user_id,
                    "invite code redeemed"
                );
                return Ok(invite.family_id);
            }
            Err(StoreError::AlreadyExists { .. }) => {
                return Err(AppError::Invite(InviteRejection::AlreadyMember));
            }
            Err(StoreError::PreconditionFailed { .. }) => {
                tracing::debug!(attempt, invite_id = %invite.id, "invite code changed concurrently, retrying");
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(AppError::Invite(InviteRejection::NotFound));
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(user_id, "invite redemption kept losing to concurrent updates");
    Err(AppError::Conflict(
        "The invite code is busy, please try again".into(),
    ))
}

/// Idempotent: deactivating an inactive code succeeds.
pub async fn deactivate_invite_code(
    store: &DocumentStore,
    code: &str,
) -> Result<InviteCode, AppError> {
    let invite = get_invite_code_by_code(store, code)
        .await?
        .ok_or_else(|| AppError::NotFound("Invite code not found".into()))?;
    deactivate_invite_code_by_id(store, &invite.id).await
}

pub async fn deactivate_invite_code_by_id(
    store: &DocumentStore,
    invite_id: &str,
) -> Result<InviteCode, AppError> {
    store
        .update(INVITE_CODES, invite_id, Update::new().set("isActive", false))
        .await
        .map_err(not_found("Invite code"))?;
    tracing::info!(invite_id, "invite code deactivated");

    get_invite_code(store, invite_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Invite code not found".into()))
}

pub async fn list_family_invite_codes(
    store: &DocumentStore,
    family_id: &str,
) -> Result<Vec<InviteCode>, AppError> {
    let docs = store
        .query(
            &Query::new(INVITE_CODES)
                .where_eq("familyId", family_id)
                .order_by("createdAt", Direction::Desc),
        )
        .await?;
    Ok(decode_all(&docs)?)
}

pub async fn get_active_invite_codes(
    store: &DocumentStore,
    family_id: &str,
) -> Result<Vec<InviteCode>, AppError> {
    let docs = store
        .query(
            &Query::new(INVITE_CODES)
                .where_eq("familyId", family_id)
                .where_eq("isActive", true)
                .filter("expiresAt", Op::Gt, timestamp(Utc::now()))
                .order_by("expiresAt", Direction::Desc)
                .order_by("createdAt", Direction::Desc),
        )
        .await?;
    Ok(decode_all(&docs)?)
}

/// Deletes inactive codes that expired more than the retention window ago.
/// Meant for periodic invocation outside the request path.
pub async fn delete_expired_invite_codes(
    store: &DocumentStore,
    config: &InviteConfig,
) -> Result<usize, AppError> {
    let cutoff = Utc::now() - Duration::days(config.retention_days);
    let docs = store
        .query(
            &Query::new(INVITE_CODES)
                .where_eq("isActive", false)
                .filter("expiresAt", Op::Lt, timestamp(cutoff)),
        )
        .await?;

    let mut batch = WriteBatch::new();
    for doc in &docs {
        batch.delete(INVITE_CODES, &doc.id);
    }
    store.commit(batch).await?;

    tracing::info!(deleted = docs.len(), %cutoff, "expired invite codes deleted");
    Ok(docs.len())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::models::family::Family;
    use crate::services::family::require_family;
    use crate::services::member::{get_member, list_members};
    use crate::services::test_support::{family_owned_by, memory_store};

    async fn issue(
        store: &DocumentStore,
        family: &Family,
        max_uses: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> InviteCode {
        create_invite_code(
            store,
            &InviteConfig::default(),
            CreateInviteCode {
                family_id: family.id.clone(),
                created_by: family.owner_id.clone(),
                max_uses,
                expires_at,
            },
        )
        .await
        .unwrap()
    }

    async fn redeem(store: &DocumentStore, code: &str, user_id: &str) -> Result<String, AppError> {
        redeem_invite_code(store, &InviteConfig::default(), code, user_id, user_id, None).await
    }

    fn rejection(result: Result<String, AppError>) -> InviteRejection {
        match result {
            Err(AppError::Invite(r)) => r,
            other => panic!("expected an invite rejection, got {other:?}"),
        }
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        for length in [6, 8] {
            for _ in 0..200 {
                let code = generate_code(length);
                assert_eq!(code.len(), length);
                assert!(code
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code("  ab12cd\n"), "AB12CD");
    }

    #[tokio::test]
    async fn created_code_has_defaults() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, None).await;

        assert_eq!(invite.code.len(), 6);
        assert_eq!(invite.max_uses, 1);
        assert_eq!(invite.used_count, 0);
        assert!(invite.used_by.is_empty());
        assert!(invite.is_active);
        assert_eq!(invite.expires_at - invite.created_at, Duration::days(7));

        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.code, invite.code);
        assert_eq!(stored.expires_at.timestamp_millis(), invite.expires_at.timestamp_millis());
    }

    #[tokio::test]
    async fn zero_max_uses_is_rejected() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let result = create_invite_code(
            &store,
            &InviteConfig::default(),
            CreateInviteCode {
                family_id: family.id.clone(),
                created_by: "owner".to_string(),
                max_uses: Some(0),
                expires_at: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn sequential_codes_are_unique() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let config = InviteConfig {
            code_length: 2,
            ..InviteConfig::default()
        };

        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let invite = create_invite_code(
                &store,
                &config,
                CreateInviteCode {
                    family_id: family.id.clone(),
                    created_by: "owner".to_string(),
                    max_uses: None,
                    expires_at: None,
                },
            )
            .await
            .unwrap();
            assert!(seen.insert(invite.code));
        }
    }

    #[tokio::test]
    async fn generation_gives_up_when_every_code_is_taken() {
        let store = memory_store();
        let mut batch = WriteBatch::new();
        for c in CODE_ALPHABET {
            let code = (*c as char).to_string();
            batch.set(INVITE_CODES, &code, serde_json::json!({ "code": code }));
        }
        store.commit(batch).await.unwrap();

        let config = InviteConfig {
            code_length: 1,
            ..InviteConfig::default()
        };
        let result = create_invite_code(
            &store,
            &config,
            CreateInviteCode {
                family_id: "f".to_string(),
                created_by: "owner".to_string(),
                max_uses: None,
                expires_at: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn fresh_code_is_valid() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, None).await;

        let family_id = validate_invite_code(&store, &invite.code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(family_id, family.id);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let store = memory_store();
        assert_eq!(
            rejection(validate_invite_code(&store, "ZZZZZZ").await),
            InviteRejection::NotFound
        );
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_if_unused() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(5), Some(Utc::now() - Duration::minutes(1))).await;

        assert_eq!(
            rejection(validate_invite_code(&store, &invite.code).await),
            InviteRejection::Expired
        );
    }

    #[tokio::test]
    async fn usage_limit_is_reported_regardless_of_expiry() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(2), None).await;
        // Exhausted but still flagged active.
        store
            .update(INVITE_CODES, &invite.id, Update::new().set("usedCount", 2))
            .await
            .unwrap();

        assert_eq!(
            rejection(validate_invite_code(&store, &invite.code).await),
            InviteRejection::UsageLimitReached
        );
    }

    #[tokio::test]
    async fn deactivated_code_is_rejected_first() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, Some(Utc::now() - Duration::days(1))).await;
        deactivate_invite_code(&store, &invite.code).await.unwrap();

        assert_eq!(
            rejection(validate_invite_code(&store, &invite.code).await),
            InviteRejection::Deactivated
        );
    }

    #[tokio::test]
    async fn single_use_code_redeems_once() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, None).await;

        let family_id = redeem(&store, &invite.code, "kid").await.unwrap();
        assert_eq!(family_id, family.id);

        let member = get_member(&store, &family.id, "kid").await.unwrap().unwrap();
        assert_eq!(member.role, MemberRole::Child);
        assert_eq!(member.relation, Relation::Other);
        assert_eq!(member.invited_by.as_deref(), Some("owner"));
        assert_eq!(list_members(&store, &family.id).await.unwrap().len(), 2);
        assert_eq!(require_family(&store, &family.id).await.unwrap().member_count, 2);

        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
        assert_eq!(stored.used_by, vec!["kid".to_string()]);
        assert!(!stored.is_active);

        assert_eq!(
            rejection(redeem(&store, &invite.code, "cousin").await),
            InviteRejection::UsageLimitReached
        );
        assert!(get_member(&store, &family.id, "cousin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn two_use_code_scenario() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(2), None).await;

        redeem(&store, &invite.code, "a").await.unwrap();
        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
        assert!(stored.is_active);

        redeem(&store, &invite.code, "b").await.unwrap();
        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 2);
        assert!(!stored.is_active);
        assert_eq!(stored.used_by, vec!["a".to_string(), "b".to_string()]);

        assert_eq!(
            rejection(redeem(&store, &invite.code, "c").await),
            InviteRejection::UsageLimitReached
        );
        assert_eq!(
            rejection(validate_invite_code(&store, &invite.code).await),
            InviteRejection::UsageLimitReached
        );
        assert!(get_member(&store, &family.id, "c").await.unwrap().is_none());
        assert_eq!(require_family(&store, &family.id).await.unwrap().member_count, 3);
    }

    #[tokio::test]
    async fn existing_member_cannot_redeem_and_code_is_untouched() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(3), None).await;

        assert_eq!(
            rejection(redeem(&store, &invite.code, "owner").await),
            InviteRejection::AlreadyMember
        );

        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 0);
        assert!(stored.used_by.is_empty());
        assert!(stored.is_active);
        assert_eq!(require_family(&store, &family.id).await.unwrap().member_count, 1);
    }

    fn redemption<'a>(code: &'a str, user_id: &'a str) -> Redemption<'a> {
        Redemption {
            code,
            user_id,
            display_name: user_id,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn redemption_retries_after_losing_a_race_on_a_multi_use_code() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(3), None).await;

        // "b" redeems between "a" reading the code and committing.
        let calls = Cell::new(0);
        let (store_ref, code) = (&store, invite.code.as_str());
        let result = redeem_with(&store, &InviteConfig::default(), &redemption(code, "a"), || {
            calls.set(calls.get() + 1);
            let first = calls.get() == 1;
            async move {
                if first {
                    redeem(store_ref, code, "b").await.unwrap();
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), family.id);
        assert_eq!(calls.get(), 2);
        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 2);
        assert!(stored.is_active);
        assert_eq!(stored.used_by, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(require_family(&store, &family.id).await.unwrap().member_count, 3);
    }

    #[tokio::test]
    async fn losing_the_last_use_reports_the_usage_limit() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, None).await;

        let (store_ref, code) = (&store, invite.code.as_str());
        let mut raced = false;
        let result = redeem_with(&store, &InviteConfig::default(), &redemption(code, "a"), || {
            let first = !raced;
            raced = true;
            async move {
                if first {
                    redeem(store_ref, code, "b").await.unwrap();
                }
            }
        })
        .await;

        assert_eq!(rejection(result), InviteRejection::UsageLimitReached);
        assert!(get_member(&store, &family.id, "a").await.unwrap().is_none());
        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 1);
        assert_eq!(stored.used_by, vec!["b".to_string()]);
        assert_eq!(require_family(&store, &family.id).await.unwrap().member_count, 2);
    }

    #[tokio::test]
    async fn persistent_contention_gives_up_with_a_conflict() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(100), None).await;
        let config = InviteConfig {
            redeem_attempts: 3,
            ..InviteConfig::default()
        };

        let calls = Cell::new(0);
        let (store_ref, invite_id) = (&store, invite.id.as_str());
        let result = redeem_with(&store, &config, &redemption(&invite.code, "a"), || {
            calls.set(calls.get() + 1);
            async move {
                store_ref
                    .update(INVITE_CODES, invite_id, Update::new().increment("usedCount", 1))
                    .await
                    .unwrap();
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.get(), 3);
        assert!(get_member(&store, &family.id, "a").await.unwrap().is_none());
        let stored = get_invite_code(&store, &invite.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 3);
        assert!(stored.used_by.is_empty());
    }

    #[tokio::test]
    async fn stale_read_loses_to_a_concurrent_redemption() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, None, None).await;

        // A batch built from a stale read of the code must not commit once
        // another redemption has landed.
        redeem(&store, &invite.code, "a").await.unwrap();
        let mut batch = WriteBatch::new();
        batch
            .require(
                INVITE_CODES,
                &invite.id,
                vec![
                    Filter::eq("isActive", true),
                    Filter::eq("usedCount", invite.used_count),
                ],
            )
            .update(INVITE_CODES, &invite.id, Update::new().increment("usedCount", 1));
        assert!(matches!(
            store.commit(batch).await,
            Err(StoreError::PreconditionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn deactivation_is_idempotent() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let invite = issue(&store, &family, Some(3), None).await;

        let first = deactivate_invite_code(&store, &invite.code).await.unwrap();
        assert!(!first.is_active);
        let second = deactivate_invite_code(&store, &invite.code).await.unwrap();
        assert!(!second.is_active);
        let by_id = deactivate_invite_code_by_id(&store, &invite.id).await.unwrap();
        assert!(!by_id.is_active);

        assert!(matches!(
            deactivate_invite_code(&store, "NOPE00").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            deactivate_invite_code_by_id(&store, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn active_listing_filters_family_state_and_expiry() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;
        let other = family_owned_by(&store, "neighbour").await;

        let soon = issue(&store, &family, None, Some(Utc::now() + Duration::days(1))).await;
        let later = issue(&store, &family, None, Some(Utc::now() + Duration::days(3))).await;
        let inactive = issue(&store, &family, None, None).await;
        deactivate_invite_code(&store, &inactive.code).await.unwrap();
        let expired = issue(&store, &family, None, Some(Utc::now() - Duration::hours(1))).await;
        issue(&store, &other, None, None).await;

        let active = get_active_invite_codes(&store, &family.id).await.unwrap();
        let ids: Vec<_> = active.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, [later.id.as_str(), soon.id.as_str()]);

        let all = list_family_invite_codes(&store, &family.id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().any(|i| i.id == expired.id));
    }

    #[tokio::test]
    async fn cleanup_deletes_only_old_inactive_codes() {
        let store = memory_store();
        let family = family_owned_by(&store, "owner").await;

        let old_inactive = issue(&store, &family, None, Some(Utc::now() - Duration::days(10))).await;
        deactivate_invite_code(&store, &old_inactive.code).await.unwrap();
        let old_active = issue(&store, &family, None, Some(Utc::now() - Duration::days(10))).await;
        let recent_inactive =
            issue(&store, &family, None, Some(Utc::now() - Duration::days(2))).await;
        deactivate_invite_code(&store, &recent_inactive.code).await.unwrap();

        let deleted = delete_expired_invite_codes(&store, &InviteConfig::default())
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        assert!(get_invite_code(&store, &old_inactive.id).await.unwrap().is_none());
        assert!(get_invite_code(&store, &old_active.id).await.unwrap().is_some());
        assert!(get_invite_code(&store, &recent_inactive.id).await.unwrap().is_some());
    }
}
