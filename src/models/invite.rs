use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub id: String,
    pub family_id: String,
    pub code: String,
    pub created_by: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub used_count: u32,
    pub used_by: Vec<String>,
    pub is_active: bool,
}

impl InviteCode {
    /// Checks are ordered: deactivation, then expiry, then usage limit. A code
    /// switched off by its last redemption reports the usage limit.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), InviteRejection> {
        if !self.is_active {
            return Err(if self.used_count >= self.max_uses {
                InviteRejection::UsageLimitReached
            } else {
                InviteRejection::Deactivated
            });
        }
        if now >= self.expires_at {
            return Err(InviteRejection::Expired);
        }
        if self.used_count >= self.max_uses {
            return Err(InviteRejection::UsageLimitReached);
        }
        Ok(())
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }
}

/// Why an invite code cannot be used. Callers branch on the variant and show
/// [`InviteRejection::message`] to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteRejection {
    NotFound,
    Deactivated,
    Expired,
    UsageLimitReached,
    AlreadyMember,
}

impl InviteRejection {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Invalid invite code",
            Self::Deactivated => "This invite code has been deactivated",
            Self::Expired => "This invite code has expired",
            Self::UsageLimitReached => "This invite code has reached its usage limit",
            Self::AlreadyMember => "Already a member of this family, or joining failed",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub max_uses: Option<u32>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InviteCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemInviteRequest {
    pub code: String,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvitesParams {
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateInviteResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InviteRejection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemInviteResponse {
    pub success: bool,
    pub family_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invite(is_active: bool, used_count: u32, max_uses: u32) -> InviteCode {
        let now = Utc::now();
        InviteCode {
            id: "i".to_string(),
            family_id: "f".to_string(),
            code: "ABC123".to_string(),
            created_by: "owner".to_string(),
            created_at: now,
            expires_at: now + Duration::days(7),
            max_uses,
            used_count,
            used_by: Vec::new(),
            is_active,
        }
    }

    #[test]
    fn exhausted_code_reports_usage_limit_once_switched_off() {
        let now = Utc::now();
        assert_eq!(
            invite(false, 2, 2).check(now),
            Err(InviteRejection::UsageLimitReached)
        );
        assert_eq!(
            invite(true, 2, 2).check(now),
            Err(InviteRejection::UsageLimitReached)
        );
    }

    #[test]
    fn manually_deactivated_code_reports_deactivation() {
        let now = Utc::now();
        assert_eq!(invite(false, 0, 2).check(now), Err(InviteRejection::Deactivated));
        assert_eq!(invite(true, 1, 2).check(now), Ok(()));
        assert!(!invite(true, 0, 1).is_usable(now + Duration::days(8)));
    }
}
