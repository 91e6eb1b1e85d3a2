use serde::Serialize;

use crate::models::family::{Family, MemberRole};

/// What a user may do within one family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(skip)]
    user_id: Option<String>,
    pub role: Option<MemberRole>,
    pub is_member: bool,
    pub is_admin: bool,
    pub is_owner: bool,
    pub can_edit_family: bool,
    pub can_delete_family: bool,
    pub can_invite_member: bool,
    pub can_remove_member: bool,
    pub can_create_board: bool,
    pub can_pin_post: bool,
    pub can_post: bool,
    pub can_comment: bool,
}

impl Permissions {
    /// `role` is the user's role in `family`, if they are a member. Without a
    /// user or a family every permission is denied.
    pub fn resolve(
        family: Option<&Family>,
        user_id: Option<&str>,
        role: Option<MemberRole>,
    ) -> Self {
        let (Some(family), Some(user_id)) = (family, user_id) else {
            return Self::default();
        };

        let is_owner = family.is_owner(user_id);
        let is_admin = family.is_admin(user_id);
        let is_member = role.is_some() || is_owner;
        let is_child = role == Some(MemberRole::Child);

        Self {
            user_id: Some(user_id.to_string()),
            role,
            is_member,
            is_admin,
            is_owner,
            can_edit_family: is_admin,
            can_delete_family: is_owner,
            can_invite_member: is_admin,
            can_remove_member: is_admin,
            can_create_board: is_admin,
            can_pin_post: is_admin,
            can_post: is_member && (!is_child || family.settings.allow_children_to_post),
            can_comment: is_member && (!is_child || family.settings.allow_children_to_comment),
        }
    }

    fn is_author(&self, author_id: &str) -> bool {
        self.user_id.as_deref() == Some(author_id)
    }

    pub fn can_edit_post(&self, author_id: &str) -> bool {
        self.is_author(author_id)
    }

    pub fn can_delete_post(&self, author_id: &str) -> bool {
        self.is_admin || self.is_author(author_id)
    }

    pub fn can_delete_comment(&self, author_id: &str) -> bool {
        self.is_admin || self.is_author(author_id)
    }
}
