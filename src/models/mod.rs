pub mod family;
pub mod invite;

/// Collection names and document paths.
pub mod collections {
    pub const FAMILIES: &str = "families";
    pub const USER_FAMILIES: &str = "userFamilies";
    pub const INVITE_CODES: &str = "inviteCodes";

    pub fn members(family_id: &str) -> String {
        format!("{FAMILIES}/{family_id}/members")
    }

    pub fn user_family_id(user_id: &str, family_id: &str) -> String {
        format!("{user_id}_{family_id}")
    }
}
