//! Domain operations over the document store. Every function takes the store
//! (and caller identity, where relevant) as explicit arguments.

pub mod family;
pub mod invitation;
pub mod member;
pub mod permission;

use crate::error::AppError;
use crate::store::StoreError;

/// Maps a missing document (or a failed existence precondition) to a
/// `NotFound` for `what`; other store errors pass through.
fn not_found(what: &'static str) -> impl FnOnce(StoreError) -> AppError {
    move |e| match e {
        StoreError::NotFound { .. } | StoreError::PreconditionFailed { .. } => {
            AppError::NotFound(format!("{what} not found"))
        }
        e => e.into(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::family::{Family, Relation};
    use crate::store::{DocumentStore, MemoryStore};

    use super::family::{self, CreateFamily};

    pub fn memory_store() -> DocumentStore {
        DocumentStore::Memory(MemoryStore::new())
    }

    pub async fn family_owned_by(store: &DocumentStore, owner_id: &str) -> Family {
        family::create_family(
            store,
            CreateFamily {
                name: "Tanaka".to_string(),
                description: None,
                owner_id: owner_id.to_string(),
                owner_name: "Dad".to_string(),
                owner_relation: Relation::Father,
                owner_photo_url: None,
            },
        )
        .await
        .unwrap()
    }
}
