use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::value;
use super::{Direction, Document, Query, StoreError, Write, WriteBatch};

type Collections = HashMap<String, BTreeMap<String, Value>>;
type DocKey = (String, String);

/// In-process store. A batch commits under a single lock, which makes it
/// atomic with respect to every other operation on the same store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let data = self
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        Ok(data.map(|data| Document {
            id: id.to_string(),
            data,
        }))
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .lock()
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| value::matches(data, &query.filters))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        docs.sort_by(|a, b| {
            for (field, direction) in &query.order_by {
                let ord = value::sort_order(
                    value::get_path(&a.data, field),
                    value::get_path(&b.data, field),
                );
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut collections = self.lock();

        for p in &batch.preconditions {
            let holds = collections
                .get(&p.collection)
                .and_then(|docs| docs.get(&p.id))
                .is_some_and(|data| value::matches(data, &p.filters));
            if !holds {
                return Err(StoreError::PreconditionFailed {
                    collection: p.collection.clone(),
                    id: p.id.clone(),
                });
            }
        }

        // Writes are staged first so a failing write leaves the store untouched.
        let mut staged: HashMap<DocKey, Option<Value>> = HashMap::new();
        for write in batch.writes {
            match write {
                Write::Create {
                    collection,
                    id,
                    data,
                } => {
                    let key = (collection, id);
                    if current(&collections, &staged, &key).is_some() {
                        let (collection, id) = key;
                        return Err(StoreError::AlreadyExists { collection, id });
                    }
                    staged.insert(key, Some(data));
                }
                Write::Set {
                    collection,
                    id,
                    data,
                } => {
                    staged.insert((collection, id), Some(data));
                }
                Write::Update {
                    collection,
                    id,
                    update,
                } => {
                    let key = (collection, id);
                    let Some(mut data) = current(&collections, &staged, &key).cloned() else {
                        let (collection, id) = key;
                        return Err(StoreError::NotFound { collection, id });
                    };
                    value::apply(&mut data, &update);
                    staged.insert(key, Some(data));
                }
                Write::Delete { collection, id } => {
                    staged.insert((collection, id), None);
                }
            }
        }

        for ((collection, id), data) in staged {
            match data {
                Some(data) => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                None => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

fn current<'a>(
    collections: &'a Collections,
    staged: &'a HashMap<DocKey, Option<Value>>,
    key: &DocKey,
) -> Option<&'a Value> {
    match staged.get(key) {
        Some(data) => data.as_ref(),
        None => collections.get(&key.0).and_then(|docs| docs.get(&key.1)),
    }
}
