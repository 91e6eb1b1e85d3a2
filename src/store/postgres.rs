use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::value;
use super::{Direction, Document, Op, Query, StoreError, Write, WriteBatch};

/// Documents live in a single `documents` table as JSONB, keyed by
/// `(collection, id)`. Batches run in one transaction; documents read by
/// preconditions and updates are locked with `FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn field_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn comparison(op: Op) -> &'static str {
    match op {
        Op::Eq => " = ",
        Op::Ne => " <> ",
        Op::Lt => " < ",
        Op::Le => " <= ",
        Op::Gt => " > ",
        Op::Ge => " >= ",
        Op::ArrayContains => " @> ",
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, Json(data))| Document { id, data }))
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
        qb.push_bind(query.collection.clone());

        for filter in &query.filters {
            qb.push(" AND data #> ");
            qb.push_bind(field_path(&filter.field));
            qb.push(comparison(filter.op));
            let operand = match filter.op {
                Op::ArrayContains => Value::Array(vec![filter.value.clone()]),
                _ => filter.value.clone(),
            };
            qb.push_bind(Json(operand));
        }

        for (i, (field, direction)) in query.order_by.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY data #> " } else { ", data #> " });
            qb.push_bind(field_path(field));
            qb.push(match direction {
                Direction::Asc => " ASC NULLS FIRST",
                Direction::Desc => " DESC NULLS LAST",
            });
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build_query_as::<(String, Json<Value>)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, Json(data))| Document { id, data })
            .collect())
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for p in &batch.preconditions {
            let holds = lock_document(&mut tx, &p.collection, &p.id)
                .await?
                .is_some_and(|data| value::matches(&data, &p.filters));
            if !holds {
                return Err(StoreError::PreconditionFailed {
                    collection: p.collection.clone(),
                    id: p.id.clone(),
                });
            }
        }

        for write in batch.writes {
            match write {
                Write::Create {
                    collection,
                    id,
                    data,
                } => {
                    let result = sqlx::query(
                        "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
                         ON CONFLICT (collection, id) DO NOTHING",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(StoreError::AlreadyExists { collection, id });
                    }
                }
                Write::Set {
                    collection,
                    id,
                    data,
                } => {
                    sqlx::query(
                        "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
                         ON CONFLICT (collection, id)
                         DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                }
                Write::Update {
                    collection,
                    id,
                    update,
                } => {
                    let Some(mut data) = lock_document(&mut tx, &collection, &id).await? else {
                        return Err(StoreError::NotFound { collection, id });
                    };
                    value::apply(&mut data, &update);
                    sqlx::query(
                        "UPDATE documents SET data = $3, updated_at = now()
                         WHERE collection = $1 AND id = $2",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                }
                Write::Delete { collection, id } => {
                    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                        .bind(&collection)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn lock_document(
    tx: &mut Transaction<'_, Postgres>,
    collection: &str,
    id: &str,
) -> Result<Option<Value>, StoreError> {
    let row = sqlx::query_scalar::<_, Json<Value>>(
        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|Json(data)| data))
}
