use crate::{Error, Pool};
use futures::Stream;
use serde_json::value::RawValue;
use tokio_stream::wrappers::ReceiverStream;

/// An AQL query to execute through the server-side cursor API.
#[derive(Clone, Debug)]
pub struct CursorQuery {
    pub database: String,
    pub query: String,
    pub bind_vars: serde_json::Map<String, serde_json::Value>,
    pub batch_size: usize,
}

#[derive(serde::Serialize)]
struct CreateCursor<'a> {
    query: &'a str,
    #[serde(rename = "bindVars")]
    bind_vars: &'a serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "batchSize")]
    batch_size: usize,
}

#[derive(serde::Deserialize)]
struct CursorResponse {
    #[serde(default)]
    id: Option<String>,
    result: Vec<Box<RawValue>>,
    #[serde(default, rename = "hasMore")]
    has_more: bool,
}

/// One page of documents, in the server's emission order. Documents are kept
/// as raw JSON so the consumer decides how to parse them.
pub struct CursorBatch {
    pub documents: Vec<Box<RawValue>>,
}

/// A lazy stream of cursor batches.
///
/// Pagination runs in a background task which keeps at most `prefetch` batches
/// buffered ahead of the consumer; when the consumer stalls, the bounded
/// channel fills and pagination halts until space frees up. Dropping the
/// stream stops pagination at its next yield point and fires a best-effort
/// `DELETE` for the server-side cursor.
pub struct CursorStream {
    inner: ReceiverStream<crate::Result<CursorBatch>>,
}

impl CursorStream {
    pub fn open(pool: Pool, query: CursorQuery, prefetch: usize) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(prefetch.max(1));
        tokio::spawn(paginate(pool, query, tx));

        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for CursorStream {
    type Item = crate::Result<CursorBatch>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn paginate(
    pool: Pool,
    query: CursorQuery,
    tx: tokio::sync::mpsc::Sender<crate::Result<CursorBatch>>,
) {
    let create_path = cursor_path(&query.database, None);
    let body = CreateCursor {
        query: &query.query,
        bind_vars: &query.bind_vars,
        batch_size: query.batch_size,
    };

    let mut response: CursorResponse = match pool.post_json(&create_path, &body).await {
        Ok(response) => response,
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            return;
        }
    };

    loop {
        let batch = CursorBatch {
            documents: std::mem::take(&mut response.result),
        };
        let cursor_id = response.id.clone();
        let has_more = response.has_more;

        if tx.send(Ok(batch)).await.is_err() {
            // Consumer went away; release the server-side cursor.
            if let (Some(id), true) = (&cursor_id, has_more) {
                delete_cursor(&pool, &query.database, id).await;
            }
            return;
        }

        if !has_more {
            return;
        }
        let Some(id) = cursor_id else {
            let _ = tx
                .send(Err(Error::Decode {
                    context: "cursor reported hasMore without an id".to_string(),
                }))
                .await;
            return;
        };

        response = match pool.put_json(&cursor_path(&query.database, Some(&id))).await {
            Ok(response) => response,
            Err(err) => {
                let _ = tx.send(Err(lost_if_transient(err, &id))).await;
                delete_cursor(&pool, &query.database, &id).await;
                return;
            }
        };
    }
}

/// A transport failure that survived the pool's retries means the server-held
/// cursor state is unrecoverable; the caller must re-plan the shard.
fn lost_if_transient(err: Error, cursor_id: &str) -> Error {
    if err.is_transient() {
        Error::CursorLost {
            cursor_id: cursor_id.to_string(),
        }
    } else {
        err
    }
}

async fn delete_cursor(pool: &Pool, database: &str, id: &str) {
    if let Err(err) = pool.delete(&cursor_path(database, Some(id))).await {
        tracing::debug!(cursor_id = id, error = %err, "best-effort cursor delete failed");
    }
}

fn cursor_path(database: &str, cursor_id: Option<&str>) -> String {
    match cursor_id {
        Some(id) => format!("/_db/{database}/_api/cursor/{id}"),
        None => format!("/_db/{database}/_api/cursor"),
    }
}

/// Fetch a collection's document count with a single round-trip.
pub async fn count_documents(pool: &Pool, database: &str, collection: &str) -> crate::Result<u64> {
    let mut bind_vars = serde_json::Map::new();
    bind_vars.insert(
        "@collection".to_string(),
        serde_json::Value::String(collection.to_string()),
    );
    let body = CreateCursor {
        query: "RETURN LENGTH(@@collection)",
        bind_vars: &bind_vars,
        batch_size: 1,
    };

    let response: CursorResponse = pool.post_json(&cursor_path(database, None), &body).await?;

    let raw = response.result.first().ok_or_else(|| Error::Decode {
        context: format!("empty count result for collection '{collection}'"),
    })?;
    serde_json::from_str(raw.get()).map_err(|err| Error::Decode {
        context: format!("count of collection '{collection}': {err}"),
    })
}
