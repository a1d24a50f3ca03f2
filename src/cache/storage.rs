//! SQLite implementation of the response store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::traits::{CachedEntry, Store};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Row shape shared by the lookup queries.
type EntryRow = (String, i64, String, Vec<u8>, String);

const SELECT_ENTRY: &str = "SELECT p.name, e.status, e.headers, e.body, e.cached_at
   FROM entries e INNER JOIN partitions p ON p.id = e.partition_id";

/// SQLite-based store. Queries run on the blocking thread pool so a slow disk
/// never stalls the async executor.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  pub fn new(db: Database) -> Self {
    Self {
      conn: Arc::new(Mutex::new(db.into_conn())),
    }
  }

  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let mut conn = conn
        .lock()
        .map_err(|e| Error::StoreUnavailable(format!("lock poisoned: {}", e)))?;
      f(&mut *conn).map_err(Error::from)
    })
    .await
    .map_err(|e| Error::StoreUnavailable(format!("store task failed: {}", e)))?
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn open(&self, partition: &str) -> Result<()> {
    let partition = partition.to_string();
    self
      .with_conn(move |conn| ensure_partition(conn, &partition).map(|_| ()))
      .await
  }

  async fn get(&self, partition: &str, request: &Request) -> Result<Option<CachedEntry>> {
    let partition = partition.to_string();
    let key = request.cache_key();
    let row = self
      .with_conn(move |conn| {
        conn
          .query_row(
            &format!("{SELECT_ENTRY} WHERE p.name = ? AND e.request_key = ?"),
            params![partition, key],
            read_row,
          )
          .optional()
      })
      .await?;
    row.map(decode_entry).transpose()
  }

  async fn match_any(&self, request: &Request) -> Result<Option<CachedEntry>> {
    let key = request.cache_key();
    let row = self
      .with_conn(move |conn| {
        conn
          .query_row(
            &format!("{SELECT_ENTRY} WHERE e.request_key = ? ORDER BY p.id LIMIT 1"),
            params![key],
            read_row,
          )
          .optional()
      })
      .await?;
    row.map(decode_entry).transpose()
  }

  async fn put(&self, partition: &str, request: &Request, response: &Response) -> Result<()> {
    let entries = vec![(request.clone(), response.clone())];
    self.put_all(partition, &entries).await
  }

  async fn put_all(&self, partition: &str, entries: &[(Request, Response)]) -> Result<()> {
    let partition = partition.to_string();
    let rows = entries
      .iter()
      .map(|(request, response)| {
        let headers = serde_json::to_string(&response.headers)
          .map_err(|e| Error::StoreUnavailable(format!("Failed to encode headers: {}", e)))?;
        Ok((
          request.cache_key(),
          request.method().to_string(),
          request.url().to_string(),
          response.status,
          headers,
          response.body.clone(),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let partition_id = ensure_partition(&tx, &partition)?;
        for (key, method, url, status, headers, body) in &rows {
          tx.execute(
            "INSERT OR REPLACE INTO entries
               (partition_id, request_key, method, url, status, headers, body, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
            params![partition_id, key, method, url, status, headers, body.as_ref()],
          )?;
        }
        tx.commit()
      })
      .await
  }

  async fn delete_partition(&self, partition: &str) -> Result<bool> {
    let partition = partition.to_string();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM entries WHERE partition_id IN (SELECT id FROM partitions WHERE name = ?)",
          params![partition],
        )?;
        let removed = tx.execute("DELETE FROM partitions WHERE name = ?", params![partition])?;
        tx.commit()?;
        Ok(removed > 0)
      })
      .await
  }

  async fn partition_names(&self) -> Result<Vec<String>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id")?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await
  }

  async fn keys(&self, partition: &str) -> Result<Vec<String>> {
    let partition = partition.to_string();
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT e.url FROM entries e INNER JOIN partitions p ON p.id = e.partition_id
           WHERE p.name = ? ORDER BY e.url",
        )?;
        let urls = stmt
          .query_map(params![partition], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(urls)
      })
      .await
  }
}

/// Return the id of the named partition, creating it when absent.
fn ensure_partition(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
  conn.execute(
    "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
    params![name],
  )?;
  conn.query_row(
    "SELECT id FROM partitions WHERE name = ?",
    params![name],
    |row| row.get(0),
  )
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
  ))
}

fn decode_entry((partition, status, headers, body, cached_at): EntryRow) -> Result<CachedEntry> {
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| Error::StoreUnavailable(format!("Failed to decode headers: {}", e)))?;
  let status = u16::try_from(status)
    .map_err(|_| Error::StoreUnavailable(format!("Stored status out of range: {}", status)))?;

  Ok(CachedEntry {
    response: Response {
      status,
      headers,
      body: Bytes::from(body),
    },
    partition,
    cached_at: parse_datetime(&cached_at)?,
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::StoreUnavailable(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> SqliteStore {
    SqliteStore::new(Database::open_in_memory().unwrap())
  }

  fn request(url: &str) -> Request {
    Request::parse("GET", url, None).unwrap()
  }

  #[tokio::test]
  async fn test_put_then_get_is_byte_identical() {
    let store = store();
    let req = request("https://example.com/logo.png");
    let resp = Response::new(200, vec![0u8, 159, 146, 150, 255]).with_header("content-type", "image/png");

    store.put("dynamic", &req, &resp).await.unwrap();
    let entry = store.get("dynamic", &req).await.unwrap().unwrap();

    assert_eq!(entry.response, resp);
    assert_eq!(entry.partition, "dynamic");
  }

  #[tokio::test]
  async fn test_put_overwrites() {
    let store = store();
    let req = request("https://example.com/api/games");

    store.put("dynamic", &req, &Response::new(200, "old")).await.unwrap();
    store.put("dynamic", &req, &Response::new(200, "new")).await.unwrap();

    let entry = store.get("dynamic", &req).await.unwrap().unwrap();
    assert_eq!(entry.response.body, "new");
    assert_eq!(store.keys("dynamic").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_get_is_scoped_to_partition() {
    let store = store();
    let req = request("https://example.com/");
    store.put("static", &req, &Response::new(200, "home")).await.unwrap();

    assert!(store.get("dynamic", &req).await.unwrap().is_none());
    assert!(store.get("static", &req).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_match_any_prefers_oldest_partition() {
    let store = store();
    let req = request("https://example.com/");
    store.open("static").await.unwrap();
    store.put("dynamic", &req, &Response::new(200, "dynamic")).await.unwrap();
    store.put("static", &req, &Response::new(200, "static")).await.unwrap();

    let entry = store.match_any(&req).await.unwrap().unwrap();
    assert_eq!(entry.partition, "static");
    assert_eq!(entry.response.body, "static");

    let missing = request("https://example.com/nope");
    assert!(store.match_any(&missing).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_open_is_idempotent() {
    let store = store();
    store.open("static").await.unwrap();
    store.open("static").await.unwrap();
    store.open("dynamic").await.unwrap();

    assert_eq!(store.partition_names().await.unwrap(), vec!["static", "dynamic"]);
  }

  #[tokio::test]
  async fn test_delete_partition() {
    let store = store();
    let req = request("https://example.com/a");
    store.put("old-v0", &req, &Response::new(200, "a")).await.unwrap();

    assert!(store.delete_partition("old-v0").await.unwrap());
    assert!(!store.delete_partition("old-v0").await.unwrap());
    assert!(store.partition_names().await.unwrap().is_empty());
    assert!(store.match_any(&req).await.unwrap().is_none());
    assert!(store.keys("old-v0").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_put_all_writes_every_entry() {
    let store = store();
    let entries = vec![
      (request("https://example.com/"), Response::new(200, "home")),
      (request("https://example.com/index.html"), Response::new(200, "index")),
    ];

    store.put_all("static", &entries).await.unwrap();

    assert_eq!(
      store.keys("static").await.unwrap(),
      vec!["https://example.com/", "https://example.com/index.html"]
    );
  }

  #[tokio::test]
  async fn test_put_all_rolls_back_on_failure() {
    let store = store();
    store
      .with_conn(|conn| {
        conn.execute_batch(
          "CREATE TRIGGER reject_broken BEFORE INSERT ON entries
           WHEN NEW.url LIKE '%/broken'
           BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
      })
      .await
      .unwrap();

    let entries = vec![
      (request("https://example.com/"), Response::new(200, "home")),
      (request("https://example.com/broken"), Response::new(200, "broken")),
    ];

    assert!(matches!(
      store.put_all("static", &entries).await,
      Err(Error::StoreUnavailable(_))
    ));
    assert!(store.keys("static").await.unwrap().is_empty());
    assert!(store.partition_names().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_puts_to_one_partition() {
    let store = store();
    let handles: Vec<_> = (0..16)
      .map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
          let req = request(&format!("https://example.com/api/{i}"));
          store.put("dynamic", &req, &Response::new(200, format!("{i}"))).await
        })
      })
      .collect();

    for handle in handles {
      handle.await.unwrap().unwrap();
    }
    assert_eq!(store.keys("dynamic").await.unwrap().len(), 16);
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
