//! An in-memory `RowSource` that answers series queries with the same
//! semantics as the SQL rendered by `SeriesQuery::to_builder`.

use crate::error::DbError;
use crate::query::{SeriesQuery, SYMBOL_FIELD};
use crate::source::RowSource;
use async_trait::async_trait;
use core_types::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

type Record = HashMap<String, Value>;

#[derive(Debug, Default)]
pub struct InMemorySource {
    tables: HashMap<String, Vec<Record>>,
    raw: HashMap<String, Vec<Vec<Value>>>,
    queries: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row to `table`; `fields` are (column, value) pairs.
    pub fn insert(&mut self, table: &str, fields: &[(&str, Value)]) -> &mut Self {
        let record = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.tables.entry(table.to_string()).or_default().push(record);
        self
    }

    /// Registers the rows returned for an exact raw SQL string.
    pub fn on_raw(&mut self, sql: &str, rows: Vec<Vec<Value>>) -> &mut Self {
        self.raw.insert(sql.to_string(), rows);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

fn query_error(message: String) -> DbError {
    DbError::Query(sqlx::Error::Protocol(message))
}

#[async_trait]
impl RowSource for InMemorySource {
    async fn execute_raw(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.raw
            .get(sql)
            .cloned()
            .ok_or_else(|| query_error(format!("syntax error near '{sql}'")))
    }

    async fn fetch_series_rows(&self, query: &SeriesQuery) -> Result<Vec<Vec<Value>>, DbError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let records = self
            .tables
            .get(&query.table)
            .ok_or_else(|| query_error(format!("table '{}' doesn't exist", query.table)))?;

        let fields = query.selected_fields();
        let mut out: Vec<Vec<Value>> = Vec::new();

        for record in records {
            let symbol_ok = record
                .get(SYMBOL_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|s| query.symbols.matches(s));
            // BETWEEN is never true for NULL or unparseable dates.
            let date_ok = record
                .get(query.layout.filter_field)
                .and_then(Value::as_naive_date)
                .is_some_and(|d| query.range.contains(d));
            if !(symbol_ok && date_ok) {
                continue;
            }

            let row = fields
                .iter()
                .map(|f| {
                    record
                        .get(*f)
                        .cloned()
                        .ok_or_else(|| query_error(format!("unknown column '{f}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;

            if !out.contains(&row) {
                out.push(row);
            }
        }

        out.sort_by_key(|row| row[0].as_naive_date());
        Ok(out)
    }
}

/// Starts a local listener that answers every connection the way MySQL
/// answers a bad password: a single ERR packet (1045, SQLSTATE 28000)
/// in place of the handshake.
pub async fn rejecting_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut payload = vec![0xff];
    payload.extend_from_slice(&1045u16.to_le_bytes());
    payload.extend_from_slice(b"#28000");
    payload.extend_from_slice(b"Access denied for user 'reader'@'localhost' (using password: YES)");

    let len = payload.len() as u32;
    let mut packet = len.to_le_bytes()[..3].to_vec();
    packet.push(0); // sequence id
    packet.extend_from_slice(&payload);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(&packet).await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}
