//! SQL sessions bound to one connection.

use scopedtx_core::{Connection, Context};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::Sqlite;
use std::future::Future;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::named;
use crate::params::{Params, Value};

/// Statement execution over a leased connection.
///
/// A session is cheap and holds no state of its own beyond the connection
/// handle; inside a transaction every session sees the transaction's
/// connection.
#[derive(Debug, Clone)]
pub struct Session {
    connection: Connection,
}

struct Statement {
    sql: String,
    values: Vec<Value>,
}

impl Statement {
    fn prepare(sql: &str, params: &Params) -> Result<Self> {
        let rewritten = named::rewrite(sql);
        let values = rewritten
            .names
            .into_iter()
            .map(|name| match params.get(&name) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::MissingParameter { name }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sql: rewritten.sql,
            values,
        })
    }

    fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| match value {
                Value::Null => query.bind(None::<i64>),
                Value::Integer(v) => query.bind(*v),
                Value::Real(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
                Value::Blob(v) => query.bind(v.as_slice()),
                Value::Bool(v) => query.bind(*v),
            })
    }

    fn log(&self, rows: u64, started: Instant) {
        tracing::debug!(
            target: "scopedtx::sql",
            sql = %self.sql,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "statement executed"
        );
    }
}

impl Session {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Run an INSERT/UPDATE/DELETE and return the number of rows affected.
    pub async fn update(&self, sql: &str, params: &Params) -> Result<u64> {
        let statement = Statement::prepare(sql, params)?;

        let mut conn = self.connection.lock().await?;
        let started = Instant::now();
        let rows = statement.query().execute(&mut *conn).await?.rows_affected();

        statement.log(rows, started);
        Ok(rows)
    }

    /// Run a statement without parameters, typically DDL.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.update(sql, &Params::new()).await.map(|_| ())
    }

    /// Run a query and map every row.
    pub async fn select<T, F>(&self, sql: &str, params: &Params, mut mapper: F) -> Result<Vec<T>>
    where
        F: FnMut(&SqliteRow) -> std::result::Result<T, sqlx::Error>,
    {
        let statement = Statement::prepare(sql, params)?;

        let mut conn = self.connection.lock().await?;
        let started = Instant::now();
        let rows = statement.query().fetch_all(&mut *conn).await?;
        drop(conn);

        statement.log(rows.len() as u64, started);
        Ok(rows.iter().map(&mut mapper).collect::<std::result::Result<_, _>>()?)
    }

    /// Like [`Session::select`], but the query must yield exactly one row.
    pub async fn select_one<T, F>(&self, sql: &str, params: &Params, mapper: F) -> Result<T>
    where
        F: FnMut(&SqliteRow) -> std::result::Result<T, sqlx::Error>,
    {
        let mut rows = self.select(sql, params, mapper).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            actual => Err(Error::UnexpectedRowCount { actual }),
        }
    }
}

/// Run `body` with a session over the connection `ctx` resolves to.
///
/// Joins the running transaction when there is one, otherwise leases a
/// connection for the duration of `body` (see [`Context::with_connection`]).
pub async fn with_session<F, Fut, T, E>(ctx: &Context, body: F) -> std::result::Result<T, E>
where
    F: FnOnce(Session) -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<scopedtx_core::Error> + Send + 'static,
{
    ctx.with_connection(move |connection| body(Session::new(connection)))
        .await
}
