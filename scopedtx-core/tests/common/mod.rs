//! Shared fixtures for coordinator integration tests.

#![allow(dead_code)]

use scopedtx_core::{Context, DatabaseConfig, Error};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub struct TestDb {
    pub ctx: Context,
    // Keeps the database file alive for the test's duration
    _dir: TempDir,
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Fresh on-disk database with an empty `actress` table.
pub async fn setup(pool_size: usize, max_connections: u32) -> TestDb {
    setup_with(DatabaseConfig {
        pool_size,
        max_connections,
        acquire_timeout_secs: 600,
        ..DatabaseConfig::default()
    })
    .await
}

pub async fn setup_with(mut config: DatabaseConfig) -> TestDb {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    config.name = "test".into();
    config.url = DatabaseConfig::for_path(dir.path().join("test.db")).url;
    config.busy_timeout_secs = 60;

    let ctx = Context::connect(&config).unwrap();
    ctx.with_connection(|conn| async move {
        let mut conn = conn.lock().await?;
        sqlx::query("CREATE TABLE actress(first_name TEXT NOT NULL, last_name TEXT NOT NULL)")
            .execute(&mut *conn)
            .await?;
        Ok::<_, Error>(())
    })
    .await
    .unwrap();

    TestDb { ctx, _dir: dir }
}

pub async fn insert(ctx: &Context, first: &str, last: &str) -> Result<(), Error> {
    let (first, last) = (first.to_string(), last.to_string());
    ctx.with_connection(move |conn| async move {
        let mut conn = conn.lock().await?;
        sqlx::query("INSERT INTO actress(first_name, last_name) VALUES (?, ?)")
            .bind(first)
            .bind(last)
            .execute(&mut *conn)
            .await?;
        Ok(())
    })
    .await
}

pub async fn count(ctx: &Context) -> i64 {
    ctx.with_connection(|conn| async move {
        let mut conn = conn.lock().await?;
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM actress")
            .fetch_one(&mut *conn)
            .await?;
        Ok::<_, Error>(count)
    })
    .await
    .unwrap()
}

/// Run one statement through `with_connection`.
pub async fn execute(ctx: &Context, sql: &'static str) -> Result<(), Error> {
    ctx.with_connection(move |conn| async move {
        let mut conn = conn.lock().await?;
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    })
    .await
}

pub async fn scalar(ctx: &Context, sql: &'static str) -> i64 {
    ctx.with_connection(move |conn| async move {
        let mut conn = conn.lock().await?;
        let value: i64 = sqlx::query_scalar(sql).fetch_one(&mut *conn).await?;
        Ok::<_, Error>(value)
    })
    .await
    .unwrap()
}

/// Wait until every connection the pool has opened is back in the pool.
pub async fn wait_for_idle(pool: &SqlitePool) {
    for _ in 0..500 {
        if pool.num_idle() as u32 == pool.size() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "connections still leased: size={} idle={}",
        pool.size(),
        pool.num_idle()
    );
}

/// Body error type distinct from the coordinator's own.
#[derive(Debug)]
pub enum TestError {
    Core(Error),
    Boom(&'static str),
}

impl From<Error> for TestError {
    fn from(err: Error) -> Self {
        TestError::Core(err)
    }
}
