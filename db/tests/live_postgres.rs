//! End-to-end checks against a real Postgres server.
//!
//! These are `#[ignore]`d so the default suite passes without a database.
//! Point the usual PG* environment variables at a server and run
//! `cargo test -p db -- --ignored`.

use std::time::Duration;

use config::DatabaseConfig;
use db::{Database, DbError, PoolOptions, PostgresDatabase};
use serde_json::json;

fn config_from_env() -> DatabaseConfig {
    let var = |name: &str, fallback: &str| std::env::var(name).unwrap_or_else(|_| fallback.into());
    DatabaseConfig {
        dbname: var("PGDATABASE", "postgres"),
        user: var("PGUSER", "postgres"),
        password: var("PGPASSWORD", "postgres"),
        host: var("PGHOST", "localhost"),
        port: var("PGPORT", "5432").parse().unwrap_or(5432),
        minconn: 1,
        maxconn: 2,
    }
}

#[tokio::test]
#[ignore]
async fn select_one_yields_one_mapping() {
    let db = PostgresDatabase::connect(&config_from_env()).await.unwrap();

    let rows = db.fetch("SELECT 1 AS x", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("x"), Some(&json!(1)));

    db.close().await;
}

#[tokio::test]
#[ignore]
async fn parameters_are_bound_not_interpolated() {
    let db = PostgresDatabase::connect(&config_from_env()).await.unwrap();

    let rows = db
        .fetch(
            "SELECT $1::int AS n, $2::text AS s",
            &[json!(41), json!("it's quoted")],
        )
        .await
        .unwrap();
    assert_eq!(rows[0].get("n"), Some(&json!(41)));
    assert_eq!(rows[0].get("s"), Some(&json!("it's quoted")));

    db.close().await;
}

#[tokio::test]
#[ignore]
async fn failed_statement_rolls_back_and_pool_stays_usable() {
    let db = PostgresDatabase::connect(&config_from_env()).await.unwrap();

    let failed = db.fetch("SELECT definitely not sql", &[]).await;
    assert!(matches!(failed, Err(DbError::Query { .. })));

    let rows = db.fetch("SELECT 1 AS x", &[]).await.unwrap();
    assert_eq!(rows[0].get("x"), Some(&json!(1)));

    db.close().await;
}

#[tokio::test]
#[ignore]
async fn write_path_commits_per_statement() {
    // max 1 so every statement lands on the same session and can see the
    // temp table.
    let mut config = config_from_env();
    config.maxconn = 1;
    let db = PostgresDatabase::connect(&config).await.unwrap();

    db.execute("CREATE TEMP TABLE pool_smoke (id int, label text)", &[])
        .await
        .unwrap();
    db.execute(
        "INSERT INTO pool_smoke (id, label) VALUES ($1, $2)",
        &[json!(1), json!("first")],
    )
    .await
    .unwrap();

    let rows = db
        .fetch("SELECT label FROM pool_smoke WHERE id = $1", &[json!(1)])
        .await
        .unwrap();
    assert_eq!(rows[0].get("label"), Some(&json!("first")));

    // Non-SELECT through the read path returns an empty sequence.
    let rows = db
        .fetch("DELETE FROM pool_smoke WHERE id = $1", &[json!(1)])
        .await
        .unwrap();
    assert!(rows.is_empty());

    db.close().await;
}

#[tokio::test]
#[ignore]
async fn sequential_statements_never_exhaust_a_pool_of_one() {
    let mut config = config_from_env();
    config.maxconn = 1;
    let db = PostgresDatabase::connect(&config).await.unwrap();

    for i in 0..5 {
        let rows = db.fetch("SELECT $1::int AS n", &[json!(i)]).await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&json!(i)));
    }

    db.close().await;
}

#[tokio::test]
#[ignore]
async fn contention_blocks_the_third_checkout() {
    let options = PoolOptions {
        min_connections: 1,
        max_connections: 2,
        acquire_timeout: Some(Duration::from_millis(200)),
    };
    let db = PostgresDatabase::connect_with(&config_from_env(), options)
        .await
        .unwrap();

    let first = db.pool().acquire().await.unwrap();
    let second = db.pool().acquire().await.unwrap();

    let third = db.pool().acquire().await;
    assert!(matches!(third, Err(DbError::AcquireTimeout(_))));

    drop(first);
    let third = db.pool().acquire().await;
    assert!(third.is_ok());

    drop(third);
    drop(second);
    db.close().await;
}

#[tokio::test]
#[ignore]
async fn close_is_idempotent_and_fails_later_calls_fast() {
    let db = PostgresDatabase::connect(&config_from_env()).await.unwrap();

    db.close().await;
    db.close().await;

    let after = db.fetch("SELECT 1", &[]).await;
    assert!(matches!(after, Err(DbError::PoolClosed)));
}
