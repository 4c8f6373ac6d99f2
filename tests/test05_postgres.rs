#![cfg(feature = "postgres")]

//! Runs against a live server only when `SQL_POOL_PG_HOST` is set, e.g.
//! `SQL_POOL_PG_HOST=localhost SQL_POOL_PG_USER=postgres SQL_POOL_PG_PASSWORD=... cargo test`.

use std::env;

use sql_pool::prelude::*;

fn pg_config() -> Option<DbConfig> {
    let host = env::var("SQL_POOL_PG_HOST").ok()?;
    let json = serde_json::json!({
        "backend": "postgres",
        "host": host,
        "user": env::var("SQL_POOL_PG_USER").unwrap_or_else(|_| "postgres".into()),
        "password": env::var("SQL_POOL_PG_PASSWORD").ok(),
        "port": env::var("SQL_POOL_PG_PORT").ok().and_then(|p| p.parse::<u16>().ok()),
        "database": env::var("SQL_POOL_PG_DB").unwrap_or_else(|_| "postgres".into()),
        "max_pool_size": 3
    });
    Some(DbConfig::from_json_str(&json.to_string()).expect("postgres test config"))
}

#[tokio::test]
async fn postgres_facade_round_trip() -> Result<(), SqlPoolError> {
    let Some(config) = pg_config() else {
        eprintln!("SQL_POOL_PG_HOST not set; skipping");
        return Ok(());
    };
    let db = Database::from_config(&config).await?;
    assert_eq!(db.pool().database_type(), DatabaseType::Postgres);

    // temp tables are per session; keep the whole exchange on one connection
    let mut conn = db.pool().acquire().await?;
    conn.execute("CREATE TEMP TABLE scratch (name TEXT, age INT4)", &[])
        .await
        .map_err(SqlPoolError::QueryFailed)?;
    conn.execute(
        "INSERT INTO scratch (name, age) VALUES ($1, $2)",
        &["a".into(), RowValues::Int(3)],
    )
    .await
    .map_err(SqlPoolError::QueryFailed)?;
    let rs = conn
        .query("SELECT name, age FROM scratch", &[])
        .await
        .map_err(SqlPoolError::QueryFailed)?;
    assert_eq!(rs.rows[0].get("name").and_then(RowValues::as_text), Some("a"));
    assert_eq!(rs.rows[0].get("age").and_then(RowValues::as_int), Some(3));
    db.pool().release(conn);

    let one = db.read("SELECT 1::INT8 AS one LIMIT 1", &[]).await?.into_one();
    assert_eq!(
        one.and_then(|row| row.get("one").and_then(RowValues::as_int)),
        Some(1)
    );

    db.shutdown().await;
    Ok(())
}
