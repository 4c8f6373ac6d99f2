#![cfg(feature = "sqlite")]

use std::path::Path;

use sql_pool::prelude::*;

async fn open_db(dir: &Path, size: usize) -> Result<Database<AnyFactory>, SqlPoolError> {
    let path = dir.join("facade.db");
    let config = DbConfig::sqlite(path.to_string_lossy()).with_max_pool_size(size);
    let db = Database::from_config(&config).await?;
    db.write(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)",
        &[],
    )
    .await?;
    Ok(db)
}

#[tokio::test]
async fn limited_read_returns_one_row_or_none() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 2).await?;

    let missing = db
        .read("SELECT name FROM users WHERE id = ?1 LIMIT 1", &[RowValues::Int(1)])
        .await?;
    assert!(missing.is_single());
    assert!(missing.into_one().is_none());

    db.write(
        "INSERT INTO users (id, name, age) VALUES (?1, ?2, ?3)",
        &[RowValues::Int(1), "alice".into(), RowValues::Int(30)],
    )
    .await?;

    let found = db
        .read("SELECT name FROM users WHERE id = ?1 LIMIT 1", &[RowValues::Int(1)])
        .await?
        .into_one()
        .expect("row");
    assert_eq!(found.get("name").and_then(RowValues::as_text), Some("alice"));

    db.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unlimited_read_returns_rows_in_order() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 2).await?;

    for (id, name) in [(3, "carol"), (1, "alice"), (2, "bob")] {
        db.write(
            "INSERT INTO users (id, name) VALUES (?1, ?2)",
            &[RowValues::Int(id), name.into()],
        )
        .await?;
    }

    let rows = db
        .read("SELECT id, name FROM users ORDER BY id", &[])
        .await?;
    assert!(!rows.is_single());
    let names: Vec<_> = rows
        .into_rows()
        .iter()
        .map(|row| row.get("name").and_then(RowValues::as_text).map(str::to_owned))
        .collect();
    assert_eq!(
        names,
        vec![
            Some("alice".to_string()),
            Some("bob".to_string()),
            Some("carol".to_string())
        ]
    );

    db.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn write_is_visible_to_later_reads() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 3).await?;

    db.write(
        "INSERT INTO users (id, name, age) VALUES (?1, ?2, ?3)",
        &[RowValues::Int(7), "dora".into(), RowValues::Int(40)],
    )
    .await?;
    let affected = db
        .write(
            "UPDATE users SET age = ?1 WHERE id = ?2",
            &[RowValues::Int(41), RowValues::Int(7)],
        )
        .await?;
    assert_eq!(affected, 1);

    let row = db
        .read("SELECT age FROM users WHERE id = ?1 LIMIT 1", &[RowValues::Int(7)])
        .await?
        .into_one()
        .expect("row");
    assert_eq!(row.get("age").and_then(RowValues::as_int), Some(41));

    db.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn insert_one_round_trips_through_read() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 2).await?;

    let inserted = db
        .insert_one("users", &[("name", "a".into()), ("age", RowValues::Int(3))])
        .await?;
    assert_eq!(inserted, 1);

    let row = db
        .read("SELECT name, age FROM users WHERE name = ?1 LIMIT 1", &["a".into()])
        .await?
        .into_one()
        .expect("row");
    assert_eq!(row.get("name").and_then(RowValues::as_text), Some("a"));
    assert_eq!(row.get("age").and_then(RowValues::as_int), Some(3));

    db.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn query_failure_is_surfaced_and_connection_released() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 1).await?;

    let err = db
        .read("SELECT * FROM no_such_table", &[])
        .await
        .expect_err("missing table");
    assert!(err.is_query_failure(), "unexpected error: {err}");
    assert!(db.pool().is_idle());

    let err = db
        .write("INSERT INTO users (id) VALUES (?1)", &[RowValues::Int(1)])
        .await
        .expect_err("name is NOT NULL");
    assert!(err.is_query_failure());

    // the single connection is still usable
    let rows = db.read("SELECT COUNT(*) AS n FROM users", &[]).await?;
    let n = rows.into_rows()[0].get("n").and_then(RowValues::as_int);
    assert_eq!(n, Some(0));

    db.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn values_of_every_kind_survive_storage() -> Result<(), SqlPoolError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = open_db(dir.path(), 1).await?;
    db.write(
        "CREATE TABLE kinds (f REAL, b BLOB, flag INTEGER, nothing TEXT)",
        &[],
    )
    .await?;
    db.insert_one(
        "kinds",
        &[
            ("f", RowValues::Float(1.5)),
            ("b", RowValues::Blob(vec![0, 1, 2])),
            ("flag", RowValues::Bool(true)),
            ("nothing", RowValues::Null),
        ],
    )
    .await?;

    let row = db
        .read("SELECT f, b, flag, nothing FROM kinds LIMIT 1", &[])
        .await?
        .into_one()
        .expect("row");
    assert_eq!(row.get("f").and_then(RowValues::as_float), Some(1.5));
    assert_eq!(row.get("b").and_then(RowValues::as_blob), Some(&[0u8, 1, 2][..]));
    assert_eq!(row.get("flag").and_then(RowValues::as_bool), Some(true));
    assert!(row.get("nothing").is_some_and(RowValues::is_null));

    db.shutdown().await;
    Ok(())
}
