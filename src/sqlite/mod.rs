// SQLite backend - rusqlite sessions driven from async code
//
// - config: factory built from `DbConfig`, connection open options
// - connection: pooled session; each call runs on tokio's blocking pool
// - params: conversion from `RowValues` to rusqlite values
// - query: result set extraction

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::SqliteFactory;
pub use connection::SqliteConnection;
pub use query::build_result_set;
