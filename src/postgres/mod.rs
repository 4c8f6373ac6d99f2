// Postgres backend - tokio-postgres clients with their connection driver task
//
// - config: factory built from `DbConfig`
// - connection: pooled client, reconnected in place when its session drops
// - params: `ToSql` for `RowValues`
// - query: result set extraction

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::PostgresFactory;
pub use connection::PostgresConnection;
pub use query::build_result_set;
