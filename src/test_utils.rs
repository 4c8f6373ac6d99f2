//! Test doubles for exercising pools without a database server.

mod mock;

pub use mock::{MockConnection, MockFactory};
