//! Database module: credential record and MySQL connection strategies.
//!
//! Layout:
//! - `models.rs`: the database secret payload and its validation
//! - `connection.rs`: connection targets, the dialer seam and `DatabaseFactory`

pub mod connection;
pub mod models;

pub use connection::{
    ConnectionTarget, DatabaseFactory, Dialer, Endpoint, MySqlDialer, SESSION_SETUP,
};
pub use models::DatabaseCredentials;
