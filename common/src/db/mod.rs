// Database layer: pool, repositories and schema migrations

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::DbPool;
