pub mod pool;
pub mod schema;
pub mod sqlite;
pub mod store;
