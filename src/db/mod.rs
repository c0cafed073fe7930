//! Database layer
//!
//! SQLite is the default backend; MySQL is available for larger deployments.
//! Repositories talk to a `DynDatabasePool` and use [`on_pool!`] to run a query
//! body against whichever concrete sqlx pool sits behind it.
//!
//! ```ignore
//! use socialnet::config::DatabaseConfig;
//! use socialnet::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

/// Expand `$body` once per backend with `$conn` bound to the concrete pool.
///
/// Both copies are type-checked against their own driver, so row types only
/// need `sqlx::FromRow` and the SQL must be portable between SQLite and MySQL.
macro_rules! on_pool {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool.sqlite_pool()?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool.mysql_pool()?;
                $body
            }
        }
    };
}

pub(crate) use on_pool;

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, LastInsertId, MysqlDatabase,
    SqliteDatabase,
};

/// `?, ?, ?` for an `IN (...)` list; `NULL` keeps an empty list valid SQL.
pub(crate) fn placeholders(n: usize) -> String {
    if n == 0 {
        "NULL".to_string()
    } else {
        vec!["?"; n].join(", ")
    }
}

/// Offset for a 1-based page number
pub(crate) fn page_offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1) * per_page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "NULL");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
    }
}
