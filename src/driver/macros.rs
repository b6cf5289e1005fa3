//! Backend dispatch macro.
//!
//! Generates the `match` over [`Backend`](crate::driver::sqlx_driver::Backend)
//! variants so every backend-specific operation reads as one linear block.
//! The macro expands at compile time with zero runtime overhead.

/// Macro for generating backend dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_backend_dispatch!(backend, {
///     MySql(c) => run_mysql(c),
///     Postgres(c) => run_postgres(c),
///     SQLite(c) => run_sqlite(c),
/// });
/// ```
#[macro_export]
macro_rules! impl_backend_dispatch {
    ($backend:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $backend {
            $(
                $crate::driver::sqlx_driver::Backend::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_backend_dispatch;
