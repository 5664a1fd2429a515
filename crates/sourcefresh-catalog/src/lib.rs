//! Warehouse adapters for freshness probes
//!
//! An adapter executes the max-timestamp query built by the engine and
//! hands back the raw rows plus an adapter response map.
//!
//! ## Features
//!
//! Enable warehouse support via Cargo features:
//! - `postgres` - PostgreSQL/Redshift support
//!
//! The in-memory [`MockAdapter`] is always available.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sourcefresh_catalog::{MockAdapterBuilder, WarehouseAdapter};
//!
//! let adapter = MockAdapterBuilder::new()
//!     .with_table("analytics.orders", rows)
//!     .build();
//! let result = adapter.execute(
//!     "select max(updated_at) as max_loaded_at, current_timestamp as snapshotted_at from \"analytics\".\"orders\""
//! ).await?;
//! ```

pub mod adapter;
pub mod connect;
pub mod mock;
pub mod postgres;

pub use adapter::{CellValue, QueryError, QueryResult, QuotePolicy, Relation, WarehouseAdapter};
pub use connect::connect;
pub use mock::{MockAdapter, MockAdapterBuilder, Row};
pub use postgres::PostgresAdapter;
