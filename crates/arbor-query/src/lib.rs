//! Bulk query engine for arbor.
//!
//! Consumer code describes what it needs as a graph of deferred [`Value`]s:
//! "fetch X, and once X is known, fetch Y". Nothing touches the store until
//! [`Value::execute`] runs the graph. Execution proceeds in waves: every
//! lookup known at the start of a wave goes out in one batch read, decoded
//! values are handed to their continuations, and the lookups those
//! continuations register form the next wave. A chain of dependent lookups
//! of depth N therefore costs N round trips no matter how wide each level is.
//!
//! ```ignore
//! let query = BulkQuery::new(cache);
//! let grandparent = query
//!     .get_required(version_ref)
//!     .map_bulk(move |v| query2.get_required(v.parent))
//!     .map_bulk(move |p| query3.get_required(p.parent));
//! let value = grandparent.execute()?;
//! ```

pub mod error;
pub mod query;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use query::{BulkQuery, DEFAULT_BATCH_SIZE};
pub use value::Value;
