//! Vector index, its LanceDB-backed persistence and a cached handle.

pub mod handle;
pub mod index;
pub mod schema;
pub mod store;
pub mod table;

pub use handle::IndexHandle;
pub use index::VectorIndex;
pub use store::{load, save};
