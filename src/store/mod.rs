pub mod blob;
pub mod record;

pub use blob::{BlobStore, LocalBlobStore};
pub use record::{RecordStore, SqliteStore};
