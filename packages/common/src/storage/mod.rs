mod error;
mod path;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use path::validate_object_path;
pub use traits::{BoxReader, ObjectStore};
