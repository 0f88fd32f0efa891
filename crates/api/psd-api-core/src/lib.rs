//! psd-api-core: result keys and weight write batches shared by the pose-space
//! weight engine and its expression drivers.

pub mod lookup;
pub mod result_key;
pub mod write_ops;

pub use lookup::ResultLookup;
pub use result_key::{sanitize, KeyError, ResultKey, ResultKind};
pub use write_ops::{WriteBatch, WriteOp};
