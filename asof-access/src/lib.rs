//! asof-access: causally-truncated dataset assembly.
//!
//! [`DatasetAssembler::prepare_dataset`] is the entry point callers use:
//! it refreshes whatever cache kinds are stale, loads the full cached
//! history, and returns only rows dated on or before the requested as-of
//! date. The cache itself holds history through today; truncation happens
//! on every read, never at write time.

pub mod assembler;
pub mod batch;
pub mod bundle;
pub mod error;
pub mod locks;
pub mod truncate;

pub use assembler::{applicable_kinds, parse_as_of, DatasetAssembler, PrepareOptions};
pub use batch::{prepare_many, BatchProgress, BatchSummary, SilentProgress, StderrProgress};
pub use bundle::{BundleOrigin, DataBundle, PreparedDataset};
pub use error::AccessError;
