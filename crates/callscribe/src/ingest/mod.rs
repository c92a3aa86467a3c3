//! Content-addressed ingestion: scan, hash, reconcile against the catalog.

pub mod access;
pub mod hashing;
pub mod ingestor;
pub mod reconcile;
pub mod scanner;

pub use access::resolve_within_roots;
pub use hashing::{hash_file, FileCandidate};
pub use ingestor::{IngestReport, Ingestor};
pub use reconcile::ReconcileOptions;
pub use scanner::AudioScanner;
