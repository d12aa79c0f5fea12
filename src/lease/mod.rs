//! File leases: shareable links over archived files, with expiry renewal.

mod registry;

pub use registry::{FileLease, LeaseError, LeaseRegistry, OriginStatus};
