//! Narrow interfaces to external collaborators.
//!
//! The core treats import/export adapters, sparse-file allocation, and
//! telemetry as external services reached through the traits below. The
//! database functions fully with none of them configured: telemetry
//! defaults to [`NoopTelemetry`] and the allocator is optional.

use std::path::Path;

use crate::collection::VectorList;
use crate::error::Result;
use crate::types::CancellationToken;

/// Content formats handled by ETL adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Comma-separated values.
    Csv,
    /// Apache Parquet columnar files.
    Parquet,
    /// HDF5 scientific data files.
    Hdf5,
}

/// Import/export adapter for one content type.
///
/// Adapters are implemented outside the core and selected by their
/// [`ContentType`] discriminator. Import runs under the database's write
/// lock, export under the read lock; adapters must not call back into the
/// database.
pub trait EtlAdapter: Send + Sync {
    /// The content type this adapter handles.
    fn content_type(&self) -> ContentType;

    /// Reads vectors from `path` into the target collection.
    fn import_data(
        &self,
        path: &Path,
        target: &mut VectorList,
        token: &CancellationToken,
    ) -> Result<()>;

    /// Writes the collection's vectors to `path`.
    fn export_data(
        &self,
        source: &VectorList,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<()>;
}

/// Opaque sparse-file allocation service.
///
/// When configured, save operations preallocate backing capacity through
/// this service and log the actually-used byte count. The allocation
/// mechanics (sparse attributes, mmap reservations) live entirely behind
/// this trait.
pub trait SparseFileAllocator: Send + Sync {
    /// Ensures `path` has at least `capacity` bytes of (sparse) backing.
    fn allocate(&self, path: &Path, capacity: u64) -> Result<()>;

    /// Bytes actually materialized on disk for `path`.
    fn actual_bytes_used(&self, path: &Path) -> Result<u64>;
}

/// Counter/gauge sink for operational metrics.
///
/// Emitted around load, save, rebuild, and search operations. Spans and
/// log events go through `tracing` independently of this sink.
pub trait TelemetrySink: Send + Sync {
    /// Adds `value` to the named counter.
    fn counter(&self, name: &'static str, value: u64);

    /// Records the current value of the named gauge.
    fn gauge(&self, name: &'static str, value: u64);
}

/// Telemetry sink that discards everything. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn counter(&self, _name: &'static str, _value: u64) {}
    fn gauge(&self, _name: &'static str, _value: u64) {}
}
