//! The versioned database file format.
//!
//! The persisted file (`vectors.bin`) is a gzip-compressed byte stream
//! wrapping:
//!
//! ```text
//! i32 fileVersion
//! i32 vectorCount
//! repeat vectorCount times:
//!     i32 byteLength
//!     byte[byteLength] vectorPayload   // self-describing bincode record
//! if fileVersion == 1:
//!     <index section>                   // SearchService format, versioned
//! ```
//!
//! Version 0 is legacy: vectors only, no index section; loading it forces
//! a full index rebuild. Version 1 adds the index section. Unknown future
//! versions fail closed rather than attempt a best-effort partial read.
//! The gzip wrapping and file placement are owned by the database
//! controller; this module works on plain readers/writers.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::info;

use crate::collection::VectorList;
use crate::error::{Result, StorageError};
use crate::search::SearchService;
use crate::types::{check_cancelled, CancellationToken};

/// Legacy layout: vectors only.
pub(crate) const FILE_VERSION_LEGACY: i32 = 0;

/// Current layout: vectors followed by the index section.
pub(crate) const FILE_VERSION_CURRENT: i32 = 1;

/// Name of the database file inside the target directory.
pub const DATABASE_FILE_NAME: &str = "vectors.bin";

/// Name of the backup kept while a new file is being written.
pub const BACKUP_FILE_NAME: &str = "vectors.old.bin";

/// What a completed read found.
#[derive(Debug)]
pub(crate) struct LoadOutcome {
    /// Number of vector records read.
    pub(crate) vector_count: usize,
    /// True if the loaded layout lacked indexes and a rebuild is needed.
    pub(crate) indexes_dirty: bool,
}

/// Writes the current-version layout: version, vectors, index section.
pub(crate) fn write_database(
    writer: &mut dyn Write,
    vectors: &VectorList,
    search: &SearchService,
    token: Option<&CancellationToken>,
    linked: &CancellationToken,
) -> Result<()> {
    writer.write_i32::<LittleEndian>(FILE_VERSION_CURRENT)?;
    writer.write_i32::<LittleEndian>(vectors.len() as i32)?;
    for vector in vectors {
        check_cancelled(token, linked)?;
        let payload = vector.to_binary()?;
        writer.write_i32::<LittleEndian>(payload.len() as i32)?;
        writer.write_all(&payload)?;
    }
    search.save(writer)?;
    Ok(())
}

/// Reads a database stream into `vectors` and `search`, dispatching on the
/// leading version tag.
pub(crate) fn read_database(
    reader: &mut dyn Read,
    vectors: &mut VectorList,
    search: &mut SearchService,
    token: Option<&CancellationToken>,
    linked: &CancellationToken,
) -> Result<LoadOutcome> {
    let version = reader.read_i32::<LittleEndian>()?;
    match version {
        FILE_VERSION_CURRENT => {
            info!("loading vectors from the v1 layout");
            let count = read_vectors(reader, vectors, token, linked)?;
            search.load(reader, vectors)?;
            Ok(LoadOutcome {
                vector_count: count,
                indexes_dirty: false,
            })
        }
        FILE_VERSION_LEGACY => {
            info!("loading vectors from the legacy (v0) layout");
            let count = read_vectors(reader, vectors, token, linked)?;
            Ok(LoadOutcome {
                vector_count: count,
                indexes_dirty: true,
            })
        }
        other => Err(StorageError::UnsupportedVersion {
            found: other,
            supported: FILE_VERSION_CURRENT,
        }
        .into()),
    }
}

/// Reads the shared vector body: count, then length-prefixed payloads.
fn read_vectors(
    reader: &mut dyn Read,
    vectors: &mut VectorList,
    token: Option<&CancellationToken>,
    linked: &CancellationToken,
) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(StorageError::corrupted(format!("negative vector count: {count}")).into());
    }

    for _ in 0..count {
        check_cancelled(token, linked)?;
        let byte_length = reader.read_i32::<LittleEndian>()?;
        if byte_length < 0 {
            return Err(StorageError::corrupted(format!(
                "negative vector payload length: {byte_length}"
            ))
            .into());
        }
        let mut payload = vec![0u8; byte_length as usize];
        reader.read_exact(&mut payload)?;
        let vector = crate::vector::Vector::from_binary(&payload)?;
        vectors.add(vector);
    }

    Ok(count as usize)
}
