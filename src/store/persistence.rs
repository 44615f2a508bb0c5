//! On-disk images for the index store.
//!
//! A saved store is exactly two logical artifacts, written together as one
//! unit so they cannot drift:
//! - `index.bin`: header (magic, format version, topology id, dimension,
//!   row count), a topology-specific section, then rows in position order
//! - `idmap.bin`: header plus the identifier map and the next-free-position
//!   counter
//!
//! All integers are little-endian. Writes go through a temp file in the
//! target directory followed by an atomic rename; reads go through a
//! memory map. An image is only valid for the dimension and topology it
//! was built with - the header check rejects everything else before any
//! in-memory state is touched.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::store::idmap::IdentifierMap;
use crate::vector::{
    AnyIndex, DensePosition, IndexOptions, IndexTopology, VectorDimension, VectorIndex,
};

/// Magic bytes identifying an index image.
const INDEX_MAGIC: &[u8; 4] = b"RCTX";

/// Magic bytes identifying an identifier-map image.
const MAP_MAGIC: &[u8; 4] = b"RMAP";

/// Current image format version.
const FORMAT_VERSION: u32 = 1;

/// File name of the index artifact.
pub(crate) const INDEX_FILE: &str = "index.bin";

/// File name of the identifier-map artifact.
pub(crate) const MAP_FILE: &str = "idmap.bin";

/// File name of the informational metadata sidecar.
pub(crate) const METADATA_FILE: &str = "metadata.json";

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::PersistenceIo {
        path: path.to_path_buf(),
        source,
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidImage {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Writes a fully-built buffer to `path` via temp file + atomic rename.
fn write_atomically(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| invalid(path, "image path has no parent directory"))?;
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(bytes).map_err(|e| io_error(path, e))?;
    tmp.flush().map_err(|e| io_error(path, e))?;
    tmp.persist(path)
        .map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// Writes both binary artifacts as one unit.
///
/// Both buffers are staged to temp files first; the renames only start
/// once both writes succeeded, so a failure mid-save cannot leave one
/// fresh artifact next to one stale one.
pub(crate) fn write_store_image(
    dir: &Path,
    index: &AnyIndex,
    map: &IdentifierMap,
    next_position: u32,
) -> StoreResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let index_path = dir.join(INDEX_FILE);
    let map_path = dir.join(MAP_FILE);

    let index_bytes = encode_index(index)?;
    let map_bytes = encode_map(map, next_position);

    let mut index_tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    index_tmp
        .write_all(&index_bytes)
        .and_then(|()| index_tmp.flush())
        .map_err(|e| io_error(&index_path, e))?;

    let mut map_tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    map_tmp
        .write_all(&map_bytes)
        .and_then(|()| map_tmp.flush())
        .map_err(|e| io_error(&map_path, e))?;

    index_tmp
        .persist(&index_path)
        .map_err(|e| io_error(&index_path, e.error))?;
    map_tmp
        .persist(&map_path)
        .map_err(|e| io_error(&map_path, e.error))?;

    Ok(())
}

/// Bounds-checked little-endian reader over a mapped image.
struct ImageReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    path: &'a Path,
}

impl<'a> ImageReader<'a> {
    fn new(bytes: &'a [u8], path: &'a Path) -> Self {
        Self {
            bytes,
            offset: 0,
            path,
        }
    }

    fn take(&mut self, len: usize) -> StoreResult<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or_else(|| {
            invalid(self.path, "image offset overflow")
        })?;
        if end > self.bytes.len() {
            return Err(invalid(
                self.path,
                format!(
                    "truncated image: need {end} bytes, have {}",
                    self.bytes.len()
                ),
            ));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> StoreResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_row(&mut self, dimension: usize) -> StoreResult<Vec<f32>> {
        let bytes = self.take(dimension * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    fn done(&self) -> bool {
        self.offset == self.bytes.len()
    }
}

fn push_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn push_row(buffer: &mut Vec<u8>, row: &[f32]) {
    for value in row {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
}

/// Encodes the index artifact into a buffer.
fn encode_index(index: &AnyIndex) -> StoreResult<Vec<u8>> {
    let dimension = index.dimension().get();
    let count = index.len();

    let mut buffer = Vec::with_capacity(32 + count * dimension * 4);
    buffer.extend_from_slice(INDEX_MAGIC);
    push_u32(&mut buffer, FORMAT_VERSION);
    buffer.push(index.topology().as_u8());
    push_u32(&mut buffer, dimension as u32);
    push_u32(&mut buffer, count as u32);

    match index {
        AnyIndex::Flat(_) => {}
        AnyIndex::Ivf(ivf) => {
            push_u32(&mut buffer, ivf.nlist() as u32);
            push_u32(&mut buffer, ivf.nprobe() as u32);
            buffer.push(u8::from(ivf.is_trained()));
            if ivf.is_trained() {
                for centroid in ivf.centroids() {
                    push_row(&mut buffer, centroid);
                }
            }
        }
        AnyIndex::Hnsw(hnsw) => {
            push_u32(&mut buffer, hnsw.m() as u32);
            push_u32(&mut buffer, hnsw.ef_construction() as u32);
            push_u32(&mut buffer, hnsw.ef_search() as u32);
        }
    }

    for position in 0..count {
        let row = index.reconstruct(DensePosition::new(position as u32))?;
        push_row(&mut buffer, &row);
    }

    Ok(buffer)
}

/// Deserializes the index from `dir/index.bin`.
///
/// The header must match the configured dimension and topology; structural
/// build parameters come from the image, query-time knobs (`nprobe`,
/// `ef_search`) from the current options.
pub(crate) fn read_index_image(
    dir: &Path,
    expected_dimension: VectorDimension,
    expected_topology: IndexTopology,
    options: &IndexOptions,
) -> StoreResult<AnyIndex> {
    let path = dir.join(INDEX_FILE);
    let file = File::open(&path).map_err(|e| io_error(&path, e))?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| io_error(&path, e))?;
    let mut reader = ImageReader::new(&mmap, &path);

    if reader.take(4)? != INDEX_MAGIC {
        return Err(invalid(&path, "bad magic bytes"));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(invalid(
            &path,
            format!("unsupported format version {version} (expected {FORMAT_VERSION})"),
        ));
    }

    let topology_byte = reader.read_u8()?;
    let topology = IndexTopology::from_u8(topology_byte)
        .ok_or_else(|| invalid(&path, format!("unknown topology id {topology_byte}")))?;
    if topology != expected_topology {
        return Err(StoreError::PersistedTopologyMismatch {
            expected: expected_topology.to_string(),
            actual: topology.to_string(),
        });
    }

    let dimension = reader.read_u32()? as usize;
    if dimension != expected_dimension.get() {
        return Err(StoreError::PersistedDimensionMismatch {
            expected: expected_dimension.get(),
            actual: dimension,
        });
    }

    let count = reader.read_u32()? as usize;

    let mut index = match topology {
        IndexTopology::Flat => AnyIndex::new(topology, expected_dimension, options)?,
        IndexTopology::Ivf => {
            let nlist = reader.read_u32()? as usize;
            let _persisted_nprobe = reader.read_u32()? as usize;
            let trained = reader.read_u8()? != 0;
            if !trained && count > 0 {
                return Err(invalid(&path, "rows present but quantizer untrained"));
            }

            let ivf_options = IndexOptions {
                nlist,
                ..*options
            };
            let mut index = AnyIndex::new(topology, expected_dimension, &ivf_options)?;
            if trained {
                let mut centroids = Vec::with_capacity(nlist);
                for _ in 0..nlist {
                    centroids.push(reader.read_row(expected_dimension.get())?);
                }
                if let AnyIndex::Ivf(ivf) = &mut index {
                    ivf.install_centroids(centroids)?;
                }
            }
            index
        }
        IndexTopology::Hnsw => {
            let m = reader.read_u32()? as usize;
            let ef_construction = reader.read_u32()? as usize;
            let _persisted_ef_search = reader.read_u32()? as usize;
            let hnsw_options = IndexOptions {
                m,
                ef_construction,
                ..*options
            };
            AnyIndex::new(topology, expected_dimension, &hnsw_options)?
        }
    };

    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        rows.push(reader.read_row(expected_dimension.get())?);
    }
    if !reader.done() {
        return Err(invalid(&path, "trailing bytes after last row"));
    }

    if !rows.is_empty() {
        // Rows were normalized before the original add; re-adding in
        // position order reassigns the same dense range 0..count
        index.add(&rows)?;
    }

    Ok(index)
}

/// Encodes the identifier-map artifact into a buffer.
fn encode_map(map: &IdentifierMap, next_position: u32) -> Vec<u8> {
    let mut entries: Vec<(&str, DensePosition)> = map.iter().collect();
    // Deterministic images: order by position
    entries.sort_by_key(|(_, position)| *position);

    let mut buffer = Vec::new();
    buffer.extend_from_slice(MAP_MAGIC);
    push_u32(&mut buffer, FORMAT_VERSION);
    push_u32(&mut buffer, next_position);
    push_u32(&mut buffer, entries.len() as u32);

    for (id, position) in entries {
        push_u32(&mut buffer, position.get());
        push_u32(&mut buffer, id.len() as u32);
        buffer.extend_from_slice(id.as_bytes());
    }

    buffer
}

/// Deserializes the identifier map and position counter from
/// `dir/idmap.bin`.
pub(crate) fn read_map_image(dir: &Path) -> StoreResult<(IdentifierMap, u32)> {
    let path = dir.join(MAP_FILE);
    let file = File::open(&path).map_err(|e| io_error(&path, e))?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| io_error(&path, e))?;
    let mut reader = ImageReader::new(&mmap, &path);

    if reader.take(4)? != MAP_MAGIC {
        return Err(invalid(&path, "bad magic bytes"));
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(invalid(
            &path,
            format!("unsupported format version {version} (expected {FORMAT_VERSION})"),
        ));
    }

    let next_position = reader.read_u32()?;
    let count = reader.read_u32()? as usize;

    let mut map = IdentifierMap::new();
    for _ in 0..count {
        let position = DensePosition::new(reader.read_u32()?);
        let id_len = reader.read_u32()? as usize;
        let id_bytes = reader.take(id_len)?;
        let id = std::str::from_utf8(id_bytes)
            .map_err(|_| invalid(&path, "identifier is not valid UTF-8"))?;
        map.bind(id, position)?;
    }
    if !reader.done() {
        return Err(invalid(&path, "trailing bytes after last entry"));
    }

    Ok((map, next_position))
}

/// Informational sidecar describing a saved store.
///
/// Written on save next to the two binary artifacts; never consulted by
/// `load` (the binary headers are authoritative).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Topology identifier ("flat", "ivf", "hnsw")
    pub topology: String,

    /// Dimension of stored vectors
    pub dimension: usize,

    /// Number of live bindings at save time
    pub count: usize,

    /// Unix timestamp when first created
    pub created_at: u64,

    /// Unix timestamp of this save
    pub updated_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

impl StoreMetadata {
    const CURRENT_VERSION: u32 = 1;

    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn new(topology: IndexTopology, dimension: VectorDimension, count: usize) -> Self {
        let now = unix_timestamp();
        Self {
            topology: topology.to_string(),
            dimension: dimension.get(),
            count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Writes the sidecar as pretty JSON.
    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            StoreError::InvalidImage {
                path: path.clone(),
                reason: format!("failed to serialize metadata: {e}"),
            }
        })?;
        write_atomically(&path, json.as_bytes())
    }

    /// Reads the sidecar, if present.
    pub fn load(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(METADATA_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        serde_json::from_str(&json).map_err(|e| invalid(&path, format!("bad metadata: {e}")))
    }
}

/// Seconds since the Unix epoch.
fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
