//! # Store file
//!
//! A store file is a versioned container around [`MemKvStore`] exports. Every
//! commit appends one chunk; when the file is opened the chunks are imported in
//! order, so a key written by a later chunk shadows the same key from an
//! earlier one, and a tombstone cell written later deletes it.
//!
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ Store File                                                           │
//! │┌ ─ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ┐│
//! │  Magic Number  │ Format Version  │    Chunk    │  ...  │    Chunk     │
//! ││  "KVCD" u32   │       u8        │    bytes    │       │    bytes    ││
//! │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! Each chunk is encoded as follows:
//!
//! ┌──────────────────────────────────────────────┐
//! │ Chunk                                        │
//! │┌ ─ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ─ ┬ ─ ─ ─ ─ ─ ─ ┐│
//! │  Store Version │ Payload Length │   Payload   │
//! ││    u64 LE     │     u32 LE     │ SSTable    ││
//! │ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ │
//! └──────────────────────────────────────────────┘
//!
//! Store versions must be strictly increasing from one chunk to the next.
//!
//! ## Key space
//!
//! - `0x00 ++ name` holds metadata. `name.<map>` maps a map name to its id in
//!   lower-case hex, and `map.<hexid>` describes the map as
//!   `name:<map>,key:<type>,value:<type>`.
//! - `0x01 ++ id (u32 BE) ++ key` holds the entries of one map. The cell starts
//!   with a one byte type tag followed by the payload, so a cell is never
//!   empty even for an empty string. A cell holding only `-` is a tombstone.
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use loro_kv_store::mem_store::MemKvConfig;
use loro_kv_store::MemKvStore;
use thiserror::Error;
use tracing::debug;

const MAGIC: &[u8; 4] = b"KVCD";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;
const CHUNK_HEADER_LEN: usize = 12;

const META_SPACE: u8 = 0x00;
const MAP_SPACE: u8 = 0x01;
const MAP_PREFIX_LEN: usize = 5;
const TOMBSTONE: u8 = b'-';

/// Metadata names that announce a user map start with this prefix.
pub const MAP_NAME_PREFIX: &str = "name.";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot read store file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not a store file (bad magic number)")]
    NotAStore,
    #[error("Unsupported store format version {0}")]
    UnsupportedFormat(u8),
    #[error("Corrupted store ({0})")]
    Corrupt(Box<str>),
    #[error("Cannot find map ({0})")]
    MapNotFound(Box<str>),
    #[error("Map ({map}) stores {key_type} keys and {value_type} values, expected string keys and values")]
    TypeMismatch {
        map: Box<str>,
        key_type: DataType,
        value_type: DataType,
    },
    #[error("Invalid entry in map ({map}): {reason}")]
    InvalidEntry { map: Box<str>, reason: Box<str> },
}

impl StoreError {
    fn corrupt(reason: impl Into<Box<str>>) -> Self {
        StoreError::Corrupt(reason.into())
    }
}

/// Type of the keys or values of a map, as declared in its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Bytes,
}

impl DataType {
    fn tag(self) -> u8 {
        match self {
            DataType::String => b's',
            DataType::Bytes => b'b',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Bytes => "bytes",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(DataType::String),
            "bytes" => Some(DataType::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn meta_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.push(META_SPACE);
    key.extend_from_slice(name.as_bytes());
    key
}

fn map_prefix(id: u32) -> [u8; MAP_PREFIX_LEN] {
    let mut prefix = [MAP_SPACE; MAP_PREFIX_LEN];
    prefix[1..].copy_from_slice(&id.to_be_bytes());
    prefix
}

fn map_key(id: u32, key: &[u8]) -> Vec<u8> {
    let mut ans = Vec::with_capacity(MAP_PREFIX_LEN + key.len());
    ans.extend_from_slice(&map_prefix(id));
    ans.extend_from_slice(key);
    ans
}

/// Exclusive upper bound of the key range of map `id`.
fn map_upper_bound(id: u32) -> Vec<u8> {
    match id.checked_add(1) {
        Some(next) => map_prefix(next).to_vec(),
        None => vec![MAP_SPACE + 1],
    }
}

fn new_kv() -> MemKvStore {
    MemKvStore::new(MemKvConfig::default())
}

fn descriptor_name(id: u32) -> String {
    format!("map.{:x}", id)
}

struct MapDescriptor {
    key_type: DataType,
    value_type: DataType,
}

impl MapDescriptor {
    fn encode(name: &str, key_type: DataType, value_type: DataType) -> String {
        format!("name:{name},key:{key_type},value:{value_type}")
    }

    /// The map name may itself contain commas, so fields are taken from the right.
    fn decode(s: &str) -> Option<Self> {
        let mut fields = s.rsplitn(3, ',');
        let value_type = DataType::parse(fields.next()?.strip_prefix("value:")?)?;
        let key_type = DataType::parse(fields.next()?.strip_prefix("key:")?)?;
        fields.next()?.strip_prefix("name:")?;
        Some(Self {
            key_type,
            value_type,
        })
    }
}

/// A store file opened read-only.
///
/// The file is read once; nothing is written back to it.
pub struct Store {
    path: PathBuf,
    kv: MemKvStore,
    version: u64,
    chunks: usize,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store = Self::from_bytes(Bytes::from(bytes))?;
        store.path = path.to_path_buf();
        debug!(
            path = %path.display(),
            version = store.version,
            chunks = store.chunks,
            "opened store"
        );
        Ok(store)
    }

    pub fn from_bytes(mut bytes: Bytes) -> StoreResult<Self> {
        if bytes.remaining() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(StoreError::NotAStore);
        }
        bytes.advance(MAGIC.len());
        let format = bytes.get_u8();
        if format != FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat(format));
        }

        let mut kv = new_kv();
        let mut version = 0;
        let mut chunks = 0;
        while bytes.has_remaining() {
            if bytes.remaining() < CHUNK_HEADER_LEN {
                return Err(StoreError::corrupt(format!(
                    "truncated header of chunk {chunks}"
                )));
            }
            let chunk_version = bytes.get_u64_le();
            let len = bytes.get_u32_le() as usize;
            if chunks > 0 && chunk_version <= version {
                return Err(StoreError::corrupt(format!(
                    "chunk version {chunk_version} does not follow version {version}"
                )));
            }
            if bytes.remaining() < len {
                return Err(StoreError::corrupt(format!(
                    "chunk {chunks} needs {len} bytes, only {} left",
                    bytes.remaining()
                )));
            }
            let payload = bytes.split_to(len);
            kv.import_all(payload).map_err(|e| {
                StoreError::corrupt(format!("chunk {chunks} (version {chunk_version}): {e}"))
            })?;
            debug!(chunk = chunks, version = chunk_version, len, "imported chunk");
            version = chunk_version;
            chunks += 1;
        }

        Ok(Self {
            path: PathBuf::new(),
            kv,
            version,
            chunks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The version of the newest chunk, or 0 for a store without commits.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All metadata names, in ascending order.
    pub fn meta_names(&self) -> StoreResult<Vec<String>> {
        let start = [META_SPACE];
        let end = [MAP_SPACE];
        self.kv
            .scan(Bound::Included(&start[..]), Bound::Excluded(&end[..]))
            .map(|(k, _)| {
                String::from_utf8(k[1..].to_vec())
                    .map_err(|_| StoreError::corrupt("metadata name is not valid UTF-8"))
            })
            .collect()
    }

    fn meta(&self, name: &str) -> StoreResult<Option<String>> {
        match self.kv.get(&meta_key(name)) {
            Some(v) => String::from_utf8(v.to_vec())
                .map(Some)
                .map_err(|_| StoreError::corrupt(format!("metadata ({name}) is not valid UTF-8"))),
            None => Ok(None),
        }
    }

    /// Names of the user maps, in the order of their metadata names.
    pub fn map_names(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .meta_names()?
            .into_iter()
            .filter_map(|n| n.strip_prefix(MAP_NAME_PREFIX).map(str::to_owned))
            .collect())
    }

    /// Open a map whose keys and values are both strings.
    pub fn open_map(&self, name: &str) -> StoreResult<NamedMap<'_>> {
        let id = self
            .meta(&format!("{MAP_NAME_PREFIX}{name}"))?
            .ok_or_else(|| StoreError::MapNotFound(name.into()))?;
        let id = u32::from_str_radix(&id, 16)
            .map_err(|_| StoreError::corrupt(format!("map ({name}) has invalid id {id:?}")))?;
        let descriptor = self
            .meta(&descriptor_name(id))?
            .and_then(|d| MapDescriptor::decode(&d))
            .ok_or_else(|| StoreError::corrupt(format!("map ({name}) has no valid descriptor")))?;
        if descriptor.key_type != DataType::String || descriptor.value_type != DataType::String {
            return Err(StoreError::TypeMismatch {
                map: name.into(),
                key_type: descriptor.key_type,
                value_type: descriptor.value_type,
            });
        }

        debug!(map = name, id, "opened map");
        Ok(NamedMap {
            store: self,
            name: name.to_owned(),
            id,
        })
    }

    pub fn close(self) {
        debug!(path = %self.path.display(), "closed store");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

/// A string keyed map inside a [`Store`].
#[derive(Debug)]
pub struct NamedMap<'a> {
    store: &'a Store,
    name: String,
    id: u32,
}

impl NamedMap<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    fn scan(&self) -> Box<dyn DoubleEndedIterator<Item = (Bytes, Bytes)> + '_> {
        let start = map_prefix(self.id);
        let end = map_upper_bound(self.id);
        self.store
            .kv
            .scan(Bound::Included(&start[..]), Bound::Excluded(&end[..]))
    }

    /// Iterate the entries in ascending key order. Every call starts a new scan.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            map: &self.name,
            prefix: map_prefix(self.id),
            inner: self.scan(),
        }
    }

    /// Number of entries. The engine keeps no per-range counters, so this scans
    /// the map's key range.
    pub fn size(&self) -> usize {
        self.scan().filter(|(_, v)| !is_tombstone(v)).count()
    }
}

fn is_tombstone(cell: &[u8]) -> bool {
    cell == [TOMBSTONE]
}

pub struct Entries<'a> {
    map: &'a str,
    prefix: [u8; MAP_PREFIX_LEN],
    inner: Box<dyn DoubleEndedIterator<Item = (Bytes, Bytes)> + 'a>,
}

impl Entries<'_> {
    fn invalid(&self, reason: &str) -> StoreError {
        StoreError::InvalidEntry {
            map: self.map.into(),
            reason: reason.into(),
        }
    }

    fn decode(&self, key: Bytes, value: Bytes) -> StoreResult<Entry> {
        // the scan range of an id ending in 0xff also holds shorter keys
        let key = key
            .strip_prefix(&self.prefix[..])
            .ok_or_else(|| self.invalid("key does not start with the map prefix"))?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| self.invalid("key is not valid UTF-8"))?;
        let (&tag, payload) = value
            .split_first()
            .ok_or_else(|| self.invalid("value cell is empty"))?;
        if tag != DataType::String.tag() {
            return Err(self.invalid(&format!("value of key {key:?} is not a string")));
        }
        let value = String::from_utf8(payload.to_vec())
            .map_err(|_| self.invalid(&format!("value of key {key:?} is not valid UTF-8")))?;
        Ok(Entry { key, value })
    }
}

impl Iterator for Entries<'_> {
    type Item = StoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.inner.find(|(_, v)| !is_tombstone(v))?;
        Some(self.decode(key, value))
    }
}

#[derive(Debug, Clone, Copy)]
struct WriterMap {
    id: u32,
    value_type: DataType,
}

/// Builds store files. Changes are staged until [`StoreWriter::commit`] turns
/// them into a new chunk.
pub struct StoreWriter {
    maps: BTreeMap<String, WriterMap>,
    next_id: u32,
    pending: MemKvStore,
    chunks: Vec<(u64, Bytes)>,
    version: u64,
}

impl Default for StoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreWriter {
    pub fn new() -> Self {
        Self {
            maps: BTreeMap::new(),
            next_id: 1,
            pending: new_kv(),
            chunks: Vec::new(),
            version: 0,
        }
    }

    /// Declare a map, returning its id. Declaring an existing map returns the
    /// id it already has.
    pub fn create_map(&mut self, name: &str, key_type: DataType, value_type: DataType) -> u32 {
        if let Some(map) = self.maps.get(name) {
            return map.id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.pending.set(
            &meta_key(&format!("{MAP_NAME_PREFIX}{name}")),
            Bytes::from(format!("{:x}", id)),
        );
        self.pending.set(
            &meta_key(&descriptor_name(id)),
            Bytes::from(MapDescriptor::encode(name, key_type, value_type)),
        );
        self.maps.insert(name.to_owned(), WriterMap { id, value_type });
        id
    }

    pub fn create_string_map(&mut self, name: &str) -> u32 {
        self.create_map(name, DataType::String, DataType::String)
    }

    fn writer_map(&self, name: &str) -> StoreResult<WriterMap> {
        self.maps
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::MapNotFound(name.into()))
    }

    /// Stage an entry. Bytes are stored as given and tagged with the map's
    /// declared value type.
    pub fn insert(
        &mut self,
        map: &str,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> StoreResult<()> {
        let m = self.writer_map(map)?;
        let value = value.as_ref();
        let mut cell = BytesMut::with_capacity(value.len() + 1);
        cell.put_u8(m.value_type.tag());
        cell.put_slice(value);
        self.pending.set(&map_key(m.id, key.as_ref()), cell.freeze());
        Ok(())
    }

    pub fn remove(&mut self, map: &str, key: impl AsRef<[u8]>) -> StoreResult<()> {
        let m = self.writer_map(map)?;
        self.pending.set(
            &map_key(m.id, key.as_ref()),
            Bytes::from_static(&[TOMBSTONE]),
        );
        Ok(())
    }

    /// Seal the staged changes into a new chunk and return its version.
    pub fn commit(&mut self) -> u64 {
        self.version += 1;
        let payload = std::mem::replace(&mut self.pending, new_kv()).export_all();
        debug!(version = self.version, len = payload.len(), "committed chunk");
        self.chunks.push((self.version, payload));
        self.version
    }

    pub fn to_bytes(&self) -> Bytes {
        let len = HEADER_LEN
            + self
                .chunks
                .iter()
                .map(|(_, p)| CHUNK_HEADER_LEN + p.len())
                .sum::<usize>();
        let mut out = BytesMut::with_capacity(len);
        out.put_slice(MAGIC);
        out.put_u8(FORMAT_VERSION);
        for (version, payload) in &self.chunks {
            out.put_u64_le(*version);
            out.put_u32_le(payload.len() as u32);
            out.put_slice(payload);
        }
        out.freeze()
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
