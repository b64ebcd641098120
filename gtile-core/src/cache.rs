//! Advisory result cache: deterministic keys, framed blobs, a no-fail facade

use crate::error::{TileError, TileResult};
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use md5::{Digest, Md5};
use serde_json::Value;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store failed: {0}")]
    Backend(String),
}

/// Key/value store with per-entry time-to-live
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// In-process store; expired entries are dropped on read
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Instant, Vec<u8>)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.0 > Instant::now() => return Ok(Some(entry.1.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), (Instant::now() + ttl, value));
        Ok(())
    }
}

/// Wraps an optional store; every failure degrades to a miss or a no-op
#[derive(Clone)]
pub struct CacheFacade {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl CacheFacade {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store: Some(store), ttl }
    }

    pub fn disabled() -> Self {
        Self { store: None, ttl: Duration::ZERO }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(blob)) => match unframe(&blob) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    log::debug!("Discarding cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::debug!("Cache get failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Store in the background; never blocks the caller on the store
    pub fn set_detached(&self, key: String, payload: Vec<u8>) {
        let Some(store) = self.store.clone() else { return };
        let ttl = self.ttl;
        tokio::spawn(async move {
            let blob = match frame(&payload) {
                Ok(blob) => blob,
                Err(e) => {
                    log::debug!("Could not frame cache entry {}: {}", key, e);
                    return;
                }
            };
            if let Err(e) = store.set(&key, blob, ttl).await {
                log::debug!("Cache set failed for {}: {}", key, e);
            }
        });
    }

    /// Store and wait for the store to answer; failures are still swallowed
    pub async fn set(&self, key: &str, payload: &[u8]) {
        let Some(store) = self.store.as_ref() else { return };
        match frame(payload) {
            Ok(blob) => {
                if let Err(e) = store.set(key, blob, self.ttl).await {
                    log::debug!("Cache set failed for {}: {}", key, e);
                }
            }
            Err(e) => log::debug!("Could not frame cache entry {}: {}", key, e),
        }
    }
}

/// JSON with object keys sorted at every depth; arrays keep their order
pub fn canonical_json(value: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), sorted(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// hex(md5(canonical JSON of `inputs` followed by `options`))
pub fn cache_key(inputs: &Value, options: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(canonical_json(inputs).as_bytes());
    hasher.update(options.as_bytes());
    format!("{:x}", hasher.finalize())
}

const BLOB_MAGIC: u32 = u32::from_le_bytes(*b"GTC1");
const BLOB_VERSION: u16 = 1;
const BLOB_HEADER_LEN: usize = 4 + 2 + 8 + 4;

/// magic | version | xxh64 of the payload | payload length | zstd(payload)
pub fn frame(payload: &[u8]) -> TileResult<Vec<u8>> {
    let compressed = zstd::encode_all(payload, 3)?;
    let mut out = Vec::with_capacity(BLOB_HEADER_LEN + compressed.len());
    out.write_u32::<LittleEndian>(BLOB_MAGIC)?;
    out.write_u16::<LittleEndian>(BLOB_VERSION)?;
    out.write_u64::<LittleEndian>(xxhash_rust::xxh64::xxh64(payload, 0))?;
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn unframe(blob: &[u8]) -> TileResult<Vec<u8>> {
    if blob.len() < BLOB_HEADER_LEN {
        return Err(TileError::corrupt("cache blob too short"));
    }
    let mut cursor = Cursor::new(blob);
    if cursor.read_u32::<LittleEndian>()? != BLOB_MAGIC {
        return Err(TileError::corrupt("invalid cache blob magic"));
    }
    let version = cursor.read_u16::<LittleEndian>()?;
    if version != BLOB_VERSION {
        return Err(TileError::corrupt(format!("unsupported cache blob version {}", version)));
    }
    let checksum = cursor.read_u64::<LittleEndian>()?;
    let len = cursor.read_u32::<LittleEndian>()? as usize;

    let mut compressed = Vec::new();
    cursor.read_to_end(&mut compressed)?;
    let payload = zstd::decode_all(compressed.as_slice())?;
    if payload.len() != len || xxhash_rust::xxh64::xxh64(&payload, 0) != checksum {
        return Err(TileError::corrupt("cache blob checksum mismatch"));
    }
    Ok(payload)
}
