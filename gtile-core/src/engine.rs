//! Request orchestration: tile batches, tileset info and fragments
//!
//! The engine owns the handle cache, the cache facade and the in-flight
//! request limit. Every request returns a well-formed answer; failures are
//! attached to the tile, uid or locus they concern.

use crate::cache::{cache_key, CacheFacade, CacheStore};
use crate::config::EngineConfig;
use crate::coords::ChromSizes;
use crate::error::{TileError, TileResult};
use crate::fragments::{self, BulkPolicy, FragmentOptions, FragmentResult, FragmentsResponse, Locus};
use crate::handles::HandleCache;
use crate::payload::{TilePayload, TileResponse};
use crate::readers::{DatasetOpener, FileOpener, Reader};
use crate::registry::{ChromsizesCatalog, Registry};
use crate::tiling;
use crate::types::{DatasetDescriptor, TileId, TilesetInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

const UNKNOWN_TILESET: &str = "Unknown tileset";

/// Tileset info for one uid, or why there is none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoResponse {
    Info(TilesetInfo),
    Error { error: String },
}

pub struct EngineBuilder {
    registry: Arc<dyn Registry>,
    catalog: Option<Arc<dyn ChromsizesCatalog>>,
    opener: Arc<dyn DatasetOpener>,
    cache: Option<Arc<dyn CacheStore>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn catalog(mut self, catalog: Arc<dyn ChromsizesCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn opener(mut self, opener: Arc<dyn DatasetOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Engine {
        let cache = match self.cache {
            Some(store) => CacheFacade::new(store, self.config.cache_ttl()),
            None => CacheFacade::disabled(),
        };
        Engine {
            registry: self.registry,
            catalog: self.catalog,
            opener: self.opener,
            cache,
            handles: Arc::new(HandleCache::new(self.config.max_open_handles)),
            permits: Arc::new(Semaphore::new(self.config.max_inflight_requests.max(1))),
            config: self.config,
        }
    }
}

pub struct Engine {
    registry: Arc<dyn Registry>,
    catalog: Option<Arc<dyn ChromsizesCatalog>>,
    opener: Arc<dyn DatasetOpener>,
    cache: CacheFacade,
    handles: Arc<HandleCache>,
    permits: Arc<Semaphore>,
    config: EngineConfig,
}

impl Engine {
    pub fn builder(registry: Arc<dyn Registry>) -> EngineBuilder {
        EngineBuilder {
            registry,
            catalog: None,
            opener: Arc::new(FileOpener),
            cache: None,
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    async fn permit(&self) -> TileResult<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TileError::unsupported("Engine is shut down"))
    }

    /// Run blocking reader work off the async threads under the read deadline
    async fn blocking<T, F>(&self, work: F) -> TileResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> TileResult<T> + Send + 'static,
    {
        let deadline = self.config.read_deadline();
        match tokio::time::timeout(deadline, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(TileError::corrupt(format!("read task failed: {}", e))),
            Err(_) => {
                log::warn!("Read deadline of {}s elapsed", self.config.read_deadline_secs);
                Err(TileError::timeout(self.config.read_deadline_secs))
            }
        }
    }

    async fn coords_for(&self, descriptor: &DatasetDescriptor) -> Option<Arc<ChromSizes>> {
        let name = descriptor.coord_system.as_deref()?;
        let catalog = self.catalog.as_ref()?;
        let coords = catalog.get(name).await;
        if coords.is_none() {
            log::debug!("Coordinate system '{}' is not in the catalog", name);
        }
        coords
    }

    /// Look up a uid and return its open reader
    async fn open(&self, uid: &str) -> TileResult<Arc<Reader>> {
        let descriptor = self
            .registry
            .get(uid)
            .await
            .ok_or_else(|| TileError::not_found(UNKNOWN_TILESET))?;
        let coords = self.coords_for(&descriptor).await;

        let handles = self.handles.clone();
        let opener = self.opener.clone();
        self.blocking(move || {
            handles.get_or_open(&descriptor.path, || opener.open(&descriptor, coords.as_deref()))
        })
        .await
    }

    /// Render a batch of tile ids. Every requested id inside its dataset gets
    /// a key; ids outside their dataset are omitted.
    pub async fn tiles<S: AsRef<str>>(&self, raw_ids: &[S]) -> BTreeMap<String, TileResponse> {
        let requested: BTreeSet<&str> = raw_ids.iter().map(|s| s.as_ref()).collect();
        let mut out = BTreeMap::new();

        let _permit = match self.permit().await {
            Ok(permit) => permit,
            Err(e) => {
                for raw in requested {
                    out.insert(raw.to_string(), TileResponse::error(e.to_string()));
                }
                return out;
            }
        };

        let mut misses = Vec::new();
        for raw in requested {
            match self.cached_tile(raw).await {
                Some(payload) => {
                    out.insert(raw.to_string(), TileResponse::Tile(payload));
                }
                None => misses.push(raw),
            }
        }
        let hits = out.len();

        let (datasets, failures) = tiling::group_by_dataset(misses.iter().copied());
        for (raw, e) in failures {
            out.insert(raw, TileResponse::error(e.to_string()));
        }

        let n_datasets = datasets.len();
        let mut rendered = Vec::new();
        for (uid, ids) in datasets {
            self.render_dataset(&uid, ids, &mut out, &mut rendered).await;
        }

        for (raw, payload) in rendered {
            if let Ok(bytes) = serde_json::to_vec(&payload) {
                self.cache.set_detached(tile_cache_key(&raw), bytes);
            }
            out.insert(raw, TileResponse::Tile(payload));
        }

        let errors = out.values().filter(|r| r.is_error()).count();
        log::info!(
            "Served {} tiles from {} datasets ({} cached, {} errors)",
            out.len(),
            n_datasets,
            hits,
            errors
        );
        out
    }

    async fn cached_tile(&self, raw: &str) -> Option<TilePayload> {
        if !self.cache.is_enabled() {
            return None;
        }
        let bytes = self.cache.get(&tile_cache_key(raw)).await?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn render_dataset(
        &self,
        uid: &str,
        ids: Vec<TileId>,
        out: &mut BTreeMap<String, TileResponse>,
        rendered: &mut Vec<(String, TilePayload)>,
    ) {
        let reader = match self.open(uid).await {
            Ok(reader) => reader,
            Err(e) => {
                if !matches!(e, TileError::NotFound { .. }) {
                    log::warn!("Could not open dataset {}: {}", uid, e);
                }
                for id in ids {
                    out.insert(id.raw, TileResponse::error(e.to_string()));
                }
                return;
            }
        };

        let info = Arc::new(reader.info());
        let plan = tiling::plan(&reader, &info, ids, self.config.pixel_budget_tiles);
        for (raw, e) in plan.rejected {
            out.insert(raw, TileResponse::error(e.to_string()));
        }

        let deadline = self.config.read_deadline();
        let deadline_secs = self.config.read_deadline_secs;
        let mut unanswered: BTreeSet<String> = BTreeSet::new();
        let mut tasks = JoinSet::new();
        for group in plan.groups {
            unanswered.extend(group.members.iter().map(|m| m.raw.clone()));
            let reader = reader.clone();
            let info = info.clone();
            tasks.spawn(async move {
                let members: Vec<String> = group.members.iter().map(|m| m.raw.clone()).collect();
                let work = tokio::task::spawn_blocking(move || tiling::render_group(&reader, &info, &group));
                let result = match tokio::time::timeout(deadline, work).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(TileError::corrupt(format!("render task failed: {}", e))),
                    Err(_) => Err(TileError::timeout(deadline_secs)),
                };
                (members, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (members, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    log::warn!("Render task of {} did not finish: {}", uid, e);
                    continue;
                }
            };
            for raw in &members {
                unanswered.remove(raw);
            }
            match result {
                Ok(tiles) => rendered.extend(tiles),
                Err(e) => {
                    log::warn!("Failed to render {} tiles of {}: {}", members.len(), uid, e);
                    for raw in members {
                        out.insert(raw, TileResponse::error(e.to_string()));
                    }
                }
            }
        }

        // tiles of a task that panicked or was cancelled
        for raw in unanswered {
            out.insert(raw, TileResponse::error("Tile rendering was interrupted"));
        }
    }

    /// Tileset info keyed by uid
    pub async fn tileset_info<S: AsRef<str>>(&self, uids: &[S]) -> BTreeMap<String, InfoResponse> {
        let mut out = BTreeMap::new();
        let _permit = self.permit().await;
        for uid in uids {
            let uid = uid.as_ref();
            let response = match self.open(uid).await {
                Ok(reader) => InfoResponse::Info(reader.info()),
                Err(e) => InfoResponse::Error { error: e.to_string() },
            };
            out.insert(uid.to_string(), response);
        }
        out
    }

    /// The registry's datasets in uid order
    pub async fn datasets(&self) -> Vec<DatasetDescriptor> {
        self.registry.list().await
    }

    /// Extract fragments for a loci body (`[...]` or `{"loci": [...]}`).
    ///
    /// Fails whole only on bad options or a malformed envelope; results
    /// follow input order.
    pub async fn fragments(&self, body: &Value, opts: &FragmentOptions) -> TileResult<FragmentsResponse> {
        opts.validate(self.config.max_fragment_dims)?;
        let parsed = fragments::parse_loci(body)?;
        let _permit = self.permit().await?;

        let loci_value = match body {
            Value::Object(map) => map.get("loci").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let key = cache_key(&loci_value, &opts.cache_suffix());
        if !opts.no_cache {
            if let Some(hit) = self.cache.get(&key).await.and_then(|b| serde_json::from_slice(&b).ok()) {
                log::debug!("Fragments cache hit {}", key);
                return Ok(hit);
            }
        }

        let mut results: Vec<Option<FragmentResult>> = vec![None; parsed.len()];
        let mut groups: BTreeMap<(String, u32), Vec<(usize, Locus)>> = BTreeMap::new();
        for (i, locus) in parsed.into_iter().enumerate() {
            match locus {
                Ok(locus) => groups.entry((locus.uid.clone(), locus.zoomout)).or_default().push((i, locus)),
                Err(e) => results[i] = Some(FragmentResult::Error { error: e.to_string() }),
            }
        }

        let policy = BulkPolicy {
            min_bin_size: self.config.cis_bulk_min_bin_size,
            max_cells: self.config.bulk_max_cells(),
        };
        for ((uid, zoomout), members) in groups {
            let (indices, loci): (Vec<usize>, Vec<Locus>) = members.into_iter().unzip();
            let extracted = match self.open(&uid).await {
                Ok(reader) => {
                    let opts = opts.clone();
                    let n = loci.len();
                    self.blocking(move || match reader.as_cooler() {
                        Some(cooler) => Ok(fragments::extract(cooler, zoomout, &loci, &opts, policy)),
                        None => Err(TileError::unsupported(format!(
                            "Fragments need a cooler dataset, {} is {}",
                            uid,
                            reader.filetype()
                        ))),
                    })
                    .await
                    .unwrap_or_else(|e| vec![Err(e); n])
                }
                Err(e) => vec![Err(e); loci.len()],
            };
            for (i, result) in indices.into_iter().zip(extracted) {
                results[i] = Some(result.into());
            }
        }

        let response = FragmentsResponse {
            fragments: results
                .into_iter()
                .map(|r| r.unwrap_or(FragmentResult::Error { error: "fragment was not extracted".into() }))
                .collect(),
        };

        let failed = response.fragments.iter().filter(|f| matches!(f, FragmentResult::Error { .. })).count();
        log::info!("Extracted {} fragments ({} errors)", response.fragments.len(), failed);
        if !opts.no_cache && failed == 0 {
            if let Ok(bytes) = serde_json::to_vec(&response) {
                self.cache.set_detached(key, bytes);
            }
        }
        Ok(response)
    }

    /// Close every open handle and refuse further requests
    pub fn shutdown(&self) {
        self.permits.close();
        self.handles.clear();
        log::info!("Engine shut down");
    }
}

fn tile_cache_key(raw: &str) -> String {
    cache_key(&Value::String(raw.to_string()), "tile")
}
