//! Shared shader map cache with at most one compile in flight per key.
//!
//! Each key owns a slot with its own lock. A requester that finds the slot compiling waits on the
//! slot's condvar and receives the result of that compile instead of starting another one.
//! Translation and the backend compile run outside every lock.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};

use super::artifact::{ShaderMap, ShaderMapEntry, staleness};
use super::backend::{CompileJob, ShaderBackend};
use super::key::{ShaderMapKey, StaticSwitchSet};
use super::queue::{CompileQueue, PendingCompile};
use crate::error::ShaderMapError;
use crate::material::Material;
use crate::translator::{TranslationOutput, WgslTranslator};

enum SlotState {
    Idle {
        /// Failure of the most recent compile, tagged with that compile's generation.
        last_failure: Option<(u64, ShaderMapError)>,
    },
    Compiling {
        generation: u64,
    },
    Ready {
        map: Arc<ShaderMap>,
        /// False for imported maps until a fresh translation confirms their bindings.
        verified: bool,
    },
}

struct CacheSlot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl CacheSlot {
    fn new(state: SlotState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        })
    }
}

/// Puts a slot back to idle and wakes its waiters when a compile unwinds.
struct CompileGuard<'a> {
    slot: &'a CacheSlot,
    armed: bool,
}

impl Drop for CompileGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot.state.lock() = SlotState::Idle { last_failure: None };
            self.slot.changed.notify_all();
        }
    }
}

pub struct ShaderMapCache {
    backend: Arc<dyn ShaderBackend>,
    queue: Option<CompileQueue>,
    slots: Mutex<HashMap<ShaderMapKey, Arc<CacheSlot>>>,
    next_generation: Mutex<u64>,
}

impl ShaderMapCache {
    /// A cache that compiles on the calling thread.
    pub fn new(backend: Arc<dyn ShaderBackend>) -> Self {
        Self {
            backend,
            queue: None,
            slots: Mutex::new(HashMap::new()),
            next_generation: Mutex::new(0),
        }
    }

    /// A cache whose [`request`](Self::request) compiles on `workers` background threads.
    pub fn with_workers(backend: Arc<dyn ShaderBackend>, workers: usize) -> Result<Self> {
        Ok(Self {
            queue: Some(CompileQueue::new(workers)?),
            ..Self::new(backend)
        })
    }

    fn slot(&self, key: &ShaderMapKey) -> Arc<CacheSlot> {
        self.slots
            .lock()
            .entry(key.clone())
            .or_insert_with(|| CacheSlot::new(SlotState::Idle { last_failure: None }))
            .clone()
    }

    fn existing_slot(&self, key: &ShaderMapKey) -> Option<Arc<CacheSlot>> {
        self.slots.lock().get(key).cloned()
    }

    fn generation(&self) -> u64 {
        let mut next = self.next_generation.lock();
        *next += 1;
        *next
    }

    /// Return the complete shader map for `key`, translating and compiling it first if needed.
    ///
    /// Concurrent callers for the same key share one compile. A failed compile leaves nothing
    /// cached, so the next call retries.
    pub fn get_or_compile(
        &self,
        material: &Material,
        key: &ShaderMapKey,
    ) -> Result<Arc<ShaderMap>, ShaderMapError> {
        let slot = self.slot(key);
        let mut state = slot.state.lock();
        let mut waited_on: Option<u64> = None;

        let (generation, imported) = loop {
            match &*state {
                SlotState::Ready { map, verified: true } if map.is_complete() => {
                    debug!("Shader map cache hit: {}", key.summary());
                    return Ok(map.clone());
                }
                SlotState::Compiling { generation } => {
                    waited_on = Some(*generation);
                    slot.changed.wait(&mut state);
                }
                SlotState::Idle {
                    last_failure: Some((failed, err)),
                } if waited_on == Some(*failed) => {
                    return Err(err.clone());
                }
                SlotState::Ready { map, .. } => {
                    let imported = map.clone();
                    let generation = self.generation();
                    *state = SlotState::Compiling { generation };
                    break (generation, Some(imported));
                }
                SlotState::Idle { .. } => {
                    let generation = self.generation();
                    *state = SlotState::Compiling { generation };
                    break (generation, None);
                }
            }
        };
        drop(state);

        debug!("Shader map cache miss: {}", key.summary());
        let mut guard = CompileGuard {
            slot: &slot,
            armed: true,
        };
        let result = self.compile(material, key, imported);
        guard.armed = false;

        let mut state = slot.state.lock();
        *state = match &result {
            Ok(map) => SlotState::Ready {
                map: map.clone(),
                verified: true,
            },
            Err(err) => SlotState::Idle {
                last_failure: Some((generation, err.clone())),
            },
        };
        drop(state);
        slot.changed.notify_all();
        result
    }

    fn compile(
        &self,
        material: &Material,
        key: &ShaderMapKey,
        imported: Option<Arc<ShaderMap>>,
    ) -> Result<Arc<ShaderMap>, ShaderMapError> {
        let name = material.graph().metadata.name.clone();
        let output = translate(material, key);
        let Some(shader_text) = output.shader_text.clone() else {
            let err = ShaderMapError::Translation {
                material: name.clone(),
                diagnostics: output.diagnostics,
            };
            return Err(self.report_failure(material, err));
        };

        if let Some(imported) = imported {
            match staleness(&imported.uniform_expression_set, &output.uniform_expression_set) {
                None => {
                    debug!("Imported shader map for {} verified", key.summary());
                    let mut map = (*imported).clone();
                    map.shader_text = shader_text;
                    map.max_texture_dependency_length = output.max_texture_dependency_length;
                    return Ok(Arc::new(map));
                }
                Some(reason) => debug!("Recompiling {}: {reason}", key.summary()),
            }
        }

        debug!(
            "Submitting '{name}' ({}) to backend {}",
            key.summary(),
            self.backend.name()
        );
        let job = CompileJob {
            key: key.clone(),
            friendly_name: name.clone(),
            shader_text,
        };
        let stages = match self.backend.compile(&job) {
            Ok(stages) => stages,
            Err(source) => {
                let err = ShaderMapError::Backend {
                    material: name,
                    source,
                };
                return Err(self.report_failure(material, err));
            }
        };

        Ok(Arc::new(ShaderMap::complete(
            key.clone(),
            name,
            output.uniform_expression_set,
            stages,
            job.shader_text,
            output.max_texture_dependency_length,
        )))
    }

    fn report_failure(&self, material: &Material, err: ShaderMapError) -> ShaderMapError {
        let name = material.graph().metadata.name.clone();
        for diagnostic in err.diagnostics() {
            warn!("{name}: {diagnostic}");
        }
        if material.is_fallback_of_last_resort() {
            error!("Fallback material '{name}' failed to compile: {err}");
            return ShaderMapError::FallbackMaterialFailed {
                material: name,
                reason: Box::new(err),
            };
        }
        let count = err.diagnostics().len().max(1);
        warn!("Material '{name}' failed to compile with {count} error(s); the default material will be used");
        err
    }

    /// Compile `material`, or substitute `fallback` compiled for the same platform and quality.
    pub fn get_or_fallback(
        &self,
        material: &Material,
        key: &ShaderMapKey,
        fallback: &Material,
    ) -> Result<Arc<ShaderMap>, ShaderMapError> {
        let err = match self.get_or_compile(material, key) {
            Ok(map) => return Ok(map),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => err,
        };

        let fallback_key = ShaderMapKey::new(fallback.id())
            .with_switches(StaticSwitchSet::new())
            .with_platform(key.platform)
            .with_quality(key.quality);
        warn!(
            "Using '{}' in place of {}: {err}",
            fallback.graph().metadata.name,
            key.summary()
        );
        self.get_or_compile(fallback, &fallback_key)
            .map_err(|reason| match reason {
                fatal @ ShaderMapError::FallbackMaterialFailed { .. } => fatal,
                reason => ShaderMapError::FallbackMaterialFailed {
                    material: fallback.graph().metadata.name.clone(),
                    reason: Box::new(reason),
                },
            })
    }

    /// Compile without blocking the caller. Uses the worker pool when there is one.
    pub fn request(
        self: &Arc<Self>,
        material: Arc<Material>,
        key: ShaderMapKey,
    ) -> PendingCompile<Arc<ShaderMap>> {
        if let Some(map) = self.get(&key) {
            return PendingCompile::ready(Ok(map));
        }
        match &self.queue {
            Some(queue) => {
                let cache = self.clone();
                queue.submit_with(move || cache.get_or_compile(&material, &key))
            }
            None => PendingCompile::ready(self.get_or_compile(&material, &key)),
        }
    }

    /// True when a verified, complete map is cached for `key`. Never blocks on a compile.
    pub fn is_ready(&self, key: &ShaderMapKey) -> bool {
        self.get(key).is_some()
    }

    /// The verified map for `key`, without compiling.
    pub fn get(&self, key: &ShaderMapKey) -> Option<Arc<ShaderMap>> {
        let slot = self.existing_slot(key)?;
        let state = slot.state.lock();
        match &*state {
            SlotState::Ready { map, verified: true } if map.is_complete() => Some(map.clone()),
            _ => None,
        }
    }

    /// Evict `key`. The next request for it recompiles.
    pub fn flush(&self, key: &ShaderMapKey) {
        if self.slots.lock().remove(key).is_some() {
            debug!("Flushed shader map {}", key.summary());
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Vec<Arc<ShaderMap>> {
        let slots: Vec<Arc<CacheSlot>> = self.slots.lock().values().cloned().collect();
        let mut maps: Vec<Arc<ShaderMap>> = slots
            .iter()
            .filter_map(|slot| match &*slot.state.lock() {
                SlotState::Ready { map, .. } => Some(map.clone()),
                _ => None,
            })
            .collect();
        maps.sort_by(|a, b| a.key.cmp(&b.key));
        maps
    }

    /// Persisted form of every cached map, ordered by key.
    pub fn export_entries(&self) -> Vec<ShaderMapEntry> {
        self.entries().iter().map(|m| m.to_entry()).collect()
    }

    /// Load persisted entries. They stay unverified until their first `get_or_compile`.
    /// Incomplete entries and keys that already hold a map are skipped. Returns how many were
    /// imported.
    pub fn import_entries(&self, entries: Vec<ShaderMapEntry>) -> Result<usize> {
        let mut imported = 0;
        for entry in entries {
            let map = ShaderMap::from_entry(entry)?;
            if !map.is_complete() {
                debug!("Skipping incomplete shader map entry {}", map.key.summary());
                continue;
            }
            let mut slots = self.slots.lock();
            if slots.contains_key(&map.key) {
                continue;
            }
            let key = map.key.clone();
            slots.insert(
                key,
                CacheSlot::new(SlotState::Ready {
                    map: Arc::new(map),
                    verified: false,
                }),
            );
            imported += 1;
        }
        debug!("Imported {imported} shader map entr(y/ies)");
        Ok(imported)
    }
}

/// Translate `material` for the platform, quality and switches in `key`.
pub fn translate(material: &Material, key: &ShaderMapKey) -> TranslationOutput {
    WgslTranslator::new(key.platform, key.quality, key.static_switches.clone()).translate(material)
}
