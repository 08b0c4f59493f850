//! Per-forward-pass memoization of rule books.
//!
//! A [`RuleCache`] belongs to exactly one forward pass. Submanifold rule books are
//! shared by every layer that convolves the same active set with the same
//! geometry. Strided convolutions register their input/output sets and hand back a
//! [`DownsampleKey`]; the paired inverse convolution presents that key to recover
//! the recorded occupancy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::active_set::ActiveSet;
use crate::error::{CylCoreError, Result};
use crate::rules::{build_strided, build_submanifold, RuleBook};
use crate::traits::RuleProvider;
use crate::types::ConvGeometry;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Typed handle pairing a strided convolution with its inverse.
///
/// Only valid inside the [`RuleCache`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownsampleKey {
    scope: u64,
    slot: u32,
}

impl DownsampleKey {
    /// Cache scope that issued this key.
    #[inline]
    pub fn scope(&self) -> u64 {
        self.scope
    }

    /// Registration order of the strided convolution within its pass.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for DownsampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "down{}@pass{}", self.slot, self.scope)
    }
}

/// Result of a strided rule request.
#[derive(Debug, Clone)]
pub struct StridedRules {
    /// Downsampled active set.
    pub output: Arc<ActiveSet>,
    /// Gather/scatter rules from the input set to `output`.
    pub rules: Arc<RuleBook>,
    /// Handle for the paired inverse convolution.
    pub key: DownsampleKey,
}

/// Result of an inverse rule request.
#[derive(Debug, Clone)]
pub struct InverseRules {
    /// The active set recorded before downsampling.
    pub output: Arc<ActiveSet>,
    /// Gather/scatter rules from the coarse set back to `output`.
    pub rules: Arc<RuleBook>,
}

#[derive(Debug)]
struct DownsampleRecord {
    fine: Arc<ActiveSet>,
    coarse: Arc<ActiveSet>,
    forward: Arc<RuleBook>,
    inverse: Option<Arc<RuleBook>>,
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Submanifold requests answered from the cache.
    pub hits: usize,
    /// Rule books built.
    pub builds: usize,
    /// Registered downsampling stages.
    pub downsample_stages: usize,
}

/// Rule-book memo table owned by one forward pass.
#[derive(Debug)]
pub struct RuleCache {
    scope: u64,
    submanifold: FxHashMap<(u64, ConvGeometry), Arc<RuleBook>>,
    downsample: Vec<DownsampleRecord>,
    stats: CacheStats,
}

impl RuleCache {
    /// Create an empty cache with a fresh scope.
    pub fn new() -> Self {
        Self {
            scope: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            submanifold: FxHashMap::default(),
            downsample: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    /// Scope identifier of this cache.
    #[inline]
    pub fn scope(&self) -> u64 {
        self.scope
    }

    /// Cache counters.
    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Active sets recorded under `key`, as `(fine, coarse)`.
    pub fn recorded(&self, key: DownsampleKey) -> Result<(&Arc<ActiveSet>, &Arc<ActiveSet>)> {
        let record = self.record(key)?;
        Ok((&record.fine, &record.coarse))
    }

    fn record(&self, key: DownsampleKey) -> Result<&DownsampleRecord> {
        if key.scope != self.scope {
            return Err(CylCoreError::KeyNotFound { key });
        }
        self.downsample
            .get(key.slot())
            .ok_or(CylCoreError::KeyNotFound { key })
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleProvider for RuleCache {
    fn submanifold(
        &mut self,
        set: &Arc<ActiveSet>,
        geometry: &ConvGeometry,
    ) -> Result<Arc<RuleBook>> {
        let cache_key = (set.id(), *geometry);
        if let Some(book) = self.submanifold.get(&cache_key) {
            self.stats.hits += 1;
            log::debug!(
                "Rule cache hit: submanifold {:?} on set {} ({} voxels)",
                geometry.kernel,
                set.id(),
                set.len()
            );
            return Ok(Arc::clone(book));
        }

        let book = Arc::new(build_submanifold(set, geometry)?);
        self.stats.builds += 1;
        self.submanifold.insert(cache_key, Arc::clone(&book));
        Ok(book)
    }

    fn strided(&mut self, set: &Arc<ActiveSet>, geometry: &ConvGeometry) -> Result<StridedRules> {
        let (coarse, forward) = build_strided(set, geometry)?;
        let coarse = Arc::new(coarse);
        let forward = Arc::new(forward);
        self.stats.builds += 1;

        let key = DownsampleKey {
            scope: self.scope,
            slot: self.downsample.len() as u32,
        };
        self.downsample.push(DownsampleRecord {
            fine: Arc::clone(set),
            coarse: Arc::clone(&coarse),
            forward: Arc::clone(&forward),
            inverse: None,
        });
        self.stats.downsample_stages += 1;
        log::debug!("Registered {}: {} -> {} voxels", key, set.len(), coarse.len());

        Ok(StridedRules {
            output: coarse,
            rules: forward,
            key,
        })
    }

    fn inverse(&mut self, key: DownsampleKey, coarse: &Arc<ActiveSet>) -> Result<InverseRules> {
        self.record(key)?;
        let record = &mut self.downsample[key.slot()];
        record.coarse.ensure_same(coarse)?;

        let rules = match &record.inverse {
            Some(book) => {
                self.stats.hits += 1;
                Arc::clone(book)
            }
            None => {
                let book = Arc::new(record.forward.inverted());
                record.inverse = Some(Arc::clone(&book));
                self.stats.builds += 1;
                book
            }
        };

        Ok(InverseRules {
            output: Arc::clone(&record.fine),
            rules,
        })
    }
}
