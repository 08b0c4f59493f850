//! Traits for rule-book sources.
//!
//! Sparse convolution layers never build rule books themselves; they ask a
//! [`RuleProvider`] for them. [`RuleCache`](crate::cache::RuleCache) is the
//! per-pass memoizing implementation, and tests can wrap it to observe requests.

use std::sync::Arc;

use crate::active_set::ActiveSet;
use crate::cache::{DownsampleKey, InverseRules, StridedRules};
use crate::error::Result;
use crate::rules::RuleBook;
use crate::types::ConvGeometry;

/// Source of rule books for the three sparse convolution modes.
///
/// Object safe, so layers take `&mut dyn RuleProvider`.
pub trait RuleProvider {
    /// Rule book of a submanifold convolution over `set`.
    ///
    /// Repeated requests for the same set and geometry may return the same book.
    fn submanifold(&mut self, set: &Arc<ActiveSet>, geometry: &ConvGeometry)
        -> Result<Arc<RuleBook>>;

    /// Downsampled set and rule book of a strided convolution over `set`.
    ///
    /// The returned key identifies this stage for a later [`inverse`](Self::inverse).
    fn strided(&mut self, set: &Arc<ActiveSet>, geometry: &ConvGeometry) -> Result<StridedRules>;

    /// Rules that map features on `coarse` back to the set recorded under `key`.
    ///
    /// Fails with `KeyNotFound` when `key` was not issued by this provider, and with
    /// `ActiveSetMismatch` when `coarse` is not the set that stage produced.
    fn inverse(&mut self, key: DownsampleKey, coarse: &Arc<ActiveSet>) -> Result<InverseRules>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RuleCache;
    use crate::types::{SpatialShape, VoxelCoord};

    /// Counts requests while delegating to a real cache.
    struct Counting {
        inner: RuleCache,
        calls: usize,
    }

    impl RuleProvider for Counting {
        fn submanifold(
            &mut self,
            set: &Arc<ActiveSet>,
            geometry: &ConvGeometry,
        ) -> Result<Arc<RuleBook>> {
            self.calls += 1;
            self.inner.submanifold(set, geometry)
        }

        fn strided(
            &mut self,
            set: &Arc<ActiveSet>,
            geometry: &ConvGeometry,
        ) -> Result<StridedRules> {
            self.calls += 1;
            self.inner.strided(set, geometry)
        }

        fn inverse(
            &mut self,
            key: DownsampleKey,
            coarse: &Arc<ActiveSet>,
        ) -> Result<InverseRules> {
            self.calls += 1;
            self.inner.inverse(key, coarse)
        }
    }

    fn use_dyn(provider: &mut dyn RuleProvider, set: &Arc<ActiveSet>) -> Result<usize> {
        let g = ConvGeometry::new([3, 3, 3]);
        let book = provider.submanifold(set, &g)?;
        Ok(book.num_pairs())
    }

    #[test]
    fn test_provider_is_object_safe() {
        let set = Arc::new(
            ActiveSet::new(
                vec![VoxelCoord::new(0, 1, 1, 1), VoxelCoord::new(0, 1, 1, 2)],
                SpatialShape::new([4, 4, 4]),
                1,
            )
            .unwrap(),
        );
        let mut provider = Counting {
            inner: RuleCache::new(),
            calls: 0,
        };

        // Two centre pairs plus one pair in each direction along the last axis
        assert_eq!(use_dyn(&mut provider, &set).unwrap(), 4);
        assert_eq!(use_dyn(&mut provider, &set).unwrap(), 4);
        assert_eq!(provider.calls, 2);
        assert_eq!(provider.inner.stats().hits, 1);
    }
}
