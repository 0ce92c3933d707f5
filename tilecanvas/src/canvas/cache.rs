//! Tile cache owned by the canvas reactor.
//!
//! Tracks which specs the current view requires, which tiles are cached for
//! them, and which cached tiles are only kept around for a grace period.
//! Everything here is synchronous; the reactor is the only caller.
//!
//! # Eviction
//!
//! A cached tile whose spec is not required is released when any of these
//! holds:
//!
//! - it was last required more than `grace_passes` passes ago
//! - its level is further than `max_level_distance` from the selected level
//! - it was composited from another layer stack (stale)
//!
//! unless it overlaps a required spec that has no fresh tile yet, in which
//! case it is still the only thing to draw there and is kept. Tiles backing
//! required specs are only ever replaced, never evicted.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::snapshot::DrawableTile;
use crate::layer::LayerStack;
use crate::tile::{MapRegion, Tile, TileSpec};

/// Default number of passes a no-longer-required tile is retained.
pub const DEFAULT_GRACE_PASSES: u32 = 8;

/// Default level distance beyond which retained tiles are dropped.
pub const DEFAULT_MAX_LEVEL_DISTANCE: u8 = 1;

/// Retention policy for tiles that are no longer required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub grace_passes: u32,
    pub max_level_distance: u8,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            grace_passes: DEFAULT_GRACE_PASSES,
            max_level_distance: DEFAULT_MAX_LEVEL_DISTANCE,
        }
    }
}

/// Outcome of one resolve pass.
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Required specs without a fresh tile, nearest to the view center first.
    pub to_fetch: Vec<TileSpec>,
    /// Specs required now that were not required by the previous pass.
    pub newly_required: usize,
    /// Tiles evicted by this pass.
    pub released: Vec<Tile>,
}

/// Outcome of inserting a completed tile.
#[derive(Debug)]
pub enum Insertion {
    /// The tile is cached. `released` holds the tile it replaced and any
    /// tiles it made evictable.
    Accepted { visible: bool, released: Vec<Tile> },
    /// The tile was built from an outdated layer stack and was not cached.
    Stale(Tile),
}

#[derive(Debug)]
struct Entry {
    tile: Tile,
    last_required_pass: u64,
}

/// Spec-keyed tile cache with grace retention.
#[derive(Debug)]
pub struct TileCache {
    entries: HashMap<TileSpec, Entry>,
    required: HashSet<TileSpec>,
    level: Option<u8>,
    pass: u64,
    layers: LayerStack,
    policy: EvictionPolicy,
    tile_size: u32,
    level_count: u8,
}

impl TileCache {
    pub fn new(tile_size: u32, level_count: u8, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            required: HashSet::new(),
            level: None,
            pass: 0,
            layers: LayerStack::default(),
            policy,
            tile_size,
            level_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, spec: &TileSpec) -> bool {
        self.entries.contains_key(spec)
    }

    pub fn get(&self, spec: &TileSpec) -> Option<&Tile> {
        self.entries.get(spec).map(|e| &e.tile)
    }

    pub fn required(&self) -> &HashSet<TileSpec> {
        &self.required
    }

    pub fn is_required(&self, spec: &TileSpec) -> bool {
        self.required.contains(spec)
    }

    /// Selected level of the latest pass.
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    /// Number of passes applied so far.
    pub fn pass(&self) -> u64 {
        self.pass
    }

    /// Adopt a new layer stack. Every cached tile built from another stack
    /// becomes stale; stale tiles that can go are returned.
    pub fn set_layers(&mut self, layers: &LayerStack) -> Vec<Tile> {
        self.layers = layers.clone();
        self.evict()
    }

    /// Returns true if the tile was composited from the current layer stack.
    pub fn is_fresh(&self, tile: &Tile) -> bool {
        tile.matches_layers(&self.layers)
    }

    /// Returns true if `spec` has a tile built from the current layers.
    pub fn has_fresh(&self, spec: &TileSpec) -> bool {
        self.entries
            .get(spec)
            .is_some_and(|e| self.is_fresh(&e.tile))
    }

    /// Apply a resolve pass: replace the required set and evict what the
    /// policy allows.
    pub fn apply_pass(&mut self, required: HashSet<TileSpec>, level: Option<u8>) -> PassOutcome {
        self.pass += 1;
        let newly_required = required.difference(&self.required).count();
        self.required = required;
        self.level = level;

        for spec in &self.required {
            if let Some(entry) = self.entries.get_mut(spec) {
                entry.last_required_pass = self.pass;
            }
        }

        let released = self.evict();
        PassOutcome {
            to_fetch: self.missing(),
            newly_required,
            released,
        }
    }

    /// Required specs without a fresh tile, nearest to the center of the
    /// required area first.
    pub fn missing(&self) -> Vec<TileSpec> {
        let mut missing: Vec<TileSpec> = self
            .required
            .iter()
            .filter(|spec| !self.has_fresh(spec))
            .copied()
            .collect();
        if missing.is_empty() {
            return missing;
        }

        let count = self.required.len() as f64;
        let center_row = self.required.iter().map(|s| s.row() as f64).sum::<f64>() / count;
        let center_col = self.required.iter().map(|s| s.col() as f64).sum::<f64>() / count;
        let distance = |spec: &TileSpec| {
            let dr = spec.row() as f64 - center_row;
            let dc = spec.col() as f64 - center_col;
            dr * dr + dc * dc
        };
        missing.sort_by(|a, b| distance(a).total_cmp(&distance(b)).then(a.cmp(b)));
        missing
    }

    fn missing_regions(&self) -> Vec<MapRegion> {
        self.required
            .iter()
            .filter(|spec| !self.has_fresh(spec))
            .map(|spec| spec.map_region(self.tile_size, self.level_count))
            .collect()
    }

    /// Cache a completed tile.
    pub fn insert(&mut self, tile: Tile) -> Insertion {
        if !self.is_fresh(&tile) {
            return Insertion::Stale(tile);
        }

        let spec = tile.spec();
        let visible = self.required.contains(&spec);
        let previous = self.entries.insert(
            spec,
            Entry {
                tile,
                last_required_pass: self.pass,
            },
        );

        let mut released: Vec<Tile> = previous.map(|e| e.tile).into_iter().collect();
        released.extend(self.evict());
        Insertion::Accepted { visible, released }
    }

    /// Release every tile the policy allows.
    pub fn evict(&mut self) -> Vec<Tile> {
        let missing = self.missing_regions();
        let evictable: Vec<TileSpec> = self
            .entries
            .iter()
            .filter(|(spec, entry)| !self.required.contains(spec) && self.expired(spec, entry))
            .filter(|(spec, _)| {
                let region = spec.map_region(self.tile_size, self.level_count);
                !missing.iter().any(|m| m.intersects(&region))
            })
            .map(|(spec, _)| *spec)
            .collect();

        evictable
            .into_iter()
            .filter_map(|spec| {
                trace!(%spec, "Evicting tile");
                self.entries.remove(&spec).map(|e| e.tile)
            })
            .collect()
    }

    fn expired(&self, spec: &TileSpec, entry: &Entry) -> bool {
        let outside_grace =
            self.pass.saturating_sub(entry.last_required_pass) > self.policy.grace_passes as u64;
        let too_far = self
            .level
            .is_some_and(|level| spec.zoom().abs_diff(level) > self.policy.max_level_distance);
        outside_grace || too_far || !self.is_fresh(&entry.tile)
    }

    /// Remove every cached tile. The required set is kept.
    pub fn clear(&mut self) -> Vec<Tile> {
        self.entries.drain().map(|(_, e)| e.tile).collect()
    }

    /// Tiles to draw for the current view, in draw order.
    ///
    /// Tiles backing required specs are drawn, fresh or not. Other cached
    /// tiles are drawn only where they fill a gap left by a missing
    /// required tile.
    pub fn drawable(&self) -> Vec<DrawableTile> {
        let missing = self.missing_regions();
        let mut entries: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|(spec, _)| {
                self.required.contains(spec) || {
                    let region = spec.map_region(self.tile_size, self.level_count);
                    missing.iter().any(|m| m.intersects(&region))
                }
            })
            .map(|(_, entry)| entry)
            .collect();

        entries.sort_by_key(|entry| {
            let spec = entry.tile.spec();
            (Some(spec.zoom()) == self.level, spec)
        });

        entries
            .into_iter()
            .map(|entry| DrawableTile {
                spec: entry.tile.spec(),
                buffer: std::sync::Arc::clone(entry.tile.buffer()),
                alphas: entry.tile.alphas().to_vec(),
                layer_ids: entry.tile.layer_ids().to_vec(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::provider::tests::StaticSource;
    use crate::tile::{PixelFormat, TileBuffer};
    use std::sync::Arc;

    const TILE: u32 = 256;
    const LEVELS: u8 = 4;

    fn layers(alpha: f32) -> LayerStack {
        LayerStack::new(vec![Layer::with_id(
            "base",
            Arc::new(StaticSource::missing()),
            alpha,
        )])
    }

    fn tile(spec: TileSpec, stack: &LayerStack) -> Tile {
        Tile::new(
            spec,
            stack,
            TileBuffer::filled(PixelFormat::Rgba8, 4, 4, [1, 2, 3, 255]),
        )
    }

    fn cache(stack: &LayerStack) -> TileCache {
        let mut cache = TileCache::new(TILE, LEVELS, EvictionPolicy::default());
        cache.set_layers(stack);
        cache
    }

    fn set(specs: &[TileSpec]) -> HashSet<TileSpec> {
        specs.iter().copied().collect()
    }

    fn accepted(insertion: Insertion) -> (bool, Vec<Tile>) {
        match insertion {
            Insertion::Accepted { visible, released } => (visible, released),
            Insertion::Stale(tile) => panic!("tile {} unexpectedly stale", tile.spec()),
        }
    }

    #[test]
    fn test_first_pass_fetches_everything() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let a = TileSpec::new(3, 0, 0);
        let b = TileSpec::new(3, 0, 1);

        let outcome = cache.apply_pass(set(&[a, b]), Some(3));
        assert_eq!(outcome.newly_required, 2);
        assert_eq!(outcome.to_fetch.len(), 2);
        assert!(outcome.released.is_empty());
    }

    #[test]
    fn test_cached_fresh_tile_not_refetched() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let a = TileSpec::new(3, 0, 0);
        let b = TileSpec::new(3, 0, 1);
        cache.apply_pass(set(&[a, b]), Some(3));

        let (visible, released) = accepted(cache.insert(tile(a, &stack)));
        assert!(visible);
        assert!(released.is_empty());

        let outcome = cache.apply_pass(set(&[a, b]), Some(3));
        assert_eq!(outcome.to_fetch, vec![b]);
        assert_eq!(outcome.newly_required, 0);
    }

    #[test]
    fn test_unrequired_tile_kept_for_grace_passes() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let a = TileSpec::new(3, 0, 0);
        let far = TileSpec::new(3, 9, 9);
        cache.apply_pass(set(&[a]), Some(3));
        accepted(cache.insert(tile(a, &stack)));
        accepted(cache.insert(tile(far, &stack)));

        // Pan away: `a` is retained for the grace window
        for _ in 0..DEFAULT_GRACE_PASSES {
            let outcome = cache.apply_pass(set(&[far]), Some(3));
            assert!(outcome.released.is_empty());
            assert!(cache.contains(&a));
        }

        let outcome = cache.apply_pass(set(&[far]), Some(3));
        assert_eq!(outcome.released.len(), 1);
        assert_eq!(outcome.released[0].spec(), a);
        assert!(!cache.contains(&a));
    }

    #[test]
    fn test_tile_required_again_within_grace_is_reused() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let a = TileSpec::new(3, 0, 0);
        let b = TileSpec::new(3, 5, 5);
        cache.apply_pass(set(&[a]), Some(3));
        accepted(cache.insert(tile(a, &stack)));
        accepted(cache.insert(tile(b, &stack)));

        cache.apply_pass(set(&[b]), Some(3));
        let outcome = cache.apply_pass(set(&[a, b]), Some(3));
        assert!(outcome.to_fetch.is_empty());
        assert_eq!(outcome.newly_required, 1);
    }

    #[test]
    fn test_far_level_evicted_once_covered() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let coarse = TileSpec::new(0, 0, 0);
        cache.apply_pass(set(&[coarse]), Some(0));
        accepted(cache.insert(tile(coarse, &stack)));

        // Zoom to level 3: the level-0 tile covers the missing tiles
        let fine = TileSpec::new(3, 0, 0);
        let outcome = cache.apply_pass(set(&[fine]), Some(3));
        assert!(outcome.released.is_empty());
        assert!(cache.contains(&coarse));

        // Once the fine tile is in, the coarse one is too far to keep
        let (_, released) = accepted(cache.insert(tile(fine, &stack)));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].spec(), coarse);
    }

    #[test]
    fn test_adjacent_level_retained_for_grace() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let coarse = TileSpec::new(2, 0, 0);
        cache.apply_pass(set(&[coarse]), Some(2));
        accepted(cache.insert(tile(coarse, &stack)));

        let fine = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[fine]), Some(3));
        let (_, released) = accepted(cache.insert(tile(fine, &stack)));
        assert!(released.is_empty());
        assert!(cache.contains(&coarse));
    }

    #[test]
    fn test_stale_insert_rejected() {
        let old = layers(1.0);
        let new = layers(0.5);
        let mut cache = cache(&new);
        let spec = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[spec]), Some(3));

        match cache.insert(tile(spec, &old)) {
            Insertion::Stale(t) => assert_eq!(t.spec(), spec),
            Insertion::Accepted { .. } => panic!("stale tile accepted"),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_layer_change_refetches_but_keeps_sole_rendering() {
        let old = layers(1.0);
        let new = layers(0.5);
        let mut cache = cache(&old);
        let spec = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[spec]), Some(3));
        accepted(cache.insert(tile(spec, &old)));

        let released = cache.set_layers(&new);
        assert!(released.is_empty());

        let outcome = cache.apply_pass(set(&[spec]), Some(3));
        assert_eq!(outcome.to_fetch, vec![spec]);
        assert!(cache.contains(&spec), "stale tile is still the only rendering");
        assert_eq!(cache.drawable().len(), 1);

        // The fresh replacement releases the stale tile
        let (visible, released) = accepted(cache.insert(tile(spec, &new)));
        assert!(visible);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].alphas(), &[1.0]);
        assert_eq!(cache.get(&spec).unwrap().alphas(), &[0.5]);
    }

    #[test]
    fn test_source_swap_under_same_id_makes_tiles_stale() {
        let old = layers(1.0);
        let swapped = layers(1.0);
        assert_eq!(old.ids(), swapped.ids());

        let mut cache = cache(&old);
        let spec = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[spec]), Some(3));
        accepted(cache.insert(tile(spec, &old)));
        assert!(cache.has_fresh(&spec));

        cache.set_layers(&swapped);
        assert!(!cache.has_fresh(&spec));
        let outcome = cache.apply_pass(set(&[spec]), Some(3));
        assert_eq!(outcome.to_fetch, vec![spec]);

        // A tile still in flight from the old source is refused
        assert!(matches!(cache.insert(tile(spec, &old)), Insertion::Stale(_)));
        let (_, released) = accepted(cache.insert(tile(spec, &swapped)));
        assert_eq!(released.len(), 1);
        assert!(cache.has_fresh(&spec));
    }

    #[test]
    fn test_stale_unrequired_tile_released_when_not_needed() {
        let old = layers(1.0);
        let new = layers(0.5);
        let mut cache = cache(&old);
        let a = TileSpec::new(3, 0, 0);
        let away = TileSpec::new(3, 8, 8);
        cache.apply_pass(set(&[a]), Some(3));
        accepted(cache.insert(tile(a, &old)));
        cache.apply_pass(set(&[away]), Some(3));

        let released = cache.set_layers(&new);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].spec(), a);
    }

    #[test]
    fn test_drawable_orders_fillers_before_current_level() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let coarse = TileSpec::new(2, 0, 0);
        cache.apply_pass(set(&[coarse]), Some(2));
        accepted(cache.insert(tile(coarse, &stack)));

        let fine_a = TileSpec::new(3, 0, 0);
        let fine_b = TileSpec::new(3, 0, 1);
        cache.apply_pass(set(&[fine_a, fine_b]), Some(3));
        accepted(cache.insert(tile(fine_a, &stack)));

        let drawable = cache.drawable();
        let order: Vec<_> = drawable.iter().map(|d| d.spec).collect();
        assert_eq!(order, vec![coarse, fine_a]);
    }

    #[test]
    fn test_drawable_hides_fillers_once_covered() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let coarse = TileSpec::new(2, 0, 0);
        cache.apply_pass(set(&[coarse]), Some(2));
        accepted(cache.insert(tile(coarse, &stack)));

        let fine = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[fine]), Some(3));
        accepted(cache.insert(tile(fine, &stack)));

        let order: Vec<_> = cache.drawable().iter().map(|d| d.spec).collect();
        assert_eq!(order, vec![fine]);
    }

    #[test]
    fn test_missing_ordered_from_center() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let required: Vec<TileSpec> = (0..3)
            .flat_map(|row| (0..3).map(move |col| TileSpec::new(3, row, col)))
            .collect();

        let outcome = cache.apply_pass(set(&required), Some(3));
        assert_eq!(outcome.to_fetch.len(), 9);
        assert_eq!(outcome.to_fetch[0], TileSpec::new(3, 1, 1));
    }

    #[test]
    fn test_clear_returns_all_tiles() {
        let stack = layers(1.0);
        let mut cache = cache(&stack);
        let a = TileSpec::new(3, 0, 0);
        cache.apply_pass(set(&[a]), Some(3));
        accepted(cache.insert(tile(a, &stack)));

        assert_eq!(cache.clear().len(), 1);
        assert!(cache.is_empty());
        assert!(cache.is_required(&a));
    }
}
