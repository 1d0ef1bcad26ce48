//! World Clusters
//!
//! The cluster grid itself (bucketing lights into 3D cells) lives outside this
//! crate behind [`WorldClusters`]. This module decides which grid instance each
//! render action uses:
//!
//! - Actions whose layer has no clustered lights, or no draw calls, share an
//!   empty grid.
//! - An action reuses the grid of an earlier action on the same layer, or on a
//!   layer with the same set of clustered lights.
//! - Otherwise a grid is taken from the [`ClusterPool`], which recycles the
//!   grids of the previous pass and destroys what is left over.

use glam::{UVec3, Vec3};
use lumina_core::Aabb;

use crate::layer::LayerId;
use crate::light::{LightId, LightType};
use crate::light_registry::LightIndexSet;
use crate::LightingResult;

/// A light as handed to the cluster grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteredLight {
    pub id: LightId,
    /// Global index, the value stored in the grid cells
    pub index: usize,
    pub light_type: LightType,
    pub position: Vec3,
    pub range: f32,
}

impl ClusteredLight {
    /// World-space bounds of the light's influence
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.position, Vec3::splat(self.range))
    }
}

/// Grid parameters for one update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterUpdateParams {
    /// False when clustered lighting is turned off for the frame
    pub enabled: bool,
    /// Region covered by the grid
    pub bounds: Aabb,
    /// Cell counts along each axis
    pub cells: UVec3,
    /// Light slots per cell
    pub max_lights_per_cell: u32,
}

impl ClusterUpdateParams {
    /// Parameters that turn a grid off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            bounds: Aabb::EMPTY,
            cells: UVec3::ONE,
            max_lights_per_cell: 0,
        }
    }
}

/// A cluster grid instance
pub trait WorldClusters {
    /// Debug name
    fn set_name(&mut self, name: &str);

    /// Rebuild the grid for a set of lights
    fn update(&mut self, lights: &[ClusteredLight], params: &ClusterUpdateParams);

    /// Release GPU resources
    fn destroy(&mut self);
}

/// Creates cluster grids
pub trait ClusterFactory {
    type Clusters: WorldClusters;

    fn create(&mut self) -> LightingResult<Self::Clusters>;
}

/// Position of a grid in the pool's live list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterSlot(usize);

impl ClusterSlot {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Grid bound to a render action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterBinding {
    /// The shared grid with no lights
    Empty,
    /// A grid owned by the pool
    Shared(ClusterSlot),
}

impl ClusterBinding {
    pub fn slot(self) -> Option<ClusterSlot> {
        match self {
            Self::Empty => None,
            Self::Shared(slot) => Some(slot),
        }
    }
}

/// Counters of the last assignment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterPoolStats {
    /// Grids created through the factory
    pub allocated: usize,
    /// Actions that shared a grid with an earlier action
    pub shared: usize,
    /// Grids taken from the previous pass
    pub recycled: usize,
    /// Leftover grids destroyed
    pub destroyed: usize,
}

/// Owner of every cluster grid
pub struct ClusterPool<C> {
    empty: Option<C>,
    live: Vec<C>,
    recycled: Vec<C>,
    /// Grids created over the pool's lifetime, used for naming
    created: usize,
    stats: ClusterPoolStats,
}

impl<C> Default for ClusterPool<C> {
    fn default() -> Self {
        Self {
            empty: None,
            live: Vec::new(),
            recycled: Vec::new(),
            created: 0,
            stats: ClusterPoolStats::default(),
        }
    }
}

impl<C: WorldClusters> ClusterPool<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every live grid to the recycle list
    pub fn begin_pass(&mut self) {
        self.stats = ClusterPoolStats::default();
        // Reversed so that pops hand grids out in their previous order
        self.recycled.extend(self.live.drain(..).rev());
    }

    /// Take a recycled grid, or create one
    pub fn take<F>(&mut self, factory: &mut F) -> LightingResult<ClusterSlot>
    where
        F: ClusterFactory<Clusters = C>,
    {
        let clusters = match self.recycled.pop() {
            Some(clusters) => {
                self.stats.recycled += 1;
                clusters
            }
            None => {
                let mut clusters = factory.create()?;
                self.created += 1;
                clusters.set_name(&format!("Cluster-{}", self.created));
                self.stats.allocated += 1;
                clusters
            }
        };
        self.live.push(clusters);
        Ok(ClusterSlot(self.live.len() - 1))
    }

    /// The shared empty grid, created and updated on first use
    pub fn empty<F>(&mut self, factory: &mut F) -> LightingResult<ClusterBinding>
    where
        F: ClusterFactory<Clusters = C>,
    {
        if self.empty.is_none() {
            let mut clusters = factory.create()?;
            clusters.set_name("EmptyCluster");
            clusters.update(&[], &ClusterUpdateParams::disabled());
            self.empty = Some(clusters);
        }
        Ok(ClusterBinding::Empty)
    }

    /// Destroy grids not taken during this pass, returns how many
    pub fn finish_pass(&mut self) -> usize {
        let destroyed = self.recycled.len();
        for mut clusters in self.recycled.drain(..) {
            clusters.destroy();
        }
        self.stats.destroyed = destroyed;
        destroyed
    }

    /// Destroy every grid including the empty one
    pub fn clear(&mut self) {
        for mut clusters in self.live.drain(..).chain(self.recycled.drain(..)).chain(self.empty.take()) {
            clusters.destroy();
        }
    }

    pub fn get(&self, binding: ClusterBinding) -> Option<&C> {
        match binding {
            ClusterBinding::Empty => self.empty.as_ref(),
            ClusterBinding::Shared(slot) => self.live.get(slot.0),
        }
    }

    pub fn get_mut(&mut self, binding: ClusterBinding) -> Option<&mut C> {
        match binding {
            ClusterBinding::Empty => self.empty.as_mut(),
            ClusterBinding::Shared(slot) => self.live.get_mut(slot.0),
        }
    }

    /// Grids assigned in the last pass
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Whether the empty grid exists
    pub fn has_empty(&self) -> bool {
        self.empty.is_some()
    }

    pub fn stats(&self) -> ClusterPoolStats {
        self.stats
    }
}

/// What a render action needs from the cluster grid
#[derive(Debug, Clone, Copy)]
pub struct ClusterRequest<'a> {
    pub layer: LayerId,
    /// Clustered lights of the layer
    pub lights: &'a LightIndexSet,
    /// Draw calls of the action's sub-layer
    pub draw_calls: usize,
}

impl ClusterRequest<'_> {
    fn needs_clusters(&self) -> bool {
        !self.lights.is_empty() && self.draw_calls > 0
    }
}

/// Bind a grid to every request, in order
pub fn assign_light_clusters<F>(
    requests: &[ClusterRequest<'_>],
    pool: &mut ClusterPool<F::Clusters>,
    factory: &mut F,
) -> LightingResult<Vec<ClusterBinding>>
where
    F: ClusterFactory,
{
    let _span = tracing::debug_span!("assign_light_clusters", actions = requests.len()).entered();

    pool.begin_pass();

    let mut bindings: Vec<ClusterBinding> = Vec::with_capacity(requests.len());
    for request in requests {
        if !request.needs_clusters() {
            bindings.push(pool.empty(factory)?);
            continue;
        }

        let earlier = requests.iter().zip(&bindings).find(|(other, binding)| {
            **binding != ClusterBinding::Empty
                && (other.layer == request.layer || other.lights == request.lights)
        });
        let binding = match earlier {
            Some((_, &binding)) => {
                pool.stats.shared += 1;
                binding
            }
            None => ClusterBinding::Shared(pool.take(factory)?),
        };
        bindings.push(binding);
    }

    pool.finish_pass();

    let stats = pool.stats();
    log::trace!(
        "Light clusters assigned: {} live, {} allocated, {} recycled, {} destroyed",
        pool.live_count(),
        stats.allocated,
        stats.recycled,
        stats.destroyed
    );

    Ok(bindings)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::LightingError;
    use lumina_core::Handle;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Grid that records calls into a shared log
    #[derive(Debug)]
    pub(crate) struct RecordingClusters {
        pub id: usize,
        pub name: String,
        pub updates: Vec<Vec<usize>>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl WorldClusters for RecordingClusters {
        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }

        fn update(&mut self, lights: &[ClusteredLight], _params: &ClusterUpdateParams) {
            self.updates.push(lights.iter().map(|light| light.index).collect());
        }

        fn destroy(&mut self) {
            self.log.borrow_mut().push(format!("destroy {}", self.id));
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingFactory {
        pub created: usize,
        pub fail: bool,
        pub log: Rc<RefCell<Vec<String>>>,
    }

    impl ClusterFactory for RecordingFactory {
        type Clusters = RecordingClusters;

        fn create(&mut self) -> LightingResult<RecordingClusters> {
            if self.fail {
                return Err(LightingError::ClusterUnavailable("device lost".into()));
            }
            self.created += 1;
            Ok(RecordingClusters {
                id: self.created,
                name: String::new(),
                updates: Vec::new(),
                log: self.log.clone(),
            })
        }
    }

    fn layer(index: u32) -> LayerId {
        Handle::from_raw_parts(index, 0)
    }

    fn set(indices: &[usize]) -> LightIndexSet {
        let mut set = LightIndexSet::default();
        for &index in indices {
            set.insert(index);
        }
        set
    }

    #[test]
    fn test_set_equal_layers_share_clusters() {
        let abc = set(&[0, 1, 2]);
        let cba = set(&[2, 1, 0]);
        let requests = [
            ClusterRequest { layer: layer(0), lights: &abc, draw_calls: 3 },
            ClusterRequest { layer: layer(1), lights: &cba, draw_calls: 1 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        let bindings = assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();

        assert_eq!(bindings[0], bindings[1]);
        assert_ne!(bindings[0], ClusterBinding::Empty);
        assert_eq!(factory.created, 1);
        assert_eq!(pool.stats().allocated, 1);
        assert_eq!(pool.stats().shared, 1);
        assert_eq!(pool.get(bindings[0]).unwrap().name, "Cluster-1");
    }

    #[test]
    fn test_same_layer_shares_clusters() {
        let lights = set(&[4]);
        let requests = [
            ClusterRequest { layer: layer(0), lights: &lights, draw_calls: 1 },
            ClusterRequest { layer: layer(0), lights: &lights, draw_calls: 1 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        let bindings = assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();
        assert_eq!(bindings[0], bindings[1]);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn test_distinct_sets_get_distinct_clusters() {
        let a = set(&[0, 1]);
        let b = set(&[0, 2]);
        let requests = [
            ClusterRequest { layer: layer(0), lights: &a, draw_calls: 1 },
            ClusterRequest { layer: layer(1), lights: &b, draw_calls: 1 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        let bindings = assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();
        assert_ne!(bindings[0], bindings[1]);
        assert_eq!(factory.created, 2);
        assert_eq!(pool.get(bindings[1]).unwrap().name, "Cluster-2");
    }

    #[test]
    fn test_empty_requests_use_singleton() {
        let none = LightIndexSet::EMPTY;
        let lit = set(&[0]);
        let requests = [
            ClusterRequest { layer: layer(0), lights: &none, draw_calls: 5 },
            ClusterRequest { layer: layer(1), lights: &lit, draw_calls: 0 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        let bindings = assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();

        assert_eq!(bindings, vec![ClusterBinding::Empty, ClusterBinding::Empty]);
        assert_eq!(pool.stats().allocated, 0);
        assert_eq!(pool.live_count(), 0);

        let empty = pool.get(ClusterBinding::Empty).unwrap();
        assert_eq!(empty.name, "EmptyCluster");
        assert_eq!(empty.updates, vec![Vec::<usize>::new()]);

        // Created once
        assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();
        assert_eq!(factory.created, 1);
    }

    #[test]
    fn test_recycle_then_destroy_leftovers() {
        let a = set(&[0]);
        let b = set(&[1]);
        let two = [
            ClusterRequest { layer: layer(0), lights: &a, draw_calls: 1 },
            ClusterRequest { layer: layer(1), lights: &b, draw_calls: 1 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        assign_light_clusters(&two, &mut pool, &mut factory).unwrap();
        assert_eq!(factory.created, 2);

        let one = [ClusterRequest { layer: layer(1), lights: &b, draw_calls: 1 }];
        let bindings = assign_light_clusters(&one, &mut pool, &mut factory).unwrap();
        assert_eq!(factory.created, 2);
        assert_eq!(pool.stats().recycled, 1);
        assert_eq!(pool.stats().destroyed, 1);
        assert_eq!(pool.live_count(), 1);

        // First grid of the previous pass is handed out first
        assert_eq!(pool.get(bindings[0]).unwrap().id, 1);
        assert_eq!(*factory.log.borrow(), vec!["destroy 2".to_string()]);
    }

    #[test]
    fn test_factory_failure_propagates() {
        let a = set(&[0]);
        let requests = [ClusterRequest { layer: layer(0), lights: &a, draw_calls: 1 }];

        let mut factory = RecordingFactory { fail: true, ..Default::default() };
        let mut pool = ClusterPool::new();
        let result = assign_light_clusters(&requests, &mut pool, &mut factory);
        assert!(matches!(result, Err(LightingError::ClusterUnavailable(_))));
    }

    #[test]
    fn test_clear_destroys_everything() {
        let none = LightIndexSet::EMPTY;
        let a = set(&[0]);
        let requests = [
            ClusterRequest { layer: layer(0), lights: &a, draw_calls: 1 },
            ClusterRequest { layer: layer(1), lights: &none, draw_calls: 1 },
        ];

        let mut factory = RecordingFactory::default();
        let mut pool = ClusterPool::new();
        assign_light_clusters(&requests, &mut pool, &mut factory).unwrap();
        pool.clear();

        assert_eq!(factory.log.borrow().len(), 2);
        assert!(!pool.has_empty());
        assert_eq!(pool.live_count(), 0);
    }
}
