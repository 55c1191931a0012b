//! Bounding volume hierarchy over path tracer primitives
//!
//! The tree is built top-down into an arena. Nodes are pushed before their
//! children are built, left subtree first, so a node's arena index is also its
//! pre-order position. Flattening relies on that: a node's miss target is the
//! first right child up the ancestor chain whose index is larger than its own.

use super::geometry::{Aabb, GpuBvhNode, GpuGeometry};

/// Number of SAH buckets along the split axis
pub const SAH_BUCKET_COUNT: usize = 12;

/// Cost of one traversal step relative to a primitive test
pub const SAH_TRAVERSAL_COST: f32 = 0.125;

/// Nodes this small are split at the median without evaluating SAH
pub const SAH_MIN_PRIMITIVES: usize = 4;

/// Flattened hierarchy ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bvh {
    pub nodes: Vec<GpuBvhNode>,
    /// Primitives in leaf order; `GpuBvhNode::geom_idx` points in here
    pub geometry: Vec<GpuGeometry>,
}

impl Bvh {
    /// Build and flatten a hierarchy over `primitives`
    pub fn build(primitives: &[GpuGeometry]) -> Self {
        if primitives.is_empty() {
            return Self::default();
        }
        let mut builder = BvhBuilder::new(primitives);
        let mut indices: Vec<usize> = (0..primitives.len()).collect();
        builder.build_node(&mut indices, None);
        builder.flatten()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
struct BuildNode {
    bounds: Aabb,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    /// Input primitive held by a leaf
    primitive: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: usize,
    bounds: Aabb,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            count: 0,
            bounds: Aabb::EMPTY,
        }
    }
}

/// Arena-backed top-down builder
struct BvhBuilder<'a> {
    primitives: &'a [GpuGeometry],
    bounds: Vec<Aabb>,
    centroids: Vec<glam::Vec3>,
    nodes: Vec<BuildNode>,
}

impl<'a> BvhBuilder<'a> {
    fn new(primitives: &'a [GpuGeometry]) -> Self {
        Self {
            primitives,
            bounds: primitives.iter().map(GpuGeometry::bounds).collect(),
            centroids: primitives.iter().map(GpuGeometry::centroid).collect(),
            nodes: Vec::with_capacity(2 * primitives.len()),
        }
    }

    fn build_node(&mut self, indices: &mut [usize], parent: Option<usize>) -> usize {
        let bounds = indices
            .iter()
            .fold(Aabb::EMPTY, |bounds, &index| bounds.union(&self.bounds[index]))
            .make_valid();

        let node = self.nodes.len();
        self.nodes.push(BuildNode {
            bounds,
            parent,
            left: None,
            right: None,
            primitive: None,
        });

        if indices.len() == 1 {
            self.nodes[node].primitive = Some(indices[0]);
            return node;
        }

        let mid = if indices.len() <= SAH_MIN_PRIMITIVES || bounds.surface_area() == 0.0 {
            self.split_median(indices, &bounds)
        } else {
            match self.split_sah(indices, &bounds) {
                Some(mid) => mid,
                // every centroid fell on one side
                None => self.split_median(indices, &bounds),
            }
        };

        let (left, right) = indices.split_at_mut(mid);
        let left = self.build_node(left, Some(node));
        let right = self.build_node(right, Some(node));
        self.nodes[node].left = Some(left);
        self.nodes[node].right = Some(right);
        node
    }

    /// Sort along the dominant axis of `bounds` and cut in half
    fn split_median(&self, indices: &mut [usize], bounds: &Aabb) -> usize {
        let axis = bounds.dominant_axis();
        indices.sort_by(|&a, &b| {
            self.bounds[a].center()[axis].total_cmp(&self.bounds[b].center()[axis])
        });
        indices.len() / 2
    }

    /// Binned SAH split; returns the size of the left partition, or `None`
    /// when the chosen split leaves one side empty
    fn split_sah(&self, indices: &mut [usize], bounds: &Aabb) -> Option<usize> {
        let centroid_bounds = indices
            .iter()
            .fold(Aabb::EMPTY, |acc, &index| acc.grow(self.centroids[index]))
            .make_valid();
        let axis = centroid_bounds.dominant_axis();
        let t_min = centroid_bounds.min[axis];
        let t_max = centroid_bounds.max[axis];

        let slot_of = |index: usize| -> usize {
            let t =
                (self.centroids[index][axis] - t_min) * SAH_BUCKET_COUNT as f32 / (t_max - t_min);
            (t as i64).clamp(0, SAH_BUCKET_COUNT as i64 - 1) as usize
        };

        let mut buckets = [Bucket::default(); SAH_BUCKET_COUNT];
        for &index in indices.iter() {
            let bucket = &mut buckets[slot_of(index)];
            bucket.count += 1;
            bucket.bounds = bucket.bounds.union(&self.bounds[index]);
        }

        let parent_area = bounds.surface_area();
        let mut split = 0;
        let mut min_cost = f32::INFINITY;
        for i in 0..SAH_BUCKET_COUNT - 1 {
            let (left, right) = buckets.split_at(i + 1);
            let (n0, b0) = Self::merge(left);
            let (n1, b1) = Self::merge(right);
            let cost = SAH_TRAVERSAL_COST
                + (n0 as f32 * b0.surface_area() + n1 as f32 * b1.surface_area()) / parent_area;
            if cost < min_cost {
                min_cost = cost;
                split = i;
            }
        }

        indices.sort_by_key(|&index| slot_of(index) > split);
        let mid = indices.iter().take_while(|&&index| slot_of(index) <= split).count();
        if mid == 0 || mid == indices.len() {
            None
        } else {
            Some(mid)
        }
    }

    fn merge(buckets: &[Bucket]) -> (usize, Aabb) {
        buckets.iter().fold((0, Aabb::EMPTY), |(count, bounds), bucket| {
            (count + bucket.count, bounds.union(&bucket.bounds))
        })
    }

    /// Next node to visit once the subtree rooted at `node` is done with
    fn miss_index(&self, node: usize) -> i32 {
        let mut ancestor = self.nodes[node].parent;
        while let Some(current) = ancestor {
            if let Some(right) = self.nodes[current].right {
                if right > node {
                    return right as i32;
                }
            }
            ancestor = self.nodes[current].parent;
        }
        -1
    }

    fn flatten(self) -> Bvh {
        let mut bvh = Bvh {
            nodes: Vec::with_capacity(self.nodes.len()),
            geometry: Vec::with_capacity(self.primitives.len()),
        };

        // arena order is pre-order
        for (index, node) in self.nodes.iter().enumerate() {
            let miss_idx = self.miss_index(index);
            let bounds = node.bounds.pad_thin_axes();
            let mut gpu = GpuBvhNode {
                min: bounds.min,
                max: bounds.max,
                miss_idx,
                hit_idx: node.left.map_or(miss_idx, |left| left as i32),
                ..Default::default()
            };
            if let Some(primitive) = node.primitive {
                bvh.geometry.push(self.primitives[primitive]);
                gpu.leaf = 1;
                gpu.geom_idx = bvh.geometry.len() as i32 - 1;
            }
            bvh.nodes.push(gpu);
        }

        bvh
    }
}
