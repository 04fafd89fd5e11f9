//! Quadtree broad phase
//!
//! The engine rebuilds the tree from scratch every tick, so there is no
//! removal or update path. Entities that straddle a split line are retained
//! at the level where they stop fitting. Queries return the keys on the path
//! plus every quadrant the query box touches, a conservative superset of the
//! keys whose bounds overlap it; callers run the precise test.

/// Axis-aligned box, stored by its top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Aabb {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box around a center-referenced entity
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        other.x >= self.x
            && other.right() <= self.right()
            && other.y >= self.y
            && other.bottom() <= self.bottom()
    }

    /// Closed-interval overlap, touching edges count
    pub fn intersects(&self, other: &Aabb) -> bool {
        other.x <= self.right()
            && other.right() >= self.x
            && other.y <= self.bottom()
            && other.bottom() >= self.y
    }
}

/// Region tree over `K` keys
#[derive(Debug)]
pub struct QuadTree<K> {
    root: Node<K>,
    max_objects: usize,
    max_levels: u32,
}

#[derive(Debug)]
struct Node<K> {
    bounds: Aabb,
    level: u32,
    items: Vec<(Aabb, K)>,
    children: Option<Box<[Node<K>; 4]>>,
}

impl<K: Copy> QuadTree<K> {
    pub fn new(bounds: Aabb, max_objects: usize, max_levels: u32) -> Self {
        Self {
            root: Node::new(bounds, 0),
            max_objects: max_objects.max(1),
            max_levels,
        }
    }

    pub fn insert(&mut self, bounds: Aabb, key: K) {
        self.root
            .insert(bounds, key, self.max_objects, self.max_levels);
    }

    /// Every key that may overlap `bounds`
    pub fn query(&self, bounds: &Aabb) -> Vec<K> {
        let mut out = Vec::new();
        self.root.query(bounds, &mut out);
        out
    }

    pub fn clear(&mut self) {
        self.root.items.clear();
        self.root.children = None;
    }
}

#[cfg(test)]
impl<K: Copy> QuadTree<K> {
    fn len(&self) -> usize {
        self.root.count()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deepest level currently in use (root is 0)
    fn depth(&self) -> u32 {
        self.root.depth()
    }
}

impl<K: Copy> Node<K> {
    fn new(bounds: Aabb, level: u32) -> Self {
        Self {
            bounds,
            level,
            items: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, bounds: Aabb, key: K, max_objects: usize, max_levels: u32) {
        if let Some(children) = self.children.as_mut() {
            if let Some(quadrant) = quadrant_for(&self.bounds, &bounds) {
                children[quadrant].insert(bounds, key, max_objects, max_levels);
                return;
            }
        }

        // Straddlers and leaf occupants stay here
        self.items.push((bounds, key));

        if self.items.len() > max_objects && self.level < max_levels {
            if self.children.is_none() {
                self.split();
            }

            let parent_bounds = self.bounds;
            let retained = std::mem::take(&mut self.items);
            for (item_bounds, item_key) in retained {
                match (quadrant_for(&parent_bounds, &item_bounds), self.children.as_mut()) {
                    (Some(quadrant), Some(children)) => {
                        children[quadrant].insert(item_bounds, item_key, max_objects, max_levels)
                    }
                    _ => self.items.push((item_bounds, item_key)),
                }
            }
        }
    }

    fn split(&mut self) {
        let level = self.level + 1;
        self.children = Some(Box::new(
            quadrants(&self.bounds).map(|bounds| Node::new(bounds, level)),
        ));
    }

    fn query(&self, bounds: &Aabb, out: &mut Vec<K>) {
        out.extend(self.items.iter().map(|(_, key)| *key));

        // A query box touching a split line sees occupants on both sides
        if let Some(children) = self.children.as_ref() {
            for child in children.iter() {
                if child.bounds.intersects(bounds) {
                    child.query(bounds, out);
                }
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> u32 {
        match self.children.as_ref() {
            Some(children) => children.iter().map(Node::depth).max().unwrap_or(self.level),
            None => self.level,
        }
    }

    #[cfg(test)]
    fn count(&self) -> usize {
        self.items.len()
            + self
                .children
                .as_ref()
                .map_or(0, |children| children.iter().map(Node::count).sum::<usize>())
    }
}

/// Child regions (0 = top-left, 1 = top-right, 2 = bottom-left, 3 = bottom-right)
fn quadrants(region: &Aabb) -> [Aabb; 4] {
    let half_w = region.width / 2.0;
    let half_h = region.height / 2.0;
    let (x, y) = (region.x, region.y);
    [
        Aabb::new(x, y, half_w, half_h),
        Aabb::new(x + half_w, y, half_w, half_h),
        Aabb::new(x, y + half_h, half_w, half_h),
        Aabb::new(x + half_w, y + half_h, half_w, half_h),
    ]
}

/// Quadrant that fully contains `item`, if any
fn quadrant_for(region: &Aabb, item: &Aabb) -> Option<usize> {
    quadrants(region).iter().position(|q| q.contains(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tree() -> QuadTree<u32> {
        QuadTree::new(Aabb::new(0.0, 0.0, 800.0, 800.0), 4, 10)
    }

    #[test]
    fn splits_once_threshold_exceeded() {
        let mut tree = tree();
        for i in 0..4 {
            tree.insert(Aabb::centered(50.0 + i as f32 * 10.0, 50.0, 4.0, 4.0), i);
        }
        assert_eq!(tree.depth(), 0);

        tree.insert(Aabb::centered(700.0, 700.0, 4.0, 4.0), 4);
        assert!(tree.depth() >= 1);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn straddler_is_visible_to_every_quadrant() {
        let mut tree = tree();
        // Force a split with small items in each corner
        for (i, (x, y)) in [(100.0, 100.0), (700.0, 100.0), (100.0, 700.0), (700.0, 700.0), (650.0, 650.0)]
            .into_iter()
            .enumerate()
        {
            tree.insert(Aabb::centered(x, y, 10.0, 10.0), i as u32);
        }
        tree.insert(Aabb::centered(400.0, 400.0, 60.0, 60.0), 99);

        for (x, y) in [(100.0, 100.0), (700.0, 100.0), (100.0, 700.0), (700.0, 700.0)] {
            let near = tree.query(&Aabb::centered(x, y, 10.0, 10.0));
            assert!(near.contains(&99));
        }
    }

    #[test]
    fn far_quadrants_are_pruned() {
        let mut tree = tree();
        for i in 0..8 {
            tree.insert(Aabb::centered(20.0 + i as f32 * 5.0, 20.0, 2.0, 2.0), i);
        }
        tree.insert(Aabb::centered(780.0, 780.0, 2.0, 2.0), 100);

        let near = tree.query(&Aabb::centered(20.0, 20.0, 2.0, 2.0));
        assert!(!near.contains(&100));
    }

    #[test]
    fn out_of_bounds_entities_stay_at_root() {
        let mut tree = tree();
        for i in 0..6 {
            tree.insert(Aabb::centered(100.0 + i as f32, 100.0, 2.0, 2.0), i);
        }
        tree.insert(Aabb::centered(-50.0, 400.0, 10.0, 10.0), 42);

        let near = tree.query(&Aabb::centered(700.0, 700.0, 2.0, 2.0));
        assert!(near.contains(&42));
    }

    #[test]
    fn clear_discards_everything() {
        let mut tree = tree();
        for i in 0..20 {
            tree.insert(Aabb::centered(i as f32 * 30.0, i as f32 * 30.0, 5.0, 5.0), i);
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.query(&Aabb::new(0.0, 0.0, 800.0, 800.0)).is_empty());
    }

    fn arb_box() -> impl Strategy<Value = Aabb> {
        (-50.0f32..850.0, -50.0f32..850.0, 1.0f32..150.0, 1.0f32..150.0)
            .prop_map(|(x, y, w, h)| Aabb::centered(x, y, w, h))
    }

    proptest! {
        #[test]
        fn query_never_misses_an_overlap(
            boxes in prop::collection::vec(arb_box(), 1..80),
            probe in arb_box(),
        ) {
            let mut tree = QuadTree::new(Aabb::new(0.0, 0.0, 800.0, 800.0), 4, 10);
            for (i, b) in boxes.iter().enumerate() {
                tree.insert(*b, i);
            }

            let found = tree.query(&probe);
            for (i, b) in boxes.iter().enumerate() {
                if b.intersects(&probe) {
                    prop_assert!(found.contains(&i), "missed box {} {:?}", i, b);
                }
            }
        }
    }
}
