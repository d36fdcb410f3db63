//! Top-level BVH construction over packed shapes via agglomerative
//! nearest-neighbor chain clustering (§4.E), grounded on `scene.cpp`'s
//! `FindBestMatch`/agglomerative loop in its shape-packing section.

use crate::packed::{PackedShapeNode, SHAPE_INDEX_NONE};

/// Index of the nearest leaf/cluster to `map[index_a]` by the "merged-box
/// half-area" metric.
///
/// The metric is `sx·sy + sy·sz + sz·sz` — note the **asymmetric** `sz·sz`
/// term where a symmetric formula would use `sz·sx`. This is preserved
/// verbatim from the reference implementation rather than "fixed": it
/// shifts the resulting BVH shape and is load-bearing for anything that
/// compares traversal output against it (§9 Open Questions).
fn find_best_match(nodes: &[PackedShapeNode], map: &[u16], index_a: u16) -> u16 {
    let node_a = &nodes[map[index_a as usize] as usize];
    let min_a = node_a.min;
    let max_a = node_a.max;

    let mut best_area = f32::INFINITY;
    let mut best_index_b: u16 = 0xFFFF;

    for (index_b, &node_index_b) in map.iter().enumerate() {
        if index_b as u16 == index_a {
            continue;
        }
        let node_b = &nodes[node_index_b as usize];
        let size = max_a.max(node_b.max) - min_a.min(node_b.min);
        let area = size.x * size.y + size.y * size.z + size.z * size.z;
        if area <= best_area {
            best_area = area;
            best_index_b = index_b as u16;
        }
    }

    best_index_b
}

/// Merges the leaf nodes already present in `nodes` (one per shape, in
/// shape order, each with `shape_index` set) into a single tree, appending
/// internal nodes as it goes and leaving the root at index 0.
///
/// `nodes` must already contain exactly one leaf per shape before calling;
/// does nothing if there are fewer than 2 shapes (a single shape is
/// already its own root; zero shapes leaves `nodes` empty aside from the
/// caller's placeholder).
pub fn build_top_level_bvh(nodes: &mut Vec<PackedShapeNode>, shape_count: usize) {
    if shape_count < 2 {
        return;
    }

    let mut map: Vec<u16> = (0..shape_count as u16).collect();

    let mut index_a: u16 = 0;
    let mut index_b = find_best_match(nodes, &map, index_a);

    while map.len() > 1 {
        let index_c = find_best_match(nodes, &map, index_b);
        if index_c == index_a {
            let node_index_a = map[index_a as usize];
            let node_index_b = map[index_b as usize];
            let node_a = nodes[node_index_a as usize];
            let node_b = nodes[node_index_b as usize];

            let merged = PackedShapeNode {
                min: node_a.min.min(node_b.min),
                child_node_indices: u32::from(node_index_a) | (u32::from(node_index_b) << 16),
                max: node_a.max.max(node_b.max),
                shape_index: SHAPE_INDEX_NONE,
            };

            let new_node_index = nodes.len() as u16;
            nodes.push(merged);

            map[index_a as usize] = new_node_index;
            map[index_b as usize] = *map.last().unwrap();
            map.pop();

            if index_a as usize == map.len() {
                index_a = index_b;
            }

            index_b = find_best_match(nodes, &map, index_a);
        } else {
            index_a = index_b;
            index_b = index_c;
        }
    }

    // `root_node_index` is always the product of at least one merge (merge
    // results are appended after every original leaf), so it is never 0 and
    // swap_remove can't clobber the slot we're about to write.
    let root_node_index = map[index_a as usize];
    debug_assert_ne!(root_node_index, 0);
    let root = nodes.swap_remove(root_node_index as usize);
    nodes[0] = root;
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn leaf(min: Vec3, max: Vec3, shape_index: u32) -> PackedShapeNode {
        PackedShapeNode { min, max, child_node_indices: 0, shape_index }
    }

    #[test]
    fn single_shape_stays_a_single_leaf() {
        let mut nodes = vec![leaf(Vec3::ZERO, Vec3::ONE, 0)];
        build_top_level_bvh(&mut nodes, 1);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].shape_index, 0);
    }

    #[test]
    fn two_shapes_produce_an_internal_root() {
        let mut nodes = vec![
            leaf(Vec3::ZERO, Vec3::ONE, 0),
            leaf(Vec3::new(10.0, 10.0, 10.0), Vec3::new(11.0, 11.0, 11.0), 1),
        ];
        build_top_level_bvh(&mut nodes, 2);

        assert_eq!(nodes[0].shape_index, SHAPE_INDEX_NONE);
        assert!(!nodes[0].is_leaf());

        let root_min = nodes[0].min;
        let root_max = nodes[0].max;
        assert!(root_min.x <= 0.0 && root_max.x >= 11.0);
    }

    #[test]
    fn root_bounds_contain_every_leaf_for_several_shapes() {
        let leaves: Vec<PackedShapeNode> = (0..6)
            .map(|i| {
                let base = i as f32 * 3.0;
                leaf(Vec3::splat(base), Vec3::splat(base + 1.0), i)
            })
            .collect();
        let mut nodes = leaves.clone();
        build_top_level_bvh(&mut nodes, leaves.len());

        let root = nodes[0];
        for original_leaf in &leaves {
            assert!((original_leaf.min.cmpge(root.min)).all());
            assert!((original_leaf.max.cmple(root.max)).all());
        }
    }
}
