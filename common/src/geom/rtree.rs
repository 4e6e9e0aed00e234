use super::rect::Rect;
use rstar::{AABB, RTree};

/// R-tree over rectangles tagged with caller ids.
pub struct SpatialIndex {
    tree: RTree<IndexedRect>,
}

struct IndexedRect {
    rect: Rect,
    id: usize,
}

impl rstar::RTreeObject for IndexedRect {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.min.x, self.rect.min.y],
            [self.rect.max.x, self.rect.max.y],
        )
    }
}

impl SpatialIndex {
    pub fn bulk_load(rects: &[Rect]) -> Self {
        let items = rects
            .iter()
            .enumerate()
            .map(|(id, &rect)| IndexedRect { rect, id })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Ids of every stored rectangle strictly overlapping `rect`, ascending.
    ///
    /// The envelope query also reports rectangles that merely touch, so the
    /// candidates are filtered through [`Rect::overlaps`].
    pub fn query(&self, rect: Rect) -> Vec<usize> {
        let aabb = AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&aabb)
            .filter(|item| item.rect.overlaps(&rect))
            .map(|item| item.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
