//! Tracking of screen regions awaiting redraw.

use crate::rect::Rect;
use std::iter;


/// Pending invalidated regions.
///
/// Overlapping and adjacent invalidations are greedily merged so the number
/// of rects, and thus expose calls per frame, stays small. Area is never
/// lost: the union of the pending rects always covers everything that was
/// invalidated. No pending rect is ever contained by another.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    rects: Vec<Rect>,
}

impl RegionSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record that `region` must be redrawn. Empty rects are ignored.
    pub fn invalidate(&mut self, region: Rect) {
        if region.is_empty() {
            return;
        }

        for i in 0..self.rects.len() {
            let existing = self.rects[i];
            if existing.contains(&region) {
                return;
            }
            if region.contains(&existing) {
                self.replace(i, region);
                return;
            }
            let cover = region.minimal_cover(&existing);
            if cover.area() <= existing.area() + region.area() {
                self.replace(i, cover);
                return;
            }
        }

        // fold pending rects one by one into a single cover
        let mut progressive_cover = region;
        let mut cumulative_area = region.area();
        for i in 0..self.rects.len() {
            let existing = self.rects[i];
            progressive_cover.expand_to_cover(&existing);
            cumulative_area += existing.area();
            if progressive_cover.area() <= cumulative_area {
                self.rects.splice(0..=i, iter::once(progressive_cover));
                self.settle(0);
                return;
            }
        }
        self.rects.push(region);
    }

    fn replace(&mut self, i: usize, rect: Rect) {
        self.rects[i] = rect;
        self.settle(i);
    }

    // drop whatever became redundant around the rect at i
    fn settle(&mut self, i: usize) {
        let rect = self.rects[i];
        let swallowed = self.rects
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && other.contains(&rect));
        if swallowed {
            self.rects.remove(i);
            return;
        }
        let mut j = 0;
        self.rects.retain(|other| {
            let keep = j == i || !rect.contains(other);
            j += 1;
            keep
        });
    }

    /// Take the next rect to expose, from the back.
    ///
    /// Rects contained by another pending rect are skipped. A rect that can
    /// be merged into another pending rect without increasing the area
    /// drawn is merged into it instead of being returned.
    pub fn pop_for_expose(&mut self) -> Option<Rect> {
        loop {
            let r = self.rects.pop()?;
            if self.rects.iter().any(|other| other.contains(&r)) {
                continue;
            }
            let merge = self.rects
                .iter()
                .position(|other| other.minimal_cover(&r).area() <= other.area() + r.area());
            if let Some(j) = merge {
                let cover = self.rects[j].minimal_cover(&r);
                self.rects[j] = cover;
                continue;
            }
            return Some(r);
        }
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Sum of the pending rects' areas. Overlap is counted twice.
    pub fn total_area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }
}


#[cfg(test)]
fn covered(rects: &[Rect], x: i32, y: i32) -> bool {
    rects.iter().any(|r| r.contains_point([x, y]))
}

#[cfg(test)]
fn assert_no_contained(rects: &[Rect]) {
    for (i, a) in rects.iter().enumerate() {
        for (j, b) in rects.iter().enumerate() {
            assert!(i == j || !a.contains(b), "{} contains {} in {:?}", a, b, rects);
        }
    }
}

#[test]
fn test_contained_invalidation_is_noop() {
    let mut set = RegionSet::new();
    set.invalidate(Rect::new(0, 0, 10, 10));
    set.invalidate(Rect::new(0, 0, 5, 5));
    assert_eq!(set.rects(), &[Rect::new(0, 0, 10, 10)]);
}

#[test]
fn test_containing_invalidation_replaces() {
    let mut set = RegionSet::new();
    set.invalidate(Rect::new(2, 2, 2, 2));
    set.invalidate(Rect::new(50, 50, 2, 2));
    set.invalidate(Rect::new(0, 0, 10, 10));
    assert_eq!(set.len(), 2);
    assert!(set.rects().contains(&Rect::new(0, 0, 10, 10)));
    assert!(set.rects().contains(&Rect::new(50, 50, 2, 2)));
}

#[test]
fn test_containment_checked_before_progressive_cover() {
    let pending = vec![
        Rect::new(0, 0, 10, 5),
        Rect::new(0, 5, 10, 5),
        Rect::new(10, 0, 30, 30),
    ];
    let mut set = RegionSet { rects: pending.clone() };
    set.invalidate(Rect::new(10, 0, 10, 10));
    assert_eq!(set.rects(), &pending[..]);

    // without the containing rect, the first two fold into one cover
    let mut set = RegionSet { rects: pending[..2].to_vec() };
    set.invalidate(Rect::new(10, 0, 10, 10));
    assert_eq!(set.rects(), &[Rect::new(0, 0, 20, 10)]);
}

#[test]
fn test_adjacent_rects_merge() {
    let mut set = RegionSet::new();
    set.invalidate(Rect::new(0, 0, 10, 10));
    set.invalidate(Rect::new(10, 0, 10, 10));
    assert_eq!(set.rects(), &[Rect::new(0, 0, 20, 10)]);
}

#[test]
fn test_distant_rects_stay_separate() {
    let mut set = RegionSet::new();
    set.invalidate(Rect::new(0, 0, 10, 10));
    set.invalidate(Rect::new(100, 100, 10, 10));
    assert_eq!(set.len(), 2);
    assert_eq!(set.total_area(), 200);
}

#[test]
fn test_empty_ignored() {
    let mut set = RegionSet::new();
    set.invalidate(Rect::new(5, 5, 0, 10));
    set.invalidate(Rect::new(5, 5, 10, -1));
    assert!(set.is_empty());
}

#[test]
fn test_random_invalidations_lose_no_area() {
    use rand::prelude::*;

    let mut rng = rand_pcg::Pcg32::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let mut set = RegionSet::new();
        let mut invalidated = Vec::new();
        for _ in 0..rng.gen_range(1..20) {
            let r = Rect::new(
                rng.gen_range(0..40),
                rng.gen_range(0..40),
                rng.gen_range(0..12),
                rng.gen_range(0..12),
            );
            invalidated.push(r);
            set.invalidate(r);
            assert_no_contained(set.rects());
        }
        for y in 0..52 {
            for x in 0..52 {
                if covered(&invalidated, x, y) {
                    assert!(covered(set.rects(), x, y), "lost {},{}", x, y);
                }
            }
        }

        let pending = set.rects().to_vec();
        let mut exposed = Vec::new();
        while let Some(r) = set.pop_for_expose() {
            exposed.push(r);
        }
        assert!(set.is_empty());
        for y in 0..52 {
            for x in 0..52 {
                if covered(&pending, x, y) {
                    assert!(covered(&exposed, x, y), "expose lost {},{}", x, y);
                }
            }
        }
    }
}

#[test]
fn test_pop_for_expose_merges() {
    let mut set = RegionSet {
        rects: vec![
            Rect::new(0, 0, 10, 10),
            Rect::new(40, 40, 5, 5),
            Rect::new(10, 0, 10, 10),
        ],
    };
    assert_eq!(set.pop_for_expose(), Some(Rect::new(40, 40, 5, 5)));
    assert_eq!(set.pop_for_expose(), Some(Rect::new(0, 0, 20, 10)));
    assert_eq!(set.pop_for_expose(), None);
}
