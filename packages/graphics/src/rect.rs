//! Axis-aligned integer rectangles in screen space.

use std::fmt::{self, Formatter, Display};
use serde::{Serialize, Deserialize};
use vek::*;


/// Axis-aligned rectangle. A rect with `w <= 0` or `h <= 0` is empty.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    /// Rect at the origin with the given size.
    pub fn from_size<E: Into<Extent2<i32>>>(size: E) -> Self {
        let size = size.into();
        Rect::new(0, 0, size.w, size.h)
    }

    /// The canonical empty rect.
    pub const fn empty() -> Self {
        Rect::new(0, 0, 0, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Area in pixels. Empty rects have area 0.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.w as i64 * self.h as i64
        }
    }

    /// One past the rightmost column, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    /// One past the bottom row, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    pub fn pos(&self) -> Vec2<i32> {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Extent2<i32> {
        Extent2::new(self.w, self.h)
    }

    /// Whether `other` lies entirely within `self`. An empty rect is
    /// contained by every rect.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point<V: Into<Vec2<i32>>>(&self, point: V) -> bool {
        let p = point.into();
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Whether the two rects share at least one pixel.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// The shared area of both rects, or `Rect::empty()` if they don't
    /// overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        let r = Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y));
        if r.is_empty() || self.is_empty() || other.is_empty() {
            Rect::empty()
        } else {
            r
        }
    }

    /// Smallest rect covering both. Empty operands are ignored.
    pub fn minimal_cover(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Grow in place to also cover `other`.
    pub fn expand_to_cover(&mut self, other: &Rect) {
        *self = self.minimal_cover(other);
    }

    /// Same size, moved by `by`.
    pub fn shifted<V: Into<Vec2<i32>>>(&self, by: V) -> Rect {
        let by = by.into();
        Rect::new(self.x.saturating_add(by.x), self.y.saturating_add(by.y), self.w, self.h)
    }
}

impl Display for Rect {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x, self.y, self.w, self.h)
    }
}

impl From<vek::Rect<i32, i32>> for Rect {
    fn from(r: vek::Rect<i32, i32>) -> Self {
        Rect::new(r.x, r.y, r.w, r.h)
    }
}

impl From<Rect> for vek::Rect<i32, i32> {
    fn from(r: Rect) -> Self {
        vek::Rect::new(r.x, r.y, r.w, r.h)
    }
}


#[test]
fn test_intersect_commutes_and_shrinks() {
    let rects = [
        Rect::new(0, 0, 10, 10),
        Rect::new(5, 5, 10, 10),
        Rect::new(-3, 2, 4, 20),
        Rect::new(20, 20, 1, 1),
        Rect::new(0, 0, 0, 5),
        Rect::new(9, 0, 1, 10),
    ];
    for a in &rects {
        for b in &rects {
            let ab = a.intersect(b);
            assert_eq!(ab, b.intersect(a), "{} vs {}", a, b);
            assert!(ab.area() <= a.area().min(b.area()));
        }
    }
}

#[test]
fn test_intersect_disjoint_is_empty() {
    let a = Rect::new(0, 0, 10, 10);
    let b = Rect::new(10, 0, 10, 10);
    assert!(a.intersect(&b).is_empty());
    assert!(!a.overlaps(&b));
    assert_eq!(a.intersect(&Rect::new(5, 5, 10, 10)), Rect::new(5, 5, 5, 5));
}

#[test]
fn test_minimal_cover() {
    let a = Rect::new(0, 0, 10, 10);
    let b = Rect::new(20, 5, 5, 10);
    assert_eq!(a.minimal_cover(&b), Rect::new(0, 0, 25, 15));
    assert_eq!(a.minimal_cover(&Rect::empty()), a);
    assert_eq!(Rect::new(3, 3, 0, 0).minimal_cover(&b), b);
}

#[test]
fn test_contains() {
    let a = Rect::new(0, 0, 10, 10);
    assert!(a.contains(&Rect::new(0, 0, 5, 5)));
    assert!(a.contains(&a));
    assert!(!a.contains(&Rect::new(5, 5, 10, 10)));
    assert!(a.contains(&Rect::empty()));
    assert!(a.contains_point([9, 9]));
    assert!(!a.contains_point([10, 9]));
}

#[test]
fn test_edges_saturate() {
    let far = Rect::new(i32::MAX - 5, 0, 10, 10);
    assert_eq!(far.right(), i32::MAX);
    assert_eq!(far.bottom(), 10);
    assert!(!far.overlaps(&Rect::new(0, 0, 100, 100)));
    assert_eq!(
        far.intersect(&Rect::new(i32::MAX - 10, 0, 20, 5)),
        Rect::new(i32::MAX - 5, 0, 5, 5),
    );
    let cover = Rect::new(i32::MIN, 0, 1, 1).minimal_cover(&far);
    assert_eq!((cover.x, cover.w), (i32::MIN, i32::MAX));
    assert!(Rect::new(0, 0, 1, 1).shifted([i32::MAX, 0]).right() == i32::MAX);
}
