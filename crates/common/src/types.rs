use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Index of an object in the scene's object array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Inverted box; the identity for [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box enclosing all given points.
    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |acc, &p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn centroid(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Half of the surface area. Only ratios matter for SAH, so the factor 2 is dropped.
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.extent();
        d.x * d.y + d.x * d.z + d.y * d.z
    }

    /// True if `other` lies entirely inside (boundaries included).
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Grow every side by `fraction` of the extent along that axis.
    pub fn enlarged(&self, fraction: f32) -> Aabb {
        let pad = fraction * self.extent();
        Aabb {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Grow every side by a fixed distance.
    pub fn expanded(&self, amount: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// World box of this box after an affine transform.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let mut out = Aabb::EMPTY;
        for c in self.corners() {
            let p = m.transform_point3(c);
            out.min = out.min.min(p);
            out.max = out.max.max(p);
        }
        out
    }

    /// Index of the longest axis of the given vector (0 = x, 1 = y, 2 = z).
    pub fn dominant_axis(v: Vec3) -> usize {
        let a = v.abs();
        if a.x >= a.y && a.x >= a.z {
            0
        } else if a.y >= a.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn union_is_componentwise() {
        let a = unit();
        let b = Aabb::new(Vec3::new(-1.0, 0.5, 2.0), Vec3::new(0.5, 3.0, 4.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(u.max, Vec3::new(1.0, 3.0, 4.0));
    }

    #[test]
    fn surface_area_is_half_area() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.surface_area(), 1.0 * 2.0 + 1.0 * 3.0 + 2.0 * 3.0);
        assert_eq!(Aabb::EMPTY.surface_area(), 0.0);
    }

    #[test]
    fn enlarged_uses_extent_fraction() {
        let b = Aabb::new(Vec3::ZERO, Vec3::new(10.0, 1.0, 0.0)).enlarged(0.2);
        assert_eq!(b.min, Vec3::new(-2.0, -0.2, 0.0));
        assert_eq!(b.max, Vec3::new(12.0, 1.2, 0.0));
    }

    #[test]
    fn contains_includes_boundary() {
        let outer = unit();
        assert!(outer.contains(&unit()));
        assert!(!outer.contains(&Aabb::new(Vec3::ZERO, Vec3::splat(1.01))));
        assert!(outer.contains_point(Vec3::splat(0.5)));
    }

    #[test]
    fn transformed_by_translation() {
        let m = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let b = unit().transformed(&m);
        assert_eq!(b.min, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(b.max, Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn from_points_encloses_all() {
        let b = Aabb::from_points(&[Vec3::new(1.0, -1.0, 0.0), Vec3::new(-2.0, 4.0, 1.0)]);
        assert_eq!(b.min, Vec3::new(-2.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 4.0, 1.0));
    }

    #[test]
    fn dominant_axis_picks_largest_magnitude() {
        assert_eq!(Aabb::dominant_axis(Vec3::new(1.0, -3.0, 2.0)), 1);
        assert_eq!(Aabb::dominant_axis(Vec3::new(0.0, 0.0, -0.5)), 2);
        assert_eq!(Aabb::dominant_axis(Vec3::ZERO), 0);
    }
}
