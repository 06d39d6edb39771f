use core::ops::{Add, Mul, Sub};

/// A lattice point, which is just a primitive array of type `N`.
///
/// ```
/// use cvds_core::PointN;
///
/// let p1 = PointN([1, 2, 3]);
/// let p2 = PointN([3, 4, 5]);
///
/// assert_eq!(p1 + p2, PointN([4, 6, 8]));
/// assert_eq!(p2 - p1, PointN([2, 2, 2]));
/// assert_eq!(p1 * 2, PointN([2, 4, 6]));
/// ```
///
/// Points are also used for sizes, e.g. the number of chunks along each axis of a resolution level.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PointN<N>(pub N);

/// A 3-dimensional point with scalar type `i32`. Component 0 is X, 1 is Y, 2 is Z.
pub type Point3i = PointN<[i32; 3]>;

impl Point3i {
    pub const ZERO: Self = PointN([0; 3]);

    #[inline]
    pub fn fill(value: i32) -> Self {
        PointN([value; 3])
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.0[0]
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.0[1]
    }

    #[inline]
    pub fn z(&self) -> i32 {
        self.0[2]
    }

    /// The product of all components, i.e. the number of points in an extent of this shape.
    #[inline]
    pub fn volume(&self) -> usize {
        self.x() as usize * self.y() as usize * self.z() as usize
    }

    /// Component-wise `self < other`.
    #[inline]
    pub fn all_less_than(&self, other: Self) -> bool {
        self.x() < other.x() && self.y() < other.y() && self.z() < other.z()
    }

    /// Row-major linearization (X fastest, then Y, then Z) of `self` inside an extent of `shape` at the origin.
    #[inline]
    pub fn linearize(&self, shape: Self) -> usize {
        (self.z() as usize * shape.y() as usize + self.y() as usize) * shape.x() as usize
            + self.x() as usize
    }

    /// Inverse of `linearize`.
    #[inline]
    pub fn delinearize(index: usize, shape: Self) -> Self {
        let sx = shape.x() as usize;
        let sy = shape.y() as usize;
        PointN([
            (index % sx) as i32,
            ((index / sx) % sy) as i32,
            (index / (sx * sy)) as i32,
        ])
    }
}

impl Add for Point3i {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        PointN([self.x() + rhs.x(), self.y() + rhs.y(), self.z() + rhs.z()])
    }
}

impl Sub for Point3i {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        PointN([self.x() - rhs.x(), self.y() - rhs.y(), self.z() - rhs.z()])
    }
}

impl Mul<i32> for Point3i {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: i32) -> Self {
        PointN([self.x() * rhs, self.y() * rhs, self.z() * rhs])
    }
}

impl From<[i32; 3]> for Point3i {
    #[inline]
    fn from(components: [i32; 3]) -> Self {
        PointN(components)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
