//! Plain value types the snapshot protocol copies between threads.

/// Tolerance used when deciding whether a camera sits at the origin.
pub const VEC_EPSILON: f32 = 0.05;

/// Three component vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise comparison within `epsilon`.
    #[inline]
    #[must_use]
    pub fn is_equivalent(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }
}

/// Axis aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box of half size `extent` around `center`.
    #[must_use]
    pub fn from_center(center: Vec3, extent: f32) -> Self {
        Self {
            min: Vec3::new(center.x - extent, center.y - extent, center.z - extent),
            max: Vec3::new(center.x + extent, center.y + extent, center.z + extent),
        }
    }
}

/// View camera captured once per frame.
///
/// The render worker receives its own copy so the tick thread may move the
/// live camera while the previous frame is still being traversed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// World position.
    pub position: Vec3,
    /// Normalized view direction.
    pub direction: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Near clip plane.
    pub near: f32,
    /// Far clip plane.
    pub far: f32,
}

impl Camera {
    /// Camera at `position` looking down +Y with default projection.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Returns true if the camera was never placed (still at the origin).
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.position.is_equivalent(Vec3::ZERO, VEC_EPSILON)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, 1.0, 0.0),
            fov: 75.0_f32.to_radians(),
            near: 0.25,
            far: 1024.0,
        }
    }
}
