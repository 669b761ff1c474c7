use glam::{Vec2, Vec3, Vec3Swizzles};

/// Projects a point onto the horizontal plane. The world is Y-up, so the
/// horizontal coordinates are X and Z.
pub(crate) fn horizontal(point: Vec3) -> Vec2 {
  point.xz()
}

/// Rebuilds a world-space vector from horizontal coordinates and a height.
pub(crate) fn from_horizontal(point: Vec2, height: f32) -> Vec3 {
  Vec3::new(point.x, height, point.y)
}

/// Twice the signed area of the horizontal triangle `point_0`, `point_1`,
/// `point_2`. Positive iff the triangle winds counter-clockwise.
pub(crate) fn triangle_area_2(point_0: Vec3, point_1: Vec3, point_2: Vec3) -> f32 {
  (horizontal(point_1) - horizontal(point_0))
    .perp_dot(horizontal(point_2) - horizontal(point_0))
}

/// The horizontal distance between two points.
pub(crate) fn distance_2d(a: Vec3, b: Vec3) -> f32 {
  horizontal(a).distance(horizontal(b))
}

/// The squared horizontal distance between two points.
pub(crate) fn distance_squared_2d(a: Vec3, b: Vec3) -> f32 {
  horizontal(a).distance_squared(horizontal(b))
}

/// Projects `point` onto the segment `segment`, returning the projected point
/// and the fraction along the segment.
pub(crate) fn project_point_to_line_segment(
  point: Vec3,
  segment: (Vec3, Vec3),
) -> (Vec3, f32) {
  let segment_delta = segment.1 - segment.0;
  let length_squared = segment_delta.length_squared();
  if length_squared == 0.0 {
    return (segment.0, 0.0);
  }
  let fraction =
    (segment_delta.dot(point - segment.0) / length_squared).clamp(0.0, 1.0);
  (segment.0 + segment_delta * fraction, fraction)
}

/// The squared horizontal distance from `point` to the segment `(p, q)`.
pub(crate) fn distance_squared_to_segment_2d(
  point: Vec3,
  p: Vec3,
  q: Vec3,
) -> f32 {
  let (point, p, q) = (horizontal(point), horizontal(p), horizontal(q));
  let segment_delta = q - p;
  let length_squared = segment_delta.length_squared();
  if length_squared == 0.0 {
    return point.distance_squared(p);
  }
  let fraction =
    (segment_delta.dot(point - p) / length_squared).clamp(0.0, 1.0);
  point.distance_squared(p + segment_delta * fraction)
}

/// Determines the time at which a point moving at `relative_velocity` from
/// `relative_position` (both relative to a circle at the origin) first touches
/// the circle of radius `radius`. Returns [`None`] when the point never
/// reaches the circle. A point already inside the circle yields `Some(0.0)`
/// only while it keeps approaching the center.
pub(crate) fn sweep_circle(
  relative_position: Vec2,
  relative_velocity: Vec2,
  radius: f32,
) -> Option<f32> {
  // The point moves towards the circle while b is positive.
  let b = -relative_position.dot(relative_velocity);
  let c = relative_position.length_squared() - radius * radius;
  if c <= 0.0 {
    return (b > 0.0).then_some(0.0);
  }
  let a = relative_velocity.length_squared();
  if a < 1.0e-8 || b <= 0.0 {
    return None;
  }
  let discriminant = b * b - a * c;
  if discriminant < 0.0 {
    return None;
  }
  Some(((b - discriminant.sqrt()) / a).max(0.0))
}

/// Determines the parameter along the ray `origin + t * direction` at which
/// the ray crosses the segment `(p, q)`, in the horizontal plane. Returns
/// [`None`] when the ray misses the segment.
pub(crate) fn intersect_ray_segment_2d(
  origin: Vec3,
  direction: Vec3,
  p: Vec3,
  q: Vec3,
) -> Option<f32> {
  let origin = horizontal(origin);
  let direction = horizontal(direction);
  let (p, q) = (horizontal(p), horizontal(q));

  let segment_delta = q - p;
  let denominator = segment_delta.perp_dot(direction);
  if denominator.abs() < 1.0e-6 {
    return None;
  }
  let to_origin = origin - p;
  let t = segment_delta.perp_dot(to_origin) / -denominator;
  let s = direction.perp_dot(to_origin) / -denominator;
  if t < 0.0 || !(0.0..=1.0).contains(&s) {
    return None;
  }
  Some(t)
}

/// Determines whether `point` lies inside the convex polygon `vertices` when
/// projected onto the horizontal plane. The polygon must wind
/// counter-clockwise. Points on the boundary count as inside.
pub(crate) fn point_in_polygon_2d(point: Vec3, vertices: &[Vec3]) -> bool {
  let point = horizontal(point);
  for index in 0..vertices.len() {
    let a = horizontal(vertices[index]);
    let b = horizontal(vertices[(index + 1) % vertices.len()]);
    if (b - a).perp_dot(point - a) < -1.0e-6 {
      return false;
    }
  }
  true
}

/// Clamps `vector` so its length does not exceed `limit`.
pub(crate) fn clamp_length(vector: Vec3, limit: f32) -> Vec3 {
  let length_squared = vector.length_squared();
  if length_squared <= limit * limit {
    return vector;
  }
  if length_squared == 0.0 {
    return Vec3::ZERO;
  }
  vector * (limit / length_squared.sqrt())
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod test;
