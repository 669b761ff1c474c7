use glam::{Vec2, Vec3};
use ord_subset::OrdVar;

use crate::{
  geometry::{from_horizontal, horizontal, point_in_polygon_2d},
  nav_mesh::{PolyRef, ValidNavigationMesh},
  util::BoundingBox,
};

/// Defines polygon filtering for navigation mesh queries. A polygon passes
/// the filter iff it shares a flag with [`Self::include_flags`] and shares no
/// flag with [`Self::exclude_flags`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueryFilter {
  /// Flags a polygon must have at least one of.
  pub include_flags: u16,
  /// Flags a polygon must have none of.
  pub exclude_flags: u16,
}

impl Default for QueryFilter {
  fn default() -> Self {
    Self { include_flags: u16::MAX, exclude_flags: 0 }
  }
}

impl QueryFilter {
  /// Whether a polygon with `flags` passes the filter.
  pub fn passes(&self, flags: u16) -> bool {
    (flags & self.include_flags) != 0 && (flags & self.exclude_flags) == 0
  }
}

/// The result of a [`ValidNavigationMesh::raycast`].
#[derive(Clone, Debug, PartialEq)]
pub struct RaycastResult {
  /// The parameter along the ray at which a boundary was hit, or [`None`] if
  /// the end point was reached.
  pub hit: Option<f32>,
  /// The polygons the ray travelled through, starting at the start polygon.
  pub visited: Vec<PolyRef>,
}

impl ValidNavigationMesh {
  /// Whether `poly_ref` refers to an existing polygon (or connection) that
  /// passes `filter`.
  pub fn is_valid_poly_ref(
    &self,
    poly_ref: PolyRef,
    filter: &QueryFilter,
  ) -> bool {
    self.flags(poly_ref).is_some_and(|flags| filter.passes(flags))
  }

  /// Finds the polygon nearest to `point`, searching within `extents` along
  /// each axis. Returns the polygon and the nearest point on it.
  pub fn find_nearest_polygon(
    &self,
    point: Vec3,
    extents: Vec3,
    filter: &QueryFilter,
  ) -> Option<(PolyRef, Vec3)> {
    let query_bounds =
      BoundingBox::new_box(point - extents, point + extents);
    if !query_bounds.intersects_bounds(&self.mesh_bounds) {
      return None;
    }
    (0..self.polygon_count())
      .filter_map(|polygon_index| {
        let poly_ref = self.poly_ref(polygon_index);
        let polygon = self.polygon(poly_ref).unwrap();
        if !filter.passes(polygon.flags)
          || !query_bounds
            .intersects_bounds(&polygon.bounds.expand_by_size(extents))
        {
          return None;
        }
        let nearest = self.closest_point_on_poly(poly_ref, point)?;
        let delta = (nearest - point).abs();
        if delta.x > extents.x || delta.y > extents.y || delta.z > extents.z {
          return None;
        }
        Some((point.distance_squared(nearest), poly_ref, nearest))
      })
      .min_by_key(|&(distance_squared, _, _)| {
        OrdVar::new_unchecked(distance_squared)
      })
      .map(|(_, poly_ref, nearest)| (poly_ref, nearest))
  }

  /// The point on `poly_ref` closest to `point`. Off-mesh connections are
  /// treated as their start-to-end segment.
  pub fn closest_point_on_poly(
    &self,
    poly_ref: PolyRef,
    point: Vec3,
  ) -> Option<Vec3> {
    if let Some(connection) = self.connection(poly_ref) {
      let (projected, _) = crate::geometry::project_point_to_line_segment(
        point,
        (connection.start, connection.end),
      );
      return Some(projected);
    }

    self.polygon(poly_ref)?;
    let vertices = self.polygon_vertices(poly_ref);
    if point_in_polygon_2d(point, &vertices) {
      let height = polygon_height_at(&vertices, horizontal(point));
      return Some(from_horizontal(horizontal(point), height));
    }

    (0..vertices.len())
      .map(|edge_index| {
        let (projected, _) = crate::geometry::project_point_to_line_segment(
          point,
          (vertices[edge_index], vertices[(edge_index + 1) % vertices.len()]),
        );
        projected
      })
      .min_by_key(|projected| {
        OrdVar::new_unchecked(point.distance_squared(*projected))
      })
  }

  /// Casts a ray along the navigation mesh surface from `start` (on
  /// `start_ref`) towards `end`, walking polygon to polygon until a boundary
  /// (or a polygon rejected by `filter`) blocks it.
  pub fn raycast(
    &self,
    start_ref: PolyRef,
    start: Vec3,
    end: Vec3,
    filter: &QueryFilter,
  ) -> RaycastResult {
    let mut visited = vec![start_ref];
    let direction = horizontal(end) - horizontal(start);
    if direction.length_squared() < 1.0e-12 {
      return RaycastResult { hit: None, visited };
    }

    let mut current = start_ref;
    // The walk visits each polygon at most once, so the polygon count bounds
    // the iterations.
    for _ in 0..self.polygon_count() {
      let Some(polygon) = self.polygon(current) else {
        return RaycastResult { hit: Some(0.0), visited };
      };
      let vertices = self.polygon_vertices(current);

      let mut exit: Option<(usize, f32)> = None;
      for edge_index in 0..vertices.len() {
        let a = horizontal(vertices[edge_index]);
        let b = horizontal(vertices[(edge_index + 1) % vertices.len()]);
        let edge = b - a;
        // The interior is to the left of each edge, so this faces outward.
        let outward = Vec2::new(edge.y, -edge.x);
        let denominator = outward.dot(direction);
        if denominator <= 0.0 {
          continue;
        }
        let t = (outward.dot(a - horizontal(start)) / denominator).max(0.0);
        match exit {
          Some((_, exit_t)) if exit_t <= t => {}
          _ => exit = Some((edge_index, t)),
        }
      }

      let Some((exit_edge, exit_t)) = exit else {
        return RaycastResult { hit: None, visited };
      };
      if exit_t >= 1.0 {
        return RaycastResult { hit: None, visited };
      }

      match &polygon.connectivity[exit_edge] {
        Some(connectivity)
          if self.is_valid_poly_ref(
            PolyRef(connectivity.polygon_index as u32),
            filter,
          ) =>
        {
          current = PolyRef(connectivity.polygon_index as u32);
          visited.push(current);
        }
        _ => return RaycastResult { hit: Some(exit_t), visited },
      }
    }

    RaycastResult { hit: None, visited }
  }
}

/// The height of the polygon's plane at the horizontal position `point`.
/// Degenerate planes fall back to the average vertex height.
fn polygon_height_at(vertices: &[Vec3], point: Vec2) -> f32 {
  // Newell's method.
  let mut normal = Vec3::ZERO;
  for index in 0..vertices.len() {
    let a = vertices[index];
    let b = vertices[(index + 1) % vertices.len()];
    normal += Vec3::new(
      (a.y - b.y) * (a.z + b.z),
      (a.z - b.z) * (a.x + b.x),
      (a.x - b.x) * (a.y + b.y),
    );
  }
  if normal.y.abs() < 1.0e-6 {
    return vertices.iter().map(|v| v.y).sum::<f32>() / vertices.len() as f32;
  }
  let origin = vertices[0];
  origin.y
    - (normal.x * (point.x - origin.x) + normal.z * (point.y - origin.z))
      / normal.y
}

#[cfg(test)]
#[path = "nav_query_test.rs"]
mod test;
