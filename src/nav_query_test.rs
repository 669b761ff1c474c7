use glam::Vec3;

use super::QueryFilter;
use crate::nav_mesh::{NavigationMesh, ValidNavigationMesh, DEFAULT_POLYGON_FLAGS};

/// A `width` by 1 strip of unit squares along the X axis.
fn strip_mesh(width: usize) -> ValidNavigationMesh {
  let mut vertices = Vec::new();
  for z in 0..=1 {
    for x in 0..=width {
      vertices.push(Vec3::new(x as f32, 0.0, z as f32));
    }
  }
  let polygons = (0..width)
    .map(|x| vec![x, x + 1, width + 2 + x, width + 1 + x])
    .collect::<Vec<_>>();
  NavigationMesh {
    vertices,
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; polygons.len()],
    polygons,
    off_mesh_connections: vec![],
  }
  .validate()
  .expect("the mesh is valid")
}

#[test]
fn filter_matches_include_and_exclude_masks() {
  let filter = QueryFilter::default();
  assert!(filter.passes(1));
  assert!(!filter.passes(0));

  let filter = QueryFilter { include_flags: 1, exclude_flags: 2 };
  assert!(filter.passes(1));
  assert!(!filter.passes(2));
  assert!(!filter.passes(3));
  assert!(!filter.passes(4));
}

#[test]
fn finds_nearest_polygon_under_the_point() {
  let mesh = strip_mesh(3);
  let filter = QueryFilter::default();
  let extents = Vec3::new(1.0, 2.0, 1.0);

  let (poly, nearest) = mesh
    .find_nearest_polygon(Vec3::new(1.5, 0.5, 0.5), extents, &filter)
    .expect("the point is over the mesh");
  assert_eq!(poly, mesh.poly_ref(1));
  assert_eq!(nearest, Vec3::new(1.5, 0.0, 0.5));

  // Far outside the extents there is nothing.
  assert_eq!(
    mesh.find_nearest_polygon(Vec3::new(100.0, 0.0, 0.5), extents, &filter),
    None
  );
}

#[test]
fn nearest_polygon_respects_the_filter() {
  let mut mesh = strip_mesh(2);
  let filter = QueryFilter::default();
  let extents = Vec3::new(2.0, 2.0, 2.0);

  mesh.set_polygon_flags(mesh.poly_ref(0), 0);
  let (poly, nearest) = mesh
    .find_nearest_polygon(Vec3::new(0.5, 0.0, 0.5), extents, &filter)
    .expect("the second polygon is in range");
  assert_eq!(poly, mesh.poly_ref(1));
  assert_eq!(nearest, Vec3::new(1.0, 0.0, 0.5));
}

#[test]
fn closest_point_clamps_to_the_polygon() {
  let mesh = strip_mesh(1);
  let poly = mesh.poly_ref(0);

  assert_eq!(
    mesh.closest_point_on_poly(poly, Vec3::new(0.25, 3.0, 0.75)),
    Some(Vec3::new(0.25, 0.0, 0.75))
  );
  assert_eq!(
    mesh.closest_point_on_poly(poly, Vec3::new(2.0, 0.0, 0.5)),
    Some(Vec3::new(1.0, 0.0, 0.5))
  );
  assert_eq!(mesh.closest_point_on_poly(crate::PolyRef(9), Vec3::ZERO), None);
}

#[test]
fn valid_refs_exist_and_pass_the_filter() {
  let mut mesh = strip_mesh(2);
  let filter = QueryFilter::default();

  assert!(mesh.is_valid_poly_ref(mesh.poly_ref(0), &filter));
  assert!(!mesh.is_valid_poly_ref(crate::PolyRef(9), &filter));

  mesh.set_polygon_flags(mesh.poly_ref(0), 0);
  assert!(!mesh.is_valid_poly_ref(mesh.poly_ref(0), &filter));
}

#[test]
fn raycast_walks_through_connected_polygons() {
  let mesh = strip_mesh(3);
  let filter = QueryFilter::default();

  let result = mesh.raycast(
    mesh.poly_ref(0),
    Vec3::new(0.5, 0.0, 0.5),
    Vec3::new(2.5, 0.0, 0.5),
    &filter,
  );
  assert_eq!(result.hit, None);
  assert_eq!(
    result.visited,
    vec![mesh.poly_ref(0), mesh.poly_ref(1), mesh.poly_ref(2)]
  );
}

#[test]
fn raycast_stops_at_the_boundary() {
  let mesh = strip_mesh(2);
  let filter = QueryFilter::default();

  let result = mesh.raycast(
    mesh.poly_ref(0),
    Vec3::new(0.5, 0.0, 0.5),
    Vec3::new(0.5, 0.0, 2.5),
    &filter,
  );
  // The strip is one unit deep, so the wall at z=1 is hit a quarter in.
  assert_eq!(result.hit, Some(0.25));
  assert_eq!(result.visited, vec![mesh.poly_ref(0)]);
}

#[test]
fn raycast_treats_filtered_polygons_as_walls() {
  let mut mesh = strip_mesh(3);
  let filter = QueryFilter::default();
  mesh.set_polygon_flags(mesh.poly_ref(1), 0);

  let result = mesh.raycast(
    mesh.poly_ref(0),
    Vec3::new(0.5, 0.0, 0.5),
    Vec3::new(2.5, 0.0, 0.5),
    &filter,
  );
  assert_eq!(result.hit, Some(0.25));
  assert_eq!(result.visited, vec![mesh.poly_ref(0)]);
}
