use glam::Vec3;

use super::{
  NavigationMesh, OffMeshConnection, ValidationError, DEFAULT_POLYGON_FLAGS,
};

fn stacked_squares() -> NavigationMesh {
  NavigationMesh {
    vertices: vec![
      Vec3::new(0.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 1.0),
      Vec3::new(0.0, 0.0, 1.0),
      Vec3::new(1.0, 0.0, 2.0),
      Vec3::new(0.0, 0.0, 2.0),
    ],
    polygons: vec![vec![0, 1, 2, 3], vec![3, 2, 4, 5]],
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; 2],
    off_mesh_connections: vec![],
  }
}

#[test]
fn validates_stacked_squares() {
  let mesh = stacked_squares().validate().expect("the mesh is valid");

  assert_eq!(mesh.polygon_count(), 2);
  let first = mesh.poly_ref(0);
  let second = mesh.poly_ref(1);
  assert_eq!(mesh.region(first), mesh.region(second));
  assert_eq!(mesh.neighbors(first), vec![second]);
  assert_eq!(mesh.neighbors(second), vec![first]);
  // Two polygons with one shared edge leave six boundary edges.
  assert_eq!(mesh.boundary_edges.len(), 6);
}

#[test]
fn portal_is_oriented_from_the_travellers_perspective() {
  let mesh = stacked_squares().validate().expect("the mesh is valid");

  let (left, right) = mesh
    .portal_between(mesh.poly_ref(0), mesh.poly_ref(1))
    .expect("the polygons are connected");
  // Crossing towards +Z, the traveller's left is the smaller X.
  assert_eq!(left, Vec3::new(0.0, 0.0, 1.0));
  assert_eq!(right, Vec3::new(1.0, 0.0, 1.0));
}

#[test]
fn rejects_flags_of_wrong_length() {
  let mut mesh = stacked_squares();
  mesh.polygon_flags.pop();
  assert_eq!(
    mesh.validate().map(|_| ()),
    Err(ValidationError::FlagsHaveWrongLength(2, 1))
  );
}

#[test]
fn rejects_degenerate_and_concave_polygons() {
  let mut too_few = stacked_squares();
  too_few.polygons[0] = vec![0, 1];
  assert_eq!(
    too_few.validate().map(|_| ()),
    Err(ValidationError::NotEnoughVerticesInPolygon(0))
  );

  let mut bad_index = stacked_squares();
  bad_index.polygons[0][0] = 17;
  assert_eq!(
    bad_index.validate().map(|_| ()),
    Err(ValidationError::InvalidVertexIndexInPolygon(0))
  );

  // Reversing the winding makes the polygon read as concave.
  let mut clockwise = stacked_squares();
  clockwise.polygons[0].reverse();
  assert_eq!(
    clockwise.validate().map(|_| ()),
    Err(ValidationError::ConcavePolygon(0))
  );
}

#[test]
fn disconnected_polygons_get_distinct_regions() {
  let mesh = NavigationMesh {
    vertices: vec![
      Vec3::new(0.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 1.0),
      Vec3::new(0.0, 0.0, 1.0),
      Vec3::new(3.0, 0.0, 0.0),
      Vec3::new(4.0, 0.0, 0.0),
      Vec3::new(4.0, 0.0, 1.0),
      Vec3::new(3.0, 0.0, 1.0),
    ],
    polygons: vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; 2],
    off_mesh_connections: vec![],
  }
  .validate()
  .expect("the mesh is valid");

  assert_ne!(mesh.region(mesh.poly_ref(0)), mesh.region(mesh.poly_ref(1)));
}

#[test]
fn off_mesh_connection_joins_regions() {
  let mesh = NavigationMesh {
    vertices: vec![
      Vec3::new(0.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 0.0),
      Vec3::new(1.0, 0.0, 1.0),
      Vec3::new(0.0, 0.0, 1.0),
      Vec3::new(3.0, 0.0, 0.0),
      Vec3::new(4.0, 0.0, 0.0),
      Vec3::new(4.0, 0.0, 1.0),
      Vec3::new(3.0, 0.0, 1.0),
    ],
    polygons: vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; 2],
    off_mesh_connections: vec![OffMeshConnection {
      start: Vec3::new(0.9, 0.0, 0.5),
      end: Vec3::new(3.1, 0.0, 0.5),
      radius: 0.3,
      flags: DEFAULT_POLYGON_FLAGS,
    }],
  }
  .validate()
  .expect("the mesh is valid");

  let start = mesh.poly_ref(0);
  let end = mesh.poly_ref(1);
  let connection = mesh.connection_ref(0);

  assert_eq!(mesh.region(start), mesh.region(end));
  assert!(mesh.is_connection(connection));
  assert!(mesh.neighbors(start).contains(&connection));
  assert_eq!(mesh.neighbors(connection), vec![end]);
  // The portal into a connection collapses to its entry point.
  assert_eq!(
    mesh.portal_between(start, connection),
    Some((Vec3::new(0.9, 0.0, 0.5), Vec3::new(0.9, 0.0, 0.5)))
  );
}

#[test]
fn rejects_connection_endpoint_off_the_mesh() {
  let mut mesh = stacked_squares();
  mesh.off_mesh_connections.push(OffMeshConnection {
    start: Vec3::new(0.5, 0.0, 0.5),
    end: Vec3::new(50.0, 0.0, 50.0),
    radius: 0.3,
    flags: DEFAULT_POLYGON_FLAGS,
  });
  assert_eq!(
    mesh.validate().map(|_| ()),
    Err(ValidationError::OffMeshConnectionOutsideMesh(0))
  );
}

#[test]
fn polygon_flags_can_be_replaced() {
  let mut mesh = stacked_squares().validate().expect("the mesh is valid");
  let poly = mesh.poly_ref(0);

  assert_eq!(mesh.flags(poly), Some(DEFAULT_POLYGON_FLAGS));
  mesh.set_polygon_flags(poly, 0);
  assert_eq!(mesh.flags(poly), Some(0));
}
