use std::{cmp::Ordering, collections::HashMap};

use disjoint::DisjointSet;
use glam::Vec3;
use thiserror::Error;

use crate::{
  geometry::{
    distance_squared_to_segment_2d, horizontal, point_in_polygon_2d,
  },
  util::BoundingBox,
};

/// The default flags assigned to walkable polygons.
pub const DEFAULT_POLYGON_FLAGS: u16 = 1;

/// A reference to a polygon (or an off-mesh connection) in a
/// [`ValidNavigationMesh`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PolyRef(pub(crate) u32);

impl PolyRef {
  pub(crate) fn index(&self) -> usize {
    self.0 as usize
  }
}

/// A navigation mesh.
pub struct NavigationMesh {
  /// The vertices that make up the polygons.
  pub vertices: Vec<Vec3>,
  /// The polygons of the mesh. Polygons are indices to the `vertices` that
  /// make up the polygon. Polygons must be convex, and oriented
  /// counterclockwise in the horizontal (XZ) plane. Polygons are assumed to
  /// be not self-intersecting.
  pub polygons: Vec<Vec<usize>>,
  /// The filter flags of each polygon. Must be the same length as
  /// [`Self::polygons`]. Flags are matched against a
  /// [`crate::QueryFilter`]'s include and exclude masks.
  pub polygon_flags: Vec<u16>,
  /// The off-mesh connections of the mesh. Connections are traversed by
  /// animation rather than continuous motion.
  pub off_mesh_connections: Vec<OffMeshConnection>,
}

/// A scripted link between two points on the navigation mesh. Traversal is
/// one-directional, from [`Self::start`] to [`Self::end`].
#[derive(Clone, Debug)]
pub struct OffMeshConnection {
  /// The point the connection is entered from.
  pub start: Vec3,
  /// The point the connection exits to.
  pub end: Vec3,
  /// The distance at which an agent may enter the connection.
  pub radius: f32,
  /// The filter flags of the connection.
  pub flags: u16,
}

/// An error when validating a navigation mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  /// Stores the number of polygons and the number of flags.
  #[error("The polygon flags do not have the same length as the polygons. There are {0} polygons, but {1} flags.")]
  FlagsHaveWrongLength(usize, usize),
  /// Stores the index of the polygon.
  #[error(
    "The polygon at index {0} is concave or has edges in clockwise order."
  )]
  ConcavePolygon(usize),
  /// Stores the index of the polygon.
  #[error("The polygon at index {0} does not have at least 3 vertices.")]
  NotEnoughVerticesInPolygon(usize),
  /// Stores the index of the polygon.
  #[error("The polygon at index {0} references an out-of-bounds vertex.")]
  InvalidVertexIndexInPolygon(usize),
  /// Stores the index of the polygon.
  #[error("The polygon at index {0} contains a degenerate edge (an edge with zero length).")]
  DegenerateEdgeInPolygon(usize),
  /// Stores the indices of the two vertices that make up the edge.
  #[error(
    "The edge made from vertices {0} and {1} is used by more than two polygons."
  )]
  DoublyConnectedEdge(usize, usize),
  /// Stores the index of the off-mesh connection.
  #[error("The off-mesh connection at index {0} has an endpoint that is not on any polygon.")]
  OffMeshConnectionOutsideMesh(usize),
}

impl NavigationMesh {
  /// Ensures required invariants of the navigation mesh, and computes derived
  /// properties to produce an optimized and validated navigation mesh.
  /// Returns an error if the navigation mesh is invalid in some way.
  pub fn validate(mut self) -> Result<ValidNavigationMesh, ValidationError> {
    if self.polygons.len() != self.polygon_flags.len() {
      return Err(ValidationError::FlagsHaveWrongLength(
        self.polygons.len(),
        self.polygon_flags.len(),
      ));
    }

    let mesh_bounds = self
      .vertices
      .iter()
      .fold(BoundingBox::Empty, |acc, &vertex| acc.expand_to_point(vertex));

    let mut region_sets = DisjointSet::with_len(self.polygons.len());

    enum ConnectivityState {
      Disconnected,
      Boundary {
        polygon: usize,
        edge: usize,
      },
      Connected {
        polygon_1: usize,
        edge_1: usize,
        polygon_2: usize,
        edge_2: usize,
      },
    }
    let mut connectivity_set = HashMap::new();

    for (polygon_index, polygon) in self.polygons.iter().enumerate() {
      if polygon.len() < 3 {
        return Err(ValidationError::NotEnoughVerticesInPolygon(polygon_index));
      }

      for vertex_index in polygon {
        if *vertex_index >= self.vertices.len() {
          return Err(ValidationError::InvalidVertexIndexInPolygon(
            polygon_index,
          ));
        }
      }

      for i in 0..polygon.len() {
        let left_vertex =
          polygon[if i == 0 { polygon.len() - 1 } else { i - 1 }];
        let center_vertex = polygon[i];
        let right_vertex =
          polygon[if i == polygon.len() - 1 { 0 } else { i + 1 }];

        // Check if the edge is degenerate.

        let edge = if center_vertex < right_vertex {
          (center_vertex, right_vertex)
        } else {
          (right_vertex, center_vertex)
        };
        if edge.0 == edge.1 {
          return Err(ValidationError::DegenerateEdgeInPolygon(polygon_index));
        }

        // Derive connectivity for the edge.

        let state = connectivity_set
          .entry(edge)
          .or_insert(ConnectivityState::Disconnected);
        match state {
          ConnectivityState::Disconnected => {
            *state =
              ConnectivityState::Boundary { polygon: polygon_index, edge: i };
          }
          &mut ConnectivityState::Boundary {
            polygon: polygon_1,
            edge: edge_1,
            ..
          } => {
            *state = ConnectivityState::Connected {
              polygon_1,
              edge_1,
              polygon_2: polygon_index,
              edge_2: i,
            };
            region_sets.join(polygon_1, polygon_index);
          }
          ConnectivityState::Connected { .. } => {
            return Err(ValidationError::DoublyConnectedEdge(edge.0, edge.1));
          }
        }

        // Check if the vertex is concave.

        let left_vertex = horizontal(self.vertices[left_vertex]);
        let center_vertex = horizontal(self.vertices[center_vertex]);
        let right_vertex = horizontal(self.vertices[right_vertex]);

        let left_edge = left_vertex - center_vertex;
        let right_edge = right_vertex - center_vertex;

        match right_edge.perp_dot(left_edge).partial_cmp(&0.0) {
          // The right edge is to the right of the left edge.
          Some(Ordering::Greater) => {}
          // The right edge is parallel to the left edge, but they point in
          // opposite directions.
          Some(Ordering::Equal) if right_edge.dot(left_edge) < 0.0 => {}
          // The polygon is concave (or wound clockwise).
          _ => return Err(ValidationError::ConcavePolygon(polygon_index)),
        }
      }
    }

    // Resolve off-mesh connection endpoints onto polygons before regions are
    // normalized so connected components account for the links.

    let find_containing_polygon = |point: Vec3, max_distance: f32| {
      let mut best: Option<(usize, f32)> = None;
      for (polygon_index, polygon) in self.polygons.iter().enumerate() {
        let distance_squared = if point_in_polygon_2d(
          point,
          &polygon.iter().map(|&v| self.vertices[v]).collect::<Vec<_>>(),
        ) {
          0.0
        } else {
          (0..polygon.len())
            .map(|i| {
              distance_squared_to_segment_2d(
                point,
                self.vertices[polygon[i]],
                self.vertices[polygon[(i + 1) % polygon.len()]],
              )
            })
            .fold(f32::INFINITY, f32::min)
        };
        match best {
          Some((_, best_distance)) if best_distance <= distance_squared => {}
          _ => best = Some((polygon_index, distance_squared)),
        }
      }
      best
        .filter(|&(_, distance_squared)| {
          distance_squared <= max_distance * max_distance
        })
        .map(|(polygon_index, _)| polygon_index)
    };

    let mut off_mesh_connections = Vec::new();
    for (connection_index, connection) in
      self.off_mesh_connections.iter().enumerate()
    {
      let endpoint_tolerance = connection.radius.max(0.1);
      let (Some(start_polygon), Some(end_polygon)) = (
        find_containing_polygon(connection.start, endpoint_tolerance),
        find_containing_polygon(connection.end, endpoint_tolerance),
      ) else {
        return Err(ValidationError::OffMeshConnectionOutsideMesh(
          connection_index,
        ));
      };
      region_sets.join(start_polygon, end_polygon);
      off_mesh_connections.push(ValidOffMeshConnection {
        start: connection.start,
        end: connection.end,
        radius: connection.radius,
        flags: connection.flags,
        start_polygon,
        end_polygon,
      });
    }

    let mut region_to_normalized_region = HashMap::new();

    let mut polygons = self
      .polygons
      .drain(..)
      .enumerate()
      .map(|(polygon_index, polygon_vertices)| ValidPolygon {
        bounds: polygon_vertices.iter().fold(
          BoundingBox::Empty,
          |bounds, vertex| bounds.expand_to_point(self.vertices[*vertex]),
        ),
        center: polygon_vertices.iter().map(|i| self.vertices[*i]).sum::<Vec3>()
          / polygon_vertices.len() as f32,
        connectivity: vec![None; polygon_vertices.len()],
        connection_links: Vec::new(),
        vertices: polygon_vertices,
        region: {
          let region = region_sets.root_of(polygon_index);
          let new_normalized_region = region_to_normalized_region.len();
          *region_to_normalized_region
            .entry(region)
            .or_insert_with(|| new_normalized_region)
        },
        flags: self.polygon_flags[polygon_index],
      })
      .collect::<Vec<_>>();

    let mut boundary_edges = Vec::new();
    for connectivity_state in connectivity_set.values() {
      match connectivity_state {
        ConnectivityState::Disconnected => panic!("Value is never stored"),
        &ConnectivityState::Boundary { polygon, edge } => {
          boundary_edges
            .push(MeshEdgeRef { edge_index: edge, polygon_index: polygon });
        }
        &ConnectivityState::Connected {
          polygon_1,
          edge_1,
          polygon_2,
          edge_2,
        } => {
          polygons[polygon_1].connectivity[edge_1] =
            Some(Connectivity { polygon_index: polygon_2 });
          polygons[polygon_2].connectivity[edge_2] =
            Some(Connectivity { polygon_index: polygon_1 });
        }
      }
    }

    for (connection_index, connection) in off_mesh_connections.iter().enumerate()
    {
      polygons[connection.start_polygon]
        .connection_links
        .push(connection_index);
    }

    Ok(ValidNavigationMesh {
      mesh_bounds,
      vertices: self.vertices,
      polygons,
      boundary_edges,
      off_mesh_connections,
    })
  }
}

/// A navigation mesh which has been validated and whose derived data has been
/// computed.
#[derive(Clone, Debug)]
pub struct ValidNavigationMesh {
  /// The bounds of the mesh data itself. This is a tight bounding box around
  /// the vertices of the navigation mesh.
  pub(crate) mesh_bounds: BoundingBox,
  /// The vertices that make up the polygons.
  pub(crate) vertices: Vec<Vec3>,
  /// The polygons of the mesh.
  pub(crate) polygons: Vec<ValidPolygon>,
  /// The boundary edges in the navigation mesh. Each edge borders the
  /// exterior (or an unlinked interior hole) of the mesh.
  pub(crate) boundary_edges: Vec<MeshEdgeRef>,
  /// The off-mesh connections, with their endpoints resolved to polygons.
  pub(crate) off_mesh_connections: Vec<ValidOffMeshConnection>,
}

/// A valid polygon. This means the polygon is convex and indexes the
/// `vertices` Vec of the corresponding ValidNavigationMesh.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct ValidPolygon {
  /// The vertices are indexes to the `vertices` Vec of the corresponding
  /// ValidNavigationMesh.
  pub(crate) vertices: Vec<usize>,
  /// The connectivity of each edge in the polygon. This is the same length as
  /// the number of edges (which is equivalent to `self.vertices.len()`).
  /// Entries that are `None` correspond to the boundary of the navigation
  /// mesh, while `Some` entries are connected to another polygon.
  pub(crate) connectivity: Vec<Option<Connectivity>>,
  /// Indices into the mesh's off-mesh connections that start on this polygon.
  pub(crate) connection_links: Vec<usize>,
  /// The "region" that this polygon belongs to. Each region is disjoint from
  /// every other. A path between two polygons only exists if their regions
  /// match.
  pub(crate) region: usize,
  /// The filter flags of this polygon.
  pub(crate) flags: u16,
  /// The bounding box of `vertices`.
  pub(crate) bounds: BoundingBox,
  /// The center of the polygon.
  pub(crate) center: Vec3,
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Connectivity {
  /// The index of the polygon that this edge leads to.
  pub(crate) polygon_index: usize,
}

/// A reference to an edge on a navigation mesh.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default)]
pub(crate) struct MeshEdgeRef {
  /// The index of the polygon that this edge belongs to.
  pub(crate) polygon_index: usize,
  /// The index of the edge within the polygon.
  pub(crate) edge_index: usize,
}

/// An off-mesh connection whose endpoints have been resolved onto polygons.
#[derive(Clone, Debug)]
pub(crate) struct ValidOffMeshConnection {
  /// The point the connection is entered from.
  pub(crate) start: Vec3,
  /// The point the connection exits to.
  pub(crate) end: Vec3,
  /// The distance at which an agent may enter the connection.
  pub(crate) radius: f32,
  /// The filter flags of the connection.
  pub(crate) flags: u16,
  /// The polygon containing [`Self::start`].
  pub(crate) start_polygon: usize,
  /// The polygon containing [`Self::end`].
  pub(crate) end_polygon: usize,
}

impl ValidNavigationMesh {
  /// The number of ordinary polygons. References at or past this count refer
  /// to off-mesh connections.
  pub fn polygon_count(&self) -> usize {
    self.polygons.len()
  }

  /// The reference of the polygon at `index`. Off-mesh connections follow the
  /// ordinary polygons.
  pub fn poly_ref(&self, index: usize) -> PolyRef {
    debug_assert!(
      index < self.polygons.len() + self.off_mesh_connections.len()
    );
    PolyRef(index as u32)
  }

  /// Whether `poly_ref` refers to an off-mesh connection.
  pub fn is_connection(&self, poly_ref: PolyRef) -> bool {
    (self.polygons.len()
      ..self.polygons.len() + self.off_mesh_connections.len())
      .contains(&poly_ref.index())
  }

  /// Replaces the flags of the polygon (or connection) at `poly_ref`.
  pub fn set_polygon_flags(&mut self, poly_ref: PolyRef, flags: u16) {
    if let Some(polygon) = self.polygons.get_mut(poly_ref.index()) {
      polygon.flags = flags;
    } else if let Some(connection) = self
      .off_mesh_connections
      .get_mut(poly_ref.index() - self.polygons.len())
    {
      connection.flags = flags;
    }
  }

  pub(crate) fn polygon(&self, poly_ref: PolyRef) -> Option<&ValidPolygon> {
    self.polygons.get(poly_ref.index())
  }

  pub(crate) fn connection(
    &self,
    poly_ref: PolyRef,
  ) -> Option<&ValidOffMeshConnection> {
    poly_ref
      .index()
      .checked_sub(self.polygons.len())
      .and_then(|index| self.off_mesh_connections.get(index))
  }

  /// The reference of the off-mesh connection at `connection_index`.
  pub(crate) fn connection_ref(&self, connection_index: usize) -> PolyRef {
    PolyRef((self.polygons.len() + connection_index) as u32)
  }

  /// The filter flags of `poly_ref`, or [`None`] for a dangling reference.
  pub(crate) fn flags(&self, poly_ref: PolyRef) -> Option<u16> {
    if let Some(polygon) = self.polygon(poly_ref) {
      Some(polygon.flags)
    } else {
      self.connection(poly_ref).map(|connection| connection.flags)
    }
  }

  /// The region of `poly_ref`. Connections take the region of their start
  /// polygon (which their end polygon was joined with during validation).
  pub(crate) fn region(&self, poly_ref: PolyRef) -> Option<usize> {
    if let Some(polygon) = self.polygon(poly_ref) {
      Some(polygon.region)
    } else {
      self
        .connection(poly_ref)
        .map(|connection| self.polygons[connection.start_polygon].region)
    }
  }

  /// A rough central point of `poly_ref`, used for path cost estimates.
  pub(crate) fn center(&self, poly_ref: PolyRef) -> Option<Vec3> {
    if let Some(polygon) = self.polygon(poly_ref) {
      Some(polygon.center)
    } else {
      self
        .connection(poly_ref)
        .map(|connection| (connection.start + connection.end) * 0.5)
    }
  }

  /// The world-space vertices of the polygon at `poly_ref`. Connections have
  /// no vertices.
  pub(crate) fn polygon_vertices(&self, poly_ref: PolyRef) -> Vec<Vec3> {
    match self.polygon(poly_ref) {
      None => Vec::new(),
      Some(polygon) => {
        polygon.vertices.iter().map(|&v| self.vertices[v]).collect()
      }
    }
  }

  /// Every reference reachable from `poly_ref` in one step: edge neighbours,
  /// connections starting on the polygon, and (for a connection) the end
  /// polygon.
  pub(crate) fn neighbors(&self, poly_ref: PolyRef) -> Vec<PolyRef> {
    if let Some(connection) = self.connection(poly_ref) {
      return vec![PolyRef(connection.end_polygon as u32)];
    }
    let Some(polygon) = self.polygon(poly_ref) else {
      return Vec::new();
    };
    polygon
      .connectivity
      .iter()
      .filter_map(|connectivity| {
        connectivity
          .as_ref()
          .map(|connectivity| PolyRef(connectivity.polygon_index as u32))
      })
      .chain(
        polygon
          .connection_links
          .iter()
          .map(|&connection_index| self.connection_ref(connection_index)),
      )
      .collect()
  }

  /// The portal crossed when moving from `from` to `to`, as a (left, right)
  /// pair from the traveller's perspective. Portals into and out of off-mesh
  /// connections collapse to their entry and exit points.
  pub(crate) fn portal_between(
    &self,
    from: PolyRef,
    to: PolyRef,
  ) -> Option<(Vec3, Vec3)> {
    if let Some(connection) = self.connection(to) {
      return Some((connection.start, connection.start));
    }
    if let Some(connection) = self.connection(from) {
      return Some((connection.end, connection.end));
    }
    let polygon = self.polygon(from)?;
    for (edge_index, connectivity) in polygon.connectivity.iter().enumerate() {
      match connectivity {
        Some(connectivity) if connectivity.polygon_index == to.index() => {
          let next_index = (edge_index + 1) % polygon.vertices.len();
          return Some((
            self.vertices[polygon.vertices[next_index]],
            self.vertices[polygon.vertices[edge_index]],
          ));
        }
        _ => {}
      }
    }
    None
  }

  /// The endpoints of the boundary edge `edge_ref`.
  pub(crate) fn boundary_edge_points(
    &self,
    edge_ref: &MeshEdgeRef,
  ) -> (Vec3, Vec3) {
    let polygon = &self.polygons[edge_ref.polygon_index];
    let next_index = (edge_ref.edge_index + 1) % polygon.vertices.len();
    (
      self.vertices[polygon.vertices[edge_ref.edge_index]],
      self.vertices[polygon.vertices[next_index]],
    )
  }
}

#[cfg(test)]
#[path = "nav_mesh_test.rs"]
mod test;
