use glam::Vec3;

use crate::{
  astar::{SlicedFindPath, SlicedStatus},
  geometry::{distance_squared_2d, point_in_polygon_2d, triangle_area_2},
  nav_mesh::{PolyRef, ValidNavigationMesh},
  nav_query::QueryFilter,
};

/// The corner is the end of the path.
pub const CORNER_END: u8 = 1;
/// The corner enters an off-mesh connection.
pub const CORNER_OFFMESH_CONNECTION: u8 = 2;

/// Corners closer than this to the corridor position are dropped.
const MIN_CORNER_DISTANCE: f32 = 0.01;

/// The iteration budget of a single topology optimization pass.
const TOPOLOGY_OPT_MAX_ITERS: usize = 32;
/// The node budget of a single topology optimization pass.
const TOPOLOGY_OPT_NODE_BUDGET: usize = 512;

/// A steering corner extracted from a corridor.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Corner {
  /// The position of the corner.
  pub point: Vec3,
  /// A combination of [`CORNER_END`] and [`CORNER_OFFMESH_CONNECTION`].
  pub flags: u8,
  /// The polygon the path enters at this corner.
  pub poly: PolyRef,
}

/// The result of moving a corridor over an off-mesh connection.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct OffMeshCrossing {
  /// The polygon the connection starts from.
  pub start_poly: PolyRef,
  /// The polygon the connection ends at.
  pub end_poly: PolyRef,
  /// The point the connection is entered from.
  pub start_pos: Vec3,
  /// The point the connection exits to.
  pub end_pos: Vec3,
}

/// A contiguous sequence of navigation mesh polygons from an agent to its
/// target, maintained incrementally as the agent moves.
#[derive(Clone, Debug)]
pub struct PathCorridor {
  polys: Vec<PolyRef>,
  max_path_results: usize,
  pos: Vec3,
  target: Vec3,
}

impl PathCorridor {
  /// Creates a corridor holding at most `max_path_results` polygons. The
  /// corridor is unusable until [`Self::reset`].
  pub fn new(max_path_results: usize) -> Self {
    Self {
      polys: Vec::with_capacity(max_path_results),
      max_path_results: max_path_results.max(1),
      pos: Vec3::ZERO,
      target: Vec3::ZERO,
    }
  }

  /// Whether the corridor holds a path.
  pub fn is_set(&self) -> bool {
    !self.polys.is_empty()
  }

  /// Collapses the corridor to the single polygon `poly_ref` at `pos`.
  pub fn reset(&mut self, poly_ref: PolyRef, pos: Vec3) {
    self.polys.clear();
    self.polys.push(poly_ref);
    self.pos = pos;
    self.target = pos;
  }

  /// Clears the corridor entirely. Used when an agent has no valid polygon.
  pub fn clear(&mut self) {
    self.polys.clear();
  }

  pub fn pos(&self) -> Vec3 {
    self.pos
  }

  pub fn target(&self) -> Vec3 {
    self.target
  }

  pub fn path(&self) -> &[PolyRef] {
    &self.polys
  }

  pub fn path_count(&self) -> usize {
    self.polys.len()
  }

  pub fn first_poly(&self) -> Option<PolyRef> {
    self.polys.first().copied()
  }

  pub fn last_poly(&self) -> Option<PolyRef> {
    self.polys.last().copied()
  }

  /// Updates the corridor after the agent has moved to `new_pos`, popping
  /// polygons the agent has walked past. The returned position is `new_pos`
  /// constrained to the (new) first polygon.
  pub fn move_position(
    &mut self,
    new_pos: Vec3,
    mesh: &ValidNavigationMesh,
  ) -> Vec3 {
    if !self.is_set() {
      return new_pos;
    }

    // Walk the corridor forward looking for the polygon the agent is now in.
    // The walk stops at an off-mesh connection; those are crossed through
    // [`Self::move_over_offmesh_connection`] only.
    let mut containing_index = None;
    for (index, &poly) in self.polys.iter().enumerate() {
      if mesh.is_connection(poly) {
        break;
      }
      if point_in_polygon_2d(new_pos, &mesh.polygon_vertices(poly)) {
        containing_index = Some(index);
        break;
      }
    }
    if let Some(index) = containing_index {
      self.polys.drain(..index);
    }

    self.pos = mesh
      .closest_point_on_poly(self.polys[0], new_pos)
      .unwrap_or(new_pos);
    self.pos
  }

  /// Extracts up to `max_corners` straight-path corners from the corridor
  /// position towards the target.
  pub fn find_corners(
    &self,
    max_corners: usize,
    mesh: &ValidNavigationMesh,
  ) -> Vec<Corner> {
    if !self.is_set() || max_corners == 0 {
      return Vec::new();
    }

    // The funnel runs up to the first off-mesh connection; its entry point
    // terminates the straight path.
    let mut portal_polys = self.polys.len();
    let mut end = (self.target, CORNER_END, *self.polys.last().unwrap());
    for (index, &poly) in self.polys.iter().enumerate().skip(1) {
      if mesh.is_connection(poly) {
        portal_polys = index;
        end = (
          mesh.connection(poly).unwrap().start,
          CORNER_OFFMESH_CONNECTION,
          poly,
        );
        break;
      }
    }

    let portals = (0..portal_polys.saturating_sub(1))
      .map(|index| {
        mesh
          .portal_between(self.polys[index], self.polys[index + 1])
          .unwrap_or((self.pos, self.pos))
      })
      .collect::<Vec<_>>();

    let mut corners = Vec::new();
    let mut apex = self.pos;
    let mut start_index = 0;
    while corners.len() < max_corners {
      match funnel_next(apex, &portals, start_index, end.0) {
        FunnelStep::Corner { index, point } => {
          corners.push(Corner {
            point,
            flags: 0,
            // The corner is a portal endpoint, so the path enters the portal's
            // far polygon there.
            poly: self.polys[(index + 1).min(self.polys.len() - 1)],
          });
          if distance_squared_2d(apex, point) < 1.0e-10 {
            // Degenerate geometry. Skip the portal to guarantee progress.
            start_index = index + 1;
          } else {
            start_index = index;
          }
          apex = point;
        }
        FunnelStep::End => {
          corners.push(Corner { point: end.0, flags: end.1, poly: end.2 });
          break;
        }
      }
    }

    // Drop corners the agent is already standing on, except entries to
    // off-mesh connections.
    while let Some(first) = corners.first() {
      if first.flags & CORNER_OFFMESH_CONNECTION == 0
        && distance_squared_2d(first.point, self.pos)
          < MIN_CORNER_DISTANCE * MIN_CORNER_DISTANCE
        && corners.len() > 1
      {
        corners.remove(0);
      } else {
        break;
      }
    }

    corners
  }

  /// Shortens the corridor to `corner_target` if it is visible through the
  /// navigation mesh within `range` of the current position.
  pub fn optimize_path_visibility(
    &mut self,
    corner_target: Vec3,
    range: f32,
    mesh: &ValidNavigationMesh,
    filter: &QueryFilter,
  ) {
    if !self.is_set() {
      return;
    }
    let distance = distance_squared_2d(self.pos, corner_target).sqrt();
    if distance < MIN_CORNER_DISTANCE {
      return;
    }
    let clamped = self.pos
      + (corner_target - self.pos) * (distance.min(range + 0.01) / distance);

    let result = mesh.raycast(self.polys[0], self.pos, clamped, filter);
    if result.hit.is_none() && result.visited.len() > 1 {
      self.merge_start_shortcut(&result.visited);
    }
  }

  /// Runs a bounded local search from the current position towards the end of
  /// the corridor, replacing the corridor front when a better route exists.
  pub fn optimize_path_topology(
    &mut self,
    mesh: &ValidNavigationMesh,
    filter: &QueryFilter,
  ) {
    if self.polys.len() < 3 {
      return;
    }

    let mut search = SlicedFindPath::new(
      mesh,
      filter,
      self.polys[0],
      *self.polys.last().unwrap(),
      self.pos,
      self.target,
      TOPOLOGY_OPT_NODE_BUDGET,
    );
    search.update(mesh, TOPOLOGY_OPT_MAX_ITERS);
    if search.status() == SlicedStatus::Failed {
      return;
    }
    let (path, _) = search.finalize_partial(&self.polys, self.max_path_results);
    if path.len() > 1 {
      self.merge_start_shortcut(&path);
    }
  }

  /// Replaces the corridor with `polys` ending at `target`. Fails (returning
  /// false) unless `polys` starts at the corridor's current first polygon.
  pub fn set_corridor(&mut self, target: Vec3, polys: &[PolyRef]) -> bool {
    if polys.is_empty() || self.polys.first() != polys.first() {
      return false;
    }
    self.polys.clear();
    self
      .polys
      .extend_from_slice(&polys[..polys.len().min(self.max_path_results)]);
    self.target = target;
    true
  }

  /// Whether the first `lookahead` polygons of the corridor all pass
  /// `filter`.
  pub fn is_valid(
    &self,
    lookahead: usize,
    mesh: &ValidNavigationMesh,
    filter: &QueryFilter,
  ) -> bool {
    self
      .polys
      .iter()
      .take(lookahead)
      .all(|&poly| mesh.is_valid_poly_ref(poly, filter))
  }

  /// Repairs the corridor front after the agent was snapped to
  /// `new_first_ref` at `new_pos`.
  pub fn fix_path_start(&mut self, new_first_ref: PolyRef, new_pos: Vec3) {
    self.pos = new_pos;
    if self.polys.first() == Some(&new_first_ref) {
      return;
    }
    self.polys.insert(0, new_first_ref);
    // Drop a duplicate right behind the inserted polygon.
    if self.polys.len() > 1 && self.polys[1] == new_first_ref {
      self.polys.remove(1);
    }
    self.polys.truncate(self.max_path_results);
    if self.polys.len() == 1 {
      self.target = self.pos;
    }
  }

  /// If `connection_poly` sits at the front of the corridor, pops everything
  /// up to and including it and advances the corridor position to the
  /// connection's end point.
  pub fn move_over_offmesh_connection(
    &mut self,
    connection_poly: PolyRef,
    mesh: &ValidNavigationMesh,
  ) -> Option<OffMeshCrossing> {
    let connection = mesh.connection(connection_poly)?;
    let connection_index = self
      .polys
      .iter()
      .take(2)
      .position(|&poly| poly == connection_poly)?;
    // The corridor must continue past the connection.
    if connection_index + 1 >= self.polys.len() {
      return None;
    }

    let crossing = OffMeshCrossing {
      start_poly: mesh.poly_ref(connection.start_polygon),
      end_poly: mesh.poly_ref(connection.end_polygon),
      start_pos: connection.start,
      end_pos: connection.end,
    };
    self.polys.drain(..=connection_index);
    self.pos = crossing.end_pos;
    Some(crossing)
  }

  /// Replaces the corridor front with `shortcut`, keeping the tail after the
  /// furthest polygon both have in common.
  fn merge_start_shortcut(&mut self, shortcut: &[PolyRef]) {
    let mut common = None;
    'outer: for (path_index, path_poly) in self.polys.iter().enumerate().rev()
    {
      for (shortcut_index, shortcut_poly) in
        shortcut.iter().enumerate().rev()
      {
        if path_poly == shortcut_poly {
          common = Some((path_index, shortcut_index));
          break 'outer;
        }
      }
    }
    let Some((path_index, shortcut_index)) = common else { return };

    let mut merged = shortcut[..=shortcut_index].to_vec();
    merged.extend_from_slice(&self.polys[path_index + 1..]);
    merged.truncate(self.max_path_results);
    self.polys = merged;
  }
}

enum FunnelStep {
  /// The straight path corners at the portal `index`.
  Corner { index: usize, point: Vec3 },
  /// The end point is directly reachable.
  End,
}

/// Finds the next corner of the straight path from `apex` through `portals`
/// (starting at `start_index`) towards `end_point`. Portals are (left, right)
/// pairs from the traveller's perspective.
fn funnel_next(
  apex: Vec3,
  portals: &[(Vec3, Vec3)],
  start_index: usize,
  end_point: Vec3,
) -> FunnelStep {
  if start_index >= portals.len() {
    return FunnelStep::End;
  }

  let (mut left_index, mut right_index) = (start_index, start_index);
  let (mut current_left, mut current_right) = portals[start_index];

  for portal_index in start_index + 1..=portals.len() {
    let (portal_left, portal_right) = if portal_index == portals.len() {
      (end_point, end_point)
    } else {
      portals[portal_index]
    };

    if triangle_area_2(apex, current_right, portal_right) >= 0.0 {
      if triangle_area_2(apex, current_left, portal_right) <= 0.0 {
        right_index = portal_index;
        current_right = portal_right;
      } else {
        return FunnelStep::Corner { index: left_index, point: current_left };
      }
    }

    if triangle_area_2(apex, current_left, portal_left) <= 0.0 {
      if triangle_area_2(apex, current_right, portal_left) >= 0.0 {
        left_index = portal_index;
        current_left = portal_left;
      } else {
        return FunnelStep::Corner {
          index: right_index,
          point: current_right,
        };
      }
    }
  }

  FunnelStep::End
}

#[cfg(test)]
#[path = "corridor_test.rs"]
mod test;
