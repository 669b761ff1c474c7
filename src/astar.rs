use std::{
  cmp::Reverse,
  collections::{BinaryHeap, HashMap},
};

use glam::Vec3;

use crate::{
  geometry::distance_2d,
  nav_mesh::{PolyRef, ValidNavigationMesh},
  nav_query::QueryFilter,
};

/// The default limit on search nodes for a full path search.
pub(crate) const DEFAULT_SEARCH_NODE_BUDGET: usize = 4096;

/// The status of a sliced path search.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SlicedStatus {
  /// The search has iterations left to run.
  InProgress,
  /// The search ended and a (possibly partial) path can be finalized.
  Complete,
  /// The search cannot produce a path.
  Failed,
}

/// A node which represents a single path (by following the previous nodes).
struct Node {
  /// The cost of the path up to this node.
  cost: f32,
  /// The polygon the node is at.
  poly: PolyRef,
  /// The index of the previous node in the path. Only `None` for the start.
  previous_node: Option<usize>,
}

/// A reference to a node in the open queue.
struct OpenNodeRef {
  /// The cost of the path of the node.
  cost: f32,
  /// The cost plus the heuristic for this node.
  estimate: f32,
  /// The index of the node.
  index: usize,
}

impl PartialEq for OpenNodeRef {
  fn eq(&self, other: &Self) -> bool {
    self.estimate == other.estimate
  }
}

impl Eq for OpenNodeRef {}

// Since we are comparing floats which are not Ord, it is more meaningful to
// impl PartialOrd, then unwrap in Ord.
#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for OpenNodeRef {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    match self.estimate.partial_cmp(&other.estimate) {
      Some(std::cmp::Ordering::Equal) => {
        Reverse(self.cost).partial_cmp(&Reverse(other.cost))
      }
      Some(ord) => Some(ord),
      None => None,
    }
  }
}

impl Ord for OpenNodeRef {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.partial_cmp(other).unwrap()
  }
}

/// An iteration-budgeted A* search over navigation mesh polygons. The search
/// holds no reference to the mesh; each call is passed the mesh it was
/// initialized against.
pub(crate) struct SlicedFindPath {
  end_ref: PolyRef,
  end_pos: Vec3,
  filter: QueryFilter,
  nodes: Vec<Node>,
  open: BinaryHeap<Reverse<OpenNodeRef>>,
  /// The best estimate and node index seen per polygon.
  best_per_poly: HashMap<PolyRef, (f32, usize)>,
  /// The explored node closest to the goal, by heuristic.
  best_node: Option<(usize, f32)>,
  /// The node that reached [`Self::end_ref`], if any.
  end_node: Option<usize>,
  node_budget: usize,
  status: SlicedStatus,
}

impl SlicedFindPath {
  /// Starts a search from `start_pos` on `start_ref` to `end_pos` on
  /// `end_ref`. Invalid references and disconnected regions fail immediately.
  pub(crate) fn new(
    mesh: &ValidNavigationMesh,
    filter: &QueryFilter,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: Vec3,
    end_pos: Vec3,
    node_budget: usize,
  ) -> Self {
    let mut search = Self {
      end_ref,
      end_pos,
      filter: *filter,
      nodes: Vec::new(),
      open: BinaryHeap::new(),
      best_per_poly: HashMap::new(),
      best_node: None,
      end_node: None,
      node_budget,
      status: SlicedStatus::InProgress,
    };

    if !mesh.is_valid_poly_ref(start_ref, filter)
      || !mesh.is_valid_poly_ref(end_ref, filter)
      || mesh.region(start_ref) != mesh.region(end_ref)
    {
      search.status = SlicedStatus::Failed;
      return search;
    }

    let heuristic = distance_2d(start_pos, end_pos);
    search.nodes.push(Node { cost: 0.0, poly: start_ref, previous_node: None });
    search.best_per_poly.insert(start_ref, (heuristic, 0));
    search.best_node = Some((0, heuristic));
    search.open.push(Reverse(OpenNodeRef {
      cost: 0.0,
      estimate: heuristic,
      index: 0,
    }));
    if start_ref == end_ref {
      search.end_node = Some(0);
      search.status = SlicedStatus::Complete;
    }
    search
  }

  pub(crate) fn status(&self) -> SlicedStatus {
    self.status
  }

  /// Advances the search by at most `max_iter` node expansions. Returns the
  /// status after the work.
  pub(crate) fn update(
    &mut self,
    mesh: &ValidNavigationMesh,
    max_iter: usize,
  ) -> SlicedStatus {
    if self.status != SlicedStatus::InProgress {
      return self.status;
    }

    for _ in 0..max_iter {
      let Some(Reverse(current_ref)) = self.open.pop() else {
        // The reachable polygons are exhausted, so the best partial path is
        // the result.
        self.status = SlicedStatus::Complete;
        return self.status;
      };
      let current_node = &self.nodes[current_ref.index];
      match self.best_per_poly.get(&current_node.poly) {
        Some(&(best_estimate, _)) if best_estimate < current_ref.estimate => {
          // A better path to this polygon was already expanded.
          continue;
        }
        _ => {}
      }

      if current_node.poly == self.end_ref {
        self.end_node = Some(current_ref.index);
        self.status = SlicedStatus::Complete;
        return self.status;
      }

      let current_cost = current_node.cost;
      let current_poly = current_node.poly;
      let current_center = mesh
        .center(current_poly)
        .expect("expanded polygons exist in the mesh");

      for neighbor in mesh.neighbors(current_poly) {
        let Some(flags) = mesh.flags(neighbor) else { continue };
        if !self.filter.passes(flags) {
          continue;
        }
        let neighbor_center =
          mesh.center(neighbor).expect("neighbors exist in the mesh");
        let cost = current_cost + distance_2d(current_center, neighbor_center);
        let heuristic = distance_2d(neighbor_center, self.end_pos);
        let estimate = cost + heuristic;

        match self.best_per_poly.get(&neighbor) {
          Some(&(best_estimate, _)) if best_estimate <= estimate => continue,
          _ => {}
        }
        if self.nodes.len() >= self.node_budget {
          // Out of nodes. End the search with what has been explored.
          self.status = SlicedStatus::Complete;
          return self.status;
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
          cost,
          poly: neighbor,
          previous_node: Some(current_ref.index),
        });
        self.best_per_poly.insert(neighbor, (estimate, index));
        self.open.push(Reverse(OpenNodeRef { cost, estimate, index }));

        match self.best_node {
          Some((_, best_heuristic)) if best_heuristic <= heuristic => {}
          _ => self.best_node = Some((index, heuristic)),
        }
      }
    }

    if self.open.is_empty() {
      self.status = SlicedStatus::Complete;
    }
    self.status
  }

  /// Produces the path found by the search: the full path if the goal was
  /// reached, otherwise the path to the explored polygon closest to the goal.
  /// Returns the polygons (truncated to `max_results`, keeping the front) and
  /// whether the path is partial.
  pub(crate) fn finalize(&self, max_results: usize) -> (Vec<PolyRef>, bool) {
    if self.status == SlicedStatus::Failed {
      return (Vec::new(), true);
    }
    match self.end_node {
      Some(end_node) => (self.reconstruct(end_node, max_results), false),
      None => match self.best_node {
        Some((best_node, _)) => (self.reconstruct(best_node, max_results), true),
        None => (Vec::new(), true),
      },
    }
  }

  /// Produces a path that tries to follow `existing`: the path to the
  /// furthest polygon of `existing` that the search visited. Used to keep an
  /// agent on its steady path while replanning.
  pub(crate) fn finalize_partial(
    &self,
    existing: &[PolyRef],
    max_results: usize,
  ) -> (Vec<PolyRef>, bool) {
    if self.status == SlicedStatus::Failed {
      return (Vec::new(), true);
    }
    if let Some(end_node) = self.end_node {
      return (self.reconstruct(end_node, max_results), false);
    }
    for poly in existing.iter().rev() {
      if let Some(&(_, node_index)) = self.best_per_poly.get(poly) {
        return (self.reconstruct(node_index, max_results), true);
      }
    }
    self.finalize(max_results)
  }

  fn reconstruct(&self, node_index: usize, max_results: usize) -> Vec<PolyRef> {
    let mut path = Vec::new();
    let mut current = Some(node_index);
    while let Some(index) = current {
      let node = &self.nodes[index];
      path.push(node.poly);
      current = node.previous_node;
    }
    path.reverse();
    path.truncate(max_results.max(1));
    path
  }
}

#[cfg(test)]
#[path = "astar_test.rs"]
mod test;
