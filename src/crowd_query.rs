use glam::Vec3;
use kdtree::{distance::squared_euclidean, KdTree};

use crate::{
  agent::{Agent, AgentId, AgentState},
  geometry::distance_squared_to_segment_2d,
  nav_mesh::ValidNavigationMesh,
  nav_query::QueryFilter,
};

/// A read-only snapshot of the crowd's environment for one tick. Behaviors
/// observe the previous tick's agent table through this, so the outcome does
/// not depend on agent iteration order.
pub struct CrowdQuery<'a> {
  mesh: &'a ValidNavigationMesh,
  filter: QueryFilter,
  extents: Vec3,
  agents: &'a [Agent],
  agent_tree: KdTree<f32, usize, [f32; 3]>,
  tick: u64,
}

impl<'a> CrowdQuery<'a> {
  pub(crate) fn new(
    mesh: &'a ValidNavigationMesh,
    filter: QueryFilter,
    extents: Vec3,
    agents: &'a [Agent],
    tick: u64,
  ) -> Self {
    let mut agent_tree = KdTree::new(/* dimensions= */ 3);
    for (index, agent) in agents.iter().enumerate() {
      if !agent.active || agent.state == AgentState::Invalid {
        continue;
      }
      agent_tree
        .add(
          [agent.position.x, agent.position.y, agent.position.z],
          index,
        )
        .expect("Agent position is finite");
    }
    Self { mesh, filter, extents, agents, agent_tree, tick }
  }

  /// The navigation mesh being simulated on.
  pub fn mesh(&self) -> &ValidNavigationMesh {
    self.mesh
  }

  /// The polygon filter of the crowd.
  pub fn filter(&self) -> &QueryFilter {
    &self.filter
  }

  /// The search extents for nearest-polygon lookups.
  pub fn extents(&self) -> Vec3 {
    self.extents
  }

  /// The previous-tick copy of the agent at `id`, if it exists and is active.
  pub fn agent(&self, id: AgentId) -> Option<&Agent> {
    self.agents.get(id.index()).filter(|agent| agent.active)
  }

  /// All previous-tick agents.
  pub fn agents(&self) -> &[Agent] {
    self.agents
  }

  /// The active agents within `agent`'s perception distance, excluding
  /// `agent` itself.
  pub fn neighbors(&self, agent: &Agent) -> Vec<&Agent> {
    let range = agent.perception_distance;
    self
      .agent_tree
      .within(
        &[agent.position.x, agent.position.y, agent.position.z],
        range * range,
        &squared_euclidean,
      )
      .unwrap()
      .into_iter()
      .filter_map(|(_, &index)| {
        let neighbor = &self.agents[index];
        (neighbor.id() != agent.id()).then_some(neighbor)
      })
      .collect()
  }

  /// The navigation mesh boundary edges within `range` of `position`. Each
  /// edge is a wall from the perspective of an agent on the mesh.
  pub fn walls_near(&self, position: Vec3, range: f32) -> Vec<(Vec3, Vec3)> {
    self
      .mesh
      .boundary_edges
      .iter()
      .filter_map(|edge_ref| {
        let (p, q) = self.mesh.boundary_edge_points(edge_ref);
        (distance_squared_to_segment_2d(position, p, q) <= range * range)
          .then_some((p, q))
      })
      .collect()
  }

  /// A counter increased once per [`crate::Crowd::update`]. Behaviors use it
  /// to reset their per-tick bookkeeping.
  pub fn tick(&self) -> u64 {
    self.tick
  }
}
