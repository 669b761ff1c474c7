use glam::Vec3;

use crate::{animation::OffMeshAnimation, behavior::BehaviorId};

/// The ID of an agent. IDs are small integers: the agent's slot in the
/// crowd's fixed-capacity table. Slots are stable for the lifetime of the
/// crowd.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AgentId(pub(crate) u32);

impl AgentId {
  /// The agent's slot in the crowd's table.
  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

/// The state of an agent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AgentState {
  /// The agent is on the navigation mesh and moves by steering.
  Walking,
  /// The agent is traversing an off-mesh connection by animation.
  OffMesh,
  /// The agent has no valid position on the navigation mesh. It is skipped by
  /// the simulation until explicitly repositioned.
  Invalid,
}

/// An agent in a crowd. Agents are value types: they are read and written
/// through copies ([`crate::Crowd::fetch_agent`] and
/// [`crate::Crowd::push_agent`]) and double-buffered during updates.
#[derive(Clone, Debug)]
pub struct Agent {
  /// The agent's ID, fixed at insertion.
  id: AgentId,
  /// Whether the agent takes part in the simulation.
  pub active: bool,
  /// The state of the agent.
  pub state: AgentState,
  /// The current position of the agent.
  pub position: Vec3,
  /// The current velocity of the agent.
  pub velocity: Vec3,
  /// The velocity the agent wants to move at, as decided by its behavior.
  pub desired_velocity: Vec3,
  /// The radius of the agent.
  pub radius: f32,
  /// The height of the agent.
  pub height: f32,
  /// The maximum speed the agent can move at.
  pub max_speed: f32,
  /// The maximum rate at which the agent's velocity can change.
  pub max_acceleration: f32,
  /// The distance within which the agent perceives other agents and walls.
  pub perception_distance: f32,
  /// The behavior steering this agent. Dangling or absent references leave
  /// the agent's desired velocity at zero.
  pub behavior: Option<BehaviorId>,
  /// The off-mesh traversal in progress while [`Self::state`] is
  /// [`AgentState::OffMesh`].
  pub(crate) animation: Option<OffMeshAnimation>,
}

impl Agent {
  /// Creates an agent at `position` with default parameters.
  pub(crate) fn new(id: AgentId, position: Vec3) -> Self {
    Self {
      id,
      active: true,
      state: AgentState::Walking,
      position,
      velocity: Vec3::ZERO,
      desired_velocity: Vec3::ZERO,
      radius: 0.2,
      height: 1.7,
      max_speed: 2.0,
      max_acceleration: 10.0,
      perception_distance: 4.0,
      behavior: None,
      animation: None,
    }
  }

  pub fn id(&self) -> AgentId {
    self.id
  }
}

#[cfg(test)]
#[path = "agent_test.rs"]
mod test;
