#![doc = include_str!("../README.md")]

mod agent;
mod animation;
mod astar;
mod avoidance;
mod behavior;
mod corridor;
mod crowd_query;
mod flocking;
mod geometry;
mod nav_mesh;
mod nav_query;
mod path_following;
mod path_queue;
mod pipeline;
mod scene;
mod seek;
mod util;

use log::debug;
use thiserror::Error;

pub use glam::Vec3;

pub use agent::{Agent, AgentId, AgentState};
pub use avoidance::{CollisionAvoidance, ObstacleCircle, ObstacleSegment};
pub use behavior::{Behavior, BehaviorId, ParameterTable};
pub use corridor::{
  Corner, OffMeshCrossing, PathCorridor, CORNER_END,
  CORNER_OFFMESH_CONNECTION,
};
pub use crowd_query::CrowdQuery;
pub use flocking::{
  Alignment, AlignmentParams, Cohesion, CohesionParams, Flocking,
  FlockingParams, Separation, SeparationParams,
};
pub use nav_mesh::{
  NavigationMesh, OffMeshConnection, PolyRef, ValidNavigationMesh,
  ValidationError, DEFAULT_POLYGON_FLAGS,
};
pub use nav_query::{QueryFilter, RaycastResult};
pub use path_following::{
  PathFollowing, PathFollowingParams, PathFollowingState,
};
pub use path_queue::{PathQueue, PathQueueTicket, PathRequestStatus};
pub use pipeline::Pipeline;
pub use scene::{Scene, SceneError};
pub use seek::{Seek, SeekParams};

use crate::geometry::clamp_length;

/// Options for creating a [`Crowd`].
#[derive(Clone, Copy, Debug)]
pub struct CrowdConfig {
  /// The capacity of the agent table.
  pub nb_max_agents: usize,
  /// The longest corridor, in polygons, any agent may hold.
  pub max_path_results: usize,
  /// The search distance along each axis for nearest-polygon lookups.
  pub query_extents: Vec3,
  /// The polygon filter applied to every navigation query.
  pub filter: QueryFilter,
}

impl Default for CrowdConfig {
  fn default() -> Self {
    Self {
      nb_max_agents: 128,
      max_path_results: 256,
      query_extents: Vec3::new(2.0, 4.0, 2.0),
      filter: QueryFilter::default(),
    }
  }
}

/// An error when creating a [`Crowd`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum NewCrowdError {
  #[error("The agent table capacity must be positive.")]
  ZeroAgentCapacity,
  #[error("The corridor capacity must be positive.")]
  ZeroPathResults,
}

/// A simulated crowd: the agent table, the behaviors steering the agents and
/// the per-tick update pipeline over a navigation mesh.
pub struct Crowd {
  nav_mesh: ValidNavigationMesh,
  filter: QueryFilter,
  query_extents: Vec3,
  max_path_results: usize,
  /// The front buffer: the state read by behaviors and returned to callers.
  agents: Vec<Agent>,
  /// The back buffer written during [`Self::update`].
  agents_next: Vec<Agent>,
  behaviors: Vec<Behavior>,
  tick: u64,
}

impl Crowd {
  /// Creates a crowd simulating on `nav_mesh`.
  pub fn new(
    nav_mesh: ValidNavigationMesh,
    config: CrowdConfig,
  ) -> Result<Self, NewCrowdError> {
    if config.nb_max_agents == 0 {
      return Err(NewCrowdError::ZeroAgentCapacity);
    }
    if config.max_path_results == 0 {
      return Err(NewCrowdError::ZeroPathResults);
    }

    let agents = (0..config.nb_max_agents)
      .map(|index| {
        let mut agent = Agent::new(AgentId(index as u32), Vec3::ZERO);
        agent.active = false;
        agent
      })
      .collect::<Vec<_>>();
    Ok(Self {
      nav_mesh,
      filter: config.filter,
      query_extents: config.query_extents,
      max_path_results: config.max_path_results,
      agents_next: agents.clone(),
      agents,
      behaviors: Vec::new(),
      tick: 0,
    })
  }

  /// Adds an agent at `position`, snapped to the navigation mesh. Returns
  /// [`None`] when the agent table is full.
  pub fn add_agent(&mut self, position: Vec3) -> Option<AgentId> {
    let slot = self.agents.iter().position(|agent| !agent.active)?;
    let id = AgentId(slot as u32);

    let mut agent = Agent::new(id, position);
    match self.nav_mesh.find_nearest_polygon(
      position,
      self.query_extents,
      &self.filter,
    ) {
      Some((_, nearest)) => agent.position = nearest,
      None => {
        debug!("agent {id:?} added off-mesh, marked invalid");
        agent.state = AgentState::Invalid;
      }
    }
    self.agents[slot] = agent.clone();
    self.agents_next[slot] = agent;
    Some(id)
  }

  /// Deactivates the agent at `id`. The slot becomes reusable.
  pub fn remove_agent(&mut self, id: AgentId) {
    if let Some(agent) = self.agents.get_mut(id.index()) {
      agent.active = false;
    }
    if let Some(agent) = self.agents_next.get_mut(id.index()) {
      agent.active = false;
    }
  }

  /// A copy of the agent at `id`, for mutation through
  /// [`Self::push_agent`].
  pub fn fetch_agent(&self, id: AgentId) -> Option<Agent> {
    self.agent(id).cloned()
  }

  /// Writes back an agent copied out with [`Self::fetch_agent`].
  pub fn push_agent(&mut self, agent: Agent) {
    let index = agent.id().index();
    if index >= self.agents.len() {
      return;
    }
    self.agents[index] = agent.clone();
    self.agents_next[index] = agent;
  }

  /// Moves the agent at `id` to `position`, revalidating it against the
  /// navigation mesh. This is the way to bring an
  /// [`AgentState::Invalid`] agent back into the simulation.
  pub fn push_agent_position(&mut self, id: AgentId, position: Vec3) {
    let Some(mut agent) = self.fetch_agent(id) else { return };
    match self.nav_mesh.find_nearest_polygon(
      position,
      self.query_extents,
      &self.filter,
    ) {
      Some((_, nearest)) => {
        agent.position = nearest;
        agent.state = AgentState::Walking;
      }
      None => {
        agent.position = position;
        agent.state = AgentState::Invalid;
      }
    }
    self.push_agent(agent);
  }

  /// The agent at `id`, if it is active.
  pub fn agent(&self, id: AgentId) -> Option<&Agent> {
    self.agents.get(id.index()).filter(|agent| agent.active)
  }

  /// The number of active agents.
  pub fn agent_count(&self) -> usize {
    self.agents.iter().filter(|agent| agent.active).count()
  }

  /// All active agents.
  pub fn agents(&self) -> impl Iterator<Item = &Agent> {
    self.agents.iter().filter(|agent| agent.active)
  }

  /// Registers `behavior` and returns the ID agents use to refer to it.
  pub fn add_behavior(&mut self, behavior: Behavior) -> BehaviorId {
    self.behaviors.push(behavior);
    BehaviorId((self.behaviors.len() - 1) as u32)
  }

  pub fn behavior(&self, id: BehaviorId) -> Option<&Behavior> {
    self.behaviors.get(id.index())
  }

  pub fn behavior_mut(&mut self, id: BehaviorId) -> Option<&mut Behavior> {
    self.behaviors.get_mut(id.index())
  }

  pub fn nav_mesh(&self) -> &ValidNavigationMesh {
    &self.nav_mesh
  }

  pub fn nav_mesh_mut(&mut self) -> &mut ValidNavigationMesh {
    &mut self.nav_mesh
  }

  pub fn filter(&self) -> &QueryFilter {
    &self.filter
  }

  pub fn filter_mut(&mut self) -> &mut QueryFilter {
    &mut self.filter
  }

  pub fn query_extents(&self) -> Vec3 {
    self.query_extents
  }

  /// The corridor capacity agents of this crowd should use.
  pub fn max_path_results(&self) -> usize {
    self.max_path_results
  }

  /// Advances the simulation by `dt` seconds: runs every active agent's
  /// behavior against a snapshot of the previous tick, integrates the
  /// resulting velocities under the acceleration limit, advances off-mesh
  /// animations and commits the new state.
  pub fn update(&mut self, dt: f32) {
    if dt <= 0.0 {
      return;
    }
    self.tick += 1;

    let Self {
      nav_mesh,
      filter,
      query_extents,
      agents,
      agents_next,
      behaviors,
      tick,
      ..
    } = self;
    let query =
      CrowdQuery::new(nav_mesh, *filter, *query_extents, agents, *tick);

    // Behavior phase: read the old buffer, write the new one.
    for index in 0..agents.len() {
      let old_agent = &agents[index];
      let new_agent = &mut agents_next[index];
      *new_agent = old_agent.clone();
      if !old_agent.active {
        continue;
      }
      match old_agent.state {
        AgentState::Invalid | AgentState::OffMesh => continue,
        AgentState::Walking => {}
      }

      match old_agent
        .behavior
        .and_then(|behavior| behaviors.get_mut(behavior.index()))
      {
        Some(behavior) => behavior.update(&query, old_agent, new_agent, dt),
        // A dangling behavior reference leaves the agent drifting to a stop.
        None => new_agent.desired_velocity = Vec3::ZERO,
      }
    }

    // Integration phase.
    for new_agent in agents_next.iter_mut() {
      if !new_agent.active {
        continue;
      }
      match new_agent.state {
        AgentState::Invalid => {}
        AgentState::Walking => {
          let acceleration = clamp_length(
            (new_agent.desired_velocity - new_agent.velocity) / dt,
            new_agent.max_acceleration,
          );
          new_agent.velocity = clamp_length(
            new_agent.velocity + acceleration * dt,
            new_agent.max_speed,
          );
          new_agent.position += new_agent.velocity * dt;

          // Project the agent back onto the walkable surface.
          if let Some((_, nearest)) = nav_mesh.find_nearest_polygon(
            new_agent.position,
            *query_extents,
            filter,
          ) {
            new_agent.position.y = nearest.y;
          }
        }
        AgentState::OffMesh => match new_agent.animation.as_mut() {
          Some(animation) => {
            new_agent.position = animation.advance(dt);
            if animation.finished() {
              new_agent.position = animation.end_pos();
              new_agent.state = AgentState::Walking;
              new_agent.velocity = Vec3::ZERO;
              new_agent.desired_velocity = Vec3::ZERO;
              new_agent.animation = None;
            }
          }
          // A dropped animation falls back to normal path replanning.
          None => new_agent.state = AgentState::Walking,
        },
      }
    }

    drop(query);
    std::mem::swap(agents, agents_next);
  }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod test;
