use crate::{
  agent::{Agent, AgentId},
  avoidance::CollisionAvoidance,
  crowd_query::CrowdQuery,
  flocking::{Alignment, Cohesion, Flocking, Separation},
  path_following::PathFollowing,
  pipeline::Pipeline,
  seek::Seek,
};

/// The ID of a behavior registered in a [`crate::Crowd`]. Agents refer to
/// their behavior through this ID; the crowd owns the behavior itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BehaviorId(pub(crate) u32);

impl BehaviorId {
  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

/// A steering behavior: given the previous-tick agent and a [`CrowdQuery`],
/// it produces the agent's new desired velocity (and possibly more, e.g. path
/// following also maintains the agent's corridor and may hand the agent to an
/// off-mesh animation).
pub enum Behavior {
  PathFollowing(PathFollowing),
  CollisionAvoidance(CollisionAvoidance),
  Seek(Seek),
  Separation(Separation),
  Alignment(Alignment),
  Cohesion(Cohesion),
  Flocking(Flocking),
  Pipeline(Pipeline),
}

impl Behavior {
  /// Runs the behavior for one agent. Reads `old_agent`, writes `new_agent`.
  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    match self {
      Behavior::PathFollowing(behavior) => {
        behavior.update(query, old_agent, new_agent, dt)
      }
      Behavior::CollisionAvoidance(behavior) => {
        behavior.update(query, old_agent, new_agent)
      }
      Behavior::Seek(behavior) => behavior.update(query, old_agent, new_agent),
      Behavior::Separation(behavior) => {
        behavior.update(query, old_agent, new_agent, dt)
      }
      Behavior::Alignment(behavior) => {
        behavior.update(query, old_agent, new_agent)
      }
      Behavior::Cohesion(behavior) => {
        behavior.update(query, old_agent, new_agent)
      }
      Behavior::Flocking(behavior) => {
        behavior.update(query, old_agent, new_agent, dt)
      }
      Behavior::Pipeline(behavior) => {
        behavior.update(query, old_agent, new_agent, dt)
      }
    }
  }
}

/// A dense per-agent parameter store. Agent IDs are small integers, so each
/// behavior keeps its parameters in a fixed-size array indexed by ID rather
/// than a map.
pub struct ParameterTable<P> {
  params: Vec<Option<P>>,
}

impl<P> ParameterTable<P> {
  /// Creates a table with room for `nb_max_agents` agents.
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: (0..nb_max_agents).map(|_| None).collect() }
  }

  /// The parameters of `agent_id`, if any were set.
  pub fn get(&self, agent_id: AgentId) -> Option<&P> {
    self.params.get(agent_id.index()).and_then(|params| params.as_ref())
  }

  pub fn get_mut(&mut self, agent_id: AgentId) -> Option<&mut P> {
    self.params.get_mut(agent_id.index()).and_then(|params| params.as_mut())
  }

  /// Sets the parameters of `agent_id`. Out-of-range IDs are ignored.
  pub fn insert(&mut self, agent_id: AgentId, params: P) {
    if let Some(slot) = self.params.get_mut(agent_id.index()) {
      *slot = Some(params);
    }
  }

  /// The IDs with parameters set.
  pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
    self
      .params
      .iter()
      .enumerate()
      .filter_map(|(index, params)| {
        params.as_ref().map(|_| AgentId(index as u32))
      })
  }
}

#[cfg(test)]
#[path = "behavior_test.rs"]
mod test;
