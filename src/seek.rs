use glam::Vec3;

use crate::{
  agent::{Agent, AgentId},
  behavior::ParameterTable,
  crowd_query::CrowdQuery,
  geometry::distance_2d,
};

/// Per-agent parameters for the [`Seek`] behavior.
#[derive(Clone, Copy, Debug)]
pub struct SeekParams {
  /// The agent being chased.
  pub target: AgentId,
  /// The agent stops once within this distance of the target.
  pub minimal_distance: f32,
  /// How far ahead of the target to aim, in seconds of the target's current
  /// velocity. Zero chases the target's position directly.
  pub prediction_factor: f32,
}

/// Steers an agent towards another agent, optionally predicting where the
/// target is headed.
pub struct Seek {
  params: ParameterTable<SeekParams>,
}

impl Seek {
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: ParameterTable::new(nb_max_agents) }
  }

  pub fn set_params(&mut self, agent_id: AgentId, params: SeekParams) {
    self.params.insert(agent_id, params);
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
  ) {
    let Some(params) = self.params.get(old_agent.id()) else { return };
    // Missing or inactive targets are skipped silently.
    let Some(target) = query.agent(params.target) else { return };

    let aim =
      target.position + target.velocity * params.prediction_factor;
    if distance_2d(old_agent.position, target.position)
      <= params.minimal_distance
    {
      new_agent.desired_velocity = Vec3::ZERO;
      return;
    }

    let mut direction = aim - old_agent.position;
    direction.y = 0.0;
    new_agent.desired_velocity =
      direction.normalize_or_zero() * old_agent.max_speed;
  }
}

#[cfg(test)]
#[path = "seek_test.rs"]
mod test;
