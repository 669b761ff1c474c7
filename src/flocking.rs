use glam::Vec3;

use crate::{
  agent::{Agent, AgentId},
  behavior::ParameterTable,
  crowd_query::CrowdQuery,
  geometry::clamp_length,
};

/// Per-agent parameters for the [`Separation`] behavior. The target list is
/// owned by the parameter record.
#[derive(Clone, Debug)]
pub struct SeparationParams {
  /// The agents to keep away from.
  pub targets: Vec<AgentId>,
  /// Targets further than this exert no repulsion.
  pub distance: f32,
  /// The strength of the repulsion.
  pub weight: f32,
}

/// Pushes an agent away from its targets, harder the closer they are.
pub struct Separation {
  params: ParameterTable<SeparationParams>,
}

impl Separation {
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: ParameterTable::new(nb_max_agents) }
  }

  pub fn set_params(&mut self, agent_id: AgentId, params: SeparationParams) {
    self.params.insert(agent_id, params);
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    let Some(params) = self.params.get(old_agent.id()) else { return };
    new_agent.desired_velocity = separation_velocity(
      query,
      old_agent,
      &params.targets,
      params.distance,
      params.weight,
      dt,
    );
  }
}

/// Per-agent parameters for the [`Alignment`] behavior.
#[derive(Clone, Debug)]
pub struct AlignmentParams {
  /// The agents to match velocities with.
  pub targets: Vec<AgentId>,
}

/// Steers an agent to move the way its targets are moving.
pub struct Alignment {
  params: ParameterTable<AlignmentParams>,
}

impl Alignment {
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: ParameterTable::new(nb_max_agents) }
  }

  pub fn set_params(&mut self, agent_id: AgentId, params: AlignmentParams) {
    self.params.insert(agent_id, params);
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
  ) {
    let Some(params) = self.params.get(old_agent.id()) else { return };
    new_agent.desired_velocity =
      alignment_velocity(query, old_agent, &params.targets);
  }
}

/// Per-agent parameters for the [`Cohesion`] behavior.
#[derive(Clone, Debug)]
pub struct CohesionParams {
  /// The agents whose center of gravity is steered towards.
  pub targets: Vec<AgentId>,
}

/// Steers an agent towards the center of gravity of its targets.
pub struct Cohesion {
  params: ParameterTable<CohesionParams>,
}

impl Cohesion {
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: ParameterTable::new(nb_max_agents) }
  }

  pub fn set_params(&mut self, agent_id: AgentId, params: CohesionParams) {
    self.params.insert(agent_id, params);
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
  ) {
    let Some(params) = self.params.get(old_agent.id()) else { return };
    new_agent.desired_velocity =
      cohesion_velocity(query, old_agent, &params.targets);
  }
}

/// Per-agent parameters for the [`Flocking`] behavior.
#[derive(Clone, Debug)]
pub struct FlockingParams {
  /// The other members of the flock.
  pub targets: Vec<AgentId>,
  /// The distance members try to keep between each other.
  pub separation_distance: f32,
  /// The weight of separation in the combination.
  pub separation_weight: f32,
  /// The weight of cohesion in the combination.
  pub cohesion_weight: f32,
  /// The weight of alignment in the combination.
  pub alignment_weight: f32,
}

/// The flocking behavior: a convex combination of separation, cohesion and
/// alignment against the other members of the flock.
pub struct Flocking {
  params: ParameterTable<FlockingParams>,
}

impl Flocking {
  pub fn new(nb_max_agents: usize) -> Self {
    Self { params: ParameterTable::new(nb_max_agents) }
  }

  pub fn set_params(&mut self, agent_id: AgentId, params: FlockingParams) {
    self.params.insert(agent_id, params);
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    let Some(params) = self.params.get(old_agent.id()) else { return };
    let total_weight = params.separation_weight
      + params.cohesion_weight
      + params.alignment_weight;
    if total_weight <= 0.0 {
      return;
    }

    let separation = separation_velocity(
      query,
      old_agent,
      &params.targets,
      params.separation_distance,
      params.separation_weight,
      dt,
    );
    let cohesion = cohesion_velocity(query, old_agent, &params.targets);
    let alignment = alignment_velocity(query, old_agent, &params.targets);

    let combined = (separation * params.separation_weight
      + cohesion * params.cohesion_weight
      + alignment * params.alignment_weight)
      / total_weight;
    new_agent.desired_velocity = clamp_length(combined, old_agent.max_speed);
  }
}

/// The sum of repulsive forces from each target within `distance`, applied to
/// the agent's current velocity.
fn separation_velocity(
  query: &CrowdQuery,
  agent: &Agent,
  targets: &[AgentId],
  distance: f32,
  weight: f32,
  dt: f32,
) -> Vec3 {
  if distance <= 0.0 {
    return agent.velocity;
  }
  let mut force = Vec3::ZERO;
  for &target_id in targets {
    // Missing or inactive targets are skipped silently.
    let Some(target) = query.agent(target_id) else { continue };
    let mut away = agent.position - target.position;
    away.y = 0.0;
    let target_distance = away.length();
    if target_distance >= distance {
      continue;
    }
    force +=
      away.normalize_or_zero() * weight * (1.0 - target_distance / distance);
  }
  clamp_length(agent.velocity + force * dt, agent.max_speed)
}

/// The average velocity of the targets, clamped to the agent's maximum speed.
fn alignment_velocity(
  query: &CrowdQuery,
  agent: &Agent,
  targets: &[AgentId],
) -> Vec3 {
  let mut sum = Vec3::ZERO;
  let mut count = 0;
  for &target_id in targets {
    let Some(target) = query.agent(target_id) else { continue };
    sum += target.velocity;
    count += 1;
  }
  if count == 0 {
    return Vec3::ZERO;
  }
  clamp_length(sum / count as f32, agent.max_speed)
}

/// Steers towards the arithmetic center of the targets' positions.
fn cohesion_velocity(
  query: &CrowdQuery,
  agent: &Agent,
  targets: &[AgentId],
) -> Vec3 {
  let mut center = Vec3::ZERO;
  let mut count = 0;
  for &target_id in targets {
    let Some(target) = query.agent(target_id) else { continue };
    center += target.position;
    count += 1;
  }
  if count == 0 {
    return Vec3::ZERO;
  }
  let mut direction = center / count as f32 - agent.position;
  direction.y = 0.0;
  direction.normalize_or_zero() * agent.max_speed
}

#[cfg(test)]
#[path = "flocking_test.rs"]
mod test;
