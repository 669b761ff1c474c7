use std::collections::HashMap;

use glam::Vec3;
use serde::Deserialize;
use thiserror::Error;

use crate::{
  agent::AgentId,
  avoidance::CollisionAvoidance,
  behavior::Behavior,
  flocking::{
    Alignment, AlignmentParams, Cohesion, CohesionParams, Flocking,
    FlockingParams, Separation, SeparationParams,
  },
  path_following::PathFollowing,
  pipeline::Pipeline,
  seek::{Seek, SeekParams},
  Crowd, CrowdConfig, NewCrowdError,
};

/// An error when loading or spawning a scene description.
#[derive(Debug, Error)]
pub enum SceneError {
  #[error("Failed to parse the scene document: {0}")]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Crowd(#[from] NewCrowdError),
  #[error("The flocking group {0} does not exist.")]
  UnknownFlockingGroup(usize),
}

/// A crowd scene description, deserialized from the JSON document format of
/// the demo scenes. Unknown keys are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct Scene {
  #[serde(default)]
  scene: Option<SceneFile>,
  #[serde(default)]
  flockings: Vec<FlockingGroup>,
  #[serde(default)]
  agents: Vec<AgentConfig>,
}

#[derive(Clone, Debug, Deserialize)]
struct SceneFile {
  file: String,
}

/// The steering weights of one flocking group.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlockingGroup {
  #[serde(default = "default_weight")]
  desired_separation: f32,
  #[serde(default = "default_weight")]
  separation_weight: f32,
  #[serde(default = "default_weight")]
  cohesion_weight: f32,
  #[serde(default = "default_weight")]
  alignment_weight: f32,
}

impl Default for FlockingGroup {
  fn default() -> Self {
    Self {
      desired_separation: default_weight(),
      separation_weight: default_weight(),
      cohesion_weight: default_weight(),
      alignment_weight: default_weight(),
    }
  }
}

fn default_weight() -> f32 {
  1.0
}

#[derive(Clone, Debug, Deserialize)]
struct AgentConfig {
  position: [f32; 3],
  #[serde(default)]
  parameters: AgentParameters,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentParameters {
  radius: Option<f32>,
  height: Option<f32>,
  max_speed: Option<f32>,
  max_acceleration: Option<f32>,
  /// Maps to [`crate::Agent::perception_distance`].
  collision_query_range: Option<f32>,
  behavior: Option<BehaviorConfig>,
  pipeline: Option<Vec<PipelineStage>>,
}

#[derive(Clone, Debug, Deserialize)]
struct PipelineStage {
  #[serde(default)]
  behavior: Option<BehaviorConfig>,
  #[serde(default)]
  pipeline: Option<Vec<PipelineStage>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BehaviorConfig {
  #[serde(rename_all = "camelCase")]
  CollisionAvoidance {
    weight_desired_velocity: Option<f32>,
    weight_current_velocity: Option<f32>,
    weight_current_avoidance_side: Option<f32>,
    weight_time_to_collision: Option<f32>,
    sample_origin_scale: Option<f32>,
    sample_levels_count: Option<usize>,
    sample_sectors_count: Option<usize>,
    sample_rings_count: Option<usize>,
    horizon_time: Option<f32>,
  },
  #[serde(rename_all = "camelCase")]
  PathFollowing {
    visibility_path_optimization_range: Option<f32>,
    initial_pathfind_iter_count: Option<usize>,
    /// Strictly a number of seconds: non-negative enables, negative
    /// disables. Booleans are rejected.
    local_path_replanning_interval: Option<f32>,
    anticipate_turns: Option<bool>,
    destination: Option<[f32; 3]>,
  },
  #[serde(rename_all = "camelCase")]
  Seek {
    target_idx: Option<usize>,
    minimal_distance: Option<f32>,
    prediction_factor: Option<f32>,
  },
  Separation {
    targets: Option<Vec<usize>>,
    distance: Option<f32>,
    weight: Option<f32>,
  },
  Alignment {
    targets: Option<Vec<usize>>,
  },
  Cohesion {
    targets: Option<Vec<usize>>,
  },
  Flocking {
    #[serde(default)]
    group: usize,
    targets: Option<Vec<usize>>,
  },
}

impl Scene {
  /// Parses a scene from its JSON text.
  pub fn from_json(data: &str) -> Result<Self, SceneError> {
    Ok(serde_json::from_str(data)?)
  }

  /// The mesh file referenced by the scene, if any.
  pub fn scene_file(&self) -> Option<&str> {
    self.scene.as_ref().map(|scene| scene.file.as_str())
  }

  /// The number of agents the scene describes.
  pub fn agent_count(&self) -> usize {
    self.agents.len()
  }

  /// Builds a crowd on `nav_mesh` populated with the scene's agents and
  /// behaviors.
  pub fn spawn(
    &self,
    nav_mesh: crate::ValidNavigationMesh,
  ) -> Result<Crowd, SceneError> {
    let config = CrowdConfig {
      nb_max_agents: self.agents.len().max(1),
      ..CrowdConfig::default()
    };
    let mut crowd = Crowd::new(nav_mesh, config)?;

    for agent_config in self.agents.iter() {
      let id = crowd
        .add_agent(Vec3::from_array(agent_config.position))
        .expect("the capacity matches the agent count");
      let mut agent =
        crowd.fetch_agent(id).expect("the agent was just added");
      let parameters = &agent_config.parameters;
      if let Some(radius) = parameters.radius {
        agent.radius = radius;
      }
      if let Some(height) = parameters.height {
        agent.height = height;
      }
      if let Some(max_speed) = parameters.max_speed {
        agent.max_speed = max_speed;
      }
      if let Some(max_acceleration) = parameters.max_acceleration {
        agent.max_acceleration = max_acceleration;
      }
      if let Some(range) = parameters.collision_query_range {
        agent.perception_distance = range;
      }
      crowd.push_agent(agent);
    }

    // Flocking agents without explicit targets flock with the other members
    // of their group.
    let mut group_members: HashMap<usize, Vec<AgentId>> = HashMap::new();
    for (index, agent_config) in self.agents.iter().enumerate() {
      for group in flocking_groups_in(&agent_config.parameters) {
        group_members
          .entry(group)
          .or_default()
          .push(AgentId(index as u32));
      }
    }

    for (index, agent_config) in self.agents.iter().enumerate() {
      let id = AgentId(index as u32);
      let parameters = &agent_config.parameters;
      let behavior = if let Some(stages) = &parameters.pipeline {
        Some(Behavior::Pipeline(self.build_pipeline(
          stages,
          id,
          &mut crowd,
          &group_members,
        )?))
      } else if let Some(behavior_config) = &parameters.behavior {
        Some(self.build_behavior(
          behavior_config,
          id,
          &mut crowd,
          &group_members,
        )?)
      } else {
        None
      };

      if let Some(behavior) = behavior {
        let behavior_id = crowd.add_behavior(behavior);
        let mut agent =
          crowd.fetch_agent(id).expect("scene agents are active");
        agent.behavior = Some(behavior_id);
        crowd.push_agent(agent);
      }
    }

    Ok(crowd)
  }

  fn build_pipeline(
    &self,
    stages: &[PipelineStage],
    agent_id: AgentId,
    crowd: &mut Crowd,
    group_members: &HashMap<usize, Vec<AgentId>>,
  ) -> Result<Pipeline, SceneError> {
    let mut children = Vec::new();
    for stage in stages {
      if let Some(behavior_config) = &stage.behavior {
        children.push(self.build_behavior(
          behavior_config,
          agent_id,
          crowd,
          group_members,
        )?);
      } else if let Some(nested) = &stage.pipeline {
        children.push(Behavior::Pipeline(self.build_pipeline(
          nested,
          agent_id,
          crowd,
          group_members,
        )?));
      }
    }
    Ok(Pipeline::new(children))
  }

  fn build_behavior(
    &self,
    config: &BehaviorConfig,
    agent_id: AgentId,
    crowd: &mut Crowd,
    group_members: &HashMap<usize, Vec<AgentId>>,
  ) -> Result<Behavior, SceneError> {
    let nb_max_agents = self.agents.len().max(1);
    Ok(match config {
      BehaviorConfig::CollisionAvoidance {
        weight_desired_velocity,
        weight_current_velocity,
        weight_current_avoidance_side,
        weight_time_to_collision,
        sample_origin_scale,
        sample_levels_count,
        sample_sectors_count,
        sample_rings_count,
        horizon_time,
      } => {
        let mut avoidance = CollisionAvoidance::new();
        if let Some(weight) = weight_desired_velocity {
          avoidance.weight_desired_velocity = *weight;
        }
        if let Some(weight) = weight_current_velocity {
          avoidance.weight_current_velocity = *weight;
        }
        if let Some(weight) = weight_current_avoidance_side {
          avoidance.weight_current_avoidance_side = *weight;
        }
        if let Some(weight) = weight_time_to_collision {
          avoidance.weight_time_to_collision = *weight;
        }
        if let Some(scale) = sample_origin_scale {
          avoidance.sample_origin_scale = *scale;
        }
        if let Some(levels) = sample_levels_count {
          avoidance.sample_levels_count = *levels;
        }
        if let Some(sectors) = sample_sectors_count {
          avoidance.sample_sectors_count = *sectors;
        }
        if let Some(rings) = sample_rings_count {
          avoidance.sample_rings_count = *rings;
        }
        if let Some(horizon) = horizon_time {
          avoidance.horizon_time = *horizon;
        }
        Behavior::CollisionAvoidance(avoidance)
      }
      BehaviorConfig::PathFollowing {
        visibility_path_optimization_range,
        initial_pathfind_iter_count,
        local_path_replanning_interval,
        anticipate_turns,
        destination,
      } => {
        let mut path_following =
          PathFollowing::new(nb_max_agents, crowd.max_path_results());
        if let Some(range) = visibility_path_optimization_range {
          path_following.visibility_path_optimization_range = *range;
        }
        if let Some(iterations) = initial_pathfind_iter_count {
          path_following.initial_pathfind_iter_count = *iterations;
        }
        if let Some(interval) = local_path_replanning_interval {
          path_following.local_path_replanning_interval = *interval;
        }
        if let Some(anticipate) = anticipate_turns {
          path_following.anticipate_turns = *anticipate;
        }
        if let Some(destination) = destination {
          let destination = Vec3::from_array(*destination);
          if let Some((poly_ref, nearest)) = crowd
            .nav_mesh()
            .find_nearest_polygon(
              destination,
              crowd.query_extents(),
              crowd.filter(),
            )
          {
            path_following.set_target(agent_id, nearest, poly_ref);
          }
        }
        Behavior::PathFollowing(path_following)
      }
      BehaviorConfig::Seek {
        target_idx,
        minimal_distance,
        prediction_factor,
      } => {
        let mut seek = Seek::new(nb_max_agents);
        if let Some(target) = target_idx {
          seek.set_params(
            agent_id,
            SeekParams {
              target: AgentId(*target as u32),
              minimal_distance: minimal_distance.unwrap_or(0.0),
              prediction_factor: prediction_factor.unwrap_or(0.0),
            },
          );
        }
        Behavior::Seek(seek)
      }
      BehaviorConfig::Separation { targets, distance, weight } => {
        let mut separation = Separation::new(nb_max_agents);
        separation.set_params(
          agent_id,
          SeparationParams {
            targets: resolve_targets(targets),
            distance: distance.unwrap_or(1.0),
            weight: weight.unwrap_or(1.0),
          },
        );
        Behavior::Separation(separation)
      }
      BehaviorConfig::Alignment { targets } => {
        let mut alignment = Alignment::new(nb_max_agents);
        alignment.set_params(
          agent_id,
          AlignmentParams { targets: resolve_targets(targets) },
        );
        Behavior::Alignment(alignment)
      }
      BehaviorConfig::Cohesion { targets } => {
        let mut cohesion = Cohesion::new(nb_max_agents);
        cohesion.set_params(
          agent_id,
          CohesionParams { targets: resolve_targets(targets) },
        );
        Behavior::Cohesion(cohesion)
      }
      BehaviorConfig::Flocking { group, targets } => {
        let group_config = match self.flockings.get(*group) {
          Some(group_config) => group_config.clone(),
          None if self.flockings.is_empty() => FlockingGroup::default(),
          None => return Err(SceneError::UnknownFlockingGroup(*group)),
        };
        let targets = match targets {
          Some(targets) => resolve_targets(&Some(targets.clone())),
          None => group_members
            .get(group)
            .map(|members| {
              members
                .iter()
                .copied()
                .filter(|&member| member != agent_id)
                .collect()
            })
            .unwrap_or_default(),
        };
        let mut flocking = Flocking::new(nb_max_agents);
        flocking.set_params(
          agent_id,
          FlockingParams {
            targets,
            separation_distance: group_config.desired_separation,
            separation_weight: group_config.separation_weight,
            cohesion_weight: group_config.cohesion_weight,
            alignment_weight: group_config.alignment_weight,
          },
        );
        Behavior::Flocking(flocking)
      }
    })
  }
}

fn resolve_targets(targets: &Option<Vec<usize>>) -> Vec<AgentId> {
  targets
    .as_ref()
    .map(|targets| {
      targets.iter().map(|&target| AgentId(target as u32)).collect()
    })
    .unwrap_or_default()
}

/// Every flocking group referenced in the parameter tree.
fn flocking_groups_in(parameters: &AgentParameters) -> Vec<usize> {
  fn scan_config(config: &BehaviorConfig, groups: &mut Vec<usize>) {
    if let BehaviorConfig::Flocking { group, .. } = config {
      groups.push(*group);
    }
  }
  fn scan_stages(stages: &[PipelineStage], groups: &mut Vec<usize>) {
    for stage in stages {
      if let Some(config) = &stage.behavior {
        scan_config(config, groups);
      }
      if let Some(nested) = &stage.pipeline {
        scan_stages(nested, groups);
      }
    }
  }

  let mut groups = Vec::new();
  if let Some(config) = &parameters.behavior {
    scan_config(config, &mut groups);
  }
  if let Some(stages) = &parameters.pipeline {
    scan_stages(stages, &mut groups);
  }
  groups
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod test;
