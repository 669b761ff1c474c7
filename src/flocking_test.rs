use glam::Vec3;

use super::{
  Alignment, AlignmentParams, Cohesion, CohesionParams, Flocking,
  FlockingParams, Separation, SeparationParams,
};
use crate::{
  agent::{Agent, AgentId},
  crowd_query::CrowdQuery,
  nav_mesh::{NavigationMesh, ValidNavigationMesh, DEFAULT_POLYGON_FLAGS},
  nav_query::QueryFilter,
};

fn flat_mesh() -> ValidNavigationMesh {
  NavigationMesh {
    vertices: vec![
      Vec3::new(-10.0, 0.0, -10.0),
      Vec3::new(10.0, 0.0, -10.0),
      Vec3::new(10.0, 0.0, 10.0),
      Vec3::new(-10.0, 0.0, 10.0),
    ],
    polygons: vec![vec![0, 1, 2, 3]],
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS],
    off_mesh_connections: vec![],
  }
  .validate()
  .expect("the mesh is valid")
}

fn query<'a>(
  mesh: &'a ValidNavigationMesh,
  agents: &'a [Agent],
) -> CrowdQuery<'a> {
  CrowdQuery::new(
    mesh,
    QueryFilter::default(),
    Vec3::new(2.0, 4.0, 2.0),
    agents,
    1,
  )
}

#[test]
fn separation_pushes_away_from_close_targets() {
  let mesh = flat_mesh();
  let agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(1.0, 0.0, 0.0)),
  ];
  let query = query(&mesh, &agents);

  let mut separation = Separation::new(2);
  separation.set_params(
    AgentId(0),
    SeparationParams {
      targets: vec![AgentId(1)],
      distance: 2.0,
      weight: 1.0,
    },
  );

  let mut new_agent = agents[0].clone();
  separation.update(&query, &agents[0], &mut new_agent, 0.1);
  assert!(new_agent.desired_velocity.x < 0.0);
  assert_eq!(new_agent.desired_velocity.z, 0.0);

  // Targets outside the separation distance exert nothing.
  let far_agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(5.0, 0.0, 0.0)),
  ];
  let far_query = CrowdQuery::new(
    &mesh,
    QueryFilter::default(),
    Vec3::new(2.0, 4.0, 2.0),
    &far_agents,
    1,
  );
  let mut new_agent = far_agents[0].clone();
  separation.update(&far_query, &far_agents[0], &mut new_agent, 0.1);
  assert_eq!(new_agent.desired_velocity, Vec3::ZERO);
}

#[test]
fn alignment_averages_target_velocities() {
  let mesh = flat_mesh();
  let mut agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(1.0, 0.0, 0.0)),
    Agent::new(AgentId(2), Vec3::new(0.0, 0.0, 1.0)),
  ];
  agents[1].velocity = Vec3::new(2.0, 0.0, 0.0);
  agents[2].velocity = Vec3::new(0.0, 0.0, 2.0);
  let query = query(&mesh, &agents);

  let mut alignment = Alignment::new(3);
  alignment.set_params(
    AgentId(0),
    AlignmentParams { targets: vec![AgentId(1), AgentId(2)] },
  );

  let mut new_agent = agents[0].clone();
  alignment.update(&query, &agents[0], &mut new_agent);
  assert_eq!(new_agent.desired_velocity, Vec3::new(1.0, 0.0, 1.0));
}

#[test]
fn cohesion_steers_to_the_center_of_gravity() {
  let mesh = flat_mesh();
  let agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(2.0, 0.0, 0.0)),
    Agent::new(AgentId(2), Vec3::new(4.0, 0.0, 0.0)),
  ];
  let query = query(&mesh, &agents);

  let mut cohesion = Cohesion::new(3);
  cohesion.set_params(
    AgentId(0),
    CohesionParams { targets: vec![AgentId(1), AgentId(2)] },
  );

  let mut new_agent = agents[0].clone();
  cohesion.update(&query, &agents[0], &mut new_agent);
  assert_eq!(new_agent.desired_velocity, Vec3::new(2.0, 0.0, 0.0));
}

#[test]
fn missing_targets_are_skipped_silently() {
  let mesh = flat_mesh();
  let agents = vec![Agent::new(AgentId(0), Vec3::ZERO)];
  let query = query(&mesh, &agents);

  let mut cohesion = Cohesion::new(1);
  cohesion.set_params(
    AgentId(0),
    CohesionParams { targets: vec![AgentId(7), AgentId(9)] },
  );

  let mut new_agent = agents[0].clone();
  cohesion.update(&query, &agents[0], &mut new_agent);
  assert_eq!(new_agent.desired_velocity, Vec3::ZERO);
}

#[test]
fn flocking_combines_the_three_forces_under_max_speed() {
  let mesh = flat_mesh();
  let mut agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(0.5, 0.0, 0.0)),
    Agent::new(AgentId(2), Vec3::new(3.0, 0.0, 3.0)),
  ];
  agents[1].velocity = Vec3::new(0.0, 0.0, 1.0);
  agents[2].velocity = Vec3::new(0.0, 0.0, 1.0);
  let query = query(&mesh, &agents);

  let mut flocking = Flocking::new(3);
  flocking.set_params(
    AgentId(0),
    FlockingParams {
      targets: vec![AgentId(1), AgentId(2)],
      separation_distance: 1.0,
      separation_weight: 1.0,
      cohesion_weight: 1.0,
      alignment_weight: 1.0,
    },
  );

  let mut new_agent = agents[0].clone();
  flocking.update(&query, &agents[0], &mut new_agent, 0.1);
  let combined = new_agent.desired_velocity;
  assert!(combined.length() > 0.0);
  assert!(combined.length() <= agents[0].max_speed + 1.0e-4);
  // Cohesion and alignment both pull towards +X / +Z.
  assert!(combined.x > 0.0);
  assert!(combined.z > 0.0);
}

#[test]
fn zero_weights_leave_the_agent_alone() {
  let mesh = flat_mesh();
  let agents = vec![
    Agent::new(AgentId(0), Vec3::ZERO),
    Agent::new(AgentId(1), Vec3::new(1.0, 0.0, 0.0)),
  ];
  let query = query(&mesh, &agents);

  let mut flocking = Flocking::new(2);
  flocking.set_params(
    AgentId(0),
    FlockingParams {
      targets: vec![AgentId(1)],
      separation_distance: 1.0,
      separation_weight: 0.0,
      cohesion_weight: 0.0,
      alignment_weight: 0.0,
    },
  );

  let mut new_agent = agents[0].clone();
  new_agent.desired_velocity = Vec3::new(0.25, 0.0, 0.0);
  flocking.update(&query, &agents[0], &mut new_agent, 0.1);
  assert_eq!(new_agent.desired_velocity, Vec3::new(0.25, 0.0, 0.0));
}
