use glam::Vec3;

use super::{
  add_to_priority_queue, calc_smooth_steer_direction,
  calc_straight_steer_direction, distance_to_goal, remove_trackbacks,
  PathFollowing, PathFollowingParams, PathFollowingState,
};
use crate::{
  agent::AgentId,
  behavior::{Behavior, BehaviorId},
  corridor::{Corner, CORNER_END},
  nav_mesh::{
    NavigationMesh, PolyRef, ValidNavigationMesh, DEFAULT_POLYGON_FLAGS,
  },
  Crowd, CrowdConfig,
};

/// A `width` by `height` grid of unit squares. Cell (x, z) is polygon
/// `z * width + x`.
fn grid_mesh(width: usize, height: usize) -> ValidNavigationMesh {
  let mut vertices = Vec::new();
  for z in 0..=height {
    for x in 0..=width {
      vertices.push(Vec3::new(x as f32, 0.0, z as f32));
    }
  }
  let vertex = |x: usize, z: usize| z * (width + 1) + x;
  let mut polygons = Vec::new();
  for z in 0..height {
    for x in 0..width {
      polygons.push(vec![
        vertex(x, z),
        vertex(x + 1, z),
        vertex(x + 1, z + 1),
        vertex(x, z + 1),
      ]);
    }
  }
  NavigationMesh {
    vertices,
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; polygons.len()],
    polygons,
    off_mesh_connections: vec![],
  }
  .validate()
  .expect("the mesh is valid")
}

fn crowd_on(mesh: ValidNavigationMesh, nb_max_agents: usize) -> Crowd {
  Crowd::new(
    mesh,
    CrowdConfig {
      nb_max_agents,
      max_path_results: 64,
      ..CrowdConfig::default()
    },
  )
  .expect("the config is valid")
}

/// Wires one shared path following behavior steering `agents` to `targets`.
fn attach_path_following(
  crowd: &mut Crowd,
  agents: &[AgentId],
  targets: &[Vec3],
  initial_pathfind_iter_count: usize,
) -> BehaviorId {
  let mut path_following =
    PathFollowing::new(32, crowd.max_path_results());
  path_following.initial_pathfind_iter_count = initial_pathfind_iter_count;
  for (&agent, &target) in agents.iter().zip(targets) {
    let (target_ref, target_pos) = crowd
      .nav_mesh()
      .find_nearest_polygon(target, crowd.query_extents(), crowd.filter())
      .expect("the target is on the mesh");
    path_following.set_target(agent, target_pos, target_ref);
  }
  let behavior_id =
    crowd.add_behavior(Behavior::PathFollowing(path_following));
  for &agent in agents {
    let mut fetched = crowd.fetch_agent(agent).expect("the agent exists");
    fetched.behavior = Some(behavior_id);
    crowd.push_agent(fetched);
  }
  behavior_id
}

fn state_of(
  crowd: &Crowd,
  behavior_id: BehaviorId,
  agent: AgentId,
) -> PathFollowingState {
  match crowd.behavior(behavior_id) {
    Some(Behavior::PathFollowing(path_following)) => path_following
      .params(agent)
      .map(|params| params.state())
      .unwrap_or(PathFollowingState::NoTarget),
    _ => panic!("the behavior is path following"),
  }
}

#[test]
fn submit_and_clear_round_trip() {
  let mut params = PathFollowingParams::new(8);
  assert_eq!(params.state(), PathFollowingState::NoTarget);

  let target = Vec3::new(1.0, 0.0, 2.0);
  params.submit_target(target, PolyRef(5));
  assert_eq!(params.state(), PathFollowingState::TargetSubmitted);
  assert_eq!(params.target_pos(), target);
  assert_eq!(params.target_ref(), Some(PolyRef(5)));

  params.clear_target();
  assert_eq!(params.state(), PathFollowingState::NoTarget);
  assert_eq!(params.target_ref(), None);

  params.submit_target(target, PolyRef(5));
  assert_eq!(params.state(), PathFollowingState::TargetSubmitted);
  assert_eq!(params.target_pos(), target);
  assert_eq!(params.target_ref(), Some(PolyRef(5)));
  assert!(!params.target_replan);
}

#[test]
fn walks_a_straight_corridor() {
  let mesh = grid_mesh(10, 1);
  let mut crowd = crowd_on(mesh, 1);
  let agent =
    crowd.add_agent(Vec3::new(0.5, 0.0, 0.5)).expect("room left");
  let target = Vec3::new(9.5, 0.0, 0.5);
  let behavior_id = attach_path_following(&mut crowd, &[agent], &[target], 20);

  for _ in 0..60 {
    crowd.update(0.1);
  }

  let walker = crowd.agent(agent).expect("the agent exists");
  assert!(
    walker.position.distance(target) < 0.5,
    "agent at {:?} should be near {target:?}",
    walker.position
  );
  assert_eq!(
    state_of(&crowd, behavior_id, agent),
    PathFollowingState::FollowingPath
  );
}

#[test]
fn replans_when_its_polygon_is_invalidated() {
  let mesh = grid_mesh(10, 2);
  let mut crowd = crowd_on(mesh, 1);
  let agent =
    crowd.add_agent(Vec3::new(0.5, 0.0, 0.5)).expect("room left");
  let target = Vec3::new(9.5, 0.0, 0.5);
  let behavior_id = attach_path_following(&mut crowd, &[agent], &[target], 20);

  for _ in 0..20 {
    crowd.update(0.1);
  }

  let before = crowd.agent(agent).unwrap().position;
  let (current_poly, _) = crowd
    .nav_mesh()
    .find_nearest_polygon(before, crowd.query_extents(), crowd.filter())
    .expect("the agent is on the mesh");
  crowd.nav_mesh_mut().set_polygon_flags(current_poly, 0);

  for _ in 0..3 {
    crowd.update(0.1);
  }
  assert_eq!(
    state_of(&crowd, behavior_id, agent),
    PathFollowingState::FollowingPath
  );

  for _ in 0..100 {
    crowd.update(0.1);
  }
  let walker = crowd.agent(agent).unwrap();
  assert!(walker.position.x > before.x);
  assert!(
    walker.position.distance(target) < 0.5,
    "agent at {:?} should detour around the hole",
    walker.position
  );
}

#[test]
fn many_agents_share_the_path_queue() {
  let mesh = grid_mesh(10, 2);
  let mut crowd = crowd_on(mesh, 16);
  let mut agents = Vec::new();
  let mut targets = Vec::new();
  for index in 0..16 {
    let x = 0.3 + index as f32 * 0.6;
    agents.push(
      crowd.add_agent(Vec3::new(x, 0.0, 0.5)).expect("room left"),
    );
    targets.push(Vec3::new(9.5 - index as f32 * 0.5, 0.0, 1.5));
  }
  // A zero-iteration quick search forces every agent through the queue.
  let behavior_id = attach_path_following(&mut crowd, &agents, &targets, 0);

  crowd.update(0.1);
  for &agent in agents.iter() {
    let state = state_of(&crowd, behavior_id, agent);
    assert!(
      matches!(
        state,
        PathFollowingState::WaitingForQueue
          | PathFollowingState::WaitingForPath
          | PathFollowingState::FollowingPath
      ),
      "agent {agent:?} is {state:?}"
    );
  }

  for _ in 0..20 {
    crowd.update(0.1);
  }
  for &agent in agents.iter() {
    assert_eq!(
      state_of(&crowd, behavior_id, agent),
      PathFollowingState::FollowingPath,
      "agent {agent:?} should have a full path by now"
    );
  }

  for _ in 0..250 {
    crowd.update(0.1);
  }
  for (&agent, &target) in agents.iter().zip(&targets) {
    let walker = crowd.agent(agent).unwrap();
    assert!(
      walker.position.distance(target) < 0.7,
      "agent {agent:?} at {:?} should be near {target:?}",
      walker.position
    );
  }
}

#[test]
fn removes_trackbacks_from_merged_paths() {
  let (a, b, c) = (PolyRef(1), PolyRef(2), PolyRef(3));

  let mut path = vec![a, b, a, c];
  remove_trackbacks(&mut path);
  assert_eq!(path, vec![a, c]);

  let mut path = vec![a, b, c];
  remove_trackbacks(&mut path);
  assert_eq!(path, vec![a, b, c]);

  let mut path = vec![a, b, a, b, c];
  remove_trackbacks(&mut path);
  assert_eq!(path, vec![a, b, c]);
}

#[test]
fn priority_queue_orders_by_greatest_key() {
  let keys = [1.0f32, 3.0, 2.0, 3.0];
  let key_of = |id: AgentId| keys[id.index()];

  let mut queue = Vec::new();
  add_to_priority_queue(&mut queue, AgentId(0), keys[0], key_of, 8);
  add_to_priority_queue(&mut queue, AgentId(1), keys[1], key_of, 8);
  add_to_priority_queue(&mut queue, AgentId(2), keys[2], key_of, 8);
  assert_eq!(queue, vec![AgentId(1), AgentId(2), AgentId(0)]);

  // Equal keys keep insertion order.
  add_to_priority_queue(&mut queue, AgentId(3), keys[3], key_of, 8);
  assert_eq!(
    queue,
    vec![AgentId(1), AgentId(3), AgentId(2), AgentId(0)]
  );

  // Re-inserting is a no-op.
  add_to_priority_queue(&mut queue, AgentId(2), keys[2], key_of, 8);
  assert_eq!(queue.len(), 4);
}

#[test]
fn priority_queue_drops_the_smallest_when_full() {
  let keys = [1.0f32, 2.0, 3.0];
  let key_of = |id: AgentId| keys[id.index()];

  let mut queue = Vec::new();
  add_to_priority_queue(&mut queue, AgentId(0), keys[0], key_of, 2);
  add_to_priority_queue(&mut queue, AgentId(1), keys[1], key_of, 2);
  add_to_priority_queue(&mut queue, AgentId(2), keys[2], key_of, 2);
  assert_eq!(queue, vec![AgentId(2), AgentId(1)]);

  // A key smaller than everything queued is dropped outright.
  add_to_priority_queue(&mut queue, AgentId(0), keys[0], key_of, 2);
  assert_eq!(queue, vec![AgentId(2), AgentId(1)]);
}

#[test]
fn straight_steering_aims_at_the_first_corner() {
  let corners = vec![
    Corner { point: Vec3::new(2.0, 5.0, 0.0), flags: 0, poly: PolyRef(0) },
    Corner {
      point: Vec3::new(2.0, 0.0, 2.0),
      flags: CORNER_END,
      poly: PolyRef(1),
    },
  ];

  let direction = calc_straight_steer_direction(Vec3::ZERO, &corners);
  // The steering direction is horizontal.
  assert_eq!(direction, Vec3::new(1.0, 0.0, 0.0));
}

#[test]
fn smooth_steering_blends_the_first_two_corners() {
  let corners = vec![
    Corner { point: Vec3::new(2.0, 0.0, 0.0), flags: 0, poly: PolyRef(0) },
    Corner {
      point: Vec3::new(2.0, 0.0, 2.0),
      flags: CORNER_END,
      poly: PolyRef(1),
    },
  ];

  let direction = calc_smooth_steer_direction(Vec3::ZERO, &corners);
  assert!((direction.length() - 1.0).abs() < 1.0e-5);
  // The blended direction pulls away from the upcoming turn.
  assert!(direction.x > 0.0);
  assert!(direction.z < 0.0);
}

#[test]
fn slows_down_only_near_the_end_of_the_path() {
  let end = vec![Corner {
    point: Vec3::new(0.3, 0.0, 0.0),
    flags: CORNER_END,
    poly: PolyRef(0),
  }];
  assert_eq!(distance_to_goal(Vec3::ZERO, &end, 1.0), 0.3);

  let mid = vec![Corner {
    point: Vec3::new(0.3, 0.0, 0.0),
    flags: 0,
    poly: PolyRef(0),
  }];
  assert_eq!(distance_to_goal(Vec3::ZERO, &mid, 1.0), 1.0);
  assert_eq!(distance_to_goal(Vec3::ZERO, &[], 1.0), 1.0);
}
