use glam::Vec3;

use super::{Agent, AgentId, AgentState};

#[test]
fn new_agents_walk_with_default_parameters() {
  let agent = Agent::new(AgentId(3), Vec3::new(1.0, 0.0, 2.0));

  assert_eq!(agent.id(), AgentId(3));
  assert_eq!(agent.id().index(), 3);
  assert!(agent.active);
  assert_eq!(agent.state, AgentState::Walking);
  assert_eq!(agent.position, Vec3::new(1.0, 0.0, 2.0));
  assert_eq!(agent.velocity, Vec3::ZERO);
  assert_eq!(agent.desired_velocity, Vec3::ZERO);
  assert!(agent.radius > 0.0);
  assert!(agent.max_speed > 0.0);
  assert!(agent.max_acceleration > 0.0);
  assert!(agent.perception_distance > 0.0);
  assert!(agent.behavior.is_none());
}
