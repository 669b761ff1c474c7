use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use ord_subset::OrdVar;

use crate::{
  agent::{Agent, AgentState},
  crowd_query::CrowdQuery,
  geometry::{
    distance_squared_to_segment_2d, from_horizontal, horizontal,
    intersect_ray_segment_2d, sweep_circle,
  },
};

/// An agent-shaped obstacle.
#[derive(Clone, Copy, Debug)]
pub struct ObstacleCircle {
  /// The position of the obstacle.
  pub position: Vec3,
  /// The current velocity of the obstacle.
  pub velocity: Vec3,
  /// The desired velocity of the obstacle.
  pub desired_velocity: Vec3,
  /// The radius of the obstacle.
  pub radius: f32,
  /// Normalized vector from the agent to the obstacle.
  pub direction: Vec2,
  /// Vector normal to [`Self::direction`].
  pub direction_normal: Vec2,
}

/// A wall-shaped obstacle.
#[derive(Clone, Copy, Debug)]
pub struct ObstacleSegment {
  /// The end points of the obstacle segment.
  pub p: Vec3,
  pub q: Vec3,
  /// Whether the agent is already touching the segment.
  pub touch: bool,
}

/// The velocity-based collision avoidance behavior. Runs after path
/// following has produced a desired velocity and replaces it with the
/// admissible velocity of lowest penalty from an adaptively refined sampling
/// pattern.
pub struct CollisionAvoidance {
  /// How many circle obstacles (nearby agents) are considered. The nearest
  /// are kept.
  pub maximum_circle_obstacles_count: usize,
  /// How many segment obstacles (walls) are considered. The nearest are
  /// kept.
  pub maximum_segment_obstacles_count: usize,
  /// The center of the first sampling level is the desired velocity scaled
  /// by this value. The larger it is, the more the agent accelerates to
  /// avoid collisions.
  pub sample_origin_scale: f32,
  /// The number of refinement levels. Each level halves the sampling radius
  /// around the previous level's best candidate.
  pub sample_levels_count: usize,
  /// The number of sampled directions per level, spread over a half-disc
  /// oriented along the desired velocity.
  pub sample_sectors_count: usize,
  /// The number of sampled speeds per direction.
  pub sample_rings_count: usize,
  /// The weight of the distance to the desired velocity.
  pub weight_desired_velocity: f32,
  /// The weight of the distance to the current velocity.
  pub weight_current_velocity: f32,
  /// The weight of keeping the currently chosen avoidance side.
  pub weight_current_avoidance_side: f32,
  /// The weight of the time to the first collision.
  pub weight_time_to_collision: f32,
  /// Collisions further than this into the future are ignored.
  pub horizon_time: f32,

  circles: Vec<ObstacleCircle>,
  segments: Vec<ObstacleSegment>,
}

impl Default for CollisionAvoidance {
  fn default() -> Self {
    Self::new()
  }
}

impl CollisionAvoidance {
  pub fn new() -> Self {
    Self {
      maximum_circle_obstacles_count: 6,
      maximum_segment_obstacles_count: 8,
      sample_origin_scale: 0.4,
      sample_levels_count: 5,
      sample_sectors_count: 7,
      sample_rings_count: 2,
      weight_desired_velocity: 2.0,
      weight_current_velocity: 0.75,
      weight_current_avoidance_side: 0.75,
      weight_time_to_collision: 2.5,
      horizon_time: 2.5,
      circles: Vec::new(),
      segments: Vec::new(),
    }
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
  ) {
    if old_agent.state != AgentState::Walking {
      return;
    }
    if old_agent.max_speed <= 0.0 {
      new_agent.desired_velocity = Vec3::ZERO;
      return;
    }

    self.add_obstacles(query, old_agent);
    self.prepare(old_agent);
    new_agent.desired_velocity = self.sample_velocity_adaptive(
      old_agent.position,
      old_agent.radius,
      old_agent.max_speed,
      old_agent.velocity,
      old_agent.desired_velocity,
    );
  }

  /// Registers the agent's neighbors and nearby walls as obstacles, keeping
  /// the nearest up to the configured caps.
  fn add_obstacles(&mut self, query: &CrowdQuery, agent: &Agent) {
    self.circles.clear();
    self.segments.clear();

    let mut neighbors = query.neighbors(agent);
    neighbors.sort_by_key(|neighbor| {
      OrdVar::new_unchecked(
        crate::geometry::distance_squared_2d(agent.position, neighbor.position),
      )
    });
    for neighbor in neighbors.iter().take(self.maximum_circle_obstacles_count)
    {
      self.circles.push(ObstacleCircle {
        position: neighbor.position,
        velocity: neighbor.velocity,
        desired_velocity: neighbor.desired_velocity,
        radius: neighbor.radius,
        direction: Vec2::ZERO,
        direction_normal: Vec2::ZERO,
      });
    }

    let mut walls = query.walls_near(agent.position, agent.perception_distance);
    walls.sort_by_key(|&(p, q)| {
      OrdVar::new_unchecked(distance_squared_to_segment_2d(agent.position, p, q))
    });
    for &(p, q) in walls.iter().take(self.maximum_segment_obstacles_count) {
      self.segments.push(ObstacleSegment {
        p,
        q,
        touch: distance_squared_to_segment_2d(agent.position, p, q)
          <= agent.radius * agent.radius,
      });
    }
  }

  /// Precomputes the direction frame of each circle obstacle.
  fn prepare(&mut self, agent: &Agent) {
    for circle in self.circles.iter_mut() {
      let direction = (horizontal(circle.position)
        - horizontal(agent.position))
      .normalize_or_zero();
      circle.direction = direction;
      circle.direction_normal = direction.perp();
    }
  }

  /// Searches the velocity space level by level, each level sampling a polar
  /// half-disc pattern around the previous level's best candidate with half
  /// the radius.
  fn sample_velocity_adaptive(
    &self,
    position: Vec3,
    radius: f32,
    max_speed: f32,
    velocity: Vec3,
    desired_velocity: Vec3,
  ) -> Vec3 {
    let mut origin = horizontal(desired_velocity) * self.sample_origin_scale;
    let mut sample_radius = max_speed;

    // The half-disc is oriented along the desired velocity; a standstill
    // agent samples around its current heading instead.
    let heading = {
      let desired = horizontal(desired_velocity);
      if desired.length_squared() > 1.0e-8 {
        desired.y.atan2(desired.x)
      } else {
        let current = horizontal(velocity);
        current.y.atan2(current.x)
      }
    };

    let mut best = (
      origin,
      self.process_sample(origin, position, radius, max_speed, velocity,
        desired_velocity),
    );

    for _ in 0..self.sample_levels_count {
      let mut level_best: Option<(Vec2, f32)> = None;
      for candidate in
        self.pattern_candidates(origin, sample_radius, heading)
      {
        if candidate.length_squared() > (max_speed + 0.001) * (max_speed + 0.001)
        {
          continue;
        }
        let penalty = self.process_sample(
          candidate,
          position,
          radius,
          max_speed,
          velocity,
          desired_velocity,
        );
        match level_best {
          Some((_, best_penalty)) if best_penalty <= penalty => {}
          _ => level_best = Some((candidate, penalty)),
        }
      }

      if let Some((level_velocity, level_penalty)) = level_best {
        if level_penalty < best.1 {
          best = (level_velocity, level_penalty);
        }
        origin = level_velocity;
      }
      sample_radius *= 0.5;
    }

    from_horizontal(best.0, 0.0)
  }

  /// The candidates of one level: the center plus `sectors * rings` polar
  /// samples inside a half-disc of radius `sample_radius` around `origin`,
  /// oriented along `heading`. The sector angles are symmetric about the
  /// heading.
  fn pattern_candidates(
    &self,
    origin: Vec2,
    sample_radius: f32,
    heading: f32,
  ) -> Vec<Vec2> {
    let mut candidates = vec![origin];
    for ring in 1..=self.sample_rings_count.max(1) {
      let ring_radius =
        sample_radius * ring as f32 / self.sample_rings_count.max(1) as f32;
      for sector in 0..self.sample_sectors_count.max(1) {
        let angle = if self.sample_sectors_count < 2 {
          heading
        } else {
          heading - PI * 0.5
            + PI * sector as f32 / (self.sample_sectors_count - 1) as f32
        };
        candidates
          .push(origin + ring_radius * Vec2::new(angle.cos(), angle.sin()));
      }
    }
    candidates
  }

  /// The penalty of one velocity candidate: its distance to the desired and
  /// current velocities, the avoidance-side consistency, and the earliest
  /// time to collision with any obstacle. Candidates leading into an obstacle
  /// already in contact are rejected outright.
  fn process_sample(
    &self,
    candidate: Vec2,
    position: Vec3,
    radius: f32,
    max_speed: f32,
    velocity: Vec3,
    desired_velocity: Vec3,
  ) -> f32 {
    let inv_max_speed = 1.0 / max_speed;
    let candidate_3d = from_horizontal(candidate, 0.0);

    let desired_velocity_penalty = self.weight_desired_velocity
      * (candidate.distance(horizontal(desired_velocity)) * inv_max_speed);
    let current_velocity_penalty = self.weight_current_velocity
      * (candidate.distance(horizontal(velocity)) * inv_max_speed);
    let side_penalty = self.weight_current_avoidance_side
      * self.side_penalty(velocity, candidate, inv_max_speed);

    let mut min_time_to_collision = self.horizon_time;
    for circle in self.circles.iter() {
      let relative_position =
        horizontal(position) - horizontal(circle.position);
      let relative_velocity = candidate - horizontal(circle.velocity);
      match sweep_circle(
        relative_position,
        relative_velocity,
        radius + circle.radius,
      ) {
        Some(t) if t <= 0.0 => return f32::INFINITY,
        Some(t) => min_time_to_collision = min_time_to_collision.min(t),
        None => {}
      }
    }
    for segment in self.segments.iter() {
      if segment.touch {
        // Reject candidates heading into a wall that is already in contact.
        let edge = horizontal(segment.q) - horizontal(segment.p);
        let outward = Vec2::new(edge.y, -edge.x);
        if outward.dot(candidate) > 0.0 {
          return f32::INFINITY;
        }
        continue;
      }
      if let Some(t) =
        intersect_ray_segment_2d(position, candidate_3d, segment.p, segment.q)
      {
        // Sweep by the agent radius: the body reaches the wall earlier than
        // the center does.
        let swept_t =
          (t - radius / candidate.length().max(1.0e-5)).max(0.0);
        min_time_to_collision = min_time_to_collision.min(swept_t);
      }
    }

    let time_penalty = self.weight_time_to_collision
      * ((self.horizon_time - min_time_to_collision) / self.horizon_time)
        .max(0.0);

    desired_velocity_penalty
      + current_velocity_penalty
      + side_penalty
      + time_penalty
  }

  /// How strongly `candidate` disagrees with the avoidance side the agent's
  /// current velocity already chose. Passing every obstacle on the side it is
  /// already being passed on costs nothing; switching sides costs
  /// proportionally to the crossing speed.
  fn side_penalty(
    &self,
    velocity: Vec3,
    candidate: Vec2,
    inv_max_speed: f32,
  ) -> f32 {
    if self.circles.is_empty() {
      return 0.0;
    }
    let velocity = horizontal(velocity);
    let mut mismatch = 0.0;
    for circle in self.circles.iter() {
      let current_side = velocity.dot(circle.direction_normal);
      let candidate_side = candidate.dot(circle.direction_normal);
      if current_side * candidate_side < 0.0 {
        mismatch += (candidate_side.abs() * inv_max_speed).min(1.0);
      }
    }
    mismatch / self.circles.len() as f32
  }
}

#[cfg(test)]
#[path = "avoidance_test.rs"]
mod test;
