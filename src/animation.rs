use glam::Vec3;

use crate::{corridor::OffMeshCrossing, geometry::distance_2d};

/// A discrete traversal of an off-mesh connection. The first part of the
/// animation moves the agent from where it triggered the connection to the
/// connection's start point, the rest moves it to the end point.
#[derive(Clone, PartialEq, Debug)]
pub struct OffMeshAnimation {
  /// The position the agent triggered the connection from.
  init_pos: Vec3,
  /// The entry point of the connection.
  start_pos: Vec3,
  /// The exit point of the connection.
  end_pos: Vec3,
  /// Time spent in the animation so far.
  t: f32,
  /// The duration of the animation.
  t_max: f32,
}

impl OffMeshAnimation {
  /// Starts a traversal from `init_pos` over `crossing`, scaled so faster
  /// agents cross faster.
  pub(crate) fn new(
    init_pos: Vec3,
    crossing: &OffMeshCrossing,
    max_speed: f32,
  ) -> Self {
    let t_max = distance_2d(crossing.start_pos, crossing.end_pos)
      / max_speed.max(0.01)
      * 0.5;
    Self {
      init_pos,
      start_pos: crossing.start_pos,
      end_pos: crossing.end_pos,
      t: 0.0,
      t_max,
    }
  }

  /// Advances the animation by `dt` and returns the agent's new position.
  pub(crate) fn advance(&mut self, dt: f32) -> Vec3 {
    self.t += dt;
    let approach_end = self.t_max * 0.15;
    if self.t < approach_end {
      let u = tween(self.t, 0.0, approach_end);
      self.init_pos.lerp(self.start_pos, u)
    } else {
      let u = tween(self.t, approach_end, self.t_max);
      self.start_pos.lerp(self.end_pos, u)
    }
  }

  /// Whether the traversal has reached the connection's end point.
  pub(crate) fn finished(&self) -> bool {
    self.t >= self.t_max
  }

  /// The exit point of the connection.
  pub(crate) fn end_pos(&self) -> Vec3 {
    self.end_pos
  }
}

fn tween(t: f32, t0: f32, t1: f32) -> f32 {
  if t1 <= t0 {
    return 1.0;
  }
  ((t - t0) / (t1 - t0)).clamp(0.0, 1.0)
}
