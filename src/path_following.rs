use glam::Vec3;
use log::debug;

use crate::{
  agent::{Agent, AgentId, AgentState},
  animation::OffMeshAnimation,
  astar::SlicedFindPath,
  behavior::ParameterTable,
  corridor::{Corner, PathCorridor, CORNER_END, CORNER_OFFMESH_CONNECTION},
  crowd_query::CrowdQuery,
  geometry::{distance_2d, distance_squared_2d},
  nav_mesh::PolyRef,
  path_queue::{PathQueue, PathQueueTicket, PathRequestStatus},
};

/// How many polygons ahead of the agent are checked for validity each tick.
const CHECK_LOOKAHEAD: usize = 10;
/// How long an agent keeps an unreachable path before replanning.
const TARGET_REPLAN_DELAY: f32 = 1.0;
/// The number of steering corners kept per agent.
const MAX_NCORNERS: usize = 4;
/// How many agents may submit full path requests per tick.
const PATH_MAX_AGENTS: usize = 8;
/// The node budget of the synchronous quick search.
const QUICK_SEARCH_NODE_BUDGET: usize = 512;
/// The result cap of the synchronous quick search.
const QUICK_SEARCH_MAX_RESULTS: usize = 32;

/// The progress of an agent's move request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PathFollowingState {
  /// The agent has no target.
  NoTarget,
  /// A target was set; the quick search has not run yet.
  TargetSubmitted,
  /// The quick path is partial; the agent wants a slot in the path queue.
  WaitingForQueue,
  /// A full path request is in flight.
  WaitingForPath,
  /// The agent has a path towards its target.
  FollowingPath,
  /// The target cannot be reached or repositioned. The agent stays in place.
  InvalidTarget,
}

/// Per-agent path following state.
pub struct PathFollowingParams {
  pub(crate) state: PathFollowingState,
  pub(crate) target_pos: Vec3,
  pub(crate) target_ref: Option<PolyRef>,
  pub(crate) target_replan_time: f32,
  pub(crate) target_replan: bool,
  pub(crate) target_pathq_ticket: Option<PathQueueTicket>,
  pub(crate) corridor: PathCorridor,
  pub(crate) corners: Vec<Corner>,
  pub(crate) topology_opt_time: f32,
}

impl PathFollowingParams {
  fn new(max_path_results: usize) -> Self {
    Self {
      state: PathFollowingState::NoTarget,
      target_pos: Vec3::ZERO,
      target_ref: None,
      target_replan_time: 0.0,
      target_replan: false,
      target_pathq_ticket: None,
      corridor: PathCorridor::new(max_path_results),
      corners: Vec::new(),
      topology_opt_time: 0.0,
    }
  }

  /// Requests a move to `pos` on `poly_ref`. Any outstanding path request is
  /// orphaned and ages out of the queue.
  pub fn submit_target(&mut self, pos: Vec3, poly_ref: PolyRef) {
    self.target_ref = Some(poly_ref);
    self.target_pos = pos;
    self.target_pathq_ticket = None;
    self.target_replan = false;
    self.state = PathFollowingState::TargetSubmitted;
  }

  /// Drops the agent's target.
  pub fn clear_target(&mut self) {
    self.target_ref = None;
    self.target_pos = Vec3::ZERO;
    self.target_pathq_ticket = None;
    self.target_replan = false;
    self.state = PathFollowingState::NoTarget;
  }

  pub fn state(&self) -> PathFollowingState {
    self.state
  }

  pub fn corridor(&self) -> &PathCorridor {
    &self.corridor
  }

  pub fn target_pos(&self) -> Vec3 {
    self.target_pos
  }

  pub fn target_ref(&self) -> Option<PolyRef> {
    self.target_ref
  }

  pub fn corners(&self) -> &[Corner] {
    &self.corners
  }
}

/// The path following behavior: maintains each agent's corridor over the
/// navigation mesh, orchestrates replans through the asynchronous
/// [`PathQueue`], extracts steering corners and produces the goal-directed
/// desired velocity.
pub struct PathFollowing {
  /// How many search iterations the synchronous quick search runs when a
  /// target is submitted.
  pub initial_pathfind_iter_count: usize,
  /// When positive, the corridor is shortcut towards the second corner if it
  /// is visible within this range.
  pub visibility_path_optimization_range: f32,
  /// The interval, in seconds, between local corridor topology
  /// optimizations. Negative disables them.
  pub local_path_replanning_interval: f32,
  /// Steer towards a point between the first two corners instead of straight
  /// at the first corner.
  pub anticipate_turns: bool,
  /// How many search iterations the path queue runs per tick.
  pub max_iter_per_update: usize,

  params: ParameterTable<PathFollowingParams>,
  path_queue: PathQueue,
  max_path_results: usize,
  /// Agents that asked for a path queue slot this tick, hungriest first.
  replan_queue: Vec<AgentId>,
  /// Agents due for topology optimization this tick, hungriest first.
  opt_queue: Vec<AgentId>,
  /// The path queue advances one search per tick, not per agent.
  queue_updated_this_tick: bool,
  last_tick: u64,
}

impl PathFollowing {
  /// Creates the behavior for at most `nb_max_agents` agents with corridors
  /// holding at most `max_path_results` polygons.
  pub fn new(nb_max_agents: usize, max_path_results: usize) -> Self {
    Self {
      initial_pathfind_iter_count: 20,
      visibility_path_optimization_range: -1.0,
      local_path_replanning_interval: -1.0,
      anticipate_turns: false,
      max_iter_per_update: 100,
      params: ParameterTable::new(nb_max_agents),
      path_queue: PathQueue::new(
        max_path_results,
        crate::astar::DEFAULT_SEARCH_NODE_BUDGET,
      ),
      max_path_results,
      replan_queue: Vec::new(),
      opt_queue: Vec::new(),
      queue_updated_this_tick: false,
      last_tick: u64::MAX,
    }
  }

  /// The path following state of `agent_id`, if the agent ever had a target.
  pub fn params(&self, agent_id: AgentId) -> Option<&PathFollowingParams> {
    self.params.get(agent_id)
  }

  /// Submits a move request for `agent_id` towards `pos` on `poly_ref`.
  pub fn set_target(&mut self, agent_id: AgentId, pos: Vec3, poly_ref: PolyRef) {
    self.ensure_params(agent_id);
    self
      .params
      .get_mut(agent_id)
      .expect("params were just ensured")
      .submit_target(pos, poly_ref);
  }

  /// Clears the move request of `agent_id`.
  pub fn clear_target(&mut self, agent_id: AgentId) {
    if let Some(params) = self.params.get_mut(agent_id) {
      params.clear_target();
    }
  }

  fn ensure_params(&mut self, agent_id: AgentId) {
    if self.params.get(agent_id).is_none() {
      self
        .params
        .insert(agent_id, PathFollowingParams::new(self.max_path_results));
    }
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    if query.tick() != self.last_tick {
      self.last_tick = query.tick();
      self.replan_queue.clear();
      self.opt_queue.clear();
      self.queue_updated_this_tick = false;
    }

    let id = old_agent.id();
    self.ensure_params(id);

    // Initialize the corridor the first time the agent is seen.
    let params = self.params.get_mut(id).expect("params were just ensured");
    if !params.corridor.is_set() {
      match query.mesh().find_nearest_polygon(
        old_agent.position,
        query.extents(),
        query.filter(),
      ) {
        Some((poly_ref, nearest)) => {
          params.corridor.reset(poly_ref, nearest);
        }
        None => {
          debug!("agent {id:?}: no polygon under agent, going invalid");
          new_agent.state = AgentState::Invalid;
          return;
        }
      }
    }
    params.corridor.move_position(old_agent.position, query.mesh());

    self.check_path_validity(query, old_agent, new_agent, dt);
    self.update_move_request(query, old_agent);
    self.update_topology_optimization(query, old_agent, dt);
    self.get_next_corner(query, old_agent);
    self.trigger_off_mesh_connections(query, old_agent, new_agent);
    self.get_velocity(old_agent, new_agent);
  }

  /// Validates the agent's polygon, its target and the near corridor,
  /// scheduling a replan when any of them went stale.
  fn check_path_validity(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    let id = old_agent.id();
    let params = self.params.get_mut(id).expect("params exist during update");
    if old_agent.state != AgentState::Walking
      || params.state == PathFollowingState::NoTarget
    {
      return;
    }

    params.target_replan_time += dt;
    let mut replan = false;

    // First check that the current location is valid.
    let agent_ref = params.corridor.first_poly().expect("corridor is set");
    if !query.mesh().is_valid_poly_ref(agent_ref, query.filter()) {
      match query.mesh().find_nearest_polygon(
        old_agent.position,
        query.extents(),
        query.filter(),
      ) {
        None => {
          // Could not find a location on the navmesh.
          debug!("agent {id:?}: lost its polygon, going invalid");
          params.corridor.clear();
          params.corners.clear();
          new_agent.state = AgentState::Invalid;
          return;
        }
        Some((nearest_ref, nearest_pos)) => {
          // Fix the first polygon, but leave the rest of the path so the
          // replanner can reuse it.
          params.corridor.fix_path_start(nearest_ref, nearest_pos);
          new_agent.position = nearest_pos;
          replan = true;
        }
      }
    }

    // Try to recover the move request target.
    if params.state != PathFollowingState::InvalidTarget {
      let target_valid = params.target_ref.is_some_and(|target_ref| {
        query.mesh().is_valid_poly_ref(target_ref, query.filter())
      });
      if !target_valid {
        match query.mesh().find_nearest_polygon(
          params.target_pos,
          query.extents(),
          query.filter(),
        ) {
          Some((nearest_ref, nearest_pos)) => {
            params.target_ref = Some(nearest_ref);
            params.target_pos = nearest_pos;
            replan = true;
          }
          None => params.target_ref = None,
        }
      }
      if params.target_ref.is_none() {
        // Failed to reposition the target.
        debug!("agent {id:?}: target lost, move request failed");
        let pos = params.corridor.pos();
        params.corridor.reset(agent_ref, pos);
        params.state = PathFollowingState::InvalidTarget;
        return;
      }
    }

    // If the nearby corridor is not valid, replan.
    if !params.corridor.is_valid(CHECK_LOOKAHEAD, query.mesh(), query.filter())
    {
      replan = true;
    }

    // If the end of the path is near and it is not the requested location,
    // replan.
    if params.state == PathFollowingState::FollowingPath
      && params.target_replan_time > TARGET_REPLAN_DELAY
      && params.corridor.path_count() < CHECK_LOOKAHEAD
      && params.corridor.last_poly() != params.target_ref
    {
      replan = true;
    }

    if replan && params.state != PathFollowingState::NoTarget {
      debug!("agent {id:?}: replanning");
      let (target_pos, target_ref) =
        (params.target_pos, params.target_ref.expect("target was recovered"));
      params.submit_target(target_pos, target_ref);
      params.target_replan = true;
    }
  }

  /// Runs the quick search for newly submitted targets, feeds the path queue
  /// and applies finished queue results.
  fn update_move_request(&mut self, query: &CrowdQuery, old_agent: &Agent) {
    let id = old_agent.id();
    let params = self.params.get_mut(id).expect("params exist during update");

    let request_allowed = old_agent.state != AgentState::Invalid
      && params.state != PathFollowingState::NoTarget;

    if request_allowed && params.state == PathFollowingState::TargetSubmitted {
      let target_ref = params.target_ref.expect("state implies a target");
      let path = params.corridor.path().to_vec();
      debug_assert!(!path.is_empty());

      // Quick synchronous search towards the goal.
      let mut search = SlicedFindPath::new(
        query.mesh(),
        query.filter(),
        path[0],
        target_ref,
        old_agent.position,
        params.target_pos,
        QUICK_SEARCH_NODE_BUDGET,
      );
      search.update(query.mesh(), self.initial_pathfind_iter_count);
      let (mut request_path, _) = if params.target_replan {
        // Try to use the existing steady path during a replan.
        search.finalize_partial(&path, QUICK_SEARCH_MAX_RESULTS)
      } else {
        // Try to move towards the target when the goal changes.
        search.finalize(QUICK_SEARCH_MAX_RESULTS)
      };

      let mut request_pos = params.target_pos;
      if let Some(&last) = request_path.last() {
        if last != target_ref {
          // Partial path: constrain the target inside the last polygon.
          match query.mesh().closest_point_on_poly(last, params.target_pos) {
            Some(constrained) => request_pos = constrained,
            None => request_path.clear(),
          }
        }
      }
      if request_path.is_empty() {
        // Could not find a path: restart the request from the current
        // location.
        request_pos = old_agent.position;
        request_path.push(path[0]);
      }

      params.corridor.set_corridor(request_pos, &request_path);

      if request_path.last() == Some(&target_ref) {
        // The path was completely computed by the quick search.
        params.state = PathFollowingState::FollowingPath;
        params.target_replan_time = 0.0;
      } else {
        // The path is longer or potentially unreachable: queue a full plan.
        params.state = PathFollowingState::WaitingForQueue;
      }
    }

    let wants_queue_slot = request_allowed
      && params.state == PathFollowingState::WaitingForQueue;
    let replan_time = params.target_replan_time;
    if wants_queue_slot {
      let params_table = &self.params;
      add_to_priority_queue(
        &mut self.replan_queue,
        id,
        replan_time,
        |queued| {
          params_table
            .get(queued)
            .map(|params| params.target_replan_time)
            .unwrap_or(0.0)
        },
        PATH_MAX_AGENTS,
      );
    }

    // Submit one queue request per queued agent, up to queue capacity.
    for queued_id in self.replan_queue.clone() {
      let Some(queued) = self.params.get_mut(queued_id) else { continue };
      if queued.state != PathFollowingState::WaitingForQueue {
        continue;
      }
      let (Some(last_poly), Some(target_ref)) =
        (queued.corridor.last_poly(), queued.target_ref)
      else {
        continue;
      };
      queued.target_pathq_ticket = self.path_queue.request(
        last_poly,
        target_ref,
        queued.corridor.target(),
        queued.target_pos,
        query.filter(),
      );
      if queued.target_pathq_ticket.is_some() {
        queued.state = PathFollowingState::WaitingForPath;
      }
    }

    // Advance the asynchronous searches. The work happens once per tick no
    // matter how many agents run the behavior.
    if !self.queue_updated_this_tick {
      self.path_queue.update(query.mesh(), self.max_iter_per_update);
      self.queue_updated_this_tick = true;
    }

    // Poll for this agent's result.
    let params = self.params.get_mut(id).expect("params exist during update");
    if !old_agent.active || params.state != PathFollowingState::WaitingForPath
    {
      return;
    }
    let Some(ticket) = params.target_pathq_ticket else { return };
    match self.path_queue.status(ticket) {
      PathRequestStatus::InProgress => {}
      PathRequestStatus::Failure | PathRequestStatus::Expired => {
        // Retry if the target is still valid.
        debug!("agent {id:?}: path request failed, retrying");
        params.target_pathq_ticket = None;
        params.state = if params.target_ref.is_some() {
          PathFollowingState::TargetSubmitted
        } else {
          PathFollowingState::InvalidTarget
        };
        params.target_replan_time = 0.0;
      }
      PathRequestStatus::Success => {
        let result = self.path_queue.result(ticket, self.max_path_results);
        params.target_pathq_ticket = None;
        params.target_replan_time = 0.0;

        // Merge the result and the existing path. The agent may have moved
        // while the request was processed; the end of the existing path is
        // the location the request was issued from.
        let path = params.corridor.path().to_vec();
        debug_assert!(!path.is_empty());

        let mut valid = true;
        let mut merged = Vec::new();
        match result {
          Some(result)
            if !result.is_empty() && path.last() == result.first() =>
          {
            // Put the old path in front of the result.
            merged = path[..path.len() - 1].to_vec();
            merged.extend(result);
            remove_trackbacks(&mut merged);
            merged.truncate(self.max_path_results);
          }
          _ => valid = false,
        }

        let mut target_pos = params.target_pos;
        if valid && merged.last() != params.target_ref.as_ref() {
          // Partial path: constrain the target inside the last polygon.
          match query
            .mesh()
            .closest_point_on_poly(*merged.last().unwrap(), target_pos)
          {
            Some(constrained) => target_pos = constrained,
            None => valid = false,
          }
        }

        if valid {
          params.corridor.set_corridor(target_pos, &merged);
          params.state = PathFollowingState::FollowingPath;
          debug!("agent {id:?}: following path ({} polys)", merged.len());
        } else {
          debug!("agent {id:?}: path result unusable, target invalid");
          params.state = PathFollowingState::InvalidTarget;
        }
      }
    }
  }

  /// Periodically runs a bounded local search to iron out corridor detours
  /// accumulated through incremental maintenance.
  fn update_topology_optimization(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    dt: f32,
  ) {
    if self.local_path_replanning_interval < 0.0 {
      return;
    }
    let id = old_agent.id();
    let params = self.params.get_mut(id).expect("params exist during update");
    if old_agent.state != AgentState::Walking
      || params.state == PathFollowingState::NoTarget
    {
      return;
    }

    params.topology_opt_time += dt;
    let opt_time = params.topology_opt_time;
    if opt_time >= self.local_path_replanning_interval {
      let params_table = &self.params;
      add_to_priority_queue(
        &mut self.opt_queue,
        id,
        opt_time,
        |queued| {
          params_table
            .get(queued)
            .map(|params| params.topology_opt_time)
            .unwrap_or(0.0)
        },
        PATH_MAX_AGENTS,
      );
    }

    for queued_id in self.opt_queue.clone() {
      let Some(queued) = self.params.get_mut(queued_id) else { continue };
      if queued.topology_opt_time < self.local_path_replanning_interval {
        continue;
      }
      queued.corridor.optimize_path_topology(query.mesh(), query.filter());
      queued.topology_opt_time = 0.0;
    }
  }

  /// Extracts the steering corners and optionally shortcuts the corridor
  /// towards the second corner.
  fn get_next_corner(&mut self, query: &CrowdQuery, old_agent: &Agent) {
    let params = self
      .params
      .get_mut(old_agent.id())
      .expect("params exist during update");
    if old_agent.state != AgentState::Walking
      || params.state == PathFollowingState::NoTarget
    {
      params.corners.clear();
      return;
    }

    params.corners = params.corridor.find_corners(MAX_NCORNERS, query.mesh());

    // Check whether the corner after the next corner is directly visible,
    // and short cut to there.
    if self.visibility_path_optimization_range > 0.0
      && !params.corners.is_empty()
    {
      let target = params.corners[1.min(params.corners.len() - 1)].point;
      params.corridor.optimize_path_visibility(
        target,
        self.visibility_path_optimization_range,
        query.mesh(),
        query.filter(),
      );
    }
  }

  /// Hands the agent over to off-mesh animation when it has reached the
  /// entrance of an off-mesh connection.
  fn trigger_off_mesh_connections(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
  ) {
    let id = old_agent.id();
    let params = self.params.get_mut(id).expect("params exist during update");
    if old_agent.state != AgentState::Walking
      || params.state == PathFollowingState::NoTarget
    {
      return;
    }

    let trigger_radius = old_agent.radius * 2.25;
    let Some(&last_corner) = params.corners.last() else { return };
    if last_corner.flags & CORNER_OFFMESH_CONNECTION == 0
      || distance_squared_2d(old_agent.position, last_corner.point)
        >= trigger_radius * trigger_radius
    {
      return;
    }

    match params
      .corridor
      .move_over_offmesh_connection(last_corner.poly, query.mesh())
    {
      Some(crossing) => {
        debug!("agent {id:?}: entering off-mesh connection");
        new_agent.state = AgentState::OffMesh;
        new_agent.animation = Some(OffMeshAnimation::new(
          old_agent.position,
          &crossing,
          old_agent.max_speed,
        ));
        new_agent.velocity = Vec3::ZERO;
        new_agent.desired_velocity = Vec3::ZERO;
        params.corners.clear();
      }
      None => {
        // The connection went stale. The path validity check replans
        // bad or blocked connections.
      }
    }
  }

  /// Computes the goal-directed desired velocity from the cached corners.
  fn get_velocity(&mut self, old_agent: &Agent, new_agent: &mut Agent) {
    let params = self
      .params
      .get_mut(old_agent.id())
      .expect("params exist during update");
    if old_agent.state != AgentState::Walking
      || new_agent.state == AgentState::OffMesh
      || params.state == PathFollowingState::NoTarget
    {
      return;
    }
    if params.corners.is_empty() {
      new_agent.desired_velocity = Vec3::ZERO;
      return;
    }

    let direction = if self.anticipate_turns {
      calc_smooth_steer_direction(old_agent.position, &params.corners)
    } else {
      calc_straight_steer_direction(old_agent.position, &params.corners)
    };

    // Slow down towards the end of the path.
    let slow_down_radius = old_agent.radius * 2.0;
    let speed_scale = if slow_down_radius > 1.0e-5 {
      distance_to_goal(old_agent.position, &params.corners, slow_down_radius)
        / slow_down_radius
    } else {
      1.0
    };

    let mut desired_velocity =
      direction * old_agent.max_speed * speed_scale;
    desired_velocity.y = 0.0;
    new_agent.desired_velocity = desired_velocity;
  }
}

/// The distance to the end of the path, clamped to `range`, or `range` when
/// the end of the path is not in sight.
fn distance_to_goal(position: Vec3, corners: &[Corner], range: f32) -> f32 {
  let Some(last_corner) = corners.last() else { return range };
  if last_corner.flags & CORNER_END != 0 {
    distance_2d(position, last_corner.point).min(range)
  } else {
    range
  }
}

/// Steers straight at the first corner.
fn calc_straight_steer_direction(position: Vec3, corners: &[Corner]) -> Vec3 {
  let Some(first_corner) = corners.first() else { return Vec3::ZERO };
  let mut direction = first_corner.point - position;
  direction.y = 0.0;
  direction.normalize_or_zero()
}

/// Steers towards a point between the first two corners, rounding the turn.
fn calc_smooth_steer_direction(position: Vec3, corners: &[Corner]) -> Vec3 {
  if corners.is_empty() {
    return Vec3::ZERO;
  }
  let p0 = corners[0].point;
  let p1 = corners[1.min(corners.len() - 1)].point;

  let mut dir0 = p0 - position;
  let mut dir1 = p1 - position;
  dir0.y = 0.0;
  dir1.y = 0.0;

  let len0 = dir0.length();
  let len1 = dir1.length();
  if len1 > 0.001 {
    dir1 /= len1;
  }

  let direction = Vec3::new(
    dir0.x - dir1.x * len0 * 0.5,
    0.0,
    dir0.z - dir1.z * len0 * 0.5,
  );
  direction.normalize_or_zero()
}

/// Inserts `id` into `queue` ordered by greatest key first, stable for equal
/// keys. The queue holds at most `max_len` entries; entries that do not fit
/// are dropped.
fn add_to_priority_queue(
  queue: &mut Vec<AgentId>,
  id: AgentId,
  key: f32,
  key_of: impl Fn(AgentId) -> f32,
  max_len: usize,
) {
  if queue.contains(&id) {
    return;
  }
  let slot = queue
    .iter()
    .position(|&queued| key > key_of(queued))
    .unwrap_or(queue.len());
  if slot >= max_len {
    return;
  }
  queue.insert(slot, id);
  queue.truncate(max_len);
}

/// Removes A-B-A trackbacks from a polygon path by dropping the middle
/// polygon (and its duplicate) wherever `path[j-1] == path[j+1]`.
fn remove_trackbacks(path: &mut Vec<PolyRef>) {
  let mut j = 1;
  while j + 1 < path.len() {
    if path[j - 1] == path[j + 1] {
      path.drain(j - 1..=j);
      j = j.saturating_sub(1).max(1);
    } else {
      j += 1;
    }
  }
}

#[cfg(test)]
#[path = "path_following_test.rs"]
mod test;
