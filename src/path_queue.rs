use glam::Vec3;
use log::{debug, trace};

use crate::{
  astar::{SlicedFindPath, SlicedStatus},
  nav_mesh::{PolyRef, ValidNavigationMesh},
  nav_query::QueryFilter,
};

/// The number of in-flight path requests the queue can hold.
pub(crate) const PATH_QUEUE_CAPACITY: usize = 8;

/// How many updates a finished request is retained before its ticket expires.
const MAX_KEEP_ALIVE: u32 = 2;

/// An opaque handle for a request made through [`PathQueue::request`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PathQueueTicket(u32);

/// The externally visible state of a path request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PathRequestStatus {
  /// The request has not finished yet.
  InProgress,
  /// The request finished and its result can be fetched.
  Success,
  /// The request finished without producing a path.
  Failure,
  /// The ticket refers to no live request.
  Expired,
}

enum SlotState {
  /// The request is queued but its search has not started.
  Pending,
  /// The request's search is running.
  Searching(SlicedFindPath),
  /// The request finished.
  Done { success: bool, path: Vec<PolyRef>, keep_alive: u32 },
}

struct QueueSlot {
  ticket: PathQueueTicket,
  start_ref: PolyRef,
  end_ref: PolyRef,
  start_pos: Vec3,
  end_pos: Vec3,
  filter: QueryFilter,
  state: SlotState,
}

/// A bounded broker for asynchronous path requests. Work is budgeted: each
/// [`Self::update`] advances at most one request by a bounded number of
/// search iterations, so the cost per tick stays flat regardless of how many
/// agents want paths.
pub struct PathQueue {
  slots: Vec<Option<QueueSlot>>,
  next_ticket: u32,
  max_path_results: usize,
  node_budget: usize,
}

impl PathQueue {
  /// Creates a queue whose results are clamped to `max_path_results` polygons
  /// and whose searches may allocate at most `node_budget` search nodes.
  pub fn new(max_path_results: usize, node_budget: usize) -> Self {
    Self {
      slots: (0..PATH_QUEUE_CAPACITY).map(|_| None).collect(),
      next_ticket: 0,
      max_path_results,
      node_budget,
    }
  }

  /// Queues a path request. Returns [`None`] when every slot is occupied; the
  /// caller retries on a later tick.
  pub fn request(
    &mut self,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: Vec3,
    end_pos: Vec3,
    filter: &QueryFilter,
  ) -> Option<PathQueueTicket> {
    let empty = self.slots.iter().position(|slot| slot.is_none())?;

    self.next_ticket = self.next_ticket.wrapping_add(1);
    let ticket = PathQueueTicket(self.next_ticket);
    self.slots[empty] = Some(QueueSlot {
      ticket,
      start_ref,
      end_ref,
      start_pos,
      end_pos,
      filter: *filter,
      state: SlotState::Pending,
    });
    trace!("path queue: request {ticket:?} ({start_ref:?} -> {end_ref:?})");
    Some(ticket)
  }

  /// Advances the oldest unfinished request by up to `max_iter` search
  /// iterations and ages out unclaimed results.
  pub fn update(&mut self, mesh: &ValidNavigationMesh, max_iter: usize) {
    for slot_entry in self.slots.iter_mut() {
      let Some(slot) = slot_entry else { continue };
      if let SlotState::Done { keep_alive, .. } = &mut slot.state {
        *keep_alive += 1;
        if *keep_alive > MAX_KEEP_ALIVE {
          trace!("path queue: ticket {:?} expired unclaimed", slot.ticket);
          *slot_entry = None;
        }
      }
    }

    // Requests are served in ticket order.
    let Some(slot_index) = self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, slot)| {
        matches!(
          slot.as_ref().map(|slot| &slot.state),
          Some(SlotState::Pending) | Some(SlotState::Searching(_))
        )
      })
      .min_by_key(|(_, slot)| slot.as_ref().unwrap().ticket.0)
      .map(|(index, _)| index)
    else {
      return;
    };
    let slot = self.slots[slot_index].as_mut().unwrap();

    if matches!(slot.state, SlotState::Pending) {
      slot.state = SlotState::Searching(SlicedFindPath::new(
        mesh,
        &slot.filter,
        slot.start_ref,
        slot.end_ref,
        slot.start_pos,
        slot.end_pos,
        self.node_budget,
      ));
    }

    let SlotState::Searching(search) = &mut slot.state else {
      unreachable!("slot was just moved to Searching");
    };
    match search.update(mesh, max_iter) {
      SlicedStatus::InProgress => {}
      SlicedStatus::Complete => {
        let (path, _) = search.finalize(self.max_path_results);
        let success = !path.is_empty();
        debug!(
          "path queue: ticket {:?} finished (success={success}, {} polys)",
          slot.ticket,
          path.len()
        );
        slot.state = SlotState::Done { success, path, keep_alive: 0 };
      }
      SlicedStatus::Failed => {
        debug!("path queue: ticket {:?} failed", slot.ticket);
        slot.state =
          SlotState::Done { success: false, path: Vec::new(), keep_alive: 0 };
      }
    }
  }

  /// The status of the request behind `ticket`.
  pub fn status(&self, ticket: PathQueueTicket) -> PathRequestStatus {
    match self.find_slot(ticket) {
      None => PathRequestStatus::Expired,
      Some(slot) => match &slot.state {
        SlotState::Pending | SlotState::Searching(_) => {
          PathRequestStatus::InProgress
        }
        SlotState::Done { success: true, .. } => PathRequestStatus::Success,
        SlotState::Done { success: false, .. } => PathRequestStatus::Failure,
      },
    }
  }

  /// Takes the result of a successful request, consuming the ticket. Returns
  /// [`None`] unless the request's status is [`PathRequestStatus::Success`].
  pub fn result(
    &mut self,
    ticket: PathQueueTicket,
    max_results: usize,
  ) -> Option<Vec<PolyRef>> {
    let slot_index = self.slots.iter().position(|slot| {
      slot.as_ref().is_some_and(|slot| {
        slot.ticket == ticket
          && matches!(slot.state, SlotState::Done { success: true, .. })
      })
    })?;
    let slot = self.slots[slot_index].take().unwrap();
    let SlotState::Done { mut path, .. } = slot.state else {
      unreachable!("slot state was checked above");
    };
    path.truncate(max_results);
    Some(path)
  }

  fn find_slot(&self, ticket: PathQueueTicket) -> Option<&QueueSlot> {
    self
      .slots
      .iter()
      .filter_map(|slot| slot.as_ref())
      .find(|slot| slot.ticket == ticket)
  }
}

#[cfg(test)]
#[path = "path_queue_test.rs"]
mod test;
