use glam::Vec3;

use super::{PathQueue, PathRequestStatus};
use crate::{
  nav_mesh::{NavigationMesh, ValidNavigationMesh, DEFAULT_POLYGON_FLAGS},
  nav_query::QueryFilter,
};

/// A `width` by 1 strip of unit squares along the X axis, with a detached
/// square far away as the last polygon.
fn strip_mesh_with_island(width: usize) -> ValidNavigationMesh {
  let mut vertices = Vec::new();
  for z in 0..=1 {
    for x in 0..=width {
      vertices.push(Vec3::new(x as f32, 0.0, z as f32));
    }
  }
  let mut polygons = (0..width)
    .map(|x| vec![x, x + 1, width + 2 + x, width + 1 + x])
    .collect::<Vec<_>>();

  let base = vertices.len();
  vertices.extend([
    Vec3::new(100.0, 0.0, 0.0),
    Vec3::new(101.0, 0.0, 0.0),
    Vec3::new(101.0, 0.0, 1.0),
    Vec3::new(100.0, 0.0, 1.0),
  ]);
  polygons.push(vec![base, base + 1, base + 2, base + 3]);

  NavigationMesh {
    vertices,
    polygon_flags: vec![DEFAULT_POLYGON_FLAGS; polygons.len()],
    polygons,
    off_mesh_connections: vec![],
  }
  .validate()
  .expect("the mesh is valid")
}

fn cell_center(x: usize) -> Vec3 {
  Vec3::new(x as f32 + 0.5, 0.0, 0.5)
}

#[test]
fn request_completes_and_is_consumed() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);

  let ticket = queue
    .request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    )
    .expect("the queue has room");
  assert_eq!(queue.status(ticket), PathRequestStatus::InProgress);

  queue.update(&mesh, 100);
  assert_eq!(queue.status(ticket), PathRequestStatus::Success);

  let path = queue.result(ticket, 32).expect("the request succeeded");
  assert_eq!(path, (0..4).map(|x| mesh.poly_ref(x)).collect::<Vec<_>>());
  // The ticket was consumed.
  assert_eq!(queue.status(ticket), PathRequestStatus::Expired);
}

#[test]
fn queue_capacity_is_bounded() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);

  let tickets = (0..super::PATH_QUEUE_CAPACITY)
    .map(|_| {
      queue
        .request(
          mesh.poly_ref(0),
          mesh.poly_ref(3),
          cell_center(0),
          cell_center(3),
          &filter,
        )
        .expect("the queue has room")
    })
    .collect::<Vec<_>>();
  // The queue is full now.
  assert_eq!(
    queue.request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    ),
    None
  );

  for ticket in tickets {
    assert_eq!(queue.status(ticket), PathRequestStatus::InProgress);
  }
}

#[test]
fn requests_are_served_in_ticket_order() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);

  let first = queue
    .request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    )
    .unwrap();
  let second = queue
    .request(
      mesh.poly_ref(3),
      mesh.poly_ref(0),
      cell_center(3),
      cell_center(0),
      &filter,
    )
    .unwrap();

  // One update advances only the oldest request.
  queue.update(&mesh, 100);
  assert_eq!(queue.status(first), PathRequestStatus::Success);
  assert_eq!(queue.status(second), PathRequestStatus::InProgress);

  queue.update(&mesh, 100);
  assert_eq!(queue.status(second), PathRequestStatus::Success);
}

#[test]
fn unreachable_target_fails() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);
  let island = mesh.poly_ref(4);

  let ticket = queue
    .request(
      mesh.poly_ref(0),
      island,
      cell_center(0),
      Vec3::new(100.5, 0.0, 0.5),
      &filter,
    )
    .unwrap();
  queue.update(&mesh, 100);
  assert_eq!(queue.status(ticket), PathRequestStatus::Failure);
  assert_eq!(queue.result(ticket, 32), None);
}

#[test]
fn unclaimed_results_expire() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);

  let ticket = queue
    .request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    )
    .unwrap();
  queue.update(&mesh, 100);
  assert_eq!(queue.status(ticket), PathRequestStatus::Success);

  // The owner never fetches the result; the slot is recycled.
  queue.update(&mesh, 100);
  queue.update(&mesh, 100);
  queue.update(&mesh, 100);
  assert_eq!(queue.status(ticket), PathRequestStatus::Expired);

  // The slot is usable again.
  assert!(queue
    .request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    )
    .is_some());
}

#[test]
fn invalid_tickets_answer_expired() {
  let mesh = strip_mesh_with_island(4);
  let filter = QueryFilter::default();
  let mut queue = PathQueue::new(32, 4096);
  let ticket = queue
    .request(
      mesh.poly_ref(0),
      mesh.poly_ref(3),
      cell_center(0),
      cell_center(3),
      &filter,
    )
    .unwrap();
  let _ = ticket;

  assert_eq!(
    queue.status(super::PathQueueTicket(9999)),
    PathRequestStatus::Expired
  );
}
