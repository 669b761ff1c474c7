use crate::{agent::Agent, behavior::Behavior, crowd_query::CrowdQuery};

/// An ordered chain of behaviors. Each child reads the previous child's
/// output agent and refines it; the last child's output is the pipeline's.
/// The canonical arrangement runs path following first to produce a
/// goal-directed velocity, then collision avoidance to make it admissible,
/// then optional group behaviors.
pub struct Pipeline {
  children: Vec<Behavior>,
}

impl Pipeline {
  pub fn new(children: Vec<Behavior>) -> Self {
    Self { children }
  }

  pub(crate) fn update(
    &mut self,
    query: &CrowdQuery,
    old_agent: &Agent,
    new_agent: &mut Agent,
    dt: f32,
  ) {
    let mut stage_input = old_agent.clone();
    for child in self.children.iter_mut() {
      let mut stage_output = stage_input.clone();
      child.update(query, &stage_input, &mut stage_output, dt);
      stage_input = stage_output;
    }
    *new_agent = stage_input;
  }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod test;
