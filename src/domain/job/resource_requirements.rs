use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::utils::id::JobVertexId;
use crate::error::{Error, Result};

/// Parallelism range a user requested for one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelismBounds {
    pub lower_bound: u32,
    pub upper_bound: u32,
}

impl ParallelismBounds {
    pub fn new(lower_bound: u32, upper_bound: u32) -> Self {
        ParallelismBounds { lower_bound, upper_bound }
    }
}

/// Per vertex parallelism ranges of a job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobResourceRequirements {
    vertex_parallelism: BTreeMap<JobVertexId, ParallelismBounds>,
}

impl JobResourceRequirements {
    pub fn new(vertex_parallelism: BTreeMap<JobVertexId, ParallelismBounds>) -> Self {
        JobResourceRequirements { vertex_parallelism }
    }

    pub fn empty() -> Self {
        JobResourceRequirements::default()
    }

    pub fn with_vertex(mut self, vertex: JobVertexId, lower_bound: u32, upper_bound: u32) -> Self {
        self.vertex_parallelism.insert(vertex, ParallelismBounds::new(lower_bound, upper_bound));
        self
    }

    pub fn get_parallelism(&self, vertex: &JobVertexId) -> Option<ParallelismBounds> {
        self.vertex_parallelism.get(vertex).copied()
    }

    pub fn job_vertices(&self) -> impl Iterator<Item = &JobVertexId> {
        self.vertex_parallelism.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JobVertexId, &ParallelismBounds)> {
        self.vertex_parallelism.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_parallelism.is_empty()
    }

    /// Checks the requirements against the known vertices and their max parallelism.
    pub fn validate(&self, store: &VertexParallelismStore) -> Result<()> {
        for (vertex, bounds) in &self.vertex_parallelism {
            let info = store
                .get_parallelism_info(vertex)
                .ok_or_else(|| Error::InvalidResourceRequirements(format!("Job vertex {} does not exist.", vertex)))?;

            if bounds.lower_bound < 1 {
                return Err(Error::InvalidResourceRequirements(format!(
                    "The lower bound of vertex {} must be at least 1, was {}.",
                    vertex, bounds.lower_bound
                )));
            }
            if bounds.lower_bound > bounds.upper_bound {
                return Err(Error::InvalidResourceRequirements(format!(
                    "The lower bound ({}) of vertex {} must not exceed the upper bound ({}).",
                    bounds.lower_bound, vertex, bounds.upper_bound
                )));
            }
            if bounds.upper_bound > info.max_parallelism() {
                return Err(Error::InvalidResourceRequirements(format!(
                    "The upper bound ({}) of vertex {} exceeds its max parallelism ({}).",
                    bounds.upper_bound,
                    vertex,
                    info.max_parallelism()
                )));
            }
        }
        Ok(())
    }
}
