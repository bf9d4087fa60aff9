use std::collections::HashMap;

use crate::domain::utils::id::ExecutionVertexId;

/// Attempt number the next execution of every subtask gets. Survives execution graphs.
#[derive(Debug, Clone, Default)]
pub struct VertexAttemptNumberStore {
    attempt_counts: HashMap<ExecutionVertexId, u32>,
}

impl VertexAttemptNumberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_attempt_count(&self, execution_vertex: &ExecutionVertexId) -> u32 {
        self.attempt_counts.get(execution_vertex).copied().unwrap_or(0)
    }

    pub fn set_attempt_count(&mut self, execution_vertex: ExecutionVertexId, attempt_count: u32) {
        self.attempt_counts.insert(execution_vertex, attempt_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::utils::id::JobVertexId;

    #[test]
    fn test_unknown_vertices_start_at_zero() {
        let mut store = VertexAttemptNumberStore::new();
        let vertex = ExecutionVertexId::new(JobVertexId::new("v"), 0);
        assert_eq!(store.get_attempt_count(&vertex), 0);

        store.set_attempt_count(vertex.clone(), 3);
        assert_eq!(store.get_attempt_count(&vertex), 3);
    }
}
