pub mod archived_execution_graph;
pub mod execution_graph;
pub mod execution_graph_factory;
pub mod execution_state;
pub mod operator_coordinator;
pub mod vertex_attempt_number_store;
