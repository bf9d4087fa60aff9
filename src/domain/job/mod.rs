pub mod job_graph;
pub mod job_information;
pub mod job_status;
pub mod resource_requirements;
pub mod vertex_parallelism;
