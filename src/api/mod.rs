pub mod job_graph_dto;
pub mod restart_strategy_dto;
pub mod settings_dto;
