use crate::api::job_graph_dto::JobGraphDto;
use crate::api::restart_strategy_dto::RestartStrategyDto;
use crate::api::settings_dto::SettingsDto;
use crate::domain::job::job_graph::JobGraph;
use crate::domain::restart::RestartStrategyOptions;
use crate::domain::scheduler::settings::Settings;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

pub fn load_job_graph(file_path: &str) -> Result<JobGraph> {
    let dto: JobGraphDto = parse_json_file(file_path)?;
    log::info!("Job graph file '{}' parsed successfully.", file_path);
    JobGraph::try_from(dto)
}

/// Loads scheduler settings for `job_graph`. Without a file the defaults of the default execution mode apply.
pub fn load_settings(file_path: Option<&str>, job_graph: &JobGraph) -> Result<Settings> {
    let dto: SettingsDto = match file_path {
        Some(path) => parse_json_file(path)?,
        None => SettingsDto::default(),
    };
    dto.into_settings(job_graph)
}

pub fn load_restart_strategy(file_path: &str) -> Result<RestartStrategyOptions> {
    let dto: RestartStrategyDto = parse_json_file(file_path)?;
    RestartStrategyOptions::try_from(dto)
}
