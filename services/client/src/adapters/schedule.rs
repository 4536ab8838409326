//! services/client/src/adapters/schedule.rs
//!
//! Implements the `ScheduleSource` port from the schedule JSON bundled with the
//! client, or from an override file.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};
use vaccimap_core::domain::VaccinationSchedule;
use vaccimap_core::ports::{PortError, PortResult, ScheduleSource};

const BUNDLED_SCHEDULE: &str = include_str!("../../data/schedule.json");

#[derive(Clone, Debug, Default)]
pub struct BundledScheduleAdapter {
    override_path: Option<PathBuf>,
}

impl BundledScheduleAdapter {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self { override_path }
    }
}

fn parse_schedule(raw: &str) -> PortResult<VaccinationSchedule> {
    serde_json::from_str(raw).map_err(|e| {
        error!("Invalid schedule data: {}", e);
        PortError::Unexpected(format!("Invalid schedule data: {}", e))
    })
}

#[async_trait]
impl ScheduleSource for BundledScheduleAdapter {
    async fn schedule(&self) -> PortResult<VaccinationSchedule> {
        match &self.override_path {
            Some(path) => {
                info!("Loading vaccination schedule from {}", path.display());
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    PortError::Unavailable(format!("Could not read {}: {}", path.display(), e))
                })?;
                parse_schedule(&raw)
            }
            None => parse_schedule(BUNDLED_SCHEDULE),
        }
    }
}
