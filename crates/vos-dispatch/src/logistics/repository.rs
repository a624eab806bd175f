use std::fmt;

use chrono::NaiveDate;

use super::domain::{
    JobId, Route, RouteId, TransportJob, Truck, TruckId, Vehicle, VehicleId,
};
use super::numbering;

/// Entity types held by the store; used to attribute side-effect failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vehicle,
    Truck,
    TransportJob,
    Route,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Truck => "truck",
            Self::TransportJob => "transport job",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Document store keyed by id. Implementations only need get/insert/update/delete; listing
/// helpers have scan-based defaults.
pub trait FleetStore: Send + Sync {
    fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Vehicle, RepositoryError>;
    fn update_vehicle(&self, vehicle: Vehicle) -> Result<(), RepositoryError>;
    fn fetch_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError>;

    fn insert_truck(&self, truck: Truck) -> Result<Truck, RepositoryError>;
    fn update_truck(&self, truck: Truck) -> Result<(), RepositoryError>;
    fn fetch_truck(&self, id: &TruckId) -> Result<Option<Truck>, RepositoryError>;
    fn delete_truck(&self, id: &TruckId) -> Result<(), RepositoryError>;

    fn insert_job(&self, job: TransportJob) -> Result<TransportJob, RepositoryError>;
    fn update_job(&self, job: TransportJob) -> Result<(), RepositoryError>;
    fn fetch_job(&self, id: &JobId) -> Result<Option<TransportJob>, RepositoryError>;
    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError>;
    fn jobs(&self) -> Result<Vec<TransportJob>, RepositoryError>;

    fn insert_route(&self, route: Route) -> Result<Route, RepositoryError>;
    fn update_route(&self, route: Route) -> Result<(), RepositoryError>;
    fn fetch_route(&self, id: &RouteId) -> Result<Option<Route>, RepositoryError>;
    fn delete_route(&self, id: &RouteId) -> Result<(), RepositoryError>;
    fn routes(&self) -> Result<Vec<Route>, RepositoryError>;

    fn jobs_on_truck(&self, truck_id: &TruckId) -> Result<Vec<TransportJob>, RepositoryError> {
        Ok(self
            .jobs()?
            .into_iter()
            .filter(|job| job.truck_id.as_ref() == Some(truck_id))
            .collect())
    }

    /// Highest `NNN` among the job numbers issued on `day`.
    fn last_job_sequence(&self, day: NaiveDate) -> Result<usize, RepositoryError> {
        let jobs = self.jobs()?;
        Ok(numbering::last_issued(
            jobs.iter().map(|job| job.job_number.as_str()),
            numbering::JOB_PREFIX,
            day,
        ))
    }

    fn last_route_sequence(&self, day: NaiveDate) -> Result<usize, RepositoryError> {
        let routes = self.routes()?;
        Ok(numbering::last_issued(
            routes.iter().map(|route| route.route_number.as_str()),
            numbering::ROUTE_PREFIX,
            day,
        ))
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
