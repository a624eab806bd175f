//! Vehicle transport dispatch: status vocabulary, entities, and the engine that keeps
//! vehicle, transport job, truck, and route statuses consistent with each other.
//!
//! Two dispatch variants share the same entities. Direct assignment puts a driver and truck
//! on a single job; routes bundle several jobs into an ordered list of stops. Each mutation
//! goes through [`DispatchService`], which persists the primary change and then asks the
//! [`StatusEngine`] to bring every related record in line.

pub mod aggregation;
pub mod checklist;
pub mod domain;
pub mod engine;
pub mod memory;
pub mod numbering;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
mod tests;

pub use aggregation::StopPlanError;
pub use domain::{
    ChecklistItem, Coordinates, DriverId, HandoffSubmission, JobDraft, JobId, Photo, Route,
    RouteDraft, RouteId, RoutePlan, Site, Stop, StopLocation, StopUpdate, TransportJob, Truck,
    TruckDraft, TruckId, Vehicle, VehicleDraft, VehicleId,
};
pub use engine::{
    DispatchMode, EngineError, SideEffectFailure, StatusChange, StatusEngine, TransitionEvent,
    TransitionReport,
};
pub use memory::MemoryStore;
pub use repository::{EntityKind, FleetStore, RepositoryError};
pub use router::dispatch_router;
pub use service::{Assignment, DispatchService, DispatchServiceError, Dispatched};
pub use status::{
    status_catalog, Carrier, JobStatus, RouteStatus, StopStatus, StopType, TruckCapacity,
    TruckStatus, UnknownStatus, VehicleStatus, Vocabulary, VocabularyView,
};
