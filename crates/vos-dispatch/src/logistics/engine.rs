//! Cross-entity status transitions.
//!
//! Every entry point recomputes target states from what is currently persisted and writes
//! only the fields that differ, so re-running an event after a partial failure converges on
//! the same end state. Side-effect updates that fail are logged, recorded on the
//! [`TransitionReport`], and skipped; only a missing event subject or a violated
//! precondition is returned as an error.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::aggregation;
use super::domain::{
    DriverId, JobId, Route, RouteId, TransportJob, Truck, TruckId, Vehicle, VehicleId,
};
use super::repository::{EntityKind, FleetStore, RepositoryError};
use super::status::{
    JobStatus, RouteStatus, StopStatus, StopType, TruckStatus, VehicleStatus,
};

/// Which architectural variant is primary for job intake.
///
/// Both direct assignment and routes stay available in either mode; the mode only decides
/// where a freshly created job leaves its vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Routed,
    Direct,
}

impl DispatchMode {
    /// Vehicle status once a transport job exists for it.
    pub const fn vehicle_status_on_job_created(self) -> VehicleStatus {
        match self {
            Self::Routed => VehicleStatus::ReadyForTransport,
            Self::Direct => VehicleStatus::InTransport,
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "routed" | "route" => Ok(Self::Routed),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown dispatch mode '{other}'")),
        }
    }
}

/// The triggering events the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    VehicleIntake,
    JobCreated,
    JobAssigned,
    JobPickupRecorded,
    JobDropRecorded,
    JobDeleted,
    RouteCreated,
    RouteStatusChanged,
    RouteReplanned,
    RouteDeleted,
    StopUpdated,
    JobRemovedFromRoute,
}

impl TransitionEvent {
    pub const fn label(self) -> &'static str {
        match self {
            Self::VehicleIntake => "vehicle_intake",
            Self::JobCreated => "job_created",
            Self::JobAssigned => "job_assigned",
            Self::JobPickupRecorded => "job_pickup_recorded",
            Self::JobDropRecorded => "job_drop_recorded",
            Self::JobDeleted => "job_deleted",
            Self::RouteCreated => "route_created",
            Self::RouteStatusChanged => "route_status_changed",
            Self::RouteReplanned => "route_replanned",
            Self::RouteDeleted => "route_deleted",
            Self::StopUpdated => "stop_updated",
            Self::JobRemovedFromRoute => "job_removed_from_route",
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status field the engine actually moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum StatusChange {
    Vehicle {
        id: VehicleId,
        from: VehicleStatus,
        to: VehicleStatus,
    },
    Truck {
        id: TruckId,
        from: TruckStatus,
        to: TruckStatus,
    },
    TransportJob {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    Route {
        id: RouteId,
        from: RouteStatus,
        to: RouteStatus,
    },
    Stop {
        route_id: RouteId,
        sequence: u32,
        from: StopStatus,
        to: StopStatus,
    },
}

/// A side-effect update that was skipped because the store could not serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectFailure {
    pub entity: EntityKind,
    pub id: String,
    pub reason: String,
}

/// What one transition did: the applied status changes and the swallowed failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub event: TransitionEvent,
    pub changes: Vec<StatusChange>,
    pub failures: Vec<SideEffectFailure>,
}

impl TransitionReport {
    pub fn new(event: TransitionEvent) -> Self {
        Self {
            event,
            changes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// No side effect was skipped; a retry would change nothing further.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty() && self.failures.is_empty()
    }

    fn skip(&mut self, entity: EntityKind, id: &dyn fmt::Display, error: &RepositoryError) {
        warn!(
            event = %self.event,
            %entity,
            id = %id,
            %error,
            "side effect update skipped"
        );
        self.failures.push(SideEffectFailure {
            entity,
            id: id.to_string(),
            reason: error.to_string(),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("{entity} {id} could not be read: {source}")]
    Persistence {
        entity: EntityKind,
        id: String,
        source: RepositoryError,
    },
}

/// Uniform access to the four stored entity types so updates share one code path.
trait Record: Sized {
    type Id: fmt::Display;
    type Status: Copy + PartialEq + fmt::Display;

    const KIND: EntityKind;

    fn id(&self) -> &Self::Id;
    fn status(&self) -> Self::Status;
    fn stamp(&mut self);
    fn change(id: &Self::Id, from: Self::Status, to: Self::Status) -> StatusChange;
    fn fetch<S: FleetStore + ?Sized>(
        store: &S,
        id: &Self::Id,
    ) -> Result<Option<Self>, RepositoryError>;
    fn save<S: FleetStore + ?Sized>(store: &S, record: Self) -> Result<(), RepositoryError>;
}

impl Record for Vehicle {
    type Id = VehicleId;
    type Status = VehicleStatus;

    const KIND: EntityKind = EntityKind::Vehicle;

    fn id(&self) -> &VehicleId {
        &self.id
    }

    fn status(&self) -> VehicleStatus {
        self.status
    }

    fn stamp(&mut self) {
        self.updated_at = Utc::now();
    }

    fn change(id: &VehicleId, from: VehicleStatus, to: VehicleStatus) -> StatusChange {
        StatusChange::Vehicle {
            id: id.clone(),
            from,
            to,
        }
    }

    fn fetch<S: FleetStore + ?Sized>(
        store: &S,
        id: &VehicleId,
    ) -> Result<Option<Self>, RepositoryError> {
        store.fetch_vehicle(id)
    }

    fn save<S: FleetStore + ?Sized>(store: &S, record: Self) -> Result<(), RepositoryError> {
        store.update_vehicle(record)
    }
}

impl Record for Truck {
    type Id = TruckId;
    type Status = TruckStatus;

    const KIND: EntityKind = EntityKind::Truck;

    fn id(&self) -> &TruckId {
        &self.id
    }

    fn status(&self) -> TruckStatus {
        self.status
    }

    fn stamp(&mut self) {
        self.updated_at = Utc::now();
    }

    fn change(id: &TruckId, from: TruckStatus, to: TruckStatus) -> StatusChange {
        StatusChange::Truck {
            id: id.clone(),
            from,
            to,
        }
    }

    fn fetch<S: FleetStore + ?Sized>(
        store: &S,
        id: &TruckId,
    ) -> Result<Option<Self>, RepositoryError> {
        store.fetch_truck(id)
    }

    fn save<S: FleetStore + ?Sized>(store: &S, record: Self) -> Result<(), RepositoryError> {
        store.update_truck(record)
    }
}

impl Record for TransportJob {
    type Id = JobId;
    type Status = JobStatus;

    const KIND: EntityKind = EntityKind::TransportJob;

    fn id(&self) -> &JobId {
        &self.id
    }

    fn status(&self) -> JobStatus {
        self.status
    }

    fn stamp(&mut self) {
        self.updated_at = Utc::now();
    }

    fn change(id: &JobId, from: JobStatus, to: JobStatus) -> StatusChange {
        StatusChange::TransportJob {
            id: id.clone(),
            from,
            to,
        }
    }

    fn fetch<S: FleetStore + ?Sized>(
        store: &S,
        id: &JobId,
    ) -> Result<Option<Self>, RepositoryError> {
        store.fetch_job(id)
    }

    fn save<S: FleetStore + ?Sized>(store: &S, record: Self) -> Result<(), RepositoryError> {
        store.update_job(record)
    }
}

impl Record for Route {
    type Id = RouteId;
    type Status = RouteStatus;

    const KIND: EntityKind = EntityKind::Route;

    fn id(&self) -> &RouteId {
        &self.id
    }

    fn status(&self) -> RouteStatus {
        self.status
    }

    fn stamp(&mut self) {
        self.updated_at = Utc::now();
    }

    fn change(id: &RouteId, from: RouteStatus, to: RouteStatus) -> StatusChange {
        StatusChange::Route {
            id: id.clone(),
            from,
            to,
        }
    }

    fn fetch<S: FleetStore + ?Sized>(
        store: &S,
        id: &RouteId,
    ) -> Result<Option<Self>, RepositoryError> {
        store.fetch_route(id)
    }

    fn save<S: FleetStore + ?Sized>(store: &S, record: Self) -> Result<(), RepositoryError> {
        store.update_route(record)
    }
}

/// Vehicles never leave `Delivered` through a cascade.
fn move_vehicle(vehicle: &mut Vehicle, target: VehicleStatus) -> bool {
    if vehicle.status == target || vehicle.status == VehicleStatus::Delivered {
        return false;
    }
    vehicle.status = target;
    true
}

/// Settled jobs (delivered or cancelled) are never moved by a cascade.
fn move_job(job: &mut TransportJob, target: JobStatus) -> bool {
    if job.status == target || job.status.is_settled() {
        return false;
    }
    job.status = target;
    true
}

fn release_truck(truck: &mut Truck) -> bool {
    let changed = truck.status != TruckStatus::Available || truck.current_driver.is_some();
    truck.status = TruckStatus::Available;
    truck.current_driver = None;
    changed
}

fn occupy_truck(truck: &mut Truck, driver: Option<&DriverId>) -> bool {
    let mut changed = false;
    if truck.status != TruckStatus::InUse {
        truck.status = TruckStatus::InUse;
        changed = true;
    }
    if let Some(driver) = driver {
        if truck.current_driver.as_ref() != Some(driver) {
            truck.current_driver = Some(driver.clone());
            changed = true;
        }
    }
    changed
}

fn is_live(status: RouteStatus) -> bool {
    matches!(status, RouteStatus::Planned | RouteStatus::InProgress)
}

/// Applies status transitions across vehicles, jobs, trucks, and routes.
pub struct StatusEngine<S> {
    store: Arc<S>,
    mode: DispatchMode,
}

impl<S> StatusEngine<S>
where
    S: FleetStore + 'static,
{
    pub fn new(store: Arc<S>, mode: DispatchMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    fn load<R: Record>(&self, id: &R::Id) -> Result<R, EngineError> {
        match R::fetch(self.store.as_ref(), id) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(EngineError::NotFound {
                entity: R::KIND,
                id: id.to_string(),
            }),
            Err(source) => Err(EngineError::Persistence {
                entity: R::KIND,
                id: id.to_string(),
                source,
            }),
        }
    }

    /// Fetch, mutate, and persist one record as a side effect. `mutate` reports whether it
    /// changed anything; unchanged records are not written.
    fn apply<R, F>(&self, report: &mut TransitionReport, id: &R::Id, mutate: F) -> Option<R>
    where
        R: Record + Clone,
        F: FnOnce(&mut R) -> bool,
    {
        match R::fetch(self.store.as_ref(), id) {
            Ok(Some(record)) => self.apply_loaded(report, record, mutate),
            Ok(None) => {
                report.skip(R::KIND, id, &RepositoryError::NotFound);
                None
            }
            Err(error) => {
                report.skip(R::KIND, id, &error);
                None
            }
        }
    }

    fn apply_loaded<R, F>(
        &self,
        report: &mut TransitionReport,
        mut record: R,
        mutate: F,
    ) -> Option<R>
    where
        R: Record + Clone,
        F: FnOnce(&mut R) -> bool,
    {
        let from = record.status();
        if !mutate(&mut record) {
            debug!(
                event = %report.event,
                entity = %R::KIND,
                id = %record.id(),
                "already consistent"
            );
            return Some(record);
        }
        record.stamp();

        if let Err(error) = R::save(self.store.as_ref(), record.clone()) {
            report.skip(R::KIND, record.id(), &error);
            return None;
        }

        let to = record.status();
        if from != to {
            info!(
                event = %report.event,
                entity = %R::KIND,
                id = %record.id(),
                %from,
                %to,
                "status updated"
            );
            report.changes.push(R::change(record.id(), from, to));
        }
        Some(record)
    }

    fn job_or_skip(&self, report: &mut TransitionReport, job_id: &JobId) -> Option<TransportJob> {
        match self.store.fetch_job(job_id) {
            Ok(Some(job)) => Some(job),
            Ok(None) => {
                report.skip(EntityKind::TransportJob, job_id, &RepositoryError::NotFound);
                None
            }
            Err(error) => {
                report.skip(EntityKind::TransportJob, job_id, &error);
                None
            }
        }
    }

    fn move_vehicle_of(
        &self,
        report: &mut TransitionReport,
        job: &TransportJob,
        target: VehicleStatus,
    ) {
        self.apply::<Vehicle, _>(report, &job.vehicle_id, |vehicle| {
            move_vehicle(vehicle, target)
        });
    }

    /// The route's jobs that still point back at it. A job released by this route and
    /// claimed by another one is left to its new owner.
    fn owned_jobs(&self, report: &mut TransitionReport, route: &Route) -> Vec<TransportJob> {
        route
            .referenced_jobs()
            .iter()
            .filter_map(|job_id| self.owned_job(report, job_id, &route.id))
            .collect()
    }

    fn owned_job(
        &self,
        report: &mut TransitionReport,
        job_id: &JobId,
        route_id: &RouteId,
    ) -> Option<TransportJob> {
        let job = self.job_or_skip(report, job_id)?;
        if job.route_id.as_ref() != Some(route_id) {
            debug!(%job_id, %route_id, owner = ?job.route_id, "job no longer on this route");
            return None;
        }
        Some(job)
    }

    /// Attach the job to the route and move it and its vehicle to the route's phase.
    fn claim_job(
        &self,
        report: &mut TransitionReport,
        route_id: &RouteId,
        job_id: &JobId,
        target: JobStatus,
        vehicle_target: VehicleStatus,
    ) {
        let Some(job) = self.apply::<TransportJob, _>(report, job_id, |job| {
            if job.status.is_settled() {
                return false;
            }
            let mut changed = move_job(job, target);
            if job.route_id.as_ref() != Some(route_id) {
                job.route_id = Some(route_id.clone());
                changed = true;
            }
            changed
        }) else {
            return;
        };
        if job.status.is_active() {
            self.move_vehicle_of(report, &job, vehicle_target);
        }
    }

    /// Detach the job from its route; an open job goes back to the dispatch pool.
    fn return_to_pool(&self, report: &mut TransitionReport, job: TransportJob) {
        let Some(job) = self.apply_loaded(report, job, |job| {
            let moved = move_job(job, JobStatus::NeedsDispatch);
            let detached = job.route_id.take().is_some();
            moved || detached
        }) else {
            return;
        };
        if job.status.is_active() {
            self.move_vehicle_of(report, &job, VehicleStatus::ReadyForTransport);
        }
    }

    /// Vehicle intake recorded: the vehicle is ready for a transport job.
    pub fn on_vehicle_intake(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::VehicleIntake);
        let vehicle: Vehicle = self.load(vehicle_id)?;
        // Intake only opens the lifecycle; a vehicle already further along keeps its status.
        self.apply_loaded(&mut report, vehicle, |vehicle| {
            vehicle.status == VehicleStatus::PurchasedIntakeNeeded
                && move_vehicle(vehicle, VehicleStatus::IntakeCompleted)
        });
        Ok(report)
    }

    /// A transport job was created for the vehicle.
    pub fn on_job_created(
        &self,
        job_id: &JobId,
        vehicle_id: &VehicleId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::JobCreated);
        let job: TransportJob = self.load(job_id)?;
        let vehicle: Vehicle = self.load(vehicle_id)?;

        self.ensure_vehicle_available(&vehicle, Some(job_id))?;

        // Once a route or truck has picked the job up, later events own its status.
        let unassigned = job.route_id.is_none() && job.truck_id.is_none();
        self.apply_loaded(&mut report, job, |job| {
            unassigned && move_job(job, JobStatus::NeedsDispatch)
        });

        let target = self.mode.vehicle_status_on_job_created();
        self.apply_loaded(&mut report, vehicle, |vehicle| {
            let mut changed = false;
            if vehicle.transport_job_id.as_ref() != Some(job_id) {
                vehicle.transport_job_id = Some(job_id.clone());
                changed = true;
            }
            (unassigned && move_vehicle(vehicle, target)) || changed
        });
        Ok(report)
    }

    /// A vehicle carries at most one active transport job; `job_id` is the job being created.
    pub fn ensure_vehicle_available(
        &self,
        vehicle: &Vehicle,
        job_id: Option<&JobId>,
    ) -> Result<(), EngineError> {
        let Some(existing) = vehicle.transport_job_id.as_ref() else {
            return Ok(());
        };
        if Some(existing) == job_id {
            return Ok(());
        }
        match self.store.fetch_job(existing) {
            Ok(Some(other)) if other.status.is_active() => {
                Err(EngineError::InvalidTransition(format!(
                    "vehicle {} already has active transport job {}",
                    vehicle.id, other.job_number
                )))
            }
            Ok(_) => Ok(()),
            Err(source) => Err(EngineError::Persistence {
                entity: EntityKind::TransportJob,
                id: existing.to_string(),
                source,
            }),
        }
    }

    /// Route-managed jobs only move through their route.
    pub fn ensure_direct_job(job: &TransportJob) -> Result<(), EngineError> {
        if let Some(route_id) = &job.route_id {
            return Err(EngineError::InvalidTransition(format!(
                "transport job {} is managed by route {route_id}",
                job.job_number
            )));
        }
        Ok(())
    }

    /// Direct assignment of a job to a driver and truck.
    pub fn on_job_assigned(
        &self,
        job_id: &JobId,
        driver_id: &DriverId,
        truck_id: &TruckId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::JobAssigned);
        let job: TransportJob = self.load(job_id)?;
        let truck: Truck = self.load(truck_id)?;
        Self::ensure_direct_job(&job)?;
        if job.status.is_settled() {
            return Err(EngineError::InvalidTransition(format!(
                "transport job {} is {} and cannot be assigned",
                job.job_number, job.status
            )));
        }

        let previous_truck = job.truck_id.clone().filter(|id| id != truck_id);
        let Some(job) = self.apply_loaded(&mut report, job, |job| {
            let mut changed = move_job(job, JobStatus::InTransit);
            if job.driver_id.as_ref() != Some(driver_id) {
                job.driver_id = Some(driver_id.clone());
                changed = true;
            }
            if job.truck_id.as_ref() != Some(truck_id) {
                job.truck_id = Some(truck_id.clone());
                changed = true;
            }
            changed
        }) else {
            return Ok(report);
        };

        self.apply_loaded(&mut report, truck, |truck| occupy_truck(truck, Some(driver_id)));
        self.move_vehicle_of(&mut report, &job, VehicleStatus::InTransport);

        if let Some(previous) = previous_truck {
            self.release_truck_if_idle(&mut report, &previous, Some(job_id));
        }
        Ok(report)
    }

    /// First pickup submission on a directly assigned job starts the move.
    pub fn on_job_pickup_recorded(
        &self,
        job_id: &JobId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::JobPickupRecorded);
        let job: TransportJob = self.load(job_id)?;
        Self::ensure_direct_job(&job)?;

        self.apply_loaded(&mut report, job, |job| {
            if job.status.is_settled() {
                return false;
            }
            let mut changed = move_job(job, JobStatus::InTransit);
            if job.actual_pickup.is_none() {
                job.actual_pickup = Some(Utc::now());
                changed = true;
            }
            changed
        });
        Ok(report)
    }

    /// Delivery submission on a directly assigned job completes it and may free the truck.
    pub fn on_job_drop_recorded(
        &self,
        job_id: &JobId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::JobDropRecorded);
        let job: TransportJob = self.load(job_id)?;
        Self::ensure_direct_job(&job)?;
        if job.status == JobStatus::Cancelled {
            return Err(EngineError::InvalidTransition(format!(
                "transport job {} was cancelled and cannot be delivered",
                job.job_number
            )));
        }

        let truck_id = job.truck_id.clone();
        self.deliver_job(&mut report, job);
        if let Some(truck_id) = truck_id {
            self.release_truck_if_idle(&mut report, &truck_id, Some(job_id));
        }
        Ok(report)
    }

    /// Mark a job and its vehicle delivered.
    fn deliver_job(&self, report: &mut TransitionReport, job: TransportJob) {
        if job.status == JobStatus::Cancelled {
            return;
        }
        let Some(job) = self.apply_loaded(report, job, |job| {
            let mut changed = move_job(job, JobStatus::Delivered);
            if job.actual_delivery.is_none() {
                job.actual_delivery = Some(Utc::now());
                changed = true;
            }
            changed
        }) else {
            return;
        };
        self.move_vehicle_of(report, &job, VehicleStatus::Delivered);
    }

    /// Free the truck unless another job is still moving on it or a live route holds it.
    fn release_truck_if_idle(
        &self,
        report: &mut TransitionReport,
        truck_id: &TruckId,
        finished_job: Option<&JobId>,
    ) {
        let moving_jobs = match self.store.jobs_on_truck(truck_id) {
            Ok(jobs) => jobs
                .into_iter()
                .filter(|job| Some(&job.id) != finished_job)
                .filter(|job| job.status == JobStatus::InTransit)
                .count(),
            Err(error) => {
                report.skip(EntityKind::Truck, truck_id, &error);
                return;
            }
        };
        let live_routes = match self.store.routes() {
            Ok(routes) => routes
                .into_iter()
                .filter(|route| &route.truck_id == truck_id && is_live(route.status))
                .count(),
            Err(error) => {
                report.skip(EntityKind::Truck, truck_id, &error);
                return;
            }
        };

        if moving_jobs > 0 || live_routes > 0 {
            debug!(%truck_id, moving_jobs, live_routes, "truck still busy");
            return;
        }
        self.apply::<Truck, _>(report, truck_id, release_truck);
    }

    /// A dispatcher created a route for the truck with the given job selection.
    pub fn on_route_created(
        &self,
        route_id: &RouteId,
        selected_jobs: &[JobId],
        truck_id: &TruckId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::RouteCreated);
        let route: Route = self.load(route_id)?;
        let truck: Truck = self.load(truck_id)?;

        let mut jobs = selected_jobs.to_vec();
        for job_id in route.referenced_jobs() {
            if !jobs.contains(&job_id) {
                jobs.push(job_id);
            }
        }
        let driver = route.driver_id.clone();

        self.apply_loaded(&mut report, route, |route| {
            if route.status == RouteStatus::Planned {
                return false;
            }
            route.status = RouteStatus::Planned;
            true
        });

        for job_id in &jobs {
            self.claim_job(
                &mut report,
                route_id,
                job_id,
                JobStatus::Dispatched,
                VehicleStatus::ReadyForTransport,
            );
        }

        self.apply_loaded(&mut report, truck, |truck| occupy_truck(truck, Some(&driver)));
        Ok(report)
    }

    /// The route moved from `old_status` to `new_status`.
    pub fn on_route_status_changed(
        &self,
        route_id: &RouteId,
        new_status: RouteStatus,
        old_status: RouteStatus,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::RouteStatusChanged);
        let route: Route = self.load(route_id)?;
        Self::ensure_route_status_change(&route.route_number, old_status, new_status)?;
        Self::ensure_route_status_change(&route.route_number, route.status, new_status)?;

        match new_status {
            RouteStatus::InProgress => {
                if old_status == RouteStatus::InProgress {
                    return Ok(report);
                }
                self.start_route(&mut report, route);
            }
            RouteStatus::Completed => {
                let Some(route) = self.apply_loaded(&mut report, route, |route| {
                    let mut changed = false;
                    if route.status != RouteStatus::Completed {
                        route.status = RouteStatus::Completed;
                        changed = true;
                    }
                    if route.actual_end.is_none() {
                        route.actual_end = Some(Utc::now());
                        changed = true;
                    }
                    changed
                }) else {
                    return Ok(report);
                };
                self.complete_route(&mut report, &route);
            }
            RouteStatus::Cancelled => self.cancel_route(&mut report, route),
            RouteStatus::Planned => {
                let route = self.apply_loaded(&mut report, route, |route| {
                    if route.status == RouteStatus::Planned {
                        return false;
                    }
                    route.status = RouteStatus::Planned;
                    true
                });
                if let Some(route) = route {
                    self.apply::<Truck, _>(&mut report, &route.truck_id, |truck| {
                        occupy_truck(truck, Some(&route.driver_id))
                    });
                }
            }
        }
        Ok(report)
    }

    fn start_route(&self, report: &mut TransitionReport, route: Route) {
        let mut activated = None;
        let Some(route) = self.apply_loaded(report, route, |route| {
            let mut changed = false;
            if route.status != RouteStatus::InProgress {
                route.status = RouteStatus::InProgress;
                changed = true;
            }
            if route.actual_start.is_none() {
                route.actual_start = Some(Utc::now());
                changed = true;
            }
            activated = aggregation::activate_first_pending(&mut route.stops);
            changed || activated.is_some()
        }) else {
            return;
        };
        if let Some(sequence) = activated {
            self.record_stop_change(
                report,
                &route.id,
                sequence,
                StopStatus::Pending,
                StopStatus::InProgress,
            );
        }

        for job in self.owned_jobs(report, &route) {
            let Some(job) = self.apply_loaded(report, job, |job| {
                move_job(job, JobStatus::InTransit)
            }) else {
                continue;
            };
            if job.status.is_active() {
                self.move_vehicle_of(report, &job, VehicleStatus::InTransport);
            }
        }

        self.apply::<Truck, _>(report, &route.truck_id, |truck| {
            occupy_truck(truck, Some(&route.driver_id))
        });
    }

    /// Deliver the route's jobs when all stops are done, then free the truck unless a newer
    /// route or a direct job holds it.
    fn complete_route(&self, report: &mut TransitionReport, route: &Route) {
        if aggregation::all_stops_completed(&route.stops) {
            for job in self.owned_jobs(report, route) {
                self.deliver_job(report, job);
            }
        } else {
            debug!(route_id = %route.id, "route closed with open stops; jobs left as they are");
        }

        self.release_truck_if_idle(report, &route.truck_id, None);
    }

    fn cancel_route(&self, report: &mut TransitionReport, route: Route) {
        let Some(route) = self.apply_loaded(report, route, |route| {
            if route.status == RouteStatus::Cancelled {
                return false;
            }
            route.status = RouteStatus::Cancelled;
            true
        }) else {
            return;
        };

        // Delivered jobs keep their route as history.
        for job in self.owned_jobs(report, &route) {
            if job.status.is_active() {
                self.return_to_pool(report, job);
            }
        }

        self.release_truck_if_idle(report, &route.truck_id, None);
    }

    fn record_stop_change(
        &self,
        report: &mut TransitionReport,
        route_id: &RouteId,
        sequence: u32,
        from: StopStatus,
        to: StopStatus,
    ) {
        info!(event = %report.event, %route_id, sequence, %from, %to, "stop status updated");
        report.changes.push(StatusChange::Stop {
            route_id: route_id.clone(),
            sequence,
            from,
            to,
        });
    }

    /// A stop's status was saved; propagate to the job, the vehicle, and the route.
    pub fn on_stop_updated(
        &self,
        route_id: &RouteId,
        stop_index: usize,
        new_stop_status: StopStatus,
        stop_type: StopType,
        job_id: Option<&JobId>,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::StopUpdated);
        let route: Route = self.load(route_id)?;
        Self::ensure_route_open(&route)?;
        if stop_index >= route.stops.len() {
            return Err(EngineError::InvalidTransition(format!(
                "route {} has no stop at index {stop_index}",
                route.route_number
            )));
        }

        let completed = new_stop_status == StopStatus::Completed;
        match (completed, stop_type, job_id) {
            (true, StopType::Drop, Some(job_id)) => {
                if aggregation::drop_stops_completed(&route.stops, job_id) {
                    if let Some(job) = self.owned_job(&mut report, job_id, route_id) {
                        self.deliver_job(&mut report, job);
                    }
                }
            }
            (true, StopType::Pickup, Some(job_id)) => {
                if let Some(job) = self.owned_job(&mut report, job_id, route_id) {
                    self.move_vehicle_of(&mut report, &job, VehicleStatus::InTransport);
                }
            }
            _ => {}
        }

        let mut advanced = None;
        let mut reopened = false;
        let Some(route) = self.apply_loaded(&mut report, route, |route| {
            let mut changed = false;
            if completed {
                advanced = aggregation::advance_after_completion(&mut route.stops);
                changed = advanced.is_some();
            }
            if aggregation::all_stops_completed(&route.stops) {
                if route.status != RouteStatus::Completed {
                    route.status = RouteStatus::Completed;
                    changed = true;
                }
                if route.actual_end.is_none() {
                    route.actual_end = Some(Utc::now());
                    changed = true;
                }
            } else if route.status == RouteStatus::Completed {
                route.status = RouteStatus::InProgress;
                route.actual_end = None;
                reopened = true;
                changed = true;
            }
            changed
        }) else {
            return Ok(report);
        };

        if let Some(sequence) = advanced {
            self.record_stop_change(
                &mut report,
                &route.id,
                sequence,
                StopStatus::Pending,
                StopStatus::InProgress,
            );
        }
        // Cascade on every re-scan, not only on promotion, so a retry finishes a partial run.
        if aggregation::all_stops_completed(&route.stops) {
            self.complete_route(&mut report, &route);
        } else if reopened {
            self.apply::<Truck, _>(&mut report, &route.truck_id, |truck| {
                occupy_truck(truck, Some(&route.driver_id))
            });
        }
        Ok(report)
    }

    /// The job was taken off its route and returns to the dispatch pool.
    pub fn on_job_removed_from_route(
        &self,
        job_id: &JobId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::JobRemovedFromRoute);
        let job: TransportJob = self.load(job_id)?;
        self.return_to_pool(&mut report, job);
        Ok(report)
    }

    /// The route's job selection or stops were replaced. Jobs no longer on it return to the
    /// pool; jobs on it move to the route's current phase.
    pub fn on_route_replanned(
        &self,
        route_id: &RouteId,
        dropped_jobs: &[JobId],
        previous_truck: &TruckId,
    ) -> Result<TransitionReport, EngineError> {
        let mut report = TransitionReport::new(TransitionEvent::RouteReplanned);
        let route: Route = self.load(route_id)?;
        if !is_live(route.status) {
            return Err(EngineError::InvalidTransition(format!(
                "route {} is {} and cannot be replanned",
                route.route_number, route.status
            )));
        }

        let current = route.referenced_jobs();
        for job_id in dropped_jobs.iter().filter(|job_id| !current.contains(*job_id)) {
            if let Some(job) = self.owned_job(&mut report, job_id, route_id) {
                self.return_to_pool(&mut report, job);
            }
        }

        let (target, vehicle_target) = match route.status {
            RouteStatus::InProgress => (JobStatus::InTransit, VehicleStatus::InTransport),
            _ => (JobStatus::Dispatched, VehicleStatus::ReadyForTransport),
        };
        for job_id in &current {
            self.claim_job(&mut report, route_id, job_id, target, vehicle_target);
        }

        let mut activated = None;
        let mut completed = false;
        let Some(route) = self.apply_loaded(&mut report, route, |route| {
            if route.status != RouteStatus::InProgress {
                return false;
            }
            if aggregation::all_stops_completed(&route.stops) {
                route.status = RouteStatus::Completed;
                route.actual_end = Some(Utc::now());
                completed = true;
                return true;
            }
            activated = aggregation::activate_first_pending(&mut route.stops);
            activated.is_some()
        }) else {
            return Ok(report);
        };
        if let Some(sequence) = activated {
            self.record_stop_change(
                &mut report,
                route_id,
                sequence,
                StopStatus::Pending,
                StopStatus::InProgress,
            );
        }

        if completed {
            self.complete_route(&mut report, &route);
        } else {
            self.apply::<Truck, _>(&mut report, &route.truck_id, |truck| {
                occupy_truck(truck, Some(&route.driver_id))
            });
        }
        if previous_truck != &route.truck_id {
            self.release_truck_if_idle(&mut report, previous_truck, None);
        }
        Ok(report)
    }

    /// In-progress routes are cancelled, not deleted.
    pub fn ensure_route_deletable(route: &Route) -> Result<(), EngineError> {
        if route.status == RouteStatus::InProgress {
            return Err(EngineError::InvalidTransition(format!(
                "cannot delete route {} while it is in progress; cancel it first",
                route.route_number
            )));
        }
        Ok(())
    }

    /// Clean up after a deleted route: its jobs leave it and the truck is freed when idle.
    pub fn on_route_deleted(&self, route: &Route) -> Result<TransitionReport, EngineError> {
        Self::ensure_route_deletable(route)?;
        let mut report = TransitionReport::new(TransitionEvent::RouteDeleted);
        for job in self.owned_jobs(&mut report, route) {
            self.return_to_pool(&mut report, job);
        }
        self.release_truck_if_idle(&mut report, &route.truck_id, None);
        Ok(report)
    }

    /// Cancelled routes are final; a completed route only reopens through one of its stops.
    pub fn ensure_route_status_change(
        route_number: &str,
        from: RouteStatus,
        to: RouteStatus,
    ) -> Result<(), EngineError> {
        if from == to {
            return Ok(());
        }
        match from {
            RouteStatus::Cancelled => Err(EngineError::InvalidTransition(format!(
                "route {route_number} was cancelled and cannot become {to}"
            ))),
            RouteStatus::Completed => Err(EngineError::InvalidTransition(format!(
                "route {route_number} is completed; reopen one of its stops to resume it"
            ))),
            RouteStatus::Planned | RouteStatus::InProgress => Ok(()),
        }
    }

    pub fn ensure_route_open(route: &Route) -> Result<(), EngineError> {
        if route.status == RouteStatus::Cancelled {
            return Err(EngineError::InvalidTransition(format!(
                "route {} was cancelled; its stops can no longer change",
                route.route_number
            )));
        }
        Ok(())
    }

    /// A job joins a route while it is open and no other live route holds it. `route_id` is
    /// the route being planned, when it already exists.
    pub fn ensure_job_routable(
        &self,
        job: &TransportJob,
        route_id: Option<&RouteId>,
    ) -> Result<(), EngineError> {
        if route_id.is_some() && job.route_id.as_ref() == route_id {
            return Ok(());
        }
        if job.status.is_settled() {
            return Err(EngineError::InvalidTransition(format!(
                "transport job {} is {} and cannot join a route",
                job.job_number, job.status
            )));
        }
        let Some(current) = job.route_id.as_ref() else {
            return Ok(());
        };
        match self.store.fetch_route(current) {
            Ok(Some(other)) if is_live(other.status) => {
                Err(EngineError::InvalidTransition(format!(
                    "transport job {} is already on route {}",
                    job.job_number, other.route_number
                )))
            }
            Ok(_) => Ok(()),
            Err(source) => Err(EngineError::Persistence {
                entity: EntityKind::Route,
                id: current.to_string(),
                source,
            }),
        }
    }

    /// Jobs still attached to a route must be removed from it before deletion.
    pub fn ensure_job_deletable(&self, job: &TransportJob) -> Result<(), EngineError> {
        match &job.route_id {
            Some(route_id) => Err(EngineError::InvalidTransition(format!(
                "cannot delete transport job {} while it is part of route {route_id}",
                job.job_number
            ))),
            None => Ok(()),
        }
    }

    /// Clean up after a deleted job: free its truck when idle and drop the vehicle back-reference.
    pub fn on_job_deleted(&self, job: &TransportJob) -> Result<TransitionReport, EngineError> {
        self.ensure_job_deletable(job)?;
        let mut report = TransitionReport::new(TransitionEvent::JobDeleted);

        if let Some(truck_id) = &job.truck_id {
            self.release_truck_if_idle(&mut report, truck_id, Some(&job.id));
        }

        self.apply::<Vehicle, _>(&mut report, &job.vehicle_id, |vehicle| {
            if vehicle.transport_job_id.as_ref() != Some(&job.id) {
                return false;
            }
            vehicle.transport_job_id = None;
            true
        });
        Ok(report)
    }

    /// Trucks in use cannot be deleted.
    pub fn ensure_truck_deletable(&self, truck: &Truck) -> Result<(), EngineError> {
        if truck.status == TruckStatus::InUse {
            return Err(EngineError::InvalidTransition(format!(
                "cannot delete truck {} while it is in use; change its status first",
                truck.truck_number.as_deref().unwrap_or(truck.id.as_str())
            )));
        }
        Ok(())
    }
}
