use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::aggregation::{self, StopPlanError};
use super::checklist::{default_checklist, ensure_checklist};
use super::domain::{
    ChecklistItem, DriverId, HandoffSubmission, JobDraft, JobId, Route, RouteDraft, RouteId,
    RoutePlan, Stop, StopUpdate, TransportJob, Truck, TruckDraft, TruckId, Vehicle, VehicleDraft,
    VehicleId,
};
use super::engine::{
    DispatchMode, EngineError, StatusEngine, TransitionEvent, TransitionReport,
};
use super::numbering;
use super::repository::{EntityKind, FleetStore, RepositoryError};
use super::status::{JobStatus, RouteStatus, StopStatus, StopType};

/// A persisted record together with the cascade its change triggered.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched<T> {
    pub record: T,
    pub transitions: TransitionReport,
}

/// Direct assignment of a job to a driver and a truck.
#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub driver_id: DriverId,
    pub truck_id: TruckId,
}

/// Entity-mutation handlers: each persists its primary change, then runs the engine.
pub struct DispatchService<S> {
    store: Arc<S>,
    engine: StatusEngine<S>,
}

impl<S> DispatchService<S>
where
    S: FleetStore + 'static,
{
    pub fn new(store: Arc<S>, mode: DispatchMode) -> Self {
        let engine = StatusEngine::new(Arc::clone(&store), mode);
        Self { store, engine }
    }

    pub fn mode(&self) -> DispatchMode {
        self.engine.mode()
    }

    pub fn engine(&self) -> &StatusEngine<S> {
        &self.engine
    }

    pub fn vehicle(&self, id: &VehicleId) -> Result<Vehicle, DispatchServiceError> {
        self.store
            .fetch_vehicle(id)?
            .ok_or_else(|| DispatchServiceError::missing(EntityKind::Vehicle, id))
    }

    pub fn truck(&self, id: &TruckId) -> Result<Truck, DispatchServiceError> {
        self.store
            .fetch_truck(id)?
            .ok_or_else(|| DispatchServiceError::missing(EntityKind::Truck, id))
    }

    pub fn job(&self, id: &JobId) -> Result<TransportJob, DispatchServiceError> {
        self.store
            .fetch_job(id)?
            .ok_or_else(|| DispatchServiceError::missing(EntityKind::TransportJob, id))
    }

    pub fn route(&self, id: &RouteId) -> Result<Route, DispatchServiceError> {
        self.store
            .fetch_route(id)?
            .ok_or_else(|| DispatchServiceError::missing(EntityKind::Route, id))
    }

    pub fn jobs(&self) -> Result<Vec<TransportJob>, DispatchServiceError> {
        Ok(self.store.jobs()?)
    }

    pub fn routes(&self) -> Result<Vec<Route>, DispatchServiceError> {
        Ok(self.store.routes()?)
    }

    pub fn register_vehicle(&self, draft: VehicleDraft) -> Result<Vehicle, DispatchServiceError> {
        let vehicle = Vehicle::from_draft(VehicleId::generate(), draft, Utc::now());
        let stored = self.store.insert_vehicle(vehicle)?;
        info!(vehicle_id = %stored.id, vin = ?stored.vin, "vehicle registered");
        Ok(stored)
    }

    /// The intake form for the vehicle was completed.
    pub fn record_intake(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Dispatched<Vehicle>, DispatchServiceError> {
        self.vehicle(vehicle_id)?;
        let transitions = self.engine.on_vehicle_intake(vehicle_id)?;
        Ok(Dispatched {
            record: self.vehicle(vehicle_id)?,
            transitions,
        })
    }

    pub fn register_truck(&self, draft: TruckDraft) -> Result<Truck, DispatchServiceError> {
        let truck = Truck::from_draft(TruckId::generate(), draft, Utc::now());
        let stored = self.store.insert_truck(truck)?;
        info!(truck_id = %stored.id, number = ?stored.truck_number, "truck registered");
        Ok(stored)
    }

    pub fn delete_truck(&self, truck_id: &TruckId) -> Result<(), DispatchServiceError> {
        let truck = self.truck(truck_id)?;
        self.engine.ensure_truck_deletable(&truck)?;
        self.store.delete_truck(truck_id)?;
        info!(%truck_id, "truck deleted");
        Ok(())
    }

    pub fn create_job(
        &self,
        draft: JobDraft,
    ) -> Result<Dispatched<TransportJob>, DispatchServiceError> {
        let vehicle = self.vehicle(&draft.vehicle_id)?;
        self.engine.ensure_vehicle_available(&vehicle, None)?;

        let now = Utc::now();
        let last_issued = self.store.last_job_sequence(now.date_naive())?;
        let job_number = numbering::job_number(now.date_naive(), last_issued);
        let job = TransportJob::from_draft(JobId::generate(), job_number, draft, now);
        let job = self.store.insert_job(job)?;
        info!(
            job_id = %job.id,
            job_number = %job.job_number,
            vehicle_id = %vehicle.id,
            "transport job created"
        );

        let transitions = self.engine.on_job_created(&job.id, &vehicle.id)?;
        Ok(Dispatched {
            record: self.job(&job.id)?,
            transitions,
        })
    }

    /// Assign driver and truck directly; the engine writes the assignment with its cascade.
    pub fn assign_job(
        &self,
        job_id: &JobId,
        assignment: Assignment,
    ) -> Result<Dispatched<TransportJob>, DispatchServiceError> {
        self.job(job_id)?;
        self.truck(&assignment.truck_id)?;
        let transitions =
            self.engine
                .on_job_assigned(job_id, &assignment.driver_id, &assignment.truck_id)?;
        Ok(Dispatched {
            record: self.job(job_id)?,
            transitions,
        })
    }

    pub fn record_pickup(
        &self,
        job_id: &JobId,
        submission: HandoffSubmission,
    ) -> Result<Dispatched<TransportJob>, DispatchServiceError> {
        let mut job = self.job(job_id)?;
        StatusEngine::<S>::ensure_direct_job(&job)?;

        job.pickup_photos.extend(submission.photos);
        merge_checklist(&mut job.pickup_checklist, submission.checklist, StopType::Pickup);
        if submission.notes.is_some() {
            job.notes = submission.notes;
        }
        job.updated_at = Utc::now();
        self.store.update_job(job)?;

        let transitions = self.engine.on_job_pickup_recorded(job_id)?;
        Ok(Dispatched {
            record: self.job(job_id)?,
            transitions,
        })
    }

    /// Only the first delivery submission completes the job; later ones add evidence.
    pub fn record_delivery(
        &self,
        job_id: &JobId,
        submission: HandoffSubmission,
    ) -> Result<Dispatched<TransportJob>, DispatchServiceError> {
        let mut job = self.job(job_id)?;
        StatusEngine::<S>::ensure_direct_job(&job)?;
        if job.status == JobStatus::Cancelled {
            return Err(EngineError::InvalidTransition(format!(
                "transport job {} was cancelled and cannot be delivered",
                job.job_number
            ))
            .into());
        }
        let first_submission = job.actual_delivery.is_none();

        job.delivery_photos.extend(submission.photos);
        merge_checklist(&mut job.delivery_checklist, submission.checklist, StopType::Drop);
        if submission.notes.is_some() {
            job.notes = submission.notes;
        }
        job.updated_at = Utc::now();
        self.store.update_job(job)?;

        let transitions = if first_submission {
            self.engine.on_job_drop_recorded(job_id)?
        } else {
            TransitionReport::new(TransitionEvent::JobDropRecorded)
        };
        Ok(Dispatched {
            record: self.job(job_id)?,
            transitions,
        })
    }

    pub fn delete_job(&self, job_id: &JobId) -> Result<TransitionReport, DispatchServiceError> {
        let job = self.job(job_id)?;
        self.engine.ensure_job_deletable(&job)?;
        self.store.delete_job(job_id)?;
        info!(%job_id, job_number = %job.job_number, "transport job deleted");
        Ok(self.engine.on_job_deleted(&job)?)
    }

    pub fn create_route(
        &self,
        draft: RouteDraft,
    ) -> Result<Dispatched<Route>, DispatchServiceError> {
        self.truck(&draft.truck_id)?;
        let stops = plan_stops(draft.stops)?;
        self.ensure_routable(&draft.selected_transport_jobs, &stops, None)?;

        let now = Utc::now();
        let last_issued = self.store.last_route_sequence(now.date_naive())?;
        let route = Route {
            id: RouteId::generate(),
            route_number: numbering::route_number(now.date_naive(), last_issued),
            driver_id: draft.driver_id,
            truck_id: draft.truck_id,
            planned_start: draft.planned_start,
            planned_end: draft.planned_end,
            actual_start: None,
            actual_end: None,
            selected_transport_jobs: draft.selected_transport_jobs,
            stops,
            status: RouteStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        let route = self.store.insert_route(route)?;
        info!(
            route_id = %route.id,
            route_number = %route.route_number,
            stops = route.stops.len(),
            "route created"
        );

        let transitions = self.engine.on_route_created(
            &route.id,
            &route.selected_transport_jobs,
            &route.truck_id,
        )?;
        Ok(Dispatched {
            record: self.route(&route.id)?,
            transitions,
        })
    }

    pub fn change_route_status(
        &self,
        route_id: &RouteId,
        status: RouteStatus,
    ) -> Result<Dispatched<Route>, DispatchServiceError> {
        let mut route = self.route(route_id)?;
        let previous = route.status;
        StatusEngine::<S>::ensure_route_status_change(&route.route_number, previous, status)?;
        if previous != status {
            route.status = status;
            route.updated_at = Utc::now();
            self.store.update_route(route)?;
            info!(%route_id, from = %previous, to = %status, "route status changed");
        }

        let transitions = self.engine.on_route_status_changed(route_id, status, previous)?;
        Ok(Dispatched {
            record: self.route(route_id)?,
            transitions,
        })
    }

    /// Apply a driver's update to the stop with the given sequence number.
    pub fn update_stop(
        &self,
        route_id: &RouteId,
        sequence: u32,
        update: StopUpdate,
    ) -> Result<Dispatched<Route>, DispatchServiceError> {
        let mut route = self.route(route_id)?;
        StatusEngine::<S>::ensure_route_open(&route)?;
        let index = route
            .stops
            .iter()
            .position(|stop| stop.sequence == sequence)
            .ok_or_else(|| DispatchServiceError::NotFound {
                entity: "stop",
                id: format!("{route_id}#{sequence}"),
            })?;

        if update.status == Some(StopStatus::InProgress) {
            let busy = route.stops.iter().enumerate().find(|(position, stop)| {
                *position != index && stop.status == StopStatus::InProgress
            });
            if let Some((_, busy)) = busy {
                return Err(EngineError::InvalidTransition(format!(
                    "stop {} on route {} is already in progress",
                    busy.sequence, route.route_number
                ))
                .into());
            }
        }

        let stop = &mut route.stops[index];
        if let Some(status) = update.status {
            stop.status = status;
        }
        if let Some(actual_date) = update.actual_date {
            stop.actual_date = Some(actual_date);
        } else if stop.status == StopStatus::Completed && stop.actual_date.is_none() {
            stop.actual_date = Some(Utc::now());
        }
        if let Some(photos) = update.photos {
            stop.photos.extend(photos);
        }
        if update.notes.is_some() {
            stop.notes = update.notes;
        }

        let stop_status = stop.status;
        let stop_type = stop.stop_type;
        let job_id = stop.transport_job_id.clone();
        route.updated_at = Utc::now();
        self.store.update_route(route)?;

        let transitions = self.engine.on_stop_updated(
            route_id,
            index,
            stop_status,
            stop_type,
            job_id.as_ref(),
        )?;
        Ok(Dispatched {
            record: self.route(route_id)?,
            transitions,
        })
    }

    /// Replace the job selection and stops of a planned or in-progress route.
    pub fn replan_route(
        &self,
        route_id: &RouteId,
        plan: RoutePlan,
    ) -> Result<Dispatched<Route>, DispatchServiceError> {
        let mut route = self.route(route_id)?;
        if !matches!(route.status, RouteStatus::Planned | RouteStatus::InProgress) {
            return Err(EngineError::InvalidTransition(format!(
                "route {} is {} and cannot be replanned",
                route.route_number, route.status
            ))
            .into());
        }
        if let Some(truck_id) = &plan.truck_id {
            self.truck(truck_id)?;
        }
        let stops = plan_stops(plan.stops)?;
        self.ensure_routable(&plan.selected_transport_jobs, &stops, Some(route_id))?;

        let previous_jobs = route.referenced_jobs();
        let previous_truck = route.truck_id.clone();
        route.selected_transport_jobs = plan.selected_transport_jobs;
        route.stops = stops;
        if let Some(truck_id) = plan.truck_id {
            route.truck_id = truck_id;
        }
        if let Some(driver_id) = plan.driver_id {
            route.driver_id = driver_id;
        }
        if plan.planned_start.is_some() {
            route.planned_start = plan.planned_start;
        }
        if plan.planned_end.is_some() {
            route.planned_end = plan.planned_end;
        }
        route.updated_at = Utc::now();

        let kept = route.referenced_jobs();
        let dropped: Vec<JobId> = previous_jobs
            .into_iter()
            .filter(|job_id| !kept.contains(job_id))
            .collect();
        self.store.update_route(route)?;
        info!(
            %route_id,
            jobs = kept.len(),
            dropped = dropped.len(),
            "route replanned"
        );

        let transitions = self
            .engine
            .on_route_replanned(route_id, &dropped, &previous_truck)?;
        Ok(Dispatched {
            record: self.route(route_id)?,
            transitions,
        })
    }

    pub fn delete_route(
        &self,
        route_id: &RouteId,
    ) -> Result<TransitionReport, DispatchServiceError> {
        let route = self.route(route_id)?;
        StatusEngine::<S>::ensure_route_deletable(&route)?;
        self.store.delete_route(route_id)?;
        info!(%route_id, route_number = %route.route_number, "route deleted");
        Ok(self.engine.on_route_deleted(&route)?)
    }

    /// Every job named by the selection or a stop exists and may join the route.
    fn ensure_routable(
        &self,
        selected: &[JobId],
        stops: &[Stop],
        route_id: Option<&RouteId>,
    ) -> Result<(), DispatchServiceError> {
        let from_stops = stops.iter().filter_map(|stop| stop.transport_job_id.as_ref());
        let mut checked: Vec<&JobId> = Vec::new();
        for job_id in selected.iter().chain(from_stops) {
            if checked.contains(&job_id) {
                continue;
            }
            let job = self.job(job_id)?;
            self.engine.ensure_job_routable(&job, route_id)?;
            checked.push(job_id);
        }
        Ok(())
    }

    /// Take a job and its stops off the route; the job returns to the dispatch pool.
    pub fn remove_job_from_route(
        &self,
        route_id: &RouteId,
        job_id: &JobId,
    ) -> Result<Dispatched<Route>, DispatchServiceError> {
        let mut route = self.route(route_id)?;
        if !route.referenced_jobs().contains(job_id) {
            return Err(DispatchServiceError::NotFound {
                entity: "route job",
                id: format!("{route_id}/{job_id}"),
            });
        }

        let removed_stops = aggregation::remove_job_stops(&mut route.stops, job_id);
        route.selected_transport_jobs.retain(|selected| selected != job_id);
        route.updated_at = Utc::now();
        self.store.update_route(route)?;
        info!(%route_id, %job_id, removed_stops, "job removed from route");

        let transitions = self.engine.on_job_removed_from_route(job_id)?;
        Ok(Dispatched {
            record: self.route(route_id)?,
            transitions,
        })
    }
}

/// Number unsequenced stops, check the plan, and give every stop its checklist.
fn plan_stops(mut stops: Vec<Stop>) -> Result<Vec<Stop>, DispatchServiceError> {
    aggregation::normalize_sequence(&mut stops);
    aggregation::validate_stop_plan(&stops)?;
    if aggregation::in_progress_count(&stops) > 1 {
        return Err(EngineError::InvalidTransition(
            "a route can have only one stop in progress".to_string(),
        )
        .into());
    }
    for stop in &mut stops {
        ensure_checklist(stop);
    }
    Ok(stops)
}

/// Submitted items replace the checklist; an empty checklist gets the defaults.
fn merge_checklist(
    checklist: &mut Vec<ChecklistItem>,
    submitted: Vec<ChecklistItem>,
    stop_type: StopType,
) {
    if !submitted.is_empty() {
        *checklist = submitted;
    } else if checklist.is_empty() {
        *checklist = default_checklist(stop_type);
    }
}

/// Error raised by the dispatch service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    StopPlan(#[from] StopPlanError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl DispatchServiceError {
    fn missing(entity: EntityKind, id: &dyn std::fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.label(),
            id: id.to_string(),
        }
    }
}
