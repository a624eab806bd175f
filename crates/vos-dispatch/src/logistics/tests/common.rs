use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::logistics::domain::{
    DriverId, JobDraft, JobId, Route, RouteDraft, RouteId, Stop, TransportJob, Truck,
    TruckDraft, TruckId, Vehicle, VehicleDraft, VehicleId,
};
use crate::logistics::engine::DispatchMode;
use crate::logistics::memory::MemoryStore;
use crate::logistics::repository::{EntityKind, FleetStore, RepositoryError};
use crate::logistics::service::DispatchService;
use crate::logistics::status::{Carrier, StopType, TruckCapacity};

pub(super) fn memory_service(
    mode: DispatchMode,
) -> (DispatchService<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (DispatchService::new(store.clone(), mode), store)
}

pub(super) fn flaky_service(
    mode: DispatchMode,
) -> (DispatchService<FlakyStore>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    (DispatchService::new(store.clone(), mode), store)
}

pub(super) fn driver() -> DriverId {
    DriverId::from("driver-ana")
}

pub(super) fn vehicle_draft(vin: &str) -> VehicleDraft {
    VehicleDraft {
        vin: Some(vin.to_string()),
        year: Some(2019),
        make: Some("Toyota".to_string()),
        model: Some("Tacoma".to_string()),
        purchase_source: Some("Manheim Dallas".to_string()),
        purchase_date: NaiveDate::from_ymd_opt(2025, 3, 14),
        purchase_price: Some(23_450.0),
        buyer_name: Some("R. Ortiz".to_string()),
        ..VehicleDraft::default()
    }
}

/// A registered vehicle with its intake completed.
pub(super) fn intake_vehicle<S: FleetStore + 'static>(
    service: &DispatchService<S>,
    vin: &str,
) -> Vehicle {
    let vehicle = service
        .register_vehicle(vehicle_draft(vin))
        .expect("vehicle registers");
    service
        .record_intake(&vehicle.id)
        .expect("intake recorded")
        .record
}

pub(super) fn truck<S: FleetStore + 'static>(service: &DispatchService<S>, number: &str) -> Truck {
    service
        .register_truck(TruckDraft {
            truck_number: Some(number.to_string()),
            license_plate: Some(format!("TX-{number}")),
            capacity: TruckCapacity::Triple,
            ..TruckDraft::default()
        })
        .expect("truck registers")
}

pub(super) fn job_draft(vehicle_id: &VehicleId) -> JobDraft {
    JobDraft {
        vehicle_id: vehicle_id.clone(),
        carrier: Carrier::Ptg,
        planned_pickup: None,
        planned_delivery: None,
        notes: None,
    }
}

pub(super) fn job_for<S: FleetStore + 'static>(
    service: &DispatchService<S>,
    vehicle: &Vehicle,
) -> TransportJob {
    service
        .create_job(job_draft(&vehicle.id))
        .expect("job created")
        .record
}

/// All pickups first, then all drops, in the order the jobs are given. Sequences are left
/// unset so the service numbers them.
pub(super) fn pickups_then_drops(jobs: &[&JobId]) -> Vec<Stop> {
    let pickups = jobs
        .iter()
        .map(|job| Stop::new(StopType::Pickup, Some((*job).clone()), 0));
    let drops = jobs
        .iter()
        .map(|job| Stop::new(StopType::Drop, Some((*job).clone()), 0));
    pickups.chain(drops).collect()
}

pub(super) fn route_draft(truck_id: &TruckId, jobs: &[&JobId]) -> RouteDraft {
    RouteDraft {
        driver_id: driver(),
        truck_id: truck_id.clone(),
        planned_start: None,
        planned_end: None,
        selected_transport_jobs: jobs.iter().map(|job| (*job).clone()).collect(),
        stops: pickups_then_drops(jobs),
    }
}

pub(super) fn route_for<S: FleetStore + 'static>(
    service: &DispatchService<S>,
    truck: &Truck,
    jobs: &[&JobId],
) -> Route {
    service
        .create_route(route_draft(&truck.id, jobs))
        .expect("route created")
        .record
}

/// Memory-backed store whose updates can be switched to fail per entity type.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Vec<EntityKind>>,
}

impl FlakyStore {
    pub(super) fn fail_updates(&self, entity: EntityKind) {
        self.failing.lock().expect("flaky mutex poisoned").push(entity);
    }

    pub(super) fn recover(&self) {
        self.failing.lock().expect("flaky mutex poisoned").clear();
    }

    fn check(&self, entity: EntityKind) -> Result<(), RepositoryError> {
        if self
            .failing
            .lock()
            .expect("flaky mutex poisoned")
            .contains(&entity)
        {
            return Err(RepositoryError::Unavailable(format!("{entity} writes offline")));
        }
        Ok(())
    }
}

impl FleetStore for FlakyStore {
    fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Vehicle, RepositoryError> {
        self.inner.insert_vehicle(vehicle)
    }

    fn update_vehicle(&self, vehicle: Vehicle) -> Result<(), RepositoryError> {
        self.check(EntityKind::Vehicle)?;
        self.inner.update_vehicle(vehicle)
    }

    fn fetch_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        self.inner.fetch_vehicle(id)
    }

    fn insert_truck(&self, truck: Truck) -> Result<Truck, RepositoryError> {
        self.inner.insert_truck(truck)
    }

    fn update_truck(&self, truck: Truck) -> Result<(), RepositoryError> {
        self.check(EntityKind::Truck)?;
        self.inner.update_truck(truck)
    }

    fn fetch_truck(&self, id: &TruckId) -> Result<Option<Truck>, RepositoryError> {
        self.inner.fetch_truck(id)
    }

    fn delete_truck(&self, id: &TruckId) -> Result<(), RepositoryError> {
        self.inner.delete_truck(id)
    }

    fn insert_job(&self, job: TransportJob) -> Result<TransportJob, RepositoryError> {
        self.inner.insert_job(job)
    }

    fn update_job(&self, job: TransportJob) -> Result<(), RepositoryError> {
        self.check(EntityKind::TransportJob)?;
        self.inner.update_job(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<TransportJob>, RepositoryError> {
        self.inner.fetch_job(id)
    }

    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError> {
        self.inner.delete_job(id)
    }

    fn jobs(&self) -> Result<Vec<TransportJob>, RepositoryError> {
        self.inner.jobs()
    }

    fn insert_route(&self, route: Route) -> Result<Route, RepositoryError> {
        self.inner.insert_route(route)
    }

    fn update_route(&self, route: Route) -> Result<(), RepositoryError> {
        self.check(EntityKind::Route)?;
        self.inner.update_route(route)
    }

    fn fetch_route(&self, id: &RouteId) -> Result<Option<Route>, RepositoryError> {
        self.inner.fetch_route(id)
    }

    fn delete_route(&self, id: &RouteId) -> Result<(), RepositoryError> {
        self.inner.delete_route(id)
    }

    fn routes(&self) -> Result<Vec<Route>, RepositoryError> {
        self.inner.routes()
    }
}

/// Every call fails as if the database were offline.
pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl FleetStore for UnavailableStore {
    fn insert_vehicle(&self, _vehicle: Vehicle) -> Result<Vehicle, RepositoryError> {
        offline()
    }

    fn update_vehicle(&self, _vehicle: Vehicle) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_vehicle(&self, _id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        offline()
    }

    fn insert_truck(&self, _truck: Truck) -> Result<Truck, RepositoryError> {
        offline()
    }

    fn update_truck(&self, _truck: Truck) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_truck(&self, _id: &TruckId) -> Result<Option<Truck>, RepositoryError> {
        offline()
    }

    fn delete_truck(&self, _id: &TruckId) -> Result<(), RepositoryError> {
        offline()
    }

    fn insert_job(&self, _job: TransportJob) -> Result<TransportJob, RepositoryError> {
        offline()
    }

    fn update_job(&self, _job: TransportJob) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_job(&self, _id: &JobId) -> Result<Option<TransportJob>, RepositoryError> {
        offline()
    }

    fn delete_job(&self, _id: &JobId) -> Result<(), RepositoryError> {
        offline()
    }

    fn jobs(&self) -> Result<Vec<TransportJob>, RepositoryError> {
        offline()
    }

    fn insert_route(&self, _route: Route) -> Result<Route, RepositoryError> {
        offline()
    }

    fn update_route(&self, _route: Route) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_route(&self, _id: &RouteId) -> Result<Option<Route>, RepositoryError> {
        offline()
    }

    fn delete_route(&self, _id: &RouteId) -> Result<(), RepositoryError> {
        offline()
    }

    fn routes(&self) -> Result<Vec<Route>, RepositoryError> {
        offline()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
