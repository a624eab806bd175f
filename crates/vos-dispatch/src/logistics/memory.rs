use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    JobId, Route, RouteId, TransportJob, Truck, TruckId, Vehicle, VehicleId,
};
use super::repository::{FleetStore, RepositoryError};

#[derive(Debug, Default)]
struct Tables {
    vehicles: HashMap<VehicleId, Vehicle>,
    trucks: HashMap<TruckId, Truck>,
    jobs: HashMap<JobId, TransportJob>,
    routes: HashMap<RouteId, Route>,
}

/// Process-local store used by the API binary and the test suites.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn insert<K, V>(table: &mut HashMap<K, V>, key: K, value: V) -> Result<V, RepositoryError>
where
    K: Eq + Hash,
    V: Clone,
{
    if table.contains_key(&key) {
        return Err(RepositoryError::Conflict);
    }
    table.insert(key, value.clone());
    Ok(value)
}

fn update<K, V>(table: &mut HashMap<K, V>, key: K, value: V) -> Result<(), RepositoryError>
where
    K: Eq + Hash,
{
    match table.get_mut(&key) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(RepositoryError::NotFound),
    }
}

fn remove<K, V>(table: &mut HashMap<K, V>, key: &K) -> Result<(), RepositoryError>
where
    K: Eq + Hash,
{
    table
        .remove(key)
        .map(|_| ())
        .ok_or(RepositoryError::NotFound)
}

impl FleetStore for MemoryStore {
    fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Vehicle, RepositoryError> {
        insert(&mut self.lock()?.vehicles, vehicle.id.clone(), vehicle)
    }

    fn update_vehicle(&self, vehicle: Vehicle) -> Result<(), RepositoryError> {
        update(&mut self.lock()?.vehicles, vehicle.id.clone(), vehicle)
    }

    fn fetch_vehicle(&self, id: &VehicleId) -> Result<Option<Vehicle>, RepositoryError> {
        Ok(self.lock()?.vehicles.get(id).cloned())
    }

    fn insert_truck(&self, truck: Truck) -> Result<Truck, RepositoryError> {
        insert(&mut self.lock()?.trucks, truck.id.clone(), truck)
    }

    fn update_truck(&self, truck: Truck) -> Result<(), RepositoryError> {
        update(&mut self.lock()?.trucks, truck.id.clone(), truck)
    }

    fn fetch_truck(&self, id: &TruckId) -> Result<Option<Truck>, RepositoryError> {
        Ok(self.lock()?.trucks.get(id).cloned())
    }

    fn delete_truck(&self, id: &TruckId) -> Result<(), RepositoryError> {
        remove(&mut self.lock()?.trucks, id)
    }

    fn insert_job(&self, job: TransportJob) -> Result<TransportJob, RepositoryError> {
        insert(&mut self.lock()?.jobs, job.id.clone(), job)
    }

    fn update_job(&self, job: TransportJob) -> Result<(), RepositoryError> {
        update(&mut self.lock()?.jobs, job.id.clone(), job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<TransportJob>, RepositoryError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    fn delete_job(&self, id: &JobId) -> Result<(), RepositoryError> {
        remove(&mut self.lock()?.jobs, id)
    }

    fn jobs(&self) -> Result<Vec<TransportJob>, RepositoryError> {
        let mut jobs: Vec<TransportJob> = self.lock()?.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn insert_route(&self, route: Route) -> Result<Route, RepositoryError> {
        insert(&mut self.lock()?.routes, route.id.clone(), route)
    }

    fn update_route(&self, route: Route) -> Result<(), RepositoryError> {
        update(&mut self.lock()?.routes, route.id.clone(), route)
    }

    fn fetch_route(&self, id: &RouteId) -> Result<Option<Route>, RepositoryError> {
        Ok(self.lock()?.routes.get(id).cloned())
    }

    fn delete_route(&self, id: &RouteId) -> Result<(), RepositoryError> {
        remove(&mut self.lock()?.routes, id)
    }

    fn routes(&self) -> Result<Vec<Route>, RepositoryError> {
        let mut routes: Vec<Route> = self.lock()?.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(routes)
    }
}
