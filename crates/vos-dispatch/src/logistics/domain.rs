use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{
    Carrier, JobStatus, RouteStatus, StopStatus, StopType, TruckCapacity, TruckStatus,
    VehicleStatus,
};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

entity_id!(VehicleId);
entity_id!(TruckId);
entity_id!(JobId);
entity_id!(RouteId);
entity_id!(
    /// Weak reference to a driver-role user; users live outside the dispatch store.
    DriverId
);

/// Pickup or drop site as captured at vehicle intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub window_start: Option<NaiveDate>,
    #[serde(default)]
    pub window_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub vin: Option<String>,
    pub year: Option<u16>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub purchase_source: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub buyer_name: Option<String>,
    pub pickup: Site,
    pub drop: Site,
    pub twic_required: bool,
    pub status: VehicleStatus,
    pub transport_job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller supplied fields for a new vehicle record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleDraft {
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub purchase_source: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub pickup: Site,
    #[serde(default)]
    pub drop: Site,
    #[serde(default)]
    pub twic_required: bool,
}

impl Vehicle {
    pub fn from_draft(id: VehicleId, draft: VehicleDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            vin: draft.vin.map(|vin| vin.trim().to_ascii_uppercase()),
            year: draft.year,
            make: draft.make,
            model: draft.model,
            purchase_source: draft.purchase_source,
            purchase_date: draft.purchase_date,
            purchase_price: draft.purchase_price,
            buyer_name: draft.buyer_name,
            pickup: draft.pickup,
            drop: draft.drop,
            twic_required: draft.twic_required,
            status: VehicleStatus::PurchasedIntakeNeeded,
            transport_job_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truck {
    pub id: TruckId,
    pub truck_number: Option<String>,
    pub license_plate: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
    pub capacity: TruckCapacity,
    pub status: TruckStatus,
    pub current_driver: Option<DriverId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TruckDraft {
    #[serde(default)]
    pub truck_number: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub capacity: TruckCapacity,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Truck {
    pub fn from_draft(id: TruckId, draft: TruckDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            truck_number: draft.truck_number,
            license_plate: draft.license_plate,
            make: draft.make,
            model: draft.model,
            year: draft.year,
            capacity: draft.capacity,
            status: TruckStatus::Available,
            current_driver: None,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One line of a pickup, delivery, or stop checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChecklistItem {
    pub fn unchecked(item: &str) -> Self {
        Self {
            item: item.to_string(),
            checked: false,
            notes: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Photo evidence captured at a pickup, drop, or stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub url: String,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportJob {
    pub id: JobId,
    pub job_number: String,
    pub vehicle_id: VehicleId,
    pub status: JobStatus,
    pub carrier: Carrier,
    pub driver_id: Option<DriverId>,
    pub truck_id: Option<TruckId>,
    pub route_id: Option<RouteId>,
    pub planned_pickup: Option<DateTime<Utc>>,
    pub planned_delivery: Option<DateTime<Utc>>,
    pub actual_pickup: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub pickup_checklist: Vec<ChecklistItem>,
    pub delivery_checklist: Vec<ChecklistItem>,
    pub pickup_photos: Vec<Photo>,
    pub delivery_photos: Vec<Photo>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDraft {
    pub vehicle_id: VehicleId,
    #[serde(default)]
    pub carrier: Carrier,
    #[serde(default)]
    pub planned_pickup: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransportJob {
    pub fn from_draft(id: JobId, job_number: String, draft: JobDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_number,
            vehicle_id: draft.vehicle_id,
            status: JobStatus::NeedsDispatch,
            carrier: draft.carrier,
            driver_id: None,
            truck_id: None,
            route_id: None,
            planned_pickup: draft.planned_pickup,
            planned_delivery: draft.planned_delivery,
            actual_pickup: None,
            actual_delivery: None,
            pickup_checklist: Vec::new(),
            delivery_checklist: Vec::new(),
            pickup_photos: Vec::new(),
            delivery_photos: Vec::new(),
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Photos, checklist, and notes a driver submits at a direct-assignment pickup or delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandoffSubmission {
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Scheduled event inside a route; stops exist only as part of their route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_type: StopType,
    #[serde(default)]
    pub transport_job_id: Option<JobId>,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub location: Option<StopLocation>,
    #[serde(default)]
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "pending_stop")]
    pub status: StopStatus,
}

fn pending_stop() -> StopStatus {
    StopStatus::Pending
}

impl Stop {
    pub fn new(stop_type: StopType, transport_job_id: Option<JobId>, sequence: u32) -> Self {
        Self {
            stop_type,
            transport_job_id,
            sequence,
            location: None,
            scheduled_date: None,
            actual_date: None,
            photos: Vec::new(),
            checklist: Vec::new(),
            notes: None,
            status: StopStatus::Pending,
        }
    }

    pub fn serves(&self, job_id: &JobId) -> bool {
        self.transport_job_id.as_ref() == Some(job_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub route_number: String,
    pub driver_id: DriverId,
    pub truck_id: TruckId,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub selected_transport_jobs: Vec<JobId>,
    pub stops: Vec<Stop>,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    /// Jobs the route touches: the selection list plus every job named by a stop.
    pub fn referenced_jobs(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = Vec::new();
        let from_stops = self
            .stops
            .iter()
            .filter_map(|stop| stop.transport_job_id.as_ref());
        for job_id in self.selected_transport_jobs.iter().chain(from_stops) {
            if !jobs.contains(job_id) {
                jobs.push(job_id.clone());
            }
        }
        jobs
    }

    pub fn stop_by_sequence(&self, sequence: u32) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.sequence == sequence)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteDraft {
    pub driver_id: DriverId,
    pub truck_id: TruckId,
    #[serde(default)]
    pub planned_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub selected_transport_jobs: Vec<JobId>,
    #[serde(default)]
    pub stops: Vec<Stop>,
}

/// Replacement job selection and stop list for a live route. Truck, driver and planned
/// times are only changed when given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutePlan {
    #[serde(default)]
    pub selected_transport_jobs: Vec<JobId>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub truck_id: Option<TruckId>,
    #[serde(default)]
    pub driver_id: Option<DriverId>,
    #[serde(default)]
    pub planned_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_end: Option<DateTime<Utc>>,
}

/// Driver-editable fields of a single stop.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopUpdate {
    #[serde(default)]
    pub status: Option<StopStatus>,
    #[serde(default)]
    pub actual_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photos: Option<Vec<Photo>>,
    #[serde(default)]
    pub notes: Option<String>,
}
