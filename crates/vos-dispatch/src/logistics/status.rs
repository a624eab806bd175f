//! Closed status vocabularies for every dispatch entity.
//!
//! Each vocabulary serializes to a stable snake_case wire value and carries the display label
//! shown to dispatchers. Parsing accepts either form, so values are validated once at the
//! boundary and flow through the engine as enums.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shared surface of the status enumerations, used to build the lookup catalog.
pub trait Vocabulary: Copy + Sized + 'static {
    /// Catalog key for the entity type the vocabulary belongs to.
    const ENTITY: &'static str;

    fn all() -> &'static [Self];
    fn as_str(self) -> &'static str;
    fn label(self) -> &'static str;
}

/// A value that does not belong to the vocabulary it was parsed against.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {entity} value")]
pub struct UnknownStatus {
    pub entity: &'static str,
    pub value: String,
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $entity:literal {
            $( $(#[$vmeta:meta])* $variant:ident => ($wire:literal, $label:literal), )+
        }
        $( legacy { $( $alias:literal => $target:ident, )+ } )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }

            pub const fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl Vocabulary for $name {
            const ENTITY: &'static str = $entity;

            fn all() -> &'static [Self] {
                Self::ALL
            }

            fn as_str(self) -> &'static str {
                $name::as_str(self)
            }

            fn label(self) -> &'static str {
                $name::label(self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let value = raw.trim();
                $( $(
                    if value.eq_ignore_ascii_case($alias) {
                        return Ok(Self::$target);
                    }
                )+ )?
                parse_vocabulary(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fn parse_vocabulary<T: Vocabulary>(value: &str) -> Result<T, UnknownStatus> {
    T::all()
        .iter()
        .copied()
        .find(|candidate| {
            candidate.as_str().eq_ignore_ascii_case(value)
                || candidate.label().eq_ignore_ascii_case(value)
        })
        .ok_or_else(|| UnknownStatus {
            entity: T::ENTITY,
            value: value.to_string(),
        })
}

vocabulary! {
    /// Lifecycle of a purchased vehicle from intake to delivery.
    pub enum VehicleStatus as "vehicle" {
        PurchasedIntakeNeeded => ("purchased_intake_needed", "Purchased – Intake Needed"),
        IntakeCompleted => ("intake_completed", "Intake Completed"),
        ReadyForTransport => ("ready_for_transport", "Ready for Transport"),
        InTransport => ("in_transport", "In Transport"),
        Delivered => ("delivered", "Delivered"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

vocabulary! {
    pub enum TruckStatus as "truck" {
        Available => ("available", "Available"),
        InUse => ("in_use", "In Use"),
        Maintenance => ("maintenance", "Maintenance"),
        OutOfService => ("out_of_service", "Out of Service"),
    }
}

vocabulary! {
    /// Canonical transport job vocabulary.
    ///
    /// The direct-assignment flow historically used `Pending / In Progress / Completed`; those
    /// spellings are migrated onto the canonical values when parsed and never stored.
    pub enum JobStatus as "transportJob" {
        NeedsDispatch => ("needs_dispatch", "Needs Dispatch"),
        Dispatched => ("dispatched", "Dispatched"),
        InTransit => ("in_transit", "In Transit"),
        Delivered => ("delivered", "Delivered"),
        Cancelled => ("cancelled", "Cancelled"),
        Exception => ("exception", "Exception"),
    }
    legacy {
        "pending" => NeedsDispatch,
        "in_progress" => InTransit,
        "in progress" => InTransit,
        "inprogress" => InTransit,
        "completed" => Delivered,
    }
}

vocabulary! {
    pub enum RouteStatus as "route" {
        Planned => ("planned", "Planned"),
        InProgress => ("in_progress", "In Progress"),
        Completed => ("completed", "Completed"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

vocabulary! {
    pub enum StopStatus as "routeStop" {
        Pending => ("pending", "Pending"),
        InProgress => ("in_progress", "In Progress"),
        Completed => ("completed", "Completed"),
        Skipped => ("skipped", "Skipped"),
    }
}

vocabulary! {
    pub enum TruckCapacity as "truckCapacity" {
        Single => ("single", "Single"),
        Double => ("double", "Double"),
        Triple => ("triple", "Triple"),
        Quad => ("quad", "Quad"),
    }
}

vocabulary! {
    pub enum StopType as "routeStopType" {
        Pickup => ("pickup", "Pickup"),
        Drop => ("drop", "Drop"),
        Break => ("break", "Break"),
        Rest => ("rest", "Rest"),
    }
}

vocabulary! {
    /// Who performs the move: the own fleet or the Central Dispatch load board.
    pub enum Carrier as "carrier" {
        Ptg => ("ptg", "PTG (Own Service)"),
        CentralDispatch => ("central_dispatch", "Central Dispatch"),
    }
}

impl JobStatus {
    /// `Delivered` is final; nothing moves a job out of it.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Delivered and cancelled jobs are left alone by cascading transitions.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether the job still counts as the vehicle's active job.
    pub const fn is_active(self) -> bool {
        !self.is_settled()
    }
}

impl StopType {
    /// Pickup and drop stops must reference a transport job; break and rest stops must not.
    pub const fn requires_job(self) -> bool {
        matches!(self, Self::Pickup | Self::Drop)
    }
}

impl Default for Carrier {
    fn default() -> Self {
        Self::Ptg
    }
}

impl Default for TruckCapacity {
    fn default() -> Self {
        Self::Single
    }
}

/// Values and display labels for one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VocabularyView {
    pub values: Vec<&'static str>,
    pub labels: BTreeMap<&'static str, &'static str>,
}

impl VocabularyView {
    pub fn of<T: Vocabulary>() -> Self {
        Self {
            values: T::all().iter().map(|value| value.as_str()).collect(),
            labels: T::all()
                .iter()
                .map(|value| (value.as_str(), value.label()))
                .collect(),
        }
    }
}

/// Read-only lookup of every vocabulary keyed by entity type.
pub fn status_catalog() -> BTreeMap<&'static str, VocabularyView> {
    fn entry<T: Vocabulary>() -> (&'static str, VocabularyView) {
        (T::ENTITY, VocabularyView::of::<T>())
    }

    BTreeMap::from([
        entry::<RouteStatus>(),
        entry::<StopStatus>(),
        entry::<JobStatus>(),
        entry::<TruckStatus>(),
        entry::<VehicleStatus>(),
        entry::<TruckCapacity>(),
        entry::<StopType>(),
        entry::<Carrier>(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_values_and_labels() {
        assert_eq!(
            "ready_for_transport".parse::<VehicleStatus>(),
            Ok(VehicleStatus::ReadyForTransport)
        );
        assert_eq!(
            "Ready for Transport".parse::<VehicleStatus>(),
            Ok(VehicleStatus::ReadyForTransport)
        );
        assert_eq!("Out of Service".parse::<TruckStatus>(), Ok(TruckStatus::OutOfService));
        assert_eq!(" drop ".parse::<StopType>(), Ok(StopType::Drop));
    }

    #[test]
    fn migrates_direct_assignment_job_spellings() {
        assert_eq!("Pending".parse::<JobStatus>(), Ok(JobStatus::NeedsDispatch));
        assert_eq!("In Progress".parse::<JobStatus>(), Ok(JobStatus::InTransit));
        assert_eq!("InProgress".parse::<JobStatus>(), Ok(JobStatus::InTransit));
        assert_eq!("Completed".parse::<JobStatus>(), Ok(JobStatus::Delivered));
        assert_eq!("Cancelled".parse::<JobStatus>(), Ok(JobStatus::Cancelled));
    }

    #[test]
    fn route_vocabulary_does_not_inherit_job_aliases() {
        assert_eq!("Completed".parse::<RouteStatus>(), Ok(RouteStatus::Completed));
        let err = "Delivered".parse::<RouteStatus>().unwrap_err();
        assert_eq!(err.entity, "route");
        assert_eq!(err.to_string(), "'Delivered' is not a valid route value");
    }

    #[test]
    fn serde_uses_wire_values_and_accepts_labels() {
        let json = serde_json::to_string(&VehicleStatus::PurchasedIntakeNeeded).unwrap();
        assert_eq!(json, "\"purchased_intake_needed\"");

        let parsed: JobStatus = serde_json::from_str("\"Needs Dispatch\"").unwrap();
        assert_eq!(parsed, JobStatus::NeedsDispatch);

        let rejected = serde_json::from_str::<TruckStatus>("\"parked\"");
        assert!(rejected.is_err());
    }

    #[test]
    fn catalog_lists_every_vocabulary_with_labels() {
        let catalog = status_catalog();
        assert_eq!(catalog.len(), 8);

        let vehicle = &catalog["vehicle"];
        assert_eq!(vehicle.values.len(), 6);
        assert_eq!(
            vehicle.labels["purchased_intake_needed"],
            "Purchased – Intake Needed"
        );

        let carrier = &catalog["carrier"];
        assert_eq!(carrier.values, vec!["ptg", "central_dispatch"]);
        assert_eq!(carrier.labels["ptg"], "PTG (Own Service)");

        assert_eq!(catalog["transportJob"].values[0], "needs_dispatch");
        assert!(catalog.contains_key("routeStopType"));
    }

    #[test]
    fn settled_jobs_are_delivered_or_cancelled() {
        assert!(JobStatus::Delivered.is_terminal());
        assert!(!JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Cancelled.is_settled());
        assert!(JobStatus::Exception.is_active());
        assert!(StopType::Pickup.requires_job());
        assert!(!StopType::Rest.requires_job());
    }
}
