use clap::{Args, ValueEnum};
use std::sync::Arc;
use vos_dispatch::error::AppError;
use vos_dispatch::logistics::{
    status_catalog, Assignment, Carrier, DispatchMode, DispatchService, DriverId,
    HandoffSubmission, JobDraft, MemoryStore, RouteDraft, RouteStatus, StatusChange, Stop,
    StopStatus, StopType, StopUpdate, TransitionReport, TruckCapacity, TruckDraft, VehicleDraft,
    VehicleId,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Which dispatch variant to walk through
    #[arg(long, value_enum, default_value_t = DemoVariant::Route)]
    pub(crate) variant: DemoVariant,
    /// Print each transition report as JSON instead of a summary line per change
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoVariant {
    /// Two vehicles hauled on one multi-stop route
    Route,
    /// One vehicle assigned straight to a driver and truck
    Direct,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mode = match args.variant {
        DemoVariant::Route => DispatchMode::Routed,
        DemoVariant::Direct => DispatchMode::Direct,
    };
    let service = DispatchService::new(Arc::new(MemoryStore::default()), mode);
    let printer = ReportPrinter { json: args.json };

    println!("Vehicle transport dispatch demo ({:?} mode)", mode);
    match args.variant {
        DemoVariant::Route => route_walkthrough(&service, &printer),
        DemoVariant::Direct => direct_walkthrough(&service, &printer),
    }
}

pub(crate) fn print_status_catalog() -> Result<(), AppError> {
    for (entity, view) in status_catalog() {
        println!("{entity}");
        for value in &view.values {
            let label = view.labels.get(value).copied().unwrap_or(*value);
            println!("  {value:<28} {label}");
        }
    }
    Ok(())
}

fn route_walkthrough(
    service: &DispatchService<MemoryStore>,
    printer: &ReportPrinter,
) -> Result<(), AppError> {
    let truck = service.register_truck(demo_truck("T-114"))?;
    println!("\nRegistered truck {} ({})", truck.id, truck.status);

    let mut jobs = Vec::new();
    for (vin, make, model) in [
        ("1FTEW1EP5JFA10001", "Ford", "F-150"),
        ("3GCUKREC8JG200002", "Chevrolet", "Silverado"),
    ] {
        let vehicle = service.register_vehicle(demo_vehicle(vin, make, model))?;
        let intake = service.record_intake(&vehicle.id)?;
        printer.print(&format!("Intake for {make} {model}"), &intake.transitions);

        let job = service.create_job(demo_job(&vehicle.id))?;
        printer.print(
            &format!("Created job {}", job.record.job_number),
            &job.transitions,
        );
        jobs.push(job.record);
    }

    let job_ids: Vec<_> = jobs.iter().map(|job| job.id.clone()).collect();
    let pickups = job_ids
        .iter()
        .map(|id| Stop::new(StopType::Pickup, Some(id.clone()), 0));
    let lunch = std::iter::once(Stop::new(StopType::Break, None, 0));
    let drops = job_ids
        .iter()
        .map(|id| Stop::new(StopType::Drop, Some(id.clone()), 0));
    let route = service.create_route(RouteDraft {
        driver_id: demo_driver(),
        truck_id: truck.id.clone(),
        planned_start: None,
        planned_end: None,
        selected_transport_jobs: job_ids.clone(),
        stops: pickups.chain(lunch).chain(drops).collect(),
    })?;
    printer.print(
        &format!(
            "Created route {} with {} stops",
            route.record.route_number,
            route.record.stops.len()
        ),
        &route.transitions,
    );

    let started = service.change_route_status(&route.record.id, RouteStatus::InProgress)?;
    printer.print("Driver started the route", &started.transitions);

    for stop in &route.record.stops {
        let updated = service.update_stop(
            &route.record.id,
            stop.sequence,
            StopUpdate {
                status: Some(StopStatus::Completed),
                notes: Some(format!("{} done", stop.stop_type)),
                ..StopUpdate::default()
            },
        )?;
        printer.print(
            &format!("Completed stop {} ({})", stop.sequence, stop.stop_type),
            &updated.transitions,
        );
    }

    let finished = service.route(&route.record.id)?;
    let truck = service.truck(&truck.id)?;
    println!(
        "\nRoute {} is {}; truck {} is {}",
        finished.route_number, finished.status, truck.id, truck.status
    );
    Ok(())
}

fn direct_walkthrough(
    service: &DispatchService<MemoryStore>,
    printer: &ReportPrinter,
) -> Result<(), AppError> {
    let truck = service.register_truck(demo_truck("T-207"))?;
    let vehicle = service.register_vehicle(demo_vehicle(
        "5YJ3E1EA7KF300003",
        "Tesla",
        "Model 3",
    ))?;
    let intake = service.record_intake(&vehicle.id)?;
    printer.print("Intake completed", &intake.transitions);

    let job = service.create_job(demo_job(&vehicle.id))?;
    printer.print(
        &format!("Created job {}", job.record.job_number),
        &job.transitions,
    );

    let assigned = service.assign_job(
        &job.record.id,
        Assignment {
            driver_id: demo_driver(),
            truck_id: truck.id.clone(),
        },
    )?;
    printer.print("Assigned driver and truck", &assigned.transitions);

    let picked_up = service.record_pickup(&job.record.id, HandoffSubmission::default())?;
    printer.print("Pickup recorded", &picked_up.transitions);

    let delivered = service.record_delivery(
        &job.record.id,
        HandoffSubmission {
            notes: Some("Keys left with lot attendant".to_string()),
            ..HandoffSubmission::default()
        },
    )?;
    printer.print("Delivery recorded", &delivered.transitions);

    let vehicle = service.vehicle(&vehicle.id)?;
    let truck = service.truck(&truck.id)?;
    println!(
        "\nJob {} is {}; vehicle is {}; truck is {}",
        delivered.record.job_number, delivered.record.status, vehicle.status, truck.status
    );
    Ok(())
}

struct ReportPrinter {
    json: bool,
}

impl ReportPrinter {
    fn print(&self, heading: &str, report: &TransitionReport) {
        println!("\n{heading} [{}]", report.event);
        if self.json {
            match serde_json::to_string_pretty(report) {
                Ok(json) => println!("{json}"),
                Err(err) => println!("  report unavailable: {err}"),
            }
            return;
        }

        if report.is_noop() {
            println!("  no status changes");
        }
        for change in &report.changes {
            println!("  - {}", describe(change));
        }
        for failure in &report.failures {
            println!(
                "  ! skipped {} {}: {}",
                failure.entity, failure.id, failure.reason
            );
        }
    }
}

fn describe(change: &StatusChange) -> String {
    match change {
        StatusChange::Vehicle { id, from, to } => format!("vehicle {id}: {from} -> {to}"),
        StatusChange::Truck { id, from, to } => format!("truck {id}: {from} -> {to}"),
        StatusChange::TransportJob { id, from, to } => format!("job {id}: {from} -> {to}"),
        StatusChange::Route { id, from, to } => format!("route {id}: {from} -> {to}"),
        StatusChange::Stop {
            route_id,
            sequence,
            from,
            to,
        } => format!("route {route_id} stop {sequence}: {from} -> {to}"),
    }
}

fn demo_driver() -> DriverId {
    DriverId::from("driver-demo")
}

fn demo_truck(number: &str) -> TruckDraft {
    TruckDraft {
        truck_number: Some(number.to_string()),
        license_plate: Some(format!("TX-{number}")),
        capacity: TruckCapacity::Double,
        ..TruckDraft::default()
    }
}

fn demo_vehicle(vin: &str, make: &str, model: &str) -> VehicleDraft {
    VehicleDraft {
        vin: Some(vin.to_string()),
        make: Some(make.to_string()),
        model: Some(model.to_string()),
        purchase_source: Some("Manheim Dallas".to_string()),
        ..VehicleDraft::default()
    }
}

fn demo_job(vehicle_id: &VehicleId) -> JobDraft {
    JobDraft {
        vehicle_id: vehicle_id.clone(),
        carrier: Carrier::Ptg,
        planned_pickup: None,
        planned_delivery: None,
        notes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vos_dispatch::logistics::{JobStatus, TruckStatus};

    #[test]
    fn route_walkthrough_leaves_the_fleet_settled() {
        let store = Arc::new(MemoryStore::default());
        let service = DispatchService::new(store, DispatchMode::Routed);
        route_walkthrough(&service, &ReportPrinter { json: false }).expect("walkthrough runs");

        let routes = service.routes().expect("routes listed");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].status, RouteStatus::Completed);
        let jobs = service.jobs().expect("jobs listed");
        assert!(jobs.iter().all(|job| job.status == JobStatus::Delivered));
        let truck = service.truck(&routes[0].truck_id).expect("truck exists");
        assert_eq!(truck.status, TruckStatus::Available);
    }

    #[test]
    fn direct_walkthrough_delivers_the_job() {
        let store = Arc::new(MemoryStore::default());
        let service = DispatchService::new(store, DispatchMode::Direct);
        direct_walkthrough(&service, &ReportPrinter { json: true }).expect("walkthrough runs");

        let jobs = service.jobs().expect("jobs listed");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Delivered);
    }
}
