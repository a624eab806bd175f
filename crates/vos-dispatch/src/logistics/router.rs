use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    HandoffSubmission, JobDraft, JobId, RouteDraft, RouteId, RoutePlan, StopUpdate, TruckDraft,
    TruckId, VehicleDraft, VehicleId,
};
use super::engine::EngineError;
use super::repository::{FleetStore, RepositoryError};
use super::service::{Assignment, DispatchService, DispatchServiceError};
use super::status::{status_catalog, RouteStatus};

type SharedService<S> = State<Arc<DispatchService<S>>>;

/// Router builder exposing the dispatch endpoints under `/api/v1`.
pub fn dispatch_router<S>(service: Arc<DispatchService<S>>) -> Router
where
    S: FleetStore + 'static,
{
    Router::new()
        .route("/api/v1/status/enums", get(catalog_handler))
        .route("/api/v1/vehicles", post(register_vehicle_handler::<S>))
        .route("/api/v1/vehicles/:vehicle_id", get(vehicle_handler::<S>))
        .route(
            "/api/v1/vehicles/:vehicle_id/intake",
            post(intake_handler::<S>),
        )
        .route("/api/v1/trucks", post(register_truck_handler::<S>))
        .route(
            "/api/v1/trucks/:truck_id",
            get(truck_handler::<S>).delete(delete_truck_handler::<S>),
        )
        .route(
            "/api/v1/transport-jobs",
            get(list_jobs_handler::<S>).post(create_job_handler::<S>),
        )
        .route(
            "/api/v1/transport-jobs/:job_id",
            get(job_handler::<S>).delete(delete_job_handler::<S>),
        )
        .route(
            "/api/v1/transport-jobs/:job_id/assign",
            post(assign_job_handler::<S>),
        )
        .route(
            "/api/v1/transport-jobs/:job_id/pickup",
            post(pickup_handler::<S>),
        )
        .route(
            "/api/v1/transport-jobs/:job_id/delivery",
            post(delivery_handler::<S>),
        )
        .route(
            "/api/v1/routes",
            get(list_routes_handler::<S>).post(create_route_handler::<S>),
        )
        .route(
            "/api/v1/routes/:route_id",
            get(route_handler::<S>)
                .put(replan_route_handler::<S>)
                .delete(delete_route_handler::<S>),
        )
        .route(
            "/api/v1/routes/:route_id/status",
            put(route_status_handler::<S>),
        )
        .route(
            "/api/v1/routes/:route_id/stops/:sequence",
            put(update_stop_handler::<S>),
        )
        .route(
            "/api/v1/routes/:route_id/jobs/:job_id",
            delete(remove_route_job_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RouteStatusChange {
    pub status: RouteStatus,
}

fn status_for(error: &DispatchServiceError) -> StatusCode {
    match error {
        DispatchServiceError::NotFound { .. }
        | DispatchServiceError::Engine(EngineError::NotFound { .. })
        | DispatchServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        DispatchServiceError::Engine(EngineError::InvalidTransition(_))
        | DispatchServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        DispatchServiceError::StopPlan(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchServiceError::Engine(EngineError::Persistence { .. })
        | DispatchServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn failure(error: DispatchServiceError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        error!(%error, "dispatch request failed");
    }
    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, DispatchServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn catalog_handler() -> Response {
    (StatusCode::OK, Json(status_catalog())).into_response()
}

pub(crate) async fn register_vehicle_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Json(draft): Json<VehicleDraft>,
) -> Response {
    respond(StatusCode::CREATED, service.register_vehicle(draft))
}

pub(crate) async fn vehicle_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(vehicle_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.vehicle(&VehicleId(vehicle_id)))
}

pub(crate) async fn intake_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(vehicle_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.record_intake(&VehicleId(vehicle_id)))
}

pub(crate) async fn register_truck_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Json(draft): Json<TruckDraft>,
) -> Response {
    respond(StatusCode::CREATED, service.register_truck(draft))
}

pub(crate) async fn truck_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(truck_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.truck(&TruckId(truck_id)))
}

pub(crate) async fn delete_truck_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(truck_id): Path<String>,
) -> Response {
    match service.delete_truck(&TruckId(truck_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn list_jobs_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
) -> Response {
    respond(StatusCode::OK, service.jobs())
}

pub(crate) async fn create_job_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Json(draft): Json<JobDraft>,
) -> Response {
    respond(StatusCode::CREATED, service.create_job(draft))
}

pub(crate) async fn job_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(job_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.job(&JobId(job_id)))
}

pub(crate) async fn delete_job_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(job_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.delete_job(&JobId(job_id)))
}

pub(crate) async fn assign_job_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(job_id): Path<String>,
    Json(assignment): Json<Assignment>,
) -> Response {
    respond(StatusCode::OK, service.assign_job(&JobId(job_id), assignment))
}

pub(crate) async fn pickup_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(job_id): Path<String>,
    Json(submission): Json<HandoffSubmission>,
) -> Response {
    respond(StatusCode::OK, service.record_pickup(&JobId(job_id), submission))
}

pub(crate) async fn delivery_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(job_id): Path<String>,
    Json(submission): Json<HandoffSubmission>,
) -> Response {
    respond(
        StatusCode::OK,
        service.record_delivery(&JobId(job_id), submission),
    )
}

pub(crate) async fn list_routes_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
) -> Response {
    respond(StatusCode::OK, service.routes())
}

pub(crate) async fn create_route_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Json(draft): Json<RouteDraft>,
) -> Response {
    respond(StatusCode::CREATED, service.create_route(draft))
}

pub(crate) async fn route_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(route_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.route(&RouteId(route_id)))
}

pub(crate) async fn replan_route_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(route_id): Path<String>,
    Json(plan): Json<RoutePlan>,
) -> Response {
    respond(StatusCode::OK, service.replan_route(&RouteId(route_id), plan))
}

pub(crate) async fn delete_route_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(route_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.delete_route(&RouteId(route_id)))
}

pub(crate) async fn route_status_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path(route_id): Path<String>,
    Json(change): Json<RouteStatusChange>,
) -> Response {
    respond(
        StatusCode::OK,
        service.change_route_status(&RouteId(route_id), change.status),
    )
}

pub(crate) async fn update_stop_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path((route_id, sequence)): Path<(String, u32)>,
    Json(update): Json<StopUpdate>,
) -> Response {
    respond(
        StatusCode::OK,
        service.update_stop(&RouteId(route_id), sequence, update),
    )
}

pub(crate) async fn remove_route_job_handler<S: FleetStore + 'static>(
    State(service): SharedService<S>,
    Path((route_id, job_id)): Path<(String, String)>,
) -> Response {
    respond(
        StatusCode::OK,
        service.remove_job_from_route(&RouteId(route_id), &JobId(job_id)),
    )
}
