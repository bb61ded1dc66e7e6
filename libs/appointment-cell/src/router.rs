use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use confirmation_queue_cell::FanOutRouter;
use shared_config::AppConfig;
use shared_database::AppointmentStore;

use crate::handlers;
use crate::openapi;
use crate::services::{AppointmentCreationService, AppointmentQueryService};

pub struct AppointmentState {
    pub creation: AppointmentCreationService,
    pub query: AppointmentQueryService,
}

impl AppointmentState {
    pub fn new(config: &AppConfig, store: Arc<dyn AppointmentStore>, router: FanOutRouter) -> Self {
        Self {
            creation: AppointmentCreationService::new(Arc::clone(&store), router, config),
            query: AppointmentQueryService::new(store, config),
        }
    }
}

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route(
            "/appointment",
            post(handlers::create_appointment)
                .get(handlers::missing_insured_id)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/appointment/",
            get(handlers::missing_insured_id).fallback(handlers::method_not_allowed),
        )
        .route(
            "/appointment/{insured_id}",
            get(handlers::list_appointments).fallback(handlers::method_not_allowed),
        )
        .route("/api-docs/openapi.json", get(openapi::get_openapi_json))
        .with_state(state)
}
