use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::registry::{GenerationId, RegistrySnapshot};
use crate::reload::ReloadReport;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub generation: GenerationId,
    pub draining: Vec<GenerationId>,
    pub reload: ReloadReport,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        generation: state.registry.current().id(),
        draining: state.registry.draining(),
        reload: state.reports.borrow().clone(),
    })
}

pub async fn get_routing_objects(State(state): State<AdminState>) -> Json<RegistrySnapshot> {
    Json(state.registry.snapshot())
}
