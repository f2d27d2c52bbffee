use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use log::warn;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::directory::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::marks::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }

    warn!(
        "event=request_failed module=router method={} status=404 code=not_implemented",
        req.method
    );
    err(
        &req.id,
        404,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
