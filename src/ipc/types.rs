use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Institution domain, resolved by the host's authentication layer.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Authenticated user; only logged.
    #[serde(default)]
    pub caller: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
