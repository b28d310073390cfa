use dmarq_domain::{ReportFilter, SavedFilter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Incoming saved-filter payload; the filter body is raw and normalized
/// server-side.
#[derive(Debug, Deserialize)]
pub struct SaveFilterRequest {
    pub name: String,
    #[serde(default)]
    pub filter: Map<String, Value>,
}

/// API representation of one saved filter.
#[derive(Debug, Serialize)]
pub struct SavedFilterResponse {
    pub id: Uuid,
    pub name: String,
    pub filter: ReportFilter,
}

impl From<SavedFilter> for SavedFilterResponse {
    fn from(value: SavedFilter) -> Self {
        Self {
            id: value.id(),
            name: value.name().as_str().to_owned(),
            filter: value.filter().clone(),
        }
    }
}
