use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User reference as returned by the identity collaborator.
/// Identity storage lives outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: String,
}
