use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_NORMAL: &str = "NormalUser";

pub const STATUS_REQUESTED: &str = "Requested";
pub const STATUS_VERIFIED: &str = "Verified";
/// Terminal order status; approved orders can no longer be cancelled.
pub const STATUS_APPROVED: &str = "Approve";

pub const TYPE_PREMIUM: &str = "premium";

/// Claims carried by the session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessQuery {
    pub sort_order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub transaction_id: String,
    pub amount: f64,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct Acknowledgement {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Acknowledgement {
    pub fn success() -> Self {
        Acknowledgement {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: &str) -> Self {
        Acknowledgement {
            success: true,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub admin: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_biodata: u64,
    pub male_biodata_count: u64,
    pub female_biodata_count: u64,
    pub premium_biodata_count: u64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub acknowledged: bool,
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

/// Parses a path segment into a store record id.
pub fn object_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| ApiError::InvalidParameter(format!("malformed id {}", id)))
}

/// Renders a stored document as relaxed extended JSON.
pub fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

pub fn to_json_list(documents: Vec<Document>) -> Vec<Value> {
    documents.into_iter().map(to_json).collect()
}

/// Reads a numeric field regardless of how the driver stored it.
pub fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
