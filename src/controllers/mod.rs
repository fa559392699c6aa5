pub mod hunter;
pub mod matrimony;

use mongodb::bson::Document;

use crate::error::{ApiError, Result};

/// Strips fields a client must never overwrite and refuses an empty update.
fn settable(mut body: Document, protected: &[&str]) -> Result<Document> {
    for field in protected {
        body.remove(*field);
    }
    if body.is_empty() {
        return Err(ApiError::InvalidParameter(
            "update body has no fields".to_string(),
        ));
    }
    Ok(body)
}
