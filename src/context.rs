use std::sync::Arc;

use crate::error::Result;
use crate::payment::PaymentGateway;
use crate::store::{Collection, Sequence};

pub const BIKES: &str = "bikes";

pub const USERS: &str = "users";
pub const BIODATA: &str = "biodata";
pub const FAVOURITES: &str = "favourites";
pub const ORDERS: &str = "data";
pub const SUCCESS: &str = "success";
pub const PAYMENTS: &str = "save-payment-info";
pub const COUNTERS: &str = "counters";

/// Field holding the human-readable sequential biodata number.
pub const BIODATA_ID: &str = "biodataId";

/// Store handles of the bike marketplace, built once at startup.
pub struct HunterContext {
    pub bikes: Arc<dyn Collection>,
}

impl HunterContext {
    pub fn new<F>(open: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn Collection>,
    {
        HunterContext { bikes: open(BIKES) }
    }
}

/// Store handles and collaborators of the matrimony service, built once at startup and
/// shared read-only by every request.
pub struct MatrimonyContext {
    pub users: Arc<dyn Collection>,
    pub biodata: Arc<dyn Collection>,
    pub favourites: Arc<dyn Collection>,
    pub orders: Arc<dyn Collection>,
    pub success: Arc<dyn Collection>,
    pub payments: Arc<dyn Collection>,
    pub biodata_ids: Sequence,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl MatrimonyContext {
    pub fn new<F>(open: F, gateway: Arc<dyn PaymentGateway>) -> Self
    where
        F: Fn(&str) -> Arc<dyn Collection>,
    {
        MatrimonyContext {
            users: open(USERS),
            biodata: open(BIODATA),
            favourites: open(FAVOURITES),
            orders: open(ORDERS),
            success: open(SUCCESS),
            payments: open(PAYMENTS),
            biodata_ids: Sequence::new(open(COUNTERS), BIODATA_ID),
            gateway,
        }
    }

    /// Brings the biodata counter up to date with records already in the store.
    pub async fn prepare(&self) -> Result<()> {
        self.biodata_ids
            .seed_from(self.biodata.as_ref(), BIODATA_ID)
            .await?;
        Ok(())
    }
}
