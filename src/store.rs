use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use log::{error, info};
use mongodb::bson::{doc, Document};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
    UpdateOptions,
};
use mongodb::{Client, Database};
use tokio::time::timeout;

use crate::error::{ApiError, Result, StartupError};
use crate::models::{number, DeleteOutcome, InsertOutcome, UpdateOutcome};

/// Ordering and window applied to a `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindSpec {
    pub fn sorted(sort: Document) -> Self {
        FindSpec {
            sort: Some(sort),
            ..FindSpec::default()
        }
    }

    pub fn limited(limit: i64) -> Self {
        FindSpec {
            limit: Some(limit),
            ..FindSpec::default()
        }
    }
}

/// A named collection of schemaless documents.
///
/// Handlers only ever talk to this trait; the MongoDB implementation lives below and a
/// memory-backed one is used by the tests.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>>;

    async fn find_one(&self, filter: Document) -> Result<Option<Document>>;

    async fn count(&self, filter: Document) -> Result<u64>;

    async fn insert_one(&self, document: Document) -> Result<InsertOutcome>;

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Applies `update` to the first match and returns the document as it is afterwards.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>>;

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome>;

    /// Sum of a numeric field over every document; zero for an empty collection.
    async fn sum(&self, field: &str) -> Result<f64>;
}

/// Opens a client and checks the deployment answers before any route is served.
pub async fn connect(uri: &str, app_name: &str, wait: Duration) -> Result<Client, StartupError> {
    let mut client_options = ClientOptions::parse(uri).await?;
    client_options.app_name = Some(app_name.to_string());
    client_options.server_selection_timeout = Some(wait);
    client_options.connect_timeout = Some(wait);
    let client = Client::with_options(client_options)?;

    client
        .database("admin")
        .run_command(doc! { "ping": 1 }, None)
        .await?;
    info!("Connected to MongoDB as {}", app_name);

    Ok(client)
}

pub struct MongoCollection {
    inner: mongodb::Collection<Document>,
    timeout: Duration,
}

impl MongoCollection {
    pub fn new(database: &Database, name: &str, timeout: Duration) -> Self {
        MongoCollection {
            inner: database.collection::<Document>(name),
            timeout,
        }
    }

    pub fn open(database: &Database, name: &str, timeout: Duration) -> Arc<dyn Collection> {
        Arc::new(Self::new(database, name, timeout))
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = mongodb::error::Result<T>> + Send,
    {
        with_timeout(self.timeout, self.inner.name(), operation, call).await
    }
}

/// Runs a driver call, turning both a driver error and an expired `limit` into
/// [`ApiError::UpstreamUnavailable`].
async fn with_timeout<T, F>(limit: Duration, collection: &str, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = mongodb::error::Result<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result.map_err(|err| {
            error!("{} on {} failed: {}", operation, collection, err);
            ApiError::from(err)
        }),
        Err(elapsed) => {
            error!(
                "{} on {} timed out after {:?}",
                operation, collection, limit
            );
            Err(ApiError::from(elapsed))
        }
    }
}

#[async_trait]
impl Collection for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>> {
        let mut find_options = FindOptions::default();
        find_options.sort = spec.sort;
        find_options.skip = spec.skip;
        find_options.limit = spec.limit;

        self.bounded("find", async {
            let cursor = self.inner.find(filter, find_options).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        self.bounded(
            "find_one",
            self.inner.find_one(filter, FindOneOptions::default()),
        )
        .await
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        self.bounded("count", self.inner.count_documents(filter, None))
            .await
    }

    async fn insert_one(&self, document: Document) -> Result<InsertOutcome> {
        let result = self
            .bounded("insert_one", self.inner.insert_one(document, None))
            .await?;
        Ok(InsertOutcome {
            acknowledged: true,
            inserted_id: result.inserted_id,
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let mut update_options = UpdateOptions::default();
        update_options.upsert = Some(upsert);

        let result = self
            .bounded(
                "update_one",
                self.inner.update_one(filter, update, update_options),
            )
            .await?;
        Ok(UpdateOutcome {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let mut update_options = FindOneAndUpdateOptions::default();
        update_options.upsert = Some(upsert);
        update_options.return_document = Some(ReturnDocument::After);

        self.bounded(
            "find_one_and_update",
            self.inner
                .find_one_and_update(filter, update, update_options),
        )
        .await
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome> {
        let result = self
            .bounded("delete_one", self.inner.delete_one(filter, None))
            .await?;
        Ok(DeleteOutcome {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn sum(&self, field: &str) -> Result<f64> {
        let pipeline = vec![
            doc! { "$group": { "_id": null, "total": { "$sum": format!("${}", field) } } },
            doc! { "$project": { "_id": 0, "total": 1 } },
        ];

        let groups = self
            .bounded("aggregate", async {
                let cursor = self.inner.aggregate(pipeline, None).await?;
                cursor.try_collect::<Vec<_>>().await
            })
            .await?;

        Ok(groups
            .first()
            .and_then(|group| group.get("total"))
            .and_then(number)
            .unwrap_or(0.0))
    }
}

/// Monotonic counter kept as `{_id: key, seq}` in a counters collection.
///
/// `next` is a single atomic upserted `$inc`, so concurrent callers never share a value.
#[derive(Clone)]
pub struct Sequence {
    counters: Arc<dyn Collection>,
    key: &'static str,
}

impl Sequence {
    pub fn new(counters: Arc<dyn Collection>, key: &'static str) -> Self {
        Sequence { counters, key }
    }

    /// Raises the counter to the largest `field` already present in `records`.
    ///
    /// Run at startup so numbering continues after records created before the counter existed.
    pub async fn seed_from(&self, records: &dyn Collection, field: &str) -> Result<i64> {
        let mut spec = FindSpec::sorted(doc! { field: -1 });
        spec.limit = Some(1);

        let highest = records
            .find(doc! { field: { "$type": "number" } }, spec)
            .await?
            .first()
            .and_then(|record| record.get(field))
            .and_then(number)
            .map(|n| n as i64)
            .unwrap_or(0);

        self.counters
            .update_one(
                doc! { "_id": self.key },
                doc! { "$max": { "seq": highest } },
                true,
            )
            .await?;
        info!(
            "{} sequence seeded from {} (highest {})",
            self.key,
            records.name(),
            highest
        );

        Ok(highest)
    }

    pub async fn next(&self) -> Result<i64> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": self.key },
                doc! { "$inc": { "seq": 1_i64 } },
                true,
            )
            .await?;

        counter
            .as_ref()
            .and_then(|counter| counter.get("seq"))
            .and_then(number)
            .map(|n| n as i64)
            .ok_or_else(|| {
                error!("{} counter returned no value", self.key);
                ApiError::UpstreamUnavailable("sequence unavailable".to_string())
            })
    }
}
