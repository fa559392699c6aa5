use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;

use crate::error::{ApiError, Result};
use crate::models::{number, DeleteOutcome, InsertOutcome, UpdateOutcome};
use crate::payment::PaymentGateway;
use crate::store::{Collection, FindSpec};

/// In-memory collection understanding the filter and update operators the crate emits.
pub struct MemoryCollection {
    name: String,
    documents: Mutex<Vec<Document>>,
}

impl MemoryCollection {
    pub fn empty(name: &str) -> Arc<Self> {
        Self::with_documents(name, Vec::new())
    }

    /// Seeds the collection; documents without `_id` get a fresh one.
    pub fn with_documents(name: &str, documents: Vec<Document>) -> Arc<Self> {
        let documents = documents
            .into_iter()
            .map(|mut document| {
                if !document.contains_key("_id") {
                    document.insert("_id", ObjectId::new());
                }
                document
            })
            .collect();

        Arc::new(MemoryCollection {
            name: name.to_string(),
            documents: Mutex::new(documents),
        })
    }

    pub fn snapshot(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<Vec<Document>> {
        // The driver sends skip as an i64.
        if spec.skip.map_or(false, |skip| i64::try_from(skip).is_err()) {
            return Err(ApiError::UpstreamUnavailable("skip out of range".to_string()));
        }

        let mut found: Vec<Document> = self
            .snapshot()
            .into_iter()
            .filter(|document| matches(document, &filter))
            .collect();

        if let Some(sort) = &spec.sort {
            found.sort_by(|a, b| compare_by(a, b, sort));
        }

        let skip = spec.skip.unwrap_or(0) as usize;
        let found = found.into_iter().skip(skip);
        Ok(match spec.limit {
            Some(limit) if limit > 0 => found.take(limit as usize).collect(),
            _ => found.collect(),
        })
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        Ok(self
            .snapshot()
            .into_iter()
            .find(|document| matches(document, &filter)))
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        Ok(self
            .snapshot()
            .iter()
            .filter(|document| matches(document, &filter))
            .count() as u64)
    }

    async fn insert_one(&self, mut document: Document) -> Result<InsertOutcome> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        let inserted_id = document.get("_id").cloned().unwrap_or(Bson::Null);
        self.documents.lock().unwrap().push(document);

        Ok(InsertOutcome {
            acknowledged: true,
            inserted_id,
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let mut documents = self.documents.lock().unwrap();

        if let Some(document) = documents.iter_mut().find(|d| matches(d, &filter)) {
            let before = document.clone();
            apply_update(document, &update, false)?;
            return Ok(UpdateOutcome {
                acknowledged: true,
                matched_count: 1,
                modified_count: u64::from(before != *document),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            });
        }

        let document = upserted(&filter, &update)?;
        let upserted_id = document.get("_id").cloned();
        documents.push(document);
        Ok(UpdateOutcome {
            acknowledged: true,
            matched_count: 0,
            modified_count: 0,
            upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let mut documents = self.documents.lock().unwrap();

        if let Some(document) = documents.iter_mut().find(|d| matches(d, &filter)) {
            apply_update(document, &update, false)?;
            return Ok(Some(document.clone()));
        }

        if !upsert {
            return Ok(None);
        }

        let document = upserted(&filter, &update)?;
        documents.push(document.clone());
        Ok(Some(document))
    }

    async fn delete_one(&self, filter: Document) -> Result<DeleteOutcome> {
        let mut documents = self.documents.lock().unwrap();
        let position = documents.iter().position(|d| matches(d, &filter));
        if let Some(position) = position {
            documents.remove(position);
        }

        Ok(DeleteOutcome {
            acknowledged: true,
            deleted_count: u64::from(position.is_some()),
        })
    }

    async fn sum(&self, field: &str) -> Result<f64> {
        Ok(self
            .snapshot()
            .iter()
            .filter_map(|document| document.get(field).and_then(number))
            .sum())
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        if key == "$or" {
            return match condition {
                Bson::Array(branches) => branches.iter().any(|branch| match branch {
                    Bson::Document(branch) => matches(document, branch),
                    _ => false,
                }),
                _ => false,
            };
        }

        let value = document.get(key);
        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                operators_hold(value, operators)
            }
            expected => value.map_or(false, |value| equal(value, expected)),
        }
    })
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn operators_hold(value: Option<&Bson>, operators: &Document) -> bool {
    operators.iter().all(|(operator, operand)| match operator.as_str() {
        "$eq" => value.map_or(false, |value| equal(value, operand)),
        "$ne" => value.map_or(true, |value| !equal(value, operand)),
        "$gte" => compare_values(value, operand).map_or(false, |o| o != Ordering::Less),
        "$lte" => compare_values(value, operand).map_or(false, |o| o != Ordering::Greater),
        "$exists" => value.is_some() == (operand == &Bson::Boolean(true)),
        "$regex" => {
            let insensitive = operators
                .get_str("$options")
                .map_or(false, |options| options.contains('i'));
            match (value, operand) {
                (Some(Bson::String(text)), Bson::String(pattern)) => RegexBuilder::new(pattern)
                    .case_insensitive(insensitive)
                    .build()
                    .map_or(false, |regex| regex.is_match(text)),
                _ => false,
            }
        }
        "$options" => true,
        "$type" => match operand.as_str() {
            Some("number") => value.and_then(number).is_some(),
            Some("string") => matches!(value, Some(Bson::String(_))),
            _ => panic!("$type {} not supported by MemoryCollection", operand),
        },
        other => panic!("operator {} not supported by MemoryCollection", other),
    })
}

fn equal(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn compare_values(value: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    let value = value?;
    match (number(value), number(operand)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (value, operand) {
            (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
            (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        // Missing fields sort before present ones, as in the real store.
        let ordering = match (a.get(field), b.get(field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(Some(x), y).unwrap_or(Ordering::Equal),
        };
        let ordering = if number(direction).map_or(false, |d| d < 0.0) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    for (operator, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ => return Err(ApiError::InvalidParameter(format!("bad {}", operator))),
        };

        for (field, operand) in fields {
            match operator.as_str() {
                "$set" => {
                    document.insert(field, operand.clone());
                }
                "$setOnInsert" => {
                    if inserting {
                        document.insert(field, operand.clone());
                    }
                }
                "$inc" => {
                    let current = document.get(field).cloned().unwrap_or(Bson::Int64(0));
                    document.insert(field, add(&current, operand));
                }
                "$max" => {
                    let raise = compare_values(document.get(field), operand)
                        .map_or(true, |ordering| ordering == Ordering::Less);
                    if raise {
                        document.insert(field, operand.clone());
                    }
                }
                other => panic!("update operator {} not supported by MemoryCollection", other),
            }
        }
    }
    Ok(())
}

fn add(current: &Bson, increment: &Bson) -> Bson {
    match (current, increment) {
        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int64(i64::from(*a) + i64::from(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => Bson::Double(number(a).unwrap_or(0.0) + number(b).unwrap_or(0.0)),
    }
}

fn upserted(filter: &Document, update: &Document) -> Result<Document> {
    let mut document = Document::new();
    for (key, value) in filter {
        let is_operator = matches!(value, Bson::Document(d) if is_operator_document(d));
        if !key.starts_with('$') && !is_operator {
            document.insert(key, value.clone());
        }
    }
    if !document.contains_key("_id") {
        document.insert("_id", ObjectId::new());
    }
    apply_update(&mut document, update, true)?;
    Ok(document)
}

/// Payment gateway double recording every requested amount.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<(i64, String)>>,
    pub fail: bool,
}

impl FakeGateway {
    pub fn failing() -> Self {
        FakeGateway {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, amount: i64, currency: &str) -> Result<String> {
        if self.fail {
            return Err(ApiError::UpstreamUnavailable("payment gateway error".into()));
        }
        self.requests
            .lock()
            .unwrap()
            .push((amount, currency.to_string()));
        Ok(format!("pi_test_secret_{}", amount))
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;

    #[actix_rt::test]
    async fn filters_like_the_store() {
        let bikes = MemoryCollection::with_documents(
            "bikes",
            vec![
                doc! { "name": "Road Racer", "category": "road", "regularPrice": 100 },
                doc! { "name": "Trail King", "category": "mountain", "regularPrice": 250.5 },
                doc! { "name": "City", "category": "urban" },
            ],
        );

        let priced = bikes
            .count(doc! { "regularPrice": { "$gte": 100, "$lte": 250.5 } })
            .await
            .unwrap();
        assert_eq!(priced, 2);

        let searched = bikes
            .count(doc! { "$or": [
                { "name": { "$regex": "KING", "$options": "i" } },
                { "category": { "$regex": "KING", "$options": "i" } },
            ] })
            .await
            .unwrap();
        assert_eq!(searched, 1);

        assert_eq!(bikes.count(doc! { "category": { "$ne": "road" } }).await.unwrap(), 2);
    }

    #[actix_rt::test]
    async fn upsert_keeps_filter_fields() {
        let users = MemoryCollection::empty("users");
        let outcome = users
            .update_one(
                doc! { "email": "a@b.c" },
                doc! { "$set": { "role": "admin" } },
                true,
            )
            .await
            .unwrap();

        assert!(outcome.upserted_id.is_some());
        let stored = users.find_one(doc! { "email": "a@b.c" }).await.unwrap().unwrap();
        assert_eq!(stored.get_str("role").unwrap(), "admin");
    }

    #[actix_rt::test]
    async fn set_on_insert_only_applies_to_new_documents() {
        let users = MemoryCollection::with_documents("users", vec![doc! { "email": "a@b.c" }]);
        let update = doc! { "$set": { "name": "A" }, "$setOnInsert": { "seq": 1 } };

        users
            .update_one(doc! { "email": "a@b.c" }, update.clone(), true)
            .await
            .unwrap();
        users
            .update_one(doc! { "email": "d@e.f" }, update, true)
            .await
            .unwrap();

        let existing = users.find_one(doc! { "email": "a@b.c" }).await.unwrap().unwrap();
        assert!(!existing.contains_key("seq"));
        let inserted = users.find_one(doc! { "email": "d@e.f" }).await.unwrap().unwrap();
        assert_eq!(inserted.get_i32("seq").unwrap(), 1);
    }
}
