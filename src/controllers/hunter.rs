use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use log::info;
use mongodb::bson::{doc, Document};

use super::settable;
use crate::context::HunterContext;
use crate::error::{ApiError, Result};
use crate::models::{object_id, to_json, to_json_list};
use crate::query::{paginate, ListingParams};
use crate::store::FindSpec;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(create_bike)
        .service(all_bikes)
        .service(list_bikes)
        .service(bike_by_id)
        .service(update_bike)
        .service(delete_bike);
}

#[get("/")]
pub async fn index() -> impl Responder {
    "Hunter server is running"
}

#[post("/bikes")]
pub async fn create_bike(
    context: web::Data<HunterContext>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let mut bike = data.into_inner();
    bike.remove("_id");

    let outcome = context.bikes.insert_one(bike).await?;
    info!("New bike inserted with id {}", outcome.inserted_id);
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/bike")]
pub async fn all_bikes(context: web::Data<HunterContext>) -> Result<HttpResponse> {
    let bikes = context.bikes.find(doc! {}, FindSpec::default()).await?;
    Ok(HttpResponse::Ok().json(to_json_list(bikes)))
}

#[get("/bikes")]
pub async fn list_bikes(
    context: web::Data<HunterContext>,
    qs: web::Query<ListingParams>,
) -> Result<HttpResponse> {
    let planned = qs.plan()?;
    let page = paginate(context.bikes.as_ref(), &planned).await?;
    Ok(HttpResponse::Ok().json(page.map(to_json)))
}

#[get("/bikes/{id}")]
pub async fn bike_by_id(
    context: web::Data<HunterContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let filter = doc! { "_id": object_id(&id)? };
    match context.bikes.find_one(filter).await? {
        Some(bike) => Ok(HttpResponse::Ok().json(to_json(bike))),
        None => Err(ApiError::NotFound("bike".to_string())),
    }
}

#[put("/bikes/{id}")]
pub async fn update_bike(
    context: web::Data<HunterContext>,
    id: web::Path<String>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let filter = doc! { "_id": object_id(&id)? };
    let fields = settable(data.into_inner(), &["_id"])?;

    let outcome = context
        .bikes
        .update_one(filter, doc! { "$set": fields }, false)
        .await?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound("bike".to_string()));
    }
    Ok(HttpResponse::Ok().json(outcome))
}

#[delete("/bikes/{id}")]
pub async fn delete_bike(
    context: web::Data<HunterContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let outcome = context
        .bikes
        .delete_one(doc! { "_id": object_id(&id)? })
        .await?;
    if outcome.deleted_count == 0 {
        return Err(ApiError::NotFound("bike".to_string()));
    }
    Ok(HttpResponse::Ok().json(outcome))
}
