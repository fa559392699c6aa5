use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use log::info;
use mongodb::bson::{doc, DateTime, Document};

use super::settable;
use crate::auth::{is_admin, AdminUser, AuthUser, TokenKeys};
use crate::context::{MatrimonyContext, BIODATA_ID};
use crate::error::{ApiError, Result};
use crate::models::{
    object_id, to_json, to_json_list, Acknowledgement, AdminResponse, AdminStats,
    PaymentInfo, PaymentIntentRequest, PaymentIntentResponse, RoleResponse, RoleUpdate,
    SearchQuery, StatusUpdate, SuccessQuery, TokenRequest, ROLE_NORMAL, STATUS_APPROVED,
    STATUS_REQUESTED, STATUS_VERIFIED, TYPE_PREMIUM,
};
use crate::payment::{amount_in_cents, CURRENCY};
use crate::query::{contains_any, paginate, ProfileParams};
use crate::store::FindSpec;

/// Number of profiles suggested next to a biodata.
const SIMILAR_LIMIT: i64 = 4;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(issue_token)
        .service(logout)
        .service(save_user)
        .service(request_premium)
        .service(update_role)
        .service(user_role)
        .service(all_users)
        .service(users_info)
        .service(admin_check)
        .service(create_biodata)
        .service(premium_biodata)
        .service(similar_biodata)
        .service(list_biodata)
        .service(biodata_view)
        .service(biodata_by_id)
        .service(biodata_by_email)
        .service(edit_biodata)
        .service(create_favourite)
        .service(favourites_of)
        .service(delete_favourite)
        .service(create_order)
        .service(all_orders)
        .service(orders_of)
        .service(cancel_order)
        .service(update_order_status)
        .service(create_success)
        .service(success_stories)
        .service(admin_success_stories)
        .service(success_story)
        .service(create_payment_intent)
        .service(save_payment_info)
        .service(admin_stat);
}

fn created(outcome: impl serde::Serialize) -> HttpResponse {
    HttpResponse::Created().json(outcome)
}

#[get("/")]
pub async fn index() -> impl Responder {
    "Hello from Matrimony Server.."
}

// session

#[post("/jwt")]
pub async fn issue_token(
    keys: web::Data<TokenKeys>,
    data: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    let token = keys.issue(&data.email)?;
    Ok(HttpResponse::Ok()
        .cookie(keys.session_cookie(token))
        .json(Acknowledgement::success()))
}

#[get("/logout")]
pub async fn logout(keys: web::Data<TokenKeys>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(keys.expired_cookie())
        .json(Acknowledgement::success())
}

// users

#[post("/users/{email}")]
pub async fn save_user(
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let email = email.into_inner();
    if let Some(existing) = context.users.find_one(doc! { "email": email.as_str() }).await? {
        return Ok(HttpResponse::Ok().json(to_json(existing)));
    }

    let mut user = data.into_inner();
    user.remove("_id");
    user.insert("email", email.as_str());
    user.insert("role", ROLE_NORMAL);
    user.insert("timestamp", Utc::now().timestamp_millis());

    let outcome = context.users.insert_one(user).await?;
    info!("Registered user {}", email);
    Ok(created(outcome))
}

#[patch("/users/{email}")]
pub async fn request_premium(
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let filter = doc! { "email": email.as_str() };
    let user = context
        .users
        .find_one(filter.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    if user.get_str("status").ok() == Some(STATUS_REQUESTED) {
        return Err(ApiError::Conflict(
            "You have already requested, wait for some time.".to_string(),
        ));
    }

    let outcome = context
        .users
        .update_one(filter, doc! { "$set": { "status": STATUS_REQUESTED } }, false)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[patch("/user/role/{email}")]
pub async fn update_role(
    _admin: AdminUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
    data: web::Json<RoleUpdate>,
) -> Result<HttpResponse> {
    let filter = doc! { "email": email.as_str() };
    let outcome = context
        .users
        .update_one(
            filter.clone(),
            doc! { "$set": { "role": data.role.as_str(), "status": STATUS_VERIFIED } },
            false,
        )
        .await?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound("user".to_string()));
    }

    context
        .biodata
        .update_one(filter, doc! { "$set": { "type": TYPE_PREMIUM } }, false)
        .await?;
    info!("{} is now {}", email, data.role);
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/users/role/{email}")]
pub async fn user_role(
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let user = context
        .users
        .find_one(doc! { "email": email.as_str() })
        .await?;
    let role = user.and_then(|user| user.get_str("role").ok().map(str::to_string));
    Ok(HttpResponse::Ok().json(RoleResponse { role }))
}

#[get("/all-users/{email}")]
pub async fn all_users(
    _admin: AdminUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
    qs: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let mut filter = doc! { "email": { "$ne": email.as_str() } };
    if let Some(search) = qs.search.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Some(name) = contains_any(&["name"], search.trim()).pop() {
            filter.extend(name);
        }
    }

    let users = context.users.find(filter, FindSpec::default()).await?;
    Ok(HttpResponse::Ok().json(to_json_list(users)))
}

#[get("/users-info")]
pub async fn users_info(
    _admin: AdminUser,
    context: web::Data<MatrimonyContext>,
) -> Result<HttpResponse> {
    let users = context.users.find(doc! {}, FindSpec::default()).await?;
    Ok(HttpResponse::Ok().json(to_json_list(users)))
}

#[get("/users/admin/{email}")]
pub async fn admin_check(
    caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    if caller.email != *email {
        return Err(ApiError::Forbidden);
    }
    let admin = is_admin(context.users.as_ref(), &email).await?;
    Ok(HttpResponse::Ok().json(AdminResponse { admin }))
}

// biodata

#[post("/biodata")]
pub async fn create_biodata(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let mut biodata = data.into_inner();
    biodata.remove("_id");

    let biodata_id = context.biodata_ids.next().await?;
    biodata.insert(BIODATA_ID, biodata_id);
    biodata.insert("createdAt", DateTime::now());

    let outcome = context.biodata.insert_one(biodata).await?;
    info!("Created biodata {} ({})", biodata_id, outcome.inserted_id);
    Ok(created(outcome))
}

#[get("/premium-biodata")]
pub async fn premium_biodata(context: web::Data<MatrimonyContext>) -> Result<HttpResponse> {
    let premium = context
        .biodata
        .find(doc! { "type": TYPE_PREMIUM }, FindSpec::default())
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(premium)))
}

#[get("/similar-biodata/{gender}")]
pub async fn similar_biodata(
    context: web::Data<MatrimonyContext>,
    gender: web::Path<String>,
) -> Result<HttpResponse> {
    let similar = context
        .biodata
        .find(
            doc! { "gender": gender.as_str() },
            FindSpec::limited(SIMILAR_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(similar)))
}

#[get("/biodata")]
pub async fn list_biodata(
    context: web::Data<MatrimonyContext>,
    qs: web::Query<ProfileParams>,
) -> Result<HttpResponse> {
    let planned = qs.plan()?;
    let page = paginate(context.biodata.as_ref(), &planned).await?;
    Ok(HttpResponse::Ok().json(page.map(to_json)))
}

#[get("/biodata/view/{email}")]
pub async fn biodata_view(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let owned = context
        .biodata
        .find(doc! { "email": email.as_str() }, FindSpec::default())
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(owned)))
}

#[get("/biodata/{id}")]
pub async fn biodata_by_id(
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let biodata = context
        .biodata
        .find_one(doc! { "_id": object_id(&id)? })
        .await?
        .ok_or_else(|| ApiError::NotFound("biodata".to_string()))?;
    Ok(HttpResponse::Ok().json(to_json(biodata)))
}

#[get("/biodata-data/{email}")]
pub async fn biodata_by_email(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let biodata = context
        .biodata
        .find_one(doc! { "email": email.as_str() })
        .await?
        .ok_or_else(|| ApiError::NotFound("biodata".to_string()))?;
    Ok(HttpResponse::Ok().json(to_json(biodata)))
}

#[put("/biodata-edit/{id}")]
pub async fn edit_biodata(
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let filter = doc! { "_id": object_id(&id)? };
    let fields = settable(data.into_inner(), &["_id", BIODATA_ID])?;

    let mut update = doc! { "$set": fields };
    if context.biodata.count(filter.clone()).await? == 0 {
        // Only applied if the update ends up inserting.
        let biodata_id = context.biodata_ids.next().await?;
        update.insert(
            "$setOnInsert",
            doc! { BIODATA_ID: biodata_id, "createdAt": DateTime::now() },
        );
    }

    let outcome = context.biodata.update_one(filter, update, true).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

// favourites

#[post("/favourites")]
pub async fn create_favourite(
    context: web::Data<MatrimonyContext>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let mut favourite = data.into_inner();
    favourite.remove("_id");
    let outcome = context.favourites.insert_one(favourite).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/favourites/{email}")]
pub async fn favourites_of(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let favourites = context
        .favourites
        .find(doc! { "email": email.as_str() }, FindSpec::default())
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(favourites)))
}

#[delete("/orders/{id}")]
pub async fn delete_favourite(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let outcome = context
        .favourites
        .delete_one(doc! { "_id": object_id(&id)? })
        .await?;
    if outcome.deleted_count == 0 {
        return Err(ApiError::NotFound("favourite".to_string()));
    }
    Ok(HttpResponse::Ok().json(outcome))
}

// contact requests

#[post("/data")]
pub async fn create_order(
    context: web::Data<MatrimonyContext>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let mut order = data.into_inner();
    order.remove("_id");
    let outcome = context.orders.insert_one(order).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/data-info")]
pub async fn all_orders(context: web::Data<MatrimonyContext>) -> Result<HttpResponse> {
    let orders = context.orders.find(doc! {}, FindSpec::default()).await?;
    Ok(HttpResponse::Ok().json(to_json_list(orders)))
}

#[get("/data/{email}")]
pub async fn orders_of(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    email: web::Path<String>,
) -> Result<HttpResponse> {
    let orders = context
        .orders
        .find(doc! { "userEmail": email.as_str() }, FindSpec::default())
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(orders)))
}

#[delete("/data-info/{id}")]
pub async fn cancel_order(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let filter = doc! { "_id": object_id(&id)? };
    let order = context
        .orders
        .find_one(filter.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;

    if order.get_str("status").ok() == Some(STATUS_APPROVED) {
        return Err(ApiError::Conflict(
            "Cannot cancel once the request is approved".to_string(),
        ));
    }

    let outcome = context.orders.delete_one(filter).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[patch("/data-info/{id}")]
pub async fn update_order_status(
    _caller: AuthUser,
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
    data: web::Json<StatusUpdate>,
) -> Result<HttpResponse> {
    let outcome = context
        .orders
        .update_one(
            doc! { "_id": object_id(&id)? },
            doc! { "$set": { "status": data.status.as_str() } },
            false,
        )
        .await?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound("order".to_string()));
    }
    Ok(HttpResponse::Ok().json(outcome))
}

// success stories

#[post("/success")]
pub async fn create_success(
    context: web::Data<MatrimonyContext>,
    data: web::Json<Document>,
) -> Result<HttpResponse> {
    let mut story = data.into_inner();
    story.remove("_id");
    let outcome = context.success.insert_one(story).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/success")]
pub async fn success_stories(
    context: web::Data<MatrimonyContext>,
    qs: web::Query<SuccessQuery>,
) -> Result<HttpResponse> {
    let direction = match qs.sort_order.as_deref() {
        Some("descending") => -1,
        _ => 1,
    };
    let stories = context
        .success
        .find(doc! {}, FindSpec::sorted(doc! { "marriageDate": direction }))
        .await?;
    Ok(HttpResponse::Ok().json(to_json_list(stories)))
}

#[get("/success-stories")]
pub async fn admin_success_stories(
    _admin: AdminUser,
    context: web::Data<MatrimonyContext>,
) -> Result<HttpResponse> {
    let stories = context.success.find(doc! {}, FindSpec::default()).await?;
    Ok(HttpResponse::Ok().json(to_json_list(stories)))
}

#[get("/success-stories/{id}")]
pub async fn success_story(
    context: web::Data<MatrimonyContext>,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let story = context
        .success
        .find_one(doc! { "_id": object_id(&id)? })
        .await?
        .ok_or_else(|| ApiError::NotFound("success story".to_string()))?;
    Ok(HttpResponse::Ok().json(to_json(story)))
}

// payments

#[post("/create-payment-intent")]
pub async fn create_payment_intent(
    context: web::Data<MatrimonyContext>,
    data: web::Json<PaymentIntentRequest>,
) -> Result<HttpResponse> {
    let amount = amount_in_cents(data.price)?;
    info!("Creating payment intent for {} cents", amount);

    let client_secret = context.gateway.create_intent(amount, CURRENCY).await?;
    Ok(HttpResponse::Ok().json(PaymentIntentResponse { client_secret }))
}

#[post("/save-payment-info")]
pub async fn save_payment_info(
    context: web::Data<MatrimonyContext>,
    data: web::Json<PaymentInfo>,
) -> Result<HttpResponse> {
    let payment = data.into_inner();
    context
        .payments
        .insert_one(doc! {
            "transactionId": payment.transaction_id.as_str(),
            "amount": payment.amount,
            "email": payment.email.as_str(),
            "date": DateTime::now(),
        })
        .await?;
    info!("Saved payment {} from {}", payment.transaction_id, payment.email);
    Ok(HttpResponse::Ok().json(Acknowledgement::with_message(
        "Payment info saved successfully!",
    )))
}

// admin

#[get("/admin-stat")]
pub async fn admin_stat(
    _admin: AdminUser,
    context: web::Data<MatrimonyContext>,
) -> Result<HttpResponse> {
    let biodata = context.biodata.as_ref();

    let stats = AdminStats {
        total_biodata: biodata.count(doc! {}).await?,
        male_biodata_count: biodata.count(doc! { "gender": "male" }).await?,
        female_biodata_count: biodata.count(doc! { "gender": "female" }).await?,
        premium_biodata_count: biodata.count(doc! { "type": TYPE_PREMIUM }).await?,
        total_revenue: context.payments.sum("amount").await?,
    };
    Ok(HttpResponse::Ok().json(stats))
}
