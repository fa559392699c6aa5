use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::info;

use crate::auth::TokenKeys;
use crate::config::{Config, DEFAULT_HUNTER_PORT, DEFAULT_MATRIMONY_PORT};
use crate::context::{HunterContext, MatrimonyContext};
use crate::controllers::{hunter, matrimony};
use crate::error::{ApiError, StartupError};
use crate::payment::StripeGateway;
use crate::store::{connect, MongoCollection};

pub fn init_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info,actix_web=info")).init();
}

fn cors(origins: &[String]) -> Cors {
    origins.iter().fold(
        Cors::default()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600),
        |cors, origin| cors.allowed_origin(origin),
    )
}

/// Makes malformed bodies, query strings and paths fail like every other bad parameter.
pub fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::InvalidParameter(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::InvalidParameter(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| ApiError::InvalidParameter(err.to_string()).into()),
    );
}

pub async fn run_hunter(config: Config) -> Result<(), StartupError> {
    let timeout = config.store_timeout();
    let client = connect(&config.mongodb_uri, "Hunter", timeout).await?;
    let database = client.database(&config.hunter_db);

    let context = web::Data::new(HunterContext::new(|name| {
        MongoCollection::open(&database, name, timeout)
    }));

    let port = config.port_or(DEFAULT_HUNTER_PORT);
    let origins = config.cors_origins.clone();
    info!("Hunter server is running on port: {}", port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(context.clone())
            .configure(extractor_errors)
            .configure(hunter::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}

pub async fn run_matrimony(config: Config) -> Result<(), StartupError> {
    let keys = web::Data::new(TokenKeys::new(
        config.token_secret()?,
        config.token_ttl_days,
        config.is_production(),
    ));
    let gateway = Arc::new(StripeGateway::new(
        &config.stripe_api_base,
        config.stripe_secret_key.clone(),
        config.gateway_timeout(),
    )?);

    let timeout = config.store_timeout();
    let client = connect(&config.mongodb_uri, "Matrimony", timeout).await?;
    let database = client.database(&config.matrimony_db);

    let context = MatrimonyContext::new(
        |name| MongoCollection::open(&database, name, timeout),
        gateway,
    );
    context.prepare().await?;
    let context = web::Data::new(context);

    let port = config.port_or(DEFAULT_MATRIMONY_PORT);
    let origins = config.cors_origins.clone();
    info!("Matrimony is running on port {}", port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(context.clone())
            .app_data(keys.clone())
            .configure(extractor_errors)
            .configure(matrimony::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
