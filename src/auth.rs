use std::future::{ready, Ready};

use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error};
use mongodb::bson::doc;

use crate::context::MatrimonyContext;
use crate::error::{ApiError, Result};
use crate::models::{TokenClaims, ROLE_ADMIN};
use crate::store::Collection;

pub const TOKEN_COOKIE: &str = "token";

/// Signing material and cookie policy for session tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookies: bool,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_days: i64, secure_cookies: bool) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            ttl: Duration::days(ttl_days),
            secure_cookies,
        }
    }

    pub fn issue(&self, email: &str) -> Result<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|err| {
            error!("could not encode token: {}", err);
            ApiError::UpstreamUnavailable("could not issue token".to_string())
        })
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let validation = Validation::new(Algorithm::HS256);
        Ok(decode::<TokenClaims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(TOKEN_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(self.same_site())
            .finish()
    }

    pub fn expired_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(TOKEN_COOKIE, "")
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(self.same_site())
            .finish();
        cookie.make_removal();
        cookie
    }

    fn same_site(&self) -> SameSite {
        if self.secure_cookies {
            SameSite::None
        } else {
            SameSite::Strict
        }
    }
}

/// Caller identified by a valid session cookie.
#[derive(Debug)]
pub struct AuthUser {
    pub email: String,
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser> {
    let keys = req.app_data::<web::Data<TokenKeys>>().ok_or_else(|| {
        error!("token keys are not registered with the app");
        ApiError::Unauthorized
    })?;

    let cookie = req.cookie(TOKEN_COOKIE).ok_or_else(|| {
        debug!("{} {} without a token cookie", req.method(), req.path());
        ApiError::Unauthorized
    })?;

    let claims = keys.verify(cookie.value())?;
    Ok(AuthUser {
        email: claims.email,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// Whether the stored user behind `email` holds the administrative role.
pub async fn is_admin(users: &dyn Collection, email: &str) -> Result<bool> {
    let user = users.find_one(doc! { "email": email }).await?;
    Ok(user
        .as_ref()
        .and_then(|user| user.get_str("role").ok())
        .map_or(false, |role| role == ROLE_ADMIN))
}

/// Authenticated caller whose stored role is administrative. Any other caller is `Forbidden`.
#[derive(Debug)]
pub struct AdminUser {
    pub email: String,
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let caller = authenticate(req);
        let context = req.app_data::<web::Data<MatrimonyContext>>().cloned();

        Box::pin(async move {
            let caller = caller?;
            let context = context.ok_or_else(|| {
                error!("matrimony context is not registered with the app");
                ApiError::UpstreamUnavailable("service not configured".to_string())
            })?;

            if !is_admin(context.users.as_ref(), &caller.email).await? {
                debug!("{} is not an admin", caller.email);
                return Err(ApiError::Forbidden);
            }

            Ok(AdminUser {
                email: caller.email,
            })
        })
    }
}
