/// Token cookies
///
/// The access token travels in `_atk` and the refresh token in `_rtk`, both
/// `HttpOnly` and `SameSite=Lax` on path `/`.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse};

use crate::configuration::{AuthSettings, Environment};

pub const ACCESS_COOKIE: &str = "_atk";
pub const REFRESH_COOKIE: &str = "_rtk";

#[derive(Clone, Debug)]
pub struct CookiePolicy {
    secure: bool,
    access_max_age: Duration,
    /// `None` makes `_rtk` a session cookie
    refresh_max_age: Option<Duration>,
}

impl CookiePolicy {
    pub fn new(auth: &AuthSettings, environment: Environment) -> Self {
        Self {
            // session cookies without an expiry must not leak over plain http
            secure: environment.is_production() || auth.session_only,
            access_max_age: Duration::seconds(auth.access_token_ttl().num_seconds()),
            refresh_max_age: auth
                .refresh_token_ttl()
                .map(|ttl| Duration::seconds(ttl.num_seconds())),
        }
    }

    pub fn access_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build(ACCESS_COOKIE, token.to_string())
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(self.access_max_age)
            .finish()
    }

    pub fn refresh_cookie(&self, token: &str) -> Cookie<'static> {
        let builder = Cookie::build(REFRESH_COOKIE, token.to_string())
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax);
        match self.refresh_max_age {
            Some(max_age) => builder.max_age(max_age).finish(),
            None => builder.finish(),
        }
    }
}

/// Tell the client to drop both token cookies
pub fn purge_token_cookies(response: &mut HttpResponse) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let cookie = Cookie::build(name, "").path("/").finish();
        if let Err(e) = response.add_removal_cookie(&cookie) {
            tracing::error!(cookie = name, error = %e, "Failed to attach removal cookie");
        }
    }
}

pub fn read_cookie(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
