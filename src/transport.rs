//! Refresh Cookie Transport
//!
//! Builds the `Set-Cookie` values that carry refresh tokens to browsers.
//!
//! # Security Rationale
//!
//! Refresh tokens never touch response bodies or JavaScript. They travel in
//! an HTTP-only cookie scoped to the auth endpoints, so a script injection
//! can at worst use the session while it runs, never exfiltrate the token.
//! `SameSite=Lax` keeps cross-site POSTs from riding the cookie, and the
//! `Secure` flag is mandatory outside development.

use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

use crate::config::AuthConfig;

/// Cookie name the refresh token travels under
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Path prefix the cookie is scoped to
pub const REFRESH_COOKIE_PATH: &str = "/auth";

/// Builds set/clear cookie values for the refresh token.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    secure: bool,
    max_age: CookieDuration,
}

impl CookiePolicy {
    /// Derive the policy from authentication configuration.
    ///
    /// `Secure` is set whenever the environment is production; the cookie
    /// lifetime matches the refresh token TTL so the browser drops the
    /// cookie when the token would die anyway.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secure: config.is_production(),
            max_age: CookieDuration::seconds(config.refresh_ttl.as_secs() as i64),
        }
    }

    /// Build the cookie that installs `token` in the browser.
    pub fn set_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE_NAME, token.to_string()))
            .path(REFRESH_COOKIE_PATH)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(self.max_age)
            .build()
    }

    /// Build the cookie that removes the refresh token from the browser.
    ///
    /// Attributes must match [`CookiePolicy::set_cookie`] or browsers treat
    /// it as a different cookie and leave the original in place.
    pub fn clear_cookie(&self) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE_NAME, ""))
            .path(REFRESH_COOKIE_PATH)
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dev_policy() -> CookiePolicy {
        CookiePolicy::new(&AuthConfig::new(crate::crypto::random_hex(64)))
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = dev_policy().set_cookie("tok-123");

        assert_eq!(cookie.name(), REFRESH_COOKIE_NAME);
        assert_eq!(cookie.value(), "tok-123");
        assert_eq!(cookie.path(), Some(REFRESH_COOKIE_PATH));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(
            cookie.max_age(),
            Some(CookieDuration::seconds(30 * 24 * 60 * 60))
        );
    }

    #[test]
    fn test_production_forces_secure() {
        let config = AuthConfig::new(crate::crypto::random_hex(64)).with_environment("production");
        let cookie = CookiePolicy::new(&config).set_cookie("tok-123");
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_max_age_follows_refresh_ttl() {
        let config = AuthConfig::new(crate::crypto::random_hex(64))
            .with_refresh_ttl(Duration::from_secs(3600));
        let cookie = CookiePolicy::new(&config).set_cookie("tok-123");
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(3600)));
    }

    #[test]
    fn test_clear_cookie_matches_scope() {
        let policy = dev_policy();
        let set = policy.set_cookie("tok-123");
        let clear = policy.clear_cookie();

        assert_eq!(clear.name(), set.name());
        assert_eq!(clear.path(), set.path());
        assert_eq!(clear.http_only(), set.http_only());
        assert_eq!(clear.same_site(), set.same_site());
        assert_eq!(clear.value(), "");
        assert_eq!(clear.max_age(), Some(CookieDuration::ZERO));
    }
}
