use actix_web::{
    HttpRequest,
    cookie::{Cookie, SameSite, time::Duration},
};

use crate::config::Config;

/// Reads the session token from `Authorization: Bearer` or the session cookie.
pub fn token_from_request(req: &HttpRequest, cookie_name: &str) -> Option<String> {
    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match bearer {
        Some(token) => Some(token.to_string()),
        None => req
            .cookie(cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty()),
    }
}

pub fn session_cookie(config: &Config, token: String) -> Cookie<'static> {
    Cookie::build(config.session_cookie_name.clone(), token)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(config.session_ttl as i64))
        .finish()
}

pub fn removal_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::build(config.session_cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer header-token"))
            .cookie(Cookie::new("taskbit_session", "cookie-token"))
            .to_http_request();
        assert_eq!(
            token_from_request(&req, "taskbit_session").as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn test_cookie_fallback_and_absence() {
        let req = TestRequest::default()
            .cookie(Cookie::new("taskbit_session", "cookie-token"))
            .to_http_request();
        assert_eq!(
            token_from_request(&req, "taskbit_session").as_deref(),
            Some("cookie-token")
        );

        let empty = TestRequest::default().to_http_request();
        assert!(token_from_request(&empty, "taskbit_session").is_none());
    }

    #[test]
    fn test_session_cookie_lives_as_long_as_the_session() {
        let config = Config::for_tests();
        let cookie = session_cookie(&config, "abc".into());
        assert_eq!(cookie.name(), "taskbit_session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(30 * 24 * 60 * 60)));
    }
}
