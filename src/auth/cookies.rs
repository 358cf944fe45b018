/// Credential Carriers
///
/// Access and refresh tokens travel as HTTP-only cookies scoped to `/`.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponseBuilder};

use crate::auth::session::TokenPair;
use crate::configuration::Settings;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Cookie attributes for both credential carriers
#[derive(Debug, Clone)]
pub struct CarrierSettings {
    pub secure: bool,
    pub same_site: SameSite,
    pub access_max_age: i64,  // seconds
    pub refresh_max_age: i64, // seconds
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
            access_max_age: 15 * 60,
            refresh_max_age: 7 * 24 * 60 * 60,
        }
    }
}

impl CarrierSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        let production = settings.application.environment.is_production();
        Self {
            secure: production,
            same_site: if production { SameSite::Strict } else { SameSite::Lax },
            access_max_age: settings.jwt.access_token_expiry,
            refresh_max_age: settings.jwt.refresh_token_expiry,
        }
    }

    fn carrier<'a>(&self, name: &'a str, value: String, max_age: i64) -> Cookie<'a> {
        Cookie::build(name, value)
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .path("/")
            .max_age(Duration::seconds(max_age))
            .finish()
    }

    /// Attach both tokens of a freshly issued pair to the response
    pub fn set(&self, builder: &mut HttpResponseBuilder, pair: &TokenPair) {
        builder.cookie(self.carrier(
            ACCESS_TOKEN_COOKIE,
            pair.access_token.clone(),
            self.access_max_age,
        ));
        builder.cookie(self.carrier(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token.clone(),
            self.refresh_max_age,
        ));
    }

    /// Expire both carriers on the client
    pub fn clear(&self, builder: &mut HttpResponseBuilder) {
        for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
            let mut cookie = self.carrier(name, String::new(), 0);
            cookie.make_removal();
            builder.cookie(cookie);
        }
    }
}

pub fn access_token(req: &HttpRequest) -> Option<String> {
    non_empty_cookie(req, ACCESS_TOKEN_COOKIE)
}

pub fn refresh_token(req: &HttpRequest) -> Option<String> {
    non_empty_cookie(req, REFRESH_TOKEN_COOKIE)
}

fn non_empty_cookie(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use actix_web::HttpResponse;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_set_carriers() {
        let settings = CarrierSettings::default();
        let mut builder = HttpResponse::Ok();
        settings.set(&mut builder, &pair());
        let response = builder.finish();

        let access = response
            .cookies()
            .find(|c| c.name() == ACCESS_TOKEN_COOKIE)
            .expect("access cookie");
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(access.max_age(), Some(Duration::minutes(15)));

        let refresh = response
            .cookies()
            .find(|c| c.name() == REFRESH_TOKEN_COOKIE)
            .expect("refresh cookie");
        assert_eq!(refresh.value(), "refresh");
        assert_eq!(refresh.max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn test_production_carriers_are_secure() {
        let settings = CarrierSettings {
            secure: true,
            same_site: SameSite::Strict,
            ..CarrierSettings::default()
        };
        let mut builder = HttpResponse::Ok();
        settings.set(&mut builder, &pair());
        let response = builder.finish();

        assert!(response.cookies().all(|c| c.secure() == Some(true)));
        assert!(response
            .cookies()
            .all(|c| c.same_site() == Some(SameSite::Strict)));
    }

    #[test]
    fn test_clear_carriers() {
        let mut builder = HttpResponse::Ok();
        CarrierSettings::default().clear(&mut builder);
        let response = builder.finish();

        let cookies: Vec<_> = response.cookies().collect();
        assert_eq!(cookies.len(), 2);
        for cookie in cookies {
            assert!(cookie.value().is_empty());
            assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        }
    }

    #[test]
    fn test_read_carriers_from_request() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "a"))
            .cookie(Cookie::new(REFRESH_TOKEN_COOKIE, ""))
            .to_http_request();

        assert_eq!(access_token(&req), Some("a".to_string()));
        assert_eq!(refresh_token(&req), None);
    }
}
