/// Security headers applied to every response
///
/// - Content sniffing, framing and legacy XSS filter headers always
/// - HSTS only in production, where the service sits behind TLS

use actix_web::middleware::DefaultHeaders;

use crate::configuration::Environment;

pub struct SecurityHeaders;

impl SecurityHeaders {
    pub fn get_headers(environment: Environment) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
            ("X-XSS-Protection", "1; mode=block"),
        ];

        if environment.is_production() {
            headers.push((
                "Strict-Transport-Security",
                "max-age=31536000; includeSubDomains",
            ));
        }

        headers
    }

    /// Middleware that adds the headers above unless a handler set them
    pub fn middleware(environment: Environment) -> DefaultHeaders {
        Self::get_headers(environment)
            .into_iter()
            .fold(DefaultHeaders::new(), |headers, header| headers.add(header))
    }
}
