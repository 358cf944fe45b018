/// Authentication Gate middleware
///
/// Reads the access-token carrier, runs it through the gate and injects the
/// resulting `Identity` into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::cookies;
use crate::auth::gate::AuthGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateMode {
    Required,
    Optional,
}

/// Guards a scope with the Authentication Gate
///
/// `required` rejects the request with the gate's reason code.
/// `optional` lets it through anonymously instead.
pub struct AuthGateMiddleware {
    gate: AuthGate,
    mode: GateMode,
}

impl AuthGateMiddleware {
    pub fn required(gate: AuthGate) -> Self {
        Self {
            gate,
            mode: GateMode::Required,
        }
    }

    pub fn optional(gate: AuthGate) -> Self {
        Self {
            gate,
            mode: GateMode::Optional,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGateMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGateMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGateMiddlewareService {
            service: Rc::new(service),
            gate: self.gate.clone(),
            mode: self.mode,
        }))
    }
}

pub struct AuthGateMiddlewareService<S> {
    service: Rc<S>,
    gate: AuthGate,
    mode: GateMode,
}

impl<S, B> Service<ServiceRequest> for AuthGateMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = cookies::access_token(req.request());
        let service = self.service.clone();
        let gate = self.gate.clone();
        let mode = self.mode;

        Box::pin(async move {
            let identity = match mode {
                GateMode::Required => match gate.authenticate(token.as_deref()).await {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!(
                            path = %req.path(),
                            error = %e,
                            "Authentication rejected"
                        );
                        return Err(e.into());
                    }
                },
                GateMode::Optional => gate.authenticate_optional(token.as_deref()).await,
            };

            if let Some(identity) = identity {
                tracing::debug!(user_id = %identity.user_id, "Request authenticated");
                req.extensions_mut().insert(identity);
            }

            service.call(req).await
        })
    }
}
