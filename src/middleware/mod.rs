/// Middleware module
///
/// Authentication gate for protected scopes.

mod auth_gate;

pub use auth_gate::AuthGateMiddleware;
