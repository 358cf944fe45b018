/// Authentication module
///
/// Token signing and verification, the per-user refresh-token registry,
/// session issue/rotation/revocation and the authentication gate.

pub mod claims;
pub mod codec;
pub mod cookies;
pub mod gate;
pub mod password;
pub mod registry;
pub mod roles;
pub mod service;
pub mod session;

pub use codec::{TokenCodec, TokenKind};
pub use gate::{AuthGate, Identity};
pub use service::{AuthService, LogResetSink, ResetTokenSink};
pub use session::{SessionManager, TokenPair};
