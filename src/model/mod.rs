/// Domain entities consumed by the authentication core

pub mod user;

pub use user::{AuthProvider, NewUser, PublicUser, Role, User};
