mod admin;
mod auth;
mod health_check;

pub use admin::{deactivate_user, reactivate_user};
pub use auth::{
    change_password, forgot_password, get_current_user, login, logout, logout_all, refresh,
    register, session_status, ApiResponse, UserData,
};
pub use health_check::health_check;
