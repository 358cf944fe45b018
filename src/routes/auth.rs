/// Authentication Routes
///
/// Registration, login, token refresh, logout and password reset. Tokens are
/// never returned in bodies; they travel only in the credential cookies.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::cookies::{self, CarrierSettings};
use crate::auth::gate::Identity;
use crate::auth::service::{AuthService, Registration};
use crate::error::{AppError, ClearingCarriers, ErrorContext};
use crate::model::PublicUser;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub token: Option<String>,
    pub new_password: String,
}

/// Success body shared by every auth route
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_data(message: &'static str, data: T) -> Self {
        Self {
            success: true,
            message,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &'static str) -> Self {
        Self {
            success: true,
            message,
            data: None,
        }
    }
}

#[derive(Serialize)]
pub struct UserData {
    pub user: PublicUser,
}

#[derive(Serialize)]
pub struct SessionData {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

/// POST /api/auth/register
///
/// # Errors
/// - 400: invalid name, email, password or role
/// - 409: email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let (user, pair) = service
        .register(Registration {
            name: form.name,
            email: form.email,
            password: form.password,
            role: form.role,
        })
        .await?;

    let mut response = HttpResponse::Created();
    carriers.set(&mut response, &pair);
    Ok(response.json(ApiResponse::with_data(
        "User registered successfully",
        UserData {
            user: user.to_public(),
        },
    )))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, AppError> {
    let (user, pair) = service.login(&form.email, &form.password).await?;

    let mut response = HttpResponse::Ok();
    carriers.set(&mut response, &pair);
    Ok(response.json(ApiResponse::with_data(
        "Login successful",
        UserData {
            user: user.to_public(),
        },
    )))
}

/// POST /api/auth/refresh
///
/// Any failure clears both carriers so the client falls back to login.
pub async fn refresh(
    req: HttpRequest,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, ClearingCarriers> {
    let context = ErrorContext::new("token_refresh");
    let presented = cookies::refresh_token(&req);

    let (user, pair) = match service.sessions().rotate(presented.as_deref()).await {
        Ok(rotated) => rotated,
        Err(e) => {
            let rejected = ClearingCarriers::new(e, carriers.get_ref().clone());
            return Err(rejected.with_context(context));
        }
    };

    tracing::debug!(request_id = %context.request_id, user_id = %user.id, "Token refreshed");

    let mut response = HttpResponse::Ok();
    carriers.set(&mut response, &pair);
    Ok(response.json(ApiResponse::with_data(
        "Token refreshed successfully",
        UserData {
            user: user.to_public(),
        },
    )))
}

/// Run the gate inside a logout handler so rejections clear the carriers too
async fn authenticate_for_logout(
    req: &HttpRequest,
    service: &AuthService,
    carriers: &CarrierSettings,
    context: &ErrorContext,
) -> Result<Identity, ClearingCarriers> {
    let token = cookies::access_token(req);
    service
        .gate()
        .authenticate(token.as_deref())
        .await
        .map_err(|e| ClearingCarriers::new(e, carriers.clone()).with_context(context.clone()))
}

/// POST /api/auth/logout
///
/// Ends this device's session only. Carriers are cleared on every outcome.
pub async fn logout(
    req: HttpRequest,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, ClearingCarriers> {
    let context = ErrorContext::new("logout");
    let identity = authenticate_for_logout(&req, &service, &carriers, &context).await?;
    let context = context.with_user_id(identity.user_id);

    let presented = cookies::refresh_token(&req);
    service
        .sessions()
        .logout(identity.user_id, presented.as_deref())
        .await
        .map_err(|e| ClearingCarriers::new(e, carriers.get_ref().clone()).with_context(context))?;

    let mut response = HttpResponse::Ok();
    carriers.clear(&mut response);
    Ok(response.json(ApiResponse::message("Logged out successfully")))
}

/// POST /api/auth/logout-all
pub async fn logout_all(
    req: HttpRequest,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, ClearingCarriers> {
    let context = ErrorContext::new("logout_all");
    let identity = authenticate_for_logout(&req, &service, &carriers, &context).await?;
    let context = context.with_user_id(identity.user_id);

    service
        .sessions()
        .logout_all(identity.user_id)
        .await
        .map_err(|e| ClearingCarriers::new(e, carriers.get_ref().clone()).with_context(context))?;

    let mut response = HttpResponse::Ok();
    carriers.clear(&mut response);
    Ok(response.json(ApiResponse::message("Logged out from all devices")))
}

/// GET /api/auth/me
pub async fn get_current_user(identity: web::ReqData<Identity>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::with_data(
        "Current user",
        UserData {
            user: identity.user.to_public(),
        },
    ))
}

/// GET /api/auth/session
///
/// Never rejects; reports whether the caller carries a usable access token.
pub async fn session_status(identity: Option<web::ReqData<Identity>>) -> HttpResponse {
    let user = identity.map(|identity| identity.user.to_public());
    HttpResponse::Ok().json(ApiResponse::with_data(
        "Session status",
        SessionData {
            authenticated: user.is_some(),
            user,
        },
    ))
}

/// POST /api/auth/forgot-password
///
/// Always answers with the same message whether or not the account exists.
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.forgot_password(&form.email).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message(
        "If an account exists for that email, a password reset link has been sent",
    )))
}

/// PUT /api/auth/change-password
///
/// Authorized by a password-reset token in the body. Revokes every session.
pub async fn change_password(
    form: web::Json<ChangePasswordRequest>,
    service: web::Data<AuthService>,
    carriers: web::Data<CarrierSettings>,
) -> Result<HttpResponse, AppError> {
    let identity = service
        .gate()
        .authenticate_password_reset(form.token.as_deref())
        .await?;
    service.change_password(&identity, &form.new_password).await?;

    let mut response = HttpResponse::Ok();
    carriers.clear(&mut response);
    Ok(response.json(ApiResponse::message(
        "Password changed successfully, please log in again",
    )))
}
