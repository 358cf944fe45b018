/// Administrative account routes (admin role only)

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::auth::gate::Identity;
use crate::auth::roles::ADMIN_ONLY;
use crate::auth::service::AuthService;
use crate::error::AppError;
use crate::routes::auth::{ApiResponse, UserData};

/// POST /api/admin/users/{id}/deactivate
///
/// Also revokes every session of the target account.
pub async fn deactivate_user(
    path: web::Path<Uuid>,
    identity: web::ReqData<Identity>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    ADMIN_ONLY.check(&identity)?;
    let target = path.into_inner();

    let user = service.set_account_active(target, false).await?;
    tracing::info!(admin_id = %identity.user_id, user_id = %target, "Account deactivated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_data(
        "User deactivated",
        UserData {
            user: user.to_public(),
        },
    )))
}

/// POST /api/admin/users/{id}/reactivate
pub async fn reactivate_user(
    path: web::Path<Uuid>,
    identity: web::ReqData<Identity>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    ADMIN_ONLY.check(&identity)?;
    let target = path.into_inner();

    let user = service.set_account_active(target, true).await?;
    tracing::info!(admin_id = %identity.user_id, user_id = %target, "Account reactivated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_data(
        "User reactivated",
        UserData {
            user: user.to_public(),
        },
    )))
}
