use axum::extract::State;
use axum::Json;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{hash_password, issue_token, verify_password};
use crate::error::AppError;
use crate::model::{Credentials, NewUserRow, Registration, Role, User};
use crate::schema::users;
use crate::validate::ValidatedJson;
use crate::AUTH_TAG;

pub async fn find_by_email(
    conn: &mut AsyncPgConnection,
    email: &str,
) -> Result<Option<User>, AppError> {
    Ok(users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first::<User>(conn)
        .await
        .optional()?)
}

pub async fn insert_user(
    conn: &mut AsyncPgConnection,
    name: &str,
    email: &str,
    phone: Option<&str>,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    let password_hash = hash_password(password)?;
    diesel::insert_into(users::table)
        .values(NewUserRow {
            name,
            email,
            phone,
            password_hash: &password_hash,
            role,
        })
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .map_err(|e| AppError::unique(e, "Email already exists"))
}

/// Self-registration always creates a student.
pub async fn register(
    conn: &mut AsyncPgConnection,
    form: &Registration,
) -> Result<User, AppError> {
    if find_by_email(conn, &form.email).await?.is_some() {
        return Err(AppError::validation("Email already exists"));
    }
    let phone = Some(form.phone.trim()).filter(|phone| !phone.is_empty());
    let user = insert_user(
        conn,
        form.name.trim(),
        &form.email,
        phone,
        &form.password,
        Role::Student,
    )
    .await?;
    tracing::info!(user_id = user.id, "student registered");
    Ok(user)
}

pub async fn authenticate(
    conn: &mut AsyncPgConnection,
    credentials: &Credentials,
) -> Result<User, AppError> {
    match find_by_email(conn, &credentials.email).await? {
        Some(user) if verify_password(&credentials.password, &user.password_hash) => Ok(user),
        _ => {
            tracing::debug!("authenticate: rejected login for {}", credentials.email);
            Err(AppError::InvalidCredentials)
        }
    }
}

pub async fn list_students(conn: &mut AsyncPgConnection) -> Result<Vec<User>, AppError> {
    Ok(users::table
        .filter(users::role.eq(Role::Student))
        .order(users::created_at.desc())
        .select(User::as_select())
        .load(conn)
        .await?)
}

pub fn auth_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(login))
}

/// Get bearer token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = Credentials,
    responses(
        (status = OK, body = AuthBody),
        (status = UNAUTHORIZED, body = crate::model::ApiMessage)
    ),
    tag = AUTH_TAG
)]
async fn login(
    State(crate::State {
        pool, keys, session_ttl, ..
    }): State<crate::State>,
    ValidatedJson(credentials): ValidatedJson<Credentials>,
) -> Result<Json<AuthBody>, AppError> {
    let mut conn = pool.get().await?;
    let user = authenticate(&mut conn, &credentials).await?;
    let access_token = issue_token(&keys, &user, session_ttl)?;

    Ok(Json(AuthBody {
        access_token,
        token_type: "Bearer".to_string(),
    }))
}

#[derive(Debug, ToSchema, Serialize)]
pub struct AuthBody {
    access_token: String,
    token_type: String,
}
