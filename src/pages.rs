//! Server-side page routes. Rendering is left to the front end: each page
//! answers with its view model as `{page, flash, data}`, and form posts answer
//! with a redirect plus a flash notice. Failures also end in a redirect, see
//! [`PageError`].

use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::auth::{self, AdminViewer, PageError, Viewer};
use crate::booking::{self, CurrentBooking};
use crate::error::AppError;
use crate::flash::{self, Flash};
use crate::model::{Credentials, Registration, Role, Room};
use crate::{payment, report, room, user};

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: &'static str,
    pub flash: Option<Flash>,
    pub data: T,
}

fn render<T: Serialize>(jar: CookieJar, page: &'static str, data: T) -> Response {
    let (jar, flash) = flash::take(jar);
    (jar, Json(Page { page, flash, data })).into_response()
}

fn redirect_with(jar: CookieJar, flash: Flash, to: &str) -> Response {
    (jar.add(flash.cookie()), Redirect::to(to)).into_response()
}

/// First offending field, for a human-readable notice.
fn invalid_field(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
    fields.sort_unstable();
    match fields.first() {
        Some(field) => format!("Invalid {field}"),
        None => "Invalid form".to_string(),
    }
}

pub fn page_router() -> Router<crate::State> {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/admin/dashboard", get(admin_dashboard))
        .route("/admin/students", get(admin_students))
        .route("/admin/rooms", get(admin_rooms))
        .route("/admin/bookings", get(admin_bookings))
        .route("/admin/payments", get(admin_payments))
        .route("/student/dashboard", get(student_dashboard))
}

async fn index() -> Redirect {
    Redirect::to("/login")
}

async fn login_page(jar: CookieJar) -> Response {
    render(jar, "login", ())
}

async fn login(
    State(crate::State {
        pool, keys, session_ttl, ..
    }): State<crate::State>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Result<Response, PageError> {
    if credentials.validate().is_err() {
        return Ok(redirect_with(jar, Flash::error("Invalid email or password!"), "/login"));
    }
    let mut conn = pool.get().await.map_err(AppError::from)?;
    match user::authenticate(&mut conn, &credentials).await {
        Ok(user) => {
            let token = auth::issue_token(&keys, &user, session_ttl)?;
            tracing::info!(user_id = user.id, role = %user.role, "logged in");
            let jar = jar.add(auth::session_cookie(token));
            Ok(redirect_with(jar, Flash::success("Login successful!"), "/dashboard"))
        }
        Err(AppError::InvalidCredentials) => Ok(redirect_with(
            jar,
            Flash::error("Invalid email or password!"),
            "/login",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn register_page(jar: CookieJar) -> Response {
    render(jar, "register", ())
}

async fn register(
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
    Form(form): Form<Registration>,
) -> Result<Response, PageError> {
    if let Err(errors) = form.validate() {
        return Ok(redirect_with(jar, Flash::error(invalid_field(&errors)), "/register"));
    }
    let mut conn = pool.get().await.map_err(AppError::from)?;
    match user::register(&mut conn, &form).await {
        Ok(_) => Ok(redirect_with(
            jar,
            Flash::success("Registration successful! Please login."),
            "/login",
        )),
        Err(AppError::Validation(message)) => {
            Ok(redirect_with(jar, Flash::error(format!("{message}!")), "/register"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn logout(jar: CookieJar) -> Response {
    redirect_with(
        auth::clear_session(jar),
        Flash::info("Logged out successfully!"),
        "/login",
    )
}

async fn dashboard(Viewer(identity): Viewer) -> Redirect {
    match identity.role {
        Role::Admin => Redirect::to("/admin/dashboard"),
        Role::Student => Redirect::to("/student/dashboard"),
    }
}

async fn admin_dashboard(
    _: AdminViewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let stats = report::dashboard_stats(&mut conn).await?;
    Ok(render(jar, "admin_dashboard", stats))
}

async fn admin_students(
    _: AdminViewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let students = user::list_students(&mut conn).await?;
    Ok(render(jar, "admin_students", students))
}

async fn admin_rooms(
    _: AdminViewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let rooms = room::list_rooms(&mut conn).await?;
    Ok(render(jar, "admin_rooms", rooms))
}

async fn admin_bookings(
    _: AdminViewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let bookings = booking::list_bookings(&mut conn).await?;
    Ok(render(jar, "admin_bookings", bookings))
}

async fn admin_payments(
    _: AdminViewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let payments = payment::list_payments(&mut conn).await?;
    Ok(render(jar, "admin_payments", payments))
}

#[derive(Debug, Serialize)]
pub struct StudentDashboard {
    pub current_booking: Option<CurrentBooking>,
    pub available_rooms: Vec<Room>,
}

async fn student_dashboard(
    Viewer(identity): Viewer,
    State(crate::State { pool, .. }): State<crate::State>,
    jar: CookieJar,
) -> Result<Response, PageError> {
    let mut conn = pool.get().await.map_err(AppError::from)?;
    let current_booking = booking::current_booking(&mut conn, identity.user_id).await?;
    let available_rooms = room::available_rooms(&mut conn).await?;
    Ok(render(
        jar,
        "student_dashboard",
        StudentDashboard {
            current_booking,
            available_rooms,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_field_names_the_first_field() {
        let form = Registration {
            name: String::new(),
            email: "not-an-email".to_string(),
            phone: String::new(),
            password: "secret1".to_string(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(invalid_field(&errors), "Invalid email");
    }
}
