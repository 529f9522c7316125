use axum::extract::State;
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::Admin;
use crate::error::AppError;
use crate::model::{
    ApiMessage, Booking, NewPayment, NewPaymentRow, Payment, PaymentMethod, PaymentStatus, Room,
    User,
};
use crate::schema::{bookings, payments, rooms, users};
use crate::validate::{parse_date, ValidatedJson};
use crate::PAYMENT_TAG;

pub async fn record_payment(
    conn: &mut AsyncPgConnection,
    payment: NewPaymentRow,
) -> Result<Payment, AppError> {
    bookings::table
        .find(payment.booking_id)
        .select(bookings::id)
        .first::<i32>(conn)
        .await
        .optional()?
        .ok_or(AppError::NotFound("booking"))?;

    let payment = diesel::insert_into(payments::table)
        .values(&payment)
        .returning(Payment::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(
        payment_id = payment.id,
        booking_id = payment.booking_id,
        status = %payment.status,
        "payment recorded"
    );
    Ok(payment)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentOverview {
    pub id: i32,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: NaiveDateTime,
    pub booking_id: i32,
    pub student_name: String,
    pub room_number: String,
}

pub async fn list_payments(conn: &mut AsyncPgConnection) -> Result<Vec<PaymentOverview>, AppError> {
    let rows = payments::table
        .inner_join(bookings::table.inner_join(users::table).inner_join(rooms::table))
        .order(payments::created_at.desc())
        .select((
            Payment::as_select(),
            Booking::as_select(),
            User::as_select(),
            Room::as_select(),
        ))
        .load::<(Payment, Booking, User, Room)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(payment, booking, user, room)| PaymentOverview {
            id: payment.id,
            amount: payment.amount,
            payment_date: payment.payment_date,
            payment_method: payment.payment_method,
            status: payment.status,
            created_at: payment.created_at,
            booking_id: booking.id,
            student_name: user.name,
            room_number: room.room_number,
        })
        .collect())
}

/// expose the payment OpenAPI to parent module
pub fn payment_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(add_payment))
}

/// Record payment
#[utoipa::path(
    post,
    path = "/payments/add",
    request_body = NewPayment,
    responses(
        (status = OK, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage)
    ),
    tag = PAYMENT_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn add_payment(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    ValidatedJson(body): ValidatedJson<NewPayment>,
) -> Result<Json<ApiMessage>, AppError> {
    let payment = NewPaymentRow {
        booking_id: body.booking_id,
        amount: body.amount,
        payment_date: parse_date("payment_date", &body.payment_date)?,
        payment_method: body.payment_method,
        status: body.status,
    };
    let mut conn = pool.get().await?;
    record_payment(&mut conn, payment).await?;
    Ok(Json(ApiMessage::ok("Payment recorded successfully")))
}
