//! Booking workflow.
//!
//! A student request creates a `pending` booking priced at the room's current
//! rent. An admin then approves or rejects it. Both decisions are
//! compare-and-set on `status = 'pending'`, so two admins racing on the same
//! booking cannot both apply a transition. Approval also claims the room, in
//! the same transaction.

use std::fmt;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{permit, Admin, Identity};
use crate::error::AppError;
use crate::model::{
    ApiMessage, Booking, BookingRequest, BookingStatus, NewBookingRow, Room, RoomType, User,
};
use crate::schema::{bookings, rooms, users};
use crate::validate::{parse_date, ValidatedJson};
use crate::BOOKING_TAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target(self) -> BookingStatus {
        match self {
            Decision::Approve => BookingStatus::Approved,
            Decision::Reject => BookingStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The booking already carried the decided status.
    Unchanged,
}

/// What a decision means for a booking that is no longer `pending`.
pub fn settled(current: BookingStatus, decision: Decision) -> Result<Outcome, AppError> {
    if current == decision.target() {
        return Ok(Outcome::Unchanged);
    }
    match current {
        BookingStatus::Pending => Err(AppError::conflict(
            "Booking changed while it was being decided, try again",
        )),
        other => Err(AppError::conflict(format!(
            "Cannot {decision} a booking that is already {other}"
        ))),
    }
}

/// Creates a `pending` booking for `user_id`.
///
/// The user's row is locked for the duration of the transaction so two
/// concurrent requests by the same student serialise on the open-booking
/// check.
pub async fn request_booking(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    room_id: i32,
    start_date: NaiveDate,
) -> Result<Booking, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        async move {
            users::table
                .find(user_id)
                .select(users::id)
                .for_update()
                .first::<i32>(conn)
                .await
                .optional()?
                .ok_or(AppError::NotFound("user"))?;

            let open = bookings::table
                .filter(bookings::user_id.eq(user_id))
                .filter(bookings::status.eq_any(BookingStatus::OPEN))
                .select(bookings::id)
                .first::<i32>(conn)
                .await
                .optional()?;
            if open.is_some() {
                return Err(AppError::conflict("You already have an active booking"));
            }

            let room = rooms::table
                .find(room_id)
                .select(Room::as_select())
                .first::<Room>(conn)
                .await
                .optional()?
                .ok_or(AppError::NotFound("room"))?;
            if !room.is_available {
                return Err(AppError::conflict("Room is not available"));
            }

            let booking = diesel::insert_into(bookings::table)
                .values(NewBookingRow {
                    user_id,
                    room_id,
                    start_date,
                    status: BookingStatus::Pending,
                    total_amount: room.rent_per_month,
                })
                .returning(Booking::as_returning())
                .get_result(conn)
                .await?;
            tracing::info!(booking_id = booking.id, user_id, room_id, "booking requested");
            Ok(booking)
        }
        .scope_boxed()
    })
    .await
}

/// Applies `decision` to a booking. Must run inside a transaction: on
/// approval the status write and the room claim are two statements and an
/// error from the second has to undo the first.
pub async fn apply_decision(
    conn: &mut AsyncPgConnection,
    booking_id: i32,
    decision: Decision,
) -> Result<Outcome, AppError> {
    let claimed_room = diesel::update(
        bookings::table
            .filter(bookings::id.eq(booking_id))
            .filter(bookings::status.eq(BookingStatus::Pending)),
    )
    .set(bookings::status.eq(decision.target()))
    .returning(bookings::room_id)
    .get_result::<i32>(conn)
    .await
    .optional()?;

    let Some(room_id) = claimed_room else {
        let current = bookings::table
            .find(booking_id)
            .select(bookings::status)
            .first::<BookingStatus>(conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("booking"))?;
        return settled(current, decision);
    };

    if decision == Decision::Approve {
        let claimed = diesel::update(
            rooms::table
                .filter(rooms::id.eq(room_id))
                .filter(rooms::is_available.eq(true)),
        )
        .set(rooms::is_available.eq(false))
        .execute(conn)
        .await?;
        if claimed == 0 {
            return Err(AppError::conflict("Room is no longer available"));
        }
    }
    Ok(Outcome::Applied)
}

pub async fn decide(
    conn: &mut AsyncPgConnection,
    booking_id: i32,
    decision: Decision,
) -> Result<Outcome, AppError> {
    let outcome = conn
        .transaction::<_, AppError, _>(|conn| {
            apply_decision(conn, booking_id, decision).scope_boxed()
        })
        .await?;
    tracing::info!(booking_id, %decision, ?outcome, "booking decided");
    Ok(outcome)
}

/// The student's newest booking that is still open, with its room.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentBooking {
    pub id: i32,
    pub start_date: NaiveDate,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub room_number: String,
    pub room_type: RoomType,
    pub rent_per_month: Decimal,
}

pub async fn current_booking(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> Result<Option<CurrentBooking>, AppError> {
    let row = bookings::table
        .inner_join(rooms::table)
        .filter(bookings::user_id.eq(user_id))
        .filter(bookings::status.eq_any(BookingStatus::OPEN))
        .order(bookings::created_at.desc())
        .select((Booking::as_select(), Room::as_select()))
        .first::<(Booking, Room)>(conn)
        .await
        .optional()?;

    Ok(row.map(|(booking, room)| CurrentBooking {
        id: booking.id,
        start_date: booking.start_date,
        status: booking.status,
        total_amount: booking.total_amount,
        room_number: room.room_number,
        room_type: room.room_type,
        rent_per_month: room.rent_per_month,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingOverview {
    pub id: i32,
    pub start_date: NaiveDate,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub created_at: chrono::NaiveDateTime,
    pub student_name: String,
    pub email: String,
    pub room_number: String,
    pub room_type: RoomType,
}

pub async fn list_bookings(conn: &mut AsyncPgConnection) -> Result<Vec<BookingOverview>, AppError> {
    let rows = bookings::table
        .inner_join(users::table)
        .inner_join(rooms::table)
        .order(bookings::created_at.desc())
        .select((Booking::as_select(), User::as_select(), Room::as_select()))
        .load::<(Booking, User, Room)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(booking, user, room)| BookingOverview {
            id: booking.id,
            start_date: booking.start_date,
            status: booking.status,
            total_amount: booking.total_amount,
            created_at: booking.created_at,
            student_name: user.name,
            email: user.email,
            room_number: room.room_number,
            room_type: room.room_type,
        })
        .collect())
}

/// expose the booking OpenAPI to parent module
pub fn booking_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new()
        .routes(routes!(request))
        .routes(routes!(approve))
        .routes(routes!(reject))
}

/// Request a room
#[utoipa::path(
    post,
    path = "/bookings/request",
    request_body = BookingRequest,
    responses(
        (status = OK, body = ApiMessage),
        (status = BAD_REQUEST, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage),
        (status = CONFLICT, body = ApiMessage)
    ),
    tag = BOOKING_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn request(
    identity: Identity,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedJson(body): ValidatedJson<BookingRequest>,
) -> Result<Json<ApiMessage>, AppError> {
    permit(&enforcer, &identity, "booking", "request")?;
    let start_date = parse_date("start_date", &body.start_date)?;
    let mut conn = pool.get().await?;
    request_booking(&mut conn, identity.user_id, body.room_id, start_date).await?;
    Ok(Json(ApiMessage::ok("Booking request submitted successfully")))
}

/// Approve booking
#[utoipa::path(
    post,
    path = "/bookings/{id}/approve",
    params(("id" = i32, Path, description = "Booking database id")),
    responses(
        (status = OK, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage),
        (status = CONFLICT, body = ApiMessage)
    ),
    tag = BOOKING_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn approve(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    Path(id): Path<i32>,
) -> Result<Json<ApiMessage>, AppError> {
    let mut conn = pool.get().await?;
    let message = match decide(&mut conn, id, Decision::Approve).await? {
        Outcome::Applied => "Booking approved successfully",
        Outcome::Unchanged => "Booking already approved",
    };
    Ok(Json(ApiMessage::ok(message)))
}

/// Reject booking
#[utoipa::path(
    post,
    path = "/bookings/{id}/reject",
    params(("id" = i32, Path, description = "Booking database id")),
    responses(
        (status = OK, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage),
        (status = CONFLICT, body = ApiMessage)
    ),
    tag = BOOKING_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn reject(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    Path(id): Path<i32>,
) -> Result<Json<ApiMessage>, AppError> {
    let mut conn = pool.get().await?;
    let message = match decide(&mut conn, id, Decision::Reject).await? {
        Outcome::Applied => "Booking rejected",
        Outcome::Unchanged => "Booking already rejected",
    };
    Ok(Json(ApiMessage::ok(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeating_a_decision_is_a_no_op() {
        assert_eq!(
            settled(BookingStatus::Rejected, Decision::Reject).unwrap(),
            Outcome::Unchanged
        );
        assert_eq!(
            settled(BookingStatus::Approved, Decision::Approve).unwrap(),
            Outcome::Unchanged
        );
    }

    #[test]
    fn reversing_a_decision_conflicts() {
        match settled(BookingStatus::Rejected, Decision::Approve) {
            Err(AppError::Conflict(message)) => {
                assert_eq!(message, "Cannot approve a booking that is already rejected")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            settled(BookingStatus::Approved, Decision::Reject),
            Err(AppError::Conflict(_))
        ));
        for status in [BookingStatus::Active, BookingStatus::Completed] {
            assert!(matches!(
                settled(status, Decision::Approve),
                Err(AppError::Conflict(_))
            ));
            assert!(matches!(
                settled(status, Decision::Reject),
                Err(AppError::Conflict(_))
            ));
        }
    }

    #[test]
    fn lost_race_on_pending_is_reported() {
        assert!(matches!(
            settled(BookingStatus::Pending, Decision::Approve),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn decisions_target_terminal_review_states() {
        assert_eq!(Decision::Approve.target(), BookingStatus::Approved);
        assert_eq!(Decision::Reject.target(), BookingStatus::Rejected);
    }
}
