use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsChangeset, Insertable, Queryable, Selectable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::schema::{bookings, payments, rooms, users};

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Declares a closed set of lowercase string values stored in a `VARCHAR`
/// column guarded by a `CHECK` constraint.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, ToSchema, AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = Text)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = std::str::from_utf8(value.as_bytes())?;
                Ok(raw.parse()?)
            }
        }
    };
}

text_enum! {
    /// Coarse access level, fixed per user.
    Role {
        Admin => "admin",
        Student => "student",
    }
}

text_enum! {
    RoomType {
        Single => "single",
        Double => "double",
        Triple => "triple",
        Quad => "quad",
    }
}

text_enum! {
    /// Booking lifecycle. Only `pending -> approved | rejected` is driven by
    /// this application; `active` and `completed` are accepted from storage.
    BookingStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Active => "active",
        Completed => "completed",
    }
}

text_enum! {
    PaymentMethod {
        Cash => "cash",
        Online => "online",
        Card => "card",
    }
}

text_enum! {
    PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

impl BookingStatus {
    /// Statuses that count as the one booking a student may hold at a time.
    pub const OPEN: [BookingStatus; 3] = [
        BookingStatus::Pending,
        BookingStatus::Approved,
        BookingStatus::Active,
    ];
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUserRow<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Debug, Clone)]
#[diesel(table_name = rooms)]
#[diesel(check_for_backend(Pg))]
pub struct Room {
    pub id: i32,
    pub room_number: String,
    pub room_type: RoomType,
    pub capacity: i32,
    pub rent_per_month: Decimal,
    pub amenities: Option<String>,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Debug, Clone)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(Pg))]
pub struct Booking {
    pub id: i32,
    pub user_id: i32,
    pub room_id: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = bookings)]
pub struct NewBookingRow {
    pub user_id: i32,
    pub room_id: i32,
    pub start_date: NaiveDate,
    pub status: BookingStatus,
    pub total_amount: Decimal,
}

#[derive(ToSchema, Serialize, Selectable, Queryable, Debug, Clone)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(Pg))]
pub struct Payment {
    pub id: i32,
    pub booking_id: i32,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = payments)]
pub struct NewPaymentRow {
    pub booking_id: i32,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
}

/// Exclusive bound of a `NUMERIC(10, 2)` column.
const MONEY_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Rejects amounts the money columns would overflow or round.
fn fits_money_column(value: &Decimal) -> Result<(), ValidationError> {
    if value.abs() >= MONEY_LIMIT {
        return Err(ValidationError::new("too_large"));
    }
    if value.normalize().scale() > 2 {
        return Err(ValidationError::new("too_precise"));
    }
    Ok(())
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("non_negative"));
    }
    fits_money_column(value)
}

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || value.is_zero() {
        return Err(ValidationError::new("positive"));
    }
    fits_money_column(value)
}

/// Body of `POST /api/rooms/add`.
#[derive(Deserialize, ToSchema, Validate, Insertable, Debug)]
#[diesel(table_name = rooms)]
pub struct NewRoom {
    #[validate(length(min = 1, max = 10))]
    pub room_number: String,
    pub room_type: RoomType,
    #[validate(range(min = 1, max = 16))]
    pub capacity: i32,
    #[validate(custom(function = "non_negative"))]
    pub rent_per_month: Decimal,
    pub amenities: Option<String>,
}

/// Body of `PUT /api/rooms/{id}/update`. Replaces every mutable column.
#[derive(Deserialize, ToSchema, Validate, AsChangeset, Debug)]
#[diesel(table_name = rooms)]
#[diesel(treat_none_as_null = true)]
pub struct RoomUpdate {
    #[validate(length(min = 1, max = 10))]
    pub room_number: String,
    pub room_type: RoomType,
    #[validate(range(min = 1, max = 16))]
    pub capacity: i32,
    #[validate(custom(function = "non_negative"))]
    pub rent_per_month: Decimal,
    pub amenities: Option<String>,
    pub is_available: bool,
}

/// Body of `POST /api/bookings/request`.
#[derive(Deserialize, ToSchema, Validate, Debug)]
pub struct BookingRequest {
    pub room_id: i32,
    /// `YYYY-MM-DD`
    #[validate(length(equal = 10))]
    pub start_date: String,
}

/// Body of `POST /api/payments/add`.
#[derive(Deserialize, ToSchema, Validate, Debug)]
pub struct NewPayment {
    pub booking_id: i32,
    #[validate(custom(function = "positive"))]
    pub amount: Decimal,
    /// `YYYY-MM-DD`
    #[validate(length(equal = 10))]
    pub payment_date: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: PaymentStatus,
}

#[derive(ToSchema, Deserialize, Validate, Debug)]
pub struct Credentials {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Deserialize, Validate, Debug)]
pub struct Registration {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email, length(max = 100))]
    pub email: String,
    #[validate(length(max = 15))]
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 6))]
    pub password: String,
}

/// Response body of every JSON mutation endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_column_values() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), *status);
        }
        assert_eq!("quad".parse::<RoomType>().unwrap(), RoomType::Quad);
        assert!("suite".parse::<RoomType>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn open_statuses() {
        let open = |status: BookingStatus| BookingStatus::OPEN.contains(&status);
        assert!(open(BookingStatus::Pending));
        assert!(open(BookingStatus::Approved));
        assert!(open(BookingStatus::Active));
        assert!(!open(BookingStatus::Rejected));
        assert!(!open(BookingStatus::Completed));
    }

    #[test]
    fn room_types_order_by_size() {
        let mut types = vec![RoomType::Quad, RoomType::Single, RoomType::Triple, RoomType::Double];
        types.sort();
        assert_eq!(types, RoomType::ALL);
    }

    #[test]
    fn new_room_validation() {
        let room: NewRoom = serde_json::from_value(serde_json::json!({
            "room_number": "A101",
            "room_type": "single",
            "capacity": 0,
            "rent_per_month": 1200.0,
            "amenities": null
        }))
        .unwrap();
        let errors = room.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("capacity"));

        let room: NewRoom = serde_json::from_value(serde_json::json!({
            "room_number": "A101",
            "room_type": "double",
            "capacity": 2,
            "rent_per_month": -1.0
        }))
        .unwrap();
        let errors = room.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("rent_per_month"));
    }

    #[test]
    fn money_must_fit_numeric_10_2() {
        assert!(non_negative(&Decimal::new(9_999_999_999, 2)).is_ok());
        assert!(non_negative(&Decimal::new(120_000, 3)).is_ok());
        assert!(non_negative(&Decimal::new(100_000_000, 0)).is_err());
        assert!(non_negative(&Decimal::new(10_005, 3)).is_err());
        assert!(positive(&Decimal::new(100_000_000, 0)).is_err());
        assert!(positive(&Decimal::new(1, 2)).is_ok());

        let room: NewRoom = serde_json::from_value(serde_json::json!({
            "room_number": "A101",
            "room_type": "single",
            "capacity": 1,
            "rent_per_month": 100000000
        }))
        .unwrap();
        let errors = room.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("rent_per_month"));

        let payment: NewPayment = serde_json::from_value(serde_json::json!({
            "booking_id": 1,
            "amount": 123456789,
            "payment_date": "2024-05-01"
        }))
        .unwrap();
        assert!(payment.validate().is_err());
    }

    #[test]
    fn unknown_room_type_is_rejected_by_serde() {
        let parsed = serde_json::from_value::<NewRoom>(serde_json::json!({
            "room_number": "A101",
            "room_type": "suite",
            "capacity": 1,
            "rent_per_month": 10
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn payment_defaults() {
        let payment: NewPayment = serde_json::from_value(serde_json::json!({
            "booking_id": 3,
            "amount": 1200,
            "payment_date": "2024-05-01"
        }))
        .unwrap();
        assert_eq!(payment.payment_method, PaymentMethod::Cash);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.validate().is_ok());
    }
}
