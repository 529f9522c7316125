use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::model::{NewRoom, Role, RoomType};
use crate::schema::{rooms, users};
use crate::user::insert_user;

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub admin_created: bool,
    pub rooms_created: usize,
}

pub fn sample_rooms() -> Vec<NewRoom> {
    let room = |number: &str, room_type, capacity, rent: i64, amenities: &str| NewRoom {
        room_number: number.to_string(),
        room_type,
        capacity,
        rent_per_month: Decimal::new(rent * 100, 2),
        amenities: Some(amenities.to_string()),
    };
    vec![
        room("A101", RoomType::Single, 1, 1200, "AC, WiFi, Study Table, Wardrobe"),
        room("A102", RoomType::Single, 1, 1200, "AC, WiFi, Study Table, Wardrobe"),
        room("B201", RoomType::Double, 2, 1800, "AC, WiFi, Study Tables, Wardrobes, Balcony"),
        room("B202", RoomType::Double, 2, 1800, "AC, WiFi, Study Tables, Wardrobes"),
        room("C301", RoomType::Triple, 3, 2400, "AC, WiFi, Study Tables, Wardrobes, Common Area"),
        room("D401", RoomType::Quad, 4, 3000, "AC, WiFi, Study Tables, Wardrobes, Kitchen Access"),
    ]
}

/// Creates the admin account if its email is unused and the sample rooms if
/// no room exists yet. Running it again changes nothing.
pub async fn provision(
    conn: &mut AsyncPgConnection,
    admin: &AdminSeed,
) -> Result<SeedReport, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        async move {
            let mut report = SeedReport::default();

            let existing = users::table
                .filter(users::email.eq(&admin.email))
                .count()
                .get_result::<i64>(conn)
                .await?;
            if existing == 0 {
                insert_user(conn, &admin.name, &admin.email, None, &admin.password, Role::Admin)
                    .await?;
                report.admin_created = true;
            }

            let room_count = rooms::table.count().get_result::<i64>(conn).await?;
            if room_count == 0 {
                let samples = sample_rooms();
                report.rooms_created = diesel::insert_into(rooms::table)
                    .values(&samples)
                    .execute(conn)
                    .await?;
            }
            Ok(report)
        }
        .scope_boxed()
    })
    .await
}
