use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use chrono::{Datelike, Months, NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::Admin;
use crate::error::AppError;
use crate::model::{BookingStatus, PaymentStatus, Role, RoomType};
use crate::schema::{bookings, payments, rooms, users};
use crate::REPORT_TAG;

/// Months covered by the revenue series, current month included.
pub const REVENUE_MONTHS: u32 = 6;

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct DashboardStats {
    pub total_students: i64,
    pub total_rooms: i64,
    pub available_rooms: i64,
    pub active_bookings: i64,
    pub total_revenue: Decimal,
    pub pending_requests: i64,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct OccupancyRow {
    pub room_type: RoomType,
    pub total: i64,
    pub occupied: i64,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub revenue_data: Vec<MonthlyRevenue>,
    pub occupancy_data: Vec<OccupancyRow>,
}

pub async fn dashboard_stats(conn: &mut AsyncPgConnection) -> Result<DashboardStats, AppError> {
    let total_students = users::table
        .filter(users::role.eq(Role::Student))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let total_rooms = rooms::table.count().get_result::<i64>(conn).await?;
    let available_rooms = rooms::table
        .filter(rooms::is_available.eq(true))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let active_bookings = bookings::table
        .filter(bookings::status.eq(BookingStatus::Active))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let pending_requests = bookings::table
        .filter(bookings::status.eq(BookingStatus::Pending))
        .count()
        .get_result::<i64>(conn)
        .await?;
    let total_revenue = payments::table
        .filter(payments::status.eq(PaymentStatus::Completed))
        .select(diesel::dsl::sum(payments::amount))
        .first::<Option<Decimal>>(conn)
        .await?
        .unwrap_or_default();

    Ok(DashboardStats {
        total_students,
        total_rooms,
        available_rooms,
        active_bookings,
        total_revenue,
        pending_requests,
    })
}

/// Joins per-type room totals with per-type occupied counts. Types with no
/// rooms are absent.
pub fn merge_occupancy(
    totals: Vec<(RoomType, i64)>,
    occupied: Vec<(RoomType, i64)>,
) -> Vec<OccupancyRow> {
    let occupied: BTreeMap<RoomType, i64> = occupied.into_iter().collect();
    let totals: BTreeMap<RoomType, i64> = totals.into_iter().collect();
    totals
        .into_iter()
        .map(|(room_type, total)| OccupancyRow {
            room_type,
            total,
            occupied: occupied.get(&room_type).copied().unwrap_or(0),
        })
        .collect()
}

pub async fn occupancy(conn: &mut AsyncPgConnection) -> Result<Vec<OccupancyRow>, AppError> {
    let totals = rooms::table
        .group_by(rooms::room_type)
        .select((rooms::room_type, count_star()))
        .load::<(RoomType, i64)>(conn)
        .await?;
    let occupied = rooms::table
        .filter(rooms::is_available.eq(false))
        .group_by(rooms::room_type)
        .select((rooms::room_type, count_star()))
        .load::<(RoomType, i64)>(conn)
        .await?;
    Ok(merge_occupancy(totals, occupied))
}

/// First days of the `count` calendar months ending with `today`'s month,
/// oldest first.
pub fn month_window(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let current = today.with_day(1).unwrap_or(today);
    (0..count)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .collect()
}

pub fn bucket_revenue(
    window: &[NaiveDate],
    payments: impl IntoIterator<Item = (NaiveDate, Decimal)>,
) -> Vec<MonthlyRevenue> {
    let mut sums: BTreeMap<(i32, u32), Decimal> = window
        .iter()
        .map(|month| ((month.year(), month.month()), Decimal::ZERO))
        .collect();
    for (date, amount) in payments {
        if let Some(total) = sums.get_mut(&(date.year(), date.month())) {
            *total += amount;
        }
    }
    sums.into_iter()
        .map(|((year, month), revenue)| MonthlyRevenue {
            month: format!("{year:04}-{month:02}"),
            revenue,
        })
        .collect()
}

pub async fn monthly_revenue(
    conn: &mut AsyncPgConnection,
    today: NaiveDate,
) -> Result<Vec<MonthlyRevenue>, AppError> {
    let window = month_window(today, REVENUE_MONTHS);
    let Some(first) = window.iter().next().copied() else {
        return Ok(Vec::new());
    };
    let rows = payments::table
        .filter(payments::status.eq(PaymentStatus::Completed))
        .filter(payments::payment_date.ge(first))
        .select((payments::payment_date, payments::amount))
        .load::<(NaiveDate, Decimal)>(conn)
        .await?;
    Ok(bucket_revenue(&window, rows))
}

/// expose the report OpenAPI to parent module
pub fn stats_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(dashboard_stats_api))
}

/// Revenue series and room occupancy
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    responses((status = OK, body = StatsResponse)),
    tag = REPORT_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn dashboard_stats_api(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
) -> Result<Json<StatsResponse>, AppError> {
    let mut conn = pool.get().await?;
    let revenue_data = monthly_revenue(&mut conn, Utc::now().date_naive()).await?;
    let occupancy_data = occupancy(&mut conn).await?;
    Ok(Json(StatsResponse {
        revenue_data,
        occupancy_data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_spans_six_months_across_year_end() {
        let window = month_window(date(2024, 2, 29), REVENUE_MONTHS);
        assert_eq!(
            window,
            vec![
                date(2023, 9, 1),
                date(2023, 10, 1),
                date(2023, 11, 1),
                date(2023, 12, 1),
                date(2024, 1, 1),
                date(2024, 2, 1),
            ]
        );
    }

    #[test]
    fn empty_payments_still_give_six_zero_months() {
        let window = month_window(date(2024, 6, 15), REVENUE_MONTHS);
        let series = bucket_revenue(&window, Vec::new());
        assert_eq!(series.len(), 6);
        assert_eq!(series[0].month, "2024-01");
        assert_eq!(series[5].month, "2024-06");
        assert!(series.iter().all(|m| m.revenue == Decimal::ZERO));
    }

    #[test]
    fn payments_land_in_their_month() {
        let window = month_window(date(2024, 6, 15), REVENUE_MONTHS);
        let series = bucket_revenue(
            &window,
            vec![
                (date(2024, 6, 1), Decimal::new(120000, 2)),
                (date(2024, 6, 30), Decimal::new(180000, 2)),
                (date(2024, 3, 10), Decimal::new(50, 0)),
                (date(2023, 12, 31), Decimal::new(999, 0)),
            ],
        );
        assert_eq!(series[5].revenue, Decimal::new(3000, 0));
        assert_eq!(series[2].month, "2024-03");
        assert_eq!(series[2].revenue, Decimal::new(50, 0));
        assert_eq!(
            series.iter().map(|m| m.revenue).sum::<Decimal>(),
            Decimal::new(3050, 0)
        );
    }

    #[test]
    fn no_rooms_no_occupancy() {
        assert!(merge_occupancy(Vec::new(), Vec::new()).is_empty());
    }

    #[test]
    fn occupancy_merges_by_type() {
        let rows = merge_occupancy(
            vec![
                (RoomType::Quad, 1),
                (RoomType::Single, 2),
                (RoomType::Double, 2),
            ],
            vec![(RoomType::Single, 1)],
        );
        assert_eq!(
            rows,
            vec![
                OccupancyRow {
                    room_type: RoomType::Single,
                    total: 2,
                    occupied: 1
                },
                OccupancyRow {
                    room_type: RoomType::Double,
                    total: 2,
                    occupied: 0
                },
                OccupancyRow {
                    room_type: RoomType::Quad,
                    total: 1,
                    occupied: 0
                },
            ]
        );
    }
}
