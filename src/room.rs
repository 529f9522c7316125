use axum::extract::{Path, State};
use axum::Json;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::Admin;
use crate::error::AppError;
use crate::model::{ApiMessage, NewRoom, Room, RoomUpdate};
use crate::schema::rooms;
use crate::validate::ValidatedJson;
use crate::ROOM_TAG;

const DUPLICATE_ROOM: &str = "Room number already exists";

pub async fn list_rooms(conn: &mut AsyncPgConnection) -> Result<Vec<Room>, AppError> {
    Ok(rooms::table
        .order(rooms::room_number.asc())
        .select(Room::as_select())
        .load(conn)
        .await?)
}

pub async fn available_rooms(conn: &mut AsyncPgConnection) -> Result<Vec<Room>, AppError> {
    Ok(rooms::table
        .filter(rooms::is_available.eq(true))
        .order(rooms::room_number.asc())
        .select(Room::as_select())
        .load(conn)
        .await?)
}

pub async fn find_room(conn: &mut AsyncPgConnection, id: i32) -> Result<Room, AppError> {
    rooms::table
        .find(id)
        .select(Room::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or(AppError::NotFound("room"))
}

async fn number_taken(
    conn: &mut AsyncPgConnection,
    number: &str,
    except: Option<i32>,
) -> Result<bool, AppError> {
    let mut query = rooms::table
        .filter(rooms::room_number.eq(number))
        .select(rooms::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(rooms::id.ne(id));
    }
    Ok(query.first::<i32>(conn).await.optional()?.is_some())
}

/// Inserts a room; new rooms start available.
pub async fn add_room(conn: &mut AsyncPgConnection, room: &NewRoom) -> Result<Room, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        async move {
            if number_taken(conn, &room.room_number, None).await? {
                return Err(AppError::validation(DUPLICATE_ROOM));
            }
            diesel::insert_into(rooms::table)
                .values(room)
                .returning(Room::as_returning())
                .get_result(conn)
                .await
                .map_err(|e| AppError::unique(e, DUPLICATE_ROOM))
        }
        .scope_boxed()
    })
    .await
}

pub async fn update_room(
    conn: &mut AsyncPgConnection,
    id: i32,
    changes: &RoomUpdate,
) -> Result<Room, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        async move {
            find_room(conn, id).await?;
            if number_taken(conn, &changes.room_number, Some(id)).await? {
                return Err(AppError::validation(DUPLICATE_ROOM));
            }
            diesel::update(rooms::table.find(id))
                .set(changes)
                .returning(Room::as_returning())
                .get_result(conn)
                .await
                .map_err(|e| AppError::unique(e, DUPLICATE_ROOM))
        }
        .scope_boxed()
    })
    .await
}

/// Deletes a room. Its bookings and their payments go with it.
pub async fn delete_room(conn: &mut AsyncPgConnection, id: i32) -> Result<(), AppError> {
    let deleted = diesel::delete(rooms::table.find(id)).execute(conn).await?;
    if deleted == 0 {
        return Err(AppError::NotFound("room"));
    }
    tracing::info!(room_id = id, "room deleted");
    Ok(())
}

/// expose the room OpenAPI to parent module
pub fn room_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new()
        .routes(routes!(create_room))
        .routes(routes!(replace_room))
        .routes(routes!(remove_room))
}

/// Add room
#[utoipa::path(
    post,
    path = "/rooms/add",
    request_body = NewRoom,
    responses(
        (status = OK, body = ApiMessage),
        (status = BAD_REQUEST, body = ApiMessage),
        (status = FORBIDDEN, body = ApiMessage)
    ),
    tag = ROOM_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn create_room(
    Admin(admin): Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    ValidatedJson(room): ValidatedJson<NewRoom>,
) -> Result<Json<ApiMessage>, AppError> {
    let mut conn = pool.get().await?;
    let room = add_room(&mut conn, &room).await?;
    tracing::info!(room_id = room.id, admin = admin.user_id, "room added");
    Ok(Json(ApiMessage::ok("Room added successfully")))
}

/// Update room
#[utoipa::path(
    put,
    path = "/rooms/{id}/update",
    request_body = RoomUpdate,
    params(("id" = i32, Path, description = "Room database id")),
    responses(
        (status = OK, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage)
    ),
    tag = ROOM_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn replace_room(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    Path(id): Path<i32>,
    ValidatedJson(changes): ValidatedJson<RoomUpdate>,
) -> Result<Json<ApiMessage>, AppError> {
    let mut conn = pool.get().await?;
    update_room(&mut conn, id, &changes).await?;
    Ok(Json(ApiMessage::ok("Room updated successfully")))
}

/// Delete room
#[utoipa::path(
    delete,
    path = "/rooms/{id}/delete",
    params(("id" = i32, Path, description = "Room database id")),
    responses(
        (status = OK, body = ApiMessage),
        (status = NOT_FOUND, body = ApiMessage)
    ),
    tag = ROOM_TAG,
    security(("session_jwt" = []), ("session_cookie" = []))
)]
async fn remove_room(
    _: Admin,
    State(crate::State { pool, .. }): State<crate::State>,
    Path(id): Path<i32>,
) -> Result<Json<ApiMessage>, AppError> {
    let mut conn = pool.get().await?;
    delete_room(&mut conn, id).await?;
    Ok(Json(ApiMessage::ok("Room deleted successfully")))
}
