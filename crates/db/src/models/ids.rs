//! Row-id <-> public uuid lookups. Rows reference each other by integer id;
//! everything outside this crate only sees uuids.

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{feedback, user};

pub async fn user_id_by_uuid<C: ConnectionTrait>(db: &C, uuid: Uuid) -> Result<Option<i64>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_uuid_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Uuid>, DbErr> {
    user::Entity::find_by_id(id)
        .select_only()
        .column(user::Column::Uuid)
        .into_tuple()
        .one(db)
        .await
}

pub async fn feedback_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    feedback::Entity::find()
        .select_only()
        .column(feedback::Column::Id)
        .filter(feedback::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}
