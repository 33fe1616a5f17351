use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{entities::auth_session, models::ids};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: auth_session::Model,
    ) -> Result<Self, DbErr> {
        let user_id = ids::user_uuid_by_id(db, model.user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(Self {
            id: model.uuid,
            user_id,
            created_at: model.created_at.into(),
            expires_at: model.expires_at.into(),
            revoked_at: model.revoked_at.map(Into::into),
        })
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let active = auth_session::ActiveModel {
            uuid: Set(session_id),
            user_id: Set(user_row_id),
            created_at: Set(Utc::now().into()),
            expires_at: Set(expires_at.into()),
            revoked_at: Set(None),
            ..Default::default()
        };

        let model = active.insert(db).await?;
        Self::from_model(db, model).await
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        session_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let record = auth_session::Entity::find()
            .filter(auth_session::Column::Uuid.eq(session_id))
            .one(db)
            .await?;

        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Returns whether an active session was revoked.
    pub async fn revoke<C: ConnectionTrait>(db: &C, session_id: Uuid) -> Result<bool, DbErr> {
        let result = auth_session::Entity::update_many()
            .col_expr(
                auth_session::Column::RevokedAt,
                Expr::value(Some(chrono::Utc::now())),
            )
            .filter(auth_session::Column::Uuid.eq(session_id))
            .filter(auth_session::Column::RevokedAt.is_null())
            .exec(db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn prune_expired_before<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = auth_session::Entity::delete_many()
            .filter(auth_session::Column::ExpiresAt.lt(cutoff))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
