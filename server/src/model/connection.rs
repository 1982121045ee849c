use anyhow::Context;
use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub struct ConnectionCtrl;

impl ConnectionCtrl {
    pub async fn get_by_user(
        conn: &DatabaseConnection,
        user_id: &str,
    ) -> AppResult<Option<composio_connection::Model>> {
        let connection = ComposioConnection::find()
            .filter(composio_connection::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .context("Error fetching connection by user")?;

        Ok(connection)
    }

    /// The user's connection, only if it is currently active
    pub async fn get_active(
        conn: &DatabaseConnection,
        user_id: &str,
    ) -> AppResult<Option<composio_connection::Model>> {
        let connection = ComposioConnection::find()
            .filter(composio_connection::Column::UserId.eq(user_id))
            .filter(composio_connection::Column::IsActive.eq(true))
            .one(conn)
            .await
            .context("Error fetching active connection")?;

        Ok(connection)
    }

    /// Records an OAuth link that has been started but not completed. Trigger details of a
    /// previous link are kept until it is completed again.
    pub async fn mark_pending(
        conn: &DatabaseConnection,
        user_id: &str,
        connected_account_id: &str,
    ) -> AppResult<composio_connection::Model> {
        let now = Utc::now().fixed_offset();

        let model = match Self::get_by_user(conn, user_id).await? {
            Some(existing) => {
                let mut active_model = existing.into_active_model();
                active_model.connected_account_id =
                    ActiveValue::Set(connected_account_id.to_string());
                active_model.is_active = ActiveValue::Set(false);
                active_model.updated_at = ActiveValue::Set(now);
                active_model.update(conn).await?
            }
            None => {
                composio_connection::ActiveModel {
                    id: ActiveValue::NotSet,
                    user_id: ActiveValue::Set(user_id.to_string()),
                    connected_account_id: ActiveValue::Set(connected_account_id.to_string()),
                    trigger_id: ActiveValue::Set(String::new()),
                    is_active: ActiveValue::Set(false),
                    connected_at: ActiveValue::Set(None),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                }
                .insert(conn)
                .await?
            }
        };

        Ok(model)
    }

    pub async fn activate(
        conn: &DatabaseConnection,
        user_id: &str,
        connected_account_id: &str,
        trigger_id: &str,
    ) -> AppResult<composio_connection::Model> {
        let now = Utc::now().fixed_offset();

        let model = match Self::get_by_user(conn, user_id).await? {
            Some(existing) => {
                let mut active_model = existing.into_active_model();
                active_model.connected_account_id =
                    ActiveValue::Set(connected_account_id.to_string());
                active_model.trigger_id = ActiveValue::Set(trigger_id.to_string());
                active_model.is_active = ActiveValue::Set(true);
                active_model.connected_at = ActiveValue::Set(Some(now));
                active_model.updated_at = ActiveValue::Set(now);
                active_model.update(conn).await?
            }
            None => {
                composio_connection::ActiveModel {
                    id: ActiveValue::NotSet,
                    user_id: ActiveValue::Set(user_id.to_string()),
                    connected_account_id: ActiveValue::Set(connected_account_id.to_string()),
                    trigger_id: ActiveValue::Set(trigger_id.to_string()),
                    is_active: ActiveValue::Set(true),
                    connected_at: ActiveValue::Set(Some(now)),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                }
                .insert(conn)
                .await?
            }
        };

        tracing::info!("Connection for {} is active", user_id);
        Ok(model)
    }

    /// Marks the connection inactive; the trigger id is cleared once the trigger is gone
    pub async fn deactivate(
        conn: &DatabaseConnection,
        connection: composio_connection::Model,
        trigger_disabled: bool,
    ) -> AppResult<composio_connection::Model> {
        let user_id = connection.user_id.clone();
        let mut active_model = connection.into_active_model();
        active_model.is_active = ActiveValue::Set(false);
        if trigger_disabled {
            active_model.trigger_id = ActiveValue::Set(String::new());
        }
        active_model.updated_at = ActiveValue::Set(Utc::now().fixed_offset());

        let model = active_model.update(conn).await?;
        tracing::info!("Connection for {} deactivated", user_id);

        Ok(model)
    }
}
