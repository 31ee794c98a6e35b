use log::debug;
use sqlx::SqliteConnection;

use crate::{db_types::UserId, traits::Capability};

/// Returns `true` if the user holds every one of the `required` capabilities.
pub async fn has_capabilities(
    user_id: &UserId,
    required: &[Capability],
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    for capability in required {
        let held: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM user_capabilities WHERE user_id = $1 AND capability = $2")
                .bind(user_id)
                .bind(capability.key())
                .fetch_optional(&mut *conn)
                .await?;
        if held.is_none() {
            debug!("🗃️ User {user_id} lacks capability {capability}");
            return Ok(false);
        }
    }
    Ok(true)
}

pub async fn grant_capabilities(
    user_id: &UserId,
    capabilities: &[Capability],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for capability in capabilities {
        sqlx::query("INSERT OR IGNORE INTO user_capabilities (user_id, capability) VALUES ($1, $2)")
            .bind(user_id)
            .bind(capability.key())
            .execute(&mut *conn)
            .await?;
    }
    debug!("🗃️ Granted {} capabilities to {user_id}", capabilities.len());
    Ok(())
}

pub async fn revoke_capabilities(
    user_id: &UserId,
    capabilities: &[Capability],
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let mut removed = 0;
    for capability in capabilities {
        let result = sqlx::query("DELETE FROM user_capabilities WHERE user_id = $1 AND capability = $2")
            .bind(user_id)
            .bind(capability.key())
            .execute(&mut *conn)
            .await?;
        removed += result.rows_affected();
    }
    debug!("🗃️ Revoked {removed} capabilities from {user_id}");
    Ok(removed)
}
