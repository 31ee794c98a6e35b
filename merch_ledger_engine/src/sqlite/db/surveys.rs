use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{CustomerSurvey, OrderId};

pub async fn fetch_survey_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<CustomerSurvey>, sqlx::Error> {
    let survey = sqlx::query_as("SELECT * FROM customer_surveys WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(survey)
}

/// Returns the survey placeholder for the order, creating it if it does not exist yet.
pub async fn fetch_or_create_survey(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<CustomerSurvey, sqlx::Error> {
    if let Some(survey) = fetch_survey_for_order(order_id, &mut *conn).await? {
        return Ok(survey);
    }
    let survey: CustomerSurvey =
        sqlx::query_as("INSERT INTO customer_surveys (order_id) VALUES ($1) RETURNING *").bind(order_id).fetch_one(conn).await?;
    debug!("🗃️ Survey #{} created for order {order_id}", survey.id);
    Ok(survey)
}
