use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    InferenceResult, PredictionRow, RiskLevelSummary, StudentRecord, ENROLLMENT_NO, STUDENT_NAME,
};

const RISK_MIX_SQL: &str = "SELECT risk_label, COUNT(*) AS count, AVG(predicted_gpa) AS avg_gpa \
     FROM student_outcome.predictions \
     WHERE created_at >= $1 \
     GROUP BY risk_label \
     ORDER BY count DESC, risk_label ASC";

const LOWEST_PREDICTIONS_SQL: &str =
    "SELECT id, student_name, enrollment_no, predicted_gpa, risk_label, created_at \
     FROM student_outcome.predictions \
     WHERE created_at >= $1 \
     ORDER BY predicted_gpa ASC, created_at DESC \
     LIMIT $2";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn insert_prediction(
    pool: &PgPool,
    record: &StudentRecord,
    result: &InferenceResult,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO student_outcome.predictions
        (id, student_name, enrollment_no, predicted_gpa, risk_label, input)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(record.label(STUDENT_NAME))
    .bind(record.label(ENROLLMENT_NO))
    .bind(result.predicted_gpa)
    .bind(&result.risk_label)
    .bind(Json(record))
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn fetch_predictions(
    pool: &PgPool,
    since: DateTime<Utc>,
    risk_label: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<PredictionRow>> {
    let mut query = String::from(
        "SELECT id, student_name, enrollment_no, predicted_gpa, risk_label, created_at \
         FROM student_outcome.predictions \
         WHERE created_at >= $1",
    );

    if risk_label.is_some() {
        query.push_str(" AND risk_label = $3");
    }
    query.push_str(" ORDER BY created_at DESC LIMIT $2");

    let mut rows = sqlx::query(&query).bind(since).bind(limit);

    if let Some(value) = risk_label {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(prediction_from_row).collect())
}

/// Risk-level counts over every prediction in the window.
pub async fn fetch_risk_mix(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<RiskLevelSummary>> {
    let records = sqlx::query(RISK_MIX_SQL).bind(since).fetch_all(pool).await?;
    let mut summaries = Vec::with_capacity(records.len());

    for row in records {
        let count: i64 = row.get("count");
        let avg_gpa: Option<f64> = row.get("avg_gpa");
        summaries.push(RiskLevelSummary {
            risk_label: row.get("risk_label"),
            count: usize::try_from(count)?,
            avg_predicted_gpa: avg_gpa.unwrap_or(0.0),
        });
    }

    Ok(summaries)
}

/// The `limit` lowest predicted CGPAs in the window, regardless of age.
pub async fn fetch_lowest_predictions(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> anyhow::Result<Vec<PredictionRow>> {
    let records = sqlx::query(LOWEST_PREDICTIONS_SQL)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(records.iter().map(prediction_from_row).collect())
}

fn prediction_from_row(row: &PgRow) -> PredictionRow {
    PredictionRow {
        id: row.get("id"),
        student_name: row.get("student_name"),
        enrollment_no: row.get("enrollment_no"),
        predicted_gpa: row.get("predicted_gpa"),
        risk_label: row.get("risk_label"),
        created_at: row.get("created_at"),
    }
}
