use anyhow::Context;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::RunSummary;
use crate::pipeline::{PipelineConfig, PipelineOutput};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores a run and its three output tables in one transaction.
pub async fn publish_run(
    pool: &PgPool,
    run_id: Uuid,
    config: &PipelineConfig,
    output: &PipelineOutput,
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await.context("failed to open transaction")?;

    sqlx::query(
        r#"
        INSERT INTO visitor_forecast.runs (id, created_at, phi, horizon, season_start)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(run_id)
    .bind(Utc::now())
    .bind(config.phi)
    .bind(config.horizon as i32)
    .bind(config.season_start.map(|start| start.to_string()))
    .execute(&mut *tx)
    .await?;

    let mut inserted = 0usize;

    for row in output.monthly.rows() {
        sqlx::query(
            r#"
            INSERT INTO visitor_forecast.monthly_forecasts
            (run_id, year, month, visitor_type, value)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(row.year)
        .bind(row.month as i32)
        .bind(row.key.as_str())
        .bind(row.value)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    for row in output.daily.rows() {
        sqlx::query(
            r#"
            INSERT INTO visitor_forecast.daily_visitors
            (run_id, year, month, visitor_type, monthly_nights, avg_stay, daily_visitors)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run_id)
        .bind(row.year)
        .bind(row.month as i32)
        .bind(row.key.as_str())
        .bind(row.monthly_nights)
        .bind(row.avg_stay)
        .bind(row.daily_visitors)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    for row in &output.sites {
        sqlx::query(
            r#"
            INSERT INTO visitor_forecast.site_forecasts
            (run_id, year, month, site_id, daily_visitors)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(row.year)
        .bind(row.month as i32)
        .bind(&row.site_id)
        .bind(row.daily_visitors)
        .execute(&mut *tx)
        .await?;
        inserted += 1;
    }

    tx.commit().await.context("failed to commit forecast run")?;
    Ok(inserted)
}

pub async fn fetch_runs(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<RunSummary>> {
    let records = sqlx::query(
        r#"
        SELECT r.id, r.created_at, r.phi, r.horizon, r.season_start,
               (SELECT COUNT(*) FROM visitor_forecast.site_forecasts s WHERE s.run_id = r.id)
                   AS site_rows
        FROM visitor_forecast.runs r
        ORDER BY r.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    let mut runs = Vec::with_capacity(records.len());
    for row in records {
        runs.push(RunSummary {
            run_id: row.get("id"),
            created_at: row.get("created_at"),
            phi: row.get("phi"),
            horizon: row.get("horizon"),
            season_start: row.get("season_start"),
            site_rows: row.get("site_rows"),
        });
    }

    Ok(runs)
}
