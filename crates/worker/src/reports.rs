//! Scheduled report dispatch
//!
//! Each tick selects the schedule tasks whose `execute_at` landed inside the
//! minute just elapsed, replays their stored chart parameters through the
//! chart and analysis APIs, and emails the result through the default SMTP
//! configuration. A successfully dispatched task is rearmed at its next cron
//! occurrence; a failing task is logged and left alone.

use chartsight_api::email::Mailer;
use chartsight_shared::schedule::next_occurrence;
use serde::Deserialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Width of the dispatch window
pub const WINDOW_SECONDS: i64 = 60;

/// Whether a task's execute_at falls inside the elapsed window
///
/// The lower bound is exclusive so a task sitting exactly on a tick boundary
/// is picked up by exactly one of the two adjacent windows.
pub fn in_window(
    execute_at: OffsetDateTime,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
) -> bool {
    execute_at > window_start && execute_at <= window_end
}

#[derive(Debug, sqlx::FromRow)]
struct DueTask {
    id: Uuid,
    user_id: Uuid,
    cron_expression: String,
    parameter: serde_json::Value,
    execute_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskOwner {
    email: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    analysis: String,
}

/// Chart-image generation API client
#[derive(Clone)]
pub struct ChartClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChartClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Render the stored chart parameters into image URLs
    pub async fn generate(&self, parameter: &serde_json::Value) -> anyhow::Result<Vec<String>> {
        let response: ChartResponse = self
            .http
            .post(format!("{}/render", self.base_url))
            .json(parameter)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.images)
    }
}

/// Chart analysis API client
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Run the analysis step over generated chart images
    pub async fn analyze(&self, images: &[String]) -> anyhow::Result<String> {
        let response: AnalysisResponse = self
            .http
            .post(format!("{}/analyze", self.base_url))
            .json(&serde_json::json!({ "images": images }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.analysis)
    }
}

/// Counts for one dispatch tick
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    pub due: usize,
    pub dispatched: usize,
    pub rearmed: usize,
    pub exhausted: usize,
    pub errors: usize,
}

/// The per-minute report dispatcher
pub struct ReportDispatcher {
    pool: PgPool,
    charts: ChartClient,
    analysis: AnalysisClient,
    mailer: Mailer,
}

impl ReportDispatcher {
    pub fn new(
        pool: PgPool,
        charts: ChartClient,
        analysis: AnalysisClient,
        mailer: Mailer,
    ) -> Self {
        Self {
            pool,
            charts,
            analysis,
            mailer,
        }
    }

    /// Dispatch everything due in the minute that just elapsed
    pub async fn run_tick(&self) -> DispatchSummary {
        let window_end = OffsetDateTime::now_utc();
        let window_start = window_end - Duration::seconds(WINDOW_SECONDS);
        self.run_window(window_start, window_end).await
    }

    pub async fn run_window(
        &self,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
    ) -> DispatchSummary {
        let due: Vec<DueTask> = match sqlx::query_as(
            r#"
            SELECT id, user_id, cron_expression, parameter, execute_at
            FROM schedule_tasks
            WHERE executed = FALSE AND execute_at > $1 AND execute_at <= $2
            ORDER BY execute_at ASC
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load due schedule tasks");
                return DispatchSummary::default();
            }
        };

        let mut summary = DispatchSummary {
            due: due.len(),
            ..Default::default()
        };

        for task in due {
            match self.dispatch_one(&task).await {
                Ok(()) => {
                    summary.dispatched += 1;
                    match self.rearm(&task, window_end).await {
                        Ok(true) => summary.rearmed += 1,
                        Ok(false) => summary.exhausted += 1,
                        Err(e) => {
                            tracing::error!(
                                task_id = %task.id,
                                error = %e,
                                "Failed to rearm schedule task"
                            );
                            summary.errors += 1;
                        }
                    }
                }
                Err(e) => {
                    // No retry and no dead-letter: log and move on
                    tracing::error!(
                        task_id = %task.id,
                        user_id = %task.user_id,
                        error = %e,
                        "Report dispatch failed"
                    );
                    summary.errors += 1;
                }
            }
        }

        if summary.due > 0 {
            tracing::info!(
                due = summary.due,
                dispatched = summary.dispatched,
                rearmed = summary.rearmed,
                exhausted = summary.exhausted,
                errors = summary.errors,
                "Report dispatch tick complete"
            );
        }

        summary
    }

    /// Generate and email one report on behalf of the task's owner
    async fn dispatch_one(&self, task: &DueTask) -> anyhow::Result<()> {
        let owner: Option<TaskOwner> =
            sqlx::query_as("SELECT email, display_name FROM users WHERE id = $1")
                .bind(task.user_id)
                .fetch_optional(&self.pool)
                .await?;
        let owner = owner.ok_or_else(|| anyhow::anyhow!("task owner {} not found", task.user_id))?;

        let images = self.charts.generate(&task.parameter).await?;
        if images.is_empty() {
            anyhow::bail!("chart API returned no images");
        }

        let analysis = self.analysis.analyze(&images).await?;

        let body = render_report_email(&owner.display_name, &analysis, &images);
        self.mailer
            .send(&owner.email, "Your scheduled chart report", body)
            .await?;

        tracing::info!(
            task_id = %task.id,
            user_id = %task.user_id,
            images = images.len(),
            "Report dispatched"
        );
        Ok(())
    }

    /// Advance `execute_at` to the next cron occurrence; a schedule with no
    /// further occurrence is marked executed and retired.
    async fn rearm(&self, task: &DueTask, after: OffsetDateTime) -> anyhow::Result<bool> {
        match next_occurrence(&task.cron_expression, after) {
            Some(next) => {
                sqlx::query(
                    "UPDATE schedule_tasks SET execute_at = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(next)
                .bind(task.id)
                .execute(&self.pool)
                .await?;
                Ok(true)
            }
            None => {
                tracing::warn!(
                    task_id = %task.id,
                    cron = %task.cron_expression,
                    "Schedule has no next occurrence; marking executed"
                );
                sqlx::query(
                    "UPDATE schedule_tasks SET executed = TRUE, updated_at = NOW() WHERE id = $1",
                )
                .bind(task.id)
                .execute(&self.pool)
                .await?;
                Ok(false)
            }
        }
    }
}

fn render_report_email(display_name: &str, analysis: &str, images: &[String]) -> String {
    let image_tags: String = images
        .iter()
        .map(|url| format!("<p><img src=\"{}\" alt=\"chart\" /></p>", url))
        .collect();

    format!(
        "<html><body>\
         <p>Hi {},</p>\
         <p>Here is your scheduled chart report.</p>\
         {}\
         <h3>Analysis</h3>\
         <p>{}</p>\
         </body></html>",
        display_name, image_tags, analysis
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // =========================================================================
    // Window selection: only the minute just elapsed counts
    // =========================================================================
    #[test]
    fn test_task_inside_window_is_due() {
        let start = datetime!(2024-03-01 09:00:00 UTC);
        let end = datetime!(2024-03-01 09:01:00 UTC);
        assert!(in_window(datetime!(2024-03-01 09:00:30 UTC), start, end));
    }

    #[test]
    fn test_window_end_is_inclusive() {
        let start = datetime!(2024-03-01 09:00:00 UTC);
        let end = datetime!(2024-03-01 09:01:00 UTC);
        assert!(in_window(end, start, end));
    }

    #[test]
    fn test_window_start_is_exclusive() {
        // The previous tick's window already covered its own end
        let start = datetime!(2024-03-01 09:00:00 UTC);
        let end = datetime!(2024-03-01 09:01:00 UTC);
        assert!(!in_window(start, start, end));
    }

    #[test]
    fn test_task_before_window_is_not_due() {
        let start = datetime!(2024-03-01 09:00:00 UTC);
        let end = datetime!(2024-03-01 09:01:00 UTC);
        assert!(!in_window(datetime!(2024-03-01 08:59:59 UTC), start, end));
    }

    #[test]
    fn test_task_after_window_is_not_due() {
        let start = datetime!(2024-03-01 09:00:00 UTC);
        let end = datetime!(2024-03-01 09:01:00 UTC);
        assert!(!in_window(datetime!(2024-03-01 09:01:01 UTC), start, end));
    }

    // =========================================================================
    // Report email rendering
    // =========================================================================
    #[test]
    fn test_report_email_includes_images_and_analysis() {
        let body = render_report_email(
            "Dana",
            "EURUSD is consolidating.",
            &["https://charts.example/a.png".to_string()],
        );
        assert!(body.contains("Hi Dana"));
        assert!(body.contains("https://charts.example/a.png"));
        assert!(body.contains("EURUSD is consolidating."));
    }
}
