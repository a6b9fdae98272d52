//! Read-only aggregate reports over the `tests` table.

use crate::models::{MonthlyProgress, ProjectProgress, Stats};
use crate::storage::Storage;

/// Most recent month buckets returned by [`monthly_progress`].
pub const MONTHLY_BUCKETS: i64 = 6;

/// `completed / total` as a two-decimal percentage string; `"0.00%"` when empty.
pub fn success_rate(completed: i64, total: i64) -> String {
    if total <= 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", completed as f64 / total as f64 * 100.0)
}

/// Whole-number percentage (half rounds up); 0 when empty.
pub fn rounded_percentage(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as i64
}

/// Totals per status in a single aggregate pass.
pub async fn stats(storage: &Storage) -> Result<Stats, sqlx::Error> {
    let (total, completed, failed, pending): (i64, i64, i64, i64) = sqlx::query_as(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)
         FROM tests",
    )
    .fetch_one(storage.pool())
    .await?;

    Ok(Stats {
        total_tests: total,
        passed_tests: completed,
        failed_tests: failed,
        pending_tests: pending,
        success_rate: success_rate(completed, total),
    })
}

/// Status counts grouped by `YYYY-MM` of `created_at`, newest month first.
pub async fn monthly_progress(storage: &Storage) -> Result<Vec<MonthlyProgress>, sqlx::Error> {
    // created_at is stored as RFC 3339 text, so its first 7 chars are the bucket.
    sqlx::query_as::<_, MonthlyProgress>(
        "SELECT
            substr(created_at, 1, 7) AS month,
            SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
            SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed,
            SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) AS pending
         FROM tests
         GROUP BY month
         ORDER BY month DESC
         LIMIT ?",
    )
    .bind(MONTHLY_BUCKETS)
    .fetch_all(storage.pool())
    .await
}

/// Completed share per project, including projects without tests.
pub async fn project_progress(storage: &Storage) -> Result<Vec<ProjectProgress>, sqlx::Error> {
    let rows: Vec<(i64, String, i64, i64)> = sqlx::query_as(
        "SELECT
            p.id,
            p.name,
            COUNT(t.id),
            COALESCE(SUM(CASE WHEN t.status = 'completed' THEN 1 ELSE 0 END), 0)
         FROM projects p
         LEFT JOIN tests t ON t.project_id = p.id
         GROUP BY p.id, p.name
         ORDER BY p.id",
    )
    .fetch_all(storage.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(project_id, name, total, completed)| ProjectProgress {
            project_id,
            name,
            total_tests: total,
            completed_tests: completed,
            success_rate: rounded_percentage(completed, total),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectFields, TestFields, TestStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    async fn add_test(storage: &Storage, status: TestStatus, project_id: Option<i64>, when: DateTime<Utc>) {
        let fields = TestFields {
            name: format!("{} case", status),
            status: Some(status),
            project_id: project_id.map(Some),
            user_id: None,
        };
        storage.create_test(&fields, when).await.unwrap();
    }

    #[test]
    fn test_success_rate_formatting() {
        assert_eq!(success_rate(0, 0), "0.00%");
        assert_eq!(success_rate(1, 3), "33.33%");
        assert_eq!(success_rate(2, 2), "100.00%");
        assert_eq!(rounded_percentage(0, 0), 0);
        assert_eq!(rounded_percentage(1, 2), 50);
        assert_eq!(rounded_percentage(2, 3), 67);
    }

    #[tokio::test]
    async fn test_stats_on_empty_table() {
        let storage = Storage::open_in_memory().await.unwrap();
        let stats = stats(&storage).await.unwrap();
        assert_eq!(stats.total_tests, 0);
        assert_eq!(stats.passed_tests, 0);
        assert_eq!(stats.success_rate, "0.00%");
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let storage = Storage::open_in_memory().await.unwrap();
        let now = Utc::now();
        add_test(&storage, TestStatus::Completed, None, now).await;
        add_test(&storage, TestStatus::Completed, None, now).await;
        add_test(&storage, TestStatus::Failed, None, now).await;
        add_test(&storage, TestStatus::Pending, None, now).await;
        add_test(&storage, TestStatus::InProgress, None, now).await;

        let stats = stats(&storage).await.unwrap();
        assert_eq!(stats.total_tests, 5);
        assert_eq!(stats.passed_tests, 2);
        assert_eq!(stats.failed_tests, 1);
        assert_eq!(stats.pending_tests, 1);
        assert_eq!(stats.success_rate, "40.00%");
    }

    #[tokio::test]
    async fn test_monthly_progress_newest_six() {
        let storage = Storage::open_in_memory().await.unwrap();
        for month in 1..=8 {
            add_test(&storage, TestStatus::Completed, None, at(2026, month, 3)).await;
        }
        add_test(&storage, TestStatus::Failed, None, at(2026, 8, 20)).await;
        add_test(&storage, TestStatus::Pending, None, at(2026, 8, 21)).await;
        add_test(&storage, TestStatus::Completed, None, at(2025, 12, 31)).await;

        let buckets = monthly_progress(&storage).await.unwrap();
        let months: Vec<&str> = buckets.iter().map(|b| b.month.as_str()).collect();
        assert_eq!(months, vec!["2026-08", "2026-07", "2026-06", "2026-05", "2026-04", "2026-03"]);
        assert!(buckets.windows(2).all(|w| w[0].month > w[1].month));

        let august = &buckets[0];
        assert_eq!((august.completed, august.failed, august.pending), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_monthly_progress_empty() {
        let storage = Storage::open_in_memory().await.unwrap();
        assert!(monthly_progress(&storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_project_progress_includes_empty_projects() {
        let storage = Storage::open_in_memory().await.unwrap();
        let now = Utc::now();
        let fields = |name: &str| ProjectFields {
            name: name.to_string(),
            description: None,
            status: None,
        };
        let checkout = storage.create_project(&fields("Checkout"), now).await.unwrap();
        let search = storage.create_project(&fields("Search"), now).await.unwrap();

        add_test(&storage, TestStatus::Completed, Some(checkout), now).await;
        add_test(&storage, TestStatus::Completed, Some(checkout), now).await;
        add_test(&storage, TestStatus::Failed, Some(checkout), now).await;
        // Dangling reference is ignored by the join.
        add_test(&storage, TestStatus::Completed, Some(404), now).await;

        let progress = project_progress(&storage).await.unwrap();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].project_id, checkout);
        assert_eq!(progress[0].total_tests, 3);
        assert_eq!(progress[0].completed_tests, 2);
        assert_eq!(progress[0].success_rate, 67);
        assert_eq!(progress[1].project_id, search);
        assert_eq!(progress[1].total_tests, 0);
        assert_eq!(progress[1].success_rate, 0);
    }
}
