//! Integration tests for the SQLite task and catalog repositories.
//!
//! These tests use a real SQLite database (in-memory) to verify repository
//! operations against the migrated schema.

use std::sync::Arc;

use contented::database::repositories::{
    CatalogRepository, SqlxCatalogRepository, SqlxTaskRepository, TaskFilter, TaskRepository,
};
use contented::database::{DbPool, init_pool, run_migrations};
use contented::domain::{
    Container, Content, Screen, Task, TaskOperation, TaskRequest, TaskStatus,
};
use contented::Error;

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn content_task(op: TaskOperation, content_id: &str) -> Task {
    Task::new(TaskRequest::for_content(op, content_id))
}

mod database_tests {
    use super::*;

    #[tokio::test]
    async fn test_database_migrations() {
        let pool = setup_test_db().await;
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("Failed to query tables");
        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        assert!(table_names.contains(&"containers"), "containers table missing");
        assert!(table_names.contains(&"contents"), "contents table missing");
        assert!(table_names.contains(&"task_requests"), "task_requests table missing");
        assert!(table_names.contains(&"screens"), "screens table missing");
    }
}

mod task_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let repo = SqlxTaskRepository::new(setup_test_db().await);
        let mut task = content_task(TaskOperation::ScreenCapture, "c1");
        task.params.number_of_screens = 4;
        task.params.start_time_seconds = 30;

        let created = repo.create_task(&task).await.unwrap();
        assert_eq!(created.status, TaskStatus::New);

        let loaded = repo.get_task(&task.id).await.unwrap();
        assert_eq!(loaded.operation, TaskOperation::ScreenCapture);
        assert_eq!(loaded.content_id.as_deref(), Some("c1"));
        assert_eq!(loaded.params.number_of_screens, 4);
        assert_eq!(loaded.params.start_time_seconds, 30);
        assert_eq!(loaded.params.codec, "libx265");
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            created.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_get_unknown_task() {
        let repo = SqlxTaskRepository::new(setup_test_db().await);
        let err = repo.get_task("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let repo = SqlxTaskRepository::new(setup_test_db().await);
        let task = repo
            .create_task(&content_task(TaskOperation::ContentPreview, "c1"))
            .await
            .unwrap();

        let pending = task.with_status(TaskStatus::Pending).unwrap();
        repo.update_task(&pending, TaskStatus::New).await.unwrap();

        // Stale expectation: persisted status is PENDING, not NEW.
        let canceled = task.with_status(TaskStatus::Canceled).unwrap();
        let err = repo.update_task(&canceled, TaskStatus::New).await.unwrap_err();
        match err {
            Error::Conflict { expected, actual, .. } => {
                assert_eq!(expected, "new");
                assert_eq!(actual, "pending");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(
            repo.get_task(&task.id).await.unwrap().status,
            TaskStatus::Pending
        );

        let missing = content_task(TaskOperation::ContentPreview, "c1")
            .with_status(TaskStatus::Pending)
            .unwrap();
        assert!(
            repo.update_task(&missing, TaskStatus::New)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let repo = SqlxTaskRepository::new(setup_test_db().await);
        let task = repo
            .create_task(&content_task(TaskOperation::ContentPreview, "c1"))
            .await
            .unwrap();
        let canceled = task.with_status(TaskStatus::Canceled).unwrap();
        repo.update_task(&canceled, TaskStatus::New).await.unwrap();

        let mut again = canceled.clone();
        again.status = TaskStatus::InProgress;
        let err = repo
            .update_task(&again, TaskStatus::Canceled)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let repo = Arc::new(SqlxTaskRepository::new(setup_test_db().await));
        let task = repo
            .create_task(&content_task(TaskOperation::ContentPreview, "c1"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            let task = task.clone();
            handles.push(tokio::spawn(async move {
                let next = if i % 2 == 0 {
                    TaskStatus::InProgress
                } else {
                    TaskStatus::Canceled
                };
                repo.update_task(&task.with_status(next).unwrap(), TaskStatus::New)
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_recovery_queries() {
        let repo = SqlxTaskRepository::new(setup_test_db().await);
        let first = repo
            .create_task(&content_task(TaskOperation::ContentPreview, "c1"))
            .await
            .unwrap();
        let second = repo
            .create_task(&content_task(TaskOperation::ScreenCapture, "c2"))
            .await
            .unwrap();
        let third = repo
            .create_task(&Task::new(TaskRequest::for_container(
                TaskOperation::ContainerPreviews,
                "box",
            )))
            .await
            .unwrap();

        let running = second.with_status(TaskStatus::InProgress).unwrap();
        repo.update_task(&running, TaskStatus::New).await.unwrap();

        let (all, total) = repo.list_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);

        let (by_content, _) = repo
            .list_tasks(&TaskFilter::default().with_content("c1"))
            .await
            .unwrap();
        assert_eq!(by_content.len(), 1);
        assert_eq!(by_content[0].id, first.id);

        let (by_container, _) = repo
            .list_tasks(&TaskFilter::default().with_container("box"))
            .await
            .unwrap();
        assert_eq!(by_container[0].id, third.id);

        let (in_progress, total) = repo
            .list_tasks(&TaskFilter::default().with_status(TaskStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(in_progress[0].id, second.id);

        let queueable: Vec<String> = repo
            .list_queueable_tasks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(queueable, vec![first.id.clone(), third.id.clone()]);

        assert_eq!(repo.fail_interrupted_tasks("interrupted").await.unwrap(), 1);
        let failed = repo.get_task(&second.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.err_msg, "interrupted");
    }
}

mod catalog_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_container_and_content_crud() {
        let repo = SqlxCatalogRepository::new(setup_test_db().await);
        let container = Container::new("holiday", "/media");
        repo.create_container(&container).await.unwrap();

        let found = repo.find_container("/media", "holiday").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(container.id.clone()));
        assert!(repo.find_container("/media", "other").await.unwrap().is_none());

        let b = Content::new(&container.id, "b.jpg", "image/jpeg", 10, 1);
        let a = Content::new(&container.id, "a.mp4", "video/mp4", 20, 0);
        repo.create_content(&b).await.unwrap();
        repo.create_content(&a).await.unwrap();

        let listed = repo.list_contents(&container.id).await.unwrap();
        assert_eq!(
            listed.iter().map(|c| c.src.as_str()).collect::<Vec<_>>(),
            vec!["a.mp4", "b.jpg"]
        );

        let mut updated = listed[0].clone();
        updated.preview = "container_previews/a.mp4.jpg".to_string();
        updated.corrupt = true;
        repo.update_content(&updated).await.unwrap();
        let reloaded = repo.get_content(&updated.id).await.unwrap();
        assert_eq!(reloaded.preview, "container_previews/a.mp4.jpg");
        assert!(reloaded.corrupt);

        let mut container = repo.get_container(&container.id).await.unwrap();
        container.preview_url = format!("/preview/{}", a.id);
        repo.update_container(&container).await.unwrap();
        assert_eq!(
            repo.get_container(&container.id).await.unwrap().preview_url,
            format!("/preview/{}", a.id)
        );

        repo.delete_container(&container.id).await.unwrap();
        assert!(repo.get_content(&a.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_screens_replace_and_cascade() {
        let repo = SqlxCatalogRepository::new(setup_test_db().await);
        let container = Container::new("holiday", "/media");
        repo.create_container(&container).await.unwrap();
        let video = Content::new(&container.id, "a.mp4", "video/mp4", 20, 0);
        repo.create_content(&video).await.unwrap();

        let dir = container.preview_dir().to_string_lossy().into_owned();
        for idx in [2, 1] {
            let screen = Screen::new(&video.id, format!("a.mp4.screens.00{idx}.jpg"), &dir, idx, 5);
            repo.create_screen(&screen).await.unwrap();
        }
        let listed = repo.list_screens(&video.id).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.idx).collect::<Vec<_>>(), vec![1, 2]);

        let replacement = vec![Screen::new(&video.id, "a.mp4.screens.001.jpg", &dir, 1, 9)];
        repo.replace_screens(&video.id, &replacement).await.unwrap();
        let listed = repo.list_screens(&video.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, replacement[0].id);
        assert_eq!(listed[0].size_bytes, 9);

        let stray = vec![Screen::new("other", "x.jpg", &dir, 1, 0)];
        let err = repo.replace_screens(&video.id, &stray).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(repo.list_screens(&video.id).await.unwrap().len(), 1);

        repo.delete_content(&video.id).await.unwrap();
        assert!(repo.list_screens(&video.id).await.unwrap().is_empty());
    }
}
