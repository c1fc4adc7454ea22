//! Integration tests for task storage, positions, and the activity log.

mod common;

use common::*;
use mission_control::types::{ActivityQuery, NewTask, Priority, TaskStatus, TaskUpdate};

mod position_tests {
    use super::*;

    #[test]
    fn sequential_creates_append_to_the_column() {
        let db = setup_db();
        let a = db.create_task(NewTask::titled("a")).unwrap();
        let b = db.create_task(NewTask::titled("b")).unwrap();
        let c = db.create_task(NewTask::titled("c")).unwrap();

        assert!(a.position < b.position && b.position < c.position);
        assert_eq!(
            db.column_order(TaskStatus::Backlog).unwrap(),
            vec![a.id, b.id, c.id]
        );
    }

    #[test]
    fn default_move_goes_to_the_bottom() {
        let db = setup_db();
        let first = db
            .create_task(NewTask {
                status: TaskStatus::PendingApproval,
                ..NewTask::titled("already waiting")
            })
            .unwrap();
        let task = db.create_task(NewTask::titled("mover")).unwrap();

        let moved = db
            .move_task(&task.id, TaskStatus::PendingApproval, None)
            .unwrap()
            .unwrap();
        assert!(moved.position > first.position);
        assert_eq!(
            db.column_order(TaskStatus::PendingApproval).unwrap(),
            vec![first.id, moved.id]
        );
    }

    #[test]
    fn explicit_position_is_respected() {
        let db = setup_db();
        let a = db.create_task(NewTask::titled("a")).unwrap();
        let b = db.create_task(NewTask::titled("b")).unwrap();

        let moved = db
            .move_task(&b.id, TaskStatus::Backlog, Some(-1))
            .unwrap()
            .unwrap();
        assert_eq!(moved.position, -1);
        assert_eq!(db.column_order(TaskStatus::Backlog).unwrap(), vec![b.id, a.id]);
    }

    #[test]
    fn repeated_moves_keep_untouched_tasks_in_order() {
        let db = setup_db();
        let ids: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|t| db.create_task(NewTask::titled(*t)).unwrap().id)
            .collect();
        let (a, b, c, d, e) = (&ids[0], &ids[1], &ids[2], &ids[3], &ids[4]);

        db.move_task(d, TaskStatus::Backlog, Some(-1)).unwrap();
        db.move_task(b, TaskStatus::Backlog, Some(10)).unwrap();
        db.move_task(e, TaskStatus::Backlog, Some(-2)).unwrap();
        db.move_task(b, TaskStatus::Backlog, Some(-3)).unwrap();

        let order = db.column_order(TaskStatus::Backlog).unwrap();
        assert_eq!(order, vec![b.clone(), e.clone(), d.clone(), a.clone(), c.clone()]);

        // Landing on an occupied slot sorts by creation among equals.
        db.move_task(c, TaskStatus::Backlog, Some(0)).unwrap();
        let order = db.column_order(TaskStatus::Backlog).unwrap();
        assert_eq!(order, vec![b.clone(), e.clone(), d.clone(), a.clone(), c.clone()]);
    }

    #[test]
    fn reposition_within_column_does_not_log_a_move() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("stay")).unwrap();
        db.move_task(&task.id, TaskStatus::Backlog, Some(7)).unwrap();
        assert_eq!(actions_for(&db, &task.id), vec!["created".to_string()]);
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn create_defaults() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("defaults")).unwrap();
        assert_eq!(task.status, TaskStatus::Backlog);
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.agent_done);
        assert!(task.completed_at.is_none());
        assert!(task.tags.is_empty());
        assert_eq!(actions_for(&db, &task.id), vec!["created".to_string()]);
    }

    #[test]
    fn completed_at_is_set_on_entering_done_and_kept_after_leaving() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("ship")).unwrap();

        let done = db.move_task(&task.id, TaskStatus::Done, None).unwrap().unwrap();
        let stamped = done.completed_at.expect("completed_at set");

        let reopened = db
            .move_task(&task.id, TaskStatus::InProgress, None)
            .unwrap()
            .unwrap();
        assert_eq!(reopened.completed_at, Some(stamped));
    }

    #[test]
    fn reentering_done_refreshes_completed_at() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("ship twice")).unwrap();

        let first = db.move_task(&task.id, TaskStatus::Done, None).unwrap().unwrap();
        db.move_task(&task.id, TaskStatus::InProgress, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = db.move_task(&task.id, TaskStatus::Done, None).unwrap().unwrap();

        assert!(second.completed_at.unwrap() > first.completed_at.unwrap());
        let moves = actions_for(&db, &task.id)
            .into_iter()
            .filter(|a| a == "moved")
            .count();
        assert_eq!(moves, 3);
    }

    #[test]
    fn dispatch_is_refused_once_the_task_left_backlog() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("raced")).unwrap();
        db.move_task(&task.id, TaskStatus::Done, None).unwrap();

        let err = db
            .record_dispatch(&task.id, "coder", "late-session", "run-9")
            .unwrap_err();
        assert_eq!(
            mission_control::error::ApiError::from(err).code,
            mission_control::error::ErrorCode::InvalidState
        );

        let stored = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
        assert!(stored.session_key.is_none());
        assert!(!actions_for(&db, &task.id).contains(&"dispatched".to_string()));
    }

    #[test]
    fn done_to_done_keeps_completed_at() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("ship")).unwrap();
        let done = db.move_task(&task.id, TaskStatus::Done, None).unwrap().unwrap();
        let again = db
            .move_task(&task.id, TaskStatus::Done, Some(0))
            .unwrap()
            .unwrap();
        assert_eq!(again.completed_at, done.completed_at);
    }

    #[test]
    fn created_directly_in_done_is_stamped() {
        let db = setup_db();
        let task = db
            .create_task(NewTask {
                status: TaskStatus::Done,
                ..NewTask::titled("retroactive")
            })
            .unwrap();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn move_logs_old_and_new_status() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("log me")).unwrap();
        db.move_task(&task.id, TaskStatus::InProgress, None).unwrap();

        let events = db
            .list_activity(&ActivityQuery {
                task_id: Some(task.id.clone()),
                limit: None,
            })
            .unwrap();
        let moved = events.iter().find(|e| e.action == "moved").unwrap();
        assert_eq!(
            moved.details.as_deref(),
            Some("Moved from backlog to in-progress")
        );
    }

    #[test]
    fn update_with_status_change_behaves_like_a_move() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("edit")).unwrap();
        let updated = db
            .update_task(
                &task.id,
                TaskUpdate {
                    title: Some("edited".into()),
                    status: Some(TaskStatus::Done),
                    priority: Some(Priority::Urgent),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "edited");
        assert_eq!(updated.priority, Priority::Urgent);
        assert_eq!(updated.status, TaskStatus::Done);
        assert!(updated.completed_at.is_some());
        assert!(actions_for(&db, &task.id).contains(&"moved".to_string()));
    }

    #[test]
    fn update_of_missing_task_is_none() {
        let db = setup_db();
        assert!(db.update_task("nope", TaskUpdate::default()).unwrap().is_none());
        assert!(db.move_task("nope", TaskStatus::Done, None).unwrap().is_none());
    }

    #[test]
    fn tags_survive_a_round_trip_through_storage() {
        let db = setup_db();
        let task = db
            .create_task(NewTask {
                tags: vec!["backend".into(), "urgent-fix".into()],
                ..NewTask::titled("tagged")
            })
            .unwrap();
        let fetched = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["backend", "urgent-fix"]);
    }

    #[test]
    fn list_filters_by_status() {
        let db = setup_db();
        db.create_task(NewTask::titled("backlog")).unwrap();
        db.create_task(NewTask {
            status: TaskStatus::Done,
            ..NewTask::titled("done")
        })
        .unwrap();

        assert_eq!(db.list_tasks(None).unwrap().len(), 2);
        let done = db.list_tasks(Some(TaskStatus::Done)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].title, "done");
    }
}

mod deletion_tests {
    use super::*;

    #[test]
    fn activity_outlives_the_task() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("short lived")).unwrap();
        db.delete_task(&task.id).unwrap().unwrap();

        assert!(db.get_task(&task.id).unwrap().is_none());
        let events = db
            .list_activity(&ActivityQuery {
                task_id: Some(task.id.clone()),
                limit: None,
            })
            .unwrap();
        let actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["deleted", "created"]);
        assert_eq!(
            events[0].details.as_deref(),
            Some("Deleted task: short lived")
        );
    }

    #[test]
    fn deleting_twice_reports_missing() {
        let db = setup_db();
        let task = db.create_task(NewTask::titled("once")).unwrap();
        assert!(db.delete_task(&task.id).unwrap().is_some());
        assert!(db.delete_task(&task.id).unwrap().is_none());
    }
}

mod on_disk_tests {
    use super::*;
    use mission_control::db::Database;
    use tempfile::TempDir;

    #[test]
    fn data_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.db");

        let id = {
            let db = Database::open(&path).unwrap();
            db.create_task(NewTask::titled("persisted")).unwrap().id
        };

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_task(&id).unwrap().unwrap().title, "persisted");
    }
}
