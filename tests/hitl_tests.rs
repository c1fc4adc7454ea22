//! Integration tests for the human-in-the-loop queue.

mod common;

use common::*;
use mission_control::error::{ApiError, ErrorCode};
use mission_control::types::{
    ActivityQuery, HitlResponse, HitlStatus, NewHitlRequest, NewTask, Priority,
};

fn deploy_request(task_id: Option<String>) -> NewHitlRequest {
    NewHitlRequest {
        task_id,
        agent: Some("coder".into()),
        request_type: "deploy".into(),
        context: Some("Ship v2 to production?".into()),
        priority: Priority::High,
    }
}

fn code_of(err: anyhow::Error) -> ErrorCode {
    ApiError::from(err).code
}

#[test]
fn respond_resolves_once() {
    let db = setup_db();
    let request = db.create_hitl_request(deploy_request(None)).unwrap();

    let approved = db
        .respond_hitl_request(
            &request.id,
            HitlResponse {
                status: HitlStatus::Approved,
                response: Some("go ahead".into()),
            },
        )
        .unwrap();
    assert_eq!(approved.status, HitlStatus::Approved);
    assert_eq!(approved.response.as_deref(), Some("go ahead"));
    let resolved_at = approved.resolved_at.expect("resolved_at set");

    let err = db
        .respond_hitl_request(
            &request.id,
            HitlResponse {
                status: HitlStatus::Rejected,
                response: None,
            },
        )
        .unwrap_err();
    assert_eq!(code_of(err), ErrorCode::InvalidState);

    let unchanged = db.get_hitl_request(&request.id).unwrap().unwrap();
    assert_eq!(unchanged.status, HitlStatus::Approved);
    assert_eq!(unchanged.resolved_at, Some(resolved_at));
}

#[test]
fn respond_logs_a_human_event() {
    let db = setup_db();
    let task = db.create_task(NewTask::titled("needs sign-off")).unwrap();
    let request = db
        .create_hitl_request(deploy_request(Some(task.id.clone())))
        .unwrap();

    db.respond_hitl_request(
        &request.id,
        HitlResponse {
            status: HitlStatus::Modified,
            response: Some("staging first".into()),
        },
    )
    .unwrap();

    let events = db
        .list_activity(&ActivityQuery {
            task_id: Some(task.id),
            limit: None,
        })
        .unwrap();
    let decision = events.iter().find(|e| e.action == "modified").unwrap();
    assert_eq!(decision.agent, "human");
    assert_eq!(
        decision.details.as_deref(),
        Some("HITL request modified: deploy")
    );
}

#[test]
fn pending_is_not_a_valid_answer() {
    let db = setup_db();
    let request = db.create_hitl_request(deploy_request(None)).unwrap();
    let err = db
        .respond_hitl_request(
            &request.id,
            HitlResponse {
                status: HitlStatus::Pending,
                response: None,
            },
        )
        .unwrap_err();
    assert_eq!(code_of(err), ErrorCode::InvalidFieldValue);
}

#[test]
fn unknown_request_is_not_found() {
    let db = setup_db();
    let err = db
        .respond_hitl_request(
            "missing",
            HitlResponse {
                status: HitlStatus::Approved,
                response: None,
            },
        )
        .unwrap_err();
    assert_eq!(code_of(err), ErrorCode::HitlNotFound);
}

#[test]
fn list_filters_by_status() {
    let db = setup_db();
    let first = db.create_hitl_request(deploy_request(None)).unwrap();
    db.create_hitl_request(deploy_request(None)).unwrap();
    db.respond_hitl_request(
        &first.id,
        HitlResponse {
            status: HitlStatus::Rejected,
            response: None,
        },
    )
    .unwrap();

    assert_eq!(db.list_hitl_requests(Some(HitlStatus::Pending)).unwrap().len(), 1);
    assert_eq!(db.list_hitl_requests(Some(HitlStatus::Rejected)).unwrap().len(), 1);
    assert_eq!(db.list_hitl_requests(None).unwrap().len(), 2);
}
