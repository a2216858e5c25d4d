//! Tests for the built-in templates and template instantiation.

use std::collections::BTreeMap;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::templates::NewTemplate;
use taskflow_mcp::error::{ErrorCode, error_code};
use taskflow_mcp::types::{Priority, TaskStatus, TemplateField};

fn setup() -> Engine {
    Engine::in_memory().expect("Failed to create in-memory engine")
}

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn with_active_project(engine: &Engine) -> String {
    let project = engine.db().create_project("Mobile", "").expect("Failed to create project");
    engine.db().set_active_project(&project.id).expect("Failed to set active project");
    project.id
}

#[test]
fn defaults_are_seeded_in_both_languages() {
    let engine = setup();
    let all = engine.templates.list(None, false).unwrap();
    assert!(all.iter().any(|t| t.id == "bug-report-en"));
    assert!(all.iter().any(|t| t.id == "bug-report-tr"));

    // Seeding again adds nothing.
    assert_eq!(engine.templates.seed_defaults().unwrap(), 0);

    let bug = engine.templates.get("bug_report").unwrap();
    assert_eq!(bug.language_code, "en");
}

#[test]
fn bug_report_goes_into_the_active_project() {
    let engine = setup();
    let project_id = with_active_project(&engine);

    let task = engine
        .instantiate_template("bug_report", &values(&[("title", "crash"), ("severity", "high")]))
        .unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.project_id.as_deref(), Some(project_id.as_str()));
    assert_eq!(task.title, "🐛 [general] crash");
    assert_eq!(task.priority, Priority::Medium);
    assert!(task.tags.contains(&"bug".to_string()));
    assert!(task.description.contains("**Severity:** high"));

    let interactions = engine.tracker.recent_interactions(5).unwrap();
    assert!(interactions.iter().any(|i| i.task_id == task.id && i.action == "created"));
}

#[test]
fn missing_required_field_is_reported() {
    let engine = setup();
    with_active_project(&engine);

    let err = engine
        .instantiate_template("bug_report", &values(&[("title", "crash")]))
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::RequiredFieldMissing));
    assert_eq!(engine.db().count_tasks().unwrap(), 0);
}

#[test]
fn no_project_and_no_active_project_fails() {
    let engine = setup();
    let err = engine
        .instantiate_template("bug_report", &values(&[("title", "crash"), ("severity", "low")]))
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::NoActiveProject));
}

#[test]
fn explicit_project_wins_over_active() {
    let engine = setup();
    with_active_project(&engine);
    let other = engine.db().create_project("Other", "").unwrap();

    let task = engine
        .instantiate_template(
            "bug_report",
            &values(&[("title", "crash"), ("severity", "low"), ("project_id", &other.id)]),
        )
        .unwrap();
    assert_eq!(task.project_id, Some(other.id));
}

#[test]
fn custom_template_round_trip() {
    let engine = setup();
    with_active_project(&engine);

    let template = engine
        .templates
        .create_template(NewTemplate {
            name: "Release".into(),
            alias: Some("release".into()),
            category: "Ops".into(),
            title_pattern: "Release {{version}}".into(),
            body_pattern: "Ship {{version}} on {{date}}".into(),
            fields: vec![
                TemplateField::text("version", true),
                TemplateField::date("date", true),
            ],
            ..Default::default()
        })
        .unwrap();
    assert!(template.active);

    let err = engine
        .instantiate_template("release", &values(&[("version", "1.2"), ("date", "soon")]))
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));

    let task = engine
        .instantiate_template("release", &values(&[("version", "1.2"), ("date", "2025-06-01")]))
        .unwrap();
    assert_eq!(task.title, "Release 1.2");
    assert_eq!(task.description, "Ship 1.2 on 2025-06-01");

    let dup = engine
        .templates
        .create_template(NewTemplate {
            name: "Again".into(),
            alias: Some("release".into()),
            title_pattern: "x".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(error_code(&dup), Some(ErrorCode::InvalidFieldValue));
}

#[test]
fn deactivated_template_cannot_be_used() {
    let engine = setup();
    with_active_project(&engine);

    engine.templates.deactivate("bug_report").unwrap();
    let active = engine.templates.list(None, false).unwrap();
    assert!(!active.iter().any(|t| t.id == "bug-report-en"));

    let err = engine
        .instantiate_template("bug_report", &values(&[("title", "crash"), ("severity", "low")]))
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::TemplateNotFound));
}

#[test]
fn unknown_template_is_not_found() {
    let engine = setup();
    let err = engine.templates.get("nope").unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::TemplateNotFound));
}
