//! Tests for advanced search, search history and filter profiles.

use chrono::NaiveDate;
use taskflow_mcp::db::now_ms;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::search::{MatchType, SearchRequest, SearchSort, SortOrder};
use taskflow_mcp::error::{ErrorCode, error_code};
use taskflow_mcp::types::{NewTask, Priority, SearchFilters, TaskStatus};

fn setup() -> Engine {
    Engine::in_memory().expect("Failed to create engine")
}

fn create(engine: &Engine, input: NewTask) -> String {
    engine.tasks.create(input).expect("Failed to create task").id
}

fn titled(title: &str) -> NewTask {
    NewTask {
        title: title.into(),
        ..Default::default()
    }
}

fn query(q: &str) -> SearchRequest {
    SearchRequest {
        query: q.into(),
        ..Default::default()
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

mod matching {
    use super::*;

    #[test]
    fn typo_falls_back_to_fuzzy_matching() {
        let engine = setup();
        create(&engine, titled("Database migration"));
        create(&engine, titled("Write release notes"));
        create(&engine, titled("Fix login bug"));

        let response = engine.search.search(query("migraton")).unwrap();
        assert!(response.used_fuzzy);
        assert_eq!(response.total, 1);
        assert_eq!(response.results[0].task.title, "Database migration");
        assert_eq!(response.results[0].match_type, MatchType::Fuzzy);
        assert_eq!(response.results[0].matched_fields, vec!["title"]);

        let strict = engine
            .search
            .search(SearchRequest {
                use_fuzzy: false,
                ..query("migraton")
            })
            .unwrap();
        assert_eq!(strict.total, 0);
        assert!(!strict.used_fuzzy);
    }

    #[test]
    fn title_hits_rank_above_description_hits() {
        let engine = setup();
        create(
            &engine,
            NewTask {
                title: "Release".into(),
                description: "deploy to staging".into(),
                ..Default::default()
            },
        );
        create(&engine, titled("Deploy API"));

        let response = engine.search.search(query("deploy")).unwrap();
        assert_eq!(response.total, 2);
        assert!(!response.used_fuzzy);
        assert_eq!(response.results[0].task.title, "Deploy API");
        assert_eq!(response.results[0].relevance, 1.0);
        assert_eq!(response.results[1].matched_fields, vec!["description"]);
        assert!((response.results[1].relevance - 0.8).abs() < 1e-9);
    }

    #[test]
    fn priority_and_activity_boost_relevance() {
        let engine = setup();
        let plain = create(&engine, titled("Cache layer"));
        let urgent = create(
            &engine,
            NewTask {
                title: "Cache invalidation".into(),
                priority: Priority::High,
                ..Default::default()
            },
        );
        let running = create(&engine, titled("Cache warmup"));
        engine.update_status(&running, TaskStatus::InProgress).unwrap();

        let response = engine.search.search(query("cache")).unwrap();
        let order: Vec<&str> = response.results.iter().map(|h| h.task.id.as_str()).collect();
        assert_eq!(order, vec![running.as_str(), urgent.as_str(), plain.as_str()]);
    }

    #[test]
    fn project_names_and_tags_are_searched() {
        let engine = setup();
        let project = engine.db().create_project("Apollo", "").unwrap();
        create(
            &engine,
            NewTask {
                title: "Launch checklist".into(),
                project_id: Some(project.id.clone()),
                tags: vec!["rocketry".into()],
                ..Default::default()
            },
        );

        let by_project = engine.search.search(query("apollo")).unwrap();
        assert_eq!(by_project.total, 1);
        assert_eq!(by_project.results[0].matched_fields, vec!["project"]);

        let by_tag = engine.search.search(query("rocket")).unwrap();
        assert_eq!(by_tag.results[0].matched_fields, vec!["tags"]);
    }
}

mod filtering {
    use super::*;

    #[test]
    fn filters_alone_select_tasks() {
        let engine = setup();
        let wanted = create(
            &engine,
            NewTask {
                title: "API auth".into(),
                priority: Priority::High,
                tags: vec!["backend".into(), "security".into()],
                ..Default::default()
            },
        );
        create(
            &engine,
            NewTask {
                title: "API docs".into(),
                tags: vec!["backend".into()],
                ..Default::default()
            },
        );
        create(
            &engine,
            NewTask {
                title: "Login page".into(),
                priority: Priority::High,
                tags: vec!["frontend".into()],
                ..Default::default()
            },
        );

        let response = engine
            .search
            .search(SearchRequest {
                filters: SearchFilters {
                    priority: vec![Priority::High],
                    tags: vec!["Backend".into()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.results[0].task.id, wanted);
        assert_eq!(response.results[0].match_type, MatchType::Filter);
    }

    #[test]
    fn completed_tasks_need_opting_in() {
        let engine = setup();
        let done = create(&engine, titled("Old report"));
        engine.update_status(&done, TaskStatus::InProgress).unwrap();
        engine.update_status(&done, TaskStatus::Completed).unwrap();

        assert_eq!(engine.search.search(query("report")).unwrap().total, 0);

        let included = engine
            .search
            .search(SearchRequest {
                include_completed: true,
                ..query("report")
            })
            .unwrap();
        assert_eq!(included.total, 1);

        let by_status = engine
            .search
            .search(SearchRequest {
                filters: SearchFilters {
                    status: vec![TaskStatus::Completed],
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_status.results[0].task.id, done);
    }

    #[test]
    fn due_bounds_are_inclusive_and_sortable() {
        let engine = setup();
        for (title, due) in [("january", "2030-01-10"), ("february", "2030-02-10"), ("march", "2030-03-10")] {
            create(
                &engine,
                NewTask {
                    title: title.into(),
                    due_date: Some(due.into()),
                    ..Default::default()
                },
            );
        }
        create(&engine, titled("undated"));

        let response = engine
            .search
            .search(SearchRequest {
                filters: SearchFilters {
                    due_after: Some(date("2030-02-10")),
                    due_before: Some(date("2030-03-10")),
                    ..Default::default()
                },
                sort_by: SearchSort::DueDate,
                sort_order: SortOrder::Asc,
                ..Default::default()
            })
            .unwrap();
        let titles: Vec<&str> = response.results.iter().map(|h| h.task.title.as_str()).collect();
        assert_eq!(titles, vec!["february", "march"]);
    }
}

mod history {
    use super::*;

    #[test]
    fn searches_are_recorded_newest_first() {
        let engine = setup();
        create(&engine, titled("alpha"));
        engine.search.search(query("alpha")).unwrap();
        engine
            .search
            .search(SearchRequest {
                filters: SearchFilters {
                    priority: vec![Priority::Low],
                    ..Default::default()
                },
                ..query("beta")
            })
            .unwrap();

        let history = engine.db().search_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "beta");
        assert_eq!(history[0].filters.priority, vec![Priority::Low]);
        assert_eq!(history[1].query, "alpha");
        assert_eq!(history[1].result_count, 1);

        assert_eq!(engine.db().clean_search_history(now_ms() - 60_000).unwrap(), 0);
        assert_eq!(engine.db().clean_search_history(now_ms() + 1).unwrap(), 2);
        assert!(engine.db().search_history(10).unwrap().is_empty());
    }
}

mod profiles {
    use super::*;

    fn high_only() -> SearchFilters {
        SearchFilters {
            priority: vec![Priority::High],
            ..Default::default()
        }
    }

    #[test]
    fn profile_supplies_filters_and_counts_uses() {
        let engine = setup();
        let high = create(
            &engine,
            NewTask {
                title: "Hotfix".into(),
                priority: Priority::High,
                ..Default::default()
            },
        );
        create(&engine, titled("Refactor"));
        let profile = engine
            .search
            .save_profile("urgent", "high priority only", &high_only(), "", false)
            .unwrap();

        let response = engine
            .search
            .search(SearchRequest {
                profile: Some("urgent".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(response.profile.as_deref(), Some("urgent"));
        assert_eq!(response.total, 1);
        assert_eq!(response.results[0].task.id, high);

        let reloaded = engine.search.profile(&profile.id).unwrap();
        assert_eq!(reloaded.use_count, 1);
        assert!(reloaded.last_used_at.is_some());
        assert_eq!(reloaded.filters, high_only());
    }

    #[test]
    fn names_are_unique_and_one_default_wins() {
        let engine = setup();
        engine.search.save_profile("mine", "", &high_only(), "", true).unwrap();

        let err = engine
            .search
            .save_profile("mine", "", &SearchFilters::default(), "", false)
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));

        engine
            .search
            .save_profile("team", "", &SearchFilters::default(), "review", true)
            .unwrap();
        let defaults = engine.db().list_filter_profiles(true).unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "team");
        assert_eq!(engine.db().list_filter_profiles(false).unwrap().len(), 2);
    }

    #[test]
    fn deleted_profile_is_not_found() {
        let engine = setup();
        engine.search.save_profile("temp", "", &high_only(), "", false).unwrap();
        assert!(engine.db().delete_filter_profile("temp").unwrap());
        assert!(!engine.db().delete_filter_profile("temp").unwrap());

        let err = engine.search.profile("temp").unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::ProfileNotFound));

        let err = engine
            .search
            .search(SearchRequest {
                profile: Some("temp".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::ProfileNotFound));
    }
}
