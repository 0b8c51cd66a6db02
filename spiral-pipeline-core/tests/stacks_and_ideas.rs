use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use spiral_pipeline_core::catalog::{CatalogEntry, Scores, TechStack};
use spiral_pipeline_core::config::PipelineConfig;
use spiral_pipeline_core::contract::MockTextGenerator;
use spiral_pipeline_core::ideas::{generate_ideas, parse_ideas, popular_entries, recent_entries};
use spiral_pipeline_core::pipeline::{run_idea_generation, run_stack_generation};
use spiral_pipeline_core::queue::{ComparisonIdea, ContentQueue, QueueStatus, StackIdea};
use spiral_pipeline_core::stacks::{next_stack_id, stack_from_reply};
use spiral_pipeline_core::store;
use spiral_pipeline_core::template::{Template, TemplateSet};
use std::fs;
use tempfile::tempdir;

fn stack_idea(name: &str) -> StackIdea {
    serde_json::from_value(json!({
        "stack_name": name,
        "tagline": "Ship for under $100",
        "target_audience": "Solo founders",
        "badge": "Budget"
    }))
    .unwrap()
}

fn stack_reply(ids: &[u32]) -> String {
    json!({
        "stack_name": "Bootstrapped SaaS",
        "description": "Everything a solo founder needs",
        "tool_ids": ids,
        "total_monthly_cost": "$85"
    })
    .to_string()
}

#[test]
fn stack_reply_is_completed_from_the_idea() {
    let stack = stack_from_reply(&stack_reply(&[1, 2, 3, 4, 5]), &stack_idea("Bootstrapped SaaS"), 7).unwrap();
    assert_eq!(stack.id, 7);
    assert_eq!(stack.view_count, 0);
    assert_eq!(stack.status.as_deref(), Some("published"));
    assert_eq!(stack.tagline, "Ship for under $100");
    assert_eq!(stack.badge.as_deref(), Some("Budget"));
}

#[test]
fn stacks_need_five_tools() {
    let err = stack_from_reply(&stack_reply(&[1, 2, 3]), &stack_idea("Tiny"), 1).unwrap_err();
    assert!(err.contains("at least 5"), "{err}");
    assert!(stack_from_reply("not json", &stack_idea("Tiny"), 1).is_err());
}

#[test]
fn stack_ids_continue_after_the_highest() {
    assert_eq!(next_stack_id(&[]), 1);
    let existing: Vec<TechStack> = vec![
        serde_json::from_value(json!({"id": 3, "stack_name": "a"})).unwrap(),
        serde_json::from_value(json!({"id": 9, "stack_name": "b"})).unwrap(),
    ];
    assert_eq!(next_stack_id(&existing), 10);
}

#[tokio::test]
async fn stack_run_publishes_and_marks_the_queue() {
    let site = tempdir().unwrap();
    let mut config = PipelineConfig {
        data_root: site.path().to_path_buf(),
        ..Default::default()
    };
    config.stacks.pause_ms = 0;
    let paths = config.paths();
    fs::create_dir_all(paths.catalog.parent().unwrap()).unwrap();
    store::write_json(&paths.catalog, &vec![CatalogEntry::new(1, "Stripe", "Payments")]).unwrap();

    let mut queue = ContentQueue::default();
    queue.enqueue(vec![stack_idea("Good"), stack_idea("Thin"), stack_idea("Later")], Utc::now());
    store::write_json(&paths.stack_queue, &queue).unwrap();

    let mut generator = MockTextGenerator::new();
    generator
        .expect_generate_text()
        .times(2)
        .returning(|prompt, _| {
            if prompt.contains("Thin") {
                Ok(stack_reply(&[1]))
            } else {
                Ok(stack_reply(&[1, 2, 3, 4, 5]))
            }
        });

    let report = run_stack_generation(&config, &TemplateSet::builtin(), &generator)
        .await
        .unwrap();
    assert_eq!(report.published.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.total_stacks, 1);
    assert_eq!(report.remaining, 2);

    let stacks: Vec<TechStack> = store::read_json(&paths.stacks).unwrap();
    assert_eq!(stacks[0].id, 1);
    let saved: ContentQueue<StackIdea> = store::read_json(&paths.stack_queue).unwrap();
    let statuses: Vec<QueueStatus> = saved.queue.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![QueueStatus::Generated, QueueStatus::Pending, QueueStatus::Pending]
    );
}

fn recent_catalog(now: chrono::DateTime<Utc>) -> Vec<CatalogEntry> {
    let mut fresh = CatalogEntry::new(1, "Bun", "Developer Tools");
    fresh.discovered_at = Some(now - Duration::days(3));
    let mut old = CatalogEntry::new(2, "Node", "Developer Tools");
    old.created_at = Some(now - Duration::days(400));
    old.apply_scores(
        Scores { overall: 90, value: 5, ease: 4, features: 5 },
        Vec::new(),
        now,
    );
    let mut borderline = CatalogEntry::new(3, "Deno", "Developer Tools");
    borderline.apply_scores(
        Scores { overall: 80, value: 3, ease: 3, features: 3 },
        Vec::new(),
        now,
    );
    vec![fresh, old, borderline]
}

#[test]
fn recent_and_popular_selection() {
    let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
    let catalog = recent_catalog(now);
    let recent: Vec<u32> = recent_entries(&catalog, now).iter().map(|e| e.id).collect();
    let popular: Vec<u32> = popular_entries(&catalog).iter().map(|e| e.id).collect();
    assert_eq!(recent, vec![1]);
    assert_eq!(popular, vec![2]);
}

#[test]
fn malformed_ideas_are_dropped_and_the_rest_forced_pending() {
    let ideas = parse_ideas(&json!([
        {"title": "Bun vs Node", "toolNames": ["Bun", "Node"], "priority": 1, "status": "generated"},
        {"title": "", "toolNames": ["Bun"]},
        {"title": "No tools"},
        {"toolNames": ["Bun"]},
        42
    ]))
    .unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].status, QueueStatus::Pending);
    assert!(parse_ideas(&json!({"title": "x"})).is_err());
}

#[tokio::test]
async fn nothing_recent_means_no_model_call() {
    let now = Utc::now();
    let mut catalog = recent_catalog(now);
    catalog.remove(0);
    let mut generator = MockTextGenerator::new();
    generator.expect_generate_text().never();
    let ideas = generate_ideas(
        &generator,
        &Template::new("ideas", "{recent_tools}"),
        &catalog,
        &Default::default(),
        now,
    )
    .await
    .unwrap();
    assert!(ideas.is_empty());
}

#[tokio::test]
async fn idea_run_enqueues_only_new_titles() {
    let site = tempdir().unwrap();
    let config = PipelineConfig {
        data_root: site.path().to_path_buf(),
        ..Default::default()
    };
    let paths = config.paths();
    let now = Utc::now();
    fs::create_dir_all(paths.catalog.parent().unwrap()).unwrap();
    store::write_json(&paths.catalog, &recent_catalog(now)).unwrap();

    let mut queue = ContentQueue::default();
    queue.enqueue(vec![ComparisonIdea::new("Bun vs Node", vec!["Bun".into()])], now);
    store::write_json(&paths.content_queue, &queue).unwrap();

    let mut generator = MockTextGenerator::new();
    generator
        .expect_generate_text()
        .withf(|prompt, _| prompt.contains("- Bun (Developer Tools"))
        .times(1)
        .returning(|_, _| {
            Ok(json!([
                {"title": "BUN VS NODE", "toolNames": ["Bun", "Node"]},
                {"title": "Bun vs Deno", "toolNames": ["Bun", "Deno"], "keywords": "bun deno"}
            ])
            .to_string())
        });

    let report = run_idea_generation(&config, &TemplateSet::builtin(), &generator, now)
        .await
        .unwrap();
    assert_eq!(report.proposed, 2);
    assert_eq!(report.added, 1);
    assert_eq!(report.pending, 2);

    let saved: ContentQueue<ComparisonIdea> = store::read_json(&paths.content_queue).unwrap();
    assert_eq!(saved.queue[1].title, "Bun vs Deno");
}
