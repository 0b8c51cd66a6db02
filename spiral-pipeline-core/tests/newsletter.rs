use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use spiral_pipeline_core::article::{ArticleIndex, ArticleSummary};
use spiral_pipeline_core::catalog::{CatalogEntry, FeaturedComparison, Scores};
use spiral_pipeline_core::config::PipelineConfig;
use spiral_pipeline_core::contract::{MockMailTransport, MockTextGenerator, TransportResponse};
use spiral_pipeline_core::error::NewsletterError;
use spiral_pipeline_core::mailing::{MailingClient, RetryPolicy};
use spiral_pipeline_core::newsletter::{
    generate_newsletter, prompt_substitutions, render_html, write_outputs, CatalogStats, Newsletter,
    NewsletterStats, Selection,
};
use spiral_pipeline_core::pipeline::{run_newsletter_send, Delivery};
use spiral_pipeline_core::store;
use spiral_pipeline_core::template::TemplateSet;
use std::fs;
use tempfile::tempdir;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

fn catalog() -> Vec<CatalogEntry> {
    let mut out = Vec::new();
    for (id, name, category, days_old, score) in [
        (1, "Fresh", "Hosting", 1, Some(70)),
        (2, "Older", "Hosting", 30, Some(92)),
        (3, "Middle", "Analytics", 6, Some(85)),
        (4, "Unrated", "Analytics", 400, None),
        (5, "Top", "Design Tools", 100, Some(95)),
    ] {
        let mut e = CatalogEntry::new(id, name, category);
        e.created_at = Some(now() - Duration::days(days_old));
        if let Some(overall) = score {
            e.apply_scores(
                Scores { overall, value: 3, ease: 3, features: 3 },
                Vec::new(),
                now(),
            );
        }
        out.push(e);
    }
    out[1].featured = Some(true);
    out
}

fn long_body() -> String {
    format!("# This week\n\n{}\n\n- **Fresh** is new", "A great week for builders. ".repeat(10))
}

/// Body replies at the body token limit, subject replies at the subject limit.
fn generator_with(body: String, subject: &'static str) -> MockTextGenerator {
    let mut generator = MockTextGenerator::new();
    generator.expect_generate_text().returning(move |_, opts| {
        if opts.max_tokens == 100 {
            Ok(subject.to_string())
        } else {
            Ok(body.clone())
        }
    });
    generator
}

#[test]
fn selection_picks_new_featured_and_popular() {
    let catalog = catalog();
    let selection = Selection::pick(&catalog, now());
    let names = |v: &[&CatalogEntry]| v.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&selection.new_entries), vec!["Fresh", "Middle"]);
    assert_eq!(names(&selection.featured), vec!["Older"]);
    assert_eq!(names(&selection.popular), vec!["Top", "Older", "Middle"]);
    assert_eq!(
        selection.stats,
        CatalogStats {
            total: 5,
            new_this_month: 1,
            categories: 3,
            top_category: Some("Analytics".to_string()),
        }
    );
}

#[test]
fn popular_comparisons_come_from_the_article_index() {
    let catalog = catalog();
    let selection = Selection::pick(&catalog, now());
    let empty = prompt_substitutions(&selection, &ArticleIndex::default(), &[]);
    assert!(empty.get("popular_comparisons").unwrap().contains("No comparison articles"));

    let mut index = ArticleIndex::default();
    index.upsert(
        ArticleSummary {
            slug: "a-vs-b".into(),
            title: "A vs B".into(),
            description: String::new(),
            published_date: "2025-05-30".into(),
            category: String::new(),
            tools: Vec::new(),
            keywords: String::new(),
            word_count: 0,
            extra: Default::default(),
        },
        now(),
    );
    let with_articles = prompt_substitutions(&selection, &index, &[]);
    assert_eq!(with_articles.get("popular_comparisons"), Some("- A vs B"));
}

#[test]
fn curated_comparisons_fill_in_for_an_empty_index() {
    let catalog = catalog();
    let selection = Selection::pick(&catalog, now());
    let curated: FeaturedComparison = serde_json::from_value(json!({
        "id": "stripe-vs-paddle",
        "tool1_id": 1,
        "tool2_id": 2,
        "tool1_slug": "stripe",
        "tool2_slug": "paddle",
        "title": "Stripe vs Paddle",
        "winner": "tool1"
    }))
    .unwrap();
    let subs = prompt_substitutions(&selection, &ArticleIndex::default(), &[curated]);
    assert_eq!(subs.get("popular_comparisons"), Some("- Stripe vs Paddle"));
}

#[tokio::test]
async fn short_body_is_fatal() {
    let generator = generator_with("Too short.".into(), "Fine subject");
    let err = generate_newsletter(
        &generator,
        &TemplateSet::builtin(),
        &catalog(),
        &ArticleIndex::default(),
        &[],
        "model",
        now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, NewsletterError::BodyTooShort(10)));
}

#[tokio::test]
async fn short_subject_is_fatal() {
    let generator = generator_with(long_body(), " \"Hi\" ");
    let err = generate_newsletter(
        &generator,
        &TemplateSet::builtin(),
        &catalog(),
        &ArticleIndex::default(),
        &[],
        "model",
        now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, NewsletterError::SubjectTooShort(ref s) if s == "Hi"));
}

#[tokio::test]
async fn newsletter_is_written_as_three_dated_files() {
    let generator = generator_with(long_body(), "\"Fresh tools for June\"");
    let newsletter = generate_newsletter(
        &generator,
        &TemplateSet::builtin(),
        &catalog(),
        &ArticleIndex::default(),
        &[],
        "model",
        now(),
    )
    .await
    .unwrap();
    assert_eq!(newsletter.subject, "Fresh tools for June");
    assert!(newsletter.html.contains("<h1>This week</h1>"));
    assert_eq!(newsletter.stats.new_tools, 2);
    assert_eq!(newsletter.stats.featured_tools, 1);
    assert_eq!(newsletter.stats.total_tools, 5);

    let dir = tempdir().unwrap();
    let out = dir.path().join("newsletter-output");
    let files = write_outputs(&out, &newsletter).unwrap();
    assert_eq!(files.json, out.join("newsletter-2025-06-02.json"));
    assert_eq!(fs::read_to_string(&files.markdown).unwrap(), newsletter.markdown);
    assert_eq!(fs::read_to_string(&files.html).unwrap(), newsletter.html);
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&files.json).unwrap()).unwrap();
    assert_eq!(saved["subject"], "Fresh tools for June");
    assert_eq!(saved["stats"]["totalTools"], 5);
    assert!(saved["generatedAt"].is_string());
}

#[tokio::test]
async fn send_runs_the_campaign_protocol() {
    let site = tempdir().unwrap();
    let config = PipelineConfig {
        data_root: site.path().to_path_buf(),
        ..Default::default()
    };
    let paths = config.paths();
    fs::create_dir_all(paths.catalog.parent().unwrap()).unwrap();
    store::write_json(&paths.catalog, &catalog()).unwrap();

    let generator = generator_with(long_body(), "Fresh tools for June");
    let mut transport = MockMailTransport::new();
    transport
        .expect_send()
        .withf(|req| req.url.ends_with("/api/campaigns"))
        .times(1)
        .returning(|req| {
            let name = req.body.as_ref().unwrap()["name"].clone();
            Ok(TransportResponse {
                status: 200,
                body: json!({"data": {"id": 9, "name": name}}).to_string(),
            })
        });
    transport
        .expect_send()
        .withf(|req| req.url.ends_with("/api/campaigns/9/status"))
        .times(1)
        .returning(|_| Ok(TransportResponse { status: 200, body: "{\"data\": true}".into() }));
    let client = MailingClient::new(transport, "https://lists.example.com").with_retry(RetryPolicy {
        attempts: 1,
        base_delay: std::time::Duration::ZERO,
    });

    let report = run_newsletter_send(
        &config,
        &TemplateSet::builtin(),
        &generator,
        &client,
        Delivery {
            list_ids: vec![3],
            test_emails: Vec::new(),
            send_at: None,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(report.campaign.id, 9);
    assert_eq!(report.campaign.name, "Weekly Newsletter - 2025-06-02");
    assert!(paths.newsletter_dir.join("newsletter-2025-06-02.html").exists());
}

#[test]
fn thin_newsletters_are_not_sendable() {
    let mut newsletter = Newsletter {
        subject: "Fresh tools for June".into(),
        markdown: "x".into(),
        html: "<p>x</p>".into(),
        generated_at: now(),
        stats: NewsletterStats {
            new_tools: 0,
            featured_tools: 0,
            total_tools: 0,
        },
    };
    assert!(matches!(
        newsletter.validate_for_send(),
        Err(NewsletterError::HtmlTooShort(8))
    ));

    newsletter.html = render_html(&long_body());
    assert!(newsletter.validate_for_send().is_ok());

    newsletter.subject = "Hey".into();
    assert!(matches!(
        newsletter.validate_for_send(),
        Err(NewsletterError::SubjectTooShort(_))
    ));
}
