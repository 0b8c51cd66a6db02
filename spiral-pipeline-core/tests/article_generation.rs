use chrono::{TimeZone, Utc};
use spiral_pipeline_core::article::{
    slugify, validate_article, ArticleGenerator, ArticleIndex, ArticleOutcome, ValidationProblem,
};
use spiral_pipeline_core::catalog::CatalogEntry;
use spiral_pipeline_core::config::PipelineConfig;
use spiral_pipeline_core::contract::{GenerationOptions, MockTextGenerator};
use spiral_pipeline_core::error::LlmError;
use spiral_pipeline_core::pipeline::run_article_generation;
use spiral_pipeline_core::queue::{ComparisonIdea, ContentQueue, QueueStatus};
use spiral_pipeline_core::store;
use spiral_pipeline_core::template::{Template, TemplateKind, TemplateSet};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn catalog() -> Vec<CatalogEntry> {
    let mut github = CatalogEntry::new(1, "GitHub", "Developer Tools");
    github.description = "Code hosting".into();
    github.price_range = "Free".into();
    let mut gitlab = CatalogEntry::new(2, "GitLab", "Developer Tools");
    gitlab.description = "DevOps platform".into();
    vec![github, gitlab]
}

fn article_body() -> String {
    format!(
        "GitHub and GitLab both host git repositories.\n\n## Comparison Table\n\n{}\n\n## Pros\n\n## Cons\n\n## FAQ\n\n## Recommendation\n",
        "word ".repeat(2100)
    )
}

#[test]
fn slugs_are_stable() {
    assert_eq!(
        slugify("GitHub vs GitLab: Which is Better?"),
        "github-vs-gitlab-which-is-better"
    );
    assert_eq!(slugify("  --Notion & Coda--  "), "notion-coda");
    assert_eq!(slugify("Café 2.0"), "caf-2-0");
    for title in ["GitHub vs GitLab: Which is Better?", "A  --  B", "already-a-slug"] {
        let once = slugify(title);
        assert_eq!(slugify(&once), once);
    }
}

#[test]
fn validation_reports_but_does_not_judge() {
    let short = validate_article("## Pros\nshort");
    assert!(short.problems.contains(&ValidationProblem::TooShort(3)));
    assert!(short
        .problems
        .contains(&ValidationProblem::MissingSection("Comparison Table")));

    let good = validate_article(&article_body());
    assert!(good.is_valid(), "{:?}", good.problems);
}

#[tokio::test]
async fn unresolvable_tools_leave_the_item_pending_and_write_nothing() {
    let dir = tempdir().unwrap();
    let mut generator = MockTextGenerator::new();
    generator.expect_generate_text().never();

    let template = Template::new("comparison", "{title}");
    let articles = ArticleGenerator {
        generator: &generator,
        template: &template,
        options: GenerationOptions::default(),
        articles_dir: dir.path(),
    };

    let mut queue = ContentQueue::default();
    queue.enqueue(
        vec![ComparisonIdea::new("Foo vs Bar", vec!["Foo".into(), "Bar".into()])],
        Utc::now(),
    );
    let mut index = ArticleIndex::default();

    let outcomes = articles
        .run_batch(&mut queue, &mut index, &catalog(), 5, Duration::ZERO)
        .await;

    assert!(matches!(outcomes.as_slice(), [ArticleOutcome::Skipped { .. }]));
    assert_eq!(queue.queue[0].status, QueueStatus::Pending);
    assert!(queue.generated.is_empty());
    assert!(index.articles.is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn a_failed_item_does_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    let mut generator = MockTextGenerator::new();
    let mut calls = 0;
    generator.expect_generate_text().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Err(LlmError::EmptyResponse)
        } else {
            Ok(article_body())
        }
    });

    let template = Template::new("comparison", "{title}: {tool_1_name} vs {tool_2_name}");
    let articles = ArticleGenerator {
        generator: &generator,
        template: &template,
        options: GenerationOptions::default(),
        articles_dir: dir.path(),
    };

    let mut queue = ContentQueue::default();
    queue.enqueue(
        vec![
            ComparisonIdea::new("GitHub Review", vec!["GitHub".into()]),
            ComparisonIdea::new("GitHub vs GitLab", vec!["github".into(), "Lab".into()]),
        ],
        Utc::now(),
    );
    let mut index = ArticleIndex::default();

    let outcomes = articles
        .run_batch(&mut queue, &mut index, &catalog(), 5, Duration::ZERO)
        .await;

    assert!(matches!(outcomes[0], ArticleOutcome::Failed { .. }));
    assert!(matches!(outcomes[1], ArticleOutcome::Persisted { .. }));
    assert_eq!(queue.queue[0].status, QueueStatus::Pending);
    assert_eq!(queue.queue[1].status, QueueStatus::Generated);
    assert_eq!(index.articles.len(), 1);
    assert_eq!(index.articles[0].tools, vec!["GitHub", "GitLab"]);
}

#[tokio::test]
async fn pipeline_writes_article_index_and_queue() {
    let site = tempdir().unwrap();
    let mut config = PipelineConfig {
        data_root: site.path().to_path_buf(),
        ..Default::default()
    };
    config.articles.pause_ms = 0;
    let paths = config.paths();
    fs::create_dir_all(paths.catalog.parent().unwrap()).unwrap();
    store::write_json(&paths.catalog, &catalog()).unwrap();

    let mut queue = ContentQueue::default();
    let mut idea = ComparisonIdea::new(
        "GitHub vs GitLab: Which is Better?",
        vec!["GitHub".into(), "GitLab".into()],
    );
    idea.priority = 1;
    idea.keywords = "github vs gitlab".into();
    queue.enqueue(vec![idea], Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    store::write_json(&paths.content_queue, &queue).unwrap();

    let mut generator = MockTextGenerator::new();
    generator
        .expect_generate_text()
        .withf(|prompt, _| prompt.contains("GitHub") && prompt.contains("GitLab"))
        .times(1)
        .returning(|_, _| {
            Ok(format!(
                "<script>alert(1)</script>{}",
                article_body()
            ))
        });

    let report = run_article_generation(&config, &TemplateSet::builtin(), &generator)
        .await
        .expect("article run");

    assert_eq!(report.written.len(), 1);
    assert_eq!(report.remaining, 0);
    let path = paths.articles_dir.join("github-vs-gitlab-which-is-better.md");
    assert_eq!(report.written[0].1, path);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("---\ntitle: \"GitHub vs GitLab: Which is Better?\""));
    assert!(text.contains("featured: true"));
    assert!(text.contains("tools: [\"GitHub\",\"GitLab\"]"));
    assert!(!text.contains("<script>"));

    let index: ArticleIndex = store::read_json(&paths.content_index).unwrap();
    assert_eq!(index.articles[0].slug, "github-vs-gitlab-which-is-better");
    assert_eq!(
        index.articles[0].description,
        "GitHub and GitLab both host git repositories."
    );
    assert_eq!(index.metadata.total_articles, 1);

    let saved: ContentQueue<ComparisonIdea> = store::read_json(&paths.content_queue).unwrap();
    assert_eq!(saved.queue[0].status, QueueStatus::Generated);
    assert_eq!(saved.generated.len(), 1);
}

#[test]
fn builtin_comparison_template_is_available() {
    let set = TemplateSet::builtin();
    let placeholders = set.get(TemplateKind::Comparison).placeholders();
    assert!(placeholders.iter().any(|p| p == "tool_data"));
}
