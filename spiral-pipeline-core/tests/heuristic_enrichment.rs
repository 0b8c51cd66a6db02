use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use spiral_pipeline_core::catalog::CatalogEntry;
use spiral_pipeline_core::config::PipelineConfig;
use spiral_pipeline_core::enrich::heuristic::{
    composite_score, enrich_catalog, enrich_entry, value_score, MAX_OVERALL, MIN_OVERALL,
};
use spiral_pipeline_core::pipeline::run_local_enrichment;
use spiral_pipeline_core::store;
use std::fs;
use tempfile::tempdir;

fn entry(id: u32, name: &str, category: &str, price: &str, features: &str) -> CatalogEntry {
    let mut e = CatalogEntry::new(id, name, category);
    e.description = format!("{name} does things");
    e.price_range = price.to_string();
    e.features = features.to_string();
    e
}

#[test]
fn four_unscored_entries_are_scored_and_the_original_is_backed_up() {
    let site = tempdir().unwrap();
    let config = PipelineConfig {
        data_root: site.path().to_path_buf(),
        ..Default::default()
    };
    let paths = config.paths();
    let catalog = vec![
        entry(1, "Stripe", "Payment Processing", "Free", "API, Billing, Invoices"),
        entry(2, "Linear", "Project Management", "$8/user/month", "Issues"),
        entry(3, "Datadog", "Analytics", "$150/month", "APM, Logs, Metrics, Traces, RUM, Synthetics"),
        entry(4, "Obscure", "Misc", "Contact sales", ""),
    ];
    fs::create_dir_all(paths.catalog.parent().unwrap()).unwrap();
    store::write_json(&paths.catalog, &catalog).unwrap();
    let original = fs::read_to_string(&paths.catalog).unwrap();

    let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let report = run_local_enrichment(&config, now).expect("enrichment runs");

    assert_eq!(report.loaded, 4);
    assert_eq!(report.enriched.len(), 4);
    let backup = report.backup.expect("a backup is written");
    assert_eq!(fs::read_to_string(&backup).unwrap(), original);
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("tools.backup."));

    let saved: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(&paths.catalog).unwrap()).unwrap();
    assert_eq!(saved.len(), 4);
    for raw in &saved {
        let score = raw["techiespiral_score"].as_f64().expect("score written");
        assert!((40.0..=95.0).contains(&score), "score {score} out of range");
        for key in ["techiespiral_score", "value_score", "ease_score", "features_score"] {
            assert!(raw[key].is_u64(), "{key} written as {}", raw[key]);
        }
        assert!(raw["enriched_at"].is_string());
        assert!(raw.get("scout_score").is_none());
    }
}

#[test]
fn already_scored_entries_come_back_unchanged() {
    let now = Utc::now();
    let catalog = vec![entry(1, "Notion", "Productivity", "$10/month", "Docs, Wiki")];
    let (scored, changed) = enrich_catalog(&catalog, now);
    assert_eq!(changed, 1);

    let later = now + chrono::Duration::days(3);
    let (again, changed_again) = enrich_catalog(&scored, later);
    assert_eq!(changed_again, 0);
    assert_eq!(again, scored);
    assert_eq!(enrich_entry(&scored[0], &scored, later), scored[0]);
}

#[test]
fn legacy_score_field_counts_as_scored() {
    let raw = json!({
        "Id": 9,
        "tool_name": "Vercel",
        "category": "Hosting",
        "scout_score": 88,
        "value_score": 4,
        "ease_score": 5,
        "features_score": 4
    });
    let e: CatalogEntry = serde_json::from_value(raw).unwrap();
    assert!(e.is_scored());
    assert_eq!(e.overall_score(), Some(88));
}

#[test]
fn free_and_zero_dollar_prices_score_five() {
    assert_eq!(value_score("Free"), 5);
    assert_eq!(value_score("Free tier, paid from $29"), 5);
    assert_eq!(value_score("$0 to start"), 5);
    assert_eq!(value_score("$0.99/month"), 5);
    assert_eq!(value_score("  $0.50 per seat"), 5);
}

#[test]
fn price_boundaries() {
    assert_eq!(value_score("$19.99/month"), 4);
    assert_eq!(value_score("$20/month"), 3);
    assert_eq!(value_score("$49/month"), 3);
    assert_eq!(value_score("$50/month"), 2);
    assert_eq!(value_score("$99/month"), 2);
    assert_eq!(value_score("$100/month"), 1);
    assert_eq!(value_score("Custom pricing"), 1);
}

#[test]
fn composite_is_always_clamped() {
    for value in 0..=5u8 {
        for ease in 0..=5u8 {
            for features in 0..=5u8 {
                for popular in [false, true] {
                    for brand in [false, true] {
                        let s = i32::from(composite_score(value, ease, features, popular, brand));
                        assert!(
                            (MIN_OVERALL..=MAX_OVERALL).contains(&s),
                            "{value}/{ease}/{features}/{popular}/{brand} gave {s}"
                        );
                    }
                }
            }
        }
    }
    assert_eq!(composite_score(5, 5, 5, true, true), 95);
    assert_eq!(composite_score(1, 1, 1, false, false), 40);
}

#[test]
fn alternatives_are_same_category_peers() {
    let catalog = vec![
        entry(1, "Stripe", "Payment Processing", "Free", ""),
        entry(2, "Paddle", "Payment Processing", "$0", ""),
        entry(3, "Figma", "Design Tools", "Free", ""),
    ];
    let (scored, _) = enrich_catalog(&catalog, Utc::now());
    assert_eq!(scored[0].alternatives, vec![2]);
    assert_eq!(scored[1].alternatives, vec![1]);
    assert!(scored[2].alternatives.is_empty());
}
