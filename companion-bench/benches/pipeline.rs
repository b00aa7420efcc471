//! Companion Benchmark Suite
//!
//! Performance targets for the per-utterance hot path:
//!   classify_rule_hit ............ < 5μs
//!   classify_model_fallback ...... < 50μs
//!   safety_evaluate_and_compose .. < 10μs
//!   handle_cached_in_memory ...... < 200μs

use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use companion_core::classifier::TopicClassifier;
use companion_core::config::ClassifierConfig;
use companion_core::lexicon::LexiconStore;
use companion_core::safety::PolicyBook;
use companion_core::source::StaticSource;
use companion_core::{
    CompanionConfig, DomainId, InformationItem, NutritionTopic, PipelineBuilder, SafetyDecision, Topic,
};

const UTTERANCES: &[(&str, DomainId, &str)] = &[
    ("nutrition", DomainId::Nutrition, "サプリについて教えて"),
    ("certification", DomainId::Certification, "基本情報の午後問題が難しい"),
    ("medical", DomainId::Medical, "昨日から発熱が続いています"),
    ("technology", DomainId::Technology, "Rustの所有権がわからない"),
];

fn lexicons() -> Arc<LexiconStore> {
    Arc::new(LexiconStore::builtin().expect("builtin lexicons"))
}

fn supplement_item() -> InformationItem {
    InformationItem {
        title: "サプリメントの選び方".into(),
        summary: "効果抜群と書かれた商品は必ず成分表示を確認しましょう".into(),
        source: "消費者庁".into(),
        published_at: Utc::now(),
        topic: Topic::Nutrition(NutritionTopic::Supplement),
    }
}

/// Benchmark: rule-pass hits per domain (target: < 5μs).
fn bench_classify_rule(c: &mut Criterion) {
    let classifier = TopicClassifier::new(lexicons(), ClassifierConfig::default());
    let mut group = c.benchmark_group("classify_rule_hit");
    for (name, domain, text) in UTTERANCES {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| black_box(classifier.classify(black_box(text), *domain, &[])));
        });
    }
    group.finish();
}

/// Benchmark: no keyword, falls through to the predictor (target: < 50μs).
fn bench_classify_model(c: &mut Criterion) {
    let classifier = TopicClassifier::new(lexicons(), ClassifierConfig::default());
    c.bench_function("classify_model_fallback", |b| {
        b.iter(|| {
            black_box(classifier.classify(
                black_box("体重を落とすための食事のコツを知りたい"),
                DomainId::Nutrition,
                &[],
            ))
        });
    });
}

/// Benchmark: score, decide and compose one reply (target: < 10μs).
fn bench_safety(c: &mut Criterion) {
    let book = PolicyBook::from_lexicons(&lexicons());
    let policy = book.get(DomainId::Nutrition);
    let item = supplement_item();
    c.bench_function("safety_evaluate_and_compose", |b| {
        b.iter(|| {
            let evaluation = policy.evaluate(black_box("飲むだけで痩せるサプリは本当に効果抜群？"));
            black_box(policy.compose(&item, evaluation.decision))
        });
    });
    c.bench_function("safety_compose_block", |b| {
        b.iter(|| black_box(policy.compose(&item, black_box(SafetyDecision::Block))));
    });
}

/// Benchmark: full `handle` with a warm cache and in-memory stores
/// (target: < 200μs).
fn bench_handle(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let config = CompanionConfig::from_toml("[persistence]\nbackend = \"memory\"\n").expect("config");
    let pipeline = PipelineBuilder::new(config)
        .lexicons(lexicons())
        .source(
            DomainId::Nutrition,
            Arc::new(StaticSource::new("bench").with_items([supplement_item()])),
        )
        .build()
        .expect("pipeline");

    // Warm the cache so the loop measures the hit path.
    runtime.block_on(pipeline.handle("サプリについて教えて", DomainId::Nutrition));

    c.bench_function("handle_cached_in_memory", |b| {
        b.iter(|| {
            black_box(runtime.block_on(pipeline.handle(black_box("サプリについて教えて"), DomainId::Nutrition)))
        });
    });
}

criterion_group!(
    benches,
    bench_classify_rule,
    bench_classify_model,
    bench_safety,
    bench_handle,
);
criterion_main!(benches);
