//! Benchmarks for the clustering path of the digest pipeline.
//!
//! Uses 500 messages by default. Set `BENCH_FULL_SCALE=1` for 5,000:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p agora-insight
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use agora_core::config::InsightConfig;
use agora_core::ChatMessage;
use agora_insight::{DensityClusterer, MessageProcessor, TfidfMatrix};
use agora_llm::MockModel;

const CI_MESSAGE_COUNT: usize = 500;
const FULL_SCALE_MESSAGE_COUNT: usize = 5_000;

const THREADS: [&str; 4] = [
    "the release pipeline failed again on the staging cluster",
    "who is bringing snacks to the friday meetup downtown",
    "token price dropped after the exchange listing announcement",
    "new borrow checker errors after upgrading the compiler",
];

fn message_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_MESSAGE_COUNT
    } else {
        CI_MESSAGE_COUNT
    }
}

fn generate_messages(count: usize) -> Vec<ChatMessage> {
    let t0 = Utc
        .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
        .single()
        .expect("valid start time");
    (0..count)
        .map(|i| {
            let thread = i % THREADS.len();
            let text = format!("{} #{}", THREADS[thread], i / THREADS.len());
            let sent = t0 + chrono::Duration::minutes((thread * 240 + i / THREADS.len()) as i64);
            let mut message = ChatMessage::new(i as i64, text, sent);
            message.sender_id = Some(format!("user{}", i % 17));
            message
        })
        .collect()
}

fn bench_tfidf(c: &mut Criterion) {
    let count = message_count();
    let texts: Vec<String> = generate_messages(count)
        .into_iter()
        .map(|m| m.message)
        .collect();

    let mut group = c.benchmark_group("tfidf");
    group.sample_size(50);
    group.bench_function(format!("fit_transform_{}msgs", count), |b| {
        b.iter(|| {
            let matrix = TfidfMatrix::fit_transform(&texts);
            assert_eq!(matrix.rows(), count);
            matrix.importance()
        });
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let count = message_count();
    let messages = generate_messages(count);
    let config = InsightConfig::default();
    let processor = MessageProcessor::new(Arc::new(MockModel::new(64)), config.clone());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    let scored = rt
        .block_on(processor.analyze(&messages))
        .expect("analyze failed");
    let points: Vec<Vec<f64>> = scored
        .iter()
        .filter_map(|s| s.embedding.as_ref())
        .map(|e| e.iter().map(|&x| f64::from(x)).collect())
        .collect();

    let mut group = c.benchmark_group("clustering");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let clusterer = DensityClusterer::from_config(&config);
    group.bench_function(format!("density_fit_{}msgs", count), |b| {
        b.iter(|| clusterer.fit(&points));
    });

    group.bench_function(format!("analyze_and_cluster_{}msgs", count), |b| {
        b.iter(|| {
            let scored = rt
                .block_on(processor.analyze(&messages))
                .expect("analyze failed");
            processor.cluster(scored).expect("cluster failed")
        });
    });
    group.finish();
}

criterion_group!(benches, bench_tfidf, bench_pipeline);
criterion_main!(benches);
