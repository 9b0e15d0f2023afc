//! Benchmark: Gate Check Performance
//!
//! Purpose: Measure the cost of the admission decision callers make before
//! every recommendation
//! Target: <2µs per check with a warm fingerprint cache
//!
//! What's Measured:
//! - Allowed decision (full 8-step check, cached fingerprint)
//! - Early denials (kill switch, unknown strategy)
//! - Circuit-breaker denial
//! - Fingerprint refresh followed by a check (definition rehashed)
//! - Analysis of a full 50-sample window
//!
//! Why This Matters:
//! The gate sits on the recommendation path. A check that contends on the
//! registry or rehashes every call would throttle every strategy at once.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use warden_core::analysis::{AnalyzerConfig, BreakerTrigger, PerformanceAnalyzer};
use warden_core::core::{ManualClock, OutcomeWindow, PerformanceMetrics};
use warden_core::gate::ValidationGate;
use warden_core::testing::{outcome_series, StaticDefinition};
use warden_core::{GateConfig, ValidationStatus};

/// Helper: gate with `n` validated strategies named `s0..sN`
fn gate_with(n: usize) -> (TempDir, ValidationGate) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GateConfig::rooted_at(dir.path());
    config.alerts.outputs.clear();
    let gate = ValidationGate::builder(config)
        .clock(Arc::new(ManualClock::default()))
        .open()
        .unwrap();

    for i in 0..n {
        let name = format!("s{}", i);
        gate.register_strategy(Arc::new(StaticDefinition::new(name.as_str(), "v1")))
            .unwrap();
        gate.promote(&name, ValidationStatus::ValidationPending, "bench")
            .unwrap();
        gate.promote(&name, ValidationStatus::Validated, "bench")
            .unwrap();
    }
    (dir, gate)
}

fn bench_allowed_check(c: &mut Criterion) {
    let (_dir, gate) = gate_with(32);
    // Warm the fingerprint cache
    gate.check("s7");

    c.bench_function("gate_check_allowed", |b| {
        b.iter(|| black_box(gate.check(black_box("s7"))));
    });
}

fn bench_denials(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_check_denied");

    let (_dir, gate) = gate_with(32);
    group.bench_function("unknown_strategy", |b| {
        b.iter(|| black_box(gate.check(black_box("ghost"))));
    });

    let trigger = BreakerTrigger::LossStreak {
        streak: 5,
        threshold: 5,
    };
    gate.trip_breaker("s3", &trigger).unwrap();
    gate.check("s3");
    group.bench_function("circuit_breaker_open", |b| {
        b.iter(|| black_box(gate.check(black_box("s3"))));
    });

    gate.activate_kill_switch("bench", "bench").unwrap();
    group.bench_function("kill_switch", |b| {
        b.iter(|| black_box(gate.check(black_box("s7"))));
    });

    group.finish();
}

fn bench_refreshed_check(c: &mut Criterion) {
    let (_dir, gate) = gate_with(1);

    c.bench_function("gate_check_after_fingerprint_refresh", |b| {
        b.iter(|| {
            gate.refresh_fingerprint("s0");
            black_box(gate.check(black_box("s0")))
        });
    });
}

fn bench_analysis(c: &mut Criterion) {
    let analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
    let mut window = OutcomeWindow::new(50);
    for sample in outcome_series("WLWWL", 50, 0.9, -1.0, chrono::Utc::now()) {
        window.push(sample);
    }
    let baseline = PerformanceMetrics {
        win_rate: 0.56,
        roi: 0.042,
        sample_size: 400,
        confidence_score: 0.8,
    };

    c.bench_function("analyze_full_window", |b| {
        b.iter(|| black_box(analyzer.analyze(black_box(&window), Some(&baseline))));
    });
}

criterion_group!(
    benches,
    bench_allowed_check,
    bench_denials,
    bench_refreshed_check,
    bench_analysis,
);

criterion_main!(benches);
