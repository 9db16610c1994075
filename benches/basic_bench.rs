use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rppg_rs::core::constants::{ASSUMED_FPS, SMOOTHING_WINDOW};
use rppg_rs::math::signal::{moving_average, BpmEstimator, PeakDetector};
use rppg_rs::model::signal::{Sample, SignalBuffer};
use time::Duration;

fn pulse_sample(tick: usize) -> Sample {
    let t = tick as f64 / ASSUMED_FPS as f64;
    let value = 128.0 + 10.0 * (2.0 * std::f64::consts::PI * 1.2 * t).sin();
    Sample::new(Duration::seconds_f64(t), value)
}

fn smoothing_benchmark(c: &mut Criterion) {
    let samples: Vec<Sample> = (0..150).map(pulse_sample).collect();
    c.bench_function("moving_average_full_buffer", |b| {
        b.iter(|| moving_average(black_box(&samples), SMOOTHING_WINDOW))
    });
}

fn detection_benchmark(c: &mut Criterion) {
    let samples: Vec<Sample> = (0..150).map(pulse_sample).collect();
    let smoothed = moving_average(&samples, SMOOTHING_WINDOW);
    c.bench_function("peak_detector_evaluate", |b| {
        b.iter(|| {
            let mut detector = PeakDetector::default();
            black_box(detector.evaluate(black_box(&smoothed)))
        })
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    c.bench_function("pipeline_15s_window", |b| {
        b.iter(|| {
            let mut buffer = SignalBuffer::default();
            let mut detector = PeakDetector::default();
            let mut estimator = BpmEstimator::default();
            for tick in 0..(15 * ASSUMED_FPS) {
                buffer.push(pulse_sample(tick));
                let smoothed = moving_average(&buffer.snapshot(), SMOOTHING_WINDOW);
                if let Some(bpm) = detector.evaluate(&smoothed) {
                    estimator.accept(bpm);
                }
            }
            black_box(estimator.finalize())
        })
    });
}

criterion_group!(
    benches,
    smoothing_benchmark,
    detection_benchmark,
    pipeline_benchmark
);
criterion_main!(benches);
