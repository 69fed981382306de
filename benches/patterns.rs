//! Benchmarks for aggregation, detection and full session polls.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use blockslope::prelude::*;

const OPEN: i64 = 1_699_972_200;

/// Generate a deterministic one-minute series
fn generate_candles(n: usize) -> Vec<Candle> {
  let mut candles = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 500.0 - 0.1; // Deterministic "random"
    let volatility = 0.2 + ((i * 3) % 10) as f64 / 50.0;

    let o = price;
    let c = price + change;
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;

    candles.push(Candle::new(OPEN + i as i64 * 60, o, h, l, c, 1000.0));
    price = c;
  }

  candles
}

fn session(symbol: &str, base: u32) -> AnalysisSession {
  let date = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
  let spec = SessionSpec::new(symbol, date, OPEN, OPEN + 390 * 60).unwrap();
  AnalysisSession::new(spec, Minutes::new(base).unwrap())
}

fn bench_base_bars(c: &mut Criterion) {
  let candles = generate_candles(390);
  let base = Minutes::new(5).unwrap();

  c.bench_function("base_bars_390_minutes", |b| {
    b.iter(|| {
      let _ = black_box(CandleAggregator::base_bars(black_box(&candles), OPEN, base));
    })
  });
}

fn bench_detect(c: &mut Criterion) {
  let candles = generate_candles(40);
  let bars = CandleAggregator::base_bars(&candles, OPEN, Minutes::new(10).unwrap());
  let group = BlockGroup::new(&bars, Minutes::new(10).unwrap());
  let structure = BlockStructure::from_group(&group).unwrap();
  let engine = EngineBuilder::new().build().unwrap();

  c.bench_function("detect_one_structure", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect(black_box(&structure)));
    })
  });
}

fn bench_session_poll(c: &mut Criterion) {
  let engine = EngineBuilder::new().risk_amount(500.0).build().unwrap();

  let mut group = c.benchmark_group("poll");

  for minutes in [30, 120, 389].iter() {
    let candles = generate_candles(*minutes);
    let now = OPEN + *minutes as i64 * 60;

    group.bench_with_input(BenchmarkId::new("analyze", minutes), minutes, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.analyze(session("SYM", 5), black_box(&candles), now));
      })
    });
  }

  group.finish();
}

fn bench_parallel(c: &mut Criterion) {
  let series: Vec<Vec<Candle>> = (0..4).map(|_| generate_candles(389)).collect();
  let engine = EngineBuilder::new().build().unwrap();
  let now = OPEN + 389 * 60;

  c.bench_function("parallel_analyze_4_instruments", |b| {
    b.iter(|| {
      let jobs: Vec<(AnalysisSession, &[Candle])> = series
        .iter()
        .enumerate()
        .map(|(i, candles)| (session(&format!("SYM{i}"), 5), candles.as_slice()))
        .collect();
      let _ = black_box(analyze_parallel(black_box(&engine), jobs, now));
    })
  });
}

criterion_group!(benches, bench_base_bars, bench_detect, bench_session_poll, bench_parallel);

criterion_main!(benches);
