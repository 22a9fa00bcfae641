use std::sync::Arc;
use std::thread;
use std::time::Duration;

use series_core::{
    BufferPool, I64Comparer, Lookup, SeriesConfig, SeriesCursor, SortedSeries, UpdateSignal,
};

type Series = SortedSeries<i64, i64, I64Comparer>;

const TAIL_APPEND_COUNT: i64 = 2_000;

fn shared_series(entries: &[(i64, i64)]) -> Arc<Series> {
    let series = Arc::new(Series::new(I64Comparer));
    for (k, v) in entries {
        series.set(*k, *v).unwrap();
    }
    series
}

#[test]
fn cursor_streams_across_concurrent_tail_appends() {
    let series = shared_series(&[]);
    let writer = {
        let series = Arc::clone(&series);
        thread::spawn(move || {
            for i in 0..TAIL_APPEND_COUNT {
                series.add_last(i * 10, i).unwrap();
                if i % 64 == 0 {
                    thread::yield_now();
                }
            }
        })
    };

    let mut cursor = series.cursor();
    let mut seen = Vec::new();
    while (seen.len() as i64) < TAIL_APPEND_COUNT {
        match cursor.move_next() {
            Ok(true) => seen.push(cursor.current_key().unwrap()),
            Ok(false) => thread::yield_now(),
            Err(err) => panic!("tail appends must never invalidate a cursor: {err}"),
        }
    }
    writer.join().unwrap();

    let expected: Vec<i64> = (0..TAIL_APPEND_COUNT).map(|i| i * 10).collect();
    assert_eq!(seen, expected);
}

#[test]
fn cursor_never_observes_half_applied_structural_changes() {
    // An adversarial writer keeps inserting into and removing from the
    // middle. A moving cursor must either advance through a consistent
    // pre-image (keys strictly increasing) or fail with the key it last saw.
    let series = shared_series(&[(0, 0), (1_000_000, 0)]);
    let writer = {
        let series = Arc::clone(&series);
        thread::spawn(move || {
            for i in 1..500i64 {
                series.set(i * 100, i).unwrap();
                if i % 2 == 0 {
                    series.remove(&((i / 2) * 100)).unwrap();
                }
            }
        })
    };

    let mut restarts = 0;
    let mut walks = 0;
    while walks < 50 {
        let mut cursor = series.cursor();
        let mut last: Option<i64> = None;
        loop {
            match cursor.move_next() {
                Ok(true) => {
                    let key = cursor.current_key().unwrap();
                    if let Some(prev) = last {
                        assert!(key > prev, "cursor went backwards: {prev} -> {key}");
                    }
                    last = Some(key);
                }
                Ok(false) => break,
                Err(err) => {
                    assert_eq!(err.last_key, last, "invalidation must carry the last seen key");
                    restarts += 1;
                    break;
                }
            }
        }
        walks += 1;
    }
    writer.join().unwrap();
    // With the writer reshaping the middle, at least some walks restart.
    let _ = restarts;
}

#[test]
fn foreign_thread_cursor_restores_synchronized_reads() {
    let config = SeriesConfig {
        synchronized: false,
        ..SeriesConfig::default()
    };
    let series = Arc::new(Series::with_config(I64Comparer, config));
    series.set(10, 1).unwrap();
    assert!(!series.is_synchronized());

    let handle = {
        let series = Arc::clone(&series);
        thread::spawn(move || {
            let _cursor: SeriesCursor<i64, i64, I64Comparer> = series.cursor();
        })
    };
    handle.join().unwrap();
    assert!(series.is_synchronized());
}

#[test]
fn concurrent_point_reads_stay_consistent() {
    let series = shared_series(&[(10, 0), (20, 0), (30, 0)]);
    let writer = {
        let series = Arc::clone(&series);
        thread::spawn(move || {
            for round in 1..2_000i64 {
                series.set(20, round).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let series = Arc::clone(&series);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let value = series.get(&20).unwrap();
                    assert!((0..2_000).contains(&value));
                    match series.try_find(&25, Lookup::Lt) {
                        series_core::FindResult::Found { key, .. } => assert_eq!(key, 20),
                        other => panic!("unexpected {other:?}"),
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn pooled_buffers_are_recycled_across_epochs() {
    let key_pool = BufferPool::<i64>::shared();
    let value_pool = BufferPool::<i64>::shared();
    let config = SeriesConfig {
        initial_capacity: 4,
        key_pool: Arc::clone(&key_pool),
        value_pool: Arc::clone(&value_pool),
        ..SeriesConfig::default()
    };
    let series = Series::with_config(I64Comparer, config);
    // Force dense storage plus several growth cycles.
    for i in 0..256i64 {
        let key = if i % 2 == 0 { i * 10 } else { i * 10 + 3 };
        series.set(key, i).unwrap();
    }
    // With no reader pinning them, superseded epochs hand their buffers
    // straight back to the pool.
    assert!(key_pool.shelved() + value_pool.shelved() > 0);
}

#[tokio::test]
async fn streaming_consumer_follows_writer_until_seal() {
    let series = shared_series(&[]);
    let writer = {
        let series = Arc::clone(&series);
        tokio::task::spawn_blocking(move || {
            for i in 0..100i64 {
                series.add_last(i, i * 2).unwrap();
                if i % 10 == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            series.complete();
        })
    };

    let mut cursor = series.cursor();
    let mut seen = Vec::new();
    'stream: loop {
        while cursor.move_next().unwrap() {
            seen.push(cursor.current().unwrap());
        }
        match series.notifier().updated().await {
            UpdateSignal::Updated => continue,
            UpdateSignal::Sealed => {
                // Drain whatever landed between the last poll and the seal.
                while cursor.move_next().unwrap() {
                    seen.push(cursor.current().unwrap());
                }
                break 'stream;
            }
            UpdateSignal::Cancelled => unreachable!("no token in play"),
        }
    }
    writer.await.unwrap();

    let expected: Vec<(i64, i64)> = (0..100).map(|i| (i, i * 2)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn seal_mid_iteration_finishes_deterministically() {
    let series = shared_series(&[(10, 1), (20, 2), (30, 3)]);
    let mut cursor = series.cursor();
    assert!(cursor.move_next().unwrap());

    series.complete();
    assert!(cursor.move_next().unwrap());
    assert!(cursor.move_next().unwrap());
    assert_eq!(cursor.current_key(), Some(30));
    assert!(!cursor.move_next().unwrap());
}
