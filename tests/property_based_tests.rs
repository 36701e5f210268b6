//! Property-based tests for report aggregation

use proptest::prelude::*;
use tasker_profiler::report::MemorySink;
use tasker_profiler::{report_with, QueryRecord, QueryReport, ReportSettings};

fn sql_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_]{1,12}".prop_map(|table| format!(r#"SELECT "id" FROM "{table}" WHERE "id" = 1"#)),
        "[a-z_]{1,12}".prop_map(|table| format!(r#"SELECT COUNT(*) FROM "{table}""#)),
        "[ -~]{0,40}",
        Just(String::new()),
    ]
}

fn record_strategy() -> impl Strategy<Value = QueryRecord> {
    (sql_strategy(), 0.0f64..2.0).prop_map(|(sql, elapsed)| QueryRecord::new(sql, elapsed))
}

fn batch_strategy() -> impl Strategy<Value = Vec<QueryRecord>> {
    prop::collection::vec(record_strategy(), 0..40)
}

proptest! {
    /// Property: totals cover exactly the batch
    #[test]
    fn totals_cover_the_batch(records in batch_strategy()) {
        let report = QueryReport::build("prop", &records, &ReportSettings::default());
        let expected: f64 = records.iter().map(|r| r.elapsed_seconds).sum();

        prop_assert_eq!(report.total_count, records.len());
        prop_assert!((report.total_seconds - expected).abs() < 1e-9);
        prop_assert_eq!(report.total_seconds_rounded(), (expected * 1000.0).round() / 1000.0);
    }

    /// Property: per-table counts and times account for every record once
    #[test]
    fn table_rollups_partition_the_batch(records in batch_strategy()) {
        let report = QueryReport::build("prop", &records, &ReportSettings::default());

        let counted: usize = report.counts_per_table.iter().map(|c| c.count).sum();
        prop_assert_eq!(counted, records.len());

        let timed: f64 = report.times_per_table.iter().map(|t| t.total_seconds).sum();
        prop_assert!((timed - report.total_seconds).abs() < 1e-9);

        prop_assert!(report.counts_per_table.windows(2).all(|w| w[0].count >= w[1].count));
        prop_assert!(report.times_per_table.windows(2).all(|w| w[0].total_seconds >= w[1].total_seconds));
    }

    /// Property: the slow list is exactly the records over the threshold, ascending
    #[test]
    fn slow_list_matches_threshold_filter(records in batch_strategy(), threshold in 0.0f64..2.0) {
        let settings = ReportSettings { slow_query_threshold: threshold, ..Default::default() };
        let report = QueryReport::build("prop", &records, &settings);

        let expected = records.iter().filter(|r| r.elapsed_seconds > threshold).count();
        prop_assert_eq!(report.slow_queries.len(), expected);
        prop_assert!(report.slow_queries.iter().all(|r| r.elapsed_seconds > threshold));
        prop_assert!(report.slow_queries.windows(2).all(|w| w[0].elapsed_seconds <= w[1].elapsed_seconds));
    }

    /// Property: the slowest selection is non-increasing with length min(K, n)
    #[test]
    fn slowest_selection_is_bounded_and_sorted(records in batch_strategy(), top in 1usize..10) {
        let settings = ReportSettings { top_slowest: top, ..Default::default() };
        let report = QueryReport::build("prop", &records, &settings);

        prop_assert_eq!(report.slowest.len(), top.min(records.len()));
        prop_assert!(report.slowest.windows(2).all(|w| w[0].elapsed_seconds >= w[1].elapsed_seconds));

        let max = records.iter().map(|r| r.elapsed_seconds).fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        prop_assert_eq!(report.slowest.first().map(|r| r.elapsed_seconds), max);
    }

    /// Property: emitting never fails and building is idempotent
    #[test]
    fn reporting_is_total_and_idempotent(records in batch_strategy()) {
        let mut sink = MemorySink::new();
        let first = report_with("prop", &records, &ReportSettings::default(), &mut sink);
        let second = QueryReport::build("prop", &records, &ReportSettings::default());

        prop_assert_eq!(first, second);
        prop_assert_eq!(sink.blocks().count(), 3);
    }
}
