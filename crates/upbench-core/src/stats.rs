//! Statistics aggregation
//!
//! Samples are appended as outcomes arrive and only sorted when a summary is
//! requested at the end of a run.

use crate::config::RunConfig;
use crate::types::{AttemptOutcome, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Order statistics over one sample list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub count: usize,
    pub avg: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Percentile of an ascending sample list by linear interpolation between
/// the order statistics around rank `p/100 * (n-1)`
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    Some((sorted[lo] + (sorted[hi] - sorted[lo]) * weight).min(sorted[hi]))
}

/// Summarize a sample list; all statistics are `None` when it is empty
pub fn summarize(samples: &[f64]) -> SampleSummary {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return SampleSummary::default();
    }
    sorted.sort_by(f64::total_cmp);

    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    SampleSummary {
        count: sorted.len(),
        avg: Some((mean * 100.0).round() / 100.0),
        p50: percentile(&sorted, 50.0),
        p95: percentile(&sorted, 95.0),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
    }
}

/// Append-only samples and counters for one file (or the whole run)
#[derive(Clone, Debug, Default)]
pub struct StatsBucket {
    pub size: u64,
    pub ok: u64,
    pub fail: u64,
    pub duration_ms: Vec<f64>,
    pub upload_ms: Vec<f64>,
    pub ttfb_ms: Vec<f64>,
    pub connect_ms: Vec<f64>,
}

impl StatsBucket {
    fn new(size: u64) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    fn push(&mut self, outcome: &AttemptOutcome) {
        if outcome.is_ok() {
            self.ok += 1;
        } else {
            self.fail += 1;
        }

        push_finite(&mut self.duration_ms, outcome.duration_ms());
        if let Some(timings) = outcome.timings() {
            push_finite(&mut self.upload_ms, timings.upload_ms);
            push_finite(&mut self.ttfb_ms, timings.ttfb_ms);
            push_finite(&mut self.connect_ms, timings.connect_ms);
        }
    }

    pub fn tried(&self) -> u64 {
        self.ok + self.fail
    }
}

fn push_finite(samples: &mut Vec<f64>, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        samples.push(v);
    }
}

/// One transport exception, kept for the run-end report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub file: String,
    pub batch: u32,
    pub error: TransportError,
}

/// Counters for a whole run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub tried: u64,
    pub ok: u64,
    pub fail: u64,
}

/// Per-file section of the run summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub ok: u64,
    pub fail: u64,
    pub duration_ms: SampleSummary,
    pub upload_ms: SampleSummary,
    pub ttfb_ms: SampleSummary,
    pub connect_ms: SampleSummary,
}

impl FileSummary {
    fn from_bucket(name: &str, bucket: &StatsBucket) -> Self {
        Self {
            name: name.to_string(),
            size: bucket.size,
            ok: bucket.ok,
            fail: bucket.fail,
            duration_ms: summarize(&bucket.duration_ms),
            upload_ms: summarize(&bucket.upload_ms),
            ttfb_ms: summarize(&bucket.ttfb_ms),
            connect_ms: summarize(&bucket.connect_ms),
        }
    }
}

/// Whole-run section of the run summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub totals: Totals,
    pub duration_ms: SampleSummary,
    pub upload_ms: SampleSummary,
    pub ttfb_ms: SampleSummary,
    pub connect_ms: SampleSummary,
    pub remote_addresses: Vec<String>,
    pub alpn_protocols: Vec<String>,
    pub errors: Vec<ErrorDetail>,
}

/// The run summary document, written once at run end
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: RunConfig,
    pub files: Vec<FileSummary>,
    pub overall: OverallSummary,
}

/// Accumulates per-file and global samples during a run
#[derive(Debug, Default)]
pub struct StatsAggregator {
    global: StatsBucket,
    files: BTreeMap<String, StatsBucket>,
    remote_addresses: BTreeSet<String>,
    alpn_protocols: BTreeSet<String>,
    errors: Vec<ErrorDetail>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt against `file_key` and the global bucket
    pub fn record(&mut self, file_key: &str, size: u64, batch: u32, outcome: &AttemptOutcome) {
        self.files
            .entry(file_key.to_string())
            .or_insert_with(|| StatsBucket::new(size))
            .push(outcome);
        self.global.push(outcome);

        match outcome {
            AttemptOutcome::Completed(result) => {
                if let Some(timings) = &result.timings {
                    if let Some(addr) = &timings.remote_address {
                        self.remote_addresses.insert(addr.clone());
                    }
                    if let Some(alpn) = &timings.alpn_protocol {
                        self.alpn_protocols.insert(alpn.clone());
                    }
                }
            }
            AttemptOutcome::Failed { error, .. } => self.errors.push(ErrorDetail {
                file: file_key.to_string(),
                batch,
                error: error.clone(),
            }),
        }
    }

    pub fn global(&self) -> &StatsBucket {
        &self.global
    }

    pub fn file(&self, file_key: &str) -> Option<&StatsBucket> {
        self.files.get(file_key)
    }

    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    pub fn totals(&self) -> Totals {
        Totals {
            tried: self.global.tried(),
            ok: self.global.ok,
            fail: self.global.fail,
        }
    }

    /// Per-file summaries, smallest file first
    pub fn file_summaries(&self) -> Vec<FileSummary> {
        let mut files: Vec<FileSummary> = self
            .files
            .iter()
            .map(|(name, bucket)| FileSummary::from_bucket(name, bucket))
            .collect();
        files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)));
        files
    }

    pub fn overall_summary(&self) -> OverallSummary {
        OverallSummary {
            totals: self.totals(),
            duration_ms: summarize(&self.global.duration_ms),
            upload_ms: summarize(&self.global.upload_ms),
            ttfb_ms: summarize(&self.global.ttfb_ms),
            connect_ms: summarize(&self.global.connect_ms),
            remote_addresses: self.remote_addresses.iter().cloned().collect(),
            alpn_protocols: self.alpn_protocols.iter().cloned().collect(),
            errors: self.errors.clone(),
        }
    }

    /// Build the run summary document
    pub fn summary(
        &self,
        run_id: &str,
        config: &RunConfig,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            started_at,
            finished_at,
            config: config.clone(),
            files: self.file_summaries(),
            overall: self.overall_summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResponseBody, TimingPhases, TransportErrorKind, UploadResult};
    use rstest::rstest;

    fn success(duration_ms: f64, upload_ms: Option<f64>) -> AttemptOutcome {
        AttemptOutcome::Completed(UploadResult {
            ok: true,
            http_status: 200,
            duration_ms,
            request_id: None,
            error_header: None,
            timings: Some(TimingPhases {
                upload_ms,
                ttfb_ms: Some(duration_ms / 2.0),
                remote_address: Some("10.0.0.1:443".into()),
                alpn_protocol: Some("http/1.1".into()),
                ..Default::default()
            }),
            body: ResponseBody::Json(serde_json::json!({})),
        })
    }

    #[rstest]
    #[case(50.0, Some(25.0))]
    #[case(95.0, Some(38.5))]
    #[case(0.0, Some(10.0))]
    #[case(100.0, Some(40.0))]
    fn test_percentile_interpolates(#[case] p: f64, #[case] expected: Option<f64>) {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        let got = percentile(&sorted, p).unwrap();
        assert!((got - expected.unwrap()).abs() < 1e-9, "p{} = {}", p, got);
    }

    #[test]
    fn test_percentile_single_sample() {
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.avg, None);
        assert_eq!(summary.p50, None);
        assert_eq!(summary.p95, None);
        assert_eq!(summary.min, None);
        assert_eq!(summary.max, None);
    }

    #[test]
    fn test_summarize_unsorted_input() {
        let summary = summarize(&[40.0, 10.0, 30.0, 20.0]);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.avg, Some(25.0));
        assert_eq!(summary.p50, Some(25.0));
        assert_eq!(summary.min, Some(10.0));
        assert_eq!(summary.max, Some(40.0));
    }

    #[test]
    fn test_avg_rounds_to_two_places() {
        let summary = summarize(&[1.0, 1.0, 1.001]);
        assert_eq!(summary.avg, Some(1.0));
        let summary = summarize(&[0.331, 0.333]);
        assert_eq!(summary.avg, Some(0.33));
        // min/max are not rounded
        assert_eq!(summary.max, Some(0.333));
    }

    #[test]
    fn test_non_finite_samples_are_ignored() {
        let summary = summarize(&[f64::NAN, 5.0, f64::INFINITY]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.p95, Some(5.0));
    }

    #[test]
    fn test_record_updates_file_and_global() {
        let mut stats = StatsAggregator::new();
        stats.record("a.jpg", 1000, 1, &success(100.0, Some(60.0)));
        stats.record("a.jpg", 1000, 2, &success(120.0, None));
        stats.record("b.jpg", 2000, 1, &success(200.0, Some(150.0)));

        let a = stats.file("a.jpg").unwrap();
        assert_eq!((a.ok, a.fail, a.size), (2, 0, 1000));
        assert_eq!(a.duration_ms, vec![100.0, 120.0]);
        // Missing phases are skipped, not recorded as zero.
        assert_eq!(a.upload_ms, vec![60.0]);

        assert_eq!(stats.global().duration_ms.len(), 3);
        assert_eq!(stats.totals(), Totals { tried: 3, ok: 3, fail: 0 });

        let overall = stats.overall_summary();
        assert_eq!(overall.remote_addresses, vec!["10.0.0.1:443".to_string()]);
        assert_eq!(overall.alpn_protocols, vec!["http/1.1".to_string()]);
    }

    #[test]
    fn test_failures_are_counted_and_detailed() {
        let mut stats = StatsAggregator::new();
        let http_error = AttemptOutcome::Completed(UploadResult {
            ok: false,
            http_status: 500,
            duration_ms: 30.0,
            request_id: Some("req-1".into()),
            error_header: Some("Internal".into()),
            timings: None,
            body: ResponseBody::parse(b"oops"),
        });
        let exception = AttemptOutcome::Failed {
            error: TransportError::new(TransportErrorKind::Connect, "refused"),
            duration_ms: Some(3.0),
        };

        stats.record("a.jpg", 1000, 1, &http_error);
        stats.record("a.jpg", 1000, 2, &exception);

        let a = stats.file("a.jpg").unwrap();
        assert_eq!((a.ok, a.fail), (0, 2));
        // Only transport exceptions land in the detail list.
        assert_eq!(stats.errors().len(), 1);
        assert_eq!(stats.errors()[0].batch, 2);
    }

    #[test]
    fn test_file_summaries_sorted_by_size() {
        let mut stats = StatsAggregator::new();
        stats.record("z-small.bin", 10, 1, &success(1.0, None));
        stats.record("a-large.bin", 9000, 1, &success(9.0, None));
        stats.record("m-mid.bin", 500, 1, &success(5.0, None));

        let names: Vec<String> = stats.file_summaries().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["z-small.bin", "m-mid.bin", "a-large.bin"]);
    }

    proptest::proptest! {
        #[test]
        fn prop_percentiles_are_ordered(samples in proptest::collection::vec(0.0f64..1e6, 1..200)) {
            let summary = summarize(&samples);
            let (min, p50, p95, max) = (
                summary.min.unwrap(),
                summary.p50.unwrap(),
                summary.p95.unwrap(),
                summary.max.unwrap(),
            );
            proptest::prop_assert!(min <= p50 && p50 <= p95 && p95 <= max);
            proptest::prop_assert_eq!(summary.count, samples.len());
        }
    }
}
