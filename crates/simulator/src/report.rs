//! CSV output and latency summaries.

use crate::error::SimulatorError;
use hdrhistogram::Histogram;
use indexmap::IndexMap;
use queuesim_models::CsvRecord;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes report rows as CSV, header first.
///
/// The header is written once, before the first batch of rows. Every batch
/// written to one sink must use the same record type.
pub struct CsvSink<W: Write> {
    out: W,
    header_written: bool,
    rows: u64,
}

impl CsvSink<Box<dyn Write>> {
    /// Write to `path`, or to stdout when there is none.
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        let out: Box<dyn Write> = match path {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };
        Ok(Self::new(out))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            rows: 0,
        }
    }

    pub fn write_all<R: CsvRecord>(&mut self, rows: &[R]) -> io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "{}", R::header())?;
            self.header_written = true;
        }
        for row in rows {
            row.write_row(&mut self.out)?;
        }
        self.rows += rows.len() as u64;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Percentiles of one run's completion latencies.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub name: String,
    pub count: u64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
    pub max: f64,
}

/// Latencies are recorded in microseconds with three significant digits.
const MICROS_PER_SEC: f64 = 1_000_000.0;
const SIGNIFICANT_DIGITS: u8 = 3;

impl LatencySummary {
    /// Summarise latencies given in seconds. Negative and non-finite values
    /// are skipped.
    pub fn from_secs<I>(name: &str, latencies: I) -> Result<Self, SimulatorError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut hist = Histogram::<u64>::new(SIGNIFICANT_DIGITS)
            .map_err(|e| SimulatorError::Histogram(e.to_string()))?;
        for latency in latencies {
            if !latency.is_finite() || latency < 0.0 {
                continue;
            }
            hist.record((latency * MICROS_PER_SEC).round() as u64)
                .map_err(|e| SimulatorError::Histogram(e.to_string()))?;
        }

        let secs = |micros: u64| micros as f64 / MICROS_PER_SEC;
        Ok(Self {
            name: name.to_string(),
            count: hist.len(),
            mean: hist.mean() / MICROS_PER_SEC,
            p50: secs(hist.value_at_quantile(0.5)),
            p90: secs(hist.value_at_quantile(0.9)),
            p99: secs(hist.value_at_quantile(0.99)),
            p999: secs(hist.value_at_quantile(0.999)),
            max: secs(hist.max()),
        })
    }

    /// One summary per distinct name, in order of first appearance.
    pub fn by_name<'a, I>(samples: I) -> Result<Vec<Self>, SimulatorError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut groups: IndexMap<&str, Vec<f64>> = IndexMap::new();
        for (name, latency) in samples {
            groups.entry(name).or_default().push(latency);
        }
        groups
            .into_iter()
            .map(|(name, latencies)| Self::from_secs(name, latencies))
            .collect()
    }
}

impl CsvRecord for LatencySummary {
    fn header() -> &'static str {
        "name,count,mean,p50,p90,p99,p999,max"
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            self.name, self.count, self.mean, self.p50, self.p90, self.p99, self.p999, self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_models::cache::CacheStats;

    fn row(time: f64) -> CacheStats {
        CacheStats {
            time,
            hits: 9,
            misses: 1,
            rate: 0.9,
            name: "backend_1%".into(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_all(&[row(1.0)]).unwrap();
        sink.write_all(&[row(2.0), row(3.0)]).unwrap();
        assert_eq!(sink.rows(), 3);

        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "time,hits,misses,rate,name");
        assert_eq!(lines[3], "3.000000,9,1,0.900000,backend_1%");
    }

    #[test]
    fn test_empty_batch_still_writes_header() {
        let mut sink = CsvSink::new(Vec::new());
        sink.write_all::<CacheStats>(&[]).unwrap();
        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(out, "time,hits,misses,rate,name\n");
    }

    #[test]
    fn test_latency_percentiles() {
        let latencies = (1..=1000).map(|ms| ms as f64 / 1000.0);
        let summary = LatencySummary::from_secs("uniform", latencies).unwrap();
        assert_eq!(summary.count, 1000);
        assert!((summary.mean - 0.5005).abs() < 0.001);
        assert!((summary.p50 - 0.5).abs() < 0.001);
        assert!((summary.p99 - 0.99).abs() < 0.002);
        assert!((summary.max - 1.0).abs() < 0.002);
        assert!(summary.p50 <= summary.p90 && summary.p90 <= summary.p99);
    }

    #[test]
    fn test_bad_samples_skipped() {
        let summary =
            LatencySummary::from_secs("x", [0.1, f64::NAN, -1.0, f64::INFINITY]).unwrap();
        assert_eq!(summary.count, 1);
    }

    #[test]
    fn test_by_name_keeps_first_seen_order() {
        let samples = [("LIFO_0.50", 1.0), ("FCFS_0.50", 2.0), ("LIFO_0.50", 3.0)];
        let summaries = LatencySummary::by_name(samples).unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["LIFO_0.50", "FCFS_0.50"]);
        assert_eq!(summaries[0].count, 2);
    }
}
