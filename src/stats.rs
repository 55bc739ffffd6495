use std::io::{self, Write};

/// Running count/sum/min/max over latency samples in nanoseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Stats {
    pub fn new() -> Stats {
        Stats {
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    pub fn record(&mut self, nanos: u64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(nanos);
        self.min = self.min.min(nanos);
        self.max = self.max.max(nanos);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Average is taken over the samples actually recorded. With no samples
    /// every field is zero.
    pub fn summary(&self) -> Summary {
        if self.count == 0 {
            return Summary::default();
        }
        Summary {
            samples: self.count,
            average: self.sum / self.count,
            max: self.max,
            min: self.min,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub samples: u64,
    pub average: u64,
    pub max: u64,
    pub min: u64,
}

impl Summary {
    pub fn write_report<W: Write>(&self, iterations: u32, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "average over {} iterations: {} nanoseconds",
            iterations, self.average
        )?;
        writeln!(
            out,
            "    max over {} iterations: {} nanoseconds",
            iterations, self.max
        )?;
        writeln!(
            out,
            "    min over {} iterations: {} nanoseconds",
            iterations, self.min
        )?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn average_stays_between_min_and_max() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut stats = Stats::new();
        for _ in 0..10_000 {
            stats.record(rng.gen_range(0..5_000_000));
            let s = stats.summary();
            assert!(s.min <= s.average && s.average <= s.max, "{:?}", s);
        }
        assert_eq!(stats.count(), 10_000);
    }

    #[test]
    fn tracks_extremes() {
        let mut stats = Stats::new();
        for nanos in [300, 100, 200] {
            stats.record(nanos);
        }
        assert_eq!(
            stats.summary(),
            Summary {
                samples: 3,
                average: 200,
                max: 300,
                min: 100,
            }
        );
    }

    #[test]
    fn empty_summary_is_zero() {
        let stats = Stats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.summary(), Summary::default());
    }

    #[test]
    fn report_format() {
        let mut stats = Stats::new();
        stats.record(10);
        stats.record(30);
        let mut out = Vec::new();
        stats.summary().write_report(2, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "average over 2 iterations: 20 nanoseconds\n\
             \x20   max over 2 iterations: 30 nanoseconds\n\
             \x20   min over 2 iterations: 10 nanoseconds\n"
        );
    }
}
