use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use chrono::NaiveDate;

use crate::{
    dataset::Dataset,
    errors::Result,
    progress::Progress,
    range::{FloatRange, IntRange},
    resolver::Resolver,
    store::MemoryMapper,
    synth::{synthesize, SynthConfig},
    time::TimeRange,
};

pub(crate) fn resolver() -> Arc<Resolver> {
    Arc::new(Resolver::new(Box::new(MemoryMapper::new()), 1 << 26))
}

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()
}

/// Coordinates of the fixture with no variables: 3 members, 730 days, 8x8 grid around Austin
pub(crate) fn empty_dataset(resolver: &Arc<Resolver>) -> Dataset {
    Dataset::new(
        "Test ensemble",
        TimeRange::daily(first_day(), 730),
        FloatRange::new(29.9, 0.125, 8),
        FloatRange::new(-98.1, 0.125, 8),
        IntRange::new(1, 1, 3),
        Arc::clone(resolver),
    )
}

/// The committed fixture dataset, with synthetic `elevation`, `mask`, `t_mean` and `pcp`
pub(crate) async fn dataset(resolver: &Arc<Resolver>) -> Result<Dataset> {
    let config = SynthConfig {
        title: String::from("Test ensemble"),
        start: first_day(),
        ..SynthConfig::default()
    };

    synthesize(resolver, &config).await
}

/// Records what a computation reported
#[derive(Default)]
pub(crate) struct CountingProgress {
    total: AtomicU64,
    advanced: AtomicU64,
    finished: AtomicBool,
    abandoned: AtomicBool,
}

impl CountingProgress {
    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn advanced(&self) -> u64 {
        self.advanced.load(Ordering::SeqCst)
    }

    pub(crate) fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl Progress for CountingProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self, tasks: u64) {
        self.advanced.fetch_add(tasks, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }
}
