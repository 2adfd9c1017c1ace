use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use metrics::{
    Counter,
    Gauge,
    Histogram,
    Key,
    KeyName,
    Metadata,
    Recorder,
    SharedString,
    Unit,
    set_global_recorder,
};
use metrics_util::registry::{
    AtomicStorage,
    Registry,
};

// All process metrics live in this in-memory registry; the /metrics route
// renders it in the prometheus text exposition format.  Histograms are not
// used anywhere in this process.
#[derive(Clone)]
pub struct MemoryRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl MemoryRecorder {
    pub fn new() -> MemoryRecorder {
        MemoryRecorder { registry: Arc::new(Registry::atomic()) }
    }

    pub fn install(&self) -> anyhow::Result<()> {
        set_global_recorder(self.clone())?;
        Ok(())
    }

    pub fn get_counter(&self, key: &Key) -> Option<u64> {
        self.registry.get_counter(key).map(|v| v.load(Ordering::Relaxed))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let mut counters: Vec<_> = self.registry.get_counter_handles().into_iter().collect();
        counters.sort_by(|(k1, _), (k2, _)| k1.name().cmp(k2.name()));
        for (key, value) in counters {
            let _ = writeln!(out, "{} {}", format_key(&key), value.load(Ordering::Relaxed));
        }

        let mut gauges: Vec<_> = self.registry.get_gauge_handles().into_iter().collect();
        gauges.sort_by(|(k1, _), (k2, _)| k1.name().cmp(k2.name()));
        for (key, value) in gauges {
            let _ = writeln!(out, "{} {}", format_key(&key), f64::from_bits(value.load(Ordering::Relaxed)));
        }

        out
    }
}

fn format_key(key: &Key) -> String {
    let labels: Vec<_> = key.labels().map(|l| format!("{}=\"{}\"", l.key(), l.value())).collect();
    if labels.is_empty() {
        key.name().into()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for MemoryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| Counter::from_arc(c.clone()))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| Gauge::from_arc(g.clone()))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| Histogram::from_arc(h.clone()))
    }
}
