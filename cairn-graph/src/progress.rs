use std::sync::{Arc, Mutex};

/// The stages a graph build passes through, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildStage {
    Filter,
    Junctions,
    Elevation,
    Edges,
    Write,
}

/// One progress record. `units_total` is fixed within a stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildProgress {
    pub stage: BuildStage,
    pub units_done: u64,
    pub units_total: u64,
}

/// A latest-value progress cell shared between the builder and its
/// consumer.
///
/// The builder never blocks on the consumer: each publish overwrites the
/// previous record, so a slow consumer simply observes the most recent
/// state when it polls.
#[derive(Clone, Debug, Default)]
pub struct ProgressSink {
    latest: Arc<Mutex<Option<BuildProgress>>>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published record, if any.
    pub fn latest(&self) -> Option<BuildProgress> {
        self.latest.lock().map(|guard| *guard).unwrap_or(None)
    }

    pub(crate) fn publish(&self, progress: BuildProgress) {
        if let Ok(mut guard) = self.latest.lock() {
            *guard = Some(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_overwrite() {
        let sink = ProgressSink::new();
        assert_eq!(sink.latest(), None);
        sink.publish(BuildProgress {
            stage: BuildStage::Filter,
            units_done: 1,
            units_total: 10,
        });
        sink.publish(BuildProgress {
            stage: BuildStage::Edges,
            units_done: 5,
            units_total: 10,
        });
        let latest = sink.latest().unwrap();
        assert_eq!(latest.stage, BuildStage::Edges);
        assert_eq!(latest.units_done, 5);
    }
}
