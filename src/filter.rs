//! Filtering handler that gates events before they reach a [`Sink`].
//!
//! Stages run in a fixed order: predicates, minimum level, maximum level,
//! duplicate suppression, then the wrapped sink. A [`Filter`] is itself a
//! [`Sink`], so chains are built by nesting.

use crate::{
    config::FilterConfig,
    error::Error,
    flatten::{FieldValue, FlatFields, ScalarValue},
    sink::Sink,
    types::{Event, EventId, Level},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, trace};

/// Message of the event emitted in place of a run of suppressed duplicates.
pub const DUPLICATES_SUPPRESSED: &str = "duplicates of last log event suppressed";

/// Flat field of the roll-up event holding the number of suppressed duplicates.
pub const DUPLICATES_COUNT_FIELD: &str = "count";

pub type Predicate = Box<dyn Fn(&Event) -> bool + Send + Sync>;

pub struct Filter<S> {
    sink: S,
    state: Mutex<FilterState>,
}

#[derive(Default)]
struct FilterState {
    predicates: Vec<Predicate>,
    level_min: Option<Level>,
    level_max: Option<Level>,
    dedup: Option<Dedup>,
}

impl<S: Sink> Filter<S> {
    /// A filter that forwards everything until configured otherwise.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: Mutex::new(FilterState::default()),
        }
    }

    pub fn from_config(sink: S, cfg: &FilterConfig) -> Self {
        let filter = Self::new(sink);
        {
            let mut state = filter.state.lock();
            state.level_min = cfg.level_min;
            state.level_max = cfg.level_max;
            if cfg.dedup {
                state.dedup = Some(Dedup::default());
            }
        }
        filter
    }

    /// Register an additional predicate. All predicates must accept an event
    /// for it to pass; they're evaluated in registration order.
    ///
    /// Predicates run while the filter's lock is held and must not call back
    /// into the same filter.
    pub fn filter<P>(&self, predicate: P)
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.state.lock().predicates.push(Box::new(predicate));
    }

    /// Set the inclusive lower level bound.
    pub fn level_min(&self, level: Level) {
        self.state.lock().level_min = Some(level);
    }

    /// Set the inclusive upper level bound.
    pub fn level_max(&self, level: Level) {
        self.state.lock().level_max = Some(level);
    }

    /// Enable duplicate-message suppression. Enabling it again keeps the
    /// current suppression state.
    pub fn dedup(&self) {
        self.state.lock().dedup.get_or_insert_with(Dedup::default);
    }

    pub fn with_filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter(predicate);
        self
    }

    pub fn with_level_min(self, level: Level) -> Self {
        self.level_min(level);
        self
    }

    pub fn with_level_max(self, level: Level) -> Self {
        self.level_max(level);
        self
    }

    pub fn with_dedup(self) -> Self {
        self.dedup();
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: Sink> Sink for Filter<S> {
    fn event(&self, event: &Event) -> Result<(), Error> {
        // Held until the sink returns so dedup decisions stay atomic
        let mut state = self.state.lock();

        if let Some(idx) = state.predicates.iter().position(|p| !p(event)) {
            debug!(id = event.id, predicate = idx, "Event rejected by predicate");
            return Ok(());
        }

        if state.level_min.is_some_and(|min| event.level < min) {
            debug!(id = event.id, level = %event.level, "Event below minimum level");
            return Ok(());
        }

        if state.level_max.is_some_and(|max| event.level > max) {
            debug!(id = event.id, level = %event.level, "Event above maximum level");
            return Ok(());
        }

        let Some(dedup) = state.dedup.as_mut() else {
            return self.sink.event(event);
        };

        // Dedup state only advances past what the sink has accepted
        match dedup.check(event) {
            DedupAction::Suppress => Ok(()),
            DedupAction::Forward(rollup) => {
                if let Some(rollup) = rollup {
                    self.sink.event(&rollup)?;
                    dedup.flushed();
                }
                self.sink.event(event)?;
                dedup.forwarded(event);
                Ok(())
            }
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Filter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Filter")
            .field("sink", &self.sink)
            .field("predicates", &state.predicates.len())
            .field("level_min", &state.level_min)
            .field("level_max", &state.level_max)
            .field("dedup", &state.dedup)
            .finish()
    }
}

#[derive(Debug)]
enum DedupAction {
    Suppress,
    /// Forward the event, preceded by the roll-up if one is due
    Forward(Option<Event>),
}

/// The most recently suppressed duplicate.
#[derive(Copy, Clone, Debug)]
struct Suppressed {
    id: EventId,
    level: Level,
    time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Dedup {
    last_message: Option<String>,
    count: u64,
    latest: Option<Suppressed>,
}

impl Dedup {
    /// Suppressions are recorded right away. For anything else the caller
    /// reports back with [`Dedup::flushed`] and [`Dedup::forwarded`] once
    /// the sink has taken the events.
    fn check(&mut self, event: &Event) -> DedupAction {
        if self.last_message.as_deref() == Some(event.message.as_str()) {
            self.count += 1;
            self.latest = Some(Suppressed {
                id: event.id,
                level: event.level,
                time: event.time,
            });
            trace!(id = event.id, count = self.count, "Suppressed duplicate event");
            return DedupAction::Suppress;
        }

        let rollup = match self.latest {
            Some(latest) if self.count != 0 => Some(rollup_event(latest, self.count)),
            _ => None,
        };
        if let Some(r) = rollup.as_ref() {
            debug!(id = r.id, count = self.count, "Flushing suppressed duplicates");
        }
        DedupAction::Forward(rollup)
    }

    /// The roll-up was delivered.
    fn flushed(&mut self) {
        self.count = 0;
        self.latest = None;
    }

    /// The event was delivered and starts a new run.
    fn forwarded(&mut self, event: &Event) {
        self.last_message = Some(event.message.clone());
    }
}

fn rollup_event(latest: Suppressed, count: u64) -> Event {
    let mut flat_fields = FlatFields::new();
    flat_fields.insert(DUPLICATES_COUNT_FIELD.to_owned(), ScalarValue::Unsigned(count));
    Event {
        id: latest.id,
        level: latest.level,
        time: latest.time,
        message: DUPLICATES_SUPPRESSED.to_owned(),
        fields: FieldValue::mapping([(DUPLICATES_COUNT_FIELD, count)]),
        flat_fields,
        stack: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn event(id: EventId, message: &str) -> Event {
        Event::new(id, Level::Notice, message, FieldValue::default())
    }

    /// Runs `check` and reports every forwarded event as delivered.
    fn deliver(d: &mut Dedup, e: &Event) -> DedupAction {
        let action = d.check(e);
        if let DedupAction::Forward(rollup) = &action {
            if rollup.is_some() {
                d.flushed();
            }
            d.forwarded(e);
        }
        action
    }

    #[test]
    fn dedup_without_duplicates_never_rolls_up() {
        let mut d = Dedup::default();
        assert!(matches!(deliver(&mut d, &event(1, "a")), DedupAction::Forward(None)));
        assert!(matches!(deliver(&mut d, &event(2, "b")), DedupAction::Forward(None)));
        assert!(matches!(deliver(&mut d, &event(3, "a")), DedupAction::Forward(None)));
    }

    #[test]
    fn dedup_rollup_carries_latest_suppressed() {
        let mut d = Dedup::default();
        assert!(matches!(deliver(&mut d, &event(1, "m")), DedupAction::Forward(None)));
        assert!(matches!(deliver(&mut d, &event(2, "m")), DedupAction::Suppress));
        assert!(matches!(deliver(&mut d, &event(3, "m")), DedupAction::Suppress));
        assert!(matches!(deliver(&mut d, &event(4, "m")), DedupAction::Suppress));
        let DedupAction::Forward(Some(rollup)) = deliver(&mut d, &event(5, "n")) else {
            panic!("expected a roll-up");
        };
        assert_eq!(rollup.id, 4);
        assert_eq!(rollup.message, DUPLICATES_SUPPRESSED);
        assert_eq!(rollup.flat_fields["count"], ScalarValue::Unsigned(3));
        assert_eq!(d.count, 0);
        assert_eq!(d.last_message.as_deref(), Some("n"));
        // The run of "n" starts fresh
        assert!(matches!(deliver(&mut d, &event(6, "m")), DedupAction::Forward(None)));
    }

    #[test]
    fn dedup_check_alone_keeps_pending_rollup() {
        let mut d = Dedup::default();
        deliver(&mut d, &event(1, "m"));
        deliver(&mut d, &event(2, "m"));
        // Never reported as delivered
        assert!(matches!(d.check(&event(3, "n")), DedupAction::Forward(Some(_))));
        assert_eq!(d.count, 1);
        assert_eq!(d.last_message.as_deref(), Some("m"));
        let DedupAction::Forward(Some(rollup)) = d.check(&event(4, "n")) else {
            panic!("expected the roll-up again");
        };
        assert_eq!(rollup.id, 2);
        assert_eq!(rollup.flat_fields["count"], ScalarValue::Unsigned(1));
    }
}
