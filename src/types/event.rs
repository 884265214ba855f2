use crate::{
    config::{Config, StackConfig},
    flatten::{FieldValue, FlatFields, Flattener},
    types::{capture_stack, EventId, Level, StackFrame},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One log occurrence.
///
/// Events are fully normalized at construction: the payload is deep-copied and
/// flattened and, when requested, the call stack is resolved. Handlers only ever
/// see events by shared reference.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub level: Level,
    pub time: DateTime<Utc>,
    pub message: String,
    pub fields: FieldValue,
    pub flat_fields: FlatFields,
    /// Innermost user frame first
    pub stack: Option<Vec<StackFrame>>,
}

impl Event {
    /// Build an event with the default flattening bound and no stack.
    pub fn new<M, F>(id: EventId, level: Level, message: M, fields: F) -> Self
    where
        M: Into<String>,
        F: Into<FieldValue>,
    {
        EventFactory::default().new_event(id, level, message, fields, false)
    }
}

/// Builds events according to a [`Config`].
#[derive(Clone, Debug, Default)]
pub struct EventFactory {
    flattener: Flattener,
    stack: StackConfig,
}

impl EventFactory {
    pub fn new(cfg: &Config) -> Self {
        Self {
            flattener: Flattener::new(&cfg.flatten),
            stack: cfg.stack.clone(),
        }
    }

    pub fn stack_config(&self) -> &StackConfig {
        &self.stack
    }

    #[inline(never)]
    pub fn new_event<M, F>(
        &self,
        id: EventId,
        level: Level,
        message: M,
        fields: F,
        capture: bool,
    ) -> Event
    where
        M: Into<String>,
        F: Into<FieldValue>,
    {
        let time = Utc::now();

        // No foreign frame may sit between library frames on the capture path
        let stack = if capture {
            Some(capture_stack(&self.stack))
        } else {
            None
        };

        let flattened = self.flattener.flatten(&fields.into());

        Event {
            id,
            level,
            time,
            message: message.into(),
            fields: flattened.copy,
            flat_fields: flattened.flat,
            stack,
        }
    }
}
