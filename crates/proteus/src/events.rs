//! The per-fuzzer event registry.
//!
//! Listeners run synchronously on the fuzzer's single queue, in registration
//! order. There is no global registry; every fuzzer instance owns its own.

use crate::{execution::Execution, ir::Program};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Verbose,
}

/// A lifecycle event. Payloads are borrowed; listeners that need to keep
/// data clone it.
#[derive(Debug)]
pub enum Event<'a> {
    /// The fuzzer finished construction and is about to start.
    Initialized,
    /// The fuzzer is shutting down.
    Shutdown,
    /// A fresh program came out of generation or mutation.
    ProgramGenerated(&'a Program),
    /// A program executed successfully.
    ValidProgramFound(&'a Program),
    /// A program triggered new aspects and entered the corpus.
    InterestingProgramFound(&'a Program),
    /// A program crashed the target.
    CrashFound(&'a Program),
    /// A program is about to be executed.
    PreExecute(&'a Program),
    /// An execution finished.
    PostExecute(&'a Execution),
    /// A log line from some component.
    Log {
        level: LogLevel,
        label: &'a str,
        message: &'a str,
    },
}

type Listener = Box<dyn FnMut(&Event<'_>)>;

/// Synchronous listener registration and dispatch.
#[derive(Default)]
pub struct Events {
    listeners: Vec<Listener>,
}

impl Events {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for all events.
    pub fn add_listener(&mut self, listener: impl FnMut(&Event<'_>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Dispatches an event to every listener, in registration order.
    pub fn dispatch(&mut self, event: &Event<'_>) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Convenience for emitting a log event.
    pub fn log(&mut self, level: LogLevel, label: &str, message: &str) {
        self.dispatch(&Event::Log { level, label, message });
    }
}

/// A listener that prints log events to stderr, for CLI use.
#[must_use]
pub fn stderr_log_listener(min_level: LogLevel) -> impl FnMut(&Event<'_>) {
    move |event| {
        if let Event::Log { level, label, message } = event {
            if *level <= min_level {
                eprintln!("[{label}] {level}: {message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn listeners_run_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut events = Events::new();
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            events.add_listener(move |event| {
                if matches!(event, Event::Initialized) {
                    seen.borrow_mut().push(tag);
                }
            });
        }
        events.dispatch(&Event::Initialized);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }
}
