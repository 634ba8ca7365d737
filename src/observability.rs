use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("minnow.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("minnow.client.request_errors");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("minnow.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("minnow.stream.errors");

pub(crate) static TURNS: Counter = Counter::new("minnow.store.turns");
pub(crate) static TURN_RETRIES: Counter = Counter::new("minnow.store.turn_retries");
pub(crate) static TURN_FAILURES: Counter = Counter::new("minnow.store.turn_failures");
pub(crate) static TURN_DURATION: Moments = Moments::new("minnow.store.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);

    collector.register_counter(&TURNS);
    collector.register_counter(&TURN_RETRIES);
    collector.register_counter(&TURN_FAILURES);
    collector.register_moments(&TURN_DURATION);
}
