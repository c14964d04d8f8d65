//! Delivery throughput benchmark
//!
//! Registers a number of counting subscribers, posts a stream of messages and
//! waits until every delivery has landed or the timeout passes.

use crate::bus::api::{
    ChannelMainThreadSupport, EventBus, EventBusBuilder, EventBusError, EventBusResult,
    MainThreadLoop, Message, MessageKind, SimpleSubscriberInfoIndex, Subscribe, ThreadMode,
};
use crate::core::sync::handle_mutex_poison;
use prettytable::{format, row, Table};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Benchmark message
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub seq: usize,
}

impl MessageKind for Tick {}
impl Message for Tick {}

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub messages: usize,
    pub subscribers: usize,
    pub thread_mode: ThreadMode,
    pub sticky: bool,
    pub timeout: Duration,
}

#[derive(Default)]
struct Tally {
    delivered: Mutex<usize>,
    changed: Condvar,
}

impl Tally {
    fn record(&self) -> EventBusResult<()> {
        *handle_mutex_poison(self.delivered.lock(), |message| {
            EventBusError::Synchronisation { message }
        })? += 1;
        self.changed.notify_all();
        Ok(())
    }

    /// Wait up to `slice` for the count to reach `expected`; returns the count
    fn wait_for(&self, expected: usize, slice: Duration) -> EventBusResult<usize> {
        let delivered = handle_mutex_poison(self.delivered.lock(), |message| {
            EventBusError::Synchronisation { message }
        })?;
        let (delivered, _) = handle_mutex_poison(
            self.changed
                .wait_timeout_while(delivered, slice, |count| *count < expected),
            |message| EventBusError::Synchronisation { message },
        )?;
        Ok(*delivered)
    }
}

struct Counter {
    tally: Arc<Tally>,
}

// Methods come from the index built for the chosen thread mode
impl Subscribe for Counter {}

fn counter_index(thread_mode: ThreadMode) -> SimpleSubscriberInfoIndex {
    SimpleSubscriberInfoIndex::new().with_subscriber::<Counter>(move |methods| {
        methods
            .on::<Tick>("on_tick", |counter, _tick| {
                counter.tally.record()?;
                Ok(None)
            })
            .thread_mode(thread_mode);
    })
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub options: BenchOptions,
    pub expected: usize,
    pub delivered: usize,
    pub post_time: Duration,
    pub total_time: Duration,
}

impl BenchReport {
    pub fn completed(&self) -> bool {
        self.delivered >= self.expected
    }

    /// Deliveries per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs > 0.0 {
            self.delivered as f64 / secs
        } else {
            0.0
        }
    }

    pub fn render(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.set_titles(row![b->"Metric", b->"Value"]);
        table.add_row(row!["Thread mode", self.options.thread_mode]);
        table.add_row(row!["Sticky", self.options.sticky]);
        table.add_row(row!["Messages", self.options.messages]);
        table.add_row(row!["Subscribers", self.options.subscribers]);
        table.add_row(row!["Deliveries", format!("{}/{}", self.delivered, self.expected)]);
        table.add_row(row!["Post time", format!("{:.3?}", self.post_time)]);
        table.add_row(row!["Total time", format!("{:.3?}", self.total_time)]);
        table.add_row(row!["Deliveries/s", format!("{:.0}", self.throughput())]);
        table
    }
}

/// Run one benchmark on a bus built from `builder`
///
/// The counter's methods depend on the thread mode, so cached subscriber
/// declarations are dropped first.
pub fn run(builder: EventBusBuilder, options: &BenchOptions) -> EventBusResult<BenchReport> {
    EventBus::clear_caches()?;

    let mut builder = builder.add_index(Arc::new(counter_index(options.thread_mode)));
    let mut main_loop: Option<MainThreadLoop> = None;
    if matches!(options.thread_mode, ThreadMode::Main | ThreadMode::MainOrdered) {
        let (support, receiver) = ChannelMainThreadSupport::new();
        builder = builder.with_main_thread_support(Arc::new(support));
        main_loop = Some(receiver);
    }
    let bus = builder.build()?;

    let tally = Arc::new(Tally::default());
    let counters: Vec<Arc<Counter>> = (0..options.subscribers)
        .map(|_| {
            Arc::new(Counter {
                tally: Arc::clone(&tally),
            })
        })
        .collect();
    for counter in &counters {
        bus.register(counter)?;
    }

    let expected = options.messages * options.subscribers;
    log::info!(
        "Posting {} messages to {} subscribers ({} mode)",
        options.messages,
        options.subscribers,
        options.thread_mode
    );

    let started = Instant::now();
    for seq in 0..options.messages {
        if options.sticky {
            bus.post_sticky(Tick { seq })?;
        } else {
            bus.post(Tick { seq })?;
        }
    }
    let post_time = started.elapsed();

    let deadline = started + options.timeout;
    let delivered = loop {
        if let Some(main_loop) = main_loop.as_mut() {
            main_loop.run_pending();
        }
        let delivered = tally.wait_for(expected, Duration::from_millis(10))?;
        if delivered >= expected || Instant::now() >= deadline {
            break delivered;
        }
    };
    let total_time = started.elapsed();

    if delivered < expected {
        log::warn!(
            "Timed out with {} of {} deliveries after {:?}",
            delivered,
            expected,
            options.timeout
        );
    }

    for counter in &counters {
        bus.unregister(counter)?;
    }
    bus.remove_all_sticky()?;

    Ok(BenchReport {
        options: options.clone(),
        expected,
        delivered,
        post_time,
        total_time,
    })
}
