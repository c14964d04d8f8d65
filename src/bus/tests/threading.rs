//! Tests for thread mode routing

#[cfg(test)]
mod tests {
    use crate::bus::api::{
        ChannelMainThreadSupport, EventBus, Subscribe, SubscriberMethods, ThreadExecutor,
        ThreadMode,
    };
    use crate::bus::tests::support::{Gate, Journal, WAIT};
    use std::sync::Arc;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    /// Records which thread each mode ran on
    #[derive(Default)]
    struct ThreadProbe {
        journal: Journal,
        threads: std::sync::Mutex<Vec<(ThreadMode, ThreadId)>>,
    }

    impl ThreadProbe {
        fn seen(&self, mode: ThreadMode) {
            self.threads
                .lock()
                .unwrap()
                .push((mode, thread::current().id()));
            self.journal.record(mode.to_string());
        }

        fn thread_of(&self, mode: ThreadMode) -> Option<ThreadId> {
            self.threads
                .lock()
                .unwrap()
                .iter()
                .find(|(m, _)| *m == mode)
                .map(|(_, id)| *id)
        }
    }

    impl Subscribe for ThreadProbe {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            for mode in [
                ThreadMode::Posting,
                ThreadMode::Main,
                ThreadMode::MainOrdered,
                ThreadMode::Background,
                ThreadMode::Async,
            ] {
                let name = match mode {
                    ThreadMode::Posting => "on_posting",
                    ThreadMode::Main => "on_main",
                    ThreadMode::MainOrdered => "on_main_ordered",
                    ThreadMode::Background => "on_background",
                    ThreadMode::Async => "on_async",
                };
                methods
                    .on::<String>(name, move |probe, _text| {
                        probe.seen(mode);
                        Ok(None)
                    })
                    .thread_mode(mode);
            }
        }
    }

    #[test]
    fn test_routing_without_main_thread_support() {
        let bus = EventBus::new().unwrap();
        let probe = Arc::new(ThreadProbe::default());
        bus.register(&probe).unwrap();

        bus.post("route".to_string()).unwrap();
        probe.journal.wait_for(5, WAIT);

        let here = thread::current().id();
        assert_eq!(probe.thread_of(ThreadMode::Posting), Some(here));
        assert_eq!(probe.thread_of(ThreadMode::Main), Some(here));
        assert_eq!(probe.thread_of(ThreadMode::MainOrdered), Some(here));
        assert_ne!(probe.thread_of(ThreadMode::Background), Some(here));
        assert_ne!(probe.thread_of(ThreadMode::Async), Some(here));
        assert!(probe.thread_of(ThreadMode::Background).is_some());
        assert!(probe.thread_of(ThreadMode::Async).is_some());
    }

    #[test]
    fn test_routing_from_main_thread_with_support() {
        let (support, mut main_loop) = ChannelMainThreadSupport::new();
        let bus = EventBus::builder()
            .with_main_thread_support(Arc::new(support))
            .build()
            .unwrap();
        let probe = Arc::new(ThreadProbe::default());
        bus.register(&probe).unwrap();

        bus.post("main".to_string()).unwrap();

        let here = thread::current().id();
        assert_eq!(probe.thread_of(ThreadMode::Posting), Some(here));
        assert_eq!(probe.thread_of(ThreadMode::Main), Some(here));
        // MainOrdered is always queued when support exists
        assert_eq!(probe.thread_of(ThreadMode::MainOrdered), None);
        assert_eq!(main_loop.run_pending(), 1);
        assert_eq!(probe.thread_of(ThreadMode::MainOrdered), Some(here));

        probe.journal.wait_for(5, WAIT);
        assert_ne!(probe.thread_of(ThreadMode::Background), Some(here));
    }

    #[test]
    fn test_routing_from_worker_thread_with_support() {
        let (support, mut main_loop) = ChannelMainThreadSupport::new();
        let bus = EventBus::builder()
            .with_main_thread_support(Arc::new(support))
            .build()
            .unwrap();
        let probe = Arc::new(ThreadProbe::default());
        bus.register(&probe).unwrap();

        let poster = bus.clone();
        let worker = thread::spawn(move || {
            poster.post("worker".to_string()).unwrap();
            thread::current().id()
        })
        .join()
        .unwrap();

        assert_eq!(probe.thread_of(ThreadMode::Posting), Some(worker));
        // Background runs inline off the main thread
        assert_eq!(probe.thread_of(ThreadMode::Background), Some(worker));
        assert_eq!(probe.thread_of(ThreadMode::Main), None);

        assert_eq!(main_loop.run_pending(), 2);
        let here = thread::current().id();
        assert_eq!(probe.thread_of(ThreadMode::Main), Some(here));
        assert_eq!(probe.thread_of(ThreadMode::MainOrdered), Some(here));
    }

    #[derive(Default)]
    struct SlowBackground {
        journal: Journal,
        gate: Gate,
    }

    impl Subscribe for SlowBackground {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            methods
                .on::<u32>("on_number", |s, number| {
                    s.journal.record(format!("got {number}"));
                    if *number == 1 {
                        s.gate.wait();
                    }
                    Ok(None)
                })
                .thread_mode(ThreadMode::Background);
        }
    }

    #[test]
    fn test_background_delivers_in_order_on_one_worker() {
        let bus = EventBus::new().unwrap();
        let subscriber = Arc::new(SlowBackground::default());
        bus.register(&subscriber).unwrap();
        subscriber.gate.open();

        for number in 1..=20u32 {
            bus.post(number).unwrap();
        }

        let entries = subscriber.journal.wait_for(20, WAIT);
        let expected: Vec<String> = (1..=20).map(|n| format!("got {n}")).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_unregister_drops_queued_deliveries() {
        let bus = EventBus::new().unwrap();
        let subscriber = Arc::new(SlowBackground::default());
        bus.register(&subscriber).unwrap();

        bus.post(1u32).unwrap();
        bus.post(2u32).unwrap();
        bus.post(3u32).unwrap();
        subscriber.journal.wait_for(1, WAIT);

        bus.unregister(&subscriber).unwrap();
        subscriber.gate.open();
        thread::sleep(Duration::from_millis(200));

        assert_eq!(subscriber.journal.entries(), vec!["got 1"]);
    }

    #[derive(Default)]
    struct AsyncCounter {
        journal: Journal,
    }

    impl Subscribe for AsyncCounter {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            methods
                .on::<u32>("on_number", |s, number| {
                    s.journal.record(format!("{number}"));
                    Ok(None)
                })
                .thread_mode(ThreadMode::Async);
        }
    }

    #[test]
    fn test_async_delivers_every_message_with_thread_executor() {
        let bus = EventBus::builder()
            .with_executor(Arc::new(ThreadExecutor))
            .build()
            .unwrap();
        let counter = Arc::new(AsyncCounter::default());
        bus.register(&counter).unwrap();

        for number in 0..10u32 {
            bus.post(number).unwrap();
        }

        let mut entries = counter.journal.wait_for(10, WAIT);
        entries.sort_by_key(|entry| entry.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..10).map(|n| n.to_string()).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_background_worker_restarts_after_idle() {
        let bus = EventBus::builder()
            .with_background_poll_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let subscriber = Arc::new(SlowBackground::default());
        subscriber.gate.open();
        bus.register(&subscriber).unwrap();

        bus.post(1u32).unwrap();
        subscriber.journal.wait_for(1, WAIT);
        thread::sleep(Duration::from_millis(100));
        bus.post(2u32).unwrap();

        assert_eq!(subscriber.journal.wait_for(2, WAIT), vec!["got 1", "got 2"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_main_loop_runs_on_current_thread_runtime() {
        let (support, main_loop) = ChannelMainThreadSupport::new();
        let bus = EventBus::builder()
            .with_main_thread_support(Arc::new(support))
            .with_background_poll_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let probe = Arc::new(ThreadProbe::default());
        bus.register(&probe).unwrap();

        bus.post("ordered".to_string()).unwrap();
        assert_eq!(probe.thread_of(ThreadMode::MainOrdered), None);

        // The loop ends once every clone of the bus, and with it the sender, is gone
        drop(bus);
        let runner = main_loop.run();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap();
        assert!(probe.thread_of(ThreadMode::MainOrdered).is_some());
    }
}
