use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use magpie::{
    AsyncError, ShutdownFlush, ShutdownMode, TimedEventQueue, TimedEventState, TimerHandle,
    INVALID_EVENT_ID,
};

struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Arc<Gate> {
        Arc::new(Gate {
            open: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

fn recording_event(
    tag: &'static str,
    done: &mpsc::Sender<&'static str>,
) -> Arc<TimedEventState> {
    let done = done.clone();
    TimedEventState::new(
        Some(Arc::new(move |_: &TimedEventState, _: &TimerHandle| {
            let _ = done.send(tag);
        })),
        None,
    )
}

#[test]
fn startup_is_single_init() {
    let queue = TimedEventQueue::new();
    assert_eq!(
        queue.post_event(&TimedEventState::new(None, None)),
        Err(AsyncError::NotInitialized)
    );
    assert_eq!(
        queue.shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Sync),
        Err(AsyncError::NotInitialized)
    );

    queue.startup().unwrap();
    assert_eq!(queue.startup(), Err(AsyncError::ReEntry));
    queue.shutdown_sync().unwrap();
}

#[test]
fn delayed_events_execute_in_deadline_order() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    queue
        .post_event_with_delay(&recording_event("d300", &done_tx), 300)
        .unwrap();
    queue
        .post_event_with_delay(&recording_event("d100", &done_tx), 100)
        .unwrap();
    queue
        .post_event_with_delay(&recording_event("d500", &done_tx), 500)
        .unwrap();
    assert_eq!(queue.pending_event_count(), 3);

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(order, vec!["d100", "d300", "d500"]);
    assert_eq!(queue.pending_event_count(), 0);

    queue.shutdown_sync().unwrap();
}

#[test]
fn earlier_deadline_preempts_a_sleeping_wait() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    queue
        .post_event_with_delay(&recording_event("slow", &done_tx), 5_000)
        .unwrap();

    // Let the thread settle into its timed wait for the 5s entry.
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    queue
        .post_event_with_delay(&recording_event("fast", &done_tx), 50)
        .unwrap();

    let tag = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(tag, "fast");
    // Well before the 5s entry would have released the thread.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(queue.pending_event_count(), 1);

    queue.shutdown_sync().unwrap();
}

#[test]
fn cancelled_event_never_fires() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let id = queue
        .post_event_with_delay(&recording_event("doomed", &done_tx), 400)
        .unwrap();
    assert_eq!(queue.pending_event_count(), 1);

    queue.cancel_event(id).unwrap();
    assert_eq!(queue.pending_event_count(), 0);
    assert_eq!(queue.cancel_event(id), Err(AsyncError::NotFound));

    assert!(done_rx.recv_timeout(Duration::from_millis(800)).is_err());
    queue.shutdown_sync().unwrap();
}

#[test]
fn cancel_rejects_the_invalid_id() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();
    assert_eq!(
        queue.cancel_event(INVALID_EVENT_ID),
        Err(AsyncError::InvalidArgument("event id"))
    );
    queue.shutdown_sync().unwrap();
}

#[test]
fn cancelled_state_forgets_its_id() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let event = TimedEventState::new(None, None);
    let id = queue.post_event_with_delay(&event, 60_000).unwrap();
    assert_eq!(event.event_id(), id);

    queue.cancel_event(id).unwrap();
    assert_eq!(event.event_id(), INVALID_EVENT_ID);

    queue.shutdown_sync().unwrap();
}

#[test]
fn immediate_posts_run_ahead_of_back_posts() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    // Pin the queue thread so ordering is decided purely by insertion.
    let gate = Gate::new();
    {
        let gate = gate.clone();
        queue
            .post_callback(
                Arc::new(move |_: &TimedEventState, _: &TimerHandle| gate.wait()),
                None,
            )
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(100));

    let (done_tx, done_rx) = mpsc::channel();
    queue
        .post_event_to_back(&recording_event("back", &done_tx))
        .unwrap();
    queue.post_event(&recording_event("front1", &done_tx)).unwrap();
    queue.post_event(&recording_event("front2", &done_tx)).unwrap();

    gate.open();
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    // Immediate posts keep FIFO among themselves and precede the back post.
    assert_eq!(order, vec!["front1", "front2", "back"]);

    queue.shutdown_sync().unwrap();
}

#[test]
fn execute_tasks_flush_drains_before_stopping() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let gate = Gate::new();
    {
        let gate = gate.clone();
        queue
            .post_callback(
                Arc::new(move |_: &TimedEventState, _: &TimerHandle| gate.wait()),
                None,
            )
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(50));

    let (done_tx, done_rx) = mpsc::channel();
    for tag in ["p1", "p2", "p3"] {
        queue.post_event(&recording_event(tag, &done_tx)).unwrap();
    }

    let queue = Arc::new(queue);
    let shutdown_queue = queue.clone();
    let joiner = std::thread::spawn(move || {
        shutdown_queue
            .shutdown(ShutdownFlush::ExecuteTasks, ShutdownMode::Sync)
            .unwrap();
    });

    gate.open();
    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(order, vec!["p1", "p2", "p3"]);
    joiner.join().unwrap();

    assert_eq!(
        queue.shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Sync),
        Err(AsyncError::ReEntry)
    );
}

#[test]
fn skip_tasks_flush_abandons_pending_work() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    queue
        .post_event_with_delay(&recording_event("later", &done_tx), 60_000)
        .unwrap();
    queue
        .post_event_with_delay(&recording_event("much-later", &done_tx), 120_000)
        .unwrap();

    let started = Instant::now();
    queue
        .shutdown(ShutdownFlush::SkipTasks, ShutdownMode::Sync)
        .unwrap();
    // Abandoning pending work returns promptly instead of serving deadlines.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(queue.pending_event_count(), 0);
    assert!(done_rx.try_recv().is_err());
}

#[test]
fn double_shutdown_reports_re_entry() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();
    queue.shutdown_sync().unwrap();
    assert_eq!(queue.shutdown_sync(), Err(AsyncError::ReEntry));
}

#[test]
fn queue_restarts_after_sync_shutdown() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();
    queue.shutdown_sync().unwrap();

    queue.startup().unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    queue.post_event(&recording_event("again", &done_tx)).unwrap();
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "again");
    queue.shutdown_sync().unwrap();
}

#[test]
fn callbacks_can_reschedule_through_the_handle() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let chained = done_tx.clone();
    queue
        .post_callback_with_delay(
            Arc::new(move |_: &TimedEventState, handle: &TimerHandle| {
                let chained = chained.clone();
                handle
                    .post_callback_with_delay(
                        Arc::new(move |_: &TimedEventState, _: &TimerHandle| {
                            let _ = chained.send("second");
                        }),
                        None,
                        20,
                    )
                    .unwrap();
                let _ = done_tx.send("first");
            }),
            None,
            20,
        )
        .unwrap();

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");

    queue.shutdown_sync().unwrap();
}

#[test]
fn replacing_post_cancels_everything_pending() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    queue
        .post_event_with_delay(&recording_event("stale1", &done_tx), 60_000)
        .unwrap();
    queue
        .post_event_with_delay(&recording_event("stale2", &done_tx), 60_000)
        .unwrap();
    assert_eq!(queue.pending_event_count(), 2);

    let replacement = done_tx.clone();
    queue
        .post_callback_with_delay_replacing_all(
            Arc::new(move |_: &TimedEventState, _: &TimerHandle| {
                let _ = replacement.send("fresh");
            }),
            None,
            50,
        )
        .unwrap();

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "fresh");
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    queue.shutdown_sync().unwrap();
}

#[test]
fn event_payload_reaches_the_callback() {
    let queue = TimedEventQueue::new();
    queue.startup().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let event = TimedEventState::new(
        Some(Arc::new(move |state: &TimedEventState, _: &TimerHandle| {
            let payload = state.object().unwrap();
            let value = magpie::downcast_object::<u32>(&payload).copied();
            let _ = done_tx.send(value);
        })),
        Some(magpie::object_ref(99_u32)),
    );
    queue.post_event(&event).unwrap();

    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Some(99)
    );
    queue.shutdown_sync().unwrap();
}
