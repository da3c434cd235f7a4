use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use magpie::{
    runtime, AsyncResult, AsyncScope, ThreadLimit, WorkerSelector,
};

#[test]
fn invoke_callback_runs_on_the_parallel_default_pool() -> Result<()> {
    let _scope = AsyncScope::new()?;

    let (tx, rx) = mpsc::channel();
    let result = AsyncResult::from_fn(move |_| {
        let _ = tx.send(std::thread::current().name().map(String::from));
    });
    runtime::invoke_callback(&result)?;

    let thread_name = rx.recv_timeout(Duration::from_secs(5))?;
    // Default-pool worker threads carry the parallel pool's name.
    assert!(thread_name.unwrap_or_default().starts_with("magpie-parallel"));
    Ok(())
}

#[test]
fn serial_default_pool_preserves_fifo() -> Result<()> {
    let _scope = AsyncScope::new()?;

    let order = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = mpsc::channel();
    for index in 0..10_usize {
        let order = order.clone();
        let done = done_tx.clone();
        runtime::put_work_item(
            WorkerSelector::Serial,
            Arc::new(move |_: &AsyncResult| {
                order.lock().unwrap().push(index);
                let _ = done.send(());
            }),
            None,
        )?;
    }
    for _ in 0..10 {
        done_rx.recv_timeout(Duration::from_secs(5))?;
    }

    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn global_lifecycle_is_refcounted() -> Result<()> {
    runtime::startup()?;
    runtime::lock_ref()?; // second reference

    let (tx, rx) = mpsc::channel();
    let result = AsyncResult::from_fn(move |_| {
        let _ = tx.send(());
    });
    runtime::invoke_callback(&result)?;
    rx.recv_timeout(Duration::from_secs(5))?;

    runtime::unlock_ref();
    // One reference remains; the default pools must still accept work.
    let (tx, rx) = mpsc::channel();
    let result = AsyncResult::from_fn(move |_| {
        let _ = tx.send(());
    });
    runtime::invoke_callback(&result)?;
    rx.recv_timeout(Duration::from_secs(5))?;

    runtime::shutdown();
    Ok(())
}

#[test]
fn created_worker_reports_its_identity() -> Result<()> {
    let handle = runtime::create_worker(true, ThreadLimit::Fixed(3), Some("identity-pool"))?;
    assert_eq!(handle.name(), Some("identity-pool"));
    assert_eq!(handle.max_threads(), ThreadLimit::Fixed(3));
    assert_eq!(handle.current_threads(), 1);
    runtime::destroy_worker(handle);
    Ok(())
}

#[test]
fn serial_worker_forces_one_thread_but_reports_the_request() -> Result<()> {
    let handle = runtime::create_worker(false, ThreadLimit::Fixed(8), Some("forced-serial"))?;
    // The handle reports the requested limit even though the pool was
    // forced serial.
    assert_eq!(handle.max_threads(), ThreadLimit::Fixed(8));

    let (done_tx, done_rx) = mpsc::channel();
    for _ in 0..5 {
        let done = done_tx.clone();
        runtime::put_work_item_ex(
            WorkerSelector::Worker(&handle),
            &AsyncResult::from_fn(move |_| {
                let _ = done.send(());
            }),
        )?;
    }
    for _ in 0..5 {
        done_rx.recv_timeout(Duration::from_secs(5))?;
    }
    assert_eq!(handle.current_threads(), 1);

    runtime::destroy_worker(handle);
    Ok(())
}

#[test]
fn worker_handles_are_refcounted() -> Result<()> {
    let first = runtime::create_worker(true, ThreadLimit::Fixed(2), Some("refcounted"))?;
    let second = first.clone();

    runtime::destroy_worker(first);

    // The pool survives while a reference remains.
    let (tx, rx) = mpsc::channel();
    runtime::put_work_item_ex(
        WorkerSelector::Worker(&second),
        &AsyncResult::from_fn(move |_| {
            let _ = tx.send(());
        }),
    )?;
    rx.recv_timeout(Duration::from_secs(5))?;

    runtime::destroy_worker(second);
    Ok(())
}

#[test]
fn one_character_names_are_placeholders() -> Result<()> {
    let handle = runtime::create_worker(true, ThreadLimit::Auto, Some("x"))?;
    // The placeholder is still reported on the handle; it is only dropped
    // from worker-thread naming.
    assert_eq!(handle.name(), Some("x"));
    runtime::destroy_worker(handle);

    let anonymous = runtime::create_worker(true, ThreadLimit::Auto, None)?;
    assert_eq!(anonymous.name(), None);
    runtime::destroy_worker(anonymous);
    Ok(())
}

#[test]
fn put_work_item_carries_the_state_payload() -> Result<()> {
    let _scope = AsyncScope::new()?;

    let (tx, rx) = mpsc::channel();
    runtime::put_work_item(
        WorkerSelector::Parallel,
        Arc::new(move |result: &AsyncResult| {
            let state = result.state().unwrap();
            let value = magpie::downcast_object::<&'static str>(&state).copied();
            let _ = tx.send(value);
        }),
        Some(magpie::object_ref("payload")),
    )?;

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5))?,
        Some("payload")
    );
    Ok(())
}
