//! Integration tests for Enact

use enact::{compute, render, use_value, Component, Error, Runtime, RuntimeConfig};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Set `RUST_LOG=enact=debug` to see the task tree while a test runs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn value_integration() {
    let count = use_value(0);
    let cursor = count.changes();

    // Equal writes are dropped
    count.set(1);
    count.set(1);
    assert_eq!(cursor.pending(), 1);

    // Test update
    count.update(|n| n + 10);
    assert_eq!(count.current(), 11);
    assert_eq!(cursor.pending(), 2);
}

#[test]
fn is_current_resolves_without_suspending() {
    let flag = use_value(true);
    assert_eq!(flag.is(true).now_or_never(), Some(true));
}

#[test]
fn is_resolves_when_set_after_waiting() {
    let runtime = Runtime::new();
    let stage = use_value("loading");
    let writer = stage.clone();
    let result = runtime.block_on(move |cx| async move {
        let waiter = cx.spawn(move |_| stage.is("done").map(Ok));
        cx.yield_now().await;
        writer.set("rendering");
        writer.set("done");
        writer.close();
        waiter.await
    });
    assert_eq!(result, Ok(true));
}

#[test]
fn consumer_observes_initial_then_update() {
    let runtime = Runtime::new();
    let cell = use_value(0);
    let source = cell.clone();
    let scope = runtime.create_scope();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);

    scope.run(move |_| async move {
        let mut cursor = source.subscribe();
        while let Some(v) = cursor.next().await? {
            log.borrow_mut().push(v);
        }
        Ok(())
    });
    runtime.run_until_stalled();
    cell.set(1);
    runtime.run_until_stalled();

    assert_eq!(*seen.borrow(), [0, 1]);
    scope.destroy();
}

#[test]
fn computed_first_value_is_value_at_subscription() {
    let runtime = Runtime::new();
    let cell = use_value(String::from("a"));
    let source = cell.clone();
    let upper = compute(move |_, emit| {
        let mut cursor = source.subscribe();
        async move {
            while let Some(s) = cursor.next().await? {
                emit.emit(s.to_uppercase());
            }
            Ok(())
        }
    });

    let result = runtime.block_on(move |cx| async move {
        let subscribing = upper.subscribe(&cx);
        let mut cursor = subscribing.await?;
        cell.set("b".to_string());
        Ok((cursor.next().await?, cursor.next().await?))
    });
    assert_eq!(
        result,
        Ok((Some("A".to_string()), Some("B".to_string())))
    );
}

#[test]
fn cancelling_scope_during_acquisition_releases_once() {
    let runtime = Runtime::new();
    let released = Rc::new(Cell::new(0));
    let counter = Rc::clone(&released);
    let scope = runtime.create_scope();

    scope.run(move |cx| async move {
        let _handle: u32 = cx
            .resource(move |cx, provide| async move {
                cx.ensure(move || counter.set(counter.get() + 1));
                cx.yield_now().await;
                cx.suspend().await?;
                provide.provide(1).await
            })
            .await?;
        Ok(())
    });
    runtime.run_until_stalled();
    scope.destroy();
    runtime.run_until_stalled();
    scope.destroy();

    assert_eq!(released.get(), 1);
    assert_eq!(runtime.frame_count(), 0);
}

#[test]
fn producer_error_after_two_values() {
    init_tracing();
    let runtime = Runtime::new();
    let readings = compute(|cx, emit| async move {
        emit.emit(1);
        cx.yield_now().await;
        emit.emit(2);
        cx.yield_now().await;
        Err::<(), _>(Error::msg("sensor disconnected"))
    });
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);

    let result: Result<(), Error> = runtime.block_on(move |cx| async move {
        let mut cursor = readings.subscribe(&cx).await?;
        while let Some(v) = cursor.next().await? {
            log.borrow_mut().push(v);
        }
        Ok(())
    });

    assert_eq!(*seen.borrow(), [1, 2]);
    assert_eq!(result.unwrap_err().to_string(), "sensor disconnected");
}

#[test]
fn unmount_while_suspended_on_stream() {
    init_tracing();
    let runtime = Runtime::new();
    let cell = use_value(0);
    let source = cell.clone();
    let resumed = Rc::new(Cell::new(0));
    let released = Rc::new(Cell::new(0));
    let (resumed_in, released_in) = (Rc::clone(&resumed), Rc::clone(&released));

    let view: Component<(), String> = Component::new(move |cx, ()| {
        let source = source.clone();
        let resumed = Rc::clone(&resumed_in);
        let released = Rc::clone(&released_in);
        async move {
            cx.spawn_named("reader", move |cx| async move {
                cx.ensure(move || released.set(released.get() + 1));
                let mut cursor = source.changes();
                while cursor.next().await?.is_some() {
                    resumed.set(resumed.get() + 1);
                }
                Ok(())
            });
            render(&cx, "waiting".to_string())?;
            cx.suspend().await
        }
    });

    let mount = view.mount(&runtime, ());
    runtime.run_until_stalled();
    assert_eq!(mount.content().as_deref(), Some("waiting"));

    mount.unmount();
    assert_eq!(released.get(), 1);
    cell.set(1);
    runtime.run_until_stalled();
    assert_eq!(resumed.get(), 0);
    assert_eq!(runtime.frame_count(), 0);
}

#[test]
fn root_crash_renders_diagnostic() {
    init_tracing();
    let runtime = Runtime::new();
    let app: Component<(), String> =
        Component::new(|_, ()| async { Err(Error::msg("boom")) }).named("app");
    let mount = app.mount(&runtime, ());
    runtime.run_until_stalled();

    let content = mount.content().unwrap();
    assert!(content.contains("boom"));
    let crash = mount.crash().unwrap();
    assert!(!crash.trace().is_empty());
    assert!(crash.trace().contains("app"));
}

#[test]
fn value_component_follows_changes() {
    let runtime = Runtime::new();
    let temperature = use_value(20);
    let view: Component<(), String> = temperature.component();
    let mount = view.mount(&runtime, ());
    let history = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&history);
    let _watch = mount.on_change(move |content| log.borrow_mut().push(content.clone()));

    runtime.run_until_stalled();
    temperature.set(21);
    temperature.set(21);
    runtime.run_until_stalled();
    temperature.set(19);
    runtime.run_until_stalled();

    assert_eq!(*history.borrow(), ["20", "21", "19"]);
}

#[test]
fn computed_component_inside_parent_mount() {
    let runtime = Runtime::new();
    let ticks = compute(|cx, emit| async move {
        for n in 1..=3 {
            emit.emit(n);
            cx.yield_now().await;
        }
        Ok(())
    })
    .named("ticks");

    let outer: Component<(), String> = Component::new(move |cx, ()| {
        let inner = ticks.component::<String>();
        async move {
            let nested = inner.mount_within(&cx, ())?;
            while !nested.is_finished() {
                cx.yield_now().await;
            }
            render(&cx, format!("last: {}", nested.content().unwrap_or_default()))
        }
    });

    let mount = outer.mount(&runtime, ());
    runtime.run_until_stalled();
    assert_eq!(mount.content().as_deref(), Some("last: 3"));
}

#[test]
fn panicking_body_becomes_crash() {
    let runtime = Runtime::with_config(RuntimeConfig::default().with_name("panics"));
    let app: Component<(), String> = Component::new(|_, ()| async {
        if true {
            panic!("wires crossed");
        }
        Ok(())
    });
    let mount = app.mount(&runtime, ());
    runtime.run_until_stalled();
    assert!(mount.content().unwrap().contains("wires crossed"));
}

#[test]
fn block_on_stall_timeout() {
    let runtime =
        Runtime::with_config(RuntimeConfig::default().with_stall_timeout(Duration::from_millis(10)));
    let never = use_value(false);
    let result = runtime.block_on(move |_| never.is(true).map(Ok));
    assert_eq!(result, Err(Error::Stalled));
}
