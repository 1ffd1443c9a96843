//! Counter application: a reactive value rendered through a mounted component

use enact::{compute, render, use_value, Component, Error, Runtime};

fn main() {
    println!("=== Counter Application ===\n");

    let runtime = Runtime::new();

    // The counter state and a component that shows it
    println!("1. Mounting the counter view");
    let count = use_value(0);
    let view: Component<(), String> = count.component().named("counter");
    let mount = view.mount(&runtime, ());
    let _log = mount.on_change(|content| println!("   [Render] {}", content));
    runtime.run_until_stalled();
    println!("   Showing: {:?}", mount.content());

    // Each click writes the next value; the view follows
    println!("\n2. Clicking the button three times");
    for _ in 0..3 {
        count.update(|n| n + 1);
        runtime.run_until_stalled();
    }
    println!("   Showing: {:?} after {} renders", mount.content(), mount.version());

    // Writing the same value again does not re-render
    println!("\n3. Setting the count to its current value");
    let changed = count.set(count.current());
    runtime.run_until_stalled();
    println!("   Changed: {}, renders: {}", changed, mount.version());

    // A derived stream mounted next to the counter
    println!("\n4. Mounting a parity view computed from the counter");
    let source = count.clone();
    let parity = compute(move |_, emit| {
        let mut cursor = source.subscribe();
        async move {
            while let Some(n) = cursor.next().await? {
                emit.emit(if n % 2 == 0 { "even" } else { "odd" });
            }
            Ok(())
        }
    })
    .named("parity");
    let parity_view: Component<(), String> = parity.component();
    let parity_mount = parity_view.mount(&runtime, ());
    runtime.run_until_stalled();
    println!("   Parity: {:?}", parity_mount.content());
    count.update(|n| n + 1);
    runtime.run_until_stalled();
    println!("   Count: {:?}, parity: {:?}", mount.content(), parity_mount.content());

    // A failing component renders a diagnostic instead of crashing the host
    println!("\n5. Mounting a component that fails");
    let broken: Component<(), String> = Component::new(|cx, ()| async move {
        render(&cx, "loading".to_string())?;
        cx.yield_now().await;
        Err(Error::msg("counter service unavailable"))
    })
    .named("broken");
    let broken_mount = broken.mount(&runtime, ());
    runtime.run_until_stalled();
    if let Some(crash) = broken_mount.crash() {
        println!("   Crash: {}", crash.message());
    }

    // Unmounting releases every task the views started
    println!("\n6. Unmounting");
    mount.unmount();
    parity_mount.unmount();
    broken_mount.unmount();
    println!("   Live frames: {}", runtime.frame_count());

    println!("\n=== Counter Application Complete ===");
}
