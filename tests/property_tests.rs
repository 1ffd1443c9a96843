//! Property-based tests for stream ordering and cell deduplication

use enact::{use_value, Channel, Runtime};
use proptest::prelude::*;

fn drain<T: 'static>(runtime: &Runtime, mut cursor: enact::Cursor<T>) -> Vec<T> {
    runtime
        .block_on(move |_| async move {
            let mut seen = Vec::new();
            while let Some(v) = cursor.next().await? {
                seen.push(v);
            }
            Ok(seen)
        })
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every cursor sees exactly what was sent after it subscribed, in order.
    #[test]
    fn cursors_see_sends_in_order(
        values in prop::collection::vec(any::<i16>(), 0..40),
        join_at in 0usize..40,
    ) {
        let runtime = Runtime::new();
        let channel = Channel::new();
        let early = channel.subscribe();
        let join_at = join_at.min(values.len());
        let mut late = None;
        for (i, v) in values.iter().enumerate() {
            if i == join_at {
                late = Some(channel.subscribe());
            }
            channel.send(*v);
        }
        let late = late.unwrap_or_else(|| channel.subscribe());
        channel.close();

        prop_assert_eq!(drain(&runtime, early), values.clone());
        prop_assert_eq!(drain(&runtime, late), values[join_at..].to_vec());
    }

    /// A follower of a cell sees the initial value, then each accepted write.
    #[test]
    fn cell_follower_sees_deduplicated_writes(
        writes in prop::collection::vec(0u8..3, 0..30),
    ) {
        let runtime = Runtime::new();
        let cell = use_value(0u8);
        let follower = cell.subscribe();
        let mut expected = vec![0u8];
        for w in writes {
            if cell.set(w) {
                expected.push(w);
            }
        }
        cell.close();

        let seen = drain(&runtime, follower);
        prop_assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
        prop_assert_eq!(seen, expected);
    }
}
