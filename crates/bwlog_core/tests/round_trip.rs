//! Whatever is written renders back exactly.

use bwlog_core::QueryParams;
use bwlog_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn written_messages_render_back(
        batch in prop::collection::vec(
            (message_strategy(), priority_strategy(), time_step_strategy()),
            1..12,
        )
    ) {
        let mut root = TestLogRoot::new();
        for (message, priority, step) in &batch {
            root.advance(*step);
            root.send(
                &MessageBuilder::new(1000, &message.format)
                    .args(message.args.clone())
                    .priority(*priority)
                    .build(),
            );
        }

        let found: Vec<_> = root
            .reader()
            .query(QueryParams::new(1000))
            .unwrap()
            .matches()
            .map(|r| r.unwrap())
            .collect();
        prop_assert_eq!(found.len(), batch.len());
        for (result, (message, priority, _)) in found.iter().zip(&batch) {
            prop_assert_eq!(&result.message, &message.expected);
            prop_assert_eq!(result.priority, *priority);
        }
    }
}
