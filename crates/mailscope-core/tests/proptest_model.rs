use chrono::{DateTime, TimeZone, Utc};
use mailscope_core::fingerprint::fingerprint;
use mailscope_core::model::{MessageFilter, chronological, format_message_id, sort_chronological};
use mailscope_core::Message;
use proptest::prelude::*;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid ts")
}

fn arb_messages() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((0..40u32, 0..3u8, 0..600i64), 0..30).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, from, secs)| {
                Message::new(format!("m{id:02}"), format!("a{from}"), "ops", at(secs), "x")
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn fingerprint_ignores_input_order(mut messages in arb_messages()) {
        let before = fingerprint(&messages);
        messages.reverse();
        prop_assert_eq!(fingerprint(&messages), before);
    }

    #[test]
    fn sorting_is_chronological(mut messages in arb_messages()) {
        sort_chronological(&mut messages);
        for pair in messages.windows(2) {
            prop_assert!(chronological(&pair[0], &pair[1]).is_le());
        }
    }

    #[test]
    fn limit_keeps_the_most_recent(messages in arb_messages(), limit in 1usize..10) {
        let filter = MessageFilter { limit, ..MessageFilter::default() };
        let selected = filter.apply(&messages);
        prop_assert_eq!(selected.len(), messages.len().min(limit));

        let mut all = messages.clone();
        sort_chronological(&mut all);
        prop_assert_eq!(&selected[..], &all[all.len() - selected.len()..]);
    }

    #[test]
    fn bounds_are_inclusive(messages in arb_messages(), lo in 0i64..300, span in 0i64..300) {
        let filter = MessageFilter {
            since: Some(at(lo)),
            until: Some(at(lo + span)),
            limit: 0,
        };
        for msg in filter.apply(&messages) {
            prop_assert!(msg.time >= at(lo) && msg.time <= at(lo + span));
        }
        let expected = messages.iter().filter(|m| filter.admits(m.time)).count();
        prop_assert_eq!(filter.apply(&messages).len(), expected);
    }

    #[test]
    fn message_ids_sort_in_time_order(
        a in 0i64..1_000_000,
        b in 0i64..1_000_000,
        seq in 0u32..9_999
    ) {
        let (ta, tb) = (at(a), at(b));
        let (ia, ib) = (format_message_id(ta, seq), format_message_id(tb, seq));
        prop_assert_eq!(ta.cmp(&tb), ia.cmp(&ib));
    }
}
