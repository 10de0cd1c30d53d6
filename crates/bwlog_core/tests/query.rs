//! Filters, context, cursors and live tailing.

use bwlog_core::{
    Address, CoreError, Direction, MatchTarget, QueryItem, QueryParams, QueryResult,
};
use bwlog_core::format::MAX_FIELD;
use bwlog_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ten_entries() -> TestLogRoot {
    let mut root = TestLogRoot::new();
    for i in 0..10 {
        root.advance(100);
        root.log(1000, "line %d", ArgsBuilder::new().int(i).build());
    }
    root
}

fn collect(root: &TestLogRoot, params: QueryParams) -> Vec<String> {
    root.reader()
        .query(params)
        .unwrap()
        .map(|item| match item.unwrap() {
            QueryItem::Match(r) => format!("+{}", r.message),
            QueryItem::Context(r) => format!(" {}", r.message),
            QueryItem::Separator => "--".to_string(),
        })
        .collect()
}

fn matches(root: &TestLogRoot, params: QueryParams) -> Vec<QueryResult> {
    root.reader()
        .query(params)
        .unwrap()
        .matches()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn header_filters() {
    let mut root = TestLogRoot::new();
    let other = Address::new(0x0a00_0002, 20000);
    root.send(&MessageBuilder::new(1000, "a").priority(1).build());
    root.send(&MessageBuilder::new(1000, "b").priority(4).pid(200).build());
    root.send(&MessageBuilder::new(1000, "c").address(other).component("baseapp").build());

    let texts = |params| -> Vec<String> {
        matches(&root, params).into_iter().map(|r| r.message).collect()
    };
    assert_eq!(texts(QueryParams::new(1000).priorities(1 << 4)), vec!["b"]);
    assert_eq!(texts(QueryParams::new(1000).pid(200)), vec!["b"]);
    assert_eq!(texts(QueryParams::new(1000).host("host2")), vec!["c"]);
    assert_eq!(texts(QueryParams::new(1000).host("10.0.0.1")), vec!["a", "b"]);
    assert_eq!(texts(QueryParams::new(1000).process_types(1 << 1)), vec!["c"]);

    let c = &matches(&root, QueryParams::new(1000).pid(100))[1];
    assert_eq!(c.host, "host2");
    assert_eq!(c.component, "baseapp");
    assert_eq!(c.username, "user1000");
}

#[test]
fn app_id_filter_follows_patches() {
    let mut root = TestLogRoot::new();
    root.log(1000, "before", vec![]);
    assert!(root
        .writer()
        .set_app_instance_id(&TEST_ADDRESS, 5)
        .unwrap());

    let found = matches(&root, QueryParams::new(1000).app_id(5));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].app_id, 5);
    assert!(matches(&root, QueryParams::new(1000).app_id(6)).is_empty());
}

#[test]
fn pattern_targets() {
    let mut root = TestLogRoot::new();
    root.log(1000, "user %s joined", ArgsBuilder::new().string("ann").build());
    root.log(1000, "user %s left", ArgsBuilder::new().string("bob").build());

    let on_message = QueryParams::new(1000).include("ann");
    assert_eq!(matches(&root, on_message).len(), 1);

    let on_format = QueryParams::new(1000)
        .include("ann")
        .match_target(MatchTarget::FormatString);
    assert!(matches(&root, on_format).is_empty());

    let excluded = QueryParams::new(1000)
        .exclude("left$")
        .match_target(MatchTarget::FormatString);
    let found = matches(&root, excluded);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "user ann joined");
}

#[test]
fn bad_parameters_fail_before_scanning() {
    let root = ten_entries();
    let reader = root.reader();
    assert!(matches!(
        reader.query(QueryParams::new(1000).include("[")),
        Err(CoreError::InvalidRegex(_))
    ));
    assert!(matches!(
        reader.query(QueryParams::new(1000).host("nowhere")),
        Err(CoreError::UnknownHost { .. })
    ));
}

#[test]
fn context_lines_and_separators() {
    let root = ten_entries();
    let params = QueryParams::new(1000).include("line [28]$").context_lines(1);
    assert_eq!(
        collect(&root, params),
        vec![" line 1", "+line 2", " line 3", "--", " line 7", "+line 8", " line 9"]
    );

    // Overlapping windows merge without a separator
    let params = QueryParams::new(1000).include("line [46]$").context_lines(1);
    assert_eq!(
        collect(&root, params),
        vec![" line 3", "+line 4", " line 5", "+line 6", " line 7"]
    );

    let params = QueryParams::new(1000)
        .include("line [28]$")
        .context_lines(1)
        .direction(Direction::Backwards);
    assert_eq!(
        collect(&root, params),
        vec![" line 9", "+line 8", " line 7", "--", " line 3", "+line 2", " line 1"]
    );
}

#[test]
fn context_stops_at_range_edges() {
    let root = ten_entries();
    let params = QueryParams::new(1000).include("line [09]$").context_lines(2);
    assert_eq!(
        collect(&root, params),
        vec!["+line 0", " line 1", " line 2", "--", " line 7", " line 8", "+line 9"]
    );
}

#[test]
fn tell_and_seek_resume_in_a_new_query() {
    let root = ten_entries();
    let reader = root.reader();

    let mut query = reader.query(QueryParams::new(1000)).unwrap();
    for _ in 0..4 {
        query.next().unwrap().unwrap();
    }
    let cursor = query.tell().unwrap();
    let rest: Vec<_> = query.matches().map(|r| r.unwrap().message).collect();

    let mut again = reader.query(QueryParams::new(1000)).unwrap();
    again.seek(&cursor, false).unwrap();
    let resumed: Vec<_> = again.matches().map(|r| r.unwrap().message).collect();
    assert_eq!(resumed, rest);
    assert_eq!(resumed.first().map(String::as_str), Some("line 4"));

    let mut skip = reader.query(QueryParams::new(1000)).unwrap();
    skip.seek(&cursor, true).unwrap();
    assert_eq!(skip.matches().next().unwrap().unwrap().message, "line 5");
}

#[test]
fn progress_and_step() {
    let root = ten_entries();
    let mut query = root.reader().query(QueryParams::new(1000)).unwrap();
    assert!(query.progress().abs() < 1e-9);
    for _ in 0..5 {
        query.next().unwrap().unwrap();
    }
    assert!((query.progress() - 0.5).abs() < 1e-9);

    assert!(query.step(false));
    let item = query.next().unwrap().unwrap();
    assert_eq!(item.result().unwrap().message, "line 4");
}

#[test]
fn live_tail_picks_up_new_entries() {
    let mut root = ten_entries();
    let reader = root.reader();
    let mut query = reader.query(QueryParams::new(1000)).unwrap();
    assert_eq!(query.by_ref().count(), 10);

    root.advance(100);
    root.log(1000, "line %d", ArgsBuilder::new().int(10).build());
    root.writer().roll().unwrap();
    root.advance(2000);
    root.log(1000, "line %d", ArgsBuilder::new().int(11).build());

    query.resume().unwrap();
    let more: Vec<_> = query
        .by_ref()
        .map(|item| item.unwrap().result().unwrap().message.clone())
        .collect();
    assert_eq!(more, vec!["line 10", "line 11"]);

    query.resume().unwrap();
    assert!(query.next().is_none());
}

#[test]
fn live_tail_starting_empty() {
    let mut root = TestLogRoot::new();
    root.log(1000, "old", vec![]);
    let start = root.now().add_millis(1);

    let reader = root.reader();
    let mut query = reader.query(QueryParams::new(1000).start_time(start)).unwrap();
    assert!(query.next().is_none());

    root.advance(5);
    root.log(1000, "new", vec![]);
    query.resume().unwrap();
    assert_eq!(query.next().unwrap().unwrap().result().unwrap().message, "new");
}

#[test]
fn timeout_callback_aborts_and_scan_continues() {
    let root = ten_entries();
    let mut query = root.reader().query(QueryParams::new(1000).include("9")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    query.set_timeout_callback(3, move || seen.fetch_add(1, Ordering::SeqCst) > 0);

    assert!(matches!(query.next(), Some(Err(CoreError::QueryAborted))));
    let found: Vec<_> = query.matches().map(|r| r.unwrap().message).collect();
    assert_eq!(found, vec!["line 9"]);
    assert!(calls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn exhausted_query_ends_without_calling_timeout() {
    let root = ten_entries();
    let mut query = root.reader().query(QueryParams::new(1000).include("nothing")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    query.set_timeout_callback(11, move || {
        seen.fetch_add(1, Ordering::SeqCst);
        false
    });

    assert!(query.next().is_none());
    assert_eq!(query.scanned(), 10);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn aborted_entry_is_examined_on_the_next_call() {
    let root = ten_entries();
    let mut query = root.reader().query(QueryParams::new(1000)).unwrap();
    query.set_timeout_callback(1, || false);

    assert!(matches!(query.next(), Some(Err(CoreError::QueryAborted))));
    assert_eq!(query.tell().unwrap().entry, 0);
    let first = query.next().unwrap().unwrap();
    assert_eq!(first.result().unwrap().message, "line 0");
}

#[test]
fn corrupt_entry_is_reported_and_skipped() {
    let root = ten_entries();
    let log = root.reader().user_log(1000).unwrap();
    let suffix = log.segment(0).unwrap().suffix().to_string();
    let entries = root.path().join("user1000").join(format!("entries.{suffix}"));

    // Point entry 3 at a format string offset that does not exist
    let mut data = std::fs::read(&entries).unwrap();
    let entry = 3 * 25;
    data[entry + 15..entry + 19].copy_from_slice(&0xFFFF_u32.to_le_bytes());
    std::fs::write(&entries, data).unwrap();

    let items: Vec<_> = root.reader().query(QueryParams::new(1000)).unwrap().collect();
    assert_eq!(items.len(), 10);
    assert!(matches!(items[3], Err(CoreError::CatalogCorruption { .. })));
    assert_eq!(items.iter().filter(|i| i.is_ok()).count(), 9);
}

#[test]
fn oversized_width_and_precision_render_clamped() {
    let mut root = TestLogRoot::new();
    root.log(1000, "%.70000f", ArgsBuilder::new().double(1.0).build());
    root.advance(1);
    root.log(1000, "%.*e", ArgsBuilder::new().int(i32::MAX).double(2.5).build());
    root.advance(1);
    root.log(1000, "%*d", ArgsBuilder::new().int(200_000_000).int(7).build());

    let lengths: Vec<_> = matches(&root, QueryParams::new(1000))
        .iter()
        .map(|r| r.message.len())
        .collect();
    assert_eq!(lengths, vec![2 + MAX_FIELD, MAX_FIELD + "2.e+00".len(), MAX_FIELD]);
}
