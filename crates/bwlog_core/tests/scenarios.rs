//! End-to-end scenarios: a writer fills a root, a reader queries it.

use bwlog_core::query::QueryBound;
use bwlog_core::{Config, Direction, LogRootReader, LogTime, QueryParams};
use bwlog_testkit::prelude::*;

fn messages(root: &TestLogRoot, params: QueryParams) -> Vec<String> {
    root.reader()
        .query(params)
        .unwrap()
        .matches()
        .map(|r| r.unwrap().message)
        .collect()
}

#[test]
fn forward_and_backward_over_half_open_range() {
    let mut root = TestLogRoot::new();
    for (word, millis) in [("a", 10_000), ("b", 10_500), ("c", 11_000)] {
        root.clock.set(LogTime::new(0, 0).add_millis(millis));
        root.log(1000, "hello %s", ArgsBuilder::new().string(word).build());
    }

    let start = LogTime::new(10, 200);
    assert_eq!(
        messages(&root, QueryParams::new(1000).start_time(start)),
        vec!["hello b", "hello c"]
    );
    assert_eq!(
        messages(
            &root,
            QueryParams::new(1000)
                .start_time(start)
                .direction(Direction::Backwards)
        ),
        vec!["hello c", "hello b"]
    );
    assert_eq!(
        messages(
            &root,
            QueryParams::new(1000)
                .start_time(start)
                .end_time(LogTime::new(11, 0))
        ),
        vec!["hello b"]
    );
}

#[test]
fn segment_rolls_once_budget_is_exceeded() {
    // 25 byte entry plus a 2 byte packed string
    let mut root = TestLogRoot::with_config(Config::default().max_segment_size(100));
    let args = || ArgsBuilder::new().string("x").build();

    let mut addresses = Vec::new();
    for _ in 0..6 {
        root.advance(1000);
        addresses.push(root.log(1000, "%s", args()).address);
    }

    let first = &addresses[0].suffix;
    assert!(addresses[..4].iter().all(|a| &a.suffix == first));
    assert_ne!(&addresses[4].suffix, first);
    assert_eq!(addresses[4].index, 0);
    assert_eq!(addresses[5].index, 1);

    let log = root.reader().user_log(1000).unwrap();
    assert_eq!(log.segment_count(), 2);
    assert_eq!(log.segment(0).unwrap().num_entries(), 4);
    assert_eq!(log.segment(0).unwrap().suffix(), first);
}

#[test]
fn writer_restart_keeps_catalogs_and_components() {
    let mut root = TestLogRoot::new();
    let first = root.log(1000, "value %d", ArgsBuilder::new().int(1).build());
    let strings_len = std::fs::metadata(root.path().join("strings")).unwrap().len();

    root.close_writer();
    assert!(!root.path().join("pid").exists());

    root.advance(1000);
    let second = root.log(1000, "value %d", ArgsBuilder::new().int(2).build());
    assert_eq!(
        std::fs::metadata(root.path().join("strings")).unwrap().len(),
        strings_len
    );
    assert_ne!(first.address.suffix, second.address.suffix);

    let reader = root.reader();
    let log = reader.user_log(1000).unwrap();
    // Same sender, same component
    assert_eq!(log.components().len(), 1);
    assert_eq!(
        messages(&root, QueryParams::new(1000)),
        vec!["value 1", "value 2"]
    );
}

#[test]
fn users_are_kept_apart() {
    let mut root = TestLogRoot::new();
    root.log(1000, "for 1000", vec![]);
    root.log(0, "for root", vec![]);

    let reader = root.reader();
    let users: Vec<_> = reader.users().map(|u| (u.uid, u.username.clone())).collect();
    assert_eq!(
        users,
        vec![(0, "root".to_string()), (1000, "user1000".to_string())]
    );
    assert_eq!(messages(&root, QueryParams::new(0)), vec!["for root"]);
    assert!(matches!(
        reader.query(QueryParams::new(7)),
        Err(bwlog_core::CoreError::UnknownUser { uid: 7 })
    ));
}

#[test]
fn catalogs_are_enumerable() {
    let mut root = TestLogRoot::new();
    root.log(1000, "one", vec![]);
    root.send(
        &MessageBuilder::new(1000, "two %d")
            .args(ArgsBuilder::new().int(2).build())
            .component("baseapp")
            .build(),
    );
    root.log(1000, "one", vec![]);

    let reader = root.reader();
    let formats: Vec<_> = reader.format_strings().into_iter().map(|(_, t)| t).collect();
    assert_eq!(formats, vec!["one", "two %d"]);
    let names: Vec<_> = reader.component_names().into_iter().map(|(_, n)| n).collect();
    assert_eq!(names, vec!["cellapp", "baseapp"]);
    let hosts = reader.hostnames();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].1, "host1");
}

#[test]
fn address_bounds_select_exact_entries() {
    let mut root = TestLogRoot::new();
    let mut addresses = Vec::new();
    for i in 0..5 {
        root.advance(10);
        addresses.push(root.log(1000, "n=%d", ArgsBuilder::new().int(i).build()).address);
    }

    let params = QueryParams::new(1000)
        .start_address(addresses[1].clone())
        .end_address(addresses[3].clone());
    assert_eq!(messages(&root, params), vec!["n=1", "n=2", "n=3"]);

    let mut params = QueryParams::new(1000);
    params.start = QueryBound::Address(addresses[3].clone());
    params.end = QueryBound::Address(addresses[1].clone());
    assert_eq!(messages(&root, params), vec!["n=3", "n=2", "n=1"]);
}

#[test]
fn reader_accepts_the_version_on_disk() {
    let mut root = TestLogRoot::with_config(Config::default().format_version(2));
    root.log(1000, "v2 root", Vec::new());

    let reader = root.reader();
    assert_eq!(reader.version(), 2);
    assert_eq!(messages(&root, QueryParams::new(1000)), vec!["v2 root"]);

    assert!(LogRootReader::open_expecting(root.path(), 2).is_ok());
    assert!(matches!(
        LogRootReader::open_expecting(root.path(), 1),
        Err(bwlog_core::CoreError::InvalidFormat { .. })
    ));
}
