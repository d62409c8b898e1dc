//! End-to-end scans over an in-memory store: predicate literals, sidecar
//! pruning, concurrency disciplines, catalog resolution and resumption.

use std::{io::Write, sync::Arc};

use flate2::write::GzEncoder;
use granary::{
    blobs_from, CatalogConfig, ConcurrentScanner, Cursor, Discipline, IndexWriterPool,
    MemoryStore, PartitionCatalog, Predicate, Record, ScanOption, Value,
};

fn jsonl(rows: &[serde_json::Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for row in rows {
        out.extend_from_slice(row.to_string().as_bytes());
        out.push(b'\n');
    }
    out
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Six wizards; exactly two are eleven.
fn wizard_rows() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({"name": "harry", "age": 11}),
        serde_json::json!({"name": "hermione", "age": 11}),
        serde_json::json!({"name": "ron", "age": 12}),
        serde_json::json!({"name": "ginny", "age": 10}),
        serde_json::json!({"name": "dumbledore", "age": 150}),
        serde_json::json!({"name": "snape", "age": 38}),
    ]
}

fn wizard_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert("day/wizards.jsonl", jsonl(&wizard_rows()));
    store
}

fn scan_serial(store: Arc<MemoryStore>, predicate: Predicate, blobs: Vec<String>) -> Vec<Record> {
    let scanner = ConcurrentScanner::new(store, Some(predicate), ScanOption::default());
    let (records, report) = scanner.scan(blobs, Discipline::Serial).collect();
    assert!(report.is_complete());
    records
}

#[test]
fn equality_literal_selects_exactly_the_matching_rows() {
    let literal = serde_json::json!([["age", "==", 11]]);
    let predicate = Predicate::from_literal(&literal).unwrap();
    let records = scan_serial(wizard_store(), predicate, vec!["day/wizards.jsonl".into()]);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.value_or_null("age"), Value::Int(11));
    }
}

#[test]
fn two_branch_disjunction_literal_selects_both_names() {
    let literal = serde_json::json!([
        [["name", "==", "harry"]],
        [["name", "==", "hermione"]],
    ]);
    let predicate = Predicate::from_literal(&literal).unwrap();
    let records = scan_serial(wizard_store(), predicate, vec!["day/wizards.jsonl".into()]);
    let names: Vec<Value> = records.iter().map(|r| r.value_or_null("name")).collect();
    assert_eq!(names, vec![Value::from("harry"), Value::from("hermione")]);
}

#[test]
fn like_matches_december_dates_in_iso_text() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "day/events.jsonl",
        jsonl(&[
            serde_json::json!({"id": 1, "when": "2023-12-05"}),
            serde_json::json!({"id": 2, "when": "2023-11-30"}),
            serde_json::json!({"id": 3, "when": "2024-12-31"}),
            serde_json::json!({"id": 4, "when": "2024-01-12"}),
        ]),
    );
    let predicate = Predicate::parse("when LIKE \"%-12-%\"").unwrap();
    let records = scan_serial(store, predicate, vec!["day/events.jsonl".into()]);
    let ids: Vec<Value> = records.iter().map(|r| r.value_or_null("id")).collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn indexed_scan_agrees_with_unindexed_scan() {
    let usernames = ["BBCNews", "Reuters", "AP", "AFP", "DPA"];
    let rows: Vec<serde_json::Value> = (0..50)
        .map(|i| {
            serde_json::json!({
                "username": usernames[(i * 7) % usernames.len()],
                "seq": i,
            })
        })
        .collect();
    let body = jsonl(&rows);

    let plain = Arc::new(MemoryStore::new());
    plain.insert("feed/posts.jsonl", body.clone());

    let indexed = Arc::new(MemoryStore::new());
    indexed.insert("feed/posts.jsonl", body);
    let pool = IndexWriterPool::new(["username"]);
    for (row, json) in rows.iter().enumerate() {
        let record = Record::from_pairs([(
            "username",
            Value::from(json["username"].as_str().unwrap()),
        )]);
        pool.observe(row as u32, &record);
    }
    for (name, bytes) in pool.finish("feed/posts.jsonl") {
        indexed.insert(name, bytes);
    }

    let predicate = Predicate::parse("username = 'BBCNews'").unwrap();
    let blobs = vec!["feed/posts.jsonl".to_string()];
    let expected = scan_serial(plain, predicate.clone(), blobs.clone());
    let pruned = scan_serial(indexed, predicate, blobs);
    assert_eq!(expected.len(), 10);
    assert_eq!(pruned, expected);
}

#[test]
fn corrupted_blob_is_isolated_from_healthy_blobs() {
    let store = Arc::new(MemoryStore::new());
    let rows: Vec<serde_json::Value> = (0..25)
        .map(|i| serde_json::json!({"seq": i}))
        .collect();
    store.insert("day/part-0.jsonl", jsonl(&rows));
    store.insert("day/part-1.jsonl", b"\xff\xfe not a record\n".to_vec());

    let scanner = ConcurrentScanner::new(store, None, ScanOption::default());
    let (records, report) = scanner
        .scan(
            vec!["day/part-0.jsonl".into(), "day/part-1.jsonl".into()],
            Discipline::Threaded { workers: 4 },
        )
        .collect();
    assert_eq!(records.len(), 25);
    assert_eq!(report.blobs_total, 2);
    assert_eq!(report.blobs_scanned, 1);
    assert_eq!(report.blobs_skipped, 1);
    assert!(!report.timed_out);
}

#[test]
fn gzip_blobs_decode_like_their_plain_siblings() {
    let body = jsonl(&wizard_rows());
    let store = Arc::new(MemoryStore::new());
    store.insert("day/wizards.jsonl.gz", gzip(&body));
    let predicate = Predicate::parse("age >= 12").unwrap();
    let records = scan_serial(store, predicate, vec!["day/wizards.jsonl.gz".into()]);
    assert_eq!(records.len(), 3);
}

#[test]
fn columnar_blobs_decode_as_a_unit() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "day/wizards.jsonc",
        serde_json::json!({
            "name": ["harry", "hermione", "ron"],
            "age": [11, 11, 12],
        })
        .to_string()
        .into_bytes(),
    );
    let predicate = Predicate::parse("age = 11").unwrap();
    let records = scan_serial(store, predicate, vec!["day/wizards.jsonc".into()]);
    assert_eq!(records.len(), 2);
}

#[test]
fn projection_keeps_only_requested_columns() {
    let scanner = ConcurrentScanner::new(
        wizard_store(),
        Some(Predicate::parse("age = 11").unwrap()),
        ScanOption::default().projection(["name", "house"]),
    );
    let (records, _) = scanner
        .scan(vec!["day/wizards.jsonl".into()], Discipline::Serial)
        .collect();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.len(), 2);
        assert!(record.get("age").is_none());
        // Absent columns project to the null marker rather than vanishing.
        assert_eq!(record.value_or_null("house"), Value::Null);
    }
}

#[test]
fn catalog_resolution_feeds_a_resumable_scan() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "data/2024-01-01/a.jsonl",
        jsonl(&[serde_json::json!({"seq": 0}), serde_json::json!({"seq": 1})]),
    );
    store.insert(
        "data/2024-01-01/b.jsonl",
        jsonl(&[serde_json::json!({"seq": 2})]),
    );
    store.insert(
        "data/2024-01-02/c.jsonl",
        jsonl(&[serde_json::json!({"seq": 3})]),
    );

    let catalog = PartitionCatalog::new(store.clone(), CatalogConfig::new("data/{date}"));
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let partitions = catalog.resolve(start, end).unwrap();
    assert_eq!(partitions.len(), 2);

    let scanner = ConcurrentScanner::new(store, None, ScanOption::default());
    let all = blobs_from(&partitions, None);
    let (records, _) = scanner.scan(all, Discipline::Serial).collect();
    assert_eq!(records.len(), 4);

    // Resume after the first blob of the first partition.
    let cursor = partitions[0].cursor_at(1);
    let json = cursor.to_json();
    let restored = Cursor::from_json(&json).unwrap();
    let resumed = blobs_from(&partitions, Some(restored));
    assert_eq!(
        resumed,
        vec![
            "data/2024-01-01/b.jsonl".to_string(),
            "data/2024-01-02/c.jsonl".to_string(),
        ]
    );
}

#[test]
fn pushdown_never_changes_results() {
    let rows: Vec<serde_json::Value> = (0..40)
        .map(|i| {
            serde_json::json!({
                "kind": if i % 3 == 0 { "alpha" } else { "beta" },
                "size": i,
                "tags": [format!("t{}", i % 4)],
                "note": if i % 5 == 0 {
                    serde_json::Value::from("flagged")
                } else {
                    serde_json::Value::Null
                },
                "msg": "hello world",
            })
        })
        .collect();
    let body = jsonl(&rows);

    let expressions = [
        "kind = 'alpha'",
        "kind = 'alpha' AND size >= 20",
        "kind IN ('alpha', 'beta') AND size < 5",
        "tags CONTAINS 't1'",
        "kind = 'alpha' OR tags CONTAINS 't2'",
        // Null rows never reach a sidecar; these must not be pruned by one.
        "note = NULL",
        "kind = 'alpha' AND note = NULL",
        "kind IN ('alpha', NULL)",
        // Scalars contain nothing, indexed or not.
        "msg CONTAINS 'world'",
    ];
    for expression in expressions {
        let predicate = Predicate::parse(expression).unwrap();

        let plain = Arc::new(MemoryStore::new());
        plain.insert("d/part.jsonl", body.clone());

        let indexed = Arc::new(MemoryStore::new());
        indexed.insert("d/part.jsonl", body.clone());
        let pool = IndexWriterPool::new(["kind", "tags", "note", "msg"]);
        for (row, json) in rows.iter().enumerate() {
            let record = Record::from_json_object(json.as_object().unwrap());
            pool.observe(row as u32, &record);
        }
        for (name, bytes) in pool.finish("d/part.jsonl") {
            indexed.insert(name, bytes);
        }

        let blobs = vec!["d/part.jsonl".to_string()];
        let expected = scan_serial(plain, predicate.clone(), blobs.clone());
        let pruned = scan_serial(indexed, predicate, blobs);
        assert_eq!(pruned, expected, "pushdown diverged for '{expression}'");
    }
}
