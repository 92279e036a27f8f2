use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar(workspace: Option<&Path>) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_mcqd");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("RUST_LOG")
        .env_remove("MCQD_WORKSPACE");
    if let Some(ws) = workspace {
        cmd.env("MCQD_WORKSPACE", ws);
    }
    let mut child = cmd.spawn().expect("spawn mcqd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{value}");
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn result_xml(rows: &[(&str, &str, &str, &str, i64, i64)]) -> String {
    let mut out = String::from("<mcq-test-results>\n");
    for (first, last, student, test, available, obtained) in rows {
        out.push_str(&format!(
            "  <mcq-test-result>\n    <first-name>{first}</first-name>\n    <last-name>{last}</last-name>\n    <student-number>{student}</student-number>\n    <test-id>{test}</test-id>\n    <summary-marks available=\"{available}\" obtained=\"{obtained}\" />\n  </mcq-test-result>\n"
        ));
    }
    out.push_str("</mcq-test-results>\n");
    out
}

#[test]
fn single_record_import_then_aggregate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "results.import",
        json!({ "xml": result_xml(&[("John", "Doe", "123", "1", 100, 80)]) }),
    );
    assert_eq!(imported["message"], "Records upserted successfully");
    assert_eq!(imported["processedRecords"], 1);

    let agg = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.aggregate",
        json!({ "testId": 1 }),
    );
    let rows = agg.as_array().expect("aggregate is a list");
    assert_eq!(rows.len(), 1);
    let s = &rows[0];
    assert_eq!(s["mean"], 80.0);
    assert_eq!(s["stddev"], 0.0);
    assert_eq!(s["min"], 80.0);
    assert_eq!(s["max"], 80.0);
    assert_eq!(s["p25"], 80.0);
    assert_eq!(s["p50"], 80.0);
    assert_eq!(s["p75"], 80.0);
    assert_eq!(s["count"], 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn two_results_give_spread_and_quartiles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));

    let xml = result_xml(&[
        ("John", "Doe", "123", "1", 100, 80),
        ("Jane", "Roe", "456", "1", 100, 90),
    ]);
    let imported = request_ok(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": xml }));
    assert_eq!(imported["processedRecords"], 2);

    let agg = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.aggregate",
        json!({ "testId": "1" }),
    );
    let s = &agg[0];
    assert_eq!(s["mean"], 85.0);
    assert_eq!(s["stddev"], 7.1);
    assert_eq!(s["min"], 80.0);
    assert_eq!(s["max"], 90.0);
    assert_eq!(s["p25"], 77.5);
    assert_eq!(s["p50"], 85.0);
    assert_eq!(s["p75"], 92.5);
    assert_eq!(s["count"], 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn large_identifiers_round_trip_without_precision_loss() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));

    let big_student = "123456789000000000";
    let huge_test = "99999999999999999999999999";
    let xml = result_xml(&[
        ("Bob", "Smith", big_student, "1", 100, 80),
        ("Bob", "Smith", "456", huge_test, 50, 40),
    ]);
    let imported = request_ok(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": xml }));
    assert_eq!(imported["processedRecords"], 2);

    let agg = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.aggregate",
        json!({ "testId": huge_test }),
    );
    assert_eq!(agg[0]["mean"], 80.0);
    assert_eq!(agg[0]["count"], 1);

    // Leading zeros name the same test.
    let padded = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "results.aggregate",
        json!({ "testId": format!("000{huge_test}") }),
    );
    assert_eq!(padded, agg);

    drop(stdin);
    let _ = child.wait();

    let conn = Connection::open(dir.path().join("mcq.sqlite3")).expect("open db");
    let stored: String = conn
        .query_row(
            "SELECT student_number FROM students WHERE first_name = 'Bob' AND student_number <> '456'",
            [],
            |r| r.get(0),
        )
        .expect("stored student");
    assert_eq!(stored, big_student);
}

#[test]
fn lower_resubmission_keeps_the_higher_mark_across_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));
        let xml = result_xml(&[("John", "Doe", "123", "1", 100, 80)]);
        request_ok(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": xml }));
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));
    let xml = result_xml(&[("Johnny", "Doe", "123", "1", 90, 70)]);
    let imported = request_ok(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": xml }));
    assert_eq!(imported["processedRecords"], 1);

    let agg = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.aggregate",
        json!({ "testId": 1 }),
    );
    assert_eq!(agg[0]["mean"], 80.0);
    assert_eq!(agg[0]["max"], 80.0);

    drop(stdin);
    let _ = child.wait();

    let conn = Connection::open(dir.path().join("mcq.sqlite3")).expect("open db");
    let (first, available): (String, i64) = conn
        .query_row(
            "SELECT s.first_name, t.marks_available FROM students s, tests t
             WHERE s.student_number = '123' AND t.test_id = '1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("stored rows");
    assert_eq!(first, "Johnny");
    assert_eq!(available, 100);
}

#[test]
fn reimporting_a_batch_leaves_statistics_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));

    let xml = result_xml(&[
        ("A", "One", "1", "7", 20, 13),
        ("B", "Two", "2", "7", 20, 17),
        ("C", "Three", "3", "7", 20, 9),
    ]);
    request_ok(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": xml.clone() }));
    let before = request_ok(&mut stdin, &mut reader, "2", "results.aggregate", json!({ "testId": 7 }));
    request_ok(&mut stdin, &mut reader, "3", "results.import", json!({ "xml": xml }));
    let after = request_ok(&mut stdin, &mut reader, "4", "results.aggregate", json!({ "testId": 7 }));
    assert_eq!(before, after);
    assert_eq!(after[0]["count"], 3);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_reads_batch_from_file_and_accepts_empty_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let batch = dir.path().join("batch.xml");
    std::fs::write(&batch, result_xml(&[("A", "B", "5", "3", 10, 6)])).expect("write batch");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path().join("ws").as_path()));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "results.import",
        json!({ "xmlPath": batch.to_string_lossy() }),
    );
    assert_eq!(imported["processedRecords"], 1);

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "results.import",
        json!({ "xml": "<mcq-test-results></mcq-test-results>" }),
    );
    assert_eq!(empty["processedRecords"], 0);

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "results.import",
        json!({ "xmlPath": dir.path().join("nope.xml").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "read_failed");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn rejected_batches_report_why() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(Some(dir.path()));

    let no_data = request(&mut stdin, &mut reader, "1", "results.import", json!({ "xml": "  " }));
    assert_eq!(error_code(&no_data), "no_data");
    assert_eq!(no_data["error"]["message"], "No data received to import");

    let bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "results.import",
        json!({ "xml": "<invalid-xml>" }),
    );
    assert_eq!(error_code(&bad), "xml_parse_failed");
    assert_eq!(bad["error"]["message"], "Failed to parse XML");

    let mut incomplete = result_xml(&[("A", "B", "1", "2", 10, 5)]);
    incomplete = incomplete.replace("<test-id>2</test-id>", "");
    let malformed = request(
        &mut stdin,
        &mut reader,
        "3",
        "results.import",
        json!({ "xml": incomplete }),
    );
    assert_eq!(error_code(&malformed), "malformed_input");
    assert!(malformed["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("test-id"));

    let wrong_type = request(&mut stdin, &mut reader, "4", "results.import", json!({ "xml": 5 }));
    assert_eq!(error_code(&wrong_type), "bad_params");

    // Nothing from the rejected batches reached the store.
    let agg = request(&mut stdin, &mut reader, "5", "results.aggregate", json!({ "testId": 2 }));
    assert_eq!(error_code(&agg), "test_not_found");

    drop(stdin);
    let _ = child.wait();
}
