mod common;

use common::{ready, Sidecar, TEST_DATE};
use serde_json::json;

fn seed(s: &mut Sidecar) {
    let asha = s.add_student("Asha", "5", &["Maths"]);
    let bilal = s.add_student("Bilal", "5", &["Maths"]);
    let dev = s.add_student("Dev", "2", &["English"]);
    s.add_student("Esha", "2", &["English"]);
    s.add_student("Farah", "8", &["Maths"]);

    s.ok(
        "marks.reconcile",
        json!({
            "standard": "5",
            "subject": "Maths",
            "testDate": TEST_DATE,
            "totalMarks": 20,
            "input": { (asha): { "score": 8 }, (bilal): { "absent": true } },
        }),
    );
    s.ok(
        "marks.reconcile",
        json!({
            "standard": "2",
            "subject": "English",
            "testDate": TEST_DATE,
            "totalMarks": 10,
            "input": { (dev): { "score": 9.5 } },
        }),
    );
}

#[test]
fn by_date_returns_raw_records_for_the_date_only() {
    let mut s = ready("marksd-reports-bydate");
    seed(&mut s);

    let records = s.ok("reports.byDate", json!({ "testDate": TEST_DATE }));
    assert_eq!(records["tests"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(records["marks"].as_array().map(|a| a.len()), Some(3));
    // Standard 8 has no test that day.
    assert_eq!(records["students"].as_array().map(|a| a.len()), Some(4));

    let other = s.ok("reports.byDate", json!({ "testDate": "2026-03-15" }));
    assert_eq!(other["tests"], json!([]));
    assert_eq!(other["students"], json!([]));

    assert_eq!(s.err_code("reports.byDate", json!({})), "bad_params");
}

#[test]
fn class_wise_groups_by_standard_with_three_display_forms() {
    let mut s = ready("marksd-reports-classwise");
    seed(&mut s);

    let result = s.ok("reports.classWise", json!({ "testDate": TEST_DATE }));
    assert_eq!(result["standards"], json!(["2", "5"]));

    let two = result["report"]["2"].as_array().expect("class 2");
    let shown: Vec<&str> = two.iter().filter_map(|r| r["marks"].as_str()).collect();
    assert_eq!(shown, vec!["9.5 / 10", "-"]);
    assert_eq!(two[0]["subject"], "English");

    let five = result["report"]["5"].as_array().expect("class 5");
    let shown: Vec<&str> = five.iter().filter_map(|r| r["marks"].as_str()).collect();
    assert_eq!(shown, vec!["8 / 20", "ABSENT"]);
    assert!(five[1]["markId"].is_string());
    assert!(two[1]["markId"].is_null());
}

#[test]
fn pdf_model_lays_out_one_section_per_class() {
    let mut s = ready("marksd-reports-pdf");
    seed(&mut s);

    let model = s.ok(
        "reports.classWisePdfModel",
        json!({
            "testDate": TEST_DATE,
            "headingPrefix": "इयत्ता",
            "headingFont": {
                "family": "NotoSansDevanagari",
                "source": "fonts/NotoSansDevanagari-Regular.ttf",
                "script": "Devanagari",
            },
        }),
    );
    assert_eq!(model["sectionCount"], 2);
    let doc = &model["document"];
    assert_eq!(doc["fileName"], "Class_Wise_Report.pdf");
    assert_eq!(doc["columns"], json!(["Student", "Subject", "Marks"]));
    assert_eq!(doc["fonts"][0]["family"], "NotoSansDevanagari");

    let sections = doc["pages"][0]["sections"].as_array().expect("sections");
    assert_eq!(sections[0]["heading"], "इयत्ता 2");
    assert_eq!(sections[1]["heading"], "इयत्ता 5");
    assert_eq!(sections[1]["rows"][1]["marks"], "ABSENT");
    assert_eq!(sections[0]["headingFont"], "NotoSansDevanagari");

    let plain = s.ok("reports.classWisePdfModel", json!({ "testDate": TEST_DATE }));
    assert_eq!(plain["document"]["pages"][0]["sections"][0]["heading"], "Class 2");

    assert_eq!(
        s.err_code(
            "reports.classWisePdfModel",
            json!({ "testDate": TEST_DATE, "headingFont": { "family": 3 } })
        ),
        "bad_params"
    );
}

#[test]
fn test_preview_covers_the_tests_roster() {
    let mut s = ready("marksd-reports-preview");
    seed(&mut s);

    let found = s.ok(
        "tests.find",
        json!({ "standard": "5", "subject": "Maths", "testDate": TEST_DATE }),
    );
    let test_id = found["test"]["id"].as_str().expect("test id").to_string();

    let preview = s.ok("reports.testPreview", json!({ "testId": test_id }));
    assert_eq!(preview["standards"], json!(["5"]));
    let rows = preview["report"]["5"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["marks"], "8 / 20");

    assert_eq!(
        s.err_code("reports.testPreview", json!({ "testId": "missing" })),
        "not_found"
    );
}
