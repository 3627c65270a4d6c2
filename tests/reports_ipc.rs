mod common;

use common::Sidecar;
use serde_json::json;

fn grade(sc: &mut Sidecar, student: &str, subject: &str, marks: [f64; 3]) {
    for (component, value) in ["homework1", "homework2", "exam"].into_iter().zip(marks) {
        sc.ok(
            "grades.set",
            json!({
                "subject": subject,
                "term": "Trimestre 1",
                "studentId": student,
                "component": component,
                "value": value
            }),
        );
    }
}

/// Alice 16.4, Baptiste 8.2 and Clara ungraded, all in 6ème A.
fn seeded_class(sc: &mut Sidecar) -> (String, String, String) {
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");
    let bob = sc.create_student("Baptiste Martin", "6ème A");
    let clara = sc.create_student("Clara Bernard", "6ème A");
    grade(sc, &alice, "Mathématiques", [15.0, 16.0, 17.0]);
    grade(sc, &bob, "Mathématiques", [8.0, 6.0, 9.0]);
    sc.ok(
        "attendance.setPresent",
        json!({
            "className": "6ème A",
            "subject": "Mathématiques",
            "date": "2024-01-22",
            "studentId": bob,
            "present": false
        }),
    );
    (alice, bob, clara)
}

#[test]
fn bulletin_combines_grades_rank_and_attendance() {
    let mut sc = Sidecar::spawn();
    let (alice, bob, clara) = seeded_class(&mut sc);

    let bulletin = sc.ok(
        "reports.bulletin",
        json!({ "studentId": alice, "term": "Trimestre 1" }),
    );
    assert_eq!(bulletin["average"], json!(16.4));
    assert_eq!(bulletin["passed"], json!(true));
    assert_eq!(bulletin["rank"], json!("1/3"));
    assert_eq!(bulletin["subjects"][0]["classAverage"], json!(12.3));
    assert_eq!(bulletin["attendance"]["total"], json!(0));
    assert_eq!(bulletin["teacherComment"], json!(""));

    let weak = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 1" }),
    );
    assert_eq!(weak["passed"], json!(false));
    assert_eq!(weak["rank"], json!("2/3"));
    assert_eq!(weak["attendance"]["absentUnjustified"], json!(1));

    let blank = sc.ok(
        "reports.bulletin",
        json!({ "studentId": clara, "term": "Trimestre 1" }),
    );
    assert_eq!(blank["average"], json!(null));
    assert_eq!(blank["passed"], json!(null));
    assert_eq!(blank["rank"], json!(null));

    let saved = sc.ok(
        "reports.setComments",
        json!({
            "studentId": alice,
            "term": "Trimestre 1",
            "teacherComment": "  Excellent trimestre ",
            "principalComment": "Félicitations"
        }),
    );
    assert_eq!(saved["comments"]["teacherComment"], json!("Excellent trimestre"));
    sc.ok(
        "reports.setComments",
        json!({ "studentId": alice, "term": "Trimestre 1", "principalComment": null }),
    );
    let bulletin = sc.ok(
        "reports.bulletin",
        json!({ "studentId": alice, "term": "Trimestre 1" }),
    );
    assert_eq!(bulletin["teacherComment"], json!("Excellent trimestre"));
    assert_eq!(bulletin["principalComment"], json!(""));
}

#[test]
fn class_bulletins_are_ordered_by_rank() {
    let mut sc = Sidecar::spawn();
    let (alice, bob, clara) = seeded_class(&mut sc);
    sc.ok(
        "reports.setComments",
        json!({ "studentId": bob, "term": "Trimestre 1", "teacherComment": "Doit progresser" }),
    );

    let class = sc.ok(
        "reports.classBulletins",
        json!({ "className": "6ème A", "term": "Trimestre 1" }),
    );
    assert_eq!(class["classSize"], json!(3));
    assert_eq!(class["classAverage"], json!(12.3));
    let rows = class["bulletins"].as_array().expect("bulletins");
    let order: Vec<&serde_json::Value> = rows.iter().map(|r| &r["studentId"]).collect();
    assert_eq!(order, vec![&json!(alice), &json!(bob), &json!(clara)]);
    assert_eq!(rows[1]["absences"], json!(1));
    assert_eq!(rows[1]["hasComments"], json!(true));
    assert_eq!(rows[0]["hasComments"], json!(false));
    assert_eq!(rows[2]["rank"], json!(null));

    let searched = sc.ok(
        "reports.classBulletins",
        json!({ "className": "6ème A", "term": "Trimestre 1", "search": "martin" }),
    );
    assert_eq!(searched["bulletins"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(searched["bulletins"][0]["rank"], json!("2/3"));
}

#[test]
fn rank_can_be_hidden_and_pass_mark_changed() {
    let mut sc = Sidecar::spawn();
    let (_alice, bob, _clara) = seeded_class(&mut sc);
    sc.ok(
        "setup.update",
        json!({ "section": "grading", "patch": { "showRank": false, "passMark": 8.0 } }),
    );

    let bulletin = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 1" }),
    );
    assert_eq!(bulletin["rank"], json!(null));
    assert_eq!(bulletin["passed"], json!(true));
    assert_eq!(bulletin["passMark"], json!(8.0));
}

#[test]
fn statistics_aggregate_the_school() {
    let mut sc = Sidecar::spawn();
    seeded_class(&mut sc);
    let other = sc.create_student("David Petit", "5ème A");
    grade(&mut sc, &other, "Français", [12.0, 12.0, 12.0]);

    let stats = sc.ok("reports.statistics", json!({ "term": "Trimestre 1" }));
    assert_eq!(stats["studentCount"], json!(4));
    assert_eq!(stats["usersByRole"]["admin"], json!(1));
    assert_eq!(stats["usersByRole"]["student"], json!(0));
    assert_eq!(stats["passRate"], json!(66.67));
    assert_eq!(stats["attendanceRate"], json!(0.0));
    assert_eq!(stats["chapterProgress"]["total"], json!(0));

    let classes = stats["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0]["className"], json!("5ème A"));
    assert_eq!(classes[0]["average"], json!(12.0));
    assert_eq!(classes[0]["attendanceRate"], json!(100.0));
    assert_eq!(classes[1]["average"], json!(12.3));
    assert_eq!(classes[1]["passRate"], json!(50.0));
    assert_eq!(classes[1]["absences"], json!(1));

    let later = sc.ok("reports.statistics", json!({ "term": "Trimestre 2" }));
    assert_eq!(later["average"], json!(null));
    assert_eq!(later["passRate"], json!(null));
}

#[test]
fn term_dates_scope_bulletin_attendance() {
    let mut sc = Sidecar::spawn();
    let (_alice, bob, _clara) = seeded_class(&mut sc);
    sc.ok(
        "attendance.setPresent",
        json!({
            "className": "6ème A",
            "subject": "Mathématiques",
            "date": "2023-10-05",
            "studentId": bob,
            "present": false
        }),
    );

    // without configured dates every absence counts toward each term
    let unscoped = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 1" }),
    );
    assert_eq!(unscoped["attendance"]["absentUnjustified"], json!(2));
    assert_eq!(unscoped["attendancePeriod"], json!(null));

    sc.ok(
        "setup.update",
        json!({
            "section": "school",
            "patch": {
                "termDates": {
                    "Trimestre 1": { "from": "2023-09-04", "to": "2023-12-22" },
                    "Trimestre 2": { "from": "2024-01-08", "to": "2024-03-29" }
                }
            }
        }),
    );

    let first = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 1" }),
    );
    assert_eq!(first["attendance"]["absentUnjustified"], json!(1));
    assert_eq!(
        first["attendancePeriod"],
        json!({ "from": "2023-09-04", "to": "2023-12-22" })
    );

    let second = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 2" }),
    );
    assert_eq!(second["attendance"]["absentUnjustified"], json!(1));
    assert_eq!(second["average"], json!(null));

    let third = sc.ok(
        "reports.bulletin",
        json!({ "studentId": bob, "term": "Trimestre 3" }),
    );
    assert_eq!(third["attendance"]["absentUnjustified"], json!(2));

    let class = sc.ok(
        "reports.classBulletins",
        json!({ "className": "6ème A", "term": "Trimestre 1" }),
    );
    let row = class["bulletins"]
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["studentId"] == json!(bob)))
        .expect("bob's row");
    assert_eq!(row["absences"], json!(1));

    assert_eq!(
        sc.err_code(
            "reports.bulletin",
            json!({ "studentId": bob, "term": "Trimestre 4" })
        ),
        "bad_params"
    );
}
