mod common;

use common::Sidecar;
use serde_json::json;

fn session_params(date: &str, student: &str) -> serde_json::Value {
    json!({
        "className": "6ème A",
        "subject": "Mathématiques",
        "date": date,
        "studentId": student
    })
}

fn with(mut base: serde_json::Value, key: &str, value: serde_json::Value) -> serde_json::Value {
    base[key] = value;
    base
}

#[test]
fn present_and_justified_are_mutually_exclusive() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");
    let base = session_params("2024-01-22", &alice);

    let r = sc.ok("attendance.setJustified", with(base.clone(), "justified", json!(true)));
    assert_eq!(r["row"]["present"], json!(false));
    assert_eq!(r["row"]["justified"], json!(true));

    let r = sc.ok("attendance.setPresent", with(base.clone(), "present", json!(true)));
    assert_eq!(r["row"]["present"], json!(true));
    assert_eq!(r["row"]["justified"], json!(false));

    // unjustifying a present record keeps it present
    let r = sc.ok("attendance.setJustified", with(base.clone(), "justified", json!(false)));
    assert_eq!(r["row"]["present"], json!(true));

    let r = sc.ok("attendance.setPresent", with(base.clone(), "present", json!(false)));
    assert_eq!(r["row"]["present"], json!(false));
    assert_eq!(r["row"]["justified"], json!(false));
    assert_eq!(r["row"]["status"], json!("absent_unjustified"));

    let r = sc.ok(
        "attendance.setComment",
        with(base.clone(), "comment", json!("Retard transport")),
    );
    assert_eq!(r["row"]["comment"], json!("Retard transport"));
    assert_eq!(r["row"]["present"], json!(false));

    assert_eq!(
        sc.err_code("attendance.setPresent", with(base, "present", json!("yes"))),
        "bad_params"
    );
}

#[test]
fn session_tally_covers_whole_class() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");
    let bob = sc.create_student("Baptiste Martin", "6ème A");
    let _clara = sc.create_student("Clara Bernard", "6ème A");
    let other = sc.create_student("David Petit", "5ème A");

    sc.ok(
        "attendance.setJustified",
        with(session_params("2024-01-22", &alice), "justified", json!(true)),
    );
    sc.ok(
        "attendance.setPresent",
        with(session_params("2024-01-22", &bob), "present", json!(false)),
    );
    assert_eq!(
        sc.err_code(
            "attendance.setPresent",
            with(session_params("2024-01-22", &other), "present", json!(false))
        ),
        "bad_params"
    );

    let open = sc.ok(
        "attendance.open",
        json!({
            "className": "6ème A",
            "subject": "Mathématiques",
            "date": "2024-01-22",
            "search": "clara"
        }),
    );
    assert_eq!(open["rows"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(open["rows"][0]["present"], json!(true));
    let tally = &open["tally"];
    assert_eq!(tally["total"], json!(3));
    assert_eq!(tally["present"], json!(1));
    assert_eq!(tally["absentJustified"], json!(1));
    assert_eq!(tally["absentUnjustified"], json!(1));
    assert_eq!(open["attendanceRate"], json!(33.33));

    let fresh = sc.ok(
        "attendance.open",
        json!({ "className": "6ème A", "subject": "Mathématiques", "date": "2024-01-23" }),
    );
    assert_eq!(fresh["tally"]["present"], json!(3));
}

#[test]
fn student_history_filters_by_date_and_subject() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");

    let absent = |date: &str, subject: &str| {
        json!({
            "className": "6ème A",
            "subject": subject,
            "date": date,
            "studentId": alice,
            "present": false
        })
    };
    sc.ok("attendance.setPresent", absent("2023-10-10", "Mathématiques"));
    sc.ok("attendance.setPresent", absent("2023-11-12", "Français"));
    sc.ok("attendance.setPresent", absent("2024-01-15", "Mathématiques"));
    sc.ok(
        "attendance.setJustified",
        with(session_params("2024-01-15", &alice), "justified", json!(true)),
    );
    sc.ok(
        "attendance.setPresent",
        with(session_params("2024-01-16", &alice), "present", json!(true)),
    );

    let all = sc.ok("attendance.student", json!({ "studentId": alice }));
    let absences = all["absences"].as_array().expect("absences");
    assert_eq!(absences.len(), 3);
    assert_eq!(absences[0]["date"], json!("2024-01-15"));
    assert_eq!(absences[0]["justified"], json!(true));
    assert_eq!(all["tally"]["total"], json!(4));
    assert_eq!(all["tally"]["absentUnjustified"], json!(2));

    let term1 = sc.ok(
        "attendance.student",
        json!({ "studentId": alice, "from": "2023-09-01", "to": "2023-12-31" }),
    );
    assert_eq!(term1["absences"].as_array().map(|a| a.len()), Some(2));

    let maths = sc.ok(
        "attendance.student",
        json!({ "studentId": alice, "subject": "Mathématiques" }),
    );
    assert_eq!(maths["tally"]["total"], json!(3));
    assert_eq!(maths["tally"]["absentJustified"], json!(1));
}
