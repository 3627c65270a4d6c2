mod common;

use common::{temp_dir, Sidecar};
use serde_json::json;

#[test]
fn setup_defaults_and_updates_persist_in_workspace() {
    let workspace = temp_dir("schoold-setup-admin");
    {
        let mut sc = Sidecar::spawn_with_workspace(Some(&workspace));
        sc.login_admin();

        let initial = sc.ok("setup.get", json!({}));
        assert_eq!(initial["grading"]["passMark"], json!(10.0));
        assert_eq!(initial["grading"]["showRank"], json!(true));
        assert_eq!(
            initial["school"]["terms"],
            json!(["Trimestre 1", "Trimestre 2", "Trimestre 3"])
        );

        let school = sc.ok(
            "setup.update",
            json!({
                "section": "school",
                "patch": {
                    "name": "  Collège Jean Moulin ",
                    "classes": ["6ème A", "6ème A", "5ème B"],
                    "subjects": ["Mathématiques", "Français"]
                }
            }),
        );
        assert_eq!(school["section"], json!("school"));
        assert_eq!(school["value"]["name"], json!("Collège Jean Moulin"));
        assert_eq!(school["value"]["classes"], json!(["6ème A", "5ème B"]));

        sc.ok(
            "setup.update",
            json!({ "section": "grading", "patch": { "passMark": 12, "showRank": false } }),
        );
    }

    let mut sc = Sidecar::spawn_with_workspace(Some(&workspace));
    sc.login_admin();
    let after = sc.ok("setup.get", json!({}));
    assert_eq!(after["grading"]["passMark"], json!(12.0));
    assert_eq!(after["grading"]["showRank"], json!(false));
    assert_eq!(after["school"]["subjects"], json!(["Mathématiques", "Français"]));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn setup_rejects_invalid_patches() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();

    let invalid = [
        json!({ "section": "grading", "patch": { "passMark": 25 } }),
        json!({ "section": "grading", "patch": { "showRank": "yes" } }),
        json!({ "section": "grading", "patch": { "roundTo": 1 } }),
        json!({ "section": "school", "patch": { "terms": [] } }),
        json!({ "section": "school", "patch": { "classes": ["6ème A", "  "] } }),
        json!({
            "section": "school",
            "patch": { "termDates": { "Trimestre 1": { "from": "2023-12-22", "to": "2023-09-04" } } }
        }),
        json!({
            "section": "school",
            "patch": { "termDates": { "Trimestre 1": { "from": "rentrée", "to": "2023-12-22" } } }
        }),
        json!({ "section": "printing", "patch": {} }),
        json!({ "section": "school" }),
    ];
    for params in invalid {
        assert_eq!(sc.err_code("setup.update", params), "bad_params");
    }

    // rejected patches leave saved values untouched
    let current = sc.ok("setup.get", json!({}));
    assert_eq!(current["grading"]["passMark"], json!(10.0));
}

#[test]
fn configured_school_lists_constrain_requests() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();

    // nothing configured yet: any class or subject goes
    let early = sc.create_student("Hugo Lefèvre", "Terminale Z");

    sc.ok(
        "setup.update",
        json!({
            "section": "school",
            "patch": { "classes": ["6ème A", "5ème B"], "subjects": ["Mathématiques"] }
        }),
    );

    assert_eq!(
        sc.err_code(
            "students.create",
            json!({ "displayName": "Inès Moreau", "className": "4ème C" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "students.update",
            json!({ "studentId": early, "className": "4ème C" })
        ),
        "bad_params"
    );
    // existing rows outside the lists stay editable
    sc.ok(
        "students.update",
        json!({ "studentId": early, "displayName": "Hugo Lefebvre" }),
    );
    let alice = sc.create_student("Alice Dupont", "6ème A");

    assert_eq!(
        sc.err_code(
            "grades.open",
            json!({ "className": "6ème A", "subject": "Mathématiques", "term": "Trimestre 4" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "grades.set",
            json!({
                "subject": "Latin",
                "term": "Trimestre 1",
                "studentId": alice,
                "component": "exam",
                "value": 12
            })
        ),
        "bad_params"
    );
    sc.ok(
        "grades.open",
        json!({ "className": "6ème A", "subject": "Mathématiques", "term": "Trimestre 1" }),
    );

    assert_eq!(
        sc.err_code(
            "attendance.open",
            json!({ "className": "6ème A", "subject": "Latin", "date": "2024-01-22" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "chapters.create",
            json!({
                "title": "Les nombres entiers",
                "subject": "Mathématiques",
                "className": "3ème D",
                "plannedStartDate": "2023-09-05",
                "plannedEndDate": "2023-09-25"
            })
        ),
        "bad_params"
    );
}
