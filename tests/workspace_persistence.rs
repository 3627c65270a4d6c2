mod common;

use common::{temp_dir, Sidecar};
use serde_json::json;

fn seed(sc: &mut Sidecar) -> String {
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");
    for (component, value) in [("homework1", 15), ("homework2", 16), ("exam", 17)] {
        sc.ok(
            "grades.set",
            json!({
                "subject": "Mathématiques",
                "term": "Trimestre 1",
                "studentId": alice,
                "component": component,
                "value": value
            }),
        );
    }
    sc.ok(
        "chapters.create",
        json!({
            "title": "Les nombres entiers",
            "subject": "Mathématiques",
            "className": "6ème A",
            "plannedStartDate": "2023-09-05",
            "plannedEndDate": "2023-09-25"
        }),
    );
    alice
}

fn assert_seeded(sc: &mut Sidecar, alice: &str) {
    let students = sc.ok("students.list", json!({}));
    assert_eq!(students["students"][0]["id"], json!(alice));
    let report = sc.ok("grades.student", json!({ "studentId": alice }));
    assert_eq!(report["overallAverage"], json!(16.4));
    let chapters = sc.ok("chapters.list", json!({}));
    assert_eq!(chapters["chapters"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn workspace_data_survives_restart() {
    let workspace = temp_dir("schoold-persist");
    let alice = {
        let mut sc = Sidecar::spawn();
        sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        seed(&mut sc)
    };
    assert!(workspace.join("schoold.sqlite3").is_file());

    let mut sc = Sidecar::spawn_with_workspace(Some(&workspace));
    let health = sc.ok("health", json!({}));
    assert_eq!(health["store"], json!("sqlite"));
    assert_eq!(health["workspacePath"], json!(workspace.to_string_lossy()));
    assert_eq!(health["sessionOpen"], json!(false));

    sc.login_admin();
    assert_seeded(&mut sc, &alice);

    // a second select of the same workspace keeps the existing admin
    let again = sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    assert_eq!(again["bootstrapAdmin"], json!(null));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn backup_bundle_restores_into_another_workspace() {
    let source = temp_dir("schoold-bundle-src");
    let target = temp_dir("schoold-bundle-dst");
    let bundle = source.join("exports").join("school.zip");

    let mut sc = Sidecar::spawn();
    sc.login_admin();
    assert_eq!(
        sc.err_code(
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle.to_string_lossy() })
        ),
        "no_workspace"
    );

    sc.ok("workspace.select", json!({ "path": source.to_string_lossy() }));
    let alice = seed(&mut sc);
    let export = sc.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], json!("schoold-workspace-v1"));
    assert_eq!(export["entryCount"], json!(3));

    assert_eq!(
        sc.err_code(
            "backup.importWorkspaceBundle",
            json!({ "inPath": source.join("missing.zip").to_string_lossy() })
        ),
        "not_found"
    );

    let imported = sc.ok(
        "backup.importWorkspaceBundle",
        json!({
            "inPath": bundle.to_string_lossy(),
            "workspacePath": target.to_string_lossy()
        }),
    );
    assert_eq!(imported["bundleFormatDetected"], json!("schoold-workspace-v1"));
    assert_eq!(imported["workspacePath"], json!(target.to_string_lossy()));

    // switching workspaces ends the session
    assert_eq!(sc.ok("session.current", json!({}))["user"], json!(null));
    sc.login_admin();
    assert_seeded(&mut sc, &alice);

    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(target);
}

#[test]
fn failed_import_keeps_the_current_workspace() {
    let workspace = temp_dir("schoold-import-fail");
    let mut sc = Sidecar::spawn();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let alice = seed(&mut sc);
    let before = sc.ok("session.current", json!({}));

    let bogus = workspace.join("bogus.zip");
    let mut bytes = vec![0x50, 0x4B, 0x03, 0x04];
    bytes.extend_from_slice(b"not really a zip");
    std::fs::write(&bogus, bytes).expect("write bogus bundle");

    assert_eq!(
        sc.err_code(
            "backup.importWorkspaceBundle",
            json!({ "inPath": bogus.to_string_lossy() })
        ),
        "backup_failed"
    );
    let health = sc.ok("health", json!({}));
    assert_eq!(health["store"], json!("sqlite"));
    let after = sc.ok("session.current", json!({}));
    assert_eq!(after["user"], before["user"]);
    assert_eq!(after["openedAt"], before["openedAt"]);
    assert_seeded(&mut sc, &alice);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn importing_a_text_file_changes_nothing() {
    let workspace = temp_dir("schoold-import-notes");
    let db_file = workspace.join("schoold.sqlite3");
    let alice = {
        let mut sc = Sidecar::spawn();
        sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
        let alice = seed(&mut sc);
        let before = std::fs::read(&db_file).expect("read db");

        let notes = workspace.join("notes.txt");
        std::fs::write(&notes, "réunion parents-professeurs jeudi\n").expect("write notes");
        assert_eq!(
            sc.err_code(
                "backup.importWorkspaceBundle",
                json!({ "inPath": notes.to_string_lossy() })
            ),
            "backup_failed"
        );

        let health = sc.ok("health", json!({}));
        assert_eq!(health["store"], json!("sqlite"));
        assert_eq!(health["workspacePath"], json!(workspace.to_string_lossy()));
        assert_eq!(
            sc.ok("session.current", json!({}))["user"]["email"],
            json!("admin@school.local")
        );
        assert_seeded(&mut sc, &alice);
        assert_eq!(std::fs::read(&db_file).expect("read db"), before);
        assert!(!workspace.join("schoold.sqlite3.importing").exists());
        alice
    };

    let mut sc = Sidecar::spawn_with_workspace(Some(&workspace));
    sc.login_admin();
    assert_seeded(&mut sc, &alice);

    let _ = std::fs::remove_dir_all(workspace);
}
