mod common;

use common::Sidecar;
use serde_json::json;

fn professor(sc: &mut Sidecar, name: &str, email: &str) -> String {
    sc.create_user(json!({
        "name": name,
        "email": email,
        "role": "professor",
        "classes": ["6ème A", "5ème B"],
        "subjects": ["Mathématiques"]
    }))
}

fn add_entry(
    sc: &mut Sidecar,
    day: &str,
    slot: &str,
    class_name: &str,
    teacher: &str,
    room: &str,
) -> String {
    let created = sc.ok(
        "schedule.create",
        json!({
            "day": day,
            "slot": slot,
            "className": class_name,
            "subject": "Mathématiques",
            "teacherId": teacher,
            "room": room
        }),
    );
    created
        .pointer("/entry/id")
        .and_then(|v| v.as_str())
        .expect("entry id")
        .to_string()
}

#[test]
fn timetable_is_listed_by_day_and_slot() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let jean = professor(&mut sc, "Jean Martin", "jean@school.local");

    add_entry(&mut sc, "tuesday", "10:00-12:00", "6ème A", &jean, "Salle 101");
    add_entry(&mut sc, "monday", "14:00-16:00", "6ème A", &jean, "Salle 101");
    add_entry(&mut sc, "monday", "08:00-10:00", "5ème B", &jean, "Salle 102");

    let listed = sc.ok("schedule.list", json!({}));
    let entries = listed["entries"].as_array().expect("entries");
    let order: Vec<(&str, &str)> = entries
        .iter()
        .map(|e| (e["day"].as_str().unwrap_or(""), e["slot"].as_str().unwrap_or("")))
        .collect();
    assert_eq!(
        order,
        vec![
            ("monday", "08:00-10:00"),
            ("monday", "14:00-16:00"),
            ("tuesday", "10:00-12:00"),
        ]
    );
    assert_eq!(entries[0]["dayLabel"], json!("Lundi"));
    assert_eq!(entries[0]["teacherName"], json!("Jean Martin"));
    assert_eq!(listed["days"].as_array().map(Vec::len), Some(5));

    let class_only = sc.ok("schedule.list", json!({ "className": "6ème A" }));
    assert_eq!(class_only["entries"].as_array().map(Vec::len), Some(2));
    let mondays = sc.ok("schedule.list", json!({ "day": "Lundi" }));
    assert_eq!(mondays["entries"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        sc.err_code("schedule.list", json!({ "day": "saturday" })),
        "bad_params"
    );
}

#[test]
fn overlapping_sessions_are_rejected() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let jean = professor(&mut sc, "Jean Martin", "jean@school.local");
    let marie = professor(&mut sc, "Marie Curie", "marie@school.local");
    let first = add_entry(&mut sc, "monday", "08:00-10:00", "6ème A", &jean, "Salle 101");

    let clash = sc.request(
        "schedule.create",
        json!({
            "day": "monday",
            "slot": "09:00-11:00",
            "className": "5ème B",
            "subject": "Mathématiques",
            "teacherId": jean,
            "room": "Salle 102"
        }),
    );
    assert_eq!(clash["error"]["code"], json!("schedule_conflict"));
    assert_eq!(clash["error"]["details"]["kind"], json!("teacher"));
    assert_eq!(clash["error"]["details"]["entryId"], json!(first));

    let room_clash = sc.request(
        "schedule.create",
        json!({
            "day": "monday",
            "slot": "08:30-09:30",
            "className": "5ème B",
            "subject": "Mathématiques",
            "teacherId": marie,
            "room": "salle 101"
        }),
    );
    assert_eq!(room_clash["error"]["details"]["kind"], json!("room"));

    // Back-to-back sessions share no minute.
    add_entry(&mut sc, "monday", "10:00-12:00", "6ème A", &jean, "Salle 101");
    add_entry(&mut sc, "tuesday", "08:00-10:00", "6ème A", &jean, "Salle 101");

    assert_eq!(
        sc.err_code(
            "schedule.create",
            json!({ "day": "monday", "slot": "12:00-11:00", "className": "6ème A", "subject": "Mathématiques" })
        ),
        "bad_params"
    );
}

#[test]
fn entries_can_be_moved_and_removed() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let jean = professor(&mut sc, "Jean Martin", "jean@school.local");
    let first = add_entry(&mut sc, "monday", "08:00-10:00", "6ème A", &jean, "Salle 101");
    let second = add_entry(&mut sc, "monday", "10:00-12:00", "6ème A", &jean, "Salle 101");

    // An entry never conflicts with itself.
    let moved = sc.ok(
        "schedule.update",
        json!({ "entryId": first, "slot": "08:00-09:00" }),
    );
    assert_eq!(moved["entry"]["slot"], json!("08:00-09:00"));
    assert_eq!(
        sc.err_code(
            "schedule.update",
            json!({ "entryId": first, "slot": "09:00-11:00" })
        ),
        "schedule_conflict"
    );

    let cleared = sc.ok(
        "schedule.update",
        json!({ "entryId": second, "teacherId": null, "room": "" }),
    );
    assert_eq!(cleared["entry"]["teacherId"], json!(null));
    assert_eq!(cleared["entry"]["room"], json!(""));

    sc.ok("schedule.delete", json!({ "entryId": first }));
    assert_eq!(
        sc.err_code("schedule.delete", json!({ "entryId": first })),
        "not_found"
    );
    let left = sc.ok("schedule.list", json!({}));
    assert_eq!(left["entries"].as_array().map(Vec::len), Some(1));
}

#[test]
fn teacher_must_be_an_active_professor() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let alice = sc.create_student("Alice Dupont", "6ème A");
    let account = sc.create_user(json!({
        "name": "Alice Dupont",
        "email": "alice@school.local",
        "role": "student",
        "studentId": alice
    }));
    let params = |teacher: &str| {
        json!({
            "day": "monday",
            "slot": "08:00-10:00",
            "className": "6ème A",
            "subject": "Mathématiques",
            "teacherId": teacher
        })
    };
    assert_eq!(sc.err_code("schedule.create", params(&account)), "bad_params");
    assert_eq!(sc.err_code("schedule.create", params("missing")), "not_found");
}

#[test]
fn personal_timetables_follow_the_role() {
    let mut sc = Sidecar::spawn();
    sc.login_admin();
    let jean = professor(&mut sc, "Jean Martin", "jean@school.local");
    let marie = professor(&mut sc, "Marie Curie", "marie@school.local");
    let alice = sc.create_student("Alice Dupont", "6ème A");
    sc.create_user(json!({
        "name": "Alice Dupont",
        "email": "alice@school.local",
        "role": "student",
        "studentId": alice
    }));
    add_entry(&mut sc, "monday", "08:00-10:00", "6ème A", &jean, "Salle 101");
    add_entry(&mut sc, "wednesday", "14:00-15:30", "5ème B", &jean, "Salle 101");
    add_entry(&mut sc, "tuesday", "08:00-10:00", "5ème B", &marie, "Salle 102");
    sc.ok("session.close", json!({}));

    sc.login("jean@school.local");
    let mine = sc.ok("schedule.mine", json!({}));
    assert_eq!(mine["entries"].as_array().map(Vec::len), Some(2));
    assert_eq!(mine["load"]["sessions"], json!(2));
    assert_eq!(mine["load"]["totalHours"], json!(3.5));
    assert_eq!(mine["load"]["classCount"], json!(2));
    assert_eq!(
        sc.err_code(
            "schedule.create",
            json!({ "day": "friday", "slot": "08:00-10:00", "className": "6ème A", "subject": "Mathématiques" })
        ),
        "forbidden"
    );
    sc.ok("session.close", json!({}));

    sc.login("alice@school.local");
    let own = sc.ok("schedule.mine", json!({}));
    let entries = own["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["class"], json!("6ème A"));
    // Students cannot widen the list to other classes.
    let listed = sc.ok("schedule.list", json!({ "className": "5ème B" }));
    let listed = listed["entries"].as_array().expect("entries");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["class"], json!("6ème A"));
}
