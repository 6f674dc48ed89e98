use rusqlite::Connection;
use serde_json::json;
use social_core::db::open_db_in_memory;
use social_core::{CrudError, OtpCrud, SaveAction, Session, User, UserCreate, UserCrud, UserLookup};

fn payload(email: &str, phone_number: i64) -> UserCreate {
    UserCreate {
        email: email.to_string(),
        phone_number,
        name: "A".to_string(),
        password: "plain".to_string(),
        is_admin: false,
        is_active: false,
    }
}

fn create_user(conn: &Connection, email: &str, phone_number: i64) -> User {
    let users = UserCrud::new();
    let mut session = Session::new(conn);
    users
        .create(&mut session, &payload(email, phone_number), SaveAction::Commit)
        .unwrap()
}

fn user_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn create_with_commit_assigns_id_and_get_returns_same_entity() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let input = json!({
        "email": "a@x.com",
        "phone_number": 555,
        "name": "A",
        "password": "plain"
    });
    let created = users.create(&mut session, &input, SaveAction::Commit).unwrap();

    assert_eq!(created.id, Some(1));
    assert_eq!(created.email, "a@x.com");
    assert_eq!(created.phone_number, 555);
    assert!(created.created_on.is_some());
    assert!(created.modified_on.is_some());
    assert!(!created.is_active);
    assert!(!session.in_transaction());

    let loaded = users.get(&session, 1).unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn committed_create_is_visible_to_a_new_session() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);

    let session = Session::new(&conn);
    let loaded = UserCrud::new()
        .get(&session, created.id.unwrap())
        .unwrap();
    assert_eq!(loaded, Some(created));
}

#[test]
fn get_missing_id_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let session = Session::new(&conn);
    assert!(UserCrud::new().get(&session, 42).unwrap().is_none());
}

#[test]
fn create_with_none_stages_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let staged = users
        .create(&mut session, &payload("a@x.com", 555), SaveAction::None)
        .unwrap();
    assert_eq!(staged.id, None);
    assert_eq!(staged.email, "a@x.com");
    assert!(session.has_pending());
    assert_eq!(user_count(&conn), 0);

    session.commit().unwrap();
    assert!(!session.has_pending());

    let found = users.get_by_email(&session, "a@x.com").unwrap().unwrap();
    assert_eq!(found.id, Some(1));
}

#[test]
fn create_with_flush_is_rolled_back_when_session_drops() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();

    {
        let mut session = Session::new(&conn);
        let flushed = users
            .create(&mut session, &payload("a@x.com", 555), SaveAction::Flush)
            .unwrap();
        assert_eq!(flushed.id, Some(1));
        assert!(session.in_transaction());
        assert_eq!(user_count(&conn), 1);
    }

    assert!(conn.is_autocommit());
    assert_eq!(user_count(&conn), 0);
}

#[test]
fn flushed_writes_commit_together() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    users
        .create(&mut session, &payload("a@x.com", 555), SaveAction::Flush)
        .unwrap();
    users
        .create(&mut session, &payload("b@x.com", 556), SaveAction::Flush)
        .unwrap();
    session.handle(SaveAction::Commit).unwrap();
    drop(session);

    assert_eq!(user_count(&conn), 2);
}

#[test]
fn explicit_rollback_discards_staged_and_flushed_writes() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    users
        .create(&mut session, &payload("a@x.com", 555), SaveAction::Flush)
        .unwrap();
    users
        .create(&mut session, &payload("b@x.com", 556), SaveAction::None)
        .unwrap();
    session.rollback().unwrap();

    assert!(!session.has_pending());
    assert!(!session.in_transaction());
    assert_eq!(user_count(&conn), 0);
}

#[test]
fn session_joins_caller_transaction_without_committing_it() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("BEGIN;").unwrap();

    {
        let mut session = Session::new(&conn);
        UserCrud::new()
            .create(&mut session, &payload("a@x.com", 555), SaveAction::Commit)
            .unwrap();
        assert!(!session.in_transaction());
    }

    assert!(!conn.is_autocommit());
    conn.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(user_count(&conn), 0);
}

#[test]
fn create_from_entity_lets_store_fill_null_fields() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let draft = User {
        id: None,
        name: "A".to_string(),
        email: "a@x.com".to_string(),
        phone_number: 555,
        password: "h".to_string(),
        created_on: None,
        modified_on: None,
        is_active: true,
        is_admin: false,
    };
    let created = users.create(&mut session, &draft, SaveAction::Commit).unwrap();

    assert_eq!(created.id, Some(1));
    assert!(created.created_on.is_some());
    assert!(created.is_active);
}

#[test]
fn create_rejects_undeclared_field() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn);

    let input = json!({
        "email": "a@x.com",
        "phone_number": 555,
        "name": "A",
        "password": "plain",
        "nickname": "ace"
    });
    let err = UserCrud::new()
        .create(&mut session, &input, SaveAction::Commit)
        .unwrap_err();
    assert!(matches!(err, CrudError::Programming(message) if message.contains("nickname")));
    assert!(!session.has_pending());
}

#[test]
fn create_rejects_value_of_wrong_type() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn);

    let input = json!({
        "email": "a@x.com",
        "phone_number": "555-0100",
        "name": "A",
        "password": "plain"
    });
    let err = UserCrud::new()
        .create(&mut session, &input, SaveAction::Commit)
        .unwrap_err();
    assert!(matches!(err, CrudError::Programming(_)));
}

#[test]
fn duplicate_email_is_a_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    create_user(&conn, "a@x.com", 555);

    let mut session = Session::new(&conn);
    let err = UserCrud::new()
        .create(&mut session, &payload("a@x.com", 556), SaveAction::Commit)
        .unwrap_err();
    match err {
        CrudError::ConstraintViolation { table, message } => {
            assert_eq!(table, "users");
            assert!(message.contains("email"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.in_transaction());
    assert_eq!(user_count(&conn), 1);
}

#[test]
fn duplicate_phone_number_is_a_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    create_user(&conn, "a@x.com", 555);

    let mut session = Session::new(&conn);
    let err = UserCrud::new()
        .create(&mut session, &payload("b@x.com", 555), SaveAction::Commit)
        .unwrap_err();
    assert!(matches!(err, CrudError::ConstraintViolation { .. }));
}

#[test]
fn update_then_get_reflects_supplied_fields_only() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let updated = users
        .update(
            &mut session,
            created.clone(),
            &json!({ "name": "Alice", "is_active": true }),
            None,
            SaveAction::Commit,
        )
        .unwrap();
    assert_eq!(updated.name, "Alice");
    assert!(updated.is_active);

    let loaded = users.get(&session, 1).unwrap().unwrap();
    assert_eq!(loaded.name, "Alice");
    assert!(loaded.is_active);
    assert_eq!(loaded.email, created.email);
    assert_eq!(loaded.phone_number, created.phone_number);
    assert_eq!(loaded.password, created.password);
    assert_eq!(loaded.created_on, created.created_on);
}

#[test]
fn update_skips_undeclared_fields_and_id() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let updated = users
        .update(
            &mut session,
            created,
            &json!({ "nickname": "ace", "id": 99, "name": "B" }),
            None,
            SaveAction::Commit,
        )
        .unwrap();
    assert_eq!(updated.id, Some(1));
    assert_eq!(updated.name, "B");
    assert!(users.get(&session, 99).unwrap().is_none());
}

#[test]
fn update_touches_modified_on() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (name, email, phone_number, password, created_on, modified_on)
         VALUES ('A', 'a@x.com', 555, 'h', '2020-01-01T00:00:00.000Z', '2020-01-01T00:00:00.000Z');",
        [],
    )
    .unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);
    let before = users.get(&session, 1).unwrap().unwrap();

    let updated = users
        .update(
            &mut session,
            before.clone(),
            &json!({ "name": "B" }),
            None,
            SaveAction::Commit,
        )
        .unwrap();
    assert!(updated.modified_on > before.modified_on);
    assert_eq!(updated.created_on, before.created_on);
}

#[test]
fn explicit_modified_on_is_kept() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let updated = users
        .update(
            &mut session,
            created,
            &json!({ "modified_on": "2021-06-01T12:00:00+02:00" }),
            None,
            SaveAction::Commit,
        )
        .unwrap();
    let expected = chrono::DateTime::parse_from_rfc3339("2021-06-01T10:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert_eq!(updated.modified_on, Some(expected));
}

#[test]
fn update_with_refresh_subset_reloads_only_named_fields() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    // Out-of-band change the session did not make.
    conn.execute("UPDATE users SET is_admin = 1 WHERE id = 1;", [])
        .unwrap();

    let users = UserCrud::new();
    let mut session = Session::new(&conn);
    let refreshed = users
        .update(
            &mut session,
            created.clone(),
            &json!({ "name": "B" }),
            Some(&["name"]),
            SaveAction::Commit,
        )
        .unwrap();
    assert_eq!(refreshed.name, "B");
    assert!(!refreshed.is_admin);

    let full = users
        .update(
            &mut session,
            refreshed,
            &json!({ "name": "C" }),
            Some(&["name", "is_admin"]),
            SaveAction::Commit,
        )
        .unwrap();
    assert_eq!(full.name, "C");
    assert!(full.is_admin);
}

#[test]
fn update_with_unknown_refresh_field_is_rejected_before_writing() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let err = users
        .update(
            &mut session,
            created,
            &json!({ "name": "B" }),
            Some(&["nickname"]),
            SaveAction::Commit,
        )
        .unwrap_err();
    assert!(matches!(err, CrudError::Programming(_)));
    assert!(!session.has_pending());
    assert_eq!(users.get(&session, 1).unwrap().unwrap().name, "A");
}

#[test]
fn update_without_id_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let users = UserCrud::new();
    let mut session = Session::new(&conn);
    let staged = users
        .create(&mut session, &payload("a@x.com", 555), SaveAction::None)
        .unwrap();

    let err = users
        .update(
            &mut session,
            staged,
            &json!({ "name": "B" }),
            None,
            SaveAction::Commit,
        )
        .unwrap_err();
    assert!(matches!(err, CrudError::Programming(_)));
}

#[test]
fn update_of_deleted_row_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    conn.execute("DELETE FROM users WHERE id = 1;", []).unwrap();

    let mut session = Session::new(&conn);
    let err = UserCrud::new()
        .update(
            &mut session,
            created,
            &json!({ "name": "B" }),
            None,
            SaveAction::Commit,
        )
        .unwrap_err();
    assert!(matches!(err, CrudError::NotFound { table: "users", id: 1 }));
    assert!(!session.in_transaction());
}

#[test]
fn remove_returns_entity_and_deletes_row() {
    let conn = open_db_in_memory().unwrap();
    let created = create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    let removed = users.remove(&mut session, 1, SaveAction::Commit).unwrap();
    assert_eq!(removed, created);
    assert!(users.get(&session, 1).unwrap().is_none());
}

#[test]
fn remove_missing_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let mut session = Session::new(&conn);

    let err = UserCrud::new()
        .remove(&mut session, 7, SaveAction::Commit)
        .unwrap_err();
    assert!(matches!(err, CrudError::NotFound { table: "users", id: 7 }));
}

#[test]
fn remove_with_none_keeps_row_until_commit() {
    let conn = open_db_in_memory().unwrap();
    create_user(&conn, "a@x.com", 555);
    let users = UserCrud::new();
    let mut session = Session::new(&conn);

    users.remove(&mut session, 1, SaveAction::None).unwrap();
    assert_eq!(user_count(&conn), 1);

    session.commit().unwrap();
    assert_eq!(user_count(&conn), 0);
}

#[test]
fn otp_requires_existing_user() {
    let conn = open_db_in_memory().unwrap();
    let otps = OtpCrud::new();
    let mut session = Session::new(&conn);

    let err = otps
        .create(
            &mut session,
            &json!({ "user_id": 99, "otp": 123456 }),
            SaveAction::Commit,
        )
        .unwrap_err();
    assert!(matches!(err, CrudError::ConstraintViolation { table: "otp", .. }));

    let user = create_user(&conn, "a@x.com", 555);
    let otp = otps
        .create(
            &mut session,
            &json!({ "user_id": user.id, "otp": 123456 }),
            SaveAction::Commit,
        )
        .unwrap();
    assert_eq!(otp.user_id, 1);
    assert_eq!(otp.otp, 123456);
    assert!(otp.modified_on.is_some());
}

#[test]
fn get_by_email_is_exact_match() {
    let conn = open_db_in_memory().unwrap();
    create_user(&conn, "a@x.com", 555);
    let session = Session::new(&conn);
    let users = UserCrud::new();

    assert!(users.get_by_email(&session, "a@x.com").unwrap().is_some());
    assert!(users.get_by_email(&session, "A@X.COM").unwrap().is_none());
    assert!(users.get_by_email(&session, "b@x.com").unwrap().is_none());
}
