//! Database-backed flow tests.
//!
//! Each test boots a throwaway Postgres container, applies `sql/schema.sql`,
//! and drives the public flows end to end. When no container runtime is
//! available the tests skip instead of failing.

use std::sync::Mutex;

use anyhow::{Context, Result};
use siteauth::auth::{self, ActivationOutcome, LoginRequest, RegisterRequest};
use siteauth::auth::admin::{self, AdminUserUpdate};
use siteauth::auth::groups;
use siteauth::auth::recovery::{email, sqa};
use siteauth::{
    AuthConfig, AuthError, ConflictField, MailQueue, NoopCaptcha, RequestMeta, SaltPair,
    SessionCheck,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, PgPool};
use test_support::postgres::PostgresContainer;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

struct TestDb {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Result<Self> {
        let postgres = match PostgresContainer::start().await {
            Ok(postgres) => postgres,
            Err(err) => {
                eprintln!("Skipping database-backed test: {err}");
                return Err(err);
            }
        };
        postgres.wait_until_ready().await?;
        apply_schema(&postgres).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.dsn())
            .await
            .context("failed to connect test pool")?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }
}

async fn apply_schema(postgres: &PostgresContainer) -> Result<()> {
    let mut connection = PgConnection::connect(&postgres.dsn())
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        current.push_str(line);
        current.push('\n');

        if line.trim_end().ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn test_config() -> AuthConfig {
    AuthConfig::new("https://cms.test".to_string())
}

fn test_salts() -> SaltPair {
    SaltPair::from_parts("0123456789abcdef".to_string(), "fedcba9876543210".to_string())
}

fn test_meta() -> RequestMeta {
    RequestMeta::new("198.51.100.20".to_string(), "FlowTest/1.0".to_string())
}

/// Captures enqueued mail so tests can pull links out of the bodies.
#[derive(Default)]
struct CapturingMail {
    bodies: Mutex<Vec<String>>,
}

impl MailQueue for CapturingMail {
    fn enqueue(&self, _to: &str, _subject: &str, body: &str, _is_html: bool) {
        self.bodies
            .lock()
            .expect("mail lock poisoned")
            .push(body.to_string());
    }
}

impl CapturingMail {
    /// Value between `marker` and the closing quote in the last body.
    fn last_link_value(&self, marker: &str) -> Option<String> {
        let bodies = self.bodies.lock().expect("mail lock poisoned");
        let body = bodies.last()?;
        let start = body.find(marker)? + marker.len();
        let rest = &body[start..];
        let end = rest.find('"')?;
        Some(rest[..end].to_string())
    }
}

fn register_request(username: &str, password: &str, email_addr: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: password.to_string(),
        email: email_addr.to_string(),
        secret_question: String::new(),
        secret_answer: String::new(),
        captcha_response: String::new(),
    }
}

fn login_request(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        captcha_response: String::new(),
    }
}

/// Register and activate an account, returning its user id.
async fn register_active_user(
    db: &TestDb,
    config: &AuthConfig,
    salts: &SaltPair,
    request: RegisterRequest,
) -> Result<i64> {
    let mail = CapturingMail::default();
    let meta = test_meta();
    let outcome = auth::register(&db.pool, config, salts, &NoopCaptcha, &mail, &meta, request)
        .await
        .map_err(anyhow::Error::new)?;
    assert!(outcome.activation_required);

    let key = mail
        .last_link_value("activate?key=")
        .context("activation key missing from mail")?;
    let activated = auth::activate(&db.pool, config, &key, &meta)
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(activated, ActivationOutcome::Activated);
    Ok(outcome.user_id)
}

#[tokio::test]
async fn registration_activation_round_trip() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();
    let mail = CapturingMail::default();

    let outcome = auth::register(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &mail,
        &meta,
        register_request("alice", "hunter2!", "alice@example.com"),
    )
    .await
    .map_err(anyhow::Error::new)?;
    assert!(outcome.activation_required);

    // Correct credentials, but the account is still in the unactivated group.
    let err = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("alice", "hunter2!"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::Authorization(_)));
    assert!(err.to_string().contains("awaiting activation"));

    let key = mail
        .last_link_value("activate?key=")
        .context("activation key missing")?;
    let preview = auth::activation_preview(&db.pool, &config, &key)
        .await
        .map_err(anyhow::Error::new)?
        .context("preview should resolve the key")?;
    assert_eq!(preview.username, "alice");

    let first = auth::activate(&db.pool, &config, &key, &meta)
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(first, ActivationOutcome::Activated);

    // The key was consumed; a replay does nothing.
    let second = auth::activate(&db.pool, &config, &key, &meta)
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(second, ActivationOutcome::NothingToDo);
    assert!(auth::activation_preview(&db.pool, &config, &key)
        .await
        .map_err(anyhow::Error::new)?
        .is_none());

    let success = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("alice", "hunter2!"),
    )
    .await
    .map_err(anyhow::Error::new)?;
    assert_eq!(success.user_id, outcome.user_id);
    Ok(())
}

#[tokio::test]
async fn deactivation_deletes_pending_account() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();
    let mail = CapturingMail::default();

    auth::register(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &mail,
        &meta,
        register_request("benny", "hunter2!", "benny@example.com"),
    )
    .await
    .map_err(anyhow::Error::new)?;

    let key = mail
        .last_link_value("deactivate?key=")
        .context("deactivation key missing")?;
    let first = auth::deactivate(&db.pool, &config, &key)
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(first, ActivationOutcome::Deactivated);

    let second = auth::deactivate(&db.pool, &config, &key)
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(second, ActivationOutcome::NothingToDo);

    // The account is gone; login falls into the generic rejection.
    let err = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("benny", "hunter2!"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Incorrect username or password!");
    Ok(())
}

#[tokio::test]
async fn failed_logins_lock_the_window() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();

    register_active_user(
        &db,
        &config,
        &salts,
        register_request("carla", "secret9!", "carla@example.com"),
    )
    .await?;

    for _ in 0..config.max_login_attempts() {
        let err = auth::login(
            &db.pool,
            &config,
            &salts,
            &NoopCaptcha,
            &meta,
            login_request("carla", "wrong-pass"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect username or password!");
    }

    // Even the correct password is rejected until the window passes.
    let err = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("carla", "secret9!"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::RateLimited { .. }));
    assert!(err.to_string().contains("20 minutes"));
    Ok(())
}

#[tokio::test]
async fn banned_account_rejected_with_reason() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();

    let user_id = register_active_user(
        &db,
        &config,
        &salts,
        register_request("donny", "secret9!", "donny@example.com"),
    )
    .await?;
    groups::issue_ban(&db.pool, user_id, "spamming", None, user_id)
        .await
        .map_err(anyhow::Error::new)?;

    let err = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("donny", "secret9!"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::Authorization(_)));
    let message = err.to_string();
    assert!(message.contains("'spamming'"));
    assert!(message.contains("the end of time (permanent)"));

    // An existing session must be force-terminated as well.
    let check = auth::validate_session(&db.pool, user_id)
        .await
        .map_err(anyhow::Error::new)?;
    assert!(matches!(check, SessionCheck::Terminate));
    Ok(())
}

#[tokio::test]
async fn secret_answer_throttle_covers_both_stages() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();

    let mut request = register_request("edith", "secret9!", "edith@example.com");
    request.secret_question = "favourite colour?".to_string();
    request.secret_answer = "plaid".to_string();
    register_active_user(&db, &config, &salts, request).await?;

    let challenge = sqa::begin(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        "edith",
        "",
    )
    .await
    .map_err(anyhow::Error::new)?;
    assert_eq!(challenge.secret_question, "favourite colour?");

    for _ in 0..config.sqa_attempts_max() {
        let err = sqa::answer(
            &db.pool,
            &config,
            &salts,
            &meta,
            &challenge.ticket,
            "tartan",
            "newpass9!",
            "newpass9!",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect secret answer!");
    }

    // The recorded failures now lock the first stage too.
    let err = sqa::begin(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        "edith",
        "",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::RateLimited { .. }));
    Ok(())
}

#[tokio::test]
async fn secret_answer_resets_password() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();

    let mut request = register_request("frank", "oldpass9!", "frank@example.com");
    request.secret_question = "first pet?".to_string();
    request.secret_answer = "maus".to_string();
    register_active_user(&db, &config, &salts, request).await?;

    let challenge = sqa::begin(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        "frank",
        "",
    )
    .await
    .map_err(anyhow::Error::new)?;
    sqa::answer(
        &db.pool,
        &config,
        &salts,
        &meta,
        &challenge.ticket,
        "maus",
        "newpass9!",
        "newpass9!",
    )
    .await
    .map_err(anyhow::Error::new)?;

    let err = auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("frank", "oldpass9!"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Incorrect username or password!");

    auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("frank", "newpass9!"),
    )
    .await
    .map_err(anyhow::Error::new)?;
    Ok(())
}

#[tokio::test]
async fn recovery_dispatch_cap_and_single_use_code() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();
    let mail = CapturingMail::default();

    register_active_user(
        &db,
        &config,
        &salts,
        register_request("gina", "oldpass9!", "gina@example.com"),
    )
    .await?;

    for _ in 0..config.max_recovery_emails_per_day() {
        email::request(&db.pool, &config, &NoopCaptcha, &mail, &meta, "gina", "")
            .await
            .map_err(anyhow::Error::new)?;
    }
    let err = email::request(&db.pool, &config, &NoopCaptcha, &mail, &meta, "gina", "")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RateLimited { .. }));

    let code = mail
        .last_link_value("/recover/email/")
        .context("recovery code missing from mail")?;
    assert!(email::open(&db.pool, &code).await.map_err(anyhow::Error::new)?);

    email::complete(&db.pool, &salts, &meta, &code, "newpass9!")
        .await
        .map_err(anyhow::Error::new)?;
    auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("gina", "newpass9!"),
    )
    .await
    .map_err(anyhow::Error::new)?;

    // The code was consumed with the password change; a replay is inert.
    assert!(!email::open(&db.pool, &code).await.map_err(anyhow::Error::new)?);
    let err = email::complete(&db.pool, &salts, &meta, &code, "another9!")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
    Ok(())
}

#[tokio::test]
async fn group_deletion_refused_while_populated() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();

    let group = groups::create_group(&db.pool, "Temp").await.map_err(anyhow::Error::new)?;
    let user_id = register_active_user(
        &db,
        &config,
        &salts,
        register_request("henry", "secret9!", "henry@example.com"),
    )
    .await?;
    admin::update_user(
        &db.pool,
        &config,
        &salts,
        user_id,
        AdminUserUpdate {
            username: "henry".to_string(),
            new_password: None,
            email: "henry@example.com".to_string(),
            secret_question: String::new(),
            secret_answer: String::new(),
            group_id: group.group_id,
        },
    )
    .await
    .map_err(anyhow::Error::new)?;

    let err = groups::delete_group(&db.pool, group.group_id).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot delete group - the group contains users, transfer them to another group first!"
    );

    let moved = groups::transfer_members(&db.pool, group.group_id, config.user_group_id())
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(moved, 1);
    groups::delete_group(&db.pool, group.group_id)
        .await
        .map_err(anyhow::Error::new)?;
    Ok(())
}

#[tokio::test]
async fn admin_edit_checks_duplicates_and_group() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let config = test_config();
    let salts = test_salts();
    let meta = test_meta();

    let iris_id = register_active_user(
        &db,
        &config,
        &salts,
        register_request("iris", "secret9!", "iris@example.com"),
    )
    .await?;
    let jane_id = register_active_user(
        &db,
        &config,
        &salts,
        register_request("jane", "secret9!", "jane@example.com"),
    )
    .await?;

    // Search is loose: case-insensitive, unknown users named explicitly.
    let found = admin::find_user(&db.pool, &config, "IRIS").await.map_err(anyhow::Error::new)?;
    assert_eq!(found, iris_id);
    let err = admin::find_user(&db.pool, &config, "nobodyhere").await.unwrap_err();
    assert_eq!(err.to_string(), "User not found!");

    let base_update = AdminUserUpdate {
        username: "jane".to_string(),
        new_password: None,
        email: "jane@example.com".to_string(),
        secret_question: String::new(),
        secret_answer: String::new(),
        group_id: config.user_group_id(),
    };

    let err = admin::update_user(
        &db.pool,
        &config,
        &salts,
        jane_id,
        AdminUserUpdate {
            email: "iris@example.com".to_string(),
            ..base_update.clone()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Conflict {
            field: ConflictField::Email
        }
    ));
    assert_eq!(err.to_string(), "E-mail already in-use!");

    let err = admin::update_user(
        &db.pool,
        &config,
        &salts,
        jane_id,
        AdminUserUpdate {
            group_id: 999,
            ..base_update.clone()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Invalid group!");

    admin::update_user(
        &db.pool,
        &config,
        &salts,
        jane_id,
        AdminUserUpdate {
            username: "janet".to_string(),
            new_password: Some("newpass9!".to_string()),
            email: "janet@example.com".to_string(),
            ..base_update
        },
    )
    .await
    .map_err(anyhow::Error::new)?;
    auth::login(
        &db.pool,
        &config,
        &salts,
        &NoopCaptcha,
        &meta,
        login_request("janet", "newpass9!"),
    )
    .await
    .map_err(anyhow::Error::new)?;
    Ok(())
}
