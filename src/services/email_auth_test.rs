use super::*;

#[test]
fn normalize_email_accepts_basic_address() {
    assert_eq!(normalize_email("  RUTH@Example.org "), Some("ruth@example.org".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("ruth"), None);
    assert_eq!(normalize_email("@example.org"), None);
    assert_eq!(normalize_email("ruth@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
}

#[test]
fn normalize_code_uppercases() {
    let code = generate_access_code();
    assert_eq!(normalize_code(&code), Some(code.clone()));
    assert_eq!(normalize_code("abc234"), Some("ABC234".to_owned()));
}

#[test]
fn normalize_code_rejects_bad_shapes() {
    assert_eq!(normalize_code("abc23"), None);
    assert_eq!(normalize_code("abc2345"), None);
    assert_eq!(normalize_code("ABC1I0"), None);
    assert_eq!(normalize_code("ABC23!"), None);
}

#[test]
fn generate_access_code_shape() {
    let code = generate_access_code();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| CODE_ALPHABET.contains(&(c as u8))));
}

#[test]
fn hash_access_code_is_stable_sha256_hex() {
    let a = hash_access_code("ABC234");
    assert_eq!(a, hash_access_code("ABC234"));
    assert_ne!(a, hash_access_code("ABC235"));
    assert_eq!(a.len(), 64);
}

// =============================================================================
// invite gate
// =============================================================================

#[test]
fn invite_matches_after_trim() {
    assert!(invite_accepted(Some("forge"), Some(" forge ")));
}

#[test]
fn invite_mismatch_or_missing_is_rejected() {
    assert!(!invite_accepted(Some("forge"), Some("Forge")));
    assert!(!invite_accepted(Some("forge"), None));
    assert!(!invite_accepted(Some("forge"), Some("")));
}

#[test]
fn sign_up_closed_without_configured_invite() {
    assert!(!invite_accepted(None, Some("forge")));
    assert!(!invite_accepted(Some("  "), Some("")));
}

fn policy() -> SignUpPolicy {
    SignUpPolicy { invite_code: Some("forge".into()), owner_email: Some("naomi@example.org".into()) }
}

#[test]
fn owner_address_signs_up_without_invite_as_owner() {
    let policy = policy();
    assert!(policy.admits("naomi@example.org", None));
    assert_eq!(policy.role_for("naomi@example.org"), Role::Owner);
}

#[test]
fn other_addresses_need_invite_and_join_as_members() {
    let policy = policy();
    assert!(!policy.admits("ruth@example.org", None));
    assert!(policy.admits("ruth@example.org", Some("forge")));
    assert_eq!(policy.role_for("ruth@example.org"), Role::Member);
}

#[test]
fn owner_still_admitted_when_sign_up_closed() {
    let policy = SignUpPolicy { invite_code: None, owner_email: Some("naomi@example.org".into()) };
    assert!(policy.admits("naomi@example.org", None));
    assert!(!policy.admits("ruth@example.org", Some("forge")));
    assert_eq!(SignUpPolicy::default().role_for("naomi@example.org"), Role::Member);
}

#[test]
fn sign_up_name_prefers_supplied_name() {
    assert_eq!(sign_up_name("ruth@example.org", Some("  Ruth M. ")), "Ruth M.");
    assert_eq!(sign_up_name("ruth@example.org", Some("   ")), "ruth");
    assert_eq!(sign_up_name("ruth@example.org", None), "ruth");
}

#[test]
fn render_template_injects_email_and_code() {
    let html = render_access_code_template("ruth@example.org", "ABC234");
    assert!(html.contains("ruth@example.org"));
    assert!(html.contains("ABC234"));
    assert!(!html.contains("{{EMAIL}}"));
    assert!(!html.contains("{{CODE}}"));
}

#[test]
fn email_config_requires_both_values() {
    // Relies on the test environment not configuring Resend.
    if std::env::var("RESEND_API_KEY").is_err() {
        assert!(EmailConfig::from_env().is_none());
    }
}

// =============================================================================
// database flows
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live tests");
        let pool = PgPoolOptions::new().connect(&url).await.expect("connect");
        sqlx::migrate!("src/db/migrations").run(&pool).await.expect("migrate");
        pool
    }

    fn fresh_email() -> String {
        format!("{}@example.org", Uuid::new_v4())
    }

    #[tokio::test]
    async fn unknown_email_without_invite_is_rejected() {
        let pool = pool().await;
        let err = request_access_code(&pool, &fresh_email(), SignUp::default(), &policy())
            .await
            .expect_err("invite required");
        assert!(matches!(err, EmailAuthError::InviteRequired));
    }

    #[tokio::test]
    async fn invited_sign_up_creates_member_profile_and_verifies() {
        let pool = pool().await;
        let email = fresh_email();
        let sign_up = SignUp { display_name: Some("Ruth"), invite_code: Some("forge") };
        let code = request_access_code(&pool, &email, sign_up, &policy())
            .await
            .expect("code");

        let uid = verify_access_code(&pool, &email, &code).await.expect("verify");
        let row = sqlx::query("SELECT role, display_name FROM profiles WHERE user_id = $1")
            .bind(uid)
            .fetch_one(&pool)
            .await
            .expect("profile");
        assert_eq!(row.get::<String, _>("role"), "member");
        assert_eq!(row.get::<String, _>("display_name"), "Ruth");

        // Single use.
        assert!(verify_access_code(&pool, &email, &code).await.is_err());
    }

    #[tokio::test]
    async fn owner_address_creates_owner_profile() {
        let pool = pool().await;
        let email = fresh_email();
        let policy = SignUpPolicy { invite_code: None, owner_email: Some(email.clone()) };
        let code = request_access_code(&pool, &email, SignUp::default(), &policy)
            .await
            .expect("code");

        let uid = verify_access_code(&pool, &email, &code).await.expect("verify");
        let role: String = sqlx::query("SELECT role FROM profiles WHERE user_id = $1")
            .bind(uid)
            .fetch_one(&pool)
            .await
            .expect("profile")
            .get("role");
        assert_eq!(role, "owner");
    }

    #[tokio::test]
    async fn five_misses_burn_the_code() {
        let pool = pool().await;
        let email = fresh_email();
        let sign_up = SignUp { display_name: None, invite_code: Some("forge") };
        let code = request_access_code(&pool, &email, sign_up, &policy())
            .await
            .expect("code");
        let wrong = if code == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };

        for _ in 0..5 {
            assert!(verify_access_code(&pool, &email, wrong).await.is_err());
        }
        assert!(verify_access_code(&pool, &email, &code).await.is_err());
    }
}
