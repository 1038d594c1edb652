use serde_json::json;

use crate::common::{PASSWORD, TestApp, routes};

mod login {
    use super::*;

    #[tokio::test]
    async fn user_can_log_in_and_receives_a_token() {
        let app = TestApp::spawn().await;
        app.insert_user("maria@venue.test", "MANAGER").await;

        let res = app.login("maria@venue.test", PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(res.body["email"], "maria@venue.test");
        assert_eq!(res.body["role"], "MANAGER");
    }

    #[tokio::test]
    async fn email_is_matched_case_insensitively() {
        let app = TestApp::spawn().await;
        app.insert_user("maria@venue.test", "MANAGER").await;

        let res = app.login("  Maria@Venue.TEST ", PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let app = TestApp::spawn().await;
        app.insert_user("maria@venue.test", "MANAGER").await;

        let res = app.login("maria@venue.test", "wrong-password").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn unknown_email_is_rejected_the_same_way() {
        let app = TestApp::spawn().await;

        let res = app.login("nobody@venue.test", PASSWORD).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn inactive_accounts_cannot_log_in() {
        use sea_orm::{ActiveModelTrait, Set};
        use venue_server::entity::user;

        let app = TestApp::spawn().await;
        let account = app.insert_user("gone@venue.test", "WAITER").await;
        let mut active: user::ActiveModel = account.into();
        active.is_active = Set(false);
        active.update(&app.db).await.unwrap();

        let res = app.login("gone@venue.test", PASSWORD).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn empty_fields_are_a_validation_error() {
        let app = TestApp::spawn().await;

        let res = app.login("", "").await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod me {
    use super::*;

    #[tokio::test]
    async fn returns_the_principal_and_its_operations() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("wes@venue.test", "WAITER")
            .await;

        let res = app.get_with_token(routes::ME, &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["email"], "wes@venue.test");
        assert_eq!(res.body["role"], "WAITER");
        assert_eq!(res.body["operations"], json!(["category:read"]));
    }

    #[tokio::test]
    async fn requires_a_token() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn rejects_a_forged_token() {
        let app = TestApp::spawn().await;

        let res = app.get_with_token(routes::ME, "not-a-real-token").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }
}

mod registration {
    use super::*;

    fn new_account(email: &str, role: &str) -> serde_json::Value {
        json!({
            "email": email,
            "name": "New Hire",
            "password": "securepass",
            "role": role,
        })
    }

    #[tokio::test]
    async fn owner_can_register_staff_who_can_then_log_in() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("owner@venue.test", "OWNER")
            .await;

        let res = app
            .post_with_token(
                routes::REGISTER,
                &new_account("Chef@Venue.test", "CHEF"),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["email"], "chef@venue.test");
        assert_eq!(res.body["role"], "CHEF");

        let login = app.login("chef@venue.test", "securepass").await;
        assert_eq!(login.status, 200, "{}", login.text);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("owner@venue.test", "OWNER")
            .await;

        let body = new_account("cashier@venue.test", "CASHIER");
        let first = app.post_with_token(routes::REGISTER, &body, &token).await;
        assert_eq!(first.status, 201, "{}", first.text);

        let res = app.post_with_token(routes::REGISTER, &body, &token).await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn managers_cannot_register_users() {
        let app = TestApp::spawn().await;
        let token = app.manager_token().await;

        let res = app
            .post_with_token(
                routes::REGISTER,
                &new_account("waiter@venue.test", "WAITER"),
                &token,
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn registration_requires_a_token() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::REGISTER, &new_account("x@venue.test", "WAITER"))
            .await;

        assert_eq!(res.status, 401);
    }

    #[tokio::test]
    async fn unknown_roles_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app
            .create_user_with_role("root@venue.test", "SUPERUSER")
            .await;

        let res = app
            .post_with_token(
                routes::REGISTER,
                &new_account("b@venue.test", "BARISTA"),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod bootstrap {
    use venue_server::config::AuthConfig;
    use venue_server::seed;

    use super::*;

    fn auth(email: Option<&str>, password: Option<&str>) -> AuthConfig {
        AuthConfig {
            jwt_secret: crate::common::JWT_SECRET.into(),
            token_ttl_days: 1,
            bootstrap_email: email.map(String::from),
            bootstrap_password: password.map(String::from),
        }
    }

    #[tokio::test]
    async fn configured_superuser_is_created_once() {
        let app = TestApp::spawn().await;
        let config = auth(Some("Admin@Venue.test"), Some("bootstrap-pass"));

        seed::seed_bootstrap_superuser(&app.db, &config).await.unwrap();
        seed::seed_bootstrap_superuser(&app.db, &config).await.unwrap();

        let res = app.login("admin@venue.test", "bootstrap-pass").await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["role"], "SUPERUSER");
    }

    #[tokio::test]
    async fn nothing_is_created_without_a_password() {
        let app = TestApp::spawn().await;

        seed::seed_bootstrap_superuser(&app.db, &auth(Some("admin@venue.test"), None))
            .await
            .unwrap();

        let res = app.login("admin@venue.test", "bootstrap-pass").await;
        assert_eq!(res.status, 401);
    }
}
