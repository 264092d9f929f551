pub mod auth;
pub mod health;
pub mod profile;
pub mod summaries;

use actix_web::web;

use crate::error::AppError;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Corps / query / path invalides → même enveloppe d'erreur que le reste
    cfg.app_data(
        web::JsonConfig::default()
            .limit(2 * 1024 * 1024)
            .error_handler(|err, _req| AppError::InvalidInput(format!("Invalid JSON body: {}", err)).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(format!("Invalid query string: {}", err)).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::InvalidInput(format!("Invalid path parameter: {}", err)).into()),
    )
    .service(
        web::scope("/api")
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(summaries::summaries_routes)
            .configure(profile::profile_routes),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::summaries as summary_rows;
    use crate::services::ai_client::{AiError, ChatProvider, ChatRequest};
    use crate::services::auth_service::AuthService;
    use crate::services::identity_provider::NoIdentityProvider;
    use crate::services::summarizer::Summarizer;
    use crate::services::summary_service::SummaryService;
    use crate::services::user_service::UserService;
    use crate::test_support::{sample_transcript, sample_video, setup_db, ScriptedProvider, VALID_SUMMARY_JSON};
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use sea_orm::{DatabaseConnection, EntityTrait};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn app_data(
        db: &DatabaseConnection,
        provider: Arc<dyn ChatProvider>,
        config: Config,
    ) -> (web::Data<AuthService>, web::Data<SummaryService>, web::Data<UserService>, web::Data<Config>) {
        let summarizer = Summarizer::with_limits(provider, config.ai.chunk_threshold, Duration::ZERO);
        (
            web::Data::new(AuthService::new(db.clone(), Arc::new(NoIdentityProvider), &config)),
            web::Data::new(SummaryService::new(db.clone(), summarizer, &config)),
            web::Data::new(UserService::new(db.clone(), config.credits.clone())),
            web::Data::new(config),
        )
    }

    macro_rules! test_app {
        ($db:expr, $provider:expr, $config:expr) => {{
            let (auth, summaries, users, config) = app_data(&$db, $provider, $config);
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db.clone()))
                    .app_data(auth)
                    .app_data(summaries)
                    .app_data(users)
                    .app_data(config)
                    .configure(configure_routes),
            )
            .await
        }};
    }

    fn generate_body(video_id: &str) -> Value {
        json!({
            "transcript": sample_transcript(),
            "video": sample_video(video_id),
        })
    }

    macro_rules! register {
        ($app:expr, $email:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(json!({ "email": $email, "password": "correct horse battery" }))
                .to_request();
            let body: Value = test::call_and_read_body_json(&$app, req).await;
            body["data"]["accessToken"].as_str().unwrap().to_string()
        }};
    }

    #[actix_web::test]
    async fn test_health() {
        let (db, _dir) = setup_db().await;
        let app = test_app!(db, Arc::new(ScriptedProvider::default()), Config::default());

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[actix_web::test]
    async fn test_protected_routes_require_token() {
        let (db, _dir) = setup_db().await;
        let app = test_app!(db, Arc::new(ScriptedProvider::default()), Config::default());

        let req = test::TestRequest::get().uri("/api/profile").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "UNAUTHORIZED");

        let req = test::TestRequest::get()
            .uri("/api/summaries")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_generate_flow_over_http() {
        let (db, _dir) = setup_db().await;
        let provider = Arc::new(ScriptedProvider::with_responses(vec![Ok(VALID_SUMMARY_JSON.to_string())]));
        let app = test_app!(db, provider, Config::default());
        let token = register!(app, "http@example.com");

        // Premier appel: facturé
        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(generate_body("abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["fromCache"], false);
        assert_eq!(body["data"]["creditsRemaining"], 4);
        assert_eq!(body["data"]["summary"]["status"], "COMPLETED");
        assert_eq!(body["data"]["summary"]["video"]["videoId"], "abc");

        // Rejeu: gratuit
        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(generate_body("abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["fromCache"], true);
        assert_eq!(body["data"]["creditsRemaining"], 4);

        let req = test::TestRequest::get()
            .uri("/api/summaries/stats")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["completed"], 1);
        assert_eq!(body["data"]["creditsSpent"], 1);

        let req = test::TestRequest::get()
            .uri("/api/summaries/video/abc")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["transcript"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::get()
            .uri("/api/profile/credits")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["credits"], 4);
        assert_eq!(body["data"]["plan"], "FREE");
    }

    #[actix_web::test]
    async fn test_error_envelopes() {
        let (db, _dir) = setup_db().await;
        let provider = Arc::new(ScriptedProvider::with_responses(vec![Err(AiError::RateLimited {
            retry_after: Some(20),
        })]));
        let app = test_app!(db, provider, Config::default());
        let token = register!(app, "errors@example.com");

        // JSON invalide
        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "INVALID_INPUT");

        // Validation champ par champ
        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "transcript": [], "video": sample_video("abc") }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert_eq!(body["errors"][0]["field"], "transcript");

        // Erreur LLM réessayable: 429 + Retry-After, crédits remboursés
        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(generate_body("abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("Retry-After").unwrap(), "20");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "AI_RATE_LIMITED");
        assert_eq!(body["retryable"], true);

        let req = test::TestRequest::get()
            .uri("/api/profile/credits")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["credits"], 5);

        // Même plan
        let req = test::TestRequest::put()
            .uri("/api/profile/plan")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "plan": "FREE" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_insufficient_credits_is_payment_required() {
        let (db, _dir) = setup_db().await;
        let mut config = Config::default();
        config.credits.free_monthly = 0;
        let app = test_app!(db, Arc::new(ScriptedProvider::default()), config);
        let token = register!(app, "broke@example.com");

        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(generate_body("abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "INSUFFICIENT_CREDITS");
    }

    struct SlowProvider;

    #[async_trait]
    impl ChatProvider for SlowProvider {
        async fn chat_complete(&self, _request: ChatRequest) -> Result<String, AiError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(VALID_SUMMARY_JSON.to_string())
        }
    }

    #[actix_web::test]
    async fn test_timeout_does_not_cancel_generation() {
        let (db, _dir) = setup_db().await;
        let mut config = Config::default();
        config.request_timeout = Duration::from_millis(50);
        let app = test_app!(db, Arc::new(SlowProvider), config);
        let token = register!(app, "slow@example.com");

        let req = test::TestRequest::post()
            .uri("/api/summaries/generate")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(generate_body("abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "TIMEOUT");

        // La génération se termine en arrière-plan
        tokio::time::sleep(Duration::from_millis(800)).await;
        let rows = summary_rows::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, summary_rows::SummaryStatus::Completed);
    }

    #[actix_web::test]
    async fn test_refresh_and_logout_over_http() {
        let (db, _dir) = setup_db().await;
        let app = test_app!(db, Arc::new(ScriptedProvider::default()), Config::default());

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "email": "rotate@example.com", "password": "correct horse battery" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let access = body["data"]["accessToken"].as_str().unwrap().to_string();
        let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["user"]["email"], "rotate@example.com");

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refreshToken": refresh }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refreshToken": refresh }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header(("Authorization", format!("Bearer {}", access)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(("Authorization", format!("Bearer {}", access)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["plan"], "FREE");
    }
}
