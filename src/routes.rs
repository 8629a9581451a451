use crate::{
    api::{
        admin, clock, companies, crew_chief, jobs, personnel, response::ApiError, shifts, time_entries, timesheets,
        users,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-route rate limiters, keyed by peer IP.
#[derive(Clone)]
pub struct Limiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    protected: Limiter,
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter(config.rate_login_per_min)?,
            register: build_limiter(config.rate_register_per_min)?,
            refresh: build_limiter(config.rate_refresh_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

/// Turns extractor failures (bad JSON, query or path) into error envelopes.
fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(4 * 1024 * 1024) // signature images
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()))
    .app_data(web::PathConfig::default().error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()));
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: Limiters) {
    configure_extractors(cfg);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(
                web::resource("/users")
                    .route(web::post().to(users::create_user))
                    .route(web::get().to(users::list_users)),
            )
            .service(
                web::resource("/companies")
                    .route(web::get().to(companies::list_companies))
                    .route(web::post().to(companies::create_company)),
            )
            .service(
                web::scope("/jobs")
                    // /jobs
                    .service(
                        web::resource("")
                            .route(web::get().to(jobs::list_jobs))
                            .route(web::post().to(jobs::create_job)),
                    )
                    // /jobs/{job_id}
                    .service(
                        web::resource("/{job_id}")
                            .route(web::get().to(jobs::get_job))
                            .route(web::patch().to(jobs::update_job))
                            .route(web::delete().to(jobs::delete_job)),
                    )
                    .service(web::resource("/{job_id}/shifts").route(web::get().to(jobs::list_job_shifts))),
            )
            .service(
                web::scope("/shifts")
                    // /shifts
                    .service(
                        web::resource("")
                            .route(web::get().to(shifts::list_shifts))
                            .route(web::post().to(shifts::create_shift)),
                    )
                    // /shifts/{shift_id}
                    .service(
                        web::resource("/{shift_id}")
                            .route(web::get().to(shifts::get_shift))
                            .route(web::patch().to(shifts::update_shift))
                            .route(web::delete().to(shifts::delete_shift)),
                    )
                    // staffing
                    .service(
                        web::resource("/{shift_id}/personnel").route(web::post().to(personnel::assign_worker)),
                    )
                    .service(
                        web::resource("/{shift_id}/personnel/{assignment_id}")
                            .route(web::delete().to(personnel::unassign_worker)),
                    )
                    .service(web::resource("/{shift_id}/sync-import").route(web::put().to(personnel::sync_import)))
                    // clock
                    .service(web::resource("/{shift_id}/clock-in").route(web::post().to(clock::clock_in)))
                    .service(web::resource("/{shift_id}/clock-out").route(web::post().to(clock::clock_out)))
                    .service(web::resource("/{shift_id}/end-shift").route(web::post().to(clock::end_shift)))
                    .service(web::resource("/{shift_id}/no-show").route(web::post().to(clock::no_show)))
                    .service(web::resource("/{shift_id}/end-all").route(web::post().to(clock::end_all)))
                    // timesheet & rights
                    .service(
                        web::resource("/{shift_id}/timesheet").route(web::post().to(timesheets::create_timesheet)),
                    )
                    .service(
                        web::resource("/{shift_id}/permissions/me").route(web::get().to(crew_chief::my_shift_rights)),
                    ),
            )
            .service(
                web::resource("/time-entries/{entry_id}").route(web::put().to(time_entries::correct_time_entry)),
            )
            .service(
                web::scope("/timesheets")
                    .service(web::resource("").route(web::get().to(timesheets::list_timesheets)))
                    .service(
                        web::resource("/{timesheet_id}")
                            .route(web::get().to(timesheets::get_timesheet))
                            .route(web::delete().to(timesheets::delete_timesheet)),
                    )
                    .service(
                        web::resource("/{timesheet_id}/finalize")
                            .route(web::post().to(timesheets::finalize_timesheet)),
                    )
                    .service(
                        web::resource("/{timesheet_id}/company-approve")
                            .route(web::post().to(timesheets::company_approve)),
                    )
                    .service(
                        web::resource("/{timesheet_id}/manager-approve")
                            .route(web::post().to(timesheets::manager_approve)),
                    )
                    .service(
                        web::resource("/{timesheet_id}/reject").route(web::post().to(timesheets::reject_timesheet)),
                    )
                    .service(
                        web::resource("/{timesheet_id}/export").route(web::get().to(timesheets::export_timesheet)),
                    ),
            )
            .service(
                web::scope("/crew-chief-permissions")
                    .service(
                        web::resource("")
                            .route(web::get().to(crew_chief::list_permissions))
                            .route(web::post().to(crew_chief::grant_permission)),
                    )
                    .service(
                        web::resource("/{permission_id}").route(web::delete().to(crew_chief::revoke_permission)),
                    ),
            )
            .service(
                web::resource("/admin/cache")
                    .route(web::get().to(admin::cache_stats))
                    .route(web::delete().to(admin::clear_cache)),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token};
    use crate::config::test_config;
    use crate::model::role::Role;
    use crate::utils::cache::ShiftCache;
    use actix_web::{App, http::StatusCode, test, web::Data};
    use serde_json::{Value, json};
    use sqlx::mysql::MySqlPoolOptions;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn token(role: Role) -> String {
        let subject = TokenSubject {
            user_id: 7,
            username: "tester".into(),
            role: role.id(),
            company_id: None,
        };
        generate_access_token(&subject, "test-secret", 900).unwrap()
    }

    macro_rules! test_app {
        () => {{
            let config = test_config();
            // never connects unless a handler reaches the database
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(200))
                .connect_lazy(&config.database_url)
                .unwrap();
            let limiters = Limiters::from_config(&config).unwrap();
            let cache = ShiftCache::new(10, Duration::from_secs(30));
            let routes_config = config.clone();
            test::init_service(
                App::new()
                    .app_data(Data::new(pool))
                    .app_data(Data::new(config))
                    .app_data(Data::new(cache))
                    .configure(move |cfg| configure(cfg, &routes_config, limiters.clone())),
            )
            .await
        }};
    }

    #[::core::prelude::v1::test]
    fn limiters_build_for_edge_rates() {
        for rate in [0, 1, 60, 1_000_000] {
            assert!(build_limiter(rate).is_ok(), "rate {rate}/min");
        }
    }

    #[actix_web::test]
    async fn protected_routes_require_a_token() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/shifts")
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn employees_cannot_create_jobs() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/jobs")
            .peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {}", token(Role::Employee))))
            .set_json(json!({ "company_id": 1, "name": "Load-in" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[actix_web::test]
    async fn admin_reads_cache_stats() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/admin/cache")
            .peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {}", token(Role::Admin))))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["entries"], 0);
        assert_eq!(body["data"]["ttl_secs"], 30);
    }

    #[actix_web::test]
    async fn crew_chiefs_cannot_clear_the_cache() {
        let app = test_app!();
        let req = test::TestRequest::delete()
            .uri("/api/v1/admin/cache")
            .peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {}", token(Role::CrewChief))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn malformed_json_is_an_enveloped_bad_request() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .peer_addr(peer())
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[actix_web::test]
    async fn refresh_tokens_are_rejected_on_protected_routes() {
        let app = test_app!();
        let subject = TokenSubject {
            user_id: 7,
            username: "tester".into(),
            role: Role::Admin.id(),
            company_id: None,
        };
        let (refresh, _) = crate::auth::jwt::generate_refresh_token(&subject, "test-secret", 900).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/v1/admin/cache")
            .peer_addr(peer())
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
