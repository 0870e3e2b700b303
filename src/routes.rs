use crate::{
    api::absence,
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::AbsenceError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    middleware::{Condition, from_fn},
    web,
};

// Helper to build per-route limiter; a rate of 0 disables it
fn build_limiter(requests_per_min: u32) -> Condition<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let burst = requests_per_min.max(1);
    let per_ms = 60_000 / burst as u64;

    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("burst size and period are non-zero");

    Condition::new(requests_per_min > 0, Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Extractor failures share the error shape of the handlers
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AbsenceError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AbsenceError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| AbsenceError::bad_request(err.to_string()).into()),
    );

    // Public routes
    cfg.service(
        web::scope("/auth").service(
            web::resource("/login")
                .wrap(build_limiter(config.rate_login_per_min))
                .route(web::post().to(handlers::login)),
        ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(build_limiter(config.rate_protected_per_min)) // rate limiting
            .service(
                web::scope("/absences")
                    // /absences
                    .service(
                        web::resource("")
                            .route(web::post().to(absence::create_absence))
                            .route(web::get().to(absence::list_absences)),
                    )
                    // /absences/today/{user_id}
                    .service(
                        web::resource("/today/{user_id}")
                            .route(web::post().to(absence::create_today_absence)),
                    )
                    // fixed segments must be registered before /{id}
                    .service(
                        web::resource("/today").route(web::get().to(absence::today_absences)),
                    )
                    .service(
                        web::resource("/needing-justification")
                            .route(web::get().to(absence::needing_justification)),
                    )
                    // /absences/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(absence::get_absence))
                            .route(web::delete().to(absence::delete_absence)),
                    )
                    .service(
                        web::resource("/{id}/justify")
                            .route(web::patch().to(absence::justify_absence)),
                    )
                    .service(
                        web::resource("/{id}/validate")
                            .route(web::patch().to(absence::validate_absence)),
                    )
                    .service(
                        web::resource("/{id}/justify-with-files")
                            .route(web::post().to(absence::justify_with_files)),
                    )
                    .service(
                        web::resource("/{id}/justification-file")
                            .route(web::get().to(absence::download_justification_file)),
                    ),
            ),
    );
}
