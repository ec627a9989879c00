use crate::{
    api::{attendance, student, teacher},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter config
    fn build_limiter(requests_per_min: u32) -> GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap()
    }

    let login_limiter = build_limiter(config.rate_login_per_min);
    let register_limiter = build_limiter(config.rate_register_per_min);
    let refresh_limiter = build_limiter(config.rate_refresh_per_min);
    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(Governor::new(&login_limiter))
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(Governor::new(&register_limiter))
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(Governor::new(&refresh_limiter))
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(Governor::new(&login_limiter))
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(Governor::new(&protected_limiter)) // rate limiting
            .service(
                web::scope("/teacher")
                    .service(
                        web::resource("/profile")
                            .route(web::get().to(teacher::get_profile))
                            .route(web::put().to(teacher::update_profile)),
                    )
                    .service(
                        web::resource("/change-password")
                            .route(web::put().to(teacher::change_password)),
                    ),
            )
            .service(
                web::scope("/students")
                    // /students
                    .service(
                        web::resource("")
                            .route(web::get().to(student::list_students))
                            .route(web::post().to(student::add_student)),
                    )
                    // literal segments before the {id} matcher
                    .service(
                        web::resource("/download/csv")
                            .route(web::get().to(student::download_students_csv)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(student::get_student))
                            .route(web::put().to(student::update_student))
                            .route(web::delete().to(student::delete_student)),
                    )
                    .service(
                        web::resource("/{id}/register-face")
                            .route(web::post().to(student::register_face)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance::mark_attendance))
                            .route(web::get().to(attendance::list_attendance)),
                    )
                    .service(
                        web::resource("/today")
                            .route(web::get().to(attendance::today_attendance))
                            .route(web::delete().to(attendance::reset_today)),
                    )
                    .service(
                        web::resource("/date/{date}")
                            .route(web::get().to(attendance::attendance_by_date)),
                    )
                    .service(
                        web::resource("/download/today")
                            .route(web::get().to(attendance::download_today_csv)),
                    )
                    .service(
                        web::resource("/download/{date}")
                            .route(web::get().to(attendance::download_csv_by_date)),
                    )
                    // Face recognition attendance
                    .service(
                        web::resource("/face")
                            .route(web::post().to(attendance::face_attendance)),
                    )
                    .service(
                        web::resource("/face-multiple")
                            .route(web::post().to(attendance::face_multiple_attendance)),
                    )
                    .service(
                        web::resource("/face-status")
                            .route(web::get().to(attendance::face_status)),
                    )
                    .service(
                        web::resource("/{id}/roster")
                            .route(web::get().to(attendance::download_roster_csv)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /refresh with refresh_token
//       └─ returns new access_token
