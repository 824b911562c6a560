use crate::{
    api::{audit, component, dashboard, employee, loan, payroll},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{id}/toggle")
                            .route(web::put().to(employee::toggle_employee)),
                    )
                    .service(
                        web::resource("/{id}/payrolls")
                            .route(web::get().to(employee::payroll_history)),
                    )
                    .service(
                        web::resource("/{id}/compensation")
                            .route(web::post().to(component::assign_component))
                            .route(web::get().to(component::list_assignments)),
                    ),
            )
            .service(
                web::scope("/component")
                    .service(
                        web::resource("")
                            .route(web::post().to(component::create_component))
                            .route(web::get().to(component::list_components)),
                    )
                    .service(
                        web::resource("/{id}").route(web::put().to(component::update_component))
                            .route(web::delete().to(component::delete_component)),
                    )
                    .service(
                        web::resource("/{id}/toggle")
                            .route(web::put().to(component::toggle_component)),
                    ),
            )
            .service(
                web::scope("/compensation")
                    .service(
                        web::resource("/{id}/toggle")
                            .route(web::put().to(component::toggle_assignment)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::delete().to(component::delete_assignment)),
                    ),
            )
            .service(
                web::scope("/loan")
                    .service(
                        web::resource("")
                            .route(web::post().to(loan::apply_loan))
                            .route(web::get().to(loan::list_loans)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(loan::get_loan))
                            .route(web::delete().to(loan::delete_loan)),
                    )
                    .service(
                        web::resource("/{id}/approve").route(web::put().to(loan::approve_loan)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(loan::reject_loan)),
                    )
                    .service(
                        web::resource("/{id}/payment").route(web::post().to(loan::submit_payment)),
                    ),
            )
            .service(
                web::scope("/payment")
                    .service(
                        web::resource("/{id}/approve").route(web::put().to(loan::approve_payment)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(loan::reject_payment)),
                    ),
            )
            .service(
                web::scope("/payroll")
                    .service(
                        web::resource("")
                            .route(web::post().to(payroll::create_payroll))
                            .route(web::get().to(payroll::list_payrolls)),
                    )
                    // fixed segments go before the {id} matcher
                    .service(
                        web::resource("/candidates")
                            .route(web::get().to(payroll::settlement_candidates)),
                    )
                    .service(
                        web::resource("/bulk_approve")
                            .route(web::post().to(payroll::bulk_approve_payrolls)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll::get_payroll))
                            .route(web::put().to(payroll::update_payroll))
                            .route(web::delete().to(payroll::delete_payroll)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(payroll::approve_payroll)),
                    ),
            )
            .service(
                web::scope("/dashboard")
                    .service(web::resource("").route(web::get().to(dashboard::dashboard))),
            )
            .service(
                web::scope("/audit")
                    .service(web::resource("").route(web::get().to(audit::list_audit_logs))),
            ),
    );
}
