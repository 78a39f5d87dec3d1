//! Route declarations.
//!
//! Each declaration pairs the admission policy of a route with its handler,
//! so the route table and the handler router come from one list.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method};
use axum::routing::{get, post, MethodRouter};
use axum::Extension;

use crate::auth::{Identity, Role};
use crate::http::handlers::{self, accounts, captcha};
use crate::http::server::AppState;
use crate::routing::RouteSpec;
use crate::session::SessionHandle;

pub struct Route {
    pub spec: RouteSpec,
    pub handler: MethodRouter<AppState>,
}

fn account_path(role: Role, action: &str) -> String {
    format!("/api/v1/{}/{action}", role.route_slug())
}

fn account_routes(role: Role) -> Vec<Route> {
    let name = role.as_str();
    vec![
        Route {
            spec: RouteSpec::credential_submission(Method::POST, account_path(role, &format!("register{name}"))),
            handler: post(move |state: State<AppState>, headers: HeaderMap, body: Bytes| {
                accounts::register(state, role, headers, body)
            }),
        },
        Route {
            spec: RouteSpec::credential_submission(Method::POST, account_path(role, &format!("login{name}"))),
            handler: post(move |state: State<AppState>, headers: HeaderMap, body: Bytes| {
                accounts::login(state, role, headers, body)
            }),
        },
        Route {
            spec: RouteSpec::gated(Method::GET, account_path(role, &format!("logout{name}")), role),
            handler: get(
                move |state: State<AppState>,
                      identity: Extension<Identity>,
                      session: Extension<SessionHandle>| {
                    accounts::logout(state, role, identity, session)
                },
            ),
        },
        Route {
            spec: RouteSpec::gated(Method::GET, account_path(role, &format!("get{name}Profile")), role),
            handler: get(accounts::profile),
        },
    ]
}

/// Every route the gateway serves.
pub fn declare() -> Vec<Route> {
    let mut routes = vec![
        Route {
            spec: RouteSpec::open(Method::GET, "/"),
            handler: get(handlers::hello),
        },
        Route {
            spec: RouteSpec::open(Method::GET, "/captcha"),
            handler: get(captcha::challenge),
        },
        Route {
            spec: RouteSpec::open(Method::POST, "/captcha/verify"),
            handler: post(captcha::verify),
        },
    ];
    routes.extend(Role::ALL.into_iter().flat_map(account_routes));
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_its_account_routes() {
        let routes = declare();
        assert_eq!(routes.len(), 3 + 4 * Role::ALL.len());

        let login = routes
            .iter()
            .find(|r| r.spec.path == "/api/v1/user/loginUser")
            .unwrap();
        assert_eq!(login.spec.method, Method::POST);
        assert!(login.spec.lockout);
        assert_eq!(login.spec.required_role, None);

        let profile = routes
            .iter()
            .find(|r| r.spec.path == "/api/v1/doctor/getDoctorProfile")
            .unwrap();
        assert_eq!(profile.spec.required_role, Some(Role::Doctor));
        assert!(!profile.spec.lockout);
    }

    #[test]
    fn test_paths_are_unique() {
        let routes = declare();
        let mut paths: Vec<_> = routes.iter().map(|r| r.spec.path.as_str()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), routes.len());
    }
}
