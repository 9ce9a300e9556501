use super::gate::with_principal;
use super::handler;
use super::handler::REFRESH_COOKIE;
use crate::server::Server;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let signup = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("signup"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(server.account_service.clone()))
        .and_then(handler::signup);

    let login = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(server.account_service.clone()))
        .and(with(server.token_service.clone()))
        .and_then(handler::login);

    let refresh = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(with(server.token_service.clone()))
        .and_then(handler::refresh);

    let logout = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(with(server.token_service.clone()))
        .and_then(handler::logout);

    let logout_all = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("logout_all"))
        .and(warp::path::end())
        .and(with_principal(server.auth_gate.clone()))
        .and(with(server.token_service.clone()))
        .and_then(handler::logout_all);

    let me = warp::get()
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(with_principal(server.auth_gate.clone()))
        .and_then(handler::me);

    signup.or(login).or(refresh).or(logout).or(logout_all).or(me)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}
