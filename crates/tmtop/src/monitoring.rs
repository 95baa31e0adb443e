use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use warp::Filter;

use crate::refresh::Snapshot;

/// Spawns a server which hosts the `/health`, `/ready`, `/metrics` and
/// `/state` endpoints. Returns the address it is bound to.
pub fn spawn_server(
    addr: impl Into<std::net::SocketAddr> + 'static,
    snapshot: watch::Receiver<Snapshot>,
    prometheus_handle: PrometheusHandle,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let server = warp::serve(routes(snapshot, prometheus_handle));
    let (addr, server) = server
        .try_bind_ephemeral(addr)
        .context("Binding monitoring server")?;

    Ok((addr, tokio::spawn(server)))
}

fn routes(
    snapshot: watch::Receiver<Snapshot>,
    prometheus_handle: PrometheusHandle,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    health_route()
        .or(ready_route(snapshot.clone()))
        .or(metrics_route(prometheus_handle))
        .or(state_route(snapshot))
}

/// Always returns `Ok(200)` at `/health`.
fn health_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::get().and(warp::path!("health")).map(warp::reply)
}

/// Returns `Ok` once a consensus state has been built, or
/// `SERVICE_UNAVAILABLE` before that.
fn ready_route(
    snapshot: watch::Receiver<Snapshot>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("ready"))
        .map(move || match snapshot.borrow().state.is_some() {
            true => warp::http::StatusCode::OK,
            false => warp::http::StatusCode::SERVICE_UNAVAILABLE,
        })
}

/// Returns Prometheus metrics snapshot at `/metrics`.
fn metrics_route(
    handle: PrometheusHandle,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("metrics"))
        .map(move || -> PrometheusHandle { handle.clone() })
        .and_then(|handle: PrometheusHandle| async move {
            Ok::<_, std::convert::Infallible>(warp::http::Response::builder().body(handle.render()))
        })
}

/// Returns the latest [Snapshot] as JSON at `/state`.
fn state_route(
    snapshot: watch::Receiver<Snapshot>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("state"))
        .map(move || warp::reply::json(&*snapshot.borrow()))
}
