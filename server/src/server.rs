use serde::Serialize;
use shared::DatasetKind;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::header::HeaderValue;
use warp::http::{Response, StatusCode};
use warp::{Filter, Rejection, Reply};

use crate::cache::Cache;
use crate::metrics::Metrics;

pub const DEFAULT_SKIP: usize = 0;
pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_SKIP: usize = 400_000;
pub const MIN_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 400_000;

pub async fn run(address: std::net::SocketAddr, cache: Cache, metrics: Arc<Metrics>) {
    log::info!("Serving on {}", address);
    warp::serve(routes(cache, metrics)).run(address).await
}

pub fn routes(
    cache: Cache,
    metrics: Arc<Metrics>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_cache(cache.clone()))
        .and_then(health);

    let metrics_route = warp::path!("metrics")
        .and(warp::get())
        .and(with_metrics(metrics.clone()))
        .and_then(render_metrics);

    let features_route = warp::path!(DatasetKind)
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_cache(cache))
        .and_then(features);

    let observer = warp::log::custom(move |info| {
        metrics.observe(
            info.method().as_str(),
            info.path(),
            info.status().as_u16(),
            info.elapsed(),
        )
    });

    health_route
        .or(metrics_route)
        .or(features_route)
        .recover(rejection)
        .with(observer)
}

fn with_cache(cache: Cache) -> impl Filter<Extract = (Cache,), Error = Infallible> + Clone {
    warp::any().map(move || cache.clone())
}

fn with_metrics(
    metrics: Arc<Metrics>,
) -> impl Filter<Extract = (Arc<Metrics>,), Error = Infallible> + Clone {
    warp::any().map(move || metrics.clone())
}

pub async fn render_metrics(metrics: Arc<Metrics>) -> Result<impl Reply, Rejection> {
    let body = metrics
        .render()
        .map_err(|e| warp::reject::custom(Error(e.into())))?;

    Response::builder()
        .header(
            "Content-Type",
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )
        .body(body)
        .map_err(|e| warp::reject::custom(Error(e.into())))
}

#[derive(Serialize)]
struct Status {
    status: &'static str,
}

pub async fn health(cache: Cache) -> Result<impl Reply, Rejection> {
    if cache.is_ready() {
        log::debug!("Health check ok");
        Ok(warp::reply::json(&Status {
            status: "everything good",
        }))
    } else {
        log::error!("Health check failed: cache not loaded");
        Err(warp::reject::custom(NotReady))
    }
}

pub async fn features(
    kind: DatasetKind,
    params: HashMap<String, String>,
    cache: Cache,
) -> Result<impl Reply, Rejection> {
    let page = if kind.is_paginated() {
        Page::from_params(&params).map_err(warp::reject::custom)?
    } else {
        Page::default()
    };

    cache
        .get(kind, page.skip, page.limit)
        .await
        .map(|page| warp::reply::json(&page))
        .ok_or_else(|| warp::reject::custom(NotReady))
}

/// Pagination window of the paginated datasets.
#[derive(Debug, PartialEq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Page, InvalidPage> {
        let skip = bounded(params, "skip", DEFAULT_SKIP, 0, MAX_SKIP)?;
        let limit = bounded(params, "limit", DEFAULT_LIMIT, MIN_LIMIT, MAX_LIMIT)?;
        Ok(Page { skip, limit })
    }
}

fn bounded(
    params: &HashMap<String, String>,
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, InvalidPage> {
    let Some(raw) = params.get(name) else {
        return Ok(default);
    };
    // Parsed as signed so that negative input is reported as out of range
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= min as i64 && value <= max as i64 => Ok(value as usize),
        _ => Err(InvalidPage(format!(
            "{} must be an integer between {} and {}",
            name, min, max
        ))),
    }
}

#[derive(Debug)]
struct Error(anyhow::Error);
impl warp::reject::Reject for Error {}

#[derive(Debug)]
struct NotReady;
impl warp::reject::Reject for NotReady {}

#[derive(Debug, PartialEq)]
pub struct InvalidPage(String);
impl warp::reject::Reject for InvalidPage {}

#[derive(Serialize)]
struct ErrorMessage {
    code: u16,
    message: String,
}

pub async fn rejection(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(InvalidPage(message)) = err.find() {
        (StatusCode::UNPROCESSABLE_ENTITY, message.clone())
    } else if err.find::<NotReady>().is_some() {
        (StatusCode::SERVICE_UNAVAILABLE, "API not ready".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::error!("Error: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error.".to_string(),
        )
    };

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message,
    });

    Ok(warp::reply::with_status(json, code))
}
