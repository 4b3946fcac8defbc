use crate::metrics::{HTTP_RESPONSES, REGISTRY};
use prometheus::{Encoder, TextEncoder};

use warp::http::header::CONTENT_TYPE;

#[tracing::instrument]
pub fn metrics_endpoint() -> impl warp::Reply {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut result = Vec::new();
    encoder.encode(&metric_families, &mut result).ok();

    warp::reply::with_header(result, CONTENT_TYPE, encoder.format_type().to_owned())
}

pub fn track_status(info: warp::log::Info) {
    HTTP_RESPONSES
        .with_label_values(&[info.status().as_str()])
        .inc();
}
