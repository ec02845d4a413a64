//! HTTP trigger surface.
//!
//! `POST /eth-data/new-block` extracts one block synchronously and returns its
//! transfers without persisting them. `POST /eth-data/fetch-historic-data`
//! opens a backfill job.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::backfill::BackfillCoordinator;
use crate::error::BackfillError;
use crate::extractor::TransferExtractor;
use crate::repository::DataType;

#[derive(Clone)]
pub struct HttpState {
    pub extractor: Arc<TransferExtractor>,
    pub coordinator: Arc<BackfillCoordinator>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockRequest {
    pub block_num: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchHistoricDataRequest {
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
}

pub fn create_http_router(state: HttpState) -> Router {
    Router::new()
        .route("/eth-data", get(index_handler))
        .route("/eth-data/new-block", post(new_block_handler))
        .route("/eth-data/fetch-historic-data", post(fetch_historic_data_handler))
        .with_state(Arc::new(state))
}

async fn index_handler() -> &'static str {
    info!("GET /eth-data");
    "Hi from eth-data"
}

async fn new_block_handler(
    State(state): State<Arc<HttpState>>,
    Json(body): Json<NewBlockRequest>,
) -> Response {
    let Some(block_num) = body.block_num.filter(|block| *block > 0) else {
        return (StatusCode::BAD_REQUEST, "Missing blockNum").into_response();
    };

    match state.extractor.extract_range(block_num, block_num).await {
        Ok(transfers) => {
            info!("Extracted {} transfers for block {}", transfers.len(), block_num);
            (StatusCode::OK, Json(transfers)).into_response()
        }
        Err(e) => {
            error!("Failed to extract block {}: {:#}", block_num, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Unknown error").into_response()
        }
    }
}

async fn fetch_historic_data_handler(
    State(state): State<Arc<HttpState>>,
    Json(body): Json<FetchHistoricDataRequest>,
) -> Response {
    let (Some(start_block), Some(end_block), Some(data_type)) = (
        body.start_block.filter(|block| *block > 0),
        body.end_block.filter(|block| *block > 0),
        body.data_type,
    ) else {
        return (StatusCode::BAD_REQUEST, "Missing startBlock, endBlock, or type").into_response();
    };

    let data_type = match data_type.parse::<DataType>() {
        Ok(data_type) => data_type,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.coordinator.start(start_block, end_block, data_type).await {
        Ok(_) => (StatusCode::OK, "Data fetching initialized").into_response(),
        Err(BackfillError::InvalidRequest(reason)) => {
            (StatusCode::BAD_REQUEST, reason).into_response()
        }
        Err(e) => {
            error!("Failed to start historic data fetch: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
