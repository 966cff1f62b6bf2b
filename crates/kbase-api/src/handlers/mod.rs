//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod health;
pub mod ingest;
pub mod query;

use crate::error::AppError;
use axum::extract::FromRequest;

/// JSON body extractor whose rejections render as `ApiError`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
