//! Prediction service and its HTTP surface.
//!
//! A request moves through [`RequestStage`]s: the body is validated into a
//! [`FeatureRecord`](crate::features::FeatureRecord), the model for the
//! requested version is resolved, the record is encoded against that model's
//! schema and priced. Any failure ends the request in `Errored` and is
//! returned as `{"error": ...}`.

pub mod info;
pub mod request;
pub mod server;
pub mod service;

pub use info::ServiceInfo;
pub use request::{parse_predict_body, ErrorResponse, PredictResponse, RequestStage};
pub use server::{router, run_prediction_server, ApiError, AppState, RefreshResponse};
pub use service::PredictionService;
