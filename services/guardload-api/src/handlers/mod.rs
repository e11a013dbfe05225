//! HTTP handlers for REST API endpoints

pub mod performance;

pub use performance::{
    delete_history, dry_run, get_history, get_status, list_history, start_test, stop_test,
    ApiError, ErrorResponse, MessageResponse, StartResponse, OPERATOR_HEADER,
};
