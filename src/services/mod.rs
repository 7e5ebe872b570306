pub mod batch;
pub mod delivery;
pub mod dispatch;
pub mod rate_limit;
pub mod recency_cache;
pub mod source;
pub mod verifier;
pub mod webhook_service;
