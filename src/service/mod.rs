pub mod canonicalizer;
pub mod error;
pub mod fallback;
pub mod matching_service;
pub mod performance;
pub mod queue_service;
pub mod resilience;
pub mod result_store;
pub mod scoring;
pub mod selector;
pub mod travel_service;
pub mod variants;
pub mod webhook;
pub mod weights;
