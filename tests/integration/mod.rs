//! Integration tests for the batch orchestration engine

mod api_surface;
mod batch_flow;
mod resilience;
mod test_utils;
