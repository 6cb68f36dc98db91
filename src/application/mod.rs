// Application layer - Use cases, polling and chart lifecycle
pub mod chart_registry;
pub mod control_service;
pub mod dashboard_service;
pub mod poll_scheduler;
pub mod query_builder;
pub mod telemetry_repository;
pub mod transform;
