// Domain layer - Panels, series and dashboard catalog
pub mod dashboard;
pub mod duration;
pub mod panel;
pub mod telemetry;
