// src/lib.rs
//
// Attendance computation over spreadsheet-backed staff schedules: payload
// normalization, per-cell classification, per-row and per-employee rates,
// leave-tag extraction, and a cached client for the remote sheet API.

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod dates;
pub mod error;
pub mod export;
pub mod leave_tags;
pub mod normalize;
pub mod payload;
pub mod request_cache;
pub mod server;
pub mod session_store;
pub mod sheet_client;
pub mod sheet_service;

mod classifier_tests;
mod sheet_service_tests;

pub use aggregate::{AttendanceStatus, AttendanceSummary, EmployeeAttendance, Ranking};
pub use classifier::ExclusionSets;
pub use config::Config;
pub use error::SheetError;
pub use normalize::{normalize, NormalizeOptions, NormalizedRow, NormalizedSheet};
pub use payload::{LoginResult, RawPayload, RawRow};
pub use sheet_client::{SheetClient, SheetSource};
pub use sheet_service::SheetService;
