//! Distributed Cache Service resources and data sources

mod account;
mod backup;
mod common;
mod data_sources;
mod diagnosis_task;
mod instance;
mod key_analysis;
mod migration_task;

pub use account::DcsAccount;
pub use backup::DcsBackup;
pub use data_sources::{DcsAccounts, DcsInstances};
pub use diagnosis_task::DcsDiagnosisTask;
pub use instance::DcsInstance;
pub use key_analysis::{DcsKeyAnalysis, KeyAnalysisKind};
pub use migration_task::DcsBackupImportTask;
