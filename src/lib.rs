//! snapwarden: retention sweeps and write-frozen snapshots of one block
//! volume backing a database.
//!
//! - `retention`: pure classifier (snapshots + policy + now -> delete plan).
//! - `coordinator`: validate -> freeze -> create -> poll -> release.
//! - `cleanup`: list/classify/delete run over a `SnapshotStore`.

// Модель и политика
pub mod model;
pub mod policy;
pub mod error;
pub mod config;

// Ядро
pub mod retention;
pub mod coordinator;
pub mod cleanup;

// Коллабораторы (backend, freeze) и окружение
pub mod store;
pub mod freeze;
pub mod clock;
pub mod lock;
pub mod metrics;

// Удобные реэкспорты
pub use cleanup::{run_cleanup, CleanupReport};
pub use clock::{Clock, SystemClock};
pub use config::SnapConfig;
pub use coordinator::{
    BackupReport, CoordinationOutcome, CoordinatorSettings, CoordinatorState, FreezePlan,
    SnapshotLifecycleCoordinator,
};
pub use error::{ConfigError, PolicyError, SnapshotError};
pub use freeze::{HostFreezeController, WriteFreezeController};
pub use model::{LifecycleState, SnapshotRecord, VolumeInfo};
pub use policy::RetentionPolicy;
pub use retention::{classify, Classification, DeletionPlan, RetentionClassifier};
pub use store::{FileSnapshotStore, SnapshotStore};
