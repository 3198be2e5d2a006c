pub mod reconcile;

pub use reconcile::{FileCheck, ReconcileStats, ScanReconciler};
