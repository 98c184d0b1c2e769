//! Scan orchestration.
//!
//! Runs scan, classification and planning for the front end and returns one
//! report. Apply and rollback are separate steps the caller triggers after
//! reviewing the plan.

use crate::core::cancel::CancelFlag;
use crate::core::extractor::MetadataExtractor;
use crate::core::planner::Planner;
use crate::core::scanner::scan_source;
use crate::core::store::{self, SharedStore};
use crate::models::config::Config;
use crate::models::report::ScanReport;
use crate::services::classifier::Classifier;
use crate::Result;
use std::path::PathBuf;

/// Reconciliation driver for one configuration.
pub struct Reconciler<C: Classifier> {
    source_root: PathBuf,
    extractor: MetadataExtractor<C>,
    planner: Planner,
    cancel: CancelFlag,
}

impl<C: Classifier> Reconciler<C> {
    /// Create a reconciler from a configuration and a classifier.
    ///
    /// Relative roots are resolved against the working directory.
    pub fn new(config: &Config, classifier: C, cancel: CancelFlag) -> Result<Self> {
        let mut config = config.clone();
        config.absolutize()?;
        Ok(Self {
            source_root: config.source_root.clone(),
            extractor: MetadataExtractor::new(
                classifier,
                config.classifier.clone(),
                config.companions,
            ),
            planner: Planner::new(config.target_root.clone(), config.title_policy),
            cancel,
        })
    }

    /// Scan the source root (or only `folders`), classify and plan.
    ///
    /// A full scan may retire any mapping entry under the source root; a
    /// folder scan only entries under the chosen folders. After cancellation
    /// the plan covers the folders that finished classification.
    pub async fn scan(&self, folders: Option<&[String]>, store: &SharedStore) -> Result<ScanReport> {
        let scanned = scan_source(&self.source_root, folders)?;
        let mut issues = scanned.issues.clone();

        let extraction = self
            .extractor
            .classify_folders(&scanned.folders, &self.cancel)
            .await?;
        issues.extend(extraction.issues);

        let scope = if extraction.cancelled {
            extraction.completed.clone()
        } else if folders.is_some() {
            scanned.scope()
        } else {
            vec![self.source_root.clone()]
        };

        let plan = {
            let guard = store::lock(store)?;
            self.planner
                .plan(extraction.candidates, issues, guard.snapshot(), &scope)
        };

        Ok(ScanReport {
            folders: scanned.folders.iter().map(|f| f.name.clone()).collect(),
            files_scanned: scanned.file_count(),
            plan,
            cancelled: extraction.cancelled,
        })
    }
}
