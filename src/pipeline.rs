use crate::config::{CleanupPolicy, RelayConfig};
use crate::file_handler::{prepare, remove_if_exists, same_location};
use crate::manifest::{build_manifests, ForwardManifest, MANIFEST_FILE_NAME};
use crate::mapper::{copy_cases, plan_cases};
use crate::naming::OutputKind;
use crate::predictor::PredictorLike;
use crate::restorer::{check_targets, restore, RestoreOptions, UnmappedOutput};
use crate::RelayError;
use std::collections::HashSet;
use std::fs;
use tracing::{info, info_span, warn};

/// Outcome of one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cases: usize,
    pub restored: Vec<(String, String)>,
    pub unmapped: Vec<UnmappedOutput>,
    pub skipped: Vec<String>,
    /// Original names of cases the predictor wrote no segmentation for.
    pub missing: Vec<String>,
    pub prediction_skipped: bool,
}

/// map -> check targets -> prepare -> persist -> predict -> restore -> cleanup,
/// strictly in that order. Nothing is written before the target check passes.
/// Any later error stops the run and leaves the working folder as is.
pub struct Pipeline<P: PredictorLike> {
    config: RelayConfig,
    predictor: P,
}

impl<P: PredictorLike> Pipeline<P> {
    pub fn new(config: RelayConfig, predictor: P) -> Self {
        Self { config, predictor }
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn into_predictor(self) -> P {
        self.predictor
    }

    /// Checks that need no filesystem mutation.
    fn preflight(&self) -> Result<(), RelayError> {
        let config = &self.config;
        if !config.input.is_dir() {
            return Err(RelayError::invalid_path(
                &config.input,
                "input folder does not exist or is not a directory",
            ));
        }
        let model_folder = config.model.folder();
        if !model_folder.is_dir() {
            return Err(RelayError::invalid_path(model_folder, "trained model folder not found"));
        }
        if same_location(&config.input, &config.output) {
            return Err(RelayError::Config("input and output folders must differ".to_string()));
        }
        if same_location(&config.input, &config.work_dir)
            || same_location(&config.output, &config.work_dir)
        {
            return Err(RelayError::Config(
                "working folder must differ from the input and output folders".to_string(),
            ));
        }
        if config.work_dir.exists() && !config.work_dir.is_dir() {
            return Err(RelayError::invalid_path(&config.work_dir, "exists and is not a directory"));
        }
        Ok(())
    }

    /// Manifest of an aborted earlier run, if continuing one.
    fn previous_manifest(&self) -> Result<Option<ForwardManifest>, RelayError> {
        let path = self.config.manifest_path();
        if !self.config.continue_prediction || !path.is_file() {
            return Ok(None);
        }
        info!(path = %path.display(), "found manifest of an earlier run");
        ForwardManifest::load(&path).map(Some)
    }

    pub fn run(&mut self) -> Result<RunSummary, RelayError> {
        self.preflight()?;
        let config = &self.config;
        let convention = &config.convention;
        let options = RestoreOptions {
            restore_auxiliary: config.save_probabilities,
            overwrite: !config.continue_prediction,
        };

        let previous = self.previous_manifest()?;

        let (case_count, inverse) = {
            let _span = info_span!("map", input = %config.input.display()).entered();
            let cases = plan_cases(&config.input, convention)?;
            let (forward, inverse) = build_manifests(&cases)?;

            if let Some(previous) = previous {
                if previous != forward {
                    return Err(RelayError::Config(format!(
                        "input folder changed since the aborted run recorded in {}; \
                         its outputs would be restored to the wrong names. \
                         Rerun without --continue-prediction",
                        config.manifest_path().display()
                    )));
                }
            }
            check_targets(&config.output, &inverse, convention, options)?;

            prepare(&config.output)?;
            remove_if_exists(&config.work_dir)?;
            prepare(&config.work_dir)?;
            copy_cases(&config.input, &config.work_dir, &cases)?;
            forward.persist(&config.manifest_path())?;
            info!(
                path = %config.manifest_path().display(),
                cases = cases.len(),
                "renaming manifest saved"
            );
            (cases.len(), inverse)
        };

        let mut summary = RunSummary {
            cases: case_count,
            ..RunSummary::default()
        };

        if case_count == 0 {
            warn!(input = %config.input.display(), "no input images found, skipping prediction");
            summary.prediction_skipped = true;
        } else {
            let request = config.prediction_request();
            let _span = info_span!("predict", model = %request.model_folder.display()).entered();
            self.predictor.predict(&request)?;
        }

        let report = restore(&config.output, &inverse, convention, options)?;
        let segmented: HashSet<String> = report
            .restored
            .iter()
            .filter_map(|(from, _)| convention.parse_output(from))
            .filter(|parsed| parsed.kind == OutputKind::Segmentation)
            .map(|parsed| parsed.case_id)
            .collect();
        let missing: Vec<String> = inverse
            .cases()
            .filter(|case| !segmented.contains(&case.case_id))
            .map(|case| case.original_name.clone())
            .collect();
        if !missing.is_empty() && !summary.prediction_skipped {
            if config.num_parts == 1 {
                warn!(expected = case_count, ?missing, "no segmentation for some inputs");
            } else {
                // Other parts cover the rest
                info!(part = config.part_id, ?missing, "cases not segmented by this part");
            }
        }

        if config.keep_manifest {
            fs::copy(config.manifest_path(), config.output.join(MANIFEST_FILE_NAME))?;
        }
        if config.cleanup == CleanupPolicy::RemoveOnSuccess {
            remove_if_exists(&config.work_dir)?;
        }

        summary.restored = report.restored;
        summary.unmapped = report.unmapped;
        summary.skipped = report.skipped;
        summary.missing = missing;
        Ok(summary)
    }
}
