use crate::naming::NamingConvention;
use crate::predictor::{
    Device, Fold, ModelReference, PredictionRequest, PredictorEnvironment,
    DEFAULT_PREDICTOR_PROGRAM,
};
use crate::RelayError;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Name of the working folder created inside the output folder by default.
pub const DEFAULT_WORK_DIR_NAME: &str = ".relay_work";

/// nnU-Net's single-dash long options and their spelling here.
const NNUNET_SPELLINGS: &[(&str, &str)] = &[
    ("-tr", "--trainer"),
    ("-step_size", "--step-size"),
    ("-chk", "--checkpoint"),
    ("-npp", "--npp"),
    ("-nps", "--nps"),
    ("-num_parts", "--num-parts"),
    ("-part_id", "--part-id"),
    ("-device", "--device"),
    ("-prev_stage_predictions", "--prev-stage-predictions"),
];

/// Rewrite nnU-Net's single-dash long options (`-tr`, `-chk`, ...) so clap
/// does not read them as a short flag plus value, e.g. `-d evice`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let spelled = arg.to_str().and_then(|a| {
                NNUNET_SPELLINGS
                    .iter()
                    .find(|(nnunet, _)| *nnunet == a)
                    .map(|(_, long)| OsString::from(*long))
            });
            spelled.unwrap_or(arg)
        })
        .collect()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "nnunet-relay")]
#[command(
    about = "Run nnU-Net inference on a folder of arbitrarily named images",
    long_about = "Copies every image in the input folder under an nnU-Net compliant name \
                  (<case>_0000<ending>), runs the trained model from the model folder on it, \
                  and renames the predicted segmentations back to the original file names."
)]
pub struct Cli {
    /// Input folder with the images to segment
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output folder. Created if missing. Segmentations get their source image's name
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Model root folder (nnunet_results layout)
    #[arg(short = 'm', long = "model")]
    pub model: PathBuf,

    /// Dataset id used to locate the trained model
    #[arg(short = 'd', long = "dataset")]
    pub dataset: String,

    /// nnU-Net configuration, e.g. 3d_fullres
    #[arg(short = 'c', long = "configuration")]
    pub configuration: String,

    /// Plans identifier
    #[arg(short = 'p', long = "plans", default_value = "nnUNetPlans")]
    pub plans: String,

    /// Trainer class used for training (also -tr)
    #[arg(long = "trainer", alias = "tr", default_value = "nnUNetTrainer")]
    pub trainer: String,

    /// Folds to ensemble; integers or `all`
    #[arg(short = 'f', long = "folds", num_args = 1.., default_values = ["0", "1", "2", "3", "4"])]
    pub folds: Vec<String>,

    /// Sliding window step size, in (0, 1]
    #[arg(long = "step-size", alias = "step_size", default_value_t = 0.5)]
    pub step_size: f64,

    /// Checkpoint file name (also -chk)
    #[arg(long = "checkpoint", alias = "chk", default_value = "checkpoint_final.pth")]
    pub checkpoint: String,

    /// Processes used for preprocessing
    #[arg(long = "npp", default_value_t = 3)]
    pub npp: usize,

    /// Processes used for segmentation export
    #[arg(long = "nps", default_value_t = 3)]
    pub nps: usize,

    /// Predictions of the previous stage, for cascaded models
    #[arg(long = "prev-stage-predictions", alias = "prev_stage_predictions")]
    pub prev_stage_predictions: Option<PathBuf>,

    /// Number of separate invocations splitting this input folder
    #[arg(long = "num-parts", alias = "num_parts", default_value_t = 1)]
    pub num_parts: usize,

    /// Which part this invocation handles, from 0 to num_parts - 1
    #[arg(long = "part-id", alias = "part_id", default_value_t = 0)]
    pub part_id: usize,

    /// Device to run inference on
    #[arg(long = "device", value_enum, default_value_t = Device::Cuda)]
    pub device: Device,

    /// Disable mirroring test time augmentation
    #[arg(long = "disable-tta", alias = "disable_tta")]
    pub disable_tta: bool,

    /// Disable the predictor's progress bar
    #[arg(long = "disable-progress-bar", alias = "disable_progress_bar")]
    pub disable_progress_bar: bool,

    /// Export class probabilities next to the segmentations
    #[arg(long = "save-probabilities", alias = "save_probabilities")]
    pub save_probabilities: bool,

    /// Continue an aborted run without overwriting finished outputs
    #[arg(long = "continue-prediction", alias = "continue_prediction")]
    pub continue_prediction: bool,

    /// Debug logging here and verbose output from the predictor
    #[arg(long = "verbose")]
    pub verbose: bool,

    /// Working folder for renamed copies [default: <output>/.relay_work]
    #[arg(long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Suffix of the dataset folder below the model root
    #[arg(long = "model-family", default_value = "DLMUSEV2")]
    pub model_family: String,

    /// Copy renaming.json into the output folder before cleanup
    #[arg(long = "keep-manifest")]
    pub keep_manifest: bool,

    /// Leave the working folder in place after a successful run
    #[arg(long = "keep-work-dir")]
    pub keep_work_dir: bool,

    /// Image endings the model reads (the dataset's file_ending). Other images are skipped
    #[arg(
        long = "file-ending",
        alias = "file_ending",
        num_args = 1..,
        default_values = [".nii.gz"]
    )]
    pub file_endings: Vec<String>,

    /// Predictor executable
    #[arg(
        long = "predictor",
        env = "NNUNET_RELAY_PREDICTOR",
        default_value = DEFAULT_PREDICTOR_PROGRAM
    )]
    pub predictor: PathBuf,

    /// nnUNet_raw for the predictor process
    #[arg(long = "raw-root", env = "NNUNET_RELAY_RAW", default_value = "/nnunet_raw")]
    pub raw_root: PathBuf,

    /// nnUNet_preprocessed for the predictor process
    #[arg(
        long = "preprocessed-root",
        env = "NNUNET_RELAY_PREPROCESSED",
        default_value = "/nnunet_preprocessed"
    )]
    pub preprocessed_root: PathBuf,

    /// nnUNet_results for the predictor process
    #[arg(
        long = "results-root",
        env = "NNUNET_RELAY_RESULTS",
        default_value = "/nnunet_results"
    )]
    pub results_root: PathBuf,
}

/// What happens to the working folder once restoration succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    RemoveOnSuccess,
    Keep,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub work_dir: PathBuf,
    pub model: ModelReference,
    pub folds: Vec<Fold>,
    pub checkpoint: String,
    pub device: Device,
    pub step_size: f64,
    pub disable_tta: bool,
    pub disable_progress_bar: bool,
    pub save_probabilities: bool,
    pub continue_prediction: bool,
    pub verbose: bool,
    pub npp: usize,
    pub nps: usize,
    pub prev_stage_predictions: Option<PathBuf>,
    pub num_parts: usize,
    pub part_id: usize,
    pub keep_manifest: bool,
    pub cleanup: CleanupPolicy,
    pub predictor_program: PathBuf,
    pub environment: PredictorEnvironment,
    pub convention: NamingConvention,
}

impl Cli {
    /// Check argument combinations. Runs before anything touches the disk.
    pub fn into_config(self) -> Result<RelayConfig, RelayError> {
        if self.num_parts == 0 {
            return Err(RelayError::Config("num_parts must be at least 1".to_string()));
        }
        if self.part_id >= self.num_parts {
            return Err(RelayError::Config(format!(
                "part_id ({}) must be smaller than num_parts ({})",
                self.part_id, self.num_parts
            )));
        }
        if !(self.step_size > 0.0 && self.step_size <= 1.0) {
            return Err(RelayError::Config(format!(
                "step_size must be in (0, 1], got {}",
                self.step_size
            )));
        }
        if self.npp == 0 || self.nps == 0 {
            return Err(RelayError::Config("npp and nps must be at least 1".to_string()));
        }
        if self.folds.is_empty() {
            return Err(RelayError::Config("at least one fold is required".to_string()));
        }
        if self.file_endings.iter().any(|e| e.trim_start_matches('.').is_empty()) {
            return Err(RelayError::Config("file ending must not be empty".to_string()));
        }
        let folds = self
            .folds
            .iter()
            .map(|f| f.parse::<Fold>())
            .collect::<Result<Vec<_>, _>>()?;

        let work_dir = self
            .work_dir
            .unwrap_or_else(|| self.output.join(DEFAULT_WORK_DIR_NAME));

        Ok(RelayConfig {
            model: ModelReference {
                root: self.model,
                dataset: self.dataset,
                family: self.model_family,
                trainer: self.trainer,
                plans: self.plans,
                configuration: self.configuration,
            },
            input: self.input,
            output: self.output,
            work_dir,
            folds,
            checkpoint: self.checkpoint,
            device: self.device,
            step_size: self.step_size,
            disable_tta: self.disable_tta,
            disable_progress_bar: self.disable_progress_bar,
            save_probabilities: self.save_probabilities,
            continue_prediction: self.continue_prediction,
            verbose: self.verbose,
            npp: self.npp,
            nps: self.nps,
            prev_stage_predictions: self.prev_stage_predictions,
            num_parts: self.num_parts,
            part_id: self.part_id,
            keep_manifest: self.keep_manifest,
            cleanup: if self.keep_work_dir {
                CleanupPolicy::Keep
            } else {
                CleanupPolicy::RemoveOnSuccess
            },
            predictor_program: self.predictor,
            environment: PredictorEnvironment {
                raw: self.raw_root,
                preprocessed: self.preprocessed_root,
                results: self.results_root,
            },
            convention: NamingConvention::nnunet().with_input_endings(&self.file_endings),
        })
    }
}

impl RelayConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(crate::manifest::MANIFEST_FILE_NAME)
    }

    pub fn prediction_request(&self) -> PredictionRequest {
        PredictionRequest {
            input_folder: self.work_dir.clone(),
            output_folder: self.output.clone(),
            model_folder: self.model.folder(),
            folds: self.folds.clone(),
            checkpoint: self.checkpoint.clone(),
            device: self.device,
            step_size: self.step_size,
            disable_tta: self.disable_tta,
            verbose: self.verbose,
            save_probabilities: self.save_probabilities,
            continue_prediction: self.continue_prediction,
            num_processes_preprocessing: self.npp,
            num_processes_segmentation_export: self.nps,
            prev_stage_predictions: self.prev_stage_predictions.clone(),
            num_parts: self.num_parts,
            part_id: self.part_id,
            disable_progress_bar: self.disable_progress_bar,
        }
    }
}
