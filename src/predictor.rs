use crate::file_handler::list_file_names;
use crate::naming::NamingConvention;
use crate::RelayError;
use clap::ValueEnum;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info};

pub const DEFAULT_PREDICTOR_PROGRAM: &str = "nnUNetv2_predict_from_modelfolder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Device {
    Cuda,
    Cpu,
    Mps,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
            Device::Mps => "mps",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trained fold index, or the model trained on all data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    Index(u32),
    All,
}

impl fmt::Display for Fold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fold::Index(i) => write!(f, "{}", i),
            Fold::All => f.write_str("all"),
        }
    }
}

impl FromStr for Fold {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Fold::All);
        }
        s.parse::<u32>()
            .map(Fold::Index)
            .map_err(|_| {
                RelayError::Config(format!("fold must be an integer or 'all', got: {}", s))
            })
    }
}

/// Where a trained model lives below the model root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReference {
    pub root: PathBuf,
    pub dataset: String,
    pub family: String,
    pub trainer: String,
    pub plans: String,
    pub configuration: String,
}

impl ModelReference {
    /// `<root>/Dataset<d>_Task<d>_<family>/<trainer>__<plans>__<configuration>`
    pub fn folder(&self) -> PathBuf {
        self.root
            .join(format!("Dataset{}_Task{}_{}", self.dataset, self.dataset, self.family))
            .join(format!("{}__{}__{}", self.trainer, self.plans, self.configuration))
    }
}

/// Roots nnU-Net reads from its own environment variables. Applied to the
/// predictor's process only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorEnvironment {
    pub raw: PathBuf,
    pub preprocessed: PathBuf,
    pub results: PathBuf,
}

impl Default for PredictorEnvironment {
    fn default() -> Self {
        Self {
            raw: PathBuf::from("/nnunet_raw"),
            preprocessed: PathBuf::from("/nnunet_preprocessed"),
            results: PathBuf::from("/nnunet_results"),
        }
    }
}

impl PredictorEnvironment {
    pub fn vars(&self) -> [(&'static str, &Path); 3] {
        [
            ("nnUNet_raw", self.raw.as_path()),
            ("nnUNet_preprocessed", self.preprocessed.as_path()),
            ("nnUNet_results", self.results.as_path()),
        ]
    }
}

/// Everything handed to the predictor for one folder-to-folder run.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub model_folder: PathBuf,
    pub folds: Vec<Fold>,
    pub checkpoint: String,
    pub device: Device,
    pub step_size: f64,
    pub disable_tta: bool,
    pub verbose: bool,
    pub save_probabilities: bool,
    pub continue_prediction: bool,
    pub num_processes_preprocessing: usize,
    pub num_processes_segmentation_export: usize,
    pub prev_stage_predictions: Option<PathBuf>,
    pub num_parts: usize,
    pub part_id: usize,
    pub disable_progress_bar: bool,
}

pub trait PredictorLike {
    /// Segment every case in `request.input_folder` into
    /// `request.output_folder`. Blocks until done.
    fn predict(&mut self, request: &PredictionRequest) -> Result<(), RelayError>;
}

/// Runs nnU-Net's folder prediction entry point as a child process.
pub struct NnUnetCli {
    program: PathBuf,
    environment: PredictorEnvironment,
}

impl NnUnetCli {
    pub fn new(program: impl Into<PathBuf>, environment: PredictorEnvironment) -> Self {
        Self {
            program: program.into(),
            environment,
        }
    }

    /// The command that `predict` runs, without spawning it.
    pub fn command(&self, request: &PredictionRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(&request.input_folder)
            .arg("-o")
            .arg(&request.output_folder)
            .arg("-m")
            .arg(&request.model_folder)
            .arg("-f")
            .args(request.folds.iter().map(|f| f.to_string()))
            .arg("-step_size")
            .arg(request.step_size.to_string())
            .arg("-chk")
            .arg(&request.checkpoint)
            .arg("-npp")
            .arg(request.num_processes_preprocessing.to_string())
            .arg("-nps")
            .arg(request.num_processes_segmentation_export.to_string())
            .arg("-num_parts")
            .arg(request.num_parts.to_string())
            .arg("-part_id")
            .arg(request.part_id.to_string())
            .arg("-device")
            .arg(request.device.as_str());

        if let Some(prev) = &request.prev_stage_predictions {
            cmd.arg("-prev_stage_predictions").arg(prev);
        }
        for (flag, enabled) in [
            ("--disable_tta", request.disable_tta),
            ("--verbose", request.verbose),
            ("--save_probabilities", request.save_probabilities),
            ("--continue_prediction", request.continue_prediction),
            ("--disable_progress_bar", request.disable_progress_bar),
        ] {
            if enabled {
                cmd.arg(flag);
            }
        }
        for (key, value) in self.environment.vars() {
            cmd.env(key, value);
        }
        cmd
    }
}

impl PredictorLike for NnUnetCli {
    fn predict(&mut self, request: &PredictionRequest) -> Result<(), RelayError> {
        let mut cmd = self.command(request);
        info!(
            program = %self.program.display(),
            model = %request.model_folder.display(),
            "starting predictor"
        );
        debug!(command = ?cmd, "predictor command");

        let status = cmd.status().map_err(|e| {
            RelayError::Predictor(format!(
                "could not execute '{}' \
                 (set NNUNET_RELAY_PREDICTOR or --predictor to override): {}",
                self.program.display(),
                e
            ))
        })?;
        if !status.success() {
            return Err(RelayError::Predictor(format!(
                "'{}' failed with {}",
                self.program.display(),
                status
            )));
        }
        Ok(())
    }
}

/// Stand-in predictor: writes one output per canonical input, named the way
/// nnU-Net names them, with the input bytes as content.
pub struct StubPredictor {
    convention: NamingConvention,
    output_ending: Option<String>,
    pub requests: Vec<PredictionRequest>,
}

impl StubPredictor {
    pub fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            output_ending: None,
            requests: Vec::new(),
        }
    }

    /// Write outputs with this ending instead of the input's.
    pub fn with_output_ending(mut self, ending: &str) -> Self {
        self.output_ending = Some(ending.to_string());
        self
    }
}

impl PredictorLike for StubPredictor {
    fn predict(&mut self, request: &PredictionRequest) -> Result<(), RelayError> {
        self.requests.push(request.clone());
        fs::create_dir_all(&request.output_folder)?;

        for name in list_file_names(&request.input_folder)? {
            let Some((case_id, ending)) = self.convention.parse_canonical_input(&name) else {
                continue;
            };
            let ending = self.output_ending.clone().unwrap_or(ending);
            let output_name = self.convention.output_name(&case_id, &ending);
            let output_path = request.output_folder.join(&output_name);
            if request.continue_prediction && output_path.exists() {
                continue;
            }
            fs::copy(request.input_folder.join(&name), &output_path)?;
            if request.save_probabilities {
                let probabilities = request.output_folder.join(format!("{}.npz", case_id));
                fs::write(probabilities, b"probabilities")?;
            }
        }
        Ok(())
    }
}
