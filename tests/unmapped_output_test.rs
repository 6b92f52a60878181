use clap::Parser;
use nnunet_relay::config::Cli;
use nnunet_relay::naming::NamingConvention;
use nnunet_relay::pipeline::Pipeline;
use nnunet_relay::predictor::{PredictionRequest, PredictorLike, StubPredictor};
use nnunet_relay::restorer::{UnmappedOutput, UnmappedReason};
use nnunet_relay::RelayError;
use std::fs;

/// Behaves like nnU-Net: segmentations plus its own bookkeeping files, and
/// one stray output for a case nobody asked about.
struct ChattyPredictor {
    inner: StubPredictor,
}

impl PredictorLike for ChattyPredictor {
    fn predict(&mut self, request: &PredictionRequest) -> Result<(), RelayError> {
        self.inner.predict(request)?;
        fs::write(request.output_folder.join("plans.json"), b"{}")?;
        fs::write(request.output_folder.join("dataset.json"), b"{}")?;
        fs::write(request.output_folder.join("0099.nii.gz"), b"stray")?;
        Ok(())
    }
}

#[test]
fn test_unmapped_outputs_do_not_fail_the_run() {
    let test_dir = tempfile::tempdir().unwrap();
    let input = test_dir.path().join("in");
    let output = test_dir.path().join("out");
    let models = test_dir.path().join("models");
    fs::create_dir_all(&input).unwrap();
    let model_folder = models.join("Dataset1_Task1_DLMUSEV2");
    fs::create_dir_all(model_folder.join("nnUNetTrainer__nnUNetPlans__2d")).unwrap();
    fs::write(input.join("knee.nii.gz"), b"knee").unwrap();

    let config = Cli::try_parse_from([
        "nnunet-relay",
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "-m",
        models.to_str().unwrap(),
        "-d",
        "1",
        "-c",
        "2d",
    ])
    .unwrap()
    .into_config()
    .unwrap();

    let predictor = ChattyPredictor {
        inner: StubPredictor::new(NamingConvention::nnunet()),
    };
    let summary = Pipeline::new(config, predictor).run().unwrap();

    assert_eq!(summary.restored, vec![("0000.nii.gz".to_string(), "knee.nii.gz".to_string())]);
    assert_eq!(
        summary.unmapped,
        vec![
            UnmappedOutput {
                file_name: "0099.nii.gz".to_string(),
                reason: UnmappedReason::UnknownCase
            },
            UnmappedOutput {
                file_name: "dataset.json".to_string(),
                reason: UnmappedReason::NotAnOutput
            },
            UnmappedOutput {
                file_name: "plans.json".to_string(),
                reason: UnmappedReason::NotAnOutput
            },
        ]
    );
    assert_eq!(fs::read(output.join("knee.nii.gz")).unwrap(), b"knee");
    assert_eq!(fs::read(output.join("0099.nii.gz")).unwrap(), b"stray");
    assert!(output.join("plans.json").exists());
}
