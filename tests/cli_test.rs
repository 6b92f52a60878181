use std::fs;
use std::path::Path;
use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_nnunet-relay");

fn base_args(root: &Path) -> Vec<String> {
    let input = root.join("input");
    let output = root.join("output");
    let models = root.join("models");
    fs::create_dir_all(&input).unwrap();
    let model_folder = models.join("Dataset5_Task5_DLMUSEV2");
    fs::create_dir_all(model_folder.join("nnUNetTrainer__nnUNetPlans__3d_fullres")).unwrap();
    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "-m".to_string(),
        models.to_string_lossy().to_string(),
        "-d".to_string(),
        "5".to_string(),
        "-c".to_string(),
        "3d_fullres".to_string(),
    ]
}

#[test]
fn test_part_id_not_below_num_parts_exits_nonzero_without_side_effects() {
    let test_dir = tempfile::tempdir().unwrap();
    let mut args = base_args(test_dir.path());
    args.extend(["--num-parts", "2", "--part-id", "2"].map(String::from));

    let out = Command::new(BIN).args(&args).output().expect("Failed to run binary");

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("part_id"));
    assert!(!test_dir.path().join("output").exists());
}

#[test]
fn test_unknown_device_exits_nonzero() {
    let test_dir = tempfile::tempdir().unwrap();
    let mut args = base_args(test_dir.path());
    args.extend(["--device", "tpu"].map(String::from));

    let out = Command::new(BIN).args(&args).output().expect("Failed to run binary");
    assert!(!out.status.success());
    assert!(!test_dir.path().join("output").exists());
}

/// Drives the real subprocess adapter with a shell script standing in for
/// nnU-Net. The script checks that the root variables reached it.
#[cfg(unix)]
#[test]
fn test_full_run_with_scripted_predictor() {
    use std::os::unix::fs::PermissionsExt;

    let test_dir = tempfile::tempdir().unwrap();
    let script = test_dir.path().join("fake_predict.sh");
    fs::write(
        &script,
        r#"#!/bin/sh
set -e
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ "$nnUNet_results" = "/opt/results" ] || exit 3
mkdir -p "$out"
for f in "$in"/*_0000.nii.gz; do
  id=$(basename "$f" _0000.nii.gz)
  cp "$f" "$out/$id.nii.gz"
done
echo '{}' > "$out/plans.json"
"#,
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let args = base_args(test_dir.path());
    let input = test_dir.path().join("input");
    let output = test_dir.path().join("output");
    fs::write(input.join("patientA.nii.gz"), b"A").unwrap();
    fs::write(input.join("patientB.nii.gz"), b"B").unwrap();

    let out = Command::new(BIN)
        .args(&args)
        .arg("--predictor")
        .arg(&script)
        .env("NNUNET_RELAY_RESULTS", "/opt/results")
        .output()
        .expect("Failed to run binary");

    assert!(
        out.status.success(),
        "relay failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(String::from_utf8_lossy(&out.stdout).contains("Inference done"));
    assert_eq!(fs::read(output.join("patientA.nii.gz")).unwrap(), b"A");
    assert_eq!(fs::read(output.join("patientB.nii.gz")).unwrap(), b"B");
    assert!(output.join("plans.json").exists());
    assert!(!output.join(".relay_work").exists());
}

#[cfg(unix)]
#[test]
fn test_failing_predictor_keeps_work_dir() {
    use std::os::unix::fs::PermissionsExt;

    let test_dir = tempfile::tempdir().unwrap();
    let script = test_dir.path().join("broken.sh");
    fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let args = base_args(test_dir.path());
    fs::write(test_dir.path().join("input").join("x.nii.gz"), b"x").unwrap();

    let out = Command::new(BIN)
        .args(&args)
        .arg("--predictor")
        .arg(&script)
        .output()
        .expect("Failed to run binary");

    assert!(!out.status.success());
    let work = test_dir.path().join("output").join(".relay_work");
    assert!(work.join("0000_0000.nii.gz").exists());
    assert!(work.join("renaming.json").exists());
}

/// nnU-Net's own single-dash spellings reach the predictor unchanged in meaning.
#[cfg(unix)]
#[test]
fn test_nnunet_single_dash_options() {
    use std::os::unix::fs::PermissionsExt;

    let test_dir = tempfile::tempdir().unwrap();
    let recorded = test_dir.path().join("args.txt");
    let script = test_dir.path().join("record.sh");
    fs::write(&script, "#!/bin/sh\necho \"$@\" > \"$RECORD_ARGS\"\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let args = base_args(test_dir.path());
    fs::create_dir_all(
        test_dir
            .path()
            .join("models/Dataset5_Task5_DLMUSEV2/MyTrainer__nnUNetPlans__3d_fullres"),
    )
    .unwrap();
    fs::write(test_dir.path().join("input").join("x.nii.gz"), b"x").unwrap();

    let out = Command::new(BIN)
        .args(&args)
        .args(["-tr", "MyTrainer", "-chk", "checkpoint_best.pth", "-device", "cpu"])
        .arg("--predictor")
        .arg(&script)
        .env("RECORD_ARGS", &recorded)
        .output()
        .expect("Failed to run binary");

    assert!(
        out.status.success(),
        "relay failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let seen = fs::read_to_string(&recorded).unwrap();
    assert!(seen.contains("MyTrainer__nnUNetPlans__3d_fullres"), "{}", seen);
    assert!(seen.contains("-chk checkpoint_best.pth"), "{}", seen);
    assert!(seen.contains("-device cpu"), "{}", seen);
}
