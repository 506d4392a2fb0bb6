#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use pretty_assertions::assert_eq;

use ocio_toolkit::report::Classification;
use ocio_toolkit::settings::{SettingsOverlay, ToolkitSettings};
use ocio_toolkit::tooling::{BakeParams, ExitStatus, OverwriteDecision, ToolRequest};
use ocio_toolkit::ToolSession;

const CONFIG_XML: &str = r#"<?xml version="1.0"?>
<ocioconfig>
  <colorspace name="ACES"/>
  <colorspace name="sRGB"/>
  <colorspace/>
</ocioconfig>
"#;

#[tokio::test]
async fn validate_success_is_reported_and_audited() {
    let dir = temp_dir("e2e_validate_ok");
    let script = write_script(&dir, "ociocheck.sh", "echo OK\n");
    let config = write_config(&dir);
    let session = session_with(&dir, validate_overlay(script.as_path()));

    let result = session
        .run(&ToolRequest::validate(config.display().to_string()))
        .await
        .expect("run should complete");

    assert_eq!(result.classification, Classification::Success);
    assert_eq!(result.exit_status, Some(ExitStatus::Exited(0)));
    assert_eq!(result.display_text, "OK\n\n");
    assert!(result.audit_line.ends_with(" - validate - config.ocio - success"));
    assert_eq!(read_audit(&dir), vec![result.audit_line.clone()]);
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn validate_failure_keeps_tool_output() {
    let dir = temp_dir("e2e_validate_fail");
    let script = write_script(
        &dir,
        "ociocheck.sh",
        "echo 'checking roles'\necho 'ERROR: missing role' >&2\nexit 2\n",
    );
    let config = write_config(&dir);
    let session = session_with(&dir, validate_overlay(script.as_path()));

    let result = session
        .run(&ToolRequest::validate(config.display().to_string()))
        .await
        .expect("run should complete");

    assert_eq!(result.classification, Classification::ToolFailure);
    assert_eq!(result.exit_status, Some(ExitStatus::Exited(2)));
    assert_eq!(result.display_text, "checking roles\n\nERROR: missing role\n");
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn missing_tool_binary_is_a_launch_failure() {
    let dir = temp_dir("e2e_missing_tool");
    let config = write_config(&dir);
    let session = session_with(
        &dir,
        SettingsOverlay {
            validate_program: Some(dir.join("no-such-ociocheck").display().to_string()),
            ..SettingsOverlay::default()
        },
    );

    let result = session
        .run(&ToolRequest::validate(config.display().to_string()))
        .await
        .expect("run should complete");

    assert_eq!(result.classification, Classification::LaunchFailure);
    assert_eq!(result.exit_status, Some(ExitStatus::DidNotLaunch));
    assert!(result.audit_line.ends_with(" - validate - config.ocio - launch_failure"));
    assert!(!session.is_busy());
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn bake_writes_lut_under_lut_location_with_format_extension() {
    let dir = temp_dir("e2e_bake");
    let script = write_script(&dir, "ociobakelut.sh", "printf 'LUT %s->%s' \"$2\" \"$3\" > \"$1\"\necho baked\n");
    let config = write_config(&dir);
    let luts = dir.join("luts");
    let session = session_with(&dir, bake_overlay(script.as_path(), luts.as_path()));
    session
        .load_catalog(config.as_path())
        .expect("catalog should load");

    let request = ToolRequest::bake(bake_params(config.as_path(), "ACES", "look"));
    let result = session.run(&request).await.expect("run should complete");

    assert_eq!(result.classification, Classification::Success);
    assert_eq!(result.display_text, "baked\n\n");
    let baked = fs::read_to_string(luts.join("shows/look.cube")).expect("lut should be written");
    assert_eq!(baked, "LUT ACES->sRGB");
    assert!(result.audit_line.ends_with(" - bake - look.cube - success"));

    let again = session.run(&request).await.expect("run should complete");
    assert_eq!(again.classification, Classification::ValidationRejected);
    assert!(again.display_text.contains("already exists"));

    let confirmed = session
        .run(&request.clone().with_overwrite(OverwriteDecision::Confirmed))
        .await
        .expect("run should complete");
    assert_eq!(confirmed.classification, Classification::Success);

    let audit = read_audit(&dir);
    assert_eq!(audit.len(), 3);
    assert!(audit[1].ends_with(" - bake - look.cube - validation_rejected"));
    let _ = fs::remove_dir_all(dir);
}

#[tokio::test]
async fn bake_with_undeclared_colorspace_never_runs_the_tool() {
    let dir = temp_dir("e2e_bake_unknown");
    let marker = dir.join("ran");
    let script = write_script(
        &dir,
        "ociobakelut.sh",
        format!("touch '{}'\n", marker.display()).as_str(),
    );
    let config = write_config(&dir);
    let luts = dir.join("luts");
    let session = session_with(&dir, bake_overlay(script.as_path(), luts.as_path()));
    session
        .load_catalog(config.as_path())
        .expect("catalog should load");

    let result = session
        .run(&ToolRequest::bake(bake_params(config.as_path(), "ACEScg", "look")))
        .await
        .expect("run should complete");

    assert_eq!(result.classification, Classification::ValidationRejected);
    assert_eq!(result.exit_status, None);
    assert!(result.display_text.contains("ACEScg"));
    assert!(!marker.exists());
    assert!(!luts.exists());
    let _ = fs::remove_dir_all(dir);
}

fn temp_dir(label: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should be monotonic")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("ocio_toolkit_{label}_{stamp}"));
    fs::create_dir_all(dir.as_path()).expect("temp dir should be created");
    dir
}

// Scripts run through /bin/sh, so they never need the executable bit.
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(path.as_path(), body).expect("script should be written");
    path
}

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.ocio");
    fs::write(path.as_path(), CONFIG_XML).expect("config should be written");
    path
}

fn validate_overlay(script: &Path) -> SettingsOverlay {
    SettingsOverlay {
        validate_program: Some(String::from("/bin/sh")),
        validate_args: Some(vec![
            vec![script.display().to_string()],
            vec![String::from("{config}")],
        ]),
        ..SettingsOverlay::default()
    }
}

fn bake_overlay(script: &Path, luts: &Path) -> SettingsOverlay {
    SettingsOverlay {
        bake_program: Some(String::from("/bin/sh")),
        bake_args: Some(vec![
            vec![script.display().to_string()],
            vec![String::from("{output}")],
            vec![String::from("{input_space}")],
            vec![String::from("{output_space}")],
            vec![String::from("--format={format}"), String::from("{config}")],
            vec![String::from("--shapersize"), String::from("{shaper_size}")],
        ]),
        lut_location: Some(luts.display().to_string()),
        ..SettingsOverlay::default()
    }
}

fn bake_params(config: &Path, input_space: &str, output: &str) -> BakeParams {
    BakeParams {
        config: config.display().to_string(),
        input_space: input_space.to_string(),
        output_space: String::from("sRGB"),
        format: String::from("Cube"),
        shaper_size: None,
        output: format!("shows/{output}"),
    }
}

fn session_with(dir: &Path, overlay: SettingsOverlay) -> ToolSession {
    let overlay = SettingsOverlay {
        audit_log: Some(dir.join("audit.log").display().to_string()),
        ..overlay
    };
    let settings = ToolkitSettings::from_overlay(&overlay).expect("settings should resolve");
    ToolSession::from_settings(&settings)
}

fn read_audit(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("audit.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
