use std::io::Write;
use std::process::{Command, Output};

fn cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ballistics-cli"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_trajectory_basic() {
    let output = cli(&["trajectory", "--velocity", "2700", "--bc", "0.475", "--range", "500"]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Range(yd)"), "Should contain table header: {}", stdout);
    assert!(stdout.contains("Terminated: range reached"));
}

#[test]
fn test_cli_help() {
    let output = cli(&["--help"]);

    assert!(output.status.success(), "Help command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["trajectory", "zero", "max-range", "apex", "info"] {
        assert!(stdout.contains(command), "Should list {} command", command);
    }
}

#[test]
fn test_cli_invalid_command() {
    let output = cli(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_cli_zero_missing_distance() {
    let output = cli(&["zero"]);
    assert!(!output.status.success(), "Should fail with missing --distance");
}

#[test]
fn test_cli_output_format_json() {
    let output = cli(&["trajectory", "--range", "300", "--zero", "100", "--output", "json"]);

    assert!(output.status.success(), "Command should succeed");
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    let rows = rows.as_array().expect("array of rows");
    assert!(rows.len() >= 4);
    let zero_down = rows
        .iter()
        .filter(|r| r["flags"].as_array().unwrap().iter().any(|f| f == "ZERO_DOWN"))
        .count();
    assert_eq!(zero_down, 1);
}

#[test]
fn test_cli_output_format_csv() {
    let output = cli(&["trajectory", "--bc", "0.245", "--drag-model", "g7", "--range", "600", "-o", "csv"]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert!(lines.next().unwrap().starts_with("time_s,distance_ft,velocity_fps"));
    assert!(lines.count() >= 7);
}

#[test]
fn test_cli_zero_json() {
    let output = cli(&["zero", "--distance", "100", "-o", "json"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let elevation = report["elevation_rad"].as_f64().unwrap();
    assert!(elevation > 0.0 && elevation < 0.01);
}

#[test]
fn test_cli_zero_beyond_max_range_fails() {
    let output = cli(&["zero", "--velocity", "1000", "--bc", "0.2", "--distance", "100000", "--method", "ridder"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OutOfRange"), "{}", stderr);
}

#[test]
fn test_cli_zero_lofted_needs_bracketed_method() {
    let output = cli(&["zero", "--distance", "300", "--lofted", "--method", "damped"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--lofted"), "{}", stderr);

    let output = cli(&["zero", "--distance", "300", "--lofted", "--method", "ridder", "-o", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["elevation_rad"].as_f64().unwrap() > 0.5);
}

#[test]
fn test_cli_apex_requires_elevation() {
    let output = cli(&["apex"]);
    assert!(!output.status.success());

    let output = cli(&["apex", "--elevation", "5", "-o", "json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["height_ft"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_cli_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"step_multiplier": 2.0, "minimum_velocity": 2500}}"#).unwrap();

    let output = cli(&[
        "trajectory",
        "--config",
        file.path().to_str().unwrap(),
        "--range",
        "2000",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Terminated: minimum velocity"), "{}", stdout);
}

#[test]
fn test_cli_rejects_bad_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"step_multiplier": -1.0}}"#).unwrap();

    let output = cli(&["info", "--config", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_shot_file_and_integrators() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "bc": 0.243,
            "drag_model": "G7",
            "muzzle_velocity_fps": 2650,
            "sight_height_in": 1.5,
            "winds": [{{"velocity_fps": 14.67, "direction_from_rad": 1.5708, "until_distance_ft": 1e6}}]
        }}"#
    )
    .unwrap();

    for integrator in ["euler", "rk4", "rk45"] {
        let output = cli(&[
            "trajectory",
            "--shot",
            file.path().to_str().unwrap(),
            "--integrator",
            integrator,
            "--range",
            "300",
            "-o",
            "json",
        ]);
        assert!(output.status.success(), "{} failed", integrator);
        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let last = rows.as_array().unwrap().last().unwrap();
        // Wind from the left pushes the bullet right
        assert!(last["windage"].as_f64().unwrap() > 0.0, "{}", integrator);
    }
}
