//! Shared fixtures: shell-script stand-ins for the calibration binaries

#![allow(dead_code)]

use calib_core::application::{CalibrationService, JobRunner};
use calib_core::domain::{
    Calibrator, CalibratorSpec, ExecutableLocation, FieldLocator, OutputPassing, OutputSpec,
    ParameterSpec, ResultSchema,
};
use calib_core::port::{SystemTimeProvider, UuidProvider};
use calib_core::SchedulerConfig;
use calib_infra_system::{ChildOutput, SubprocessLauncher};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Prologue that leaves the `-d` value in `$out` and the `-a` value in `$input`
const ARG_PARSER: &str = r#"out=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    -d) out="$2"; shift ;;
    -a) input="$2"; shift ;;
  esac
  shift
done
report="${out}Calibration.txt"
"#;

/// Write an executable /bin/sh tool; `body` sees `$out`, `$input` and `$report`
pub fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}{}\n", ARG_PARSER, body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Calibrator record for a tool taking `-a <input>` and writing under `-d <prefix>`
pub fn tool_spec(name: &str, executable: &Path, fields: &[(usize, usize, &str)]) -> CalibratorSpec {
    CalibratorSpec {
        name: name.to_string(),
        description: format!("test tool {}", name),
        executable: ExecutableLocation::Absolute {
            path: executable.to_path_buf(),
        },
        parameters: vec![ParameterSpec::value("input", "-a", "input label")],
        output: OutputSpec {
            flag: Some("-d".to_string()),
            passing: OutputPassing::Prefix,
            default_prefix: format!("./{}_", name),
            suffix: "Calibration.txt".to_string(),
            keep: false,
        },
        schema: ResultSchema::new(
            fields
                .iter()
                .map(|(line, token, field)| FieldLocator::new(*line, *token, *field))
                .collect(),
        )
        .unwrap(),
        series: vec![],
    }
}

/// Calibrator writing its report into `dir` under a label-specific prefix
pub fn calibrator(spec: &CalibratorSpec, dir: &Path, label: &str) -> Calibrator {
    let executable = match &spec.executable {
        ExecutableLocation::Absolute { path } => path.clone(),
        other => panic!("test specs use absolute paths, got {:?}", other),
    };
    let mut cal = Calibrator::new(spec.clone(), executable);
    cal.set_label(label);
    cal.set("input", label).unwrap();
    cal.set_output_prefix(dir.join(format!("{}_", label)).display().to_string());
    cal
}

pub fn service(max_concurrency: usize, poll_ms: u64) -> CalibrationService {
    let launcher = Arc::new(SubprocessLauncher::new().with_output(ChildOutput::Discard));
    let runner = Arc::new(JobRunner::new(launcher, Arc::new(SystemTimeProvider)));
    CalibrationService::new(
        runner,
        Arc::new(UuidProvider),
        SchedulerConfig::new(max_concurrency, Duration::from_millis(poll_ms)).unwrap(),
    )
}
