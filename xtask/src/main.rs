use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;

const DEFAULT_SCHEMA_PATH: &str = "sar_schema/probability_report.schema.json";

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("export-schema") => {
            let out = args
                .next()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH));
            export_schema(&out)
        }
        Some("validate") => match args.next() {
            Some(pattern) => validate_reports(&pattern),
            None => {
                print_usage();
                std::process::exit(1);
            }
        },
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown xtask '{cmd}'.");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: cargo xtask export-schema [path]");
    eprintln!("       cargo xtask validate <glob>");
    eprintln!("       cargo xtask help");
}

fn export_schema(out: &Path) -> Result<(), Box<dyn Error>> {
    let schema = serde_json::to_string_pretty(&sar_schema::report_schema())?;
    if let Some(parent) = out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, schema)?;
    println!("Wrote report schema to {}", out.display());
    Ok(())
}

fn validate_reports(pattern: &str) -> Result<(), Box<dyn Error>> {
    let compiled = compile_report_schema()?;

    let mut checked = 0usize;
    let mut failed = 0usize;
    for entry in glob::glob(pattern)? {
        let path = entry?;
        let instance: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        checked += 1;
        let errors = validation_errors(&compiled, &instance);
        if !errors.is_empty() {
            failed += 1;
            for error in errors {
                eprintln!("{}: {error}", path.display());
            }
        }
    }

    if checked == 0 {
        return Err(format!("no reports matched '{pattern}'").into());
    }
    if failed > 0 {
        return Err(format!("{failed} of {checked} reports failed validation").into());
    }
    println!("{checked} reports valid");
    Ok(())
}

fn compile_report_schema() -> Result<JSONSchema, Box<dyn Error>> {
    let schema = serde_json::to_value(sar_schema::report_schema())?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| format!("invalid report schema: {err}"))?;
    Ok(compiled)
}

fn validation_errors(schema: &JSONSchema, instance: &serde_json::Value) -> Vec<String> {
    let result = schema.validate(instance);
    match result {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|error| format!("{error} at {}", error.instance_path))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use sar_schema::{GridMetadata, LatLon, ProbabilityReport, TerrainStatus};

    use super::*;

    fn report() -> ProbabilityReport {
        ProbabilityReport::new(
            GridMetadata {
                width: 1,
                height: 1,
                cell_size_m: 100.0,
                origin_lat: 51.0,
                origin_lon: -115.0,
                lat_step_deg: -0.0009,
                lon_step_deg: 0.0014,
            },
            LatLon {
                lat: 51.0,
                lon: -115.0,
            },
            TerrainStatus {
                elevation: "synthetic".to_string(),
                elevation_tile: None,
                layers: vec!["elevation".to_string()],
                degraded: Vec::new(),
            },
            1e-4,
        )
    }

    #[test]
    fn generated_report_passes_schema() {
        let compiled = compile_report_schema().expect("schema");
        let instance = serde_json::to_value(report()).expect("json");
        assert!(validation_errors(&compiled, &instance).is_empty());
    }

    #[test]
    fn missing_frames_fail_schema() {
        let compiled = compile_report_schema().expect("schema");
        let mut instance = serde_json::to_value(report()).expect("json");
        instance.as_object_mut().expect("object").remove("frames");
        assert!(!validation_errors(&compiled, &instance).is_empty());
    }
}
