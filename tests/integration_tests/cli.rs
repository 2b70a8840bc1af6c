//! Integration tests for the smog-trace binary.

use std::path::Path;
use std::process::{Command, Output};

use crate::write_sample_trace;

/// Run the binary with an isolated (absent) config file unless one is given.
fn smog_trace(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smog-trace"))
        .args(args)
        .env("SMOG_TRACE_CONFIG_PATH", dir.join("no-config.toml"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run smog-trace")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn histogram_report() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let out = dir.path().join("hist.txt");

    let output = smog_trace(
        dir.path(),
        &[
            trace.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-f",
            "histogram",
        ],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    let report = std::fs::read_to_string(&out).unwrap();
    assert!(report.starts_with("VMA [stack]\n0x7ff0000 : 2; 2; 1\n"), "{report}");
    assert!(report.contains("0x102000 : 2; 2; 2"));
    assert!(stderr(&output).contains("found 2 named VMAs with 2 ranges and 5 pages, sized 20 KiB"));
}

#[test]
fn page_size_from_flag_and_config() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let out = dir.path().join("hist.txt");
    let args = [
        trace.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
        "--format",
        "histogram",
    ];

    let output = smog_trace(dir.path(), &[&args[..], &["--page-size", "2MiB"]].concat());
    assert!(output.status.success(), "{}", stderr(&output));
    let report = std::fs::read_to_string(&out).unwrap();
    assert!(report.contains("0x20000000 : 1; 0; 0"), "{report}");

    let config = dir.path().join("config.toml");
    std::fs::write(&config, "page-size = \"8KiB\"\n").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_smog-trace"))
        .args(args)
        .env("SMOG_TRACE_CONFIG_PATH", &config)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let report = std::fs::read_to_string(&out).unwrap();
    assert!(report.contains("0x200000 : 1; 0; 0"), "{report}");
}

#[test]
fn png_output() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let out = dir.path().join("frames.png");

    let output = smog_trace(
        dir.path(),
        &[trace.to_str().unwrap(), "-o", out.to_str().unwrap(), "-f", "png", "-j", "2"],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn parquet_per_frame_files() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let tables = dir.path().join("tables");
    std::fs::create_dir(&tables).unwrap();
    let template = tables.join("frame-%s.parquet");

    let output = smog_trace(
        dir.path(),
        &[trace.to_str().unwrap(), "-o", template.to_str().unwrap(), "-f", "parquet"],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    let mut names: Vec<String> = std::fs::read_dir(&tables)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2, "{names:?}");
    assert!(names[0].starts_with("frame-20"), "{names:?}");
    assert!(names[0].ends_with(".000250.parquet"), "{names:?}");
    assert!(stderr(&output).contains("Wrote 11 rows to 2 parquet files"));
}

#[test]
fn parquet_single_table() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let out = dir.path().join("all.parquet");

    let output = smog_trace(
        dir.path(),
        &[
            trace.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-f",
            "parquet",
            "--single-table",
        ],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(out.exists());
    assert!(stderr(&output).contains("Wrote 11 rows to 1 parquet file"));
}

#[test]
fn per_frame_template_needs_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());

    let output = smog_trace(
        dir.path(),
        &[trace.to_str().unwrap(), "-o", "frame.parquet", "-f", "parquet"],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("must contain '%s'"), "{}", stderr(&output));
}

#[test]
fn invalid_page_size_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());

    for size in ["lots", "3000"] {
        let output = smog_trace(
            dir.path(),
            &[
                trace.to_str().unwrap(),
                "-o",
                "out.txt",
                "-f",
                "histogram",
                "--page-size",
                size,
            ],
        );
        assert_eq!(output.status.code(), Some(2), "size {size}: {}", stderr(&output));
    }
}

#[test]
fn legacy_page_count_mismatch_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("legacy.smog");
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0; 8]);
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&0x40u64.to_le_bytes());
    buf.extend_from_slice(&0x54u64.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&0b11u32.to_le_bytes());
    std::fs::write(&trace, buf).unwrap();
    let out = dir.path().join("legacy.png");

    let output = smog_trace(
        dir.path(),
        &[
            trace.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-f",
            "png",
            "--legacy-format",
        ],
    );

    assert!(output.status.success(), "{}", stderr(&output));
    let stderr = stderr(&output);
    assert!(stderr.contains("declares 1 pages, spans 20"), "{stderr}");
    assert!(stderr.contains("mismatched page count: 1"), "{stderr}");
    assert!(out.exists());
}

#[test]
fn truncated_trace_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_sample_trace(dir.path());
    let bytes = std::fs::read(&trace).unwrap();
    std::fs::write(&trace, &bytes[..bytes.len() - 1]).unwrap();

    let output = smog_trace(
        dir.path(),
        &[
            trace.to_str().unwrap(),
            "-o",
            dir.path().join("out.txt").to_str().unwrap(),
            "-f",
            "histogram",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("Failed to index"), "{stderr}");
    assert!(stderr.contains("truncated input in frame #1"), "{stderr}");
}

#[test]
fn missing_trace_file() {
    let dir = tempfile::tempdir().unwrap();

    let output = smog_trace(
        dir.path(),
        &["/nonexistent/trace.smog", "-o", "out.txt", "-f", "png"],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to read"));
}
