//! Library end-to-end: trace file on disk through the pipeline into each sink.

use std::fs::File;
use std::io::BufReader;

use insta::assert_snapshot;
use smog_trace::TraceError;
use smog_trace::pipeline::{Pipeline, PipelineOptions};
use smog_trace::sinks::{
    BitmapSink, HistogramSink, ParquetTableWriter, PngImageWriter, TableTarget, TabularSink,
};
use smog_trace::trace::{PageState, TraceFile, TraceFormat};

use crate::{encode, sample_frames, vma, write_sample_trace};

#[test]
fn histogram_report_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let trace = TraceFile::open(&write_sample_trace(dir.path()), TraceFormat::Named).unwrap();

    let report = Pipeline::new(&trace, PipelineOptions::default())
        .run(HistogramSink::new())
        .unwrap();

    let mut out = Vec::new();
    report.write_report(4096, &mut out).unwrap();
    assert_snapshot!(String::from_utf8(out).unwrap(), @r"
    VMA [stack]
    0x7ff0000 : 2; 2; 1
    VMA heap
    0x100000 : 1; 0; 0
    0x101000 : 1; 1; 0
    0x102000 : 2; 2; 2
    0x103000 : 1; 0; 0
    ");
}

#[test]
fn bitmap_spans_every_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let trace = TraceFile::open(&write_sample_trace(dir.path()), TraceFormat::Named).unwrap();
    let path = dir.path().join("out.png");

    let image = PngImageWriter::new(File::create(&path).unwrap());
    Pipeline::new(&trace, PipelineOptions::default())
        .run(BitmapSink::new(image))
        .unwrap();

    let decoder = png::Decoder::new(BufReader::new(File::open(&path).unwrap()));
    let reader = decoder.read_info().unwrap();
    // heap 0x100..=0x103, anonymous 0x200..=0x203, stack 0x7ff0
    assert_eq!((reader.info().width, reader.info().height), (9, 2));
}

#[test]
fn single_frame_two_pages_png() {
    let frames = vec![smog_trace::trace::Frame {
        vmas: vec![vma(100, Some("anon"), &[PageState::Committed, PageState::Dirty])],
        ..Default::default()
    }];
    let trace = TraceFile::from_bytes(encode(&frames, TraceFormat::Named), TraceFormat::Named)
        .unwrap();

    let png = Pipeline::new(&trace, PipelineOptions::default())
        .run(BitmapSink::new(PngImageWriter::new(Vec::new())))
        .unwrap()
        .into_inner();

    let mut reader = png::Decoder::new(std::io::Cursor::new(png))
        .read_info()
        .unwrap();
    let mut pixels = [0u8; 6];
    reader.next_frame(&mut pixels).unwrap();
    assert_eq!(pixels, [0, 255, 255, 255, 0, 0]);
}

#[test]
fn legacy_traces_decode_without_names() {
    let bytes = encode(&sample_frames(), TraceFormat::Legacy);
    let trace = TraceFile::from_bytes(bytes, TraceFormat::Legacy).unwrap();

    assert_eq!(trace.frame_count(), 2);
    let frame = trace.frame(0).unwrap();
    assert!(frame.vmas.iter().all(|v| v.name.is_none()));
    assert_eq!(frame.vmas[0].page_state(2), PageState::Dirty);

    // Nothing is named, so the histogram is empty.
    let report = Pipeline::new(&trace, PipelineOptions::default())
        .run(HistogramSink::new())
        .unwrap();
    assert_eq!(report.regions().count(), 0);
}

/// One legacy frame: a record spanning 20 pages that declares 1, and two
/// records spanning the whole address space with no bitmap at all.
fn mismatched_legacy_trace() -> TraceFile {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0; 8]);
    buf.extend_from_slice(&3u32.to_le_bytes());
    for (start, end, declared, words) in [
        (0x40u64, 0x54u64, 1u32, &[0b11u32][..]),
        (0, u64::MAX, 0, &[]),
        (0, u64::MAX, 0, &[]),
    ] {
        buf.extend_from_slice(&start.to_le_bytes());
        buf.extend_from_slice(&end.to_le_bytes());
        buf.extend_from_slice(&declared.to_le_bytes());
        for word in words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
    }
    TraceFile::from_bytes(buf, TraceFormat::Legacy).unwrap()
}

#[test]
fn mismatched_legacy_records_convert_with_every_sink() {
    let trace = mismatched_legacy_trace();
    assert_eq!(trace.stats().mismatches, 3);
    assert_eq!(trace.stats().pages, 16);
    let pipeline = Pipeline::new(&trace, PipelineOptions::default());

    let png = pipeline
        .run(BitmapSink::new(PngImageWriter::new(Vec::new())))
        .unwrap()
        .into_inner();
    let reader = png::Decoder::new(std::io::Cursor::new(png))
        .read_info()
        .unwrap();
    assert_eq!((reader.info().width, reader.info().height), (16, 1));

    let writer = ParquetTableWriter::new(Vec::new()).unwrap();
    let summary = pipeline
        .run(TabularSink::new(TableTarget::Shared(Box::new(writer))))
        .unwrap();
    assert_eq!(summary.rows, 16);

    let report = pipeline.run(HistogramSink::new()).unwrap();
    assert_eq!(report.regions().count(), 0);
}

#[test]
fn single_parquet_table_counts_every_page() {
    let dir = tempfile::tempdir().unwrap();
    let trace = TraceFile::open(&write_sample_trace(dir.path()), TraceFormat::Named).unwrap();
    let writer = ParquetTableWriter::new(File::create(dir.path().join("all.parquet")).unwrap())
        .unwrap();

    let summary = Pipeline::new(&trace, PipelineOptions::default())
        .run(TabularSink::new(TableTarget::Shared(Box::new(writer))))
        .unwrap();

    assert_eq!(summary.rows, 3 + 1 + 4 + 2 + 1);
    assert_eq!(summary.tables, 1);
}

#[test]
fn filter_restricts_histogram() {
    let dir = tempfile::tempdir().unwrap();
    let trace = TraceFile::open(&write_sample_trace(dir.path()), TraceFormat::Named).unwrap();
    let options = PipelineOptions {
        vma_filter: Some("heap".into()),
        threads: Some(1),
    };

    let report = Pipeline::new(&trace, options)
        .run(HistogramSink::new())
        .unwrap();

    let names: Vec<_> = report.regions().map(|(name, _)| name).collect();
    assert_eq!(names, ["heap"]);
}

#[test]
fn truncated_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sample_trace(dir.path());
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let err = TraceFile::open(&path, TraceFormat::Named).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TraceError>(),
        Some(TraceError::TruncatedInput { frame: Some(1), .. })
    ));
}
