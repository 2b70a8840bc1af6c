//! One row per page: `(pageno, is_present, is_dirty)`.

use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use arrow_array::{ArrayRef, BooleanArray, RecordBatch, UInt64Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{WriterProperties, WriterVersion};

use crate::error::TraceError;
use crate::pipeline::{AddressLayout, RangeKeying, Sink};
use crate::trace::{Frame, Timestamp};

/// Rows per parquet row group, and per batch handed to a writer.
pub const ROW_GROUP_ROWS: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRow {
    pub pageno: u64,
    pub is_present: bool,
    pub is_dirty: bool,
}

/// Destination for page rows.
pub trait TableWriter: Send {
    fn write_rows(&mut self, rows: &[PageRow]) -> anyhow::Result<()>;

    /// Flush and close the table, returning the number of rows written.
    fn finish(self: Box<Self>) -> anyhow::Result<u64>;
}

/// Parquet file with schema `pageno: UInt64, is_present: Boolean, is_dirty: Boolean`.
pub struct ParquetTableWriter<W: Write + Send> {
    writer: ArrowWriter<W>,
    schema: SchemaRef,
    rows: u64,
}

impl<W: Write + Send> ParquetTableWriter<W> {
    pub fn new(out: W) -> anyhow::Result<Self> {
        let schema = Self::schema();
        let props = WriterProperties::builder()
            .set_max_row_group_size(ROW_GROUP_ROWS)
            .set_compression(Compression::SNAPPY)
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_created_by("smog-trace".to_string())
            .build();
        let writer = ArrowWriter::try_new(out, schema.clone(), Some(props))
            .context("Failed to create parquet writer")?;
        Ok(Self {
            writer,
            schema,
            rows: 0,
        })
    }

    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("pageno", DataType::UInt64, false),
            Field::new("is_present", DataType::Boolean, false),
            Field::new("is_dirty", DataType::Boolean, false),
        ]))
    }
}

impl<W: Write + Send> TableWriter for ParquetTableWriter<W> {
    fn write_rows(&mut self, rows: &[PageRow]) -> anyhow::Result<()> {
        let pageno = UInt64Array::from_iter_values(rows.iter().map(|r| r.pageno));
        let is_present: BooleanArray = rows.iter().map(|r| Some(r.is_present)).collect();
        let is_dirty: BooleanArray = rows.iter().map(|r| Some(r.is_dirty)).collect();

        let batch = RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(pageno) as ArrayRef,
                Arc::new(is_present),
                Arc::new(is_dirty),
            ],
        )?;
        self.writer.write(&batch).context("Failed to write parquet rows")?;
        self.rows += rows.len() as u64;
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<u64> {
        let rows = self.rows;
        self.writer.close().context("Failed to close parquet file")?;
        Ok(rows)
    }
}

/// Opens the table for one frame.
pub type TableFactory = Box<dyn Fn(Timestamp) -> anyhow::Result<Box<dyn TableWriter>> + Send + Sync>;

/// Where the tabular sink sends its rows.
pub enum TableTarget {
    /// Every frame appends to one table; frames may interleave.
    Shared(Box<dyn TableWriter>),
    /// Each frame gets its own table, keyed by the frame timestamp.
    PerFrame(TableFactory),
}

/// What a tabular run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub tables: usize,
    pub rows: u64,
}

enum Target {
    Shared(Mutex<Option<Box<dyn TableWriter>>>),
    PerFrame(TableFactory),
}

pub struct TabularSink {
    target: Target,
    tables: AtomicUsize,
    rows: AtomicU64,
}

impl TabularSink {
    pub fn new(target: TableTarget) -> Self {
        let target = match target {
            TableTarget::Shared(writer) => Target::Shared(Mutex::new(Some(writer))),
            TableTarget::PerFrame(factory) => Target::PerFrame(factory),
        };
        Self {
            target,
            tables: AtomicUsize::new(0),
            rows: AtomicU64::new(0),
        }
    }

    fn failure(&self, err: anyhow::Error) -> TraceError {
        TraceError::sink(self.name(), err)
    }
}

/// Feed a frame's rows to `writer` in bounded batches.
fn write_frame(writer: &mut dyn TableWriter, frame: &Frame) -> anyhow::Result<()> {
    let mut batch = Vec::with_capacity(ROW_GROUP_ROWS.min(frame.page_count() as usize));
    for vma in &frame.vmas {
        for (pageno, state) in vma.states() {
            batch.push(PageRow {
                pageno,
                is_present: state.is_committed(),
                is_dirty: state.is_dirty(),
            });
            if batch.len() == ROW_GROUP_ROWS {
                writer.write_rows(&batch)?;
                batch.clear();
            }
        }
    }
    if !batch.is_empty() {
        writer.write_rows(&batch)?;
    }
    Ok(())
}

impl Sink for TabularSink {
    type Output = TableSummary;

    fn name(&self) -> &'static str {
        "parquet"
    }

    fn layout(&self) -> RangeKeying {
        RangeKeying::None
    }

    fn prepare(&mut self, _layout: AddressLayout, _frame_count: usize) -> Result<(), TraceError> {
        Ok(())
    }

    fn consume_frame(&self, frame_no: usize, frame: &Frame) -> Result<(), TraceError> {
        match &self.target {
            Target::Shared(writer) => {
                let mut guard = writer
                    .lock()
                    .map_err(|_| TraceError::sink(self.name(), "table writer lock poisoned"))?;
                let writer = guard
                    .as_mut()
                    .ok_or_else(|| TraceError::sink(self.name(), "table already closed"))?;
                write_frame(writer.as_mut(), frame)
                    .with_context(|| format!("frame #{frame_no}"))
                    .map_err(|e| self.failure(e))?;
            }
            Target::PerFrame(factory) => {
                let mut writer = factory(frame.timestamp).map_err(|e| self.failure(e))?;
                write_frame(writer.as_mut(), frame)
                    .and_then(|()| writer.finish())
                    .with_context(|| format!("frame #{frame_no}"))
                    .map_err(|e| self.failure(e))?;
                self.tables.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.rows.fetch_add(frame.page_count(), Ordering::Relaxed);
        Ok(())
    }

    fn finish(self) -> Result<TableSummary, TraceError> {
        let name = self.name();
        let mut tables = self.tables.into_inner();
        if let Target::Shared(writer) = self.target {
            let writer = writer
                .into_inner()
                .map_err(|_| TraceError::sink(name, "table writer lock poisoned"))?;
            if let Some(writer) = writer {
                writer.finish().map_err(|e| TraceError::sink(name, e))?;
                tables += 1;
            }
        }
        Ok(TableSummary {
            tables,
            rows: self.rows.into_inner(),
        })
    }
}
