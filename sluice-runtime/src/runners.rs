//! Runner implementations, one per step kind
//!
//! Runners execute inside the schema context and, where relevant, stream
//! bytes to or from the object store. They never talk to the run metadata
//! tables; outcome recording happens at the tracker boundary above them.

use crate::object_store::ByteStream;
use crate::runner::{StepContext, StepOutcome, StepRunner, ValidationFailure};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::json;
use sluice_core::{is_sql_identifier, to_sql_identifier, ObjectRef, StepPlan};
use std::io::{Read, Seek, SeekFrom};
use tempfile::SpooledTempFile;
use tracing::{debug, instrument};

/// Spool exports in memory up to this size before overflowing to disk
const EXPORT_SPOOL_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Read chunk size when streaming a spooled export to the store
const SPOOL_READ_CHUNK: usize = 64 * 1024;

/// Executes the step's raw DDL template verbatim. Parameters are ignored:
/// migrations are expected to be self-contained.
pub struct SchemaMigrationRunner;

#[async_trait]
impl StepRunner for SchemaMigrationRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        ctx.schema.execute(Some(ctx.schema_name), &plan.sql).await?;
        Ok(StepOutcome::Success(None))
    }
}

/// Executes the interpolated SQL template (DDL or DML)
pub struct SqlStatementRunner;

#[async_trait]
impl StepRunner for SqlStatementRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        let rows_affected = ctx.schema.execute(Some(ctx.schema_name), &plan.sql).await?;
        Ok(StepOutcome::Success(Some(json!({
            "rows_affected": rows_affected
        }))))
    }
}

/// Introspects the header of the referenced file, synthesizes a
/// `CREATE TABLE` from it, and bulk-loads the remaining content.
///
/// Column names come from the header converted to SQL-identifier form;
/// column types come from the optional `name_type_map` parameter, defaulting
/// to text. The `indexed_columns` parameter adds one index per named column.
pub struct AutoLoadRunner;

#[async_trait]
impl StepRunner for AutoLoadRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        let object_ref = required_object_ref(plan)?;
        let table_name = required_param(plan, "table_name")?;
        if !is_sql_identifier(table_name) {
            return Err(crate::Error::Execution(format!(
                "table_name `{table_name}` is not a valid SQL identifier"
            )));
        }

        let stream = fetch_object(ctx, object_ref).await?;
        let (header_line, remainder) = split_header_line(stream).await?;
        let header_line = header_line.ok_or_else(|| {
            crate::Error::Execution(format!("Empty header line for {object_ref}"))
        })?;

        let columns = parse_header_columns(&header_line)?;
        if columns.is_empty() {
            return Err(crate::Error::Execution(format!(
                "Empty header line for {object_ref}"
            )));
        }

        let ddl = synthesize_create_table(table_name, &columns, plan);
        ctx.schema.execute(Some(ctx.schema_name), &ddl).await?;
        for index_sql in synthesize_indexes(table_name, plan) {
            ctx.schema.execute(Some(ctx.schema_name), &index_sql).await?;
        }

        let copy_statement = format!(
            "COPY {table_name} ({}) FROM STDIN WITH CSV",
            columns.join(", ")
        );
        let rows_copied = ctx
            .schema
            .copy_in(Some(ctx.schema_name), &copy_statement, remainder)
            .await?;

        debug!(table_name, rows_copied, "Auto-load complete");
        Ok(StepOutcome::Success(Some(json!({
            "table_name": table_name,
            "columns": columns,
            "rows_copied": rows_copied,
        }))))
    }
}

/// Streams the referenced file into a pre-existing table through the step's
/// caller-supplied COPY statement
pub struct BulkImportRunner;

#[async_trait]
impl StepRunner for BulkImportRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        let object_ref = required_object_ref(plan)?;
        let stream = fetch_object(ctx, object_ref).await?;
        let rows_copied = ctx
            .schema
            .copy_in(Some(ctx.schema_name), &plan.sql, stream)
            .await?;
        Ok(StepOutcome::Success(Some(json!({
            "rows_copied": rows_copied
        }))))
    }
}

/// Copies a query's result set out into a local spool, then uploads the
/// spooled content to the object store.
///
/// The spool is unavoidable: the destination store requires the content
/// length before the upload begins, so the rows cannot be piped straight
/// through.
pub struct BulkExportRunner;

#[async_trait]
impl StepRunner for BulkExportRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        let object_ref = required_object_ref(plan)?;

        let mut spool = SpooledTempFile::new(EXPORT_SPOOL_MEMORY_LIMIT);
        let content_length = ctx
            .schema
            .copy_out(Some(ctx.schema_name), &plan.sql, &mut spool)
            .await?;

        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| crate::Error::Execution(format!("failed to rewind export spool: {e}")))?;

        ctx.object_store
            .upload(
                &object_ref.bucket,
                &object_ref.key,
                spooled_stream(spool),
                content_length,
            )
            .await?;

        debug!(object = %object_ref, bytes = content_length, "Bulk export uploaded");
        Ok(StepOutcome::Success(Some(json!({
            "object": object_ref.to_string(),
            "bytes_uploaded": content_length,
        }))))
    }
}

/// Executes a business-rule query expected to return the identifiers of
/// violating rows; a non-empty result is a failure carrying those ids.
/// Internal-only: never user-selectable as a step kind.
pub struct ValidationRunner;

impl ValidationRunner {
    /// Run one validation query and report the failure, if any
    pub async fn check(
        ctx: &StepContext<'_>,
        name: &str,
        sql: &str,
    ) -> crate::Result<Option<ValidationFailure>> {
        let failing_ids = ctx.schema.select_values(Some(ctx.schema_name), sql).await?;
        if failing_ids.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ValidationFailure {
                name: name.to_string(),
                sql: sql.to_string(),
                failing_ids,
            }))
        }
    }
}

#[async_trait]
impl StepRunner for ValidationRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        match Self::check(ctx, &plan.name, &plan.sql).await? {
            None => Ok(StepOutcome::Success(None)),
            Some(failure) => Ok(StepOutcome::ValidationFailed(vec![failure])),
        }
    }
}

/// Executes an arbitrary read query and returns the full result set as the
/// step payload. Internal-only.
pub struct QualityReportRunner;

#[async_trait]
impl StepRunner for QualityReportRunner {
    #[instrument(skip_all, fields(step = %plan.name))]
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome> {
        let rows = ctx.schema.select_all(Some(ctx.schema_name), &plan.sql).await?;
        Ok(StepOutcome::Success(Some(rows)))
    }
}

fn required_object_ref(plan: &StepPlan) -> crate::Result<&ObjectRef> {
    plan.object_ref.as_ref().ok_or_else(|| {
        crate::Error::Execution(format!(
            "step `{}` of kind `{}` has no object-store file reference",
            plan.name, plan.kind
        ))
    })
}

fn required_param<'p>(plan: &'p StepPlan, param: &str) -> crate::Result<&'p str> {
    plan.params
        .get(param)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| crate::Error::MissingParameter {
            step: plan.name.clone(),
            param: param.to_string(),
        })
}

async fn fetch_object(ctx: &StepContext<'_>, object_ref: &ObjectRef) -> crate::Result<ByteStream> {
    Ok(ctx
        .object_store
        .fetch(&object_ref.bucket, &object_ref.key)
        .await?)
}

/// Pull chunks off the stream until the first newline, returning the header
/// line (sans line terminator) and a stream equivalent to the remainder.
/// `None` means the object was empty.
async fn split_header_line(mut stream: ByteStream) -> crate::Result<(Option<String>, ByteStream)> {
    let mut buffered = BytesMut::new();
    let mut newline_at: Option<usize> = None;

    while newline_at.is_none() {
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk
                    .map_err(|e| crate::Error::Execution(format!("object stream failed: {e}")))?;
                let offset = buffered.len();
                if let Some(position) = chunk.iter().position(|byte| *byte == b'\n') {
                    newline_at = Some(offset + position);
                }
                buffered.extend_from_slice(&chunk);
            }
            None => break,
        }
    }

    let buffered = buffered.freeze();
    let (header, remainder) = match newline_at {
        Some(position) => (
            buffered.slice(0..position),
            buffered.slice(position + 1..),
        ),
        None => (buffered.clone(), Bytes::new()),
    };

    if header.is_empty() && remainder.is_empty() {
        return Ok((None, futures::stream::empty().boxed()));
    }

    let header_line = String::from_utf8_lossy(&header)
        .trim_end_matches('\r')
        .to_string();
    let remainder_stream = futures::stream::iter(vec![Ok(remainder)])
        .chain(stream)
        .boxed();

    Ok((Some(header_line), remainder_stream))
}

/// Parse one CSV header line into SQL-identifier column names
fn parse_header_columns(header_line: &str) -> crate::Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(header_line.as_bytes());

    let mut columns = Vec::new();
    if let Some(record) = reader.records().next() {
        let record =
            record.map_err(|e| crate::Error::Execution(format!("unparseable header line: {e}")))?;
        for field in record.iter() {
            columns.push(to_sql_identifier(field));
        }
    }
    Ok(columns)
}

/// Build the table DDL from the header columns and the step's optional
/// `name_type_map` parameter. Untyped columns default to text; a surrogate
/// key is added unless the file already carries an `id` column.
fn synthesize_create_table(table_name: &str, columns: &[String], plan: &StepPlan) -> String {
    let type_map = plan.params.get("name_type_map").and_then(|v| v.as_object());

    let mut definitions = Vec::with_capacity(columns.len() + 1);
    if !columns.iter().any(|column| column == "id") {
        definitions.push("id bigserial PRIMARY KEY".to_string());
    }
    for column in columns {
        let column_type = type_map
            .and_then(|map| map.get(column))
            .and_then(|v| v.as_str())
            .map(column_type_sql)
            .unwrap_or("text");
        definitions.push(format!("{column} {column_type}"));
    }

    format!("CREATE TABLE {table_name} (\n  {}\n)", definitions.join(",\n  "))
}

/// One CREATE INDEX statement per entry in the `indexed_columns` parameter
fn synthesize_indexes(table_name: &str, plan: &StepPlan) -> Vec<String> {
    plan.params
        .get("indexed_columns")
        .and_then(|v| v.as_array())
        .map(|columns| {
            columns
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|column| is_sql_identifier(column))
                .map(|column| format!("CREATE INDEX ON {table_name} ({column})"))
                .collect()
        })
        .unwrap_or_default()
}

/// Map a logical column type from `name_type_map` onto a PostgreSQL type
fn column_type_sql(logical: &str) -> &'static str {
    match logical {
        "string" | "text" => "text",
        "integer" => "integer",
        "bigint" => "bigint",
        "float" | "double" => "double precision",
        "decimal" | "numeric" => "numeric",
        "boolean" => "boolean",
        "date" => "date",
        "datetime" | "timestamp" => "timestamptz",
        "json" => "jsonb",
        _ => "text",
    }
}

/// Stream a rewound spool as chunks for upload
fn spooled_stream(spool: SpooledTempFile) -> ByteStream {
    futures::stream::unfold(spool, |mut spool| async move {
        let mut buffer = vec![0u8; SPOOL_READ_CHUNK];
        match spool.read(&mut buffer) {
            Ok(0) => None,
            Ok(read) => {
                buffer.truncate(read);
                Some((Ok(Bytes::from(buffer)), spool))
            }
            Err(error) => Some((Err(error), spool)),
        }
    })
    .boxed()
}
