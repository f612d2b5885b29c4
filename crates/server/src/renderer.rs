//! The render pipeline: one POST /render request from multipart ingest to
//! PDF (or error) response.

use crate::error::ErrorResponse;
use crate::metrics;
use crate::requestid::RequestId;
use crate::state::AppState;
use axum::Extension;
use axum::body::Body;
use axum::extract::multipart::{Field, Multipart};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use platen_core::config::KeepJobs;
use platen_core::{Engine, Identifier, RenderError};
use platen_refstore::RefStoreError;
use platen_tex::document::FileWriter;
use platen_tex::{Document, InputStats};
use serde::Deserialize;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Content type marking a part as a reference-store operation.
const MIME_TEXD: &str = "application/x.texd";
const MIME_PDF: &str = "application/pdf";
const MIME_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
pub struct RenderParams {
    engine: Option<String>,
    image: Option<String>,
    input: Option<String>,
    errors: Option<String>,
}

pub async fn handle_render(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<RenderParams>,
    multipart: Multipart,
) -> Response {
    let cancel = CancellationToken::new();
    // a client disconnect drops this future; the guard then cancels the
    // token, which kills a running compiler
    let _disconnect_guard = cancel.clone().drop_guard();

    if let Some(timeout) = state.config.compile_timeout() {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => deadline.cancel(),
                () = deadline.cancelled() => {}
            }
        });
    }

    match render(&state, &request_id, &params, multipart, &cancel).await {
        Ok(response) => response,
        Err(err) => {
            metrics::PROCESSED_FAILURE.inc();
            if err.is_reference() {
                tracing::warn!(request_id = %request_id.0, error = %err, "unknown file reference");
            } else {
                tracing::error!(request_id = %request_id.0, error = %err, "render failed");
            }
            ErrorResponse(err).into_response()
        }
    }
}

async fn render(
    state: &AppState,
    request_id: &RequestId,
    params: &RenderParams,
    multipart: Multipart,
    cancel: &CancellationToken,
) -> Result<Response, RenderError> {
    let image = validate_image(state, params.image.as_deref())?;
    let engine = validate_engine(state, params.engine.as_deref())?;

    // enter the queue; bail if we're over capacity
    let _slot = match state.scheduler.acquire(cancel).await {
        Ok(slot) => slot,
        Err(err) => {
            tracing::error!(request_id = %request_id.0, error = %err, "failed to enter queue");
            metrics::PROCESSED_REJECTED.inc();
            return Err(err);
        }
    };

    let mut doc = Document::new(state.job_dir.clone(), engine, image);
    let result = process(state, request_id, &mut doc, params, multipart, cancel).await;

    let keep = match state.config.keep_jobs {
        KeepJobs::Always => true,
        KeepJobs::OnFailure => result.is_err(),
        KeepJobs::Never => false,
    };
    if keep {
        if let Some(workdir) = doc.workdir() {
            tracing::info!(request_id = %request_id.0, workdir = %workdir.display(), "keeping job files");
        }
    } else {
        metrics::observe_render(&InputStats::collect(&doc).await);
        if let Err(err) = doc.cleanup().await {
            tracing::error!(request_id = %request_id.0, error = %err, "cleanup failed");
        }
    }

    result
}

async fn process(
    state: &AppState,
    request_id: &RequestId,
    doc: &mut Document,
    params: &RenderParams,
    multipart: Multipart,
    cancel: &CancellationToken,
) -> Result<Response, RenderError> {
    ingest(state, doc, multipart).await?;

    // Optionally, select the main input file. The name must refer to a
    // file included in the request body.
    if let Some(input) = params.input.as_deref().filter(|s| !s.is_empty()) {
        doc.set_main_input(input).map_err(|err| {
            tracing::error!(request_id = %request_id.0, filename = %input, error = %err,
                "invalid main input file");
            err
        })?;
    }

    // resolve the main input now; without one there is nothing to compile
    doc.main_input()?;

    if cancel.is_cancelled() {
        tracing::error!(request_id = %request_id.0, "cancel render job, client is gone");
        metrics::PROCESSED_ABORTED.inc();
        return Err(RenderError::unknown("render job cancelled"));
    }

    let started = Instant::now();
    if let Err(err) = state.executor.run(doc, cancel).await {
        if let Some(format @ ("full" | "condensed")) = params.errors.as_deref() {
            return match doc.compile_log().await {
                Ok(log) => logfile_response(format, log).await,
                Err(log_err) => {
                    tracing::error!(request_id = %request_id.0, error = %log_err, "failed to get logs");
                    Err(err) // the client gets the executor's error
                }
            };
        }
        return Err(err);
    }
    metrics::PROCESSING_DURATION.observe(started.elapsed().as_secs_f64());
    metrics::PROCESSED_SUCCESS.inc();

    let pdf = doc.result_pdf().await.map_err(|err| {
        tracing::error!(request_id = %request_id.0, error = %err, "failed to get result");
        err
    })?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, MIME_PDF)],
        Body::from_stream(ReaderStream::new(pdf)),
    )
        .into_response())
}

/// Ingest all multipart parts into the document. `ref=use` misses are
/// accumulated so the client receives a single error listing every missing
/// reference; any other failure short-circuits.
async fn ingest(
    state: &AppState,
    doc: &mut Document,
    mut multipart: Multipart,
) -> Result<(), RenderError> {
    let mut missing_refs: Vec<String> = Vec::new();

    let mut part_num = 0usize;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(RenderError::input("failed to parse request")
                    .with_cause(err)
                    .with_extra("part", part_num));
            }
        };

        let name = field.name().map(str::to_string).unwrap_or_default();
        if name.is_empty() {
            return Err(RenderError::input("empty name").with_extra("part", part_num));
        }

        let content_type = field.content_type().map(str::to_string);
        let mut target = doc
            .new_writer(&name)
            .await
            .map_err(|err| err.with_extra("part", part_num))?;

        match content_type.as_deref().filter(|ct| ct.starts_with(MIME_TEXD)) {
            Some(content_type) => {
                let extras = |err: RenderError| {
                    err.with_extra("name", name.clone())
                        .with_extra("content-type", content_type.to_string())
                        .with_extra("part", part_num)
                };
                let body = field.bytes().await.map_err(|err| {
                    extras(RenderError::input("failed to read part").with_cause(err))
                })?;

                match ref_param(content_type) {
                    // no ref param, treat the body as a regular file
                    None => {
                        write_to(&mut target, &body, &name).await?;
                    }
                    Some("use") => {
                        let raw = String::from_utf8_lossy(&body).trim().to_string();
                        let id = Identifier::parse(&raw).map_err(|err| {
                            extras(RenderError::input("failed to parse reference").with_cause(err))
                        })?;

                        match state.refs.copy_file(&id, &mut target).await {
                            Ok(()) => {}
                            Err(RefStoreError::UnknownReference) => {
                                missing_refs.push(raw);
                                part_num += 1;
                                continue;
                            }
                            Err(err) => {
                                return Err(extras(
                                    RenderError::input("failed to use reference").with_cause(err),
                                ));
                            }
                        }
                    }
                    Some("store") => {
                        state.refs.store(&mut body.as_ref()).await.map_err(|err| {
                            extras(RenderError::input("failed to store reference").with_cause(err))
                        })?;
                        write_to(&mut target, &body, &name).await?;
                    }
                    Some(_) => {
                        return Err(extras(RenderError::input("invalid ref parameter")));
                    }
                }
            }
            None => {
                copy_field(&mut target, field, &name, part_num).await?;
            }
        }

        let staged = target.finish().await?;
        doc.commit(staged);
        part_num += 1;
    }

    if !missing_refs.is_empty() {
        return Err(RenderError::reference(missing_refs));
    }
    Ok(())
}

async fn copy_field(
    target: &mut FileWriter,
    mut field: Field<'_>,
    name: &str,
    part_num: usize,
) -> Result<(), RenderError> {
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(err) => {
                return Err(RenderError::input("failed to read part")
                    .with_cause(err)
                    .with_extra("name", name.to_string())
                    .with_extra("part", part_num));
            }
        };
        write_to(target, &chunk, name).await?;
    }
}

async fn write_to(target: &mut FileWriter, data: &[u8], name: &str) -> Result<(), RenderError> {
    target.write_all(data).await.map_err(|err| {
        RenderError::input("cannot save file")
            .with_cause(err)
            .with_extra("filename", name.to_string())
    })
}

/// The `ref` parameter of a texd content type, if any.
fn ref_param(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| param.trim().strip_prefix("ref="))
}

/// Validate the TeX engine. Optional, but must be known to the registry.
fn validate_engine(state: &AppState, engine: Option<&str>) -> Result<Engine, RenderError> {
    match engine {
        None | Some("") => Ok(state.config.tex_engine),
        Some(name) => name
            .parse()
            .map_err(|err: platen_core::UnsupportedEngine| {
                RenderError::input("unknown engine").with_cause(err)
            }),
    }
}

/// Validate the container image name. Ignored in local mode; in container
/// mode the image must be on the allow-list, the first entry acting as the
/// default.
fn validate_image(state: &AppState, image: Option<&str>) -> Result<Option<String>, RenderError> {
    let images = &state.config.images;
    if images.is_empty() {
        return Ok(None);
    }
    match image {
        None | Some("") => Ok(Some(images[0].clone())),
        Some(name) if images.iter().any(|allowed| allowed == name) => Ok(Some(name.to_string())),
        Some(name) => {
            Err(RenderError::input("forbidden image name").with_extra("image", name.to_string()))
        }
    }
}

/// Stream the compiler log as the response: either verbatim, or condensed
/// to the lines marking errors (leading `!`).
async fn logfile_response(
    format: &str,
    mut log: tokio::fs::File,
) -> Result<Response, RenderError> {
    let headers = [(CONTENT_TYPE, MIME_PLAIN)];

    if format != "condensed" {
        let body = Body::from_stream(ReaderStream::new(log));
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, headers, body).into_response());
    }

    let mut contents = String::new();
    log.read_to_string(&mut contents)
        .await
        .map_err(|err| RenderError::compilation("failed to read logs").with_cause(err))?;

    let mut condensed = String::new();
    for line in contents.lines() {
        if line.starts_with('!') {
            // drop the error indicator and re-add the line break
            condensed.push_str(line.trim_start_matches(['!', ' ']));
            condensed.push('\n');
        }
    }

    Ok((StatusCode::UNPROCESSABLE_ENTITY, headers, condensed).into_response())
}
