//! One in-flight compilation job: its working directory, admitted files,
//! and the resolution of the main input file.

use crate::workdir::JobDir;
use platen_core::{Engine, RenderError};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::io::AsyncWrite;
use tokio::sync::OnceCell;

/// Sentinel marking a file as the intended main input. A last resort:
/// clients should name the main file explicitly.
pub const MARK: &str = "%!texd";

/// File names which are never accepted. latexmk config files are Perl
/// scripts and would be executed by the compiler.
const FORBIDDEN_FILES: [&str; 2] = ["latexmkrc", ".latexmkrc"];

/// How many leading bytes of a candidate file are inspected for the mark
/// and for `\documentclass`.
const HEAD_CAPTURE: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
struct FileInfo {
    candidate: bool,
    has_documentclass: bool,
    has_texd_mark: bool,
    size: u64,
}

/// A single compilation job. Owned by exactly one render invocation;
/// never shared between requests.
pub struct Document {
    base: Arc<JobDir>,
    engine: Engine,
    image: Option<String>,

    workdir: OnceCell<PathBuf>,
    files: HashMap<String, FileInfo>,
    main_input: Option<String>,
}

impl Document {
    pub fn new(base: Arc<JobDir>, engine: Engine, image: Option<String>) -> Self {
        Self {
            base,
            engine,
            image,
            workdir: OnceCell::new(),
            files: HashMap::new(),
            main_input: None,
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Container image to compile with. Only relevant in container mode.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Path of the working directory, created on first use.
    pub async fn working_directory(&self) -> Result<&Path, RenderError> {
        self.workdir
            .get_or_try_init(|| async {
                self.base.create_unique().await.map_err(|e| {
                    RenderError::unknown("creating working directory failed").with_cause(e)
                })
            })
            .await
            .map(PathBuf::as_path)
    }

    /// Path of the working directory, if one was created.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.get().map(PathBuf::as_path)
    }

    /// Open a write sink for a new file under the given client-provided
    /// name. The name is strictly validated; duplicates are rejected.
    /// Call [`Document::commit`] with the finished sink to register the
    /// file.
    pub async fn new_writer(&mut self, name: &str) -> Result<FileWriter, RenderError> {
        let Some(clean) = clean_name(name) else {
            return Err(RenderError::input("invalid file name").with_extra("filename", name));
        };
        if self.files.contains_key(&clean) {
            return Err(RenderError::input("duplicate file name").with_extra("filename", name));
        }

        tracing::debug!(filename = %clean, "adding file");
        let workdir = self.working_directory().await?.to_path_buf();

        let path = workdir.join(&clean);
        if let Some(parent) = path.parent().filter(|p| *p != workdir.as_path()) {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o700);
            builder.create(parent).await.map_err(|e| {
                RenderError::input("cannot create directory")
                    .with_cause(e)
                    .with_extra("filename", name)
            })?;
        }

        let mut options = fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);
        let file = options.open(&path).await.map_err(|e| {
            RenderError::input("cannot create file")
                .with_cause(e)
                .with_extra("filename", name)
        })?;

        let candidate = is_main_candidate(&clean);
        Ok(FileWriter {
            name: clean,
            candidate,
            file,
            head: Vec::new(),
            size: 0,
        })
    }

    /// Register a finished file with the document.
    pub fn commit(&mut self, staged: StagedFile) {
        let mut info = FileInfo {
            candidate: staged.candidate,
            size: staged.size,
            ..FileInfo::default()
        };
        if staged.candidate {
            if staged.head.starts_with(MARK.as_bytes()) {
                tracing::debug!(filename = %staged.name, "found mark");
                info.has_texd_mark = true;
            } else if contains_subslice(&staged.head, b"\\documentclass") {
                tracing::debug!(filename = %staged.name, "found \\documentclass");
                info.has_documentclass = true;
            }
        }
        self.files.insert(staged.name, info);
    }

    /// Explicitly select the main input file. It must name a previously
    /// admitted file.
    pub fn set_main_input(&mut self, name: &str) -> Result<(), RenderError> {
        let Some(clean) = clean_name(name) else {
            return Err(RenderError::input("invalid file name").with_extra("filename", name));
        };
        if !self.files.contains_key(&clean) {
            return Err(RenderError::input("unknown input file name").with_extra("filename", name));
        }

        tracing::debug!(filename = %clean, "setting main input");
        self.main_input = Some(clean);
        Ok(())
    }

    /// The main input file: the explicit selection if one was made,
    /// otherwise guessed from the candidate set. Candidates carrying the
    /// mark take precedence over candidates with `\documentclass`, which
    /// take precedence over the rest. Each bucket must resolve to exactly
    /// one file.
    pub fn main_input(&self) -> Result<&str, RenderError> {
        if let Some(main) = &self.main_input {
            return Ok(main);
        }

        let mut with_mark = Vec::new();
        let mut with_doc_class = Vec::new();
        let mut others = Vec::new();
        for (name, info) in &self.files {
            if info.has_texd_mark {
                with_mark.push(name.as_str());
            } else if info.has_documentclass {
                with_doc_class.push(name.as_str());
            } else if info.candidate {
                others.push(name.as_str());
            }
        }

        let buckets = [
            (with_mark, "multiple files with %!texd mark"),
            (with_doc_class, "multiple files with \\documentclass"),
            (others, "multiple candidates"),
        ];
        for (mut candidates, context) in buckets {
            match candidates.len() {
                0 => {}
                1 => return Ok(candidates[0]),
                _ => {
                    candidates.sort_unstable();
                    let names: Vec<String> = candidates.iter().map(|s| s.to_string()).collect();
                    return Err(RenderError::input(format!(
                        "cannot determine main input file: {context}"
                    ))
                    .with_extra("candidates", names));
                }
            }
        }

        Err(RenderError::input(
            "cannot determine main input file: no candidates",
        ))
    }

    /// The compiled PDF, readable from the working directory.
    pub async fn result_pdf(&self) -> Result<fs::File, RenderError> {
        tracing::debug!("fetching result");
        self.open_output("pdf").await
    }

    /// The TeX compiler log, readable from the working directory.
    pub async fn compile_log(&self) -> Result<fs::File, RenderError> {
        tracing::debug!("fetching logs");
        self.open_output("log").await
    }

    /// Size of the result PDF, if one exists.
    pub async fn result_size(&self) -> Option<u64> {
        let path = self.output_path("pdf").ok()?;
        fs::metadata(path).await.ok().map(|m| m.len())
    }

    pub(crate) fn file_sizes(&self) -> impl Iterator<Item = (&str, u64)> {
        self.files.iter().map(|(name, info)| (name.as_str(), info.size))
    }

    fn output_path(&self, ext: &str) -> Result<PathBuf, RenderError> {
        let main = self
            .main_input()
            .map_err(|e| RenderError::input("no main input specified").with_cause(e))?;

        let stem = match main.rfind('.') {
            Some(pos) if pos > 0 => &main[..pos],
            _ => return Err(RenderError::input("invalid main input file name")),
        };

        let workdir = self
            .workdir
            .get()
            .ok_or_else(|| RenderError::input("no files added"))?;
        Ok(workdir.join(format!("{stem}.{ext}")))
    }

    async fn open_output(&self, ext: &str) -> Result<fs::File, RenderError> {
        let path = self.output_path(ext)?;
        fs::File::open(&path).await.map_err(|e| {
            RenderError::compilation("failed to open output file for reading")
                .with_cause(e)
                .with_extra(
                    "file",
                    path.file_name().unwrap_or_default().to_string_lossy().into_owned(),
                )
        })
    }

    /// Remove the working directory and everything in it. A second call
    /// is a no-op.
    pub async fn cleanup(&mut self) -> Result<(), RenderError> {
        if let Some(workdir) = self.workdir.take() {
            fs::remove_dir_all(&workdir)
                .await
                .map_err(|e| RenderError::unknown("cleanup failed").with_cause(e))?;
        }
        Ok(())
    }
}

/// A finished file, ready to be registered with its document.
pub struct StagedFile {
    name: String,
    candidate: bool,
    head: Vec<u8>,
    size: u64,
}

/// Write sink for one file in the working directory.
///
/// For main-input candidates the first KiB of the stream is retained so
/// that [`Document::commit`] can detect the mark or `\documentclass`.
#[derive(Debug)]
pub struct FileWriter {
    name: String,
    candidate: bool,
    file: fs::File,
    head: Vec<u8>,
    size: u64,
}

impl FileWriter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flush and close the sink.
    pub async fn finish(mut self) -> Result<StagedFile, RenderError> {
        use tokio::io::AsyncWriteExt;

        self.file.flush().await.map_err(|e| {
            RenderError::input("cannot save file")
                .with_cause(e)
                .with_extra("filename", self.name.clone())
        })?;
        Ok(StagedFile {
            name: self.name,
            candidate: self.candidate,
            head: self.head,
            size: self.size,
        })
    }
}

impl AsyncWrite for FileWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.file).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if this.candidate && this.head.len() < HEAD_CAPTURE {
                    let take = (HEAD_CAPTURE - this.head.len()).min(n);
                    this.head.extend_from_slice(&buf[..take]);
                }
                this.size += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}

/// Validate and lexically normalise a client-provided file name.
///
/// Rejected outright: empty names, the current directory, absolute paths,
/// directory traversal, forbidden file names, and names containing TeX
/// characters that are easily abused (`\ % $ _ ^ & `` ` ``).
fn clean_name(name: &str) -> Option<String> {
    let clean = lexical_clean(name);
    if clean == "."
        || clean.starts_with("..")
        || clean.starts_with('/')
        || FORBIDDEN_FILES.contains(&clean.as_str())
        || clean.contains(['\\', '%', '$', '_', '^', '&', '`'])
    {
        return None;
    }
    Some(clean)
}

/// Pure lexical path cleaning: resolves `.` and `..` components without
/// touching the filesystem.
fn lexical_clean(name: &str) -> String {
    let absolute = name.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for comp in name.split('/') {
        match comp {
            "" | "." => {}
            ".." => match out.last() {
                Some(&"..") | None if !absolute => out.push(".."),
                _ => {
                    out.pop();
                }
            },
            comp => out.push(comp),
        }
    }

    let joined = out.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn is_main_candidate(name: &str) -> bool {
    if name.contains('/') || !name.ends_with(".tex") {
        return false;
    }
    if matches!(name, "input.tex" | "main.tex" | "document.tex") {
        return true;
    }
    name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
