//! Recognizer factory backed by the system `tesseract` executable.
//!
//! The engine's recognizer boundary is a trait; this is the reference
//! implementation for the CLI, driving the Tesseract CLI with TSV output.
//! Each handle is serial: one subprocess at a time, language fixed at
//! construction.

use async_trait::async_trait;
use image::RgbaImage;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use textlayer::{
    PageSegMode, RecognizedPage, RecognizerFactory, RecognizerHandle, RecognizerParams, Result,
    TextlayerError,
};

/// Spawns `tesseract` subprocesses for recognition.
pub struct TesseractCliFactory {
    binary: PathBuf,
}

impl TesseractCliFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for TesseractCliFactory {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl RecognizerFactory for TesseractCliFactory {
    async fn init(&self, language: &str) -> Result<Box<dyn RecognizerHandle>> {
        Ok(Box::new(TesseractCliHandle {
            binary: self.binary.clone(),
            language: language.to_string(),
            params: RecognizerParams {
                create_tsv: true,
                dpi: 300,
                page_seg_mode: PageSegMode::Auto,
            },
        }))
    }
}

struct TesseractCliHandle {
    binary: PathBuf,
    language: String,
    params: RecognizerParams,
}

fn psm_flag(mode: PageSegMode) -> &'static str {
    match mode {
        PageSegMode::Auto => "3",
        PageSegMode::SingleBlock => "6",
        PageSegMode::SingleLine => "7",
        PageSegMode::SingleWord => "8",
        PageSegMode::SparseText => "11",
    }
}

/// Derive plain text and a mean confidence from TSV word rows, so one
/// subprocess run serves all three fields of [`RecognizedPage`].
fn summarize_tsv(tsv: &str) -> (String, f32) {
    let mut text_lines: Vec<String> = Vec::new();
    let mut current_key = String::new();
    let mut current: Vec<&str> = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0u32;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0].trim() != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        if let Ok(conf) = cols[10].trim().parse::<f32>() {
            if conf >= 0.0 {
                conf_sum += conf;
                conf_count += 1;
            }
        }
        let key = format!("{}-{}-{}-{}", cols[1], cols[2], cols[3], cols[4]);
        if key != current_key && !current.is_empty() {
            text_lines.push(current.join(" "));
            current.clear();
        }
        current_key = key;
        current.push(word);
    }
    if !current.is_empty() {
        text_lines.push(current.join(" "));
    }

    let confidence = if conf_count > 0 { conf_sum / conf_count as f32 } else { 0.0 };
    (text_lines.join("\n"), confidence)
}

#[async_trait]
impl RecognizerHandle for TesseractCliHandle {
    async fn set_parameters(&mut self, params: &RecognizerParams) -> Result<()> {
        self.params = *params;
        Ok(())
    }

    async fn recognize(&mut self, image: &RgbaImage) -> Result<RecognizedPage> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("page.png");
        image
            .save(&input)
            .map_err(|e| TextlayerError::Recognizer(format!("failed to write raster: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--dpi", &self.params.dpi.to_string()])
            .args(["--psm", psm_flag(self.params.page_seg_mode)])
            .arg("tsv")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TextlayerError::Recognizer(format!("failed to spawn tesseract: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TextlayerError::Recognizer(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout).into_owned();
        let (text, confidence) = summarize_tsv(&tsv);
        Ok(RecognizedPage { text, confidence, tsv })
    }

    async fn terminate(&mut self) -> Result<()> {
        Ok(())
    }
}
