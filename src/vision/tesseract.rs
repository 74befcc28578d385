//! Tesseract CLI backend
//!
//! Runs the `tesseract` executable as an external process and reads its TSV
//! output. Words are grouped back into lines, since an MRZ is compared line
//! by line against the ground truth.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{EngineFactory, MrzEngine, Setting, SettingDef, SettingKind};
use super::ocr::{DetectionResult, OcrResult, Point};
use crate::config::EngineConfig;
use crate::error::{BenchError, Result};

/// Registry name of this engine
pub const ENGINE_NAME: &str = "tesseract";

/// Characters that can appear in a machine-readable zone
pub const MRZ_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789<";

/// Page segmentation modes offered for selection
const PSM_OPTIONS: &[&str] = &["3", "4", "6", "7", "11", "13"];

const DEFAULT_LANGUAGE: &str = "eng";
const DEFAULT_PSM: &str = "6";

/// TSV row level for a single word
const WORD_LEVEL: u32 = 5;

/// Runtime options passed on every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
struct TesseractOptions {
    language: String,
    psm: String,
    whitelist: String,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            psm: DEFAULT_PSM.to_string(),
            whitelist: MRZ_ALPHABET.to_string(),
        }
    }
}

/// Builds [`TesseractEngine`] instances from the engine configuration
pub struct TesseractFactory {
    binary: String,
    timeout: Duration,
}

impl TesseractFactory {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: config.tesseract_binary.clone(),
            timeout: config.detection_timeout(),
        }
    }
}

#[async_trait]
impl EngineFactory for TesseractFactory {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn supported_settings(&self) -> Vec<SettingDef> {
        vec![
            SettingDef { name: "language", kind: SettingKind::String },
            SettingDef { name: "psm", kind: SettingKind::Select },
            SettingDef { name: "whitelist", kind: SettingKind::String },
        ]
    }

    fn default_settings(&self) -> Vec<Setting> {
        vec![
            Setting::new("language", DEFAULT_LANGUAGE, SettingKind::String),
            Setting::new("psm", DEFAULT_PSM, SettingKind::Select),
            Setting::new("whitelist", MRZ_ALPHABET, SettingKind::String),
        ]
    }

    fn setting_options(&self, key: &str, _settings: &[Setting]) -> Vec<String> {
        match key {
            "psm" => PSM_OPTIONS.iter().map(|s| s.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    async fn create(&self) -> Result<Box<dyn MrzEngine>> {
        let engine = TesseractEngine::new(self.binary.clone(), self.timeout).await?;
        Ok(Box::new(engine))
    }
}

/// Tesseract executable wrapper
pub struct TesseractEngine {
    binary: String,
    timeout: Duration,
    options: TesseractOptions,
}

impl TesseractEngine {
    /// Locate the executable and read its version
    pub async fn new(binary: String, timeout: Duration) -> Result<Self> {
        info!("Initializing Tesseract engine using binary: {}", binary);

        let output = run_with_timeout(&binary, &["--version".to_string()], timeout).await?;
        // Older releases print the version banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        let version = banner.lines().next().unwrap_or_default().trim().to_string();
        if !output.status.success() || !version.starts_with("tesseract") {
            return Err(BenchError::engine(
                ENGINE_NAME,
                format!("{} does not look like a tesseract executable", binary),
            ));
        }

        info!("Tesseract initialized: {}", version);

        Ok(Self {
            binary,
            timeout,
            options: TesseractOptions::default(),
        })
    }

    fn command_args(&self, image_path: &str) -> Vec<String> {
        let mut args = vec![
            image_path.to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.options.language.clone(),
            "--psm".to_string(),
            self.options.psm.clone(),
        ];
        if !self.options.whitelist.is_empty() {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", self.options.whitelist));
        }
        args.push("tsv".to_string());
        args
    }
}

#[async_trait]
impl MrzEngine for TesseractEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn detect(&self, image: &[u8]) -> Result<DetectionResult> {
        let format = image::guess_format(image)
            .map_err(|e| BenchError::Image(format!("unrecognized image data: {e}")))?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let mut file = tempfile::Builder::new()
            .prefix("mrz-bench-")
            .suffix(&format!(".{extension}"))
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        let image_path = file.path().to_string_lossy().into_owned();
        let args = self.command_args(&image_path);

        let start = Instant::now();
        let output = run_with_timeout(&self.binary, &args, self.timeout).await?;
        let elapsed = start.elapsed();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::engine(
                ENGINE_NAME,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let results = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(
            "Tesseract recognized {} lines in {:?}",
            results.len(),
            elapsed
        );

        Ok(DetectionResult {
            elapsed_time: elapsed.as_millis() as f64,
            results,
        })
    }

    async fn apply_settings(&mut self, settings: &[Setting]) -> Result<()> {
        let mut options = TesseractOptions::default();

        for setting in settings {
            let value = setting.value.trim();
            match setting.name.as_str() {
                "language" => {
                    if value.is_empty() {
                        continue;
                    }
                    let valid = value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+');
                    if !valid {
                        return Err(invalid_setting("language", "expected names like eng or eng+ocrb"));
                    }
                    options.language = value.to_string();
                }
                "psm" => {
                    if value.is_empty() {
                        continue;
                    }
                    if !PSM_OPTIONS.contains(&value) {
                        return Err(invalid_setting(
                            "psm",
                            &format!("expected one of {}", PSM_OPTIONS.join(", ")),
                        ));
                    }
                    options.psm = value.to_string();
                }
                "whitelist" => {
                    if !value.is_empty() {
                        options.whitelist = value.to_string();
                    }
                }
                other => warn!("Ignoring unsupported tesseract setting: {}", other),
            }
        }

        debug!("Tesseract options: {:?}", options);
        self.options = options;
        Ok(())
    }
}

fn invalid_setting(name: &str, message: &str) -> BenchError {
    BenchError::InvalidSetting {
        engine: ENGINE_NAME.to_string(),
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Run the executable, killing it if it outlives `timeout`
async fn run_with_timeout(binary: &str, args: &[String], timeout: Duration) -> Result<Output> {
    let mut command = Command::new(binary);
    command.args(args).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(BenchError::engine(
            ENGINE_NAME,
            format!("executable not found: {binary}"),
        )),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(BenchError::engine(
            ENGINE_NAME,
            format!("timed out after {:?}", timeout),
        )),
    }
}

/// Accumulates the words of one text line
#[derive(Debug)]
struct LineBuilder {
    text: String,
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
    confidence_sum: f64,
    confidence_count: u32,
}

impl LineBuilder {
    fn into_result(self) -> OcrResult {
        let confidence = (self.confidence_count > 0)
            .then(|| self.confidence_sum / self.confidence_count as f64 / 100.0);
        OcrResult::from_corners(
            self.text,
            confidence,
            [
                Point { x: self.left, y: self.top },
                Point { x: self.right, y: self.top },
                Point { x: self.right, y: self.bottom },
                Point { x: self.left, y: self.bottom },
            ],
        )
    }
}

/// Parse `tesseract ... tsv` output into line-level results.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. Words of a line are concatenated without separators.
pub fn parse_tsv(tsv: &str) -> Vec<OcrResult> {
    let mut lines: Vec<LineBuilder> = Vec::new();
    let mut index: HashMap<(u32, u32, u32, u32), usize> = HashMap::new();

    for row in tsv.lines() {
        let fields: Vec<&str> = row.splitn(12, '\t').collect();
        if fields.len() < 12 {
            continue;
        }
        // Header and malformed rows fail to parse and are skipped
        let Ok(numbers) = fields[..6]
            .iter()
            .map(|f| f.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<u32>, _>>()
        else {
            continue;
        };
        if numbers[0] != WORD_LEVEL {
            continue;
        }

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }
        let Ok(geometry) = fields[6..11]
            .iter()
            .map(|f| f.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
        else {
            continue;
        };
        let (left, top, width, height, conf) =
            (geometry[0], geometry[1], geometry[2], geometry[3], geometry[4]);

        let key = (numbers[1], numbers[2], numbers[3], numbers[4]);
        let position = *index.entry(key).or_insert_with(|| {
            lines.push(LineBuilder {
                text: String::new(),
                left,
                top,
                right: left + width,
                bottom: top + height,
                confidence_sum: 0.0,
                confidence_count: 0,
            });
            lines.len() - 1
        });

        let line = &mut lines[position];
        line.text.push_str(word);
        line.left = line.left.min(left);
        line.top = line.top.min(top);
        line.right = line.right.max(left + width);
        line.bottom = line.bottom.max(top + height);
        if conf >= 0.0 {
            line.confidence_sum += conf;
            line.confidence_count += 1;
        }
    }

    lines.into_iter().map(LineBuilder::into_result).collect()
}
