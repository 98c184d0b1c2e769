//! Metadata extraction.
//!
//! Turns the files of a show folder into episode guesses. One classifier
//! request is sent per show folder; anything the classifier cannot answer
//! well is handed to the deterministic heuristic. Companion files can inherit
//! the guess of the video they belong to.

use crate::core::cancel::{retry_backoff, sleep_with_cancel, CancelFlag};
use crate::core::heuristic;
use crate::core::scanner::ShowFolder;
use crate::models::config::{ClassifierConfig, CompanionPolicy};
use crate::models::media::{normalize_title, EpisodeGuess, FileKind, GuessSource, SourceFile};
use crate::models::plan::Candidate;
use crate::models::report::Issue;
use crate::services::classifier::{CallOutcome, Classifier, ClassifyRequest, RawGuess};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

/// Confidence assumed when the classifier omits one.
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Per-file verdict of one classification batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FileVerdict {
    /// The accepted guess, if any.
    pub guess: Option<EpisodeGuess>,
    /// Why the classifier guess was not used, when it was not.
    pub note: Option<String>,
}

/// Result of classifying one batch of filenames.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// One verdict per input filename, in input order.
    pub verdicts: Vec<FileVerdict>,
    /// Folder-level degradations (classifier unavailable or malformed).
    pub issues: Vec<Issue>,
}

/// Candidates and issues for one show folder.
#[derive(Debug, Clone, Default)]
pub struct FolderClassification {
    pub candidates: Vec<Candidate>,
    pub issues: Vec<Issue>,
}

/// Candidates and issues for a whole run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    pub issues: Vec<Issue>,
    /// Show folders that were fully classified.
    pub completed: Vec<PathBuf>,
    /// Set when cancellation stopped classification before every folder was done.
    pub cancelled: bool,
}

/// Episode metadata extractor.
pub struct MetadataExtractor<C: Classifier> {
    classifier: C,
    config: ClassifierConfig,
    companions: CompanionPolicy,
}

impl<C: Classifier> MetadataExtractor<C> {
    /// Create an extractor around a classifier.
    pub fn new(classifier: C, config: ClassifierConfig, companions: CompanionPolicy) -> Self {
        Self {
            classifier,
            config,
            companions,
        }
    }

    /// Classify a batch of filenames from one show folder.
    ///
    /// Returns one verdict per filename, order preserved. Fails only on
    /// cancellation, or on a malformed response when `strict_protocol` is set.
    pub async fn classify(
        &self,
        filenames: &[String],
        show_folder: &str,
        cancel: &CancelFlag,
    ) -> Result<BatchResult> {
        if filenames.is_empty() {
            return Ok(BatchResult::default());
        }

        if !self.config.enabled {
            tracing::debug!("{}: classifier disabled, using heuristic", show_folder);
            return Ok(BatchResult {
                verdicts: heuristic_batch(filenames, show_folder),
                issues: Vec::new(),
            });
        }

        let request = ClassifyRequest {
            show_folder: show_folder.to_string(),
            filenames: filenames.to_vec(),
        };

        let outcome = match self.call_with_retry(&request, cancel).await? {
            CallOutcome::Success(response) if response.guesses.len() != filenames.len() => {
                CallOutcome::Malformed(format!(
                    "expected {} guesses, got {}",
                    filenames.len(),
                    response.guesses.len()
                ))
            }
            outcome => outcome,
        };

        match outcome {
            CallOutcome::Success(response) => {
                let verdicts = filenames
                    .iter()
                    .zip(response.guesses.iter())
                    .map(|(name, raw)| self.judge(raw, name, show_folder))
                    .collect();
                Ok(BatchResult {
                    verdicts,
                    issues: Vec::new(),
                })
            }
            CallOutcome::Malformed(reason) => {
                if self.config.strict_protocol {
                    return Err(crate::Error::ClassifierProtocol(format!(
                        "{}: {}",
                        show_folder, reason
                    )));
                }
                tracing::warn!("{}: malformed classifier response: {}", show_folder, reason);
                Ok(BatchResult {
                    verdicts: heuristic_batch(filenames, show_folder),
                    issues: vec![Issue::ClassifierMalformed {
                        show_folder: show_folder.to_string(),
                        reason,
                    }],
                })
            }
            outcome => {
                let reason = outcome.describe();
                tracing::warn!(
                    "{}: classifier unavailable ({}), using heuristic",
                    show_folder,
                    reason
                );
                Ok(BatchResult {
                    verdicts: heuristic_batch(filenames, show_folder),
                    issues: vec![Issue::ClassificationUnavailable {
                        show_folder: show_folder.to_string(),
                        reason,
                    }],
                })
            }
        }
    }

    /// Call the classifier, retrying retryable outcomes with backoff.
    async fn call_with_retry(
        &self,
        request: &ClassifyRequest,
        cancel: &CancelFlag,
    ) -> Result<CallOutcome> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(crate::Error::Cancelled);
            }

            let outcome = self.classifier.classify(request).await;
            if !outcome.is_retryable() || attempt >= self.config.max_retries {
                return Ok(outcome);
            }

            attempt += 1;
            let delay = match &outcome {
                CallOutcome::RateLimited {
                    retry_after: Some(wait),
                } => *wait,
                _ => retry_backoff(attempt),
            };
            tracing::warn!(
                "{}: {}, retry {}/{} in {:?}",
                request.show_folder,
                outcome.describe(),
                attempt,
                self.config.max_retries,
                delay
            );
            sleep_with_cancel(cancel, delay).await?;
        }
    }

    /// Validate one classifier guess, falling back to the heuristic when it is
    /// unusable or below the acceptance threshold.
    fn judge(&self, raw: &RawGuess, filename: &str, show_folder: &str) -> FileVerdict {
        let rejection = match validate(raw) {
            Ok(guess) if guess.confidence >= self.config.acceptance_threshold => {
                return FileVerdict {
                    guess: Some(guess),
                    note: None,
                };
            }
            Ok(guess) => format!(
                "classifier confidence {:.2} below threshold {:.2}",
                guess.confidence, self.config.acceptance_threshold
            ),
            Err(reason) => reason,
        };

        tracing::debug!("{}: {}", filename, rejection);
        heuristic_verdict(filename, show_folder, Some(rejection))
    }

    /// Classify every file of one show folder into candidates.
    pub async fn classify_folder(
        &self,
        folder: &ShowFolder,
        cancel: &CancelFlag,
    ) -> Result<FolderClassification> {
        if cancel.is_cancelled() {
            return Err(crate::Error::Cancelled);
        }

        let (primaries, pairs) = match self.companions {
            CompanionPolicy::Inherit => pair_companions(&folder.files),
            CompanionPolicy::Independent => (folder.files.iter().collect(), Vec::new()),
        };

        let names: Vec<String> = primaries
            .iter()
            .map(|file| relative_name(file, &folder.path))
            .collect();

        let batch = self.classify(&names, &folder.name, cancel).await?;
        let mut result = FolderClassification {
            candidates: Vec::new(),
            issues: batch.issues,
        };

        let mut guesses: Vec<(&Path, Option<EpisodeGuess>)> = Vec::with_capacity(primaries.len());
        for (file, verdict) in primaries.iter().zip(batch.verdicts) {
            match &verdict.guess {
                Some(guess) => {
                    if let Some(reason) = verdict.note {
                        result.issues.push(Issue::FallbackUsed {
                            source: file.path.clone(),
                            reason,
                        });
                    }
                    if let Some((first, last)) = heuristic::episode_range(&file.filename) {
                        result.issues.push(Issue::MultiEpisode {
                            source: file.path.clone(),
                            first,
                            last,
                            linked: guess.episode,
                        });
                    }
                    result.candidates.push(Candidate {
                        file: (*file).clone(),
                        guess: guess.clone(),
                        suffix: file.extension(),
                    });
                }
                None => {
                    result.issues.push(Issue::AmbiguousEpisode {
                        source: file.path.clone(),
                        show_folder: folder.name.clone(),
                        reason: verdict
                            .note
                            .unwrap_or_else(|| "no episode number found".to_string()),
                    });
                }
            }
            guesses.push((file.path.as_path(), verdict.guess));
        }

        for pair in pairs {
            let video_guess = guesses
                .iter()
                .find(|(path, _)| *path == pair.video.as_path())
                .and_then(|(_, guess)| guess.clone());
            match video_guess {
                Some(guess) => result.candidates.push(Candidate {
                    file: pair.companion.clone(),
                    guess: EpisodeGuess {
                        source: GuessSource::Inherited,
                        ..guess
                    },
                    suffix: pair.suffix,
                }),
                None => result.issues.push(Issue::AmbiguousEpisode {
                    source: pair.companion.path.clone(),
                    show_folder: folder.name.clone(),
                    reason: format!("paired video {} has no episode number", pair.video.display()),
                }),
            }
        }

        tracing::info!(
            "{}: {} candidates, {} issues",
            folder.name,
            result.candidates.len(),
            result.issues.len()
        );
        Ok(result)
    }

    /// Classify show folders with bounded concurrency, one request per folder.
    ///
    /// Results keep folder order. Cancellation stops new folders from
    /// starting; folders already classified are kept.
    pub async fn classify_folders(
        &self,
        folders: &[ShowFolder],
        cancel: &CancelFlag,
    ) -> Result<Extraction> {
        let concurrency = self.config.concurrency.max(1);

        let mut results: Vec<(usize, Result<FolderClassification>)> =
            stream::iter(folders.iter().enumerate())
                .map(|(idx, folder)| async move { (idx, self.classify_folder(folder, cancel).await) })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut extraction = Extraction::default();
        for (idx, result) in results {
            match result {
                Ok(classified) => {
                    extraction.candidates.extend(classified.candidates);
                    extraction.issues.extend(classified.issues);
                    extraction.completed.push(folders[idx].path.clone());
                }
                Err(crate::Error::Cancelled) => extraction.cancelled = true,
                Err(e) => return Err(e),
            }
        }

        if extraction.cancelled {
            tracing::warn!("Classification cancelled; partial results kept");
        }
        Ok(extraction)
    }
}

/// Check a raw classifier guess against the response contract.
pub fn validate(raw: &RawGuess) -> std::result::Result<EpisodeGuess, String> {
    if raw.undetermined {
        return Err("classifier could not determine the episode".to_string());
    }

    let episode = match raw.episode {
        None => return Err("classifier gave no episode number".to_string()),
        Some(e) if e <= 0 => return Err(format!("classifier gave non-positive episode {}", e)),
        Some(e) => u16::try_from(e).map_err(|_| format!("episode {} out of range", e))?,
    };

    let season = match raw.season {
        None => 1,
        Some(s) if s < 0 => return Err(format!("classifier gave negative season {}", s)),
        Some(s) => u16::try_from(s).map_err(|_| format!("season {} out of range", s))?,
    };

    let title = raw
        .title
        .as_deref()
        .and_then(normalize_title)
        .ok_or_else(|| "classifier gave no usable title".to_string())?;

    let year = raw
        .year
        .filter(|y| (1900..=2100).contains(y))
        .and_then(|y| u16::try_from(y).ok());

    Ok(EpisodeGuess {
        title,
        year,
        season,
        episode,
        confidence: normalize_confidence(raw.confidence),
        source: GuessSource::Classifier,
    })
}

/// Normalize a reported confidence into 0.0..=1.0 (percentages are scaled down).
fn normalize_confidence(confidence: Option<f32>) -> f32 {
    match confidence {
        None => DEFAULT_CONFIDENCE,
        Some(c) if c.is_nan() => 0.0,
        Some(c) if c > 1.0 => (c / 100.0).clamp(0.0, 1.0),
        Some(c) => c.clamp(0.0, 1.0),
    }
}

fn heuristic_verdict(filename: &str, show_folder: &str, note: Option<String>) -> FileVerdict {
    match heuristic::guess(filename, show_folder) {
        Some(guess) => FileVerdict {
            guess: Some(guess),
            note,
        },
        None => FileVerdict {
            guess: None,
            note: Some(match note {
                Some(reason) => format!("{}; no episode number in filename", reason),
                None => "no episode number found".to_string(),
            }),
        },
    }
}

fn heuristic_batch(filenames: &[String], show_folder: &str) -> Vec<FileVerdict> {
    filenames
        .iter()
        .map(|name| heuristic_verdict(name, show_folder, None))
        .collect()
}

/// Path of a file relative to its show folder, with `/` separators.
fn relative_name(file: &SourceFile, folder: &Path) -> String {
    match file.path.strip_prefix(folder) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => file.filename.clone(),
    }
}

/// A companion file paired with a video by filename stem.
#[derive(Debug, Clone)]
pub struct CompanionPair {
    pub companion: SourceFile,
    pub video: PathBuf,
    /// Remainder of the companion's name after the video stem (`.en.srt`).
    pub suffix: String,
}

/// Split files into primaries (videos and unpaired companions) and pairs.
///
/// A companion pairs with the video in the same directory whose stem is the
/// longest prefix of the companion's name followed by a dot.
pub fn pair_companions(files: &[SourceFile]) -> (Vec<&SourceFile>, Vec<CompanionPair>) {
    let videos: Vec<&SourceFile> = files.iter().filter(|f| f.kind == FileKind::Video).collect();
    let mut primaries = Vec::new();
    let mut pairs = Vec::new();

    for file in files {
        if !file.kind.is_companion() {
            primaries.push(file);
            continue;
        }

        let partner = videos
            .iter()
            .filter(|video| video.path.parent() == file.path.parent())
            .filter(|video| {
                let stem = video.stem();
                file.filename.len() > stem.len()
                    && file.filename.starts_with(stem)
                    && file.filename[stem.len()..].starts_with('.')
            })
            .max_by_key(|video| video.stem().len());

        match partner {
            Some(video) => pairs.push(CompanionPair {
                companion: file.clone(),
                video: video.path.clone(),
                suffix: file.filename[video.stem().len()..].to_string(),
            }),
            None => primaries.push(file),
        }
    }

    (primaries, pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier::ClassifyResponse;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays outcomes in order; the last one repeats.
    struct Scripted {
        outcomes: Mutex<Vec<CallOutcome>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<CallOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classifier for Scripted {
        fn classify(&self, _request: &ClassifyRequest) -> impl Future<Output = CallOutcome> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            let outcome = if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            };
            async move { outcome }
        }
    }

    fn raw(episode: i64, confidence: f32) -> RawGuess {
        RawGuess {
            title: Some("Sousou no Frieren".to_string()),
            year: Some(2023),
            season: Some(1),
            episode: Some(episode),
            confidence: Some(confidence),
            ..Default::default()
        }
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            api_key: Some("test".to_string()),
            ..Default::default()
        }
    }

    fn file(path: &str, kind: FileKind) -> SourceFile {
        let path = PathBuf::from(path);
        SourceFile {
            filename: path.file_name().unwrap().to_string_lossy().to_string(),
            show_folder: "Show".to_string(),
            path,
            kind,
            size: 1,
            modified: chrono::Utc::now(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate() {
        let guess = validate(&raw(3, 0.9)).unwrap();
        assert_eq!(guess.episode, 3);
        assert_eq!(guess.year, Some(2023));

        assert!(validate(&raw(0, 0.9)).is_err());
        assert!(validate(&RawGuess {
            undetermined: true,
            ..Default::default()
        })
        .is_err());
        assert!(validate(&RawGuess {
            title: None,
            ..raw(1, 0.9)
        })
        .is_err());

        let special = validate(&RawGuess {
            season: Some(0),
            ..raw(1, 0.9)
        })
        .unwrap();
        assert_eq!(special.season, 0);

        let defaulted = validate(&RawGuess {
            season: None,
            ..raw(1, 0.9)
        })
        .unwrap();
        assert_eq!(defaulted.season, 1);
    }

    #[test]
    fn test_normalize_confidence() {
        assert_eq!(normalize_confidence(Some(85.0)), 0.85);
        assert_eq!(normalize_confidence(Some(-1.0)), 0.0);
        assert_eq!(normalize_confidence(None), DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_classify_accepts_confident_guesses() {
        let classifier = Scripted::new(vec![CallOutcome::Success(ClassifyResponse {
            guesses: vec![raw(1, 0.95), raw(2, 0.9)],
        })]);
        let extractor = MetadataExtractor::new(classifier, config(), CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["a [01].mkv", "a [02].mkv"]), "Frieren", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(result.verdicts.len(), 2);
        assert!(result.issues.is_empty());
        let second = result.verdicts[1].guess.as_ref().unwrap();
        assert_eq!(second.episode, 2);
        assert_eq!(second.source, GuessSource::Classifier);
    }

    #[tokio::test]
    async fn test_low_confidence_routes_to_heuristic() {
        let classifier = Scripted::new(vec![CallOutcome::Success(ClassifyResponse {
            guesses: vec![raw(7, 0.1), raw(7, 0.1)],
        })]);
        let extractor = MetadataExtractor::new(classifier, config(), CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["Show [03].mkv", "Credits.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();

        let fallback = &result.verdicts[0];
        let guess = fallback.guess.as_ref().unwrap();
        assert_eq!(guess.episode, 3);
        assert_eq!(guess.source, GuessSource::Heuristic);
        assert!(fallback.note.as_ref().unwrap().contains("below threshold"));

        assert!(result.verdicts[1].guess.is_none());
    }

    #[tokio::test]
    async fn test_retries_then_falls_back() {
        let classifier = Scripted::new(vec![CallOutcome::RateLimited {
            retry_after: Some(Duration::from_millis(1)),
        }]);
        let mut cfg = config();
        cfg.max_retries = 2;
        let extractor = MetadataExtractor::new(classifier, cfg, CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["Show S01E04.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(extractor.classifier.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result.issues[0], Issue::ClassificationUnavailable { .. }));
        assert_eq!(result.verdicts[0].guess.as_ref().unwrap().episode, 4);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let classifier = Scripted::new(vec![CallOutcome::Unauthorized("HTTP 401".into())]);
        let extractor = MetadataExtractor::new(classifier, config(), CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["Show - 05.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(extractor.classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.verdicts[0].guess.as_ref().unwrap().episode, 5);
    }

    #[tokio::test]
    async fn test_client_error_status_is_unavailable_not_malformed() {
        let mut cfg = config();
        cfg.strict_protocol = true;
        let classifier = Scripted::new(vec![CallOutcome::Unavailable("HTTP 404 Not Found".into())]);
        let extractor = MetadataExtractor::new(classifier, cfg, CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["Show - 05.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(extractor.classifier.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.issues.as_slice(),
            [Issue::ClassificationUnavailable { .. }]
        ));
        assert_eq!(result.verdicts[0].guess.as_ref().unwrap().episode, 5);
    }

    #[tokio::test]
    async fn test_malformed_lenient_and_strict() {
        let lenient = MetadataExtractor::new(
            Scripted::new(vec![CallOutcome::Malformed("bad json".into())]),
            config(),
            CompanionPolicy::Inherit,
        );
        let result = lenient
            .classify(&names(&["Show E02.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();
        assert!(matches!(result.issues[0], Issue::ClassifierMalformed { .. }));
        assert_eq!(result.verdicts[0].guess.as_ref().unwrap().episode, 2);

        let mut cfg = config();
        cfg.strict_protocol = true;
        let strict = MetadataExtractor::new(
            Scripted::new(vec![CallOutcome::Malformed("bad json".into())]),
            cfg,
            CompanionPolicy::Inherit,
        );
        let err = strict
            .classify(&names(&["Show E02.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ClassifierProtocol(_)));
    }

    #[tokio::test]
    async fn test_short_response_is_malformed() {
        let classifier = Scripted::new(vec![CallOutcome::Success(ClassifyResponse {
            guesses: vec![raw(1, 0.95)],
        })]);
        let extractor = MetadataExtractor::new(classifier, config(), CompanionPolicy::Inherit);
        let result = extractor
            .classify(&names(&["Show E01.mkv", "Show E02.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(result.verdicts.len(), 2);
        assert!(matches!(result.issues[0], Issue::ClassifierMalformed { .. }));
        assert_eq!(result.verdicts[1].guess.as_ref().unwrap().episode, 2);
    }

    #[tokio::test]
    async fn test_disabled_classifier_is_never_called() {
        let mut cfg = config();
        cfg.enabled = false;
        let extractor = MetadataExtractor::new(
            Scripted::new(vec![CallOutcome::Timeout]),
            cfg,
            CompanionPolicy::Inherit,
        );
        let result = extractor
            .classify(&names(&["Show S02E01.mkv"]), "Show", &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(extractor.classifier.calls.load(Ordering::SeqCst), 0);
        assert!(result.issues.is_empty());
        assert_eq!(result.verdicts[0].guess.as_ref().unwrap().season, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let extractor = MetadataExtractor::new(
            Scripted::new(vec![CallOutcome::Timeout]),
            config(),
            CompanionPolicy::Inherit,
        );
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = extractor
            .classify(&names(&["Show S01E01.mkv"]), "Show", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Cancelled));
    }

    #[test]
    fn test_pair_companions() {
        let files = vec![
            file("/src/Show/ep1.mkv", FileKind::Video),
            file("/src/Show/ep1.en.srt", FileKind::Subtitle),
            file("/src/Show/ep10.mkv", FileKind::Video),
            file("/src/Show/ep10.nfo", FileKind::Sidecar),
            file("/src/Show/cover.jpg", FileKind::Sidecar),
            file("/src/Show/other/ep1.srt", FileKind::Subtitle),
        ];
        let (primaries, pairs) = pair_companions(&files);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].video, PathBuf::from("/src/Show/ep1.mkv"));
        assert_eq!(pairs[0].suffix, ".en.srt");
        assert_eq!(pairs[1].video, PathBuf::from("/src/Show/ep10.mkv"));
        assert_eq!(pairs[1].suffix, ".nfo");

        let primary_names: Vec<&str> = primaries.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(primary_names, vec!["ep1.mkv", "ep10.mkv", "cover.jpg", "ep1.srt"]);
    }

    #[tokio::test]
    async fn test_classify_folder_inherits_companions() {
        let folder = ShowFolder {
            name: "Show".to_string(),
            path: PathBuf::from("/src/Show"),
            files: vec![
                file("/src/Show/Show S01E01.mkv", FileKind::Video),
                file("/src/Show/Show S01E01.en.srt", FileKind::Subtitle),
            ],
        };
        let mut cfg = config();
        cfg.enabled = false;
        let extractor = MetadataExtractor::new(Scripted::new(vec![CallOutcome::Timeout]), cfg, CompanionPolicy::Inherit);
        let result = extractor.classify_folder(&folder, &CancelFlag::new()).await.unwrap();

        assert_eq!(result.candidates.len(), 2);
        let subtitle = &result.candidates[1];
        assert_eq!(subtitle.suffix, ".en.srt");
        assert_eq!(subtitle.guess.source, GuessSource::Inherited);
        assert_eq!(subtitle.guess.episode, 1);
    }

    #[tokio::test]
    async fn test_classify_folder_reports_ambiguous() {
        let folder = ShowFolder {
            name: "Show".to_string(),
            path: PathBuf::from("/src/Show"),
            files: vec![
                file("/src/Show/Opening.mkv", FileKind::Video),
                file("/src/Show/Opening.srt", FileKind::Subtitle),
            ],
        };
        let mut cfg = config();
        cfg.enabled = false;
        let extractor = MetadataExtractor::new(Scripted::new(vec![CallOutcome::Timeout]), cfg, CompanionPolicy::Inherit);
        let result = extractor.classify_folder(&folder, &CancelFlag::new()).await.unwrap();

        assert!(result.candidates.is_empty());
        let ambiguous = result
            .issues
            .iter()
            .filter(|i| matches!(i, Issue::AmbiguousEpisode { .. }))
            .count();
        assert_eq!(ambiguous, 2);
    }

    #[tokio::test]
    async fn test_multi_episode_file_is_reported() {
        let folder = ShowFolder {
            name: "Show".to_string(),
            path: PathBuf::from("/src/Show"),
            files: vec![file("/src/Show/Show S01E01-E02.mkv", FileKind::Video)],
        };
        let mut cfg = config();
        cfg.enabled = false;
        let extractor = MetadataExtractor::new(Scripted::new(vec![CallOutcome::Timeout]), cfg, CompanionPolicy::Inherit);
        let result = extractor.classify_folder(&folder, &CancelFlag::new()).await.unwrap();

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].guess.episode, 1);
        assert!(result.issues.contains(&Issue::MultiEpisode {
            source: PathBuf::from("/src/Show/Show S01E01-E02.mkv"),
            first: 1,
            last: 2,
            linked: 1,
        }));
    }

    /// Tracks how many requests are running at once.
    #[derive(Default)]
    struct Gauge {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Classifier for Gauge {
        fn classify(&self, request: &ClassifyRequest) -> impl Future<Output = CallOutcome> + Send {
            let in_flight = self.in_flight.clone();
            let peak = self.peak.clone();
            let count = request.filenames.len();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                let guesses = (0..count).map(|i| raw(i as i64 + 1, 0.9)).collect();
                CallOutcome::Success(ClassifyResponse { guesses })
            }
        }
    }

    #[tokio::test]
    async fn test_classify_folders_respects_concurrency() {
        let folders: Vec<ShowFolder> = (0..6)
            .map(|i| {
                let name = format!("Show{}", i);
                ShowFolder {
                    path: PathBuf::from(format!("/src/{}", name)),
                    files: vec![file(&format!("/src/{}/e1.mkv", name), FileKind::Video)],
                    name,
                }
            })
            .collect();
        let mut cfg = config();
        cfg.concurrency = 2;
        let gauge = Gauge::default();
        let peak = gauge.peak.clone();
        let extractor = MetadataExtractor::new(gauge, cfg, CompanionPolicy::Inherit);

        let extraction = extractor
            .classify_folders(&folders, &CancelFlag::new())
            .await
            .unwrap();

        assert!(!extraction.cancelled);
        assert_eq!(extraction.candidates.len(), 6);
        assert_eq!(extraction.completed.len(), 6);
        let peak = peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight was {}", peak);
    }
}
