//! Link planning.
//!
//! Turns classified candidates into an ordered, collision-free set of link
//! operations against the current mapping:
//! 1. Apply the title policy
//! 2. Compute destinations from the fixed layout
//! 3. Resolve collisions on identical destinations
//! 4. Classify each destination as create, replace, unchanged or remove
//! 5. Order by show, season and episode

use crate::models::config::TitlePolicy;
use crate::models::mapping::{MappingEntry, MappingFile};
use crate::models::media::EpisodeGuess;
use crate::models::plan::{Candidate, LinkOperation, OperationKind, ReconciliationPlan};
use crate::models::report::Issue;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Link planner.
#[derive(Debug, Clone)]
pub struct Planner {
    target_root: PathBuf,
    title_policy: TitlePolicy,
}

impl Planner {
    /// Create a planner for a target root.
    pub fn new(target_root: impl Into<PathBuf>, title_policy: TitlePolicy) -> Self {
        Self {
            target_root: target_root.into(),
            title_policy,
        }
    }

    /// Destination for an episode:
    /// `{title} ({year})/Season {season:02}/{title} S{season:02}E{episode:02}{suffix}`.
    pub fn destination_for(&self, guess: &EpisodeGuess, suffix: &str) -> PathBuf {
        self.target_root
            .join(guess.show_dir_name())
            .join(format!("Season {:02}", guess.season))
            .join(format!("{} {}{}", guess.title, guess.episode_code(), suffix))
    }

    /// Build a plan.
    ///
    /// `issues` are carried over from scanning and classification. `scope`
    /// lists the scanned show folders; only mapping entries whose source lies
    /// under one of them can be removed.
    pub fn plan(
        &self,
        candidates: Vec<Candidate>,
        issues: Vec<Issue>,
        existing: &MappingFile,
        scope: &[PathBuf],
    ) -> ReconciliationPlan {
        let mut plan = ReconciliationPlan {
            created_at: Utc::now().to_rfc3339(),
            target_root: self.target_root.clone(),
            scope: scope.to_vec(),
            operations: Vec::new(),
            summary: Default::default(),
            issues,
        };

        let candidates = match self.title_policy {
            TitlePolicy::KeepMapped => keep_mapped_titles(candidates, existing),
            TitlePolicy::FollowClassifier => candidates,
        };

        let mut by_destination: BTreeMap<PathBuf, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            let destination = self.destination_for(&candidate.guess, &candidate.suffix);
            by_destination.entry(destination).or_default().push(candidate);
        }

        let mut planned: HashSet<PathBuf> = HashSet::new();
        for (destination, contenders) in by_destination {
            let mapped = existing.entries.get(&destination);
            let Some((winner, losers)) = resolve_collision(contenders, mapped) else {
                continue;
            };

            for loser in losers {
                let reason = collision_reason(&winner, &loser, mapped);
                tracing::debug!(
                    "Collision at {}: kept {}, excluded {}",
                    destination.display(),
                    winner.file.path.display(),
                    loser.file.path.display()
                );
                plan.issues.push(Issue::CollisionResolved {
                    destination: destination.clone(),
                    kept: winner.file.path.clone(),
                    excluded: loser.file.path,
                    reason,
                });
            }

            let (kind, previous_source) = match mapped {
                None => (OperationKind::Create, None),
                Some(entry) if entry.source == winner.file.path => (OperationKind::Unchanged, None),
                Some(entry) => (OperationKind::Replace, Some(entry.source.clone())),
            };

            planned.insert(destination.clone());
            plan.operations.push(LinkOperation {
                kind,
                source: winner.file.path,
                destination,
                show_folder: winner.file.show_folder,
                guess: Some(winner.guess),
                previous_source,
                retired: None,
            });
        }

        for entry in existing.entries.values() {
            if planned.contains(&entry.destination) || !in_scope(&entry.source, scope) {
                continue;
            }
            plan.operations.push(LinkOperation {
                kind: OperationKind::Remove,
                source: entry.source.clone(),
                destination: entry.destination.clone(),
                show_folder: entry.show_folder.clone(),
                guess: None,
                previous_source: None,
                retired: Some(entry.clone()),
            });
        }

        plan.operations.sort_by(|a, b| {
            a.title()
                .cmp(b.title())
                .then_with(|| a.episode_key().cmp(&b.episode_key()))
                .then_with(|| a.destination.cmp(&b.destination))
        });
        plan.recount();

        tracing::info!(
            "Plan: {} create, {} replace, {} remove, {} unchanged, {} ambiguous, {} collisions",
            plan.summary.create,
            plan.summary.replace,
            plan.summary.remove,
            plan.summary.unchanged,
            plan.summary.ambiguous,
            plan.summary.collisions
        );

        plan
    }
}

/// Whether a source path falls under one of the scanned folders.
fn in_scope(source: &Path, scope: &[PathBuf]) -> bool {
    scope.iter().any(|folder| source.starts_with(folder))
}

/// Reuse the title and year already mapped for each show folder.
fn keep_mapped_titles(candidates: Vec<Candidate>, existing: &MappingFile) -> Vec<Candidate> {
    let mut mapped: HashMap<&str, (&str, Option<u16>)> = HashMap::new();
    for entry in existing.entries.values() {
        if !entry.show_folder.is_empty() {
            mapped
                .entry(entry.show_folder.as_str())
                .or_insert((entry.title.as_str(), entry.year));
        }
    }

    candidates
        .into_iter()
        .map(|mut candidate| {
            if let Some((title, year)) = mapped.get(candidate.file.show_folder.as_str()) {
                if candidate.guess.title != *title || candidate.guess.year != *year {
                    tracing::debug!(
                        "{}: keeping mapped title '{}' over '{}'",
                        candidate.file.show_folder,
                        title,
                        candidate.guess.title
                    );
                    candidate.guess.title = title.to_string();
                    candidate.guess.year = *year;
                }
            }
            candidate
        })
        .collect()
}

/// Pick the candidate that keeps a destination.
///
/// Preference: the source already mapped there, then higher confidence, then
/// the lexicographically smaller source path.
fn resolve_collision(
    mut contenders: Vec<Candidate>,
    mapped: Option<&MappingEntry>,
) -> Option<(Candidate, Vec<Candidate>)> {
    contenders.sort_by(|a, b| {
        let a_mapped = mapped.is_some_and(|e| e.source == a.file.path);
        let b_mapped = mapped.is_some_and(|e| e.source == b.file.path);
        b_mapped
            .cmp(&a_mapped)
            .then_with(|| b.guess.confidence.total_cmp(&a.guess.confidence))
            .then_with(|| a.file.path.cmp(&b.file.path))
    });
    let mut rest = contenders.into_iter();
    let winner = rest.next()?;
    Some((winner, rest.collect()))
}

fn collision_reason(winner: &Candidate, loser: &Candidate, mapped: Option<&MappingEntry>) -> String {
    if mapped.is_some_and(|e| e.source == winner.file.path) {
        "already mapped".to_string()
    } else if winner.guess.confidence > loser.guess.confidence {
        format!(
            "higher confidence ({:.2} > {:.2})",
            winner.guess.confidence, loser.guess.confidence
        )
    } else {
        "equal confidence, first by path".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::{FileKind, GuessSource, SourceFile};

    fn candidate(path: &str, folder: &str, title: &str, episode: u16, confidence: f32) -> Candidate {
        let path = PathBuf::from(path);
        Candidate {
            file: SourceFile {
                filename: path.file_name().unwrap().to_string_lossy().to_string(),
                show_folder: folder.to_string(),
                path,
                kind: FileKind::Video,
                size: 1,
                modified: Utc::now(),
            },
            guess: EpisodeGuess {
                title: title.to_string(),
                year: Some(2023),
                season: 1,
                episode,
                confidence,
                source: GuessSource::Classifier,
            },
            suffix: ".mkv".to_string(),
        }
    }

    fn mapping(entries: Vec<(&str, &str, &str, u16)>) -> MappingFile {
        let mut file = MappingFile::default();
        for (source, destination, folder, episode) in entries {
            file.entries.insert(
                PathBuf::from(destination),
                MappingEntry {
                    source: PathBuf::from(source),
                    destination: PathBuf::from(destination),
                    title: "Frieren".to_string(),
                    year: Some(2023),
                    season: 1,
                    episode,
                    show_folder: folder.to_string(),
                    created_at: Utc::now(),
                },
            );
        }
        file
    }

    fn scope() -> Vec<PathBuf> {
        vec![PathBuf::from("/src/Frieren")]
    }

    const DEST_E1: &str = "/tv/Frieren (2023)/Season 01/Frieren S01E01.mkv";

    #[test]
    fn test_destination_for() {
        let planner = Planner::new("/tv", TitlePolicy::KeepMapped);
        let c = candidate("/src/Sousou/a.mkv", "Sousou", "Sousou no Frieren", 1, 0.9);
        assert_eq!(
            planner.destination_for(&c.guess, ".mkv"),
            PathBuf::from("/tv/Sousou no Frieren (2023)/Season 01/Sousou no Frieren S01E01.mkv")
        );

        let no_year = EpisodeGuess {
            year: None,
            season: 0,
            episode: 3,
            ..c.guess
        };
        assert_eq!(
            planner.destination_for(&no_year, ".en.srt"),
            PathBuf::from("/tv/Sousou no Frieren/Season 00/Sousou no Frieren S00E03.en.srt")
        );
    }

    #[test]
    fn test_operation_kinds() {
        let planner = Planner::new("/tv", TitlePolicy::FollowClassifier);
        let existing = mapping(vec![
            ("/src/Frieren/e1.mkv", DEST_E1, "Frieren", 1),
            (
                "/src/Frieren/old-e2.mkv",
                "/tv/Frieren (2023)/Season 01/Frieren S01E02.mkv",
                "Frieren",
                2,
            ),
            (
                "/src/Frieren/e9.mkv",
                "/tv/Frieren (2023)/Season 01/Frieren S01E09.mkv",
                "Frieren",
                9,
            ),
        ]);
        let candidates = vec![
            candidate("/src/Frieren/e1.mkv", "Frieren", "Frieren", 1, 0.9),
            candidate("/src/Frieren/e2.mkv", "Frieren", "Frieren", 2, 0.9),
            candidate("/src/Frieren/e3.mkv", "Frieren", "Frieren", 3, 0.9),
        ];
        let plan = planner.plan(candidates, Vec::new(), &existing, &scope());

        let kinds: Vec<OperationKind> = plan.operations.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Unchanged,
                OperationKind::Replace,
                OperationKind::Create,
                OperationKind::Remove
            ]
        );
        assert_eq!(
            plan.operations[1].previous_source,
            Some(PathBuf::from("/src/Frieren/old-e2.mkv"))
        );
        assert!(plan.operations[3].retired.is_some());
        assert_eq!(plan.summary.pending(), 3);
    }

    #[test]
    fn test_removal_limited_to_scope() {
        let planner = Planner::new("/tv", TitlePolicy::KeepMapped);
        let existing = mapping(vec![(
            "/src/Other/e1.mkv",
            "/tv/Other/Season 01/Other S01E01.mkv",
            "Other",
            1,
        )]);
        let plan = planner.plan(Vec::new(), Vec::new(), &existing, &scope());
        assert!(plan.operations.is_empty());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_collision_prefers_mapped_source() {
        let planner = Planner::new("/tv", TitlePolicy::FollowClassifier);
        let existing = mapping(vec![("/src/Frieren/z.mkv", DEST_E1, "Frieren", 1)]);
        let candidates = vec![
            candidate("/src/Frieren/a.mkv", "Frieren", "Frieren", 1, 0.99),
            candidate("/src/Frieren/z.mkv", "Frieren", "Frieren", 1, 0.2),
        ];
        let plan = planner.plan(candidates, Vec::new(), &existing, &scope());

        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].source, PathBuf::from("/src/Frieren/z.mkv"));
        assert_eq!(plan.operations[0].kind, OperationKind::Unchanged);
        assert_eq!(plan.summary.collisions, 1);
        match &plan.issues[0] {
            Issue::CollisionResolved { excluded, reason, .. } => {
                assert_eq!(excluded, &PathBuf::from("/src/Frieren/a.mkv"));
                assert_eq!(reason, "already mapped");
            }
            other => panic!("unexpected issue {:?}", other),
        }
    }

    #[test]
    fn test_collision_confidence_then_path() {
        let planner = Planner::new("/tv", TitlePolicy::FollowClassifier);
        let empty = MappingFile::default();

        let plan = planner.plan(
            vec![
                candidate("/src/Frieren/a.mkv", "Frieren", "Frieren", 1, 0.6),
                candidate("/src/Frieren/b.mkv", "Frieren", "Frieren", 1, 0.9),
            ],
            Vec::new(),
            &empty,
            &scope(),
        );
        assert_eq!(plan.operations[0].source, PathBuf::from("/src/Frieren/b.mkv"));

        let tied = planner.plan(
            vec![
                candidate("/src/Frieren/b.mkv", "Frieren", "Frieren", 1, 0.9),
                candidate("/src/Frieren/a.mkv", "Frieren", "Frieren", 1, 0.9),
            ],
            Vec::new(),
            &empty,
            &scope(),
        );
        assert_eq!(tied.operations[0].source, PathBuf::from("/src/Frieren/a.mkv"));
    }

    #[test]
    fn test_keep_mapped_title() {
        let existing = mapping(vec![("/src/Frieren/e1.mkv", DEST_E1, "Frieren", 1)]);
        let candidates = vec![
            candidate("/src/Frieren/e1.mkv", "Frieren", "Frieren Beyond Journey's End", 1, 0.9),
            candidate("/src/Frieren/e2.mkv", "Frieren", "Frieren Beyond Journey's End", 2, 0.9),
        ];

        let keep = Planner::new("/tv", TitlePolicy::KeepMapped).plan(
            candidates.clone(),
            Vec::new(),
            &existing,
            &scope(),
        );
        assert_eq!(keep.summary.unchanged, 1);
        assert_eq!(keep.summary.create, 1);
        assert_eq!(keep.summary.remove, 0);

        let follow = Planner::new("/tv", TitlePolicy::FollowClassifier).plan(
            candidates,
            Vec::new(),
            &existing,
            &scope(),
        );
        assert_eq!(follow.summary.create, 2);
        assert_eq!(follow.summary.remove, 1);
    }

    #[test]
    fn test_ordering_by_show_season_episode() {
        let planner = Planner::new("/tv", TitlePolicy::KeepMapped);
        let mut late = candidate("/src/B/s2e1.mkv", "B", "Beta", 1, 0.9);
        late.guess.season = 2;
        let plan = planner.plan(
            vec![
                late,
                candidate("/src/B/e10.mkv", "B", "Beta", 10, 0.9),
                candidate("/src/B/e2.mkv", "B", "Beta", 2, 0.9),
                candidate("/src/A/e1.mkv", "A", "Alpha", 1, 0.9),
            ],
            Vec::new(),
            &MappingFile::default(),
            &[],
        );
        let keys: Vec<(String, (u16, u16))> = plan
            .operations
            .iter()
            .map(|op| (op.title().to_string(), op.episode_key()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Alpha".to_string(), (1, 1)),
                ("Beta".to_string(), (1, 2)),
                ("Beta".to_string(), (1, 10)),
                ("Beta".to_string(), (2, 1)),
            ]
        );
    }
}
