//! Episode and duplicate-recording suppression.
//!
//! The deduplicator is seeded once per pass from the media library and then
//! learns every occurrence it lets through, so later occurrences of the same
//! pass are checked against earlier ones. A preempted assignment gives its
//! identity back through [`EpisodeDeduplicator::rollback`].

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use tunersched_protocol::{EpisodeManagementScheme, KnownSeries};

use super::occurrence::Occurrence;
use crate::provider::RecordingLookup;

/// What a kept occurrence added to the known sets.
///
/// Only identities that were new are recorded so that a rollback never
/// forgets an episode the library already had.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Registration {
    #[default]
    Nothing,
    Episode {
        series: String,
        number: Option<(u32, u32)>,
        title: Option<String>,
    },
    Recording {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Not newer than the latest known episode.
    NotNewEpisode,
    /// Season and episode already known.
    KnownEpisodeNumber,
    /// Episode title already known.
    KnownEpisodeName,
    /// A recording with the same name exists.
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep(Registration),
    Suppress(SuppressReason),
}

#[derive(Debug, Default)]
struct SeriesEpisodes {
    numbers: BTreeSet<(u32, u32)>,
    titles: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct EpisodeDeduplicator {
    default_scheme: EpisodeManagementScheme,
    skip_duplicate_recordings: bool,
    series: HashMap<String, SeriesEpisodes>,
    recordings: HashSet<String>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl EpisodeDeduplicator {
    pub fn new(default_scheme: EpisodeManagementScheme, skip_duplicate_recordings: bool) -> Self {
        Self {
            default_scheme,
            skip_duplicate_recordings,
            ..Default::default()
        }
    }

    /// Learn the episodes already present in the media library.
    pub fn seed(&mut self, known: &[KnownSeries]) {
        for series in known {
            let entry = self.series.entry(normalize(&series.name)).or_default();
            for episode in &series.episodes {
                if let (Some(season), Some(number)) = (episode.season_number, episode.episode_number)
                {
                    entry.numbers.insert((season, number));
                }
                if let Some(title) = &episode.episode_title {
                    entry.titles.insert(normalize(title));
                }
            }
        }
    }

    pub fn is_known_episode(&self, series: &str, season: u32, episode: u32) -> bool {
        self.series
            .get(&normalize(series))
            .map_or(false, |s| s.numbers.contains(&(season, episode)))
    }

    /// Scheme applying to `occurrence`: its own override, else the global one.
    pub fn scheme_for(&self, occurrence: &Occurrence) -> EpisodeManagementScheme {
        occurrence.episode_management.unwrap_or(self.default_scheme)
    }

    /// Decide whether `occurrence` may proceed to allocation, registering it if so.
    pub async fn check(
        &mut self,
        occurrence: &Occurrence,
        lookup: &dyn RecordingLookup,
    ) -> Verdict {
        if occurrence.is_series {
            return self.check_episode(occurrence);
        }
        if !self.skip_duplicate_recordings {
            return Verdict::Keep(Registration::Nothing);
        }

        let name = normalize(&occurrence.name);
        if self.recordings.contains(&name) {
            return Verdict::Suppress(SuppressReason::AlreadyRecorded);
        }

        match lookup.recordings_by_name(&occurrence.name).await {
            Ok(found) if !found.is_empty() => {
                debug!(
                    "EpisodeDeduplicator: {} recording(s) of {:?} exist",
                    found.len(),
                    occurrence.name
                );
                // the store answer holds for the rest of the pass
                self.recordings.insert(name);
                return Verdict::Suppress(SuppressReason::AlreadyRecorded);
            }
            Ok(_) => {}
            Err(e) => warn!(
                "EpisodeDeduplicator: recording lookup for {:?} failed: {}",
                occurrence.name, e
            ),
        }

        self.recordings.insert(name.clone());
        Verdict::Keep(Registration::Recording { name })
    }

    fn check_episode(&mut self, occurrence: &Occurrence) -> Verdict {
        let scheme = self.scheme_for(occurrence);
        if scheme == EpisodeManagementScheme::None {
            return Verdict::Keep(Registration::Nothing);
        }

        let key = occurrence.series_key();
        let number = occurrence.episode.number();
        let title = occurrence.episode.title.as_deref().map(normalize);

        if let Some(known) = self.series.get(&key) {
            let suppressed = match scheme {
                EpisodeManagementScheme::None => None,
                EpisodeManagementScheme::NewEpisodesByEpisodeNumber => {
                    match (number, known.numbers.iter().next_back()) {
                        (Some(n), Some(latest)) if n <= *latest => {
                            Some(SuppressReason::NotNewEpisode)
                        }
                        _ => None,
                    }
                }
                EpisodeManagementScheme::MissingEpisodesByEpisodeNumber => number
                    .filter(|n| known.numbers.contains(n))
                    .map(|_| SuppressReason::KnownEpisodeNumber),
                EpisodeManagementScheme::MissingEpisodesByEpisodeName => title
                    .as_ref()
                    .filter(|t| known.titles.contains(*t))
                    .map(|_| SuppressReason::KnownEpisodeName),
            };
            if let Some(reason) = suppressed {
                return Verdict::Suppress(reason);
            }
        }

        let entry = self.series.entry(key.clone()).or_default();
        let new_number = number.filter(|n| entry.numbers.insert(*n));
        let new_title = title.filter(|t| entry.titles.insert(t.clone()));

        Verdict::Keep(Registration::Episode {
            series: key,
            number: new_number,
            title: new_title,
        })
    }

    /// Forget what `registration` added.
    pub fn rollback(&mut self, registration: &Registration) {
        match registration {
            Registration::Nothing => {}
            Registration::Episode {
                series,
                number,
                title,
            } => {
                if let Some(entry) = self.series.get_mut(series) {
                    if let Some(n) = number {
                        entry.numbers.remove(n);
                    }
                    if let Some(t) = title {
                        entry.titles.remove(t);
                    }
                }
            }
            Registration::Recording { name } => {
                self.recordings.remove(name);
            }
        }
    }
}
