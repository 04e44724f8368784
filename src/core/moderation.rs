// LogWarden - core/moderation.rs
//
// Shared, replaceable list of banned phrases. Readers take a cheap snapshot
// of the current list; moderators replace it wholesale. Engines running
// concurrently may see the old or the new list for the remainder of a run.

use crate::core::model::PiracyHit;
use std::sync::{Arc, RwLock};

/// Handle to the banned-phrase list. Cloning shares the same list.
#[derive(Debug, Clone, Default)]
pub struct BannedPhrases {
    inner: Arc<RwLock<Arc<Vec<String>>>>,
}

impl BannedPhrases {
    pub fn new(phrases: Vec<String>) -> Self {
        let list = Self::default();
        list.replace(phrases);
        list
    }

    /// Current list, in priority order.
    pub fn snapshot(&self) -> Arc<Vec<String>> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Swap in a new list. Blank entries are dropped (they would match
    /// every line).
    pub fn replace(&self, phrases: Vec<String>) {
        let cleaned: Vec<String> = phrases
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        tracing::info!(count = cleaned.len(), "Banned phrase list replaced");
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(cleaned);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

/// Case-insensitive scan of `lines` against `phrases`.
///
/// Phrases are tried in list order; the first phrase found in any line wins.
/// Returns the phrase as listed and the line that contained it.
pub fn find_banned<'a, I>(phrases: &[String], lines: I) -> Option<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    if phrases.is_empty() {
        return None;
    }
    let lowered: Vec<(String, &str)> = lines
        .into_iter()
        .map(|line| (line.to_lowercase(), line))
        .collect();

    phrases.iter().find_map(|phrase| {
        let needle = phrase.to_lowercase();
        lowered
            .iter()
            .find(|(lower, _)| lower.contains(&needle))
            .map(|(_, original)| (phrase.clone(), (*original).to_string()))
    })
}

/// Build a `PiracyHit` for a phase.
pub fn piracy_hit(phase_index: usize, phase_name: &str, found: (String, String)) -> PiracyHit {
    PiracyHit {
        phase_index,
        phase_name: phase_name.to_string(),
        trigger: found.0,
        context: found.1,
    }
}
