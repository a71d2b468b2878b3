use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::deliveries::FilteredDataset;
use crate::error::{Result, ScoreError};

/// Team name <-> integer id. Ids follow the sorted order of the fitted names,
/// so fitting the same set of names always yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamEncoder {
    classes: Vec<String>,
}

impl TeamEncoder {
    pub fn fit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn fit_dataset(dataset: &FilteredDataset) -> Self {
        Self::fit(dataset.team_names())
    }

    pub fn encode(&self, name: &str) -> Result<u32> {
        self.classes
            .binary_search_by(|probe| probe.as_str().cmp(name))
            .map(|idx| idx as u32)
            .map_err(|_| ScoreError::UnknownTeam(name.to_string()))
    }

    pub fn decode(&self, id: u32) -> Option<&str> {
        self.classes.get(id as usize).map(String::as_str)
    }

    pub fn all_names(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains_id(&self, id: u32) -> bool {
        (id as usize) < self.classes.len()
    }

    /// Whether the names are trimmed, non-empty, sorted and unique, as `fit`
    /// leaves them. `encode` relies on this.
    pub fn is_canonical(&self) -> bool {
        self.classes
            .iter()
            .all(|name| !name.is_empty() && name.trim() == name)
            && self.classes.windows(2).all(|pair| pair[0] < pair[1])
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.classes {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        hex(&hasher.finalize())
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipl() -> TeamEncoder {
        TeamEncoder::fit([
            "Mumbai Indians",
            "Chennai Super Kings",
            "Gujarat Titans",
            "Mumbai Indians",
            "Lucknow Super Giants",
        ])
    }

    #[test]
    fn ids_follow_sorted_names() {
        let enc = ipl();
        assert_eq!(
            enc.all_names(),
            [
                "Chennai Super Kings",
                "Gujarat Titans",
                "Lucknow Super Giants",
                "Mumbai Indians"
            ]
        );
        assert_eq!(enc.encode("Chennai Super Kings").unwrap(), 0);
        assert_eq!(enc.encode("Mumbai Indians").unwrap(), 3);
    }

    #[test]
    fn encode_and_decode_are_inverse() {
        let enc = ipl();
        for (id, name) in enc.all_names().iter().enumerate() {
            assert_eq!(enc.encode(name).unwrap(), id as u32);
            assert_eq!(enc.decode(id as u32), Some(name.as_str()));
        }
    }

    #[test]
    fn unknown_team_fails() {
        let enc = ipl();
        let err = enc.encode("Deccan Chargers").unwrap_err();
        assert!(matches!(err, ScoreError::UnknownTeam(name) if name == "Deccan Chargers"));
        assert_eq!(enc.decode(4), None);
        assert!(!enc.contains_id(4));
    }

    #[test]
    fn only_sorted_unique_names_are_canonical() {
        assert!(ipl().is_canonical());
        let names = |list: &[&str]| TeamEncoder {
            classes: list.iter().map(|s| s.to_string()).collect(),
        };
        assert!(names(&[]).is_canonical());
        assert!(!names(&["MI", "CSK"]).is_canonical());
        assert!(!names(&["CSK", "CSK"]).is_canonical());
        assert!(!names(&["CSK", " MI"]).is_canonical());
        assert!(!names(&[""]).is_canonical());
    }

    #[test]
    fn refit_is_stable_and_fingerprint_tracks_names() {
        let a = ipl();
        let b = TeamEncoder::fit(a.all_names().iter().rev());
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = TeamEncoder::fit(["Chennai Super Kings"]);
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
